//! The virtual CPU: VMXON, VMCS programming, and the entry/exit loop.

use core::mem::offset_of;

use x86::msr::{
    rdmsr, IA32_EFER, IA32_FS_BASE, IA32_GS_BASE, IA32_PAT, IA32_VMX_ENTRY_CTLS,
    IA32_VMX_EXIT_CTLS, IA32_VMX_PINBASED_CTLS, IA32_VMX_PROCBASED_CTLS, IA32_VMX_PROCBASED_CTLS2,
    IA32_VMX_TRUE_ENTRY_CTLS, IA32_VMX_TRUE_EXIT_CTLS, IA32_VMX_TRUE_PINBASED_CTLS,
    IA32_VMX_TRUE_PROCBASED_CTLS,
};
use x86_64::instructions::interrupts::without_interrupts;
use x86_64::registers::control::{Cr0, Cr3, Cr4};

use vtx::flags::{EntryControls, ExitControls, PrimaryControls, SecondaryControls, VmxBasic};
use vtx::segmentation::{seg_type, Granularity, SegmentAccessRights};
use vtx::vmcs::{
    ControlField32, ControlField64, GuestField16, GuestField32, GuestField64, HostField16,
    HostField32, HostField64,
};
use vtx::Vmcs;

use super::super::context::GeneralRegisters;
use super::super::{exception, linux, tables};
use super::checks::partial_check_guest;
use super::ept::{self, ExtendedPageTable};
use super::structs::VmxRegion;
use super::{check_vmx_support, enable_vmx, set_vm};
use crate::consts::{
    GUEST_BOOTPARAM_ADDR, GUEST_KERNEL_BASE, GUEST_MEMORY_SIZE, PAGE_SIZE, VM_EXIT_STACK_SIZE,
};
use crate::error::HvResult;
use crate::memory::Frame;

/// Stack `HOST_RSP` initially points at. Every `asm_vm_entry` overwrites
/// `HOST_RSP` with the live call stack, so this backing is only a
/// placeholder for the window between VMCS setup and the first entry.
#[repr(align(4096))]
struct VmExitStack([u8; VM_EXIT_STACK_SIZE]);

static VM_EXIT_STACK: VmExitStack = VmExitStack([0; VM_EXIT_STACK_SIZE]);

/// A single guest vCPU and the VMX state backing it.
///
/// `#[repr(C)]`: the entry/exit assembly addresses `guest_regs` and
/// `launch_done` through `offset_of!`-derived displacements.
#[repr(C)]
pub struct Vcpu {
    /// Save area for all guest GPRs except RSP, which lives in VMCS
    /// `GUEST_RSP`. Ground truth between VM entries.
    guest_regs: GeneralRegisters,
    /// False until the first VMLAUNCH has returned through a VM exit;
    /// selects VMLAUNCH vs VMRESUME in `asm_vm_entry`.
    launch_done: bool,
    vmxon_region: VmxRegion,
    vmcs_region: VmxRegion,
    ept: ExtendedPageTable,
    /// Host-owned buffer backing all of guest-physical memory.
    guest_mem: Frame,
}

impl Vcpu {
    /// Bring this logical processor into VMX root operation and build a
    /// VMCS describing a Linux guest parked at its protected-mode entry.
    pub fn new(guest_kernel: &[u8], guest_initrd: Option<&[u8]>) -> HvResult<Self> {
        check_vmx_support()?;
        without_interrupts(enable_vmx)?;

        let vmx_basic = VmxBasic::read();
        if vmx_basic.memory_type != VmxBasic::MEMORY_TYPE_WRITE_BACK {
            return hv_result_err!(NotSupported, "VMX regions demand non-WB memory");
        }

        let vmxon_region = VmxRegion::new(vmx_basic.revision_id)?;
        without_interrupts(|| unsafe { vtx::vmxon(vmxon_region.paddr() as u64) })?;
        info!("VMXON done, region @ {:#x}", vmxon_region.paddr());

        let vmcs_region = VmxRegion::new(vmx_basic.revision_id)?;
        without_interrupts(|| -> vtx::Result {
            Vmcs::clear(vmcs_region.paddr() as u64)?;
            Vmcs::load(vmcs_region.paddr() as u64)
        })?;

        let mut guest_mem = Frame::new_contiguous(GUEST_MEMORY_SIZE / PAGE_SIZE)?;
        guest_mem.zero();
        let ept = ept::build_identity(0, guest_mem.start_paddr(), guest_mem.size())?;

        let mut vcpu = Self {
            guest_regs: GeneralRegisters::default(),
            launch_done: false,
            vmxon_region,
            vmcs_region,
            ept,
            guest_mem,
        };
        vcpu.setup_vmcs(&vmx_basic)?;
        linux::load_guest_image(vcpu.guest_mem.as_slice_mut(), guest_kernel, guest_initrd)?;
        Ok(vcpu)
    }

    /// The vCPU loop: validation gate, VM entry, exit dispatch. Never
    /// returns; every unrecoverable condition panics with a state dump.
    pub fn run(&mut self) -> ! {
        set_vm(self);
        info!(
            "Starting guest: RIP={:#x}, RSI={:#x}, {} MiB RAM @ {:#x}",
            GUEST_KERNEL_BASE,
            GUEST_BOOTPARAM_ADDR,
            self.guest_mem.size() >> 20,
            self.guest_mem.start_paddr()
        );
        loop {
            partial_check_guest();
            let first = !self.launch_done;
            let status = unsafe { asm_vm_entry(self) };
            if status != 0 {
                match Vmcs::instruction_error() {
                    Ok(Ok(e)) => panic!("VM entry failed: {:?}: {}", e, e.as_str()),
                    Ok(Err(raw)) => panic!("VM entry failed: unknown error number {}", raw),
                    Err(e) => panic!("VM entry failed, error unavailable: {:?}", e),
                }
            }
            if first {
                self.launch_done = true;
                debug!("first VMLAUNCH completed, switching to VMRESUME");
            }
            if let Err(e) = self.handle_exit() {
                self.dump_state();
                panic!("VM exit handler failed: {:?}", e);
            }
        }
    }

    pub fn regs(&self) -> &GeneralRegisters {
        &self.guest_regs
    }

    pub fn regs_mut(&mut self) -> &mut GeneralRegisters {
        &mut self.guest_regs
    }

    /// Read a guest GPR by SDM qualification encoding. RSP reads come
    /// from the VMCS; the save area never holds one.
    pub fn gpr(&self, index: u8) -> HvResult<u64> {
        if index == 4 {
            Ok(GuestField64::RSP.read()?)
        } else {
            Ok(self.guest_regs.get(index))
        }
    }

    pub fn set_gpr(&mut self, index: u8, value: u64) -> HvResult {
        if index == 4 {
            GuestField64::RSP.write(value)?;
        } else {
            self.guest_regs.set(index, value);
        }
        Ok(())
    }

    /// Advance guest RIP over the instruction that exited.
    pub fn step_next_inst(&mut self) -> HvResult {
        use vtx::vmcs::ReadOnlyField32;
        let rip = GuestField64::RIP.read()?;
        let len = ReadOnlyField32::EXIT_INSTRUCTION_LENGTH.read()? as u64;
        GuestField64::RIP.write(rip + len)?;
        Ok(())
    }

    /// Post-mortem dump, also reachable from the panic handler. VMCS
    /// reads may fail here; report what can be read.
    pub fn dump_state(&self) {
        let read64 = |f: GuestField64| f.read().unwrap_or(u64::MAX);
        error!("vCPU state:");
        error!("  {:#x?}", self.guest_regs);
        error!(
            "  RIP={:#x} RSP={:#x} RFLAGS={:#x}",
            read64(GuestField64::RIP),
            read64(GuestField64::RSP),
            read64(GuestField64::RFLAGS)
        );
        error!(
            "  CR0={:#x} CR3={:#x} CR4={:#x} EFER={:#x}",
            read64(GuestField64::CR0),
            read64(GuestField64::CR3),
            read64(GuestField64::CR4),
            read64(GuestField64::IA32_EFER)
        );
        error!(
            "  CS: sel={:#x} base={:#x} limit={:#x} rights={:#x}",
            GuestField16::CS_SELECTOR.read().unwrap_or(0xFFFF),
            read64(GuestField64::CS_BASE),
            GuestField32::CS_LIMIT.read().unwrap_or(u32::MAX),
            GuestField32::CS_ACCESS_RIGHTS.read().unwrap_or(u32::MAX)
        );
        error!(
            "  guest memory: {:#x} bytes @ host {:#x}",
            self.guest_mem.size(),
            self.guest_mem.start_paddr()
        );
    }

    fn setup_vmcs(&mut self, vmx_basic: &VmxBasic) -> HvResult {
        self.setup_vmcs_control(vmx_basic)?;
        self.setup_vmcs_host()?;
        self.setup_vmcs_guest()?;
        unsafe { self.ept.activate() }; // writes EPT_POINTER
        Ok(())
    }

    fn setup_vmcs_control(&mut self, vmx_basic: &VmxBasic) -> HvResult {
        // The TRUE capability MSRs report the real mandatory-1 sets when
        // IA32_VMX_BASIC advertises them.
        let (pin_cap, proc_cap, exit_cap, entry_cap) = if vmx_basic.true_controls {
            (
                IA32_VMX_TRUE_PINBASED_CTLS,
                IA32_VMX_TRUE_PROCBASED_CTLS,
                IA32_VMX_TRUE_EXIT_CTLS,
                IA32_VMX_TRUE_ENTRY_CTLS,
            )
        } else {
            (
                IA32_VMX_PINBASED_CTLS,
                IA32_VMX_PROCBASED_CTLS,
                IA32_VMX_EXIT_CTLS,
                IA32_VMX_ENTRY_CTLS,
            )
        };

        // Pin-based: defaults only.
        Vmcs::set_control(
            ControlField32::PIN_BASED_EXEC_CONTROLS,
            unsafe { rdmsr(pin_cap) },
            0,
        )?;

        Vmcs::set_control(
            ControlField32::PRIMARY_PROC_BASED_EXEC_CONTROLS,
            unsafe { rdmsr(proc_cap) },
            (PrimaryControls::HLT_EXITING
                | PrimaryControls::UNCOND_IO_EXITING
                | PrimaryControls::SECONDARY_CONTROLS)
                .bits(),
        )?;

        Vmcs::set_control(
            ControlField32::SECONDARY_PROC_BASED_EXEC_CONTROLS,
            unsafe { rdmsr(IA32_VMX_PROCBASED_CTLS2) },
            (SecondaryControls::ENABLE_EPT | SecondaryControls::UNRESTRICTED_GUEST).bits(),
        )?;

        Vmcs::set_control(
            ControlField32::EXIT_CONTROLS,
            unsafe { rdmsr(exit_cap) },
            (ExitControls::HOST_ADDRESS_SPACE_SIZE
                | ExitControls::SAVE_IA32_EFER
                | ExitControls::LOAD_IA32_EFER)
                .bits(),
        )?;

        // The guest starts in 32-bit protected mode: no IA32E_MODE_GUEST.
        Vmcs::set_control(
            ControlField32::ENTRY_CONTROLS,
            unsafe { rdmsr(entry_cap) },
            EntryControls::LOAD_IA32_EFER.bits(),
        )?;

        ControlField32::EXIT_MSR_STORE_COUNT.write(0)?;
        ControlField32::EXIT_MSR_LOAD_COUNT.write(0)?;
        ControlField32::ENTRY_MSR_LOAD_COUNT.write(0)?;
        ControlField32::CR3_TARGET_COUNT.write(0)?;
        ControlField32::EXCEPTION_BITMAP.write(0)?;
        ControlField32::ENTRY_INTERRUPTION_INFO.write(0)?;

        // Own every CR0/CR4 bit: any guest modification exits.
        ControlField64::CR0_GUEST_HOST_MASK.write(u64::MAX)?;
        ControlField64::CR4_GUEST_HOST_MASK.write(u64::MAX)?;
        Ok(())
    }

    fn setup_vmcs_host(&mut self) -> HvResult {
        HostField64::IA32_PAT.write(unsafe { rdmsr(IA32_PAT) })?;
        HostField64::IA32_EFER.write(unsafe { rdmsr(IA32_EFER) })?;

        HostField64::CR0.write(Cr0::read_raw())?;
        HostField64::CR3.write(Cr3::read().0.start_address().as_u64())?;
        HostField64::CR4.write(Cr4::read_raw())?;

        HostField16::CS_SELECTOR.write(tables::GdtStruct::KCODE_SELECTOR.0)?;
        HostField16::DS_SELECTOR.write(0)?;
        HostField16::ES_SELECTOR.write(0)?;
        HostField16::SS_SELECTOR.write(0)?;
        HostField16::FS_SELECTOR.write(0)?;
        HostField16::GS_SELECTOR.write(0)?;
        HostField16::TR_SELECTOR.write(tables::GdtStruct::TSS_SELECTOR.0)?;
        HostField64::FS_BASE.write(unsafe { rdmsr(IA32_FS_BASE) })?;
        HostField64::GS_BASE.write(unsafe { rdmsr(IA32_GS_BASE) })?;
        HostField64::TR_BASE.write(0)?;

        HostField64::GDTR_BASE.write(tables::GDT.lock().pointer().base.as_u64())?;
        HostField64::IDTR_BASE.write(exception::IDT.lock().pointer().base.as_u64())?;

        HostField32::SYSENTER_CS.write(0)?;
        HostField64::SYSENTER_ESP.write(0)?;
        HostField64::SYSENTER_EIP.write(0)?;

        let stack_top = VM_EXIT_STACK.0.as_ptr() as u64 + VM_EXIT_STACK_SIZE as u64;
        HostField64::RSP.write(stack_top)?;
        HostField64::RIP.write(asm_vm_exit as usize as u64)?;
        Ok(())
    }

    /// Guest state: 32-bit protected mode, paging off, flat segments, as
    /// the Linux boot protocol expects at the protected-mode entry.
    fn setup_vmcs_guest(&mut self) -> HvResult {
        const CR0_PE: u64 = 1 << 0;
        const CR0_ET: u64 = 1 << 4;
        const CR0_NE: u64 = 1 << 5;
        const CR4_VMXE: u64 = 1 << 13;

        let cr0 = CR0_PE | CR0_ET | CR0_NE;
        GuestField64::CR0.write(cr0)?;
        ControlField64::CR0_READ_SHADOW.write(cr0)?;
        GuestField64::CR3.write(0)?;
        // VMXE is mandatory-1 even for guests; the read shadow hides it.
        GuestField64::CR4.write(CR4_VMXE)?;
        ControlField64::CR4_READ_SHADOW.write(0)?;

        let code_rights = SegmentAccessRights::new(
            seg_type::CODE_ER_ACCESSED,
            true,
            0,
            true,
            false,
            true,
            Granularity::KByte,
        );
        let data_rights = SegmentAccessRights::new(
            seg_type::DATA_RW_ACCESSED,
            true,
            0,
            true,
            false,
            true,
            Granularity::KByte,
        );
        let tr_rights = SegmentAccessRights::new(
            seg_type::TSS_BUSY,
            false,
            0,
            true,
            false,
            false,
            Granularity::Byte,
        );
        let ldtr_rights = SegmentAccessRights::new(
            seg_type::LDT,
            false,
            0,
            true,
            false,
            false,
            Granularity::Byte,
        );

        for (sel, base, limit, rights) in [
            (
                GuestField16::CS_SELECTOR,
                GuestField64::CS_BASE,
                GuestField32::CS_LIMIT,
                GuestField32::CS_ACCESS_RIGHTS,
            ),
            (
                GuestField16::SS_SELECTOR,
                GuestField64::SS_BASE,
                GuestField32::SS_LIMIT,
                GuestField32::SS_ACCESS_RIGHTS,
            ),
            (
                GuestField16::DS_SELECTOR,
                GuestField64::DS_BASE,
                GuestField32::DS_LIMIT,
                GuestField32::DS_ACCESS_RIGHTS,
            ),
            (
                GuestField16::ES_SELECTOR,
                GuestField64::ES_BASE,
                GuestField32::ES_LIMIT,
                GuestField32::ES_ACCESS_RIGHTS,
            ),
            (
                GuestField16::FS_SELECTOR,
                GuestField64::FS_BASE,
                GuestField32::FS_LIMIT,
                GuestField32::FS_ACCESS_RIGHTS,
            ),
            (
                GuestField16::GS_SELECTOR,
                GuestField64::GS_BASE,
                GuestField32::GS_LIMIT,
                GuestField32::GS_ACCESS_RIGHTS,
            ),
        ] {
            sel.write(0)?;
            base.write(0)?;
            limit.write(0xFFFF_FFFF)?;
            let r = if sel == GuestField16::CS_SELECTOR {
                code_rights
            } else {
                data_rights
            };
            rights.write(r.bits())?;
        }

        GuestField16::TR_SELECTOR.write(0)?;
        GuestField64::TR_BASE.write(0)?;
        GuestField32::TR_LIMIT.write(0)?;
        GuestField32::TR_ACCESS_RIGHTS.write(tr_rights.bits())?;

        GuestField16::LDTR_SELECTOR.write(0)?;
        // Recognizable marker: nothing legitimate ever dereferences the
        // LDT of this guest.
        GuestField64::LDTR_BASE.write(0xDEAD00)?;
        GuestField32::LDTR_LIMIT.write(0)?;
        GuestField32::LDTR_ACCESS_RIGHTS.write(ldtr_rights.bits())?;

        GuestField64::GDTR_BASE.write(0)?;
        GuestField32::GDTR_LIMIT.write(0)?;
        GuestField64::IDTR_BASE.write(0)?;
        GuestField32::IDTR_LIMIT.write(0)?;

        GuestField64::RIP.write(GUEST_KERNEL_BASE)?;
        GuestField64::RSP.write(0)?;
        GuestField64::RFLAGS.write(0x2)?;
        self.guest_regs.rsi = GUEST_BOOTPARAM_ADDR;

        GuestField64::IA32_EFER.write(0)?;
        GuestField64::IA32_PAT.write(0x0007_0406_0007_0406)?;
        GuestField32::SYSENTER_CS.write(0)?;
        GuestField64::SYSENTER_ESP.write(0)?;
        GuestField64::SYSENTER_EIP.write(0)?;

        GuestField64::DR7.write(0x400)?;
        GuestField64::IA32_DEBUGCTL.write(0)?;

        GuestField32::ACTIVITY_STATE.write(0)?;
        GuestField32::INTERRUPTIBILITY_STATE.write(0)?;
        GuestField64::PENDING_DBG_EXCEPTIONS.write(0)?;
        GuestField64::VMCS_LINK_POINTER.write(u64::MAX)?;
        Ok(())
    }
}

/// VMCS `HOST_RSP` recorder, called from `asm_vm_entry` with the stack
/// pointer the exit path must resume on.
extern "sysv64" fn record_host_rsp(rsp: u64) {
    HostField64::RSP
        .write(rsp)
        .expect("failed to record HOST_RSP");
}

// The two trampolines below share one stack-frame contract:
//
//     [rsp+0x38]  return address        (pushed by asm_vm_entry's caller)
//     [rsp+0x30]  saved rbp            \
//     [rsp+0x28]  saved rbx             |  callee-saved registers,
//     [rsp+0x20]  saved r12             |  restored in mirror order by
//     [rsp+0x18]  saved r13             |  BOTH return paths
//     [rsp+0x10]  saved r14             |
//     [rsp+0x08]  saved r15            /
//     [rsp+0x00]  vcpu pointer          <- value recorded in HOST_RSP
//
// asm_vm_entry builds the frame and enters the guest; the CPU rewinds RSP
// to the recorded value on every VM exit and jumps to asm_vm_exit, which
// unwinds the same frame and returns 0 to asm_vm_entry's caller. The
// VMLAUNCH/VMRESUME fall-through unwinds it too and returns 1. Any change
// here must keep all three paths in lockstep.

const VCPU_REGS: usize = offset_of!(Vcpu, guest_regs);
const VCPU_LAUNCH_DONE: usize = offset_of!(Vcpu, launch_done);

/// Enter the guest. Returns 0 when a VM exit brought control back, 1 when
/// VMLAUNCH/VMRESUME itself failed.
#[unsafe(naked)]
unsafe extern "sysv64" fn asm_vm_entry(vcpu: *mut Vcpu) -> u64 {
    core::arch::naked_asm!(
        // Callee-saved registers of the host ABI.
        "push rbp",
        "push rbx",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        // The vCPU pointer is the exit path's handle to the save area.
        "push rdi",
        // Record this exact stack position in HOST_RSP.
        "mov rdi, rsp",
        "call {record_host_rsp}",
        "mov rdi, [rsp]",
        // Pick VMLAUNCH or VMRESUME; the flag must be read before guest
        // values occupy the registers.
        "cmp byte ptr [rdi + {launch_done}], 0",
        // Load the fifteen guest GPRs. RSP comes from GUEST_RSP, RDI last.
        "mov rax, [rdi + {regs} + 0x00]",
        "mov rcx, [rdi + {regs} + 0x08]",
        "mov rdx, [rdi + {regs} + 0x10]",
        "mov rbx, [rdi + {regs} + 0x18]",
        "mov rbp, [rdi + {regs} + 0x20]",
        "mov rsi, [rdi + {regs} + 0x28]",
        "mov r8,  [rdi + {regs} + 0x38]",
        "mov r9,  [rdi + {regs} + 0x40]",
        "mov r10, [rdi + {regs} + 0x48]",
        "mov r11, [rdi + {regs} + 0x50]",
        "mov r12, [rdi + {regs} + 0x58]",
        "mov r13, [rdi + {regs} + 0x60]",
        "mov r14, [rdi + {regs} + 0x68]",
        "mov r15, [rdi + {regs} + 0x70]",
        "mov rdi, [rdi + {regs} + 0x30]",
        "je 2f",
        "vmresume",
        "jmp 3f",
        "2: vmlaunch",
        "3:",
        // Entry failure falls through here. Unwind the shared frame and
        // hand the caller a nonzero status.
        "add rsp, 8",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop rbx",
        "pop rbp",
        "mov rax, 1",
        "ret",
        record_host_rsp = sym record_host_rsp,
        launch_done = const VCPU_LAUNCH_DONE,
        regs = const VCPU_REGS,
    )
}

/// VM-exit landing point (`HOST_RIP`). Entered with RSP already rewound
/// to the value `asm_vm_entry` recorded.
#[unsafe(naked)]
unsafe extern "sysv64" fn asm_vm_exit() -> ! {
    core::arch::naked_asm!(
        // Free a register, then recover the vCPU pointer parked by the
        // entry path right below the recorded RSP.
        "push rax",
        "mov rax, [rsp + 8]",
        // Spill the guest GPRs into the save area.
        "mov [rax + {regs} + 0x08], rcx",
        "mov [rax + {regs} + 0x10], rdx",
        "mov [rax + {regs} + 0x18], rbx",
        "mov [rax + {regs} + 0x20], rbp",
        "mov [rax + {regs} + 0x28], rsi",
        "mov [rax + {regs} + 0x30], rdi",
        "mov [rax + {regs} + 0x38], r8",
        "mov [rax + {regs} + 0x40], r9",
        "mov [rax + {regs} + 0x48], r10",
        "mov [rax + {regs} + 0x50], r11",
        "mov [rax + {regs} + 0x58], r12",
        "mov [rax + {regs} + 0x60], r13",
        "mov [rax + {regs} + 0x68], r14",
        "mov [rax + {regs} + 0x70], r15",
        "pop rcx",
        "mov [rax + {regs} + 0x00], rcx",
        // Drop the vCPU pointer, restore callee-saved registers in the
        // mirror order of asm_vm_entry, and return 0 to its caller.
        "add rsp, 8",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop rbx",
        "pop rbp",
        "xor eax, eax",
        "ret",
        regs = const VCPU_REGS,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_area_sits_at_the_front_of_the_vcpu() {
        // The trampoline displacement constants bake in this layout.
        assert_eq!(VCPU_REGS, 0);
        assert_eq!(VCPU_LAUNCH_DONE, core::mem::size_of::<GeneralRegisters>());
    }

    #[test]
    fn trampoline_displacements_match_the_register_block() {
        assert_eq!(offset_of!(GeneralRegisters, rax), 0x00);
        assert_eq!(offset_of!(GeneralRegisters, rcx), 0x08);
        assert_eq!(offset_of!(GeneralRegisters, rdx), 0x10);
        assert_eq!(offset_of!(GeneralRegisters, rbx), 0x18);
        assert_eq!(offset_of!(GeneralRegisters, rbp), 0x20);
        assert_eq!(offset_of!(GeneralRegisters, rsi), 0x28);
        assert_eq!(offset_of!(GeneralRegisters, rdi), 0x30);
        assert_eq!(offset_of!(GeneralRegisters, r8), 0x38);
        assert_eq!(offset_of!(GeneralRegisters, r15), 0x70);
    }
}
