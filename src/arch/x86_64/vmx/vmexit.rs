//! VM-exit dispatch and the per-reason handlers.

use raw_cpuid::cpuid;
use x86::msr::{
    IA32_APIC_BASE, IA32_BIOS_SIGN_ID, IA32_CSTAR, IA32_EFER, IA32_FMASK, IA32_FS_BASE,
    IA32_GS_BASE, IA32_KERNEL_GSBASE, IA32_LSTAR, IA32_MISC_ENABLE, IA32_MTRRCAP,
    IA32_MTRR_DEF_TYPE, IA32_PAT, IA32_PLATFORM_ID, IA32_STAR, IA32_SYSENTER_CS,
    IA32_SYSENTER_EIP, IA32_SYSENTER_ESP, IA32_VMX_CR0_FIXED0, IA32_VMX_CR0_FIXED1,
    IA32_VMX_CR4_FIXED0, IA32_VMX_CR4_FIXED1, MSR_PLATFORM_INFO,
};
use x86::msr::rdmsr;

use vtx::flags::EntryControls;
use vtx::vmcs::{
    ControlField32, ControlField64, CrAccessType, CrQualification, EptViolationQualification,
    ExitInfo, GuestField64, IoQualification, ReadOnlyField64,
};
use vtx::ExitReason;

use super::vcpu::Vcpu;
use crate::error::HvResult;

const CR0_PE: u64 = 1 << 0;
const CR0_PG: u64 = 1 << 31;
const EFER_LME: u64 = 1 << 8;
const EFER_LMA: u64 = 1 << 10;

/// CPUID leaf 1 ECX: VMX.
const CPUID_FEATURE_VMX: u64 = 1 << 5;
/// CPUID leaf 1 ECX: running under a hypervisor.
const CPUID_FEATURE_HYPERVISOR: u64 = 1 << 31;

const HYPERVISOR_CPUID_BASE: u32 = 0x4000_0000;
const HYPERVISOR_SIGNATURE: &[u8; 12] = b"VALKYRIEVMM\0";

impl Vcpu {
    /// Dispatch one VM exit. `Err` is reserved for VMCS access failures;
    /// guest conditions this design cannot carry on from panic with a
    /// dump instead.
    pub fn handle_exit(&mut self) -> HvResult {
        let exit_info = ExitInfo::capture()?;
        trace!("VM exit: {:x?}", exit_info);

        if exit_info.reason.is_entry_failure() {
            self.dump_state();
            panic!(
                "VM entry failed: {:?} (qualification {:#x})",
                exit_info.reason.basic(),
                ReadOnlyField64::EXIT_QUALIFICATION.read()?
            );
        }

        match exit_info.reason.basic() {
            Ok(ExitReason::CPUID) => self.handle_cpuid(),
            Ok(ExitReason::MSR_READ) => self.handle_msr_read(),
            Ok(ExitReason::MSR_WRITE) => self.handle_msr_write(),
            Ok(ExitReason::CR_ACCESS) => self.handle_cr_access(),
            Ok(ExitReason::IO_INSTRUCTION) => self.handle_io(),
            Ok(ExitReason::EPT_VIOLATION) => self.handle_ept_violation(),
            Ok(ExitReason::TRIPLE_FAULT) => {
                self.dump_state();
                panic!("guest triple fault @ RIP {:#x}", exit_info.guest_rip);
            }
            Ok(reason) => {
                self.dump_state();
                panic!(
                    "unhandled VM exit: {:?} @ RIP {:#x}",
                    reason, exit_info.guest_rip
                );
            }
            Err(raw) => {
                self.dump_state();
                panic!("unknown VM exit reason {:#x}", raw);
            }
        }
    }

    /// CPUID passthrough with three edits: the VMX feature is hidden, the
    /// hypervisor-present bit is set, and the hypervisor leaf range
    /// carries this hypervisor's signature.
    fn handle_cpuid(&mut self) -> HvResult {
        let leaf = self.regs().rax as u32;
        let subleaf = self.regs().rcx as u32;
        let regs = self.regs_mut();
        match leaf {
            HYPERVISOR_CPUID_BASE => {
                regs.rax = HYPERVISOR_CPUID_BASE as u64 + 1;
                regs.rbx = u32::from_le_bytes(HYPERVISOR_SIGNATURE[0..4].try_into().unwrap()) as u64;
                regs.rcx = u32::from_le_bytes(HYPERVISOR_SIGNATURE[4..8].try_into().unwrap()) as u64;
                regs.rdx =
                    u32::from_le_bytes(HYPERVISOR_SIGNATURE[8..12].try_into().unwrap()) as u64;
            }
            0x4000_0001..=0x4FFF_FFFF => {
                regs.rax = 0;
                regs.rbx = 0;
                regs.rcx = 0;
                regs.rdx = 0;
            }
            _ => {
                let res = cpuid!(leaf, subleaf);
                regs.rax = res.eax as u64;
                regs.rbx = res.ebx as u64;
                regs.rcx = res.ecx as u64;
                regs.rdx = res.edx as u64;
                if leaf == 1 {
                    regs.rcx &= !CPUID_FEATURE_VMX;
                    regs.rcx |= CPUID_FEATURE_HYPERVISOR;
                }
            }
        }
        self.step_next_inst()
    }

    /// Synthetic MSR reads. EFER comes from the VMCS (kept current by the
    /// save-EFER exit control); the rest are either virtualized flat
    /// values or harmless zeros.
    fn handle_msr_read(&mut self) -> HvResult {
        let msr = self.regs().rcx as u32;
        let value = match msr {
            IA32_EFER => GuestField64::IA32_EFER.read()?,
            IA32_FS_BASE => GuestField64::FS_BASE.read()?,
            IA32_GS_BASE => GuestField64::GS_BASE.read()?,
            IA32_SYSENTER_CS => vtx::vmcs::GuestField32::SYSENTER_CS.read()? as u64,
            IA32_SYSENTER_ESP => GuestField64::SYSENTER_ESP.read()?,
            IA32_SYSENTER_EIP => GuestField64::SYSENTER_EIP.read()?,
            IA32_PAT => GuestField64::IA32_PAT.read()?,
            // xAPIC at the architectural base, this CPU is the BSP.
            IA32_APIC_BASE => 0xFEE0_0000 | (1 << 11) | (1 << 8),
            IA32_MISC_ENABLE | IA32_PLATFORM_ID | IA32_BIOS_SIGN_ID | IA32_MTRRCAP
            | IA32_MTRR_DEF_TYPE | MSR_PLATFORM_INFO => 0,
            _ => {
                warn!("RDMSR({:#x}): unknown, returning 0", msr);
                0
            }
        };
        let regs = self.regs_mut();
        regs.rax = value & 0xFFFF_FFFF;
        regs.rdx = value >> 32;
        self.step_next_inst()
    }

    /// Synthetic MSR writes. Only EFER changes guest-visible state; the
    /// boot-noise MSRs are accepted and dropped.
    fn handle_msr_write(&mut self) -> HvResult {
        let msr = self.regs().rcx as u32;
        let value = (self.regs().rax & 0xFFFF_FFFF) | (self.regs().rdx << 32);
        match msr {
            IA32_EFER => {
                GuestField64::IA32_EFER.write(value & !EFER_LMA)?;
                self.update_long_mode()?;
            }
            IA32_FS_BASE => GuestField64::FS_BASE.write(value)?,
            IA32_GS_BASE => GuestField64::GS_BASE.write(value)?,
            IA32_SYSENTER_ESP => GuestField64::SYSENTER_ESP.write(value)?,
            IA32_SYSENTER_EIP => GuestField64::SYSENTER_EIP.write(value)?,
            IA32_PAT => GuestField64::IA32_PAT.write(value)?,
            IA32_MISC_ENABLE | IA32_MTRR_DEF_TYPE | IA32_BIOS_SIGN_ID | IA32_APIC_BASE
            | IA32_STAR | IA32_LSTAR | IA32_CSTAR | IA32_FMASK | IA32_KERNEL_GSBASE => {
                debug!("WRMSR({:#x}) <- {:#x}: ignored", msr, value);
            }
            _ => {
                warn!("WRMSR({:#x}) <- {:#x}: unknown, ignored", msr, value);
            }
        }
        self.step_next_inst()
    }

    /// Control-register exits. Every CR0/CR4 bit is masked, so each guest
    /// write lands here; MOV from CR never exits for those registers
    /// (reads are served by the shadows).
    fn handle_cr_access(&mut self) -> HvResult {
        let qual = CrQualification::new(ReadOnlyField64::EXIT_QUALIFICATION.read()?);
        match qual.access_type() {
            CrAccessType::MovToCr => {
                let value = self.gpr(qual.gpr())?;
                match qual.cr() {
                    0 => self.set_guest_cr0(value)?,
                    3 => GuestField64::CR3.write(value)?,
                    4 => self.set_guest_cr4(value)?,
                    cr => {
                        self.dump_state();
                        panic!("unsupported MOV to CR{}", cr);
                    }
                }
            }
            CrAccessType::MovFromCr => {
                let value = match qual.cr() {
                    3 => GuestField64::CR3.read()?,
                    cr => {
                        self.dump_state();
                        panic!("unsupported MOV from CR{}", cr);
                    }
                };
                self.set_gpr(qual.gpr(), value)?;
            }
            // Not decoded in this design; a guest that needs them gets a
            // loud stop instead of silently wrong CR state.
            CrAccessType::Clts | CrAccessType::Lmsw => {
                self.dump_state();
                panic!("unsupported CR access type {:?}", qual.access_type());
            }
        }
        self.step_next_inst()
    }

    fn set_guest_cr0(&mut self, value: u64) -> HvResult {
        // Unrestricted guests choose PE and PG freely; every other
        // fixed-bit stays owned by hardware.
        let fixed0 = unsafe { rdmsr(IA32_VMX_CR0_FIXED0) } & !(CR0_PE | CR0_PG);
        let fixed1 = unsafe { rdmsr(IA32_VMX_CR0_FIXED1) };
        GuestField64::CR0.write((value | fixed0) & fixed1)?;
        ControlField64::CR0_READ_SHADOW.write(value)?;
        self.update_long_mode()
    }

    fn set_guest_cr4(&mut self, value: u64) -> HvResult {
        const CR4_VMXE: u64 = 1 << 13;
        let fixed0 = unsafe { rdmsr(IA32_VMX_CR4_FIXED0) };
        let fixed1 = unsafe { rdmsr(IA32_VMX_CR4_FIXED1) };
        GuestField64::CR4.write(((value | fixed0) & fixed1) | CR4_VMXE)?;
        ControlField64::CR4_READ_SHADOW.write(value)?;
        Ok(())
    }

    /// Track the guest's IA-32e transition: when paging turns on with
    /// EFER.LME set, VM entries must run the guest in long mode and
    /// EFER.LMA must read back as set. The reverse holds when paging
    /// goes off.
    fn update_long_mode(&mut self) -> HvResult {
        let cr0 = GuestField64::CR0.read()?;
        let efer = GuestField64::IA32_EFER.read()?;
        let long = cr0 & CR0_PG != 0 && efer & EFER_LME != 0;

        let entry = ControlField32::ENTRY_CONTROLS.read()?;
        let ia32e = EntryControls::IA32E_MODE_GUEST.bits();
        ControlField32::ENTRY_CONTROLS.write(if long { entry | ia32e } else { entry & !ia32e })?;
        GuestField64::IA32_EFER.write(if long {
            efer | EFER_LMA
        } else {
            efer & !EFER_LMA
        })?;
        if long {
            debug!("guest switched to IA-32e mode");
        }
        Ok(())
    }

    /// Unconditional I/O exiting is on and nothing emulates devices yet,
    /// so decode the access for the post-mortem and stop.
    fn handle_io(&mut self) -> HvResult {
        let qual = IoQualification::new(ReadOnlyField64::EXIT_QUALIFICATION.read()?);
        self.dump_state();
        panic!(
            "I/O emulation not implemented: {} port {:#x}, size {}{}{}",
            if qual.is_in() { "IN" } else { "OUT" },
            qual.port(),
            qual.size(),
            if qual.is_string() { ", string" } else { "" },
            if qual.is_rep() { ", rep" } else { "" },
        );
    }

    /// EPT violations are fatal: guest RAM is mapped up front, so any
    /// miss is a hypervisor bug or a guest access outside its window.
    fn handle_ept_violation(&mut self) -> HvResult {
        let qual = EptViolationQualification::new(ReadOnlyField64::EXIT_QUALIFICATION.read()?);
        let gpa = ReadOnlyField64::GUEST_PHYSICAL_ADDRESS.read()?;
        error!(
            "EPT violation @ GPA {:#x}: read={} write={} fetch={} (mapped r={} w={} x={})",
            gpa,
            qual.read_access(),
            qual.write_access(),
            qual.instruction_fetch(),
            qual.was_readable(),
            qual.was_writable(),
            qual.was_executable(),
        );
        if qual.linear_address_valid() {
            error!(
                "  guest linear address {:#x}",
                ReadOnlyField64::GUEST_LINEAR_ADDRESS.read()?
            );
        }
        self.dump_state();
        panic!("EPT violation");
    }
}
