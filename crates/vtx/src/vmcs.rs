//! VMCS field encodings (SDM Vol 3D, Appendix B) and typed accessors.
//!
//! Natural-width fields are folded into the 64-bit enums; this code only
//! ever runs in IA-32e mode where both are 64 bits wide.
//!
//! Every read/write funnels through [`crate::instructions`], so the CF/ZF
//! outcome of the underlying VMREAD/VMWRITE always surfaces as a
//! [`crate::VmxError`].

use bit_field::BitField;

use crate::definitions::{RawExitReason, VmxInstructionError};
use crate::instructions::{vmclear, vmptrld, vmread, vmwrite};
use crate::{Result, VmxError};

macro_rules! vmcs_fields {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident: $width:ty, $access:tt {
            $($field:ident = $encoding:expr,)+
        }
    ) => {
        $(#[$meta])*
        #[repr(u32)]
        #[allow(non_camel_case_types, clippy::upper_case_acronyms)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        $vis enum $name {
            $($field = $encoding,)+
        }

        impl $name {
            #[allow(dead_code)]
            pub fn read(self) -> Result<$width> {
                unsafe { vmread(self as u32).map(|v| v as $width) }
            }

            vmcs_fields!(@write $width, $access);
        }
    };
    (@write $width:ty, RW) => {
        pub fn write(self, value: $width) -> Result {
            unsafe { vmwrite(self as u32, value as u64) }
        }
    };
    (@write $width:ty, R) => {};
}

vmcs_fields! {
    /// 16-bit guest-state fields.
    pub enum GuestField16: u16, RW {
        ES_SELECTOR = 0x0800,
        CS_SELECTOR = 0x0802,
        SS_SELECTOR = 0x0804,
        DS_SELECTOR = 0x0806,
        FS_SELECTOR = 0x0808,
        GS_SELECTOR = 0x080a,
        LDTR_SELECTOR = 0x080c,
        TR_SELECTOR = 0x080e,
    }
}

vmcs_fields! {
    /// 16-bit host-state fields.
    pub enum HostField16: u16, RW {
        ES_SELECTOR = 0x0c00,
        CS_SELECTOR = 0x0c02,
        SS_SELECTOR = 0x0c04,
        DS_SELECTOR = 0x0c06,
        FS_SELECTOR = 0x0c08,
        GS_SELECTOR = 0x0c0a,
        TR_SELECTOR = 0x0c0c,
    }
}

vmcs_fields! {
    /// 32-bit control fields.
    pub enum ControlField32: u32, RW {
        PIN_BASED_EXEC_CONTROLS = 0x4000,
        PRIMARY_PROC_BASED_EXEC_CONTROLS = 0x4002,
        EXCEPTION_BITMAP = 0x4004,
        PAGE_FAULT_ERROR_CODE_MASK = 0x4006,
        PAGE_FAULT_ERROR_CODE_MATCH = 0x4008,
        CR3_TARGET_COUNT = 0x400a,
        EXIT_CONTROLS = 0x400c,
        EXIT_MSR_STORE_COUNT = 0x400e,
        EXIT_MSR_LOAD_COUNT = 0x4010,
        ENTRY_CONTROLS = 0x4012,
        ENTRY_MSR_LOAD_COUNT = 0x4014,
        ENTRY_INTERRUPTION_INFO = 0x4016,
        ENTRY_EXCEPTION_ERROR_CODE = 0x4018,
        ENTRY_INSTRUCTION_LENGTH = 0x401a,
        TPR_THRESHOLD = 0x401c,
        SECONDARY_PROC_BASED_EXEC_CONTROLS = 0x401e,
    }
}

vmcs_fields! {
    /// 32-bit guest-state fields.
    pub enum GuestField32: u32, RW {
        ES_LIMIT = 0x4800,
        CS_LIMIT = 0x4802,
        SS_LIMIT = 0x4804,
        DS_LIMIT = 0x4806,
        FS_LIMIT = 0x4808,
        GS_LIMIT = 0x480a,
        LDTR_LIMIT = 0x480c,
        TR_LIMIT = 0x480e,
        GDTR_LIMIT = 0x4810,
        IDTR_LIMIT = 0x4812,
        ES_ACCESS_RIGHTS = 0x4814,
        CS_ACCESS_RIGHTS = 0x4816,
        SS_ACCESS_RIGHTS = 0x4818,
        DS_ACCESS_RIGHTS = 0x481a,
        FS_ACCESS_RIGHTS = 0x481c,
        GS_ACCESS_RIGHTS = 0x481e,
        LDTR_ACCESS_RIGHTS = 0x4820,
        TR_ACCESS_RIGHTS = 0x4822,
        INTERRUPTIBILITY_STATE = 0x4824,
        ACTIVITY_STATE = 0x4826,
        SMBASE = 0x4828,
        SYSENTER_CS = 0x482a,
        PREEMPTION_TIMER_VALUE = 0x482e,
    }
}

vmcs_fields! {
    /// 32-bit host-state fields.
    pub enum HostField32: u32, RW {
        SYSENTER_CS = 0x4c00,
    }
}

vmcs_fields! {
    /// 32-bit read-only data fields.
    pub enum ReadOnlyField32: u32, R {
        VM_INSTRUCTION_ERROR = 0x4400,
        EXIT_REASON = 0x4402,
        EXIT_INTERRUPTION_INFO = 0x4404,
        EXIT_INTERRUPTION_ERROR_CODE = 0x4406,
        IDT_VECTORING_INFO = 0x4408,
        IDT_VECTORING_ERROR_CODE = 0x440a,
        EXIT_INSTRUCTION_LENGTH = 0x440c,
        EXIT_INSTRUCTION_INFO = 0x440e,
    }
}

vmcs_fields! {
    /// 64-bit and natural-width control fields.
    pub enum ControlField64: u64, RW {
        IO_BITMAP_A = 0x2000,
        IO_BITMAP_B = 0x2002,
        MSR_BITMAP = 0x2004,
        EXIT_MSR_STORE_ADDR = 0x2006,
        EXIT_MSR_LOAD_ADDR = 0x2008,
        ENTRY_MSR_LOAD_ADDR = 0x200a,
        TSC_OFFSET = 0x2010,
        EPT_POINTER = 0x201a,
        CR0_GUEST_HOST_MASK = 0x6000,
        CR4_GUEST_HOST_MASK = 0x6002,
        CR0_READ_SHADOW = 0x6004,
        CR4_READ_SHADOW = 0x6006,
    }
}

vmcs_fields! {
    /// 64-bit and natural-width guest-state fields.
    pub enum GuestField64: u64, RW {
        VMCS_LINK_POINTER = 0x2800,
        IA32_DEBUGCTL = 0x2802,
        IA32_PAT = 0x2804,
        IA32_EFER = 0x2806,
        IA32_PERF_GLOBAL_CTRL = 0x2808,
        CR0 = 0x6800,
        CR3 = 0x6802,
        CR4 = 0x6804,
        ES_BASE = 0x6806,
        CS_BASE = 0x6808,
        SS_BASE = 0x680a,
        DS_BASE = 0x680c,
        FS_BASE = 0x680e,
        GS_BASE = 0x6810,
        LDTR_BASE = 0x6812,
        TR_BASE = 0x6814,
        GDTR_BASE = 0x6816,
        IDTR_BASE = 0x6818,
        DR7 = 0x681a,
        RSP = 0x681c,
        RIP = 0x681e,
        RFLAGS = 0x6820,
        PENDING_DBG_EXCEPTIONS = 0x6822,
        SYSENTER_ESP = 0x6824,
        SYSENTER_EIP = 0x6826,
    }
}

vmcs_fields! {
    /// 64-bit and natural-width host-state fields.
    pub enum HostField64: u64, RW {
        IA32_PAT = 0x2c00,
        IA32_EFER = 0x2c02,
        IA32_PERF_GLOBAL_CTRL = 0x2c04,
        CR0 = 0x6c00,
        CR3 = 0x6c02,
        CR4 = 0x6c04,
        FS_BASE = 0x6c06,
        GS_BASE = 0x6c08,
        TR_BASE = 0x6c0a,
        GDTR_BASE = 0x6c0c,
        IDTR_BASE = 0x6c0e,
        SYSENTER_ESP = 0x6c10,
        SYSENTER_EIP = 0x6c12,
        RSP = 0x6c14,
        RIP = 0x6c16,
    }
}

vmcs_fields! {
    /// 64-bit and natural-width read-only data fields.
    pub enum ReadOnlyField64: u64, R {
        GUEST_PHYSICAL_ADDRESS = 0x2400,
        EXIT_QUALIFICATION = 0x6400,
        IO_RCX = 0x6402,
        IO_RSI = 0x6404,
        IO_RDI = 0x6406,
        IO_RIP = 0x6408,
        GUEST_LINEAR_ADDRESS = 0x640a,
    }
}

/// Operations on the current VMCS.
pub struct Vmcs;

impl Vmcs {
    /// VMCLEAR the region at `paddr`.
    pub fn clear(paddr: u64) -> Result {
        unsafe { vmclear(paddr) }
    }

    /// VMPTRLD the region at `paddr`, making it current.
    pub fn load(paddr: u64) -> Result {
        unsafe { vmptrld(paddr) }
    }

    /// Decode `VM_INSTRUCTION_ERROR` from the current VMCS.
    pub fn instruction_error() -> Result<core::result::Result<VmxInstructionError, u32>> {
        Ok(VmxInstructionError::try_from(
            ReadOnlyField32::VM_INSTRUCTION_ERROR.read()?,
        ))
    }

    /// Write a control field after adjusting `desired` against its
    /// capability MSR value. Errors with [`VmxError::StatusAvailable`]
    /// if a desired bit is not in the allowed-1 set, rather than letting
    /// the next VM entry fail with a less specific code.
    pub fn set_control(field: ControlField32, capability: u64, desired: u32) -> Result {
        let value = crate::flags::adjust_controls(desired, capability);
        if desired & !value != 0 {
            return Err(VmxError::StatusAvailable);
        }
        field.write(value)
    }
}

/// Summary of the current VM exit, gathered from the read-only fields.
#[derive(Debug, Clone, Copy)]
pub struct ExitInfo {
    pub reason: RawExitReason,
    pub instruction_length: u32,
    pub guest_rip: u64,
}

impl ExitInfo {
    pub fn capture() -> Result<Self> {
        Ok(Self {
            reason: RawExitReason::new(ReadOnlyField32::EXIT_REASON.read()?),
            instruction_length: ReadOnlyField32::EXIT_INSTRUCTION_LENGTH.read()?,
            guest_rip: GuestField64::RIP.read()?,
        })
    }
}

/// Exit qualification for I/O instruction exits (SDM Vol 3C, Table 28-5).
#[derive(Debug, Clone, Copy)]
pub struct IoQualification(u64);

impl IoQualification {
    pub const fn new(bits: u64) -> Self {
        Self(bits)
    }

    /// Access width in bytes (1, 2 or 4).
    pub fn size(&self) -> u8 {
        self.0.get_bits(0..3) as u8 + 1
    }

    /// `true` for IN/INS, `false` for OUT/OUTS.
    pub fn is_in(&self) -> bool {
        self.0.get_bit(3)
    }

    pub fn is_string(&self) -> bool {
        self.0.get_bit(4)
    }

    pub fn is_rep(&self) -> bool {
        self.0.get_bit(5)
    }

    /// `true` when the port came from an immediate operand, `false` for DX.
    pub fn is_immediate(&self) -> bool {
        self.0.get_bit(6)
    }

    pub fn port(&self) -> u16 {
        self.0.get_bits(16..32) as u16
    }
}

/// Access type of a control-register exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrAccessType {
    MovToCr,
    MovFromCr,
    Clts,
    Lmsw,
}

/// Exit qualification for control-register accesses (SDM Vol 3C,
/// Table 28-3).
#[derive(Debug, Clone, Copy)]
pub struct CrQualification(u64);

impl CrQualification {
    pub const fn new(bits: u64) -> Self {
        Self(bits)
    }

    /// Number of the control register (0, 3, 4, or 8).
    pub fn cr(&self) -> u8 {
        self.0.get_bits(0..4) as u8
    }

    pub fn access_type(&self) -> CrAccessType {
        match self.0.get_bits(4..6) {
            0 => CrAccessType::MovToCr,
            1 => CrAccessType::MovFromCr,
            2 => CrAccessType::Clts,
            _ => CrAccessType::Lmsw,
        }
    }

    /// General-purpose register operand of a MOV CR, in the SDM's 0..16
    /// encoding (4 = RSP).
    pub fn gpr(&self) -> u8 {
        self.0.get_bits(8..12) as u8
    }

    pub fn lmsw_source(&self) -> u16 {
        self.0.get_bits(16..32) as u16
    }
}

/// Exit qualification for EPT violations (SDM Vol 3C, Table 28-7).
#[derive(Debug, Clone, Copy)]
pub struct EptViolationQualification(u64);

impl EptViolationQualification {
    pub const fn new(bits: u64) -> Self {
        Self(bits)
    }

    pub fn read_access(&self) -> bool {
        self.0.get_bit(0)
    }

    pub fn write_access(&self) -> bool {
        self.0.get_bit(1)
    }

    pub fn instruction_fetch(&self) -> bool {
        self.0.get_bit(2)
    }

    /// The guest-physical address was readable/writable/executable under
    /// the EPT paging structures.
    pub fn was_readable(&self) -> bool {
        self.0.get_bit(3)
    }

    pub fn was_writable(&self) -> bool {
        self.0.get_bit(4)
    }

    pub fn was_executable(&self) -> bool {
        self.0.get_bit(5)
    }

    /// A guest linear address is recorded in `GUEST_LINEAR_ADDRESS`.
    pub fn linear_address_valid(&self) -> bool {
        self.0.get_bit(7)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_encodings_match_the_sdm() {
        assert_eq!(GuestField16::CS_SELECTOR as u32, 0x0802);
        assert_eq!(HostField16::TR_SELECTOR as u32, 0x0c0c);
        assert_eq!(ControlField32::SECONDARY_PROC_BASED_EXEC_CONTROLS as u32, 0x401e);
        assert_eq!(GuestField32::TR_ACCESS_RIGHTS as u32, 0x4822);
        assert_eq!(ReadOnlyField32::EXIT_REASON as u32, 0x4402);
        assert_eq!(ControlField64::EPT_POINTER as u32, 0x201a);
        assert_eq!(GuestField64::VMCS_LINK_POINTER as u32, 0x2800);
        assert_eq!(GuestField64::RIP as u32, 0x681e);
        assert_eq!(HostField64::RIP as u32, 0x6c16);
        assert_eq!(ReadOnlyField64::EXIT_QUALIFICATION as u32, 0x6400);
    }

    #[test]
    fn io_qualification_decodes() {
        // OUT imm8 (port 0x3f8), 1 byte.
        let q = IoQualification::new((0x3f8 << 16) | (1 << 6));
        assert_eq!(q.size(), 1);
        assert!(!q.is_in());
        assert!(!q.is_string());
        assert!(q.is_immediate());
        assert_eq!(q.port(), 0x3f8);

        // IN DX, 4 bytes.
        let q = IoQualification::new((0x1f0 << 16) | (1 << 3) | 3);
        assert_eq!(q.size(), 4);
        assert!(q.is_in());
        assert!(!q.is_immediate());
        assert_eq!(q.port(), 0x1f0);
    }

    #[test]
    fn cr_qualification_decodes() {
        // MOV CR0, RBX
        let q = CrQualification::new((3 << 8) | (0 << 4));
        assert_eq!(q.cr(), 0);
        assert_eq!(q.access_type(), CrAccessType::MovToCr);
        assert_eq!(q.gpr(), 3);

        // MOV RAX, CR4
        let q = CrQualification::new(4 | (1 << 4));
        assert_eq!(q.cr(), 4);
        assert_eq!(q.access_type(), CrAccessType::MovFromCr);
        assert_eq!(q.gpr(), 0);

        // LMSW with source operand 0x11
        let q = CrQualification::new((3 << 4) | (0x11 << 16));
        assert_eq!(q.access_type(), CrAccessType::Lmsw);
        assert_eq!(q.lmsw_source(), 0x11);
    }

    #[test]
    fn ept_violation_qualification_decodes() {
        let q = EptViolationQualification::new(0b1000_0010);
        assert!(!q.read_access());
        assert!(q.write_access());
        assert!(!q.instruction_fetch());
        assert!(!q.was_writable());
        assert!(q.linear_address_valid());
    }
}
