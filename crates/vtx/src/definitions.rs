//! SDM-defined enumerations: basic VM-exit reasons (Vol 3D, Appendix C)
//! and VM-instruction error numbers (Vol 3C §31.4).

use numeric_enum_macro::numeric_enum;

numeric_enum! {
    #[repr(u16)]
    #[allow(non_camel_case_types)]
    #[derive(Debug, PartialEq, Eq, Clone, Copy)]
    pub enum ExitReason {
        EXCEPTION_NMI = 0,
        EXTERNAL_INTERRUPT = 1,
        TRIPLE_FAULT = 2,
        INIT_SIGNAL = 3,
        SIPI = 4,
        IO_SMI = 5,
        OTHER_SMI = 6,
        INTERRUPT_WINDOW = 7,
        NMI_WINDOW = 8,
        TASK_SWITCH = 9,
        CPUID = 10,
        GETSEC = 11,
        HLT = 12,
        INVD = 13,
        INVLPG = 14,
        RDPMC = 15,
        RDTSC = 16,
        RSM = 17,
        VMCALL = 18,
        VMCLEAR = 19,
        VMLAUNCH = 20,
        VMPTRLD = 21,
        VMPTRST = 22,
        VMREAD = 23,
        VMRESUME = 24,
        VMWRITE = 25,
        VMXOFF = 26,
        VMXON = 27,
        CR_ACCESS = 28,
        DR_ACCESS = 29,
        IO_INSTRUCTION = 30,
        MSR_READ = 31,
        MSR_WRITE = 32,
        INVALID_GUEST_STATE = 33,
        MSR_LOAD_FAIL = 34,
        MWAIT = 36,
        MONITOR_TRAP_FLAG = 37,
        MONITOR = 39,
        PAUSE = 40,
        MCE_DURING_ENTRY = 41,
        TPR_BELOW_THRESHOLD = 43,
        APIC_ACCESS = 44,
        VIRTUALIZED_EOI = 45,
        GDTR_IDTR_ACCESS = 46,
        LDTR_TR_ACCESS = 47,
        EPT_VIOLATION = 48,
        EPT_MISCONFIG = 49,
        INVEPT = 50,
        RDTSCP = 51,
        PREEMPTION_TIMER = 52,
        INVVPID = 53,
        WBINVD = 54,
        XSETBV = 55,
        APIC_WRITE = 56,
        RDRAND = 57,
        INVPCID = 58,
        VMFUNC = 59,
        ENCLS = 60,
        RDSEED = 61,
        PML_FULL = 62,
        XSAVES = 63,
        XRSTORS = 64,
    }
}

/// The raw `EXIT_REASON` VMCS field. The low 16 bits hold the basic exit
/// reason; bit 31 flags a VM-entry failure ("exit" during entry).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawExitReason(u32);

impl RawExitReason {
    const ENTRY_FAILURE_BIT: u32 = 1 << 31;

    pub const fn new(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Basic exit reason, or the raw number for reasons this build does
    /// not know about.
    pub fn basic(self) -> core::result::Result<ExitReason, u16> {
        ExitReason::try_from(self.0 as u16)
    }

    pub const fn is_entry_failure(self) -> bool {
        self.0 & Self::ENTRY_FAILURE_BIT != 0
    }
}

numeric_enum! {
    #[repr(u32)]
    #[derive(Debug, PartialEq, Eq, Clone, Copy)]
    pub enum VmxInstructionError {
        VmcallInVmxRoot = 1,
        VmclearInvalidAddress = 2,
        VmclearVmxonPointer = 3,
        VmlaunchNonClearVmcs = 4,
        VmresumeNonLaunchedVmcs = 5,
        VmresumeAfterVmxoff = 6,
        EntryInvalidControlFields = 7,
        EntryInvalidHostState = 8,
        VmptrldInvalidAddress = 9,
        VmptrldVmxonPointer = 10,
        VmptrldIncorrectRevision = 11,
        UnsupportedVmcsComponent = 12,
        VmwriteReadOnlyComponent = 13,
        VmxonInVmxRoot = 15,
        EntryInvalidExecutiveVmcsPointer = 16,
        EntryNonLaunchedExecutiveVmcs = 17,
        EntryExecutiveVmcsNotVmxonPointer = 18,
        VmcallNonClearVmcs = 19,
        VmcallInvalidExitControlFields = 20,
        VmcallIncorrectMsegRevision = 22,
        VmxoffUnderDualMonitor = 23,
        VmcallInvalidSmmFeatures = 24,
        EntryInvalidExecControlSmm = 25,
        EntryEventsBlockedByMovSs = 26,
        InvalidOperandInveptInvvpid = 28,
    }
}

impl VmxInstructionError {
    pub fn as_str(self) -> &'static str {
        use VmxInstructionError::*;
        match self {
            VmcallInVmxRoot => "VMCALL executed in VMX root operation",
            VmclearInvalidAddress => "VMCLEAR with invalid physical address",
            VmclearVmxonPointer => "VMCLEAR with VMXON pointer",
            VmlaunchNonClearVmcs => "VMLAUNCH with non-clear VMCS",
            VmresumeNonLaunchedVmcs => "VMRESUME with non-launched VMCS",
            VmresumeAfterVmxoff => "VMRESUME after VMXOFF",
            EntryInvalidControlFields => "VM entry with invalid control field(s)",
            EntryInvalidHostState => "VM entry with invalid host-state field(s)",
            VmptrldInvalidAddress => "VMPTRLD with invalid physical address",
            VmptrldVmxonPointer => "VMPTRLD with VMXON pointer",
            VmptrldIncorrectRevision => "VMPTRLD with incorrect VMCS revision identifier",
            UnsupportedVmcsComponent => "VMREAD/VMWRITE from/to unsupported VMCS component",
            VmwriteReadOnlyComponent => "VMWRITE to read-only VMCS component",
            VmxonInVmxRoot => "VMXON executed in VMX root operation",
            EntryInvalidExecutiveVmcsPointer => "VM entry with invalid executive-VMCS pointer",
            EntryNonLaunchedExecutiveVmcs => "VM entry with non-launched executive VMCS",
            EntryExecutiveVmcsNotVmxonPointer => {
                "VM entry with executive-VMCS pointer not VMXON pointer"
            }
            VmcallNonClearVmcs => "VMCALL with non-clear VMCS",
            VmcallInvalidExitControlFields => "VMCALL with invalid VM-exit control fields",
            VmcallIncorrectMsegRevision => "VMCALL with incorrect MSEG revision identifier",
            VmxoffUnderDualMonitor => "VMXOFF under dual-monitor treatment of SMIs and SMM",
            VmcallInvalidSmmFeatures => "VMCALL with invalid SMM-monitor features",
            EntryInvalidExecControlSmm => {
                "VM entry with invalid VM-execution control fields in executive VMCS"
            }
            EntryEventsBlockedByMovSs => "VM entry with events blocked by MOV SS",
            InvalidOperandInveptInvvpid => "Invalid operand to INVEPT/INVVPID",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_reason_decodes_basic_and_entry_failure() {
        let raw = RawExitReason::new(33 | (1 << 31));
        assert!(raw.is_entry_failure());
        assert_eq!(raw.basic(), Ok(ExitReason::INVALID_GUEST_STATE));

        let raw = RawExitReason::new(10);
        assert!(!raw.is_entry_failure());
        assert_eq!(raw.basic(), Ok(ExitReason::CPUID));
    }

    #[test]
    fn exit_reason_preserves_unknown_values() {
        assert_eq!(RawExitReason::new(0x1234 | 35).basic(), Err(0x1234 | 35));
    }

    #[test]
    fn instruction_error_round_trip() {
        for n in [1u32, 7, 11, 13, 28] {
            let err = VmxInstructionError::try_from(n).unwrap();
            assert_eq!(err as u32, n);
            assert!(!err.as_str().is_empty());
        }
        assert!(VmxInstructionError::try_from(14u32).is_err());
    }
}
