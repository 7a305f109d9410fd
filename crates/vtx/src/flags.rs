//! VMX capability MSRs and VM-execution/exit/entry control bits.

use bit_field::BitField;
use bitflags::bitflags;
use x86::msr::{
    rdmsr, wrmsr, IA32_FEATURE_CONTROL, IA32_VMX_BASIC, IA32_VMX_EPT_VPID_CAP,
};

bitflags! {
    /// `IA32_FEATURE_CONTROL` MSR.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FeatureControlFlags: u64 {
        /// Locked by firmware; the MSR cannot be rewritten until reset.
        const LOCKED = 1 << 0;
        const VMXON_ENABLED_INSIDE_SMX = 1 << 1;
        const VMXON_ENABLED_OUTSIDE_SMX = 1 << 2;
    }
}

pub struct FeatureControl;

impl FeatureControl {
    pub fn read() -> FeatureControlFlags {
        FeatureControlFlags::from_bits_truncate(unsafe { rdmsr(IA32_FEATURE_CONTROL) })
    }

    /// # Safety
    ///
    /// GP-faults if the lock bit is already set.
    pub unsafe fn write(flags: FeatureControlFlags) {
        wrmsr(IA32_FEATURE_CONTROL, flags.bits());
    }
}

/// Decoded `IA32_VMX_BASIC` MSR.
#[derive(Debug, Clone, Copy)]
pub struct VmxBasic {
    /// VMCS revision identifier, stamped into VMXON/VMCS regions.
    pub revision_id: u32,
    /// Bytes the CPU may use in a VMXON/VMCS region.
    pub region_size: u16,
    /// Memory type the CPU uses to access VMX regions (6 = write-back).
    pub memory_type: u8,
    /// When set, the `IA32_VMX_TRUE_*_CTLS` MSRs report the real
    /// mandatory-1/allowed-1 sets and must be used instead.
    pub true_controls: bool,
}

impl VmxBasic {
    pub const MEMORY_TYPE_WRITE_BACK: u8 = 6;

    pub fn read() -> Self {
        Self::from_raw(unsafe { rdmsr(IA32_VMX_BASIC) })
    }

    pub fn from_raw(raw: u64) -> Self {
        Self {
            revision_id: raw.get_bits(0..31) as u32,
            region_size: raw.get_bits(32..45) as u16,
            memory_type: raw.get_bits(50..54) as u8,
            true_controls: raw.get_bit(55),
        }
    }
}

/// Decoded `IA32_VMX_EPT_VPID_CAP` MSR (only the bits this hypervisor
/// consults).
#[derive(Debug, Clone, Copy)]
pub struct EptVpidCap(u64);

impl EptVpidCap {
    pub fn read() -> Self {
        Self(unsafe { rdmsr(IA32_VMX_EPT_VPID_CAP) })
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Page-walk length of 4 supported.
    pub fn walk_length_4(&self) -> bool {
        self.0.get_bit(6)
    }

    /// Write-back EPT paging-structure memory type supported.
    pub fn write_back(&self) -> bool {
        self.0.get_bit(14)
    }

    /// 2 MiB EPT pages supported.
    pub fn page_2m(&self) -> bool {
        self.0.get_bit(16)
    }

    /// Accessed/dirty flags for EPT supported.
    pub fn accessed_dirty(&self) -> bool {
        self.0.get_bit(21)
    }
}

bitflags! {
    /// Pin-based VM-execution controls.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PinbasedControls: u32 {
        const EXTERNAL_INTERRUPT_EXITING = 1 << 0;
        const NMI_EXITING = 1 << 3;
        const VIRTUAL_NMIS = 1 << 5;
        const PREEMPTION_TIMER = 1 << 6;
        const POSTED_INTERRUPTS = 1 << 7;
    }
}

bitflags! {
    /// Primary processor-based VM-execution controls.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PrimaryControls: u32 {
        const INTERRUPT_WINDOW_EXITING = 1 << 2;
        const USE_TSC_OFFSETTING = 1 << 3;
        const HLT_EXITING = 1 << 7;
        const INVLPG_EXITING = 1 << 9;
        const MWAIT_EXITING = 1 << 10;
        const RDPMC_EXITING = 1 << 11;
        const RDTSC_EXITING = 1 << 12;
        const CR3_LOAD_EXITING = 1 << 15;
        const CR3_STORE_EXITING = 1 << 16;
        const CR8_LOAD_EXITING = 1 << 19;
        const CR8_STORE_EXITING = 1 << 20;
        const USE_TPR_SHADOW = 1 << 21;
        const NMI_WINDOW_EXITING = 1 << 22;
        const MOV_DR_EXITING = 1 << 23;
        const UNCOND_IO_EXITING = 1 << 24;
        const USE_IO_BITMAPS = 1 << 25;
        const MONITOR_TRAP_FLAG = 1 << 27;
        const USE_MSR_BITMAPS = 1 << 28;
        const MONITOR_EXITING = 1 << 29;
        const PAUSE_EXITING = 1 << 30;
        const SECONDARY_CONTROLS = 1 << 31;
    }
}

bitflags! {
    /// Secondary processor-based VM-execution controls.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SecondaryControls: u32 {
        const VIRTUALIZE_APIC_ACCESSES = 1 << 0;
        const ENABLE_EPT = 1 << 1;
        const DESCRIPTOR_TABLE_EXITING = 1 << 2;
        const ENABLE_RDTSCP = 1 << 3;
        const VIRTUALIZE_X2APIC_MODE = 1 << 4;
        const ENABLE_VPID = 1 << 5;
        const WBINVD_EXITING = 1 << 6;
        const UNRESTRICTED_GUEST = 1 << 7;
        const APIC_REGISTER_VIRTUALIZATION = 1 << 8;
        const VIRTUAL_INTERRUPT_DELIVERY = 1 << 9;
        const PAUSE_LOOP_EXITING = 1 << 10;
        const RDRAND_EXITING = 1 << 11;
        const ENABLE_INVPCID = 1 << 12;
        const ENABLE_VM_FUNCTIONS = 1 << 13;
        const VMCS_SHADOWING = 1 << 14;
        const ENABLE_ENCLS_EXITING = 1 << 15;
        const RDSEED_EXITING = 1 << 16;
        const ENABLE_PML = 1 << 17;
        const EPT_VIOLATION_VE = 1 << 18;
        const ENABLE_XSAVES_XRSTORS = 1 << 20;
    }
}

bitflags! {
    /// VM-exit controls.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ExitControls: u32 {
        const SAVE_DEBUG_CONTROLS = 1 << 2;
        const HOST_ADDRESS_SPACE_SIZE = 1 << 9;
        const LOAD_IA32_PERF_GLOBAL_CTRL = 1 << 12;
        const ACK_INTERRUPT_ON_EXIT = 1 << 15;
        const SAVE_IA32_PAT = 1 << 18;
        const LOAD_IA32_PAT = 1 << 19;
        const SAVE_IA32_EFER = 1 << 20;
        const LOAD_IA32_EFER = 1 << 21;
        const SAVE_PREEMPTION_TIMER = 1 << 22;
    }
}

bitflags! {
    /// VM-entry controls.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EntryControls: u32 {
        const LOAD_DEBUG_CONTROLS = 1 << 2;
        const IA32E_MODE_GUEST = 1 << 9;
        const ENTRY_TO_SMM = 1 << 10;
        const DEACTIVATE_DUAL_MONITOR = 1 << 11;
        const LOAD_IA32_PERF_GLOBAL_CTRL = 1 << 13;
        const LOAD_IA32_PAT = 1 << 14;
        const LOAD_IA32_EFER = 1 << 15;
    }
}

/// Adjust a desired 32-bit control value against a capability MSR: the
/// MSR's low half is the mandatory-1 set, its high half the allowed-1
/// set (SDM Vol 3D A.3).
pub fn adjust_controls(desired: u32, capability: u64) -> u32 {
    let mandatory1 = capability as u32;
    let allowed1 = (capability >> 32) as u32;
    (desired | mandatory1) & allowed1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vmx_basic_unpacks_fields() {
        // revision 4, 4 KiB regions, WB memory type, true controls.
        let raw = 4u64 | (0x1000 << 32) | (6 << 50) | (1 << 55);
        let basic = VmxBasic::from_raw(raw);
        assert_eq!(basic.revision_id, 4);
        assert_eq!(basic.region_size, 0x1000);
        assert_eq!(basic.memory_type, VmxBasic::MEMORY_TYPE_WRITE_BACK);
        assert!(basic.true_controls);
    }

    #[test]
    fn adjust_forces_mandatory_and_strips_disallowed() {
        // Mandatory-1: bits 1,4. Allowed-1: bits 0,1,4,7.
        let capability = 0x0000_0012u64 | (0x0000_0093u64 << 32);
        assert_eq!(adjust_controls(0, capability), 0x12);
        assert_eq!(adjust_controls(1 << 7, capability), 0x92);
        // A desired bit outside allowed-1 silently drops.
        assert_eq!(adjust_controls(1 << 12, capability), 0x12);
    }

    #[test]
    fn ept_vpid_cap_bits() {
        let cap = EptVpidCap::from_raw((1 << 6) | (1 << 14) | (1 << 21));
        assert!(cap.walk_length_4());
        assert!(cap.write_back());
        assert!(cap.accessed_dirty());
        assert!(!cap.page_2m());
    }
}
