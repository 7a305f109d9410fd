use raw_cpuid::CpuId;

/// Feature probes the VMX bring-up needs.
pub struct CpuFeatures {
    cpuid: CpuId,
}

impl CpuFeatures {
    pub fn new() -> Self {
        Self {
            cpuid: CpuId::new(),
        }
    }

    pub fn has_vmx(&self) -> bool {
        self.cpuid
            .get_feature_info()
            .map(|f| f.has_vmx())
            .unwrap_or(false)
    }

    pub fn vendor_is_intel(&self) -> bool {
        self.cpuid
            .get_vendor_info()
            .map(|v| v.as_str() == "GenuineIntel")
            .unwrap_or(false)
    }
}

/// Initial local APIC id of this logical processor.
pub fn id() -> usize {
    CpuId::new()
        .get_feature_info()
        .map(|f| f.initial_local_apic_id() as usize)
        .unwrap_or(0)
}

/// Park the CPU for good. Interrupts stay off, so HLT never returns;
/// the loop guards against NMIs and SMM detours.
pub fn endless_halt() -> ! {
    x86_64::instructions::interrupts::disable();
    loop {
        x86_64::instructions::hlt();
    }
}
