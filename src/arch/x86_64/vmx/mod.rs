//! The VMX virtualization core: VMX-root bring-up, the vCPU and its VMCS,
//! EPT, the guest-state validation gate and the exit dispatcher.

mod checks;
mod ept;
mod structs;
mod vcpu;
mod vmexit;

use core::sync::atomic::{AtomicPtr, Ordering};

use x86::msr::{
    rdmsr, IA32_VMX_CR0_FIXED0, IA32_VMX_CR0_FIXED1, IA32_VMX_CR4_FIXED0, IA32_VMX_CR4_FIXED1,
};
use x86_64::registers::control::{Cr0, Cr4, Cr4Flags};

use vtx::flags::{FeatureControl, FeatureControlFlags};

use crate::arch::cpu::CpuFeatures;
use crate::error::HvResult;

pub use ept::ExtendedPageTable;
pub use vcpu::Vcpu;

/// Fail unless this CPU can host us at all.
pub fn check_vmx_support() -> HvResult {
    let features = CpuFeatures::new();
    if !features.vendor_is_intel() {
        return hv_result_err!(NotSupported, "not an Intel CPU");
    }
    if !features.has_vmx() {
        return hv_result_err!(NotSupported, "CPUID reports no VMX");
    }
    Ok(())
}

/// Prepare this logical processor for VMXON:
///
/// 1. Force CR0/CR4 into the `IA32_VMX_CR{0,4}_FIXED{0,1}` envelope
///    (mandatory-1 bits ORed in, mandatory-0 bits ANDed out).
/// 2. Set VMX-outside-SMX in `IA32_FEATURE_CONTROL`, or fail hard if the
///    firmware locked it off.
/// 3. Set `CR4.VMXE`.
pub fn enable_vmx() -> HvResult {
    unsafe {
        let cr0 = Cr0::read_raw();
        let fixed0 = rdmsr(IA32_VMX_CR0_FIXED0);
        let fixed1 = rdmsr(IA32_VMX_CR0_FIXED1);
        Cr0::write_raw((cr0 | fixed0) & fixed1);

        let cr4 = Cr4::read_raw();
        let fixed0 = rdmsr(IA32_VMX_CR4_FIXED0);
        let fixed1 = rdmsr(IA32_VMX_CR4_FIXED1);
        Cr4::write_raw((cr4 | fixed0) & fixed1);
    }

    let ctrl = FeatureControl::read();
    let locked = ctrl.contains(FeatureControlFlags::LOCKED);
    let vmxon_outside = ctrl.contains(FeatureControlFlags::VMXON_ENABLED_OUTSIDE_SMX);
    if locked && !vmxon_outside {
        // Firmware policy; nothing to do but report it.
        return hv_result_err!(NotSupported, "VMX disabled by firmware");
    }
    if !locked {
        unsafe {
            FeatureControl::write(
                ctrl | FeatureControlFlags::LOCKED | FeatureControlFlags::VMXON_ENABLED_OUTSIDE_SMX,
            )
        };
    }

    unsafe {
        Cr4::write_raw(Cr4::read_raw() | Cr4Flags::VIRTUAL_MACHINE_EXTENSIONS.bits());
    }
    info!("VMX enabled: CR0/CR4 adjusted, CR4.VMXE set");
    Ok(())
}

/// vCPU the panic handler may dump. One logical processor, one slot; a
/// per-LP array indexed by APIC id is the intended SMP extension.
static PANIC_VCPU: AtomicPtr<Vcpu> = AtomicPtr::new(core::ptr::null_mut());

/// Register `vcpu` for post-mortem dumps.
pub fn set_vm(vcpu: &mut Vcpu) {
    PANIC_VCPU.store(vcpu as *mut _, Ordering::Release);
}

/// Called from the panic handler, under its recursion guard.
pub fn dump_registered_vcpu() {
    let ptr = PANIC_VCPU.load(Ordering::Acquire);
    if let Some(vcpu) = unsafe { ptr.as_ref() } {
        vcpu.dump_state();
    }
}
