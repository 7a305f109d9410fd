//! VMX instruction wrappers.
//!
//! The raw instructions come from the `x86` crate, which reads RFLAGS
//! immediately after each instruction (inlined, so no prologue can clobber
//! the flags). This module only converts the CF/ZF outcome into
//! [`VmxError`].

#![allow(clippy::missing_safety_doc)]

use crate::Result;

/// Enter VMX root operation. `addr` is the physical address of a
/// revision-stamped VMXON region.
///
/// # Safety
///
/// The region must be 4 KiB-aligned, zeroed apart from the revision id,
/// and the CPU must satisfy the CR0/CR4 fixed-bit constraints.
pub unsafe fn vmxon(addr: u64) -> Result {
    x86::bits64::vmx::vmxon(addr)?;
    Ok(())
}

/// Leave VMX operation.
///
/// # Safety
///
/// Must be in VMX root operation.
pub unsafe fn vmxoff() -> Result {
    x86::bits64::vmx::vmxoff()?;
    Ok(())
}

/// Clear the launch state of the VMCS at `addr` and flush it to memory.
///
/// # Safety
///
/// `addr` must reference a VMCS region.
pub unsafe fn vmclear(addr: u64) -> Result {
    x86::bits64::vmx::vmclear(addr)?;
    Ok(())
}

/// Make the VMCS at `addr` current and active on this logical processor.
///
/// # Safety
///
/// `addr` must reference a revision-stamped VMCS region.
pub unsafe fn vmptrld(addr: u64) -> Result {
    x86::bits64::vmx::vmptrld(addr)?;
    Ok(())
}

pub(crate) unsafe fn vmread(field: u32) -> Result<u64> {
    Ok(x86::bits64::vmx::vmread(field)?)
}

pub(crate) unsafe fn vmwrite(field: u32, value: u64) -> Result {
    x86::bits64::vmx::vmwrite(field, value)?;
    Ok(())
}
