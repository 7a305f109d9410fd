//! Memory-backed VMX structures.

use crate::error::HvResult;
use crate::memory::{Frame, HostPhysAddr};

/// A VMXON or VMCS region: one zeroed, 4 KiB-aligned frame whose first 31
/// bits carry the VMCS revision identifier from `IA32_VMX_BASIC`.
///
/// Owns its frame, so a failed bring-up hands the page straight back to
/// the allocator.
#[derive(Debug)]
pub struct VmxRegion {
    frame: Frame,
}

impl VmxRegion {
    pub fn new(revision_id: u32) -> HvResult<Self> {
        debug_assert_eq!(revision_id >> 31, 0);
        let mut frame = Frame::new_zero()?;
        let slice = frame.as_slice_mut();
        slice[0..4].copy_from_slice(&revision_id.to_le_bytes());
        Ok(Self { frame })
    }

    pub fn paddr(&self) -> HostPhysAddr {
        self.frame.start_paddr()
    }
}
