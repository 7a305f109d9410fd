//! Physical memory allocation.
//!
//! The pool is every usable region of the final UEFI memory map. The VMX
//! core draws its VMXON/VMCS regions and EPT tables from here one frame at
//! a time; guest RAM is a single contiguous allocation.

use buddy_system_allocator::LockedFrameAllocator;
use bootproto::MemoryMap;

use super::addr::{align_down, align_up, is_aligned, phys_to_virt, PhysAddr};
use crate::consts::PAGE_SIZE;
use crate::error::HvResult;

static FRAME_ALLOCATOR: LockedFrameAllocator<32> = LockedFrameAllocator::new();

/// A safe RAII wrapper for physical frame allocation.
#[derive(Debug)]
pub struct Frame {
    start_paddr: PhysAddr,
    frame_count: usize,
}

#[allow(dead_code)]
impl Frame {
    /// Allocate one physical frame.
    pub fn new() -> HvResult<Self> {
        FRAME_ALLOCATOR
            .lock()
            .alloc(1)
            .map(|start| Self {
                start_paddr: start * PAGE_SIZE,
                frame_count: 1,
            })
            .ok_or(hv_err!(OutOfMemory))
    }

    /// Allocate one physical frame and fill it with zero.
    pub fn new_zero() -> HvResult<Self> {
        let mut f = Self::new()?;
        f.zero();
        Ok(f)
    }

    /// Allocate contiguous physical frames.
    pub fn new_contiguous(frame_count: usize) -> HvResult<Self> {
        FRAME_ALLOCATOR
            .lock()
            .alloc(frame_count)
            .map(|start| Self {
                start_paddr: start * PAGE_SIZE,
                frame_count,
            })
            .ok_or(hv_err!(OutOfMemory))
    }

    /// Construct a frame from a raw physical address without taking
    /// ownership (dropping it will not deallocate).
    ///
    /// # Safety
    ///
    /// The caller must ensure `start_paddr` references valid memory.
    pub unsafe fn from_paddr(start_paddr: PhysAddr) -> Self {
        assert!(is_aligned(start_paddr));
        Self {
            start_paddr,
            frame_count: 0,
        }
    }

    pub fn start_paddr(&self) -> PhysAddr {
        self.start_paddr
    }

    pub fn size(&self) -> usize {
        self.frame_count * PAGE_SIZE
    }

    pub fn as_ptr(&self) -> *const u8 {
        phys_to_virt(self.start_paddr) as *const u8
    }

    pub fn as_mut_ptr(&self) -> *mut u8 {
        phys_to_virt(self.start_paddr) as *mut u8
    }

    pub fn fill(&mut self, byte: u8) {
        unsafe { core::ptr::write_bytes(self.as_mut_ptr(), byte, self.size()) }
    }

    pub fn zero(&mut self) {
        self.fill(0)
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { core::slice::from_raw_parts(self.as_ptr(), self.size()) }
    }

    pub fn as_slice_mut(&mut self) -> &mut [u8] {
        unsafe { core::slice::from_raw_parts_mut(self.as_mut_ptr(), self.size()) }
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        if self.frame_count > 0 {
            FRAME_ALLOCATOR
                .lock()
                .dealloc(self.start_paddr / PAGE_SIZE, self.frame_count);
        }
    }
}

/// Feed every usable region of the UEFI memory map into the allocator.
/// Returns the highest physical address of RAM.
pub(super) fn init(map: &MemoryMap) -> PhysAddr {
    let mut total = 0usize;
    let mut max_paddr = 0usize;
    for desc in map.iter() {
        let start = desc.physical_start as usize;
        let size = desc.number_of_pages as usize * PAGE_SIZE;
        max_paddr = max_paddr.max(start + size);
        if !desc.is_usable() {
            continue;
        }
        // Leave real-mode memory alone; firmware structures hide there.
        let start = align_up(start.max(0x10_0000));
        let end = align_down(desc.physical_start as usize + size);
        if start >= end {
            continue;
        }
        FRAME_ALLOCATOR
            .lock()
            .add_frame(start / PAGE_SIZE, end / PAGE_SIZE);
        total += end - start;
    }
    info!(
        "Frame allocator init end: {} MiB usable, top of RAM {:#x}",
        total >> 20,
        max_paddr
    );
    max_paddr
}
