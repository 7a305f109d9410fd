//! Physical memory management.
//!
//!     +--------------------------------------+ - 0
//!     | Legacy / firmware regions            |
//!     +--------------------------------------+
//!     | Kernel image (ELF segments at their  |
//!     | load addresses, stack, heap in .bss) |
//!     +--------------------------------------+
//!     | UEFI loader data: guest bzImage,     |
//!     | initramfs, boot info, memory map     |
//!     +--------------------------------------+
//!     | Conventional RAM                     |
//!     |   -> frame allocator pool            |
//!     |      (VMXON/VMCS regions, EPT        |
//!     |       tables, guest RAM window)      |
//!     :                                      :
//!     +--------------------------------------+ - top of RAM
//!
//! The kernel runs on an identity direct map rebuilt at boot (see
//! `arch::paging`), so `phys_to_virt` is a plain cast kept as a seam.

pub mod addr;
mod frame;
mod heap;
pub mod paging;

use bitflags::bitflags;
use bootproto::MemoryMap;

pub use addr::{virt_to_phys, GuestPhysAddr, HostPhysAddr, HostVirtAddr, PhysAddr, VirtAddr};
pub use frame::Frame;
pub use paging::{GenericPTE, Level4PageTable, PagingInstr};

pub const PAGE_SIZE: usize = paging::PageSize::Size4K as usize;

bitflags! {
    /// Architecture-neutral mapping attributes, converted into x86 PTE or
    /// EPT entry bits by the respective `GenericPTE` implementations.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MemFlags: u64 {
        const READ          = 1 << 0;
        const WRITE         = 1 << 1;
        const EXECUTE       = 1 << 2;
        const NO_HUGEPAGES  = 1 << 8;
    }
}

/// Bring up the heap, then feed every usable UEFI region to the frame
/// allocator. Returns the highest physical address seen in the map so the
/// direct map can cover all of RAM.
pub fn init(map: &MemoryMap) -> PhysAddr {
    heap::init();
    frame::init(map)
}
