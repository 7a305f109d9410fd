//! Kernel page tables: an identity direct map over all of RAM.
//!
//! The kernel inherits whatever tables the firmware was using. They are
//! identity-mapped too, but live in boot-services memory the frame
//! allocator is about to recycle, so a private copy is built from
//! hypervisor-owned frames and CR3 is switched over.

use bit_field::BitField;
use bitflags::bitflags;
use x86_64::registers::control::{Cr3, Cr3Flags};
use x86_64::structures::paging::PhysFrame;
use x86_64::PhysAddr as X64PhysAddr;

use crate::error::HvResult;
use crate::memory::paging::{GenericPTE, Level4PageTable, PagingInstr};
use crate::memory::{HostPhysAddr, MemFlags};

bitflags! {
    /// IA-32e paging entry bits (SDM Vol 3A §4.5).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct PTFlags: u64 {
        const PRESENT =         1 << 0;
        const WRITABLE =        1 << 1;
        const USER_ACCESSIBLE = 1 << 2;
        const WRITE_THROUGH =   1 << 3;
        const NO_CACHE =        1 << 4;
        const ACCESSED =        1 << 5;
        const DIRTY =           1 << 6;
        const HUGE_PAGE =       1 << 7;
        const GLOBAL =          1 << 8;
        const NO_EXECUTE =      1 << 63;
    }
}

#[derive(Clone)]
pub struct PTEntry(u64);

impl From<MemFlags> for PTFlags {
    fn from(f: MemFlags) -> Self {
        let mut ret = Self::empty();
        if f.contains(MemFlags::READ) {
            ret |= Self::PRESENT;
        }
        if f.contains(MemFlags::WRITE) {
            ret |= Self::WRITABLE;
        }
        if !f.contains(MemFlags::EXECUTE) {
            ret |= Self::NO_EXECUTE;
        }
        ret
    }
}

impl From<PTFlags> for MemFlags {
    fn from(f: PTFlags) -> Self {
        let mut ret = Self::empty();
        if f.contains(PTFlags::PRESENT) {
            ret |= Self::READ;
        }
        if f.contains(PTFlags::WRITABLE) {
            ret |= Self::WRITE;
        }
        if !f.contains(PTFlags::NO_EXECUTE) {
            ret |= Self::EXECUTE;
        }
        ret
    }
}

impl GenericPTE for PTEntry {
    fn addr(&self) -> HostPhysAddr {
        (self.0.get_bits(12..52) << 12) as usize
    }
    fn flags(&self) -> MemFlags {
        self.pt_flags().into()
    }
    fn is_unused(&self) -> bool {
        self.0 == 0
    }
    fn is_present(&self) -> bool {
        self.pt_flags().contains(PTFlags::PRESENT)
    }
    fn is_huge(&self) -> bool {
        self.pt_flags().contains(PTFlags::HUGE_PAGE)
    }

    fn set_addr(&mut self, paddr: HostPhysAddr) {
        self.0.set_bits(12..52, paddr as u64 >> 12);
    }
    fn set_flags(&mut self, flags: MemFlags, is_huge: bool) {
        let mut flags = PTFlags::from(flags);
        if is_huge {
            flags |= PTFlags::HUGE_PAGE;
        }
        self.0.set_bits(0..12, flags.bits().get_bits(0..12));
        self.0.set_bit(63, flags.contains(PTFlags::NO_EXECUTE));
    }
    fn set_table(&mut self, paddr: HostPhysAddr) {
        self.set_addr(paddr);
        self.0
            .set_bits(0..12, (PTFlags::PRESENT | PTFlags::WRITABLE).bits());
        self.0.set_bit(63, false);
    }
}

impl core::fmt::Debug for PTEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("PTEntry")
            .field("paddr", &self.addr())
            .field("flags", &self.pt_flags())
            .finish()
    }
}

impl PTEntry {
    fn pt_flags(&self) -> PTFlags {
        PTFlags::from_bits_truncate(self.0)
    }
}

pub struct PTInstr;

impl PagingInstr for PTInstr {
    unsafe fn activate(root_paddr: HostPhysAddr) {
        Cr3::write(
            PhysFrame::containing_address(X64PhysAddr::new(root_paddr as u64)),
            Cr3Flags::empty(),
        );
    }
}

pub type HostPageTable = Level4PageTable<PTEntry, PTInstr>;

/// Build the identity direct map covering `[0, ram_top)` and switch CR3
/// to it. The returned table owns every frame of the new hierarchy and
/// must stay alive for the rest of the kernel's life.
pub fn init(ram_top: HostPhysAddr) -> HvResult<HostPageTable> {
    let mut pt = HostPageTable::new()?;
    pt.map_region(
        0,
        0,
        crate::memory::addr::align_up(ram_top),
        MemFlags::READ | MemFlags::WRITE | MemFlags::EXECUTE,
    )?;
    unsafe { pt.activate() };
    x86_64::instructions::tlb::flush_all();
    info!(
        "Direct physical map rebuilt: [0, {:#x}), CR3 = {:#x}",
        ram_top,
        pt.root_paddr()
    );
    Ok(pt)
}
