//! Extended page tables: the guest-physical → host-physical stage.
//!
//! Same 4-level structure as IA-32e paging, different entry layout: R/W/X
//! permission bits instead of present, a leaf-only memory type, and no
//! NX/user bits.

use bit_field::BitField;
use bitflags::bitflags;

use vtx::ept::{EptMemoryType, EptPointer};
use vtx::flags::EptVpidCap;
use vtx::vmcs::ControlField64;

use crate::error::HvResult;
use crate::memory::paging::{GenericPTE, Level4PageTable, PagingInstr};
use crate::memory::{GuestPhysAddr, HostPhysAddr, MemFlags};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct EptFlags: u64 {
        /// Read access.
        const READ =                1 << 0;
        /// Write access.
        const WRITE =               1 << 1;
        /// Execute access.
        const EXECUTE =             1 << 2;
        /// Ignore PAT memory type.
        const IGNORE_PAT =          1 << 6;
        /// Leaf entry in a P3/P2 table maps a huge page.
        const HUGE_PAGE =           1 << 7;
        /// Accessed, when EPTP bit 6 is set.
        const ACCESSED =            1 << 8;
        /// Dirty, when EPTP bit 6 is set.
        const DIRTY =               1 << 9;
    }
}

#[derive(Clone)]
pub struct EptEntry(u64);

impl From<MemFlags> for EptFlags {
    fn from(f: MemFlags) -> Self {
        let mut ret = Self::empty();
        if f.contains(MemFlags::READ) {
            ret |= Self::READ;
        }
        if f.contains(MemFlags::WRITE) {
            ret |= Self::WRITE;
        }
        if f.contains(MemFlags::EXECUTE) {
            ret |= Self::EXECUTE;
        }
        ret
    }
}

impl From<EptFlags> for MemFlags {
    fn from(f: EptFlags) -> Self {
        let mut ret = Self::empty();
        if f.contains(EptFlags::READ) {
            ret |= Self::READ;
        }
        if f.contains(EptFlags::WRITE) {
            ret |= Self::WRITE;
        }
        if f.contains(EptFlags::EXECUTE) {
            ret |= Self::EXECUTE;
        }
        ret
    }
}

impl EptEntry {
    fn ept_flags(&self) -> EptFlags {
        EptFlags::from_bits_truncate(self.0)
    }

    fn set_flags_and_mem_type(&mut self, flags: EptFlags, mem_type: u64) {
        self.0.set_bits(0..12, flags.bits());
        self.0.set_bits(3..6, mem_type);
    }
}

impl GenericPTE for EptEntry {
    fn addr(&self) -> HostPhysAddr {
        (self.0.get_bits(12..52) << 12) as usize
    }
    fn flags(&self) -> MemFlags {
        self.ept_flags().into()
    }
    fn is_unused(&self) -> bool {
        self.0 == 0
    }
    fn is_present(&self) -> bool {
        // An EPT entry is walked if any of R/W/X is granted.
        self.0.get_bits(0..3) != 0
    }
    fn is_huge(&self) -> bool {
        self.ept_flags().contains(EptFlags::HUGE_PAGE)
    }

    fn set_addr(&mut self, paddr: HostPhysAddr) {
        self.0.set_bits(12..52, paddr as u64 >> 12);
    }
    fn set_flags(&mut self, flags: MemFlags, is_huge: bool) {
        let mut flags = EptFlags::from(flags);
        if is_huge {
            flags |= EptFlags::HUGE_PAGE;
        }
        self.set_flags_and_mem_type(flags, EptMemoryType::WriteBack as u64);
    }
    fn set_table(&mut self, paddr: HostPhysAddr) {
        self.set_addr(paddr);
        // Intermediate entries carry permissions only; memory type is a
        // leaf concept.
        self.set_flags_and_mem_type(EptFlags::READ | EptFlags::WRITE | EptFlags::EXECUTE, 0);
    }
}

impl core::fmt::Debug for EptEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("EptEntry")
            .field("hpaddr", &self.addr())
            .field("flags", &self.ept_flags())
            .finish()
    }
}

pub struct EptInstr;

impl PagingInstr for EptInstr {
    unsafe fn activate(root_paddr: HostPhysAddr) {
        let cap = EptVpidCap::read();
        let eptp = EptPointer::new(
            root_paddr as u64,
            EptMemoryType::WriteBack,
            cap.accessed_dirty(),
        );
        ControlField64::EPT_POINTER
            .write(eptp.bits())
            .expect("failed to set EPT pointer");
    }
}

pub type ExtendedPageTable = Level4PageTable<EptEntry, EptInstr>;

/// Build the nested mapping `[start, start + size)` → `[host_base, ...)`.
/// Intermediate tables come lazily from the frame allocator; leaves use
/// huge pages where both sides align.
pub fn build_identity(
    start: GuestPhysAddr,
    host_base: HostPhysAddr,
    size: usize,
) -> HvResult<ExtendedPageTable> {
    let mut ept = ExtendedPageTable::new()?;
    ept.map_region(
        start,
        host_base,
        size,
        MemFlags::READ | MemFlags::WRITE | MemFlags::EXECUTE,
    )?;
    info!(
        "EPT built: GPA {:#x?} -> HPA {:#x}, root @ {:#x}",
        start..start + size,
        host_base,
        ept.root_paddr()
    );
    Ok(ept)
}
