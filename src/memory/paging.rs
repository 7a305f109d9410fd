//! A generic 4-level page table, instantiated twice: once with x86 PTEs
//! for the kernel's direct map and once with EPT entries for the guest's
//! nested mapping. The entry layout is the only thing that differs, so it
//! hides behind [`GenericPTE`].

use alloc::vec::Vec;
use core::{fmt::Debug, marker::PhantomData};

use super::addr::phys_to_virt;
use super::{Frame, MemFlags, PhysAddr};
use crate::error::{HvError, HvResult};

#[derive(Debug)]
pub enum PagingError {
    NoMemory,
    NotMapped,
    AlreadyMapped,
    MappedToHugePage,
}

pub type PagingResult<T = ()> = Result<T, PagingError>;

impl From<PagingError> for HvError {
    fn from(err: PagingError) -> Self {
        match err {
            PagingError::NoMemory => hv_err!(OutOfMemory),
            _ => hv_err!(BadAddress, format!("{:?}", err)),
        }
    }
}

#[repr(usize)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PageSize {
    Size4K = 0x1000,
    Size2M = 0x20_0000,
    Size1G = 0x4000_0000,
}

impl PageSize {
    pub const fn is_aligned(self, addr: usize) -> bool {
        self.page_offset(addr) == 0
    }

    pub const fn align_down(self, addr: usize) -> usize {
        addr & !(self as usize - 1)
    }

    pub const fn page_offset(self, addr: usize) -> usize {
        addr & (self as usize - 1)
    }

    pub const fn is_huge(self) -> bool {
        matches!(self, Self::Size1G | Self::Size2M)
    }
}

/// One page-table entry, whatever its on-disk layout.
pub trait GenericPTE: Debug + Clone {
    /// Physical address this entry points at.
    fn addr(&self) -> PhysAddr;
    /// Mapping attributes of this entry.
    fn flags(&self) -> MemFlags;
    /// Whether this entry is all zero.
    fn is_unused(&self) -> bool;
    /// Whether this entry is present/valid.
    fn is_present(&self) -> bool;
    /// Whether this entry maps a huge page.
    fn is_huge(&self) -> bool;

    /// Point a terminal entry at `paddr`.
    fn set_addr(&mut self, paddr: PhysAddr);
    /// Set attributes for a terminal entry.
    fn set_flags(&mut self, flags: MemFlags, is_huge: bool);
    /// Point an intermediate entry at the next-level table.
    fn set_table(&mut self, paddr: PhysAddr);
}

const ENTRY_COUNT: usize = 512;

/// How a concrete table type is installed on the CPU.
pub trait PagingInstr {
    /// # Safety
    ///
    /// Loads a hardware register; the table must describe a mapping the
    /// current execution can survive.
    unsafe fn activate(root_paddr: PhysAddr);
}

/// An owning 4-level page table: the root frame plus every intermediate
/// table frame allocated on demand.
pub struct Level4PageTable<PTE: GenericPTE, I: PagingInstr> {
    root: Frame,
    intrm_tables: Vec<Frame>,
    _phantom: PhantomData<(PTE, I)>,
}

impl<PTE, I> Level4PageTable<PTE, I>
where
    PTE: GenericPTE,
    I: PagingInstr,
{
    pub fn new() -> HvResult<Self> {
        Ok(Self {
            root: Frame::new_zero()?,
            intrm_tables: Vec::new(),
            _phantom: PhantomData,
        })
    }

    pub fn root_paddr(&self) -> PhysAddr {
        self.root.start_paddr()
    }

    /// Map `[vaddr, vaddr + size)` onto `[paddr, paddr + size)`, choosing
    /// the largest page size the addresses and remaining length permit.
    pub fn map_region(
        &mut self,
        vaddr: usize,
        paddr: PhysAddr,
        size: usize,
        flags: MemFlags,
    ) -> HvResult {
        trace!(
            "create mapping in {}: {:#x?} -> {:#x}, flags={:?}",
            core::any::type_name::<Self>(),
            vaddr..vaddr + size,
            paddr,
            flags
        );
        let mut vaddr = vaddr;
        let mut paddr = paddr;
        let mut size = size;
        while size > 0 {
            let page_size = if PageSize::Size1G.is_aligned(vaddr)
                && PageSize::Size1G.is_aligned(paddr)
                && size >= PageSize::Size1G as usize
                && !flags.contains(MemFlags::NO_HUGEPAGES)
            {
                PageSize::Size1G
            } else if PageSize::Size2M.is_aligned(vaddr)
                && PageSize::Size2M.is_aligned(paddr)
                && size >= PageSize::Size2M as usize
                && !flags.contains(MemFlags::NO_HUGEPAGES)
            {
                PageSize::Size2M
            } else {
                PageSize::Size4K
            };
            self.map_page(vaddr, paddr, page_size, flags).map_err(|e| {
                error!(
                    "failed to map page: {:#x}({:?}) -> {:#x}, {:?}",
                    vaddr, page_size, paddr, e
                );
                HvError::from(e)
            })?;
            vaddr += page_size as usize;
            paddr += page_size as usize;
            size -= page_size as usize;
        }
        Ok(())
    }

    /// Translate `vaddr`, returning the physical address, the attributes
    /// and the size of the mapping page.
    pub fn query(&self, vaddr: usize) -> PagingResult<(PhysAddr, MemFlags, PageSize)> {
        let (entry, size) = self.get_entry(vaddr)?;
        if entry.is_unused() {
            return Err(PagingError::NotMapped);
        }
        let off = size.page_offset(vaddr);
        Ok((entry.addr() + off, entry.flags(), size))
    }

    /// # Safety
    ///
    /// See [`PagingInstr::activate`].
    pub unsafe fn activate(&self) {
        I::activate(self.root_paddr())
    }

    fn map_page(
        &mut self,
        vaddr: usize,
        paddr: PhysAddr,
        size: PageSize,
        flags: MemFlags,
    ) -> PagingResult {
        debug_assert!(size.is_aligned(vaddr));
        let entry = self.get_entry_mut_or_create(vaddr, size)?;
        if !entry.is_unused() {
            return Err(PagingError::AlreadyMapped);
        }
        entry.set_addr(size.align_down(paddr));
        entry.set_flags(flags, size.is_huge());
        Ok(())
    }

    fn get_entry(&self, vaddr: usize) -> PagingResult<(&PTE, PageSize)> {
        let p4 = table_of::<PTE>(self.root_paddr());
        let p4e = &p4[p4_index(vaddr)];

        let p3 = next_table(p4e)?;
        let p3e = &p3[p3_index(vaddr)];
        if p3e.is_huge() {
            return Ok((p3e, PageSize::Size1G));
        }

        let p2 = next_table(p3e)?;
        let p2e = &p2[p2_index(vaddr)];
        if p2e.is_huge() {
            return Ok((p2e, PageSize::Size2M));
        }

        let p1 = next_table(p2e)?;
        Ok((&p1[p1_index(vaddr)], PageSize::Size4K))
    }

    fn get_entry_mut_or_create(
        &mut self,
        vaddr: usize,
        size: PageSize,
    ) -> PagingResult<&mut PTE> {
        let p4 = table_of_mut::<PTE>(self.root.start_paddr());
        let p4e = &mut p4[p4_index(vaddr)];

        let p3 = next_table_mut_or_create(p4e, || self.alloc_intrm_table())?;
        let p3e = &mut p3[p3_index(vaddr)];
        if size == PageSize::Size1G {
            return Ok(p3e);
        }

        let p2 = next_table_mut_or_create(p3e, || self.alloc_intrm_table())?;
        let p2e = &mut p2[p2_index(vaddr)];
        if size == PageSize::Size2M {
            return Ok(p2e);
        }

        let p1 = next_table_mut_or_create(p2e, || self.alloc_intrm_table())?;
        Ok(&mut p1[p1_index(vaddr)])
    }

    fn alloc_intrm_table(&mut self) -> HvResult<PhysAddr> {
        let frame = Frame::new_zero()?;
        let paddr = frame.start_paddr();
        self.intrm_tables.push(frame);
        Ok(paddr)
    }
}

const fn p4_index(vaddr: usize) -> usize {
    (vaddr >> (12 + 27)) & (ENTRY_COUNT - 1)
}

const fn p3_index(vaddr: usize) -> usize {
    (vaddr >> (12 + 18)) & (ENTRY_COUNT - 1)
}

const fn p2_index(vaddr: usize) -> usize {
    (vaddr >> (12 + 9)) & (ENTRY_COUNT - 1)
}

const fn p1_index(vaddr: usize) -> usize {
    (vaddr >> 12) & (ENTRY_COUNT - 1)
}

fn table_of<'a, E>(paddr: PhysAddr) -> &'a [E] {
    let ptr = phys_to_virt(paddr) as *const E;
    unsafe { core::slice::from_raw_parts(ptr, ENTRY_COUNT) }
}

fn table_of_mut<'a, E>(paddr: PhysAddr) -> &'a mut [E] {
    let ptr = phys_to_virt(paddr) as *mut E;
    unsafe { core::slice::from_raw_parts_mut(ptr, ENTRY_COUNT) }
}

fn next_table<'a, E: GenericPTE>(entry: &E) -> PagingResult<&'a [E]> {
    if !entry.is_present() {
        Err(PagingError::NotMapped)
    } else if entry.is_huge() {
        Err(PagingError::MappedToHugePage)
    } else {
        Ok(table_of(entry.addr()))
    }
}

fn next_table_mut_or_create<'a, E: GenericPTE>(
    entry: &mut E,
    mut allocator: impl FnMut() -> HvResult<PhysAddr>,
) -> PagingResult<&'a mut [E]> {
    if entry.is_unused() {
        let paddr = allocator().map_err(|_| PagingError::NoMemory)?;
        entry.set_table(paddr);
        Ok(table_of_mut(paddr))
    } else if !entry.is_present() {
        Err(PagingError::NotMapped)
    } else if entry.is_huge() {
        Err(PagingError::MappedToHugePage)
    } else {
        Ok(table_of_mut(entry.addr()))
    }
}
