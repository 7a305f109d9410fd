//! The extended-page-table pointer (SDM Vol 3C §25.6.11).

use bit_field::BitField;

/// Memory type the CPU uses to access the EPT paging structures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum EptMemoryType {
    Uncacheable = 0,
    WriteBack = 6,
}

/// Encoded value for the `EPT_POINTER` VMCS field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EptPointer(u64);

impl EptPointer {
    /// `root` is the physical address of the level-4 table. The page-walk
    /// length is fixed at 4 — the only depth this hypervisor builds.
    pub fn new(root: u64, memory_type: EptMemoryType, accessed_dirty: bool) -> Self {
        debug_assert_eq!(root & 0xfff, 0, "EPT root must be page-aligned");
        let mut bits = root & !0xfff;
        bits.set_bits(0..3, memory_type as u64);
        bits.set_bits(3..6, 4 - 1);
        bits.set_bit(6, accessed_dirty);
        Self(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_root_walk_length_and_flags() {
        let eptp = EptPointer::new(0x1234_5000, EptMemoryType::WriteBack, true);
        // 6 (WB) | 3 << 3 (walk length 4) | 1 << 6 (A/D) | root
        assert_eq!(eptp.bits(), 0x1234_5000 | 6 | (3 << 3) | (1 << 6));
    }

    #[test]
    fn without_accessed_dirty() {
        let eptp = EptPointer::new(0x8000, EptMemoryType::Uncacheable, false);
        assert_eq!(eptp.bits(), 0x8000 | (3 << 3));
    }
}
