//! VMX segment access-rights encoding (SDM Vol 3C §25.4.1).
//!
//! The layout matches the upper half of a GDT descriptor shifted down,
//! plus the VMX-only "unusable" bit 16.

use bit_field::BitField;

/// Segment/gate descriptor types, 4-bit `type` field with S deciding the
/// namespace.
pub mod seg_type {
    /// Data, read/write, accessed (S = 1).
    pub const DATA_RW_ACCESSED: u8 = 0x3;
    /// Code, execute/read, accessed (S = 1).
    pub const CODE_ER_ACCESSED: u8 = 0xB;
    /// LDT (S = 0).
    pub const LDT: u8 = 0x2;
    /// 32/64-bit busy TSS (S = 0).
    pub const TSS_BUSY: u8 = 0xB;
    /// 32/64-bit available TSS (S = 0).
    pub const TSS_AVAILABLE: u8 = 0x9;
}

/// Granularity of the segment limit field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    /// Limit counts bytes.
    Byte,
    /// Limit counts 4 KiB units.
    KByte,
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SegmentAccessRights(u32);

impl SegmentAccessRights {
    /// Marks a segment register whose contents VM entry must ignore.
    pub const UNUSABLE: Self = Self(1 << 16);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Build access rights for a usable segment.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        seg_type: u8,
        code_or_data: bool,
        dpl: u8,
        present: bool,
        long: bool,
        db: bool,
        granularity: Granularity,
    ) -> Self {
        let mut bits = 0u32;
        bits.set_bits(0..4, seg_type as u32 & 0xf);
        bits.set_bit(4, code_or_data);
        bits.set_bits(5..7, dpl as u32 & 0x3);
        bits.set_bit(7, present);
        bits.set_bit(13, long);
        bits.set_bit(14, db);
        bits.set_bit(15, matches!(granularity, Granularity::KByte));
        Self(bits)
    }

    pub fn seg_type(self) -> u8 {
        self.0.get_bits(0..4) as u8
    }

    /// The S bit: `true` for code/data, `false` for system segments.
    pub fn is_code_or_data(self) -> bool {
        self.0.get_bit(4)
    }

    pub fn dpl(self) -> u8 {
        self.0.get_bits(5..7) as u8
    }

    pub fn present(self) -> bool {
        self.0.get_bit(7)
    }

    pub fn avl(self) -> bool {
        self.0.get_bit(12)
    }

    /// The L bit: 64-bit code segment.
    pub fn long_mode(self) -> bool {
        self.0.get_bit(13)
    }

    /// The D/B bit.
    pub fn db(self) -> bool {
        self.0.get_bit(14)
    }

    pub fn granularity(self) -> Granularity {
        if self.0.get_bit(15) {
            Granularity::KByte
        } else {
            Granularity::Byte
        }
    }

    pub fn unusable(self) -> bool {
        self.0.get_bit(16)
    }

    /// Reserved bits that must read zero on VM entry: 8..12 and 17..32.
    pub fn reserved_bits(self) -> u32 {
        (self.0.get_bits(8..12) << 8) | (self.0.get_bits(17..32) << 17)
    }
}

impl core::fmt::Debug for SegmentAccessRights {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.unusable() {
            return f.write_str("SegmentAccessRights(unusable)");
        }
        f.debug_struct("SegmentAccessRights")
            .field("type", &self.seg_type())
            .field("s", &self.is_code_or_data())
            .field("dpl", &self.dpl())
            .field("present", &self.present())
            .field("long", &self.long_mode())
            .field("db", &self.db())
            .field("granularity", &self.granularity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bits() {
        let rights = SegmentAccessRights::new(
            seg_type::CODE_ER_ACCESSED,
            true,
            0,
            true,
            false,
            true,
            Granularity::KByte,
        );
        let back = SegmentAccessRights::from_bits(rights.bits());
        assert_eq!(back, rights);
        assert_eq!(back.seg_type(), seg_type::CODE_ER_ACCESSED);
        assert!(back.is_code_or_data());
        assert_eq!(back.dpl(), 0);
        assert!(back.present());
        assert!(back.db());
        assert_eq!(back.granularity(), Granularity::KByte);
        assert!(!back.unusable());
        assert_eq!(back.reserved_bits(), 0);
    }

    #[test]
    fn flat_protected_mode_code_encoding() {
        // type=0xB, S=1, DPL=0, P=1, DB=1, G=KByte => 0xC09B.
        let rights = SegmentAccessRights::new(
            seg_type::CODE_ER_ACCESSED,
            true,
            0,
            true,
            false,
            true,
            Granularity::KByte,
        );
        assert_eq!(rights.bits(), 0xC09B);
    }

    #[test]
    fn tss_encoding_is_a_system_segment() {
        let rights = SegmentAccessRights::new(
            seg_type::TSS_BUSY,
            false,
            0,
            true,
            false,
            false,
            Granularity::Byte,
        );
        assert_eq!(rights.bits(), 0x008B);
        assert!(!rights.is_code_or_data());
    }

    #[test]
    fn unusable_marker() {
        assert!(SegmentAccessRights::UNUSABLE.unusable());
    }
}
