//! Pre-entry guest-state validation (SDM Vol 3C §26.3.1).
//!
//! VM entry with malformed guest state is implementation-defined at best
//! and a silent triple fault at worst, so every entry runs this gate — in
//! release builds too. [`GuestState::capture`] snapshots the VMCS and the
//! capability MSRs; [`GuestState::validate`] is pure so the rules can be
//! exercised on the host.

use x86::msr::{
    rdmsr, IA32_VMX_CR0_FIXED0, IA32_VMX_CR0_FIXED1, IA32_VMX_CR4_FIXED0, IA32_VMX_CR4_FIXED1,
};

use vtx::flags::{EntryControls, SecondaryControls};
use vtx::segmentation::{seg_type, Granularity, SegmentAccessRights};
use vtx::vmcs::{ControlField32, GuestField16, GuestField32, GuestField64};
use vtx::Result as VmxResult;

const CR0_PE: u64 = 1 << 0;
const CR0_WP: u64 = 1 << 16;
const CR0_PG: u64 = 1 << 31;
const CR4_PAE: u64 = 1 << 5;
const CR4_PCIDE: u64 = 1 << 17;
const CR4_CET: u64 = 1 << 23;
const EFER_LME: u64 = 1 << 8;
const EFER_LMA: u64 = 1 << 10;
const RFLAGS_IF: u64 = 1 << 9;
const RFLAGS_VM: u64 = 1 << 17;

#[derive(Debug, Clone, Copy)]
pub struct Segment {
    pub selector: u16,
    pub base: u64,
    pub limit: u32,
    pub rights: SegmentAccessRights,
}

impl Segment {
    fn rpl(&self) -> u16 {
        self.selector & 0x3
    }

    /// TI bit: the selector references the LDT.
    fn ti(&self) -> bool {
        self.selector & 0x4 != 0
    }
}

/// Everything §26.3.1 looks at, lifted out of the VMCS.
#[derive(Debug, Clone, Copy)]
pub struct GuestState {
    pub unrestricted_guest: bool,
    pub entry_ia32e: bool,
    pub load_efer: bool,
    pub entry_intr_info: u32,

    pub cr0_fixed0: u64,
    pub cr0_fixed1: u64,
    pub cr4_fixed0: u64,
    pub cr4_fixed1: u64,

    pub cr0: u64,
    pub cr3: u64,
    pub cr4: u64,
    pub efer: u64,
    pub pat: u64,
    pub sysenter_esp: u64,
    pub sysenter_eip: u64,

    pub cs: Segment,
    pub ss: Segment,
    pub ds: Segment,
    pub es: Segment,
    pub fs: Segment,
    pub gs: Segment,
    pub tr: Segment,
    pub ldtr: Segment,

    pub gdtr_base: u64,
    pub gdtr_limit: u32,
    pub idtr_base: u64,
    pub idtr_limit: u32,

    pub rip: u64,
    pub rflags: u64,

    pub activity_state: u32,
    pub interruptibility: u32,
    pub vmcs_link_pointer: u64,
}

fn is_canonical(addr: u64) -> bool {
    ((addr as i64) << 16 >> 16) == addr as i64
}

fn read_segment(
    sel: GuestField16,
    base: GuestField64,
    limit: GuestField32,
    rights: GuestField32,
) -> VmxResult<Segment> {
    Ok(Segment {
        selector: sel.read()?,
        base: base.read()?,
        limit: limit.read()?,
        rights: SegmentAccessRights::from_bits(rights.read()?),
    })
}

impl GuestState {
    pub fn capture() -> VmxResult<Self> {
        use GuestField16 as S;
        use GuestField32 as L;
        use GuestField64 as B;

        let secondary = SecondaryControls::from_bits_truncate(
            ControlField32::SECONDARY_PROC_BASED_EXEC_CONTROLS.read()?,
        );
        let entry = EntryControls::from_bits_truncate(ControlField32::ENTRY_CONTROLS.read()?);

        Ok(Self {
            unrestricted_guest: secondary.contains(SecondaryControls::UNRESTRICTED_GUEST),
            entry_ia32e: entry.contains(EntryControls::IA32E_MODE_GUEST),
            load_efer: entry.contains(EntryControls::LOAD_IA32_EFER),
            entry_intr_info: ControlField32::ENTRY_INTERRUPTION_INFO.read()?,

            cr0_fixed0: unsafe { rdmsr(IA32_VMX_CR0_FIXED0) },
            cr0_fixed1: unsafe { rdmsr(IA32_VMX_CR0_FIXED1) },
            cr4_fixed0: unsafe { rdmsr(IA32_VMX_CR4_FIXED0) },
            cr4_fixed1: unsafe { rdmsr(IA32_VMX_CR4_FIXED1) },

            cr0: B::CR0.read()?,
            cr3: B::CR3.read()?,
            cr4: B::CR4.read()?,
            efer: B::IA32_EFER.read()?,
            pat: B::IA32_PAT.read()?,
            sysenter_esp: B::SYSENTER_ESP.read()?,
            sysenter_eip: B::SYSENTER_EIP.read()?,

            cs: read_segment(S::CS_SELECTOR, B::CS_BASE, L::CS_LIMIT, L::CS_ACCESS_RIGHTS)?,
            ss: read_segment(S::SS_SELECTOR, B::SS_BASE, L::SS_LIMIT, L::SS_ACCESS_RIGHTS)?,
            ds: read_segment(S::DS_SELECTOR, B::DS_BASE, L::DS_LIMIT, L::DS_ACCESS_RIGHTS)?,
            es: read_segment(S::ES_SELECTOR, B::ES_BASE, L::ES_LIMIT, L::ES_ACCESS_RIGHTS)?,
            fs: read_segment(S::FS_SELECTOR, B::FS_BASE, L::FS_LIMIT, L::FS_ACCESS_RIGHTS)?,
            gs: read_segment(S::GS_SELECTOR, B::GS_BASE, L::GS_LIMIT, L::GS_ACCESS_RIGHTS)?,
            tr: read_segment(S::TR_SELECTOR, B::TR_BASE, L::TR_LIMIT, L::TR_ACCESS_RIGHTS)?,
            ldtr: read_segment(
                S::LDTR_SELECTOR,
                B::LDTR_BASE,
                L::LDTR_LIMIT,
                L::LDTR_ACCESS_RIGHTS,
            )?,

            gdtr_base: B::GDTR_BASE.read()?,
            gdtr_limit: L::GDTR_LIMIT.read()?,
            idtr_base: B::IDTR_BASE.read()?,
            idtr_limit: L::IDTR_LIMIT.read()?,

            rip: B::RIP.read()?,
            rflags: B::RFLAGS.read()?,

            activity_state: L::ACTIVITY_STATE.read()?,
            interruptibility: L::INTERRUPTIBILITY_STATE.read()?,
            vmcs_link_pointer: B::VMCS_LINK_POINTER.read()?,
        })
    }

    /// Re-derive every invariant; the returned string names the first
    /// violated rule.
    pub fn validate(&self) -> Result<(), &'static str> {
        self.check_control_registers()?;
        self.check_segments()?;
        self.check_descriptor_tables()?;
        self.check_rip_rflags()?;
        self.check_non_register_state()?;
        Ok(())
    }

    fn check_control_registers(&self) -> Result<(), &'static str> {
        // Unrestricted guests may clear PE and PG regardless of the
        // fixed-bit envelope.
        let mut cr0_fixed0 = self.cr0_fixed0;
        if self.unrestricted_guest {
            cr0_fixed0 &= !(CR0_PE | CR0_PG);
        }
        if self.cr0 & cr0_fixed0 != cr0_fixed0 {
            return Err("CR0: Invalid value (fixed-1 bit clear)");
        }
        if self.cr0 & !self.cr0_fixed1 != 0 {
            return Err("CR0: Invalid value (fixed-0 bit set)");
        }
        if self.cr4 & self.cr4_fixed0 != self.cr4_fixed0 {
            return Err("CR4: Invalid value (fixed-1 bit clear)");
        }
        if self.cr4 & !self.cr4_fixed1 != 0 {
            return Err("CR4: Invalid value (fixed-0 bit set)");
        }
        if self.cr0 & CR0_PG != 0 && self.cr0 & CR0_PE == 0 {
            return Err("CR0: PG set without PE");
        }
        if self.cr4 & CR4_CET != 0 && self.cr0 & CR0_WP == 0 {
            return Err("CR4: CET set without CR0.WP");
        }
        if self.entry_ia32e && (self.cr0 & CR0_PG == 0 || self.cr4 & CR4_PAE == 0) {
            return Err("entry: IA-32e mode without CR0.PG and CR4.PAE");
        }
        if !self.entry_ia32e && self.cr4 & CR4_PCIDE != 0 {
            return Err("CR4: PCIDE set outside IA-32e mode");
        }
        if self.cr3 >> 52 != 0 {
            return Err("CR3: reserved upper bits set");
        }
        if !is_canonical(self.sysenter_esp) {
            return Err("IA32_SYSENTER_ESP: non-canonical");
        }
        if !is_canonical(self.sysenter_eip) {
            return Err("IA32_SYSENTER_EIP: non-canonical");
        }
        if self.load_efer {
            if (self.efer & EFER_LMA != 0) != self.entry_ia32e {
                return Err("IA32_EFER: LMA != IA-32e entry control");
            }
            if self.cr0 & CR0_PG != 0
                && (self.efer & EFER_LMA != 0) != (self.efer & EFER_LME != 0)
            {
                return Err("IA32_EFER: LMA != LME while paging is on");
            }
        }
        for i in 0..8 {
            let mem_type = (self.pat >> (i * 8)) & 0xFF;
            if !matches!(mem_type, 0 | 1 | 4 | 6 | 7) {
                return Err("IA32_PAT: invalid memory type");
            }
        }
        Ok(())
    }

    fn check_segments(&self) -> Result<(), &'static str> {
        if self.tr.ti() {
            return Err("TR.selector: TI set");
        }
        if !self.ldtr.rights.unusable() && self.ldtr.ti() {
            return Err("LDTR.selector: TI set");
        }
        if !self.unrestricted_guest && self.cs.rpl() != self.ss.rpl() {
            return Err("CS.selector: RPL != SS.RPL");
        }

        if !is_canonical(self.tr.base) {
            return Err("TR.base: non-canonical");
        }
        if !is_canonical(self.fs.base) {
            return Err("FS.base: non-canonical");
        }
        if !is_canonical(self.gs.base) {
            return Err("GS.base: non-canonical");
        }
        if !self.ldtr.rights.unusable() && !is_canonical(self.ldtr.base) {
            return Err("LDTR.base: non-canonical");
        }
        if self.cs.base >> 32 != 0 {
            return Err("CS.base: upper bits set");
        }
        for (seg, err) in [
            (&self.ss, "SS.base: upper bits set"),
            (&self.ds, "DS.base: upper bits set"),
            (&self.es, "ES.base: upper bits set"),
        ] {
            if !seg.rights.unusable() && seg.base >> 32 != 0 {
                return Err(err);
            }
        }

        self.check_cs_rights()?;
        self.check_ss_rights()?;
        self.check_data_rights(&self.ds, "DS")?;
        self.check_data_rights(&self.es, "ES")?;
        self.check_data_rights(&self.fs, "FS")?;
        self.check_data_rights(&self.gs, "GS")?;
        self.check_tr_rights()?;
        self.check_ldtr_rights()?;

        for (seg, err) in [
            (&self.cs, "CS.rights: Invalid value (G)"),
            (&self.ss, "SS.rights: Invalid value (G)"),
            (&self.ds, "DS.rights: Invalid value (G)"),
            (&self.es, "ES.rights: Invalid value (G)"),
            (&self.fs, "FS.rights: Invalid value (G)"),
            (&self.gs, "GS.rights: Invalid value (G)"),
            (&self.tr, "TR.rights: Invalid value (G)"),
            (&self.ldtr, "LDTR.rights: Invalid value (G)"),
        ] {
            if seg.rights.unusable() {
                continue;
            }
            if seg.limit & 0xFFF != 0xFFF && seg.rights.granularity() != Granularity::Byte {
                return Err(err);
            }
            if seg.limit >> 20 != 0 && seg.rights.granularity() != Granularity::KByte {
                return Err(err);
            }
        }
        Ok(())
    }

    fn check_cs_rights(&self) -> Result<(), &'static str> {
        let rights = self.cs.rights;
        if rights.unusable() {
            return Err("CS.rights: unusable");
        }
        let ty = rights.seg_type();
        let type_ok = matches!(ty, 9 | 11 | 13 | 15) || (self.unrestricted_guest && ty == 3);
        if !type_ok {
            return Err("CS.rights: Invalid value (type)");
        }
        if !rights.is_code_or_data() {
            return Err("CS.rights: Invalid value (S)");
        }
        match ty {
            3 if rights.dpl() != 0 => return Err("CS.rights: Invalid value (DPL)"),
            9 | 11 if rights.dpl() != self.ss.rights.dpl() => {
                return Err("CS.rights: Invalid value (DPL)")
            }
            13 | 15 if rights.dpl() > self.ss.rights.dpl() => {
                return Err("CS.rights: Invalid value (DPL)")
            }
            _ => {}
        }
        if !rights.present() {
            return Err("CS.rights: Invalid value (P)");
        }
        if rights.reserved_bits() != 0 {
            return Err("CS.rights: reserved bits set");
        }
        Ok(())
    }

    fn check_ss_rights(&self) -> Result<(), &'static str> {
        let rights = self.ss.rights;
        if rights.unusable() {
            return Ok(());
        }
        if !matches!(rights.seg_type(), 3 | 7) {
            return Err("SS.rights: Invalid value (type)");
        }
        if !rights.is_code_or_data() {
            return Err("SS.rights: Invalid value (S)");
        }
        if !self.unrestricted_guest && rights.dpl() != self.ss.rpl() as u8 {
            return Err("SS.rights: Invalid value (DPL)");
        }
        if (self.cs.rights.seg_type() == 3 || self.cr0 & CR0_PE == 0) && rights.dpl() != 0 {
            return Err("SS.rights: Invalid value (DPL)");
        }
        if !rights.present() {
            return Err("SS.rights: Invalid value (P)");
        }
        if rights.reserved_bits() != 0 {
            return Err("SS.rights: reserved bits set");
        }
        Ok(())
    }

    fn check_data_rights(&self, seg: &Segment, name: &'static str) -> Result<(), &'static str> {
        let rights = seg.rights;
        if rights.unusable() {
            return Ok(());
        }
        let ty = rights.seg_type();
        // Accessed, and readable if it is a code segment.
        if ty & 1 == 0 || (ty & 8 != 0 && ty & 2 == 0) {
            return match name {
                "DS" => Err("DS.rights: Invalid value (type)"),
                "ES" => Err("ES.rights: Invalid value (type)"),
                "FS" => Err("FS.rights: Invalid value (type)"),
                _ => Err("GS.rights: Invalid value (type)"),
            };
        }
        if !rights.is_code_or_data() {
            return match name {
                "DS" => Err("DS.rights: Invalid value (S)"),
                "ES" => Err("ES.rights: Invalid value (S)"),
                "FS" => Err("FS.rights: Invalid value (S)"),
                _ => Err("GS.rights: Invalid value (S)"),
            };
        }
        if !rights.present() {
            return match name {
                "DS" => Err("DS.rights: Invalid value (P)"),
                "ES" => Err("ES.rights: Invalid value (P)"),
                "FS" => Err("FS.rights: Invalid value (P)"),
                _ => Err("GS.rights: Invalid value (P)"),
            };
        }
        Ok(())
    }

    fn check_tr_rights(&self) -> Result<(), &'static str> {
        let rights = self.tr.rights;
        if rights.unusable() {
            return Err("TR.rights: unusable");
        }
        let type_ok = match rights.seg_type() {
            11 => true,
            3 => !self.entry_ia32e,
            _ => false,
        };
        if !type_ok {
            return Err("TR.rights: Invalid value (type)");
        }
        if rights.is_code_or_data() {
            return Err("TR.rights: Invalid value (S)");
        }
        if !rights.present() {
            return Err("TR.rights: Invalid value (P)");
        }
        if rights.reserved_bits() != 0 {
            return Err("TR.rights: reserved bits set");
        }
        Ok(())
    }

    fn check_ldtr_rights(&self) -> Result<(), &'static str> {
        let rights = self.ldtr.rights;
        if rights.unusable() {
            return Ok(());
        }
        if rights.seg_type() != seg_type::LDT {
            return Err("LDTR.rights: Invalid value (type)");
        }
        if rights.is_code_or_data() {
            return Err("LDTR.rights: Invalid value (S)");
        }
        if !rights.present() {
            return Err("LDTR.rights: Invalid value (P)");
        }
        Ok(())
    }

    fn check_descriptor_tables(&self) -> Result<(), &'static str> {
        if !is_canonical(self.gdtr_base) {
            return Err("GDTR.base: non-canonical");
        }
        if !is_canonical(self.idtr_base) {
            return Err("IDTR.base: non-canonical");
        }
        if self.gdtr_limit >> 16 != 0 {
            return Err("GDTR.limit: upper bits set");
        }
        if self.idtr_limit >> 16 != 0 {
            return Err("IDTR.limit: upper bits set");
        }
        Ok(())
    }

    fn check_rip_rflags(&self) -> Result<(), &'static str> {
        if !(self.entry_ia32e && self.cs.rights.long_mode()) && self.rip >> 32 != 0 {
            return Err("RIP: upper bits set");
        }
        const RFLAGS_RESERVED: u64 = !0x3F_7FD7 | (1 << 3) | (1 << 5) | (1 << 15);
        if self.rflags & RFLAGS_RESERVED != 0 {
            return Err("RFLAGS: reserved bit set");
        }
        if self.rflags & 0x2 == 0 {
            return Err("RFLAGS: bit 1 clear");
        }
        if (self.cr0 & CR0_PE == 0 || self.entry_ia32e) && self.rflags & RFLAGS_VM != 0 {
            return Err("RFLAGS: VM set");
        }
        if self.entry_intr_info >> 31 != 0 && self.rflags & RFLAGS_IF == 0 {
            return Err("RFLAGS: IF clear with pending interrupt");
        }
        Ok(())
    }

    fn check_non_register_state(&self) -> Result<(), &'static str> {
        if self.activity_state != 0 {
            return Err("activity state: not Active");
        }
        if self.interruptibility >> 5 != 0 {
            return Err("interruptibility: reserved bits set");
        }
        if self.vmcs_link_pointer != u64::MAX {
            return Err("VMCS link pointer: not all-ones");
        }
        Ok(())
    }
}

/// The gate: run before every VM entry and panic on the first violated
/// rule, naming it.
pub fn partial_check_guest() {
    let state = match GuestState::capture() {
        Ok(state) => state,
        Err(e) => panic!("failed to snapshot guest state: {:?}", e),
    };
    if let Err(rule) = state.validate() {
        panic!("Guest state check failed: {}", rule);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vtx::segmentation::Granularity;

    fn flat_code() -> Segment {
        Segment {
            selector: 0,
            base: 0,
            limit: 0xFFFF_FFFF,
            rights: SegmentAccessRights::new(
                seg_type::CODE_ER_ACCESSED,
                true,
                0,
                true,
                false,
                true,
                Granularity::KByte,
            ),
        }
    }

    fn flat_data() -> Segment {
        Segment {
            selector: 0,
            base: 0,
            limit: 0xFFFF_FFFF,
            rights: SegmentAccessRights::new(
                seg_type::DATA_RW_ACCESSED,
                true,
                0,
                true,
                false,
                true,
                Granularity::KByte,
            ),
        }
    }

    /// The state `setup_vmcs_guest` establishes: 32-bit protected mode,
    /// paging off, flat segments.
    fn initial_guest_state() -> GuestState {
        GuestState {
            unrestricted_guest: true,
            entry_ia32e: false,
            load_efer: true,
            entry_intr_info: 0,

            // Typical hardware values.
            cr0_fixed0: 0x8000_0021,
            cr0_fixed1: 0xFFFF_FFFF,
            cr4_fixed0: 1 << 13,
            cr4_fixed1: 0x003F_FFFF,

            cr0: 0x31, // PE | ET | NE
            cr3: 0,
            cr4: 1 << 13, // VMXE
            efer: 0,
            pat: 0x0007_0406_0007_0406,
            sysenter_esp: 0,
            sysenter_eip: 0,

            cs: flat_code(),
            ss: flat_data(),
            ds: flat_data(),
            es: flat_data(),
            fs: flat_data(),
            gs: flat_data(),
            tr: Segment {
                selector: 0,
                base: 0,
                limit: 0,
                rights: SegmentAccessRights::new(
                    seg_type::TSS_BUSY,
                    false,
                    0,
                    true,
                    false,
                    false,
                    Granularity::Byte,
                ),
            },
            ldtr: Segment {
                selector: 0,
                base: 0xDEAD00,
                limit: 0,
                rights: SegmentAccessRights::new(
                    seg_type::LDT,
                    false,
                    0,
                    true,
                    false,
                    false,
                    Granularity::Byte,
                ),
            },

            gdtr_base: 0,
            gdtr_limit: 0,
            idtr_base: 0,
            idtr_limit: 0,

            rip: 0x10_0000,
            rflags: 0x2,

            activity_state: 0,
            interruptibility: 0,
            vmcs_link_pointer: u64::MAX,
        }
    }

    #[test]
    fn initial_protected_mode_state_is_valid() {
        assert_eq!(initial_guest_state().validate(), Ok(()));
    }

    #[test]
    fn cs_ss_dpl_mismatch_names_the_dpl_rule() {
        let mut state = initial_guest_state();
        // CS.type = 11 (CodeERA); SS.DPL raised to 3.
        let mut ss = state.ss;
        ss.rights = SegmentAccessRights::new(
            seg_type::DATA_RW_ACCESSED,
            true,
            3,
            true,
            false,
            true,
            Granularity::KByte,
        );
        state.ss = ss;
        assert_eq!(state.validate(), Err("CS.rights: Invalid value (DPL)"));
    }

    #[test]
    fn paging_requires_protection() {
        let mut state = initial_guest_state();
        state.cr0 = (state.cr0 | (1 << 31)) & !1; // PG without PE
        assert_eq!(state.validate(), Err("CR0: PG set without PE"));
    }

    #[test]
    fn pcide_is_rejected_outside_long_mode() {
        let mut state = initial_guest_state();
        state.cr4 |= CR4_PCIDE;
        // PCIDE is also outside the allowed-1 envelope here; widen it so
        // the specific rule fires.
        state.cr4_fixed1 |= CR4_PCIDE;
        assert_eq!(state.validate(), Err("CR4: PCIDE set outside IA-32e mode"));
    }

    #[test]
    fn ia32e_entry_needs_pg_and_pae() {
        let mut state = initial_guest_state();
        state.entry_ia32e = true;
        state.efer = EFER_LMA | EFER_LME;
        assert_eq!(
            state.validate(),
            Err("entry: IA-32e mode without CR0.PG and CR4.PAE")
        );
    }

    #[test]
    fn efer_lma_must_track_the_entry_control() {
        let mut state = initial_guest_state();
        state.efer = EFER_LMA;
        assert_eq!(
            state.validate(),
            Err("IA32_EFER: LMA != IA-32e entry control")
        );
    }

    #[test]
    fn pat_entries_are_checked() {
        let mut state = initial_guest_state();
        state.pat = 0x0000_0000_0000_0002; // 2 is not a valid memory type
        assert_eq!(state.validate(), Err("IA32_PAT: invalid memory type"));
    }

    #[test]
    fn tr_selector_must_reference_the_gdt() {
        let mut state = initial_guest_state();
        state.tr.selector = 0x4; // TI
        assert_eq!(state.validate(), Err("TR.selector: TI set"));
    }

    #[test]
    fn granularity_must_match_the_limit() {
        let mut state = initial_guest_state();
        let mut ds = state.ds;
        ds.limit = 0xFFFF; // low 12 bits all ones, fine for KByte...
        ds.rights = SegmentAccessRights::new(
            seg_type::DATA_RW_ACCESSED,
            true,
            0,
            true,
            false,
            true,
            Granularity::KByte,
        );
        state.ds = ds;
        assert_eq!(state.validate(), Ok(()));

        // ...but a limit above 1 MiB with byte granularity is not.
        let mut ds = state.ds;
        ds.limit = 0x3F_FFFF;
        ds.rights = SegmentAccessRights::new(
            seg_type::DATA_RW_ACCESSED,
            true,
            0,
            true,
            false,
            true,
            Granularity::Byte,
        );
        state.ds = ds;
        assert_eq!(state.validate(), Err("DS.rights: Invalid value (G)"));
    }

    #[test]
    fn rflags_reserved_bit_one_must_be_set() {
        let mut state = initial_guest_state();
        state.rflags = 0;
        assert_eq!(state.validate(), Err("RFLAGS: bit 1 clear"));
    }

    #[test]
    fn link_pointer_must_stay_all_ones() {
        let mut state = initial_guest_state();
        state.vmcs_link_pointer = 0;
        assert_eq!(state.validate(), Err("VMCS link pointer: not all-ones"));
    }

    #[test]
    fn long_mode_guest_state_is_valid_too() {
        // The state the guest reaches after enabling paging with LME set.
        let mut state = initial_guest_state();
        state.entry_ia32e = true;
        state.cr0 |= 1 << 31;
        state.cr4 |= CR4_PAE;
        state.cr3 = 0x200_0000;
        state.efer = EFER_LME | EFER_LMA;
        assert_eq!(state.validate(), Ok(()));
    }
}
