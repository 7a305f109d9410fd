//! Legacy 8259 programmable interrupt controller pair.
//!
//! The guest owns no interrupt hardware in this design; the host PIC is
//! remapped away from the exception range and fully masked, and lines are
//! opened individually if the hypervisor ever wants them.

use numeric_enum_macro::numeric_enum;
use spin::Mutex;
use x86_64::instructions::port::Port;

const PRIMARY_COMMAND: u16 = 0x20;
const PRIMARY_DATA: u16 = 0x21;
const SECONDARY_COMMAND: u16 = 0xA0;
const SECONDARY_DATA: u16 = 0xA1;

/// ICW1: initialization required, ICW4 follows.
const ICW1_INIT_ICW4: u8 = 0x11;
/// ICW4: 8086/88 mode.
const ICW4_8086: u8 = 0x01;
/// OCW2: non-specific end of interrupt.
const OCW2_EOI: u8 = 0x20;

/// Vector base of the primary PIC after remapping.
pub const PRIMARY_VECTOR_OFFSET: u8 = 32;
/// Vector base of the secondary PIC after remapping.
pub const SECONDARY_VECTOR_OFFSET: u8 = 40;

numeric_enum! {
    #[repr(u8)]
    #[derive(Debug, PartialEq, Eq, Clone, Copy)]
    pub enum IrqLine {
        Timer = 0,
        Keyboard = 1,
        Cascade = 2,
        Serial2 = 3,
        Serial1 = 4,
        Parallel23 = 5,
        Floppy = 6,
        Parallel1 = 7,
        RtcTimer = 8,
        Acpi = 9,
        Open1 = 10,
        Open2 = 11,
        Mouse = 12,
        Coprocessor = 13,
        PrimaryAta = 14,
        SecondaryAta = 15,
    }
}

impl IrqLine {
    fn is_secondary(self) -> bool {
        self as u8 >= 8
    }

    /// Bit of this line in its controller's mask register.
    fn mask_bit(self) -> u8 {
        1 << (self as u8 % 8)
    }
}

struct Pic {
    primary_command: Port<u8>,
    primary_data: Port<u8>,
    secondary_command: Port<u8>,
    secondary_data: Port<u8>,
}

static PIC: Mutex<Pic> = Mutex::new(Pic::new());

impl Pic {
    const fn new() -> Self {
        Self {
            primary_command: Port::new(PRIMARY_COMMAND),
            primary_data: Port::new(PRIMARY_DATA),
            secondary_command: Port::new(SECONDARY_COMMAND),
            secondary_data: Port::new(SECONDARY_DATA),
        }
    }

    unsafe fn remap_and_mask(&mut self) {
        // ICW1: start initialization on both controllers.
        self.primary_command.write(ICW1_INIT_ICW4);
        self.secondary_command.write(ICW1_INIT_ICW4);
        // ICW2: vector offsets.
        self.primary_data.write(PRIMARY_VECTOR_OFFSET);
        self.secondary_data.write(SECONDARY_VECTOR_OFFSET);
        // ICW3: secondary on IR line 2 of the primary.
        self.primary_data.write(1 << 2);
        self.secondary_data.write(2);
        // ICW4.
        self.primary_data.write(ICW4_8086);
        self.secondary_data.write(ICW4_8086);
        // Mask every line.
        self.primary_data.write(0xFF);
        self.secondary_data.write(0xFF);
    }
}

/// Remap both controllers and mask all 16 lines.
pub fn init() {
    unsafe { PIC.lock().remap_and_mask() };
    info!(
        "PIC remapped to vectors {}..{}, all IRQs masked",
        PRIMARY_VECTOR_OFFSET,
        SECONDARY_VECTOR_OFFSET + 8
    );
}

/// Mask (disable) one IRQ line.
pub fn set_mask(line: IrqLine) {
    let mut pic = PIC.lock();
    unsafe {
        if line.is_secondary() {
            let cur = pic.secondary_data.read();
            pic.secondary_data.write(cur | line.mask_bit());
        } else {
            let cur = pic.primary_data.read();
            pic.primary_data.write(cur | line.mask_bit());
        }
    }
}

/// Unmask (enable) one IRQ line. Unmasking a secondary line also opens
/// the cascade line on the primary.
pub fn unset_mask(line: IrqLine) {
    let mut pic = PIC.lock();
    unsafe {
        if line.is_secondary() {
            let cur = pic.secondary_data.read();
            pic.secondary_data.write(cur & !line.mask_bit());
            let cur = pic.primary_data.read();
            pic.primary_data.write(cur & !IrqLine::Cascade.mask_bit());
        } else {
            let cur = pic.primary_data.read();
            pic.primary_data.write(cur & !line.mask_bit());
        }
    }
}

/// Signal end-of-interrupt. The secondary controller needs its own EOI
/// for lines 8..16, and the primary always needs one.
pub fn eoi(line: IrqLine) {
    let mut pic = PIC.lock();
    unsafe {
        if line.is_secondary() {
            pic.secondary_command.write(OCW2_EOI);
        }
        pic.primary_command.write(OCW2_EOI);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_bits_fold_into_one_controller_byte() {
        assert_eq!(IrqLine::Timer.mask_bit(), 0x01);
        assert_eq!(IrqLine::Parallel1.mask_bit(), 0x80);
        assert_eq!(IrqLine::RtcTimer.mask_bit(), 0x01);
        assert_eq!(IrqLine::SecondaryAta.mask_bit(), 0x80);
        assert!(!IrqLine::Parallel1.is_secondary());
        assert!(IrqLine::RtcTimer.is_secondary());
    }

    #[test]
    fn irq_lines_decode_from_vectors() {
        assert_eq!(IrqLine::try_from(0u8), Ok(IrqLine::Timer));
        assert_eq!(IrqLine::try_from(15u8), Ok(IrqLine::SecondaryAta));
        assert!(IrqLine::try_from(16u8).is_err());
    }
}
