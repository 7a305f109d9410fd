//! IDT construction and exception/interrupt entry.
//!
//! All 256 vectors funnel through assembler stubs into one common entry
//! that builds a [`TrapFrame`]. Gate descriptors are written by hand; the
//! layout is the 16-byte long-mode interrupt gate.

use spin::Mutex;
use x86_64::instructions::tables::lidt;
use x86_64::structures::DescriptorTablePointer;
use x86_64::VirtAddr;

use super::context::GeneralRegisters;
use super::pic;
use super::tables::GdtStruct;

core::arch::global_asm!(
    r#"
.altmacro

// One stub per vector. The CPU pushes an error code for vectors
// 8, 10-14, 17 and 21; every other stub pushes a dummy so the frame
// layout is uniform.
.macro vector_stub num
    .align 8
vector_\num:
    .if \num == 8 || (\num >= 10 && \num <= 14) || \num == 17 || \num == 21
    .else
    push 0
    .endif
    push \num
    jmp {common_entry}
.endm

.macro vector_addr num
    .quad vector_\num
.endm

.section .text
.set i, 0
.rept 256
    vector_stub %i
    .set i, i + 1
.endr

.section .rodata
.align 8
.global exception_entries
exception_entries:
.set i, 0
.rept 256
    vector_addr %i
    .set i, i + 1
.endr
"#,
    common_entry = sym common_exception_entry,
);

#[allow(dead_code)]
#[allow(non_snake_case)]
#[allow(non_upper_case_globals)]
pub mod ExceptionType {
    pub const DivideError: u8 = 0;
    pub const Debug: u8 = 1;
    pub const NonMaskableInterrupt: u8 = 2;
    pub const Breakpoint: u8 = 3;
    pub const Overflow: u8 = 4;
    pub const BoundRangeExceeded: u8 = 5;
    pub const InvalidOpcode: u8 = 6;
    pub const DeviceNotAvailable: u8 = 7;
    pub const DoubleFault: u8 = 8;
    pub const InvalidTSS: u8 = 10;
    pub const SegmentNotPresent: u8 = 11;
    pub const StackSegmentFault: u8 = 12;
    pub const GeneralProtectionFault: u8 = 13;
    pub const PageFault: u8 = 14;
    pub const FloatingPointException: u8 = 16;
    pub const AlignmentCheck: u8 = 17;
    pub const MachineCheck: u8 = 18;
    pub const SIMDFloatingPointException: u8 = 19;
    pub const VirtualizationException: u8 = 20;
    pub const ControlProtection: u8 = 21;

    pub const IrqStart: u8 = 32;
    pub const IrqEnd: u8 = 47;
}

#[repr(C)]
#[derive(Debug)]
pub struct TrapFrame {
    // Pushed by `common_exception_entry`.
    pub regs: GeneralRegisters,

    // Pushed by the vector stub.
    pub num: usize,
    pub error_code: usize,

    // Pushed by the CPU.
    pub rip: usize,
    pub cs: usize,
    pub rflags: usize,
    pub rsp: usize,
    pub ss: usize,
}

/// A 16-byte long-mode interrupt gate.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct IdtEntry {
    offset_low: u16,
    selector: u16,
    /// P=1, DPL=0, type=0xE (interrupt gate), IST=0.
    options: u16,
    offset_mid: u16,
    offset_high: u32,
    reserved: u32,
}

static_assertions::const_assert_eq!(core::mem::size_of::<IdtEntry>(), 16);

impl IdtEntry {
    const fn missing() -> Self {
        Self {
            offset_low: 0,
            selector: 0,
            options: 0,
            offset_mid: 0,
            offset_high: 0,
            reserved: 0,
        }
    }

    fn new(handler: usize, selector: u16) -> Self {
        Self {
            offset_low: handler as u16,
            selector,
            options: 0x8E00,
            offset_mid: (handler >> 16) as u16,
            offset_high: (handler >> 32) as u32,
            reserved: 0,
        }
    }
}

pub struct IdtStruct {
    table: [IdtEntry; 256],
    pointer: DescriptorTablePointer,
}

lazy_static! {
    pub static ref IDT: Mutex<IdtStruct> = Mutex::new(IdtStruct::new());
}

impl IdtStruct {
    fn new() -> Self {
        extern "C" {
            #[link_name = "exception_entries"]
            static ENTRIES: [usize; 256];
        }
        let mut table = [IdtEntry::missing(); 256];
        for (i, entry) in table.iter_mut().enumerate() {
            *entry = IdtEntry::new(
                unsafe { ENTRIES[i] },
                GdtStruct::KCODE_SELECTOR.0,
            );
        }
        Self {
            table,
            pointer: DescriptorTablePointer {
                limit: 0,
                base: VirtAddr::zero(),
            },
        }
    }

    pub fn pointer(&self) -> &DescriptorTablePointer {
        &self.pointer
    }

    pub fn load(&mut self) {
        self.pointer = DescriptorTablePointer {
            base: VirtAddr::new(self.table.as_ptr() as u64),
            limit: (core::mem::size_of_val(&self.table) - 1) as u16,
        };
        unsafe { lidt(&self.pointer) };
    }
}

extern "sysv64" fn exception_handler(frame: &mut TrapFrame) {
    trace!("Exception or interrupt #{:#x}", frame.num);
    match frame.num as u8 {
        ExceptionType::NonMaskableInterrupt => warn!("Unhandled exception: NMI"),
        ExceptionType::PageFault => {
            panic!(
                "Hypervisor page fault @ {:#x?}, error_code={:#x}: {:#x?}",
                x86_64::registers::control::Cr2::read(),
                frame.error_code,
                frame
            );
        }
        ExceptionType::IrqStart..=ExceptionType::IrqEnd => {
            let irq = frame.num as u8 - ExceptionType::IrqStart;
            trace!("IRQ {}", irq);
            pic::eoi(pic::IrqLine::try_from(irq).unwrap());
        }
        _ => {
            error!("{:#x?}", frame);
            panic!("Unhandled exception #{:#x}", frame.num);
        }
    }
}

#[unsafe(naked)]
unsafe extern "sysv64" fn common_exception_entry() -> ! {
    core::arch::naked_asm!(
        save_regs_to_stack!(),
        "mov rdi, rsp",
        "call {handler}",
        restore_regs_from_stack!(),
        "add rsp, 16", // skip num, error_code
        "iretq",
        handler = sym exception_handler,
    );
}

pub fn init() {
    IDT.lock().load();
    info!("IDT loaded, 256 vectors installed");
}
