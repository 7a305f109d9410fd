//! Kernel GDT and TSS.
//!
//! The kernel needs exactly one 64-bit code segment and one TSS: data
//! selectors stay null in long mode, and the TSS exists because VM entry
//! refuses a null host TR selector.

use spin::Mutex;
use x86_64::instructions::segmentation::{Segment, CS, DS, ES, SS};
use x86_64::instructions::tables::{lgdt, load_tss};
use x86_64::registers::segmentation::SegmentSelector;
use x86_64::structures::gdt::{Descriptor, DescriptorFlags};
use x86_64::structures::tss::TaskStateSegment;
use x86_64::structures::DescriptorTablePointer;
use x86_64::{PrivilegeLevel, VirtAddr};

static TSS: TaskStateSegment = TaskStateSegment::new();

lazy_static! {
    pub static ref GDT: Mutex<GdtStruct> = Mutex::new(GdtStruct::new());
}

pub struct GdtStruct {
    table: [u64; 8],
    pointer: DescriptorTablePointer,
}

impl GdtStruct {
    pub const KCODE_SELECTOR: SegmentSelector = SegmentSelector::new(1, PrivilegeLevel::Ring0);
    pub const TSS_SELECTOR: SegmentSelector = SegmentSelector::new(2, PrivilegeLevel::Ring0);

    fn new() -> Self {
        let mut table = [0u64; 8];
        table[1] = DescriptorFlags::KERNEL_CODE64.bits();
        match Descriptor::tss_segment(&TSS) {
            Descriptor::SystemSegment(low, high) => {
                table[2] = low;
                table[3] = high;
            }
            _ => unreachable!(),
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

    /// Install the GDT and reload CS, the data selectors and TR.
    pub fn load(&mut self) {
        self.pointer = DescriptorTablePointer {
            base: VirtAddr::new(self.table.as_ptr() as u64),
            limit: (core::mem::size_of_val(&self.table) - 1) as u16,
        };
        unsafe {
            lgdt(&self.pointer);
            CS::set_reg(Self::KCODE_SELECTOR);
            DS::set_reg(SegmentSelector::NULL);
            ES::set_reg(SegmentSelector::NULL);
            SS::set_reg(SegmentSelector::NULL);
            load_tss(Self::TSS_SELECTOR);
        }
    }
}

/// Current GDTR.
pub fn sgdt() -> DescriptorTablePointer {
    let mut gdt_ptr = DescriptorTablePointer {
        limit: 0,
        base: VirtAddr::zero(),
    };
    unsafe { core::arch::asm!("sgdt [{0}]", in(reg) &mut gdt_ptr) };
    gdt_ptr
}

/// Current IDTR.
pub fn sidt() -> DescriptorTablePointer {
    let mut idt_ptr = DescriptorTablePointer {
        limit: 0,
        base: VirtAddr::zero(),
    };
    unsafe { core::arch::asm!("sidt [{0}]", in(reg) &mut idt_ptr) };
    idt_ptr
}

pub fn init() {
    GDT.lock().load();
    info!("GDT/TSS loaded, CS={:#x}", CS::get_reg().0);
}
