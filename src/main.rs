//! Valkyrie: a minimal type-1 hypervisor for Intel VT-x.
//!
//! The UEFI loader drops us here with boot services gone and an identity
//! mapping in place. Bring-up order: console, descriptor tables, PIC,
//! memory, direct map, ACPI, then hand the CPU to the VMX core, which
//! never gives it back.

#![cfg_attr(not(test), no_std)]
#![cfg_attr(not(test), no_main)]
#![cfg_attr(test, allow(dead_code))]

#[macro_use]
extern crate alloc;
#[macro_use]
extern crate log;
#[macro_use]
extern crate lazy_static;

#[macro_use]
mod logging;
#[macro_use]
mod error;

mod acpi;
mod bootinfo;
mod consts;
mod memory;

#[cfg(not(test))]
mod lang;

#[cfg(target_arch = "x86_64")]
#[path = "arch/x86_64/mod.rs"]
mod arch;

use bootproto::BootInfo;

use arch::vmx::Vcpu;
use consts::KERNEL_STACK_SIZE;
use error::HvResult;

// Boot stack, linked into its own section so the guard slot below it can
// stay out of every mapping the linker script hands out.
core::arch::global_asm!(
    r#"
.section .stack, "aw", @nobits
.balign 16
.global __stack_bottom
__stack_bottom:
.space {stack_size}
.global __stack_top
__stack_top:
"#,
    stack_size = const KERNEL_STACK_SIZE,
);

/// ELF entry point. The loader calls with the Win64 convention: the
/// boot-info pointer arrives in RCX and must survive until the
/// trampoline picks it up, so the only work here is the stack switch.
/// RBP is zeroed to terminate stack traces.
#[cfg(not(test))]
#[unsafe(naked)]
#[no_mangle]
pub unsafe extern "win64" fn kernel_entry(_boot_info: *const BootInfo) -> ! {
    core::arch::naked_asm!(
        "cli",
        "lea rsp, [rip + __stack_top]",
        "xor ebp, ebp",
        "call {trampoline}",
        trampoline = sym kernel_trampoline,
    );
}

/// Win64 → kernel bridge. Never returns; errors become panics.
extern "win64" fn kernel_trampoline(boot_info: &'static BootInfo) -> ! {
    // kernel_main only ever returns an error; success ends in the vCPU
    // loop.
    let err = kernel_main(boot_info).unwrap_err();
    panic!("kernel_main failed: {:?}", err);
}

fn kernel_main(boot_info: &'static BootInfo) -> HvResult {
    logging::init();
    println!(
        "\nValkyrie hypervisor\n\
        build_mode = {}\n\
        log_level = {}\n",
        option_env!("MODE").unwrap_or("dev"),
        option_env!("LOG").unwrap_or("info"),
    );

    let boot_info = bootinfo::validate(boot_info)?;
    info!(
        "boot info OK: guest kernel {} KiB, initrd {} KiB, RSDP @ {:#x}",
        boot_info.guest.kernel_size >> 10,
        boot_info.guest.initrd_size >> 10,
        boot_info.acpi_rsdp
    );

    arch::tables::init();
    arch::exception::init();
    arch::pic::init();
    x86_64::instructions::interrupts::enable();

    let ram_top = memory::init(&boot_info.memory_map);
    // The direct map must outlive everything below; leak it deliberately.
    let host_pt = arch::paging::init(ram_top)?;
    core::mem::forget(host_pt);

    match acpi::init(boot_info.acpi_rsdp as usize) {
        Ok(_fadt) => {}
        Err(e) => warn!("ACPI discovery failed: {:?}", e),
    }

    let guest_kernel = unsafe {
        core::slice::from_raw_parts(
            boot_info.guest.kernel_base as *const u8,
            boot_info.guest.kernel_size,
        )
    };
    let guest_initrd = (boot_info.guest.initrd_base != 0).then(|| unsafe {
        core::slice::from_raw_parts(
            boot_info.guest.initrd_base as *const u8,
            boot_info.guest.initrd_size,
        )
    });

    let mut vcpu = Vcpu::new(guest_kernel, guest_initrd)?;
    vcpu.run()
}
