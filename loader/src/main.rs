//! UEFI bootloader: load the kernel ELF and the guest images from the
//! ESP, gather the platform facts the kernel needs, leave boot services
//! and jump to the kernel entry with a [`bootproto::BootInfo`].

#![no_main]
#![no_std]

mod load;

use core::ptr::addr_of;

use log::info;
use uefi::prelude::*;
use uefi::table::boot::{MemoryMap as _, MemoryType};
use uefi::table::cfg::ACPI2_GUID;

use bootproto::{BootInfo, GuestInfo, MemoryMap};

/// Filled before ExitBootServices, handed to the kernel afterwards. The
/// loader image stays resident (LoaderCode/LoaderData), so a static is
/// the simplest memory that survives the jump.
static mut BOOT_INFO: BootInfo = BootInfo {
    magic: bootproto::MAGIC,
    memory_map: MemoryMap {
        descriptors: core::ptr::null(),
        size: 0,
        descriptor_size: 0,
        map_key: 0,
    },
    guest: GuestInfo {
        kernel_base: 0,
        kernel_size: 0,
        initrd_base: 0,
        initrd_size: 0,
    },
    acpi_rsdp: 0,
};

#[entry]
fn main(image: Handle, mut system_table: SystemTable<Boot>) -> Status {
    uefi::helpers::init(&mut system_table).unwrap();
    info!("Valkyrie loader starting");

    // Everything that can fail happens while boot services are alive, so
    // failures surface as a plain UEFI status.
    let err = run(image, system_table).unwrap_err();
    err.status()
}

fn run(image: Handle, system_table: SystemTable<Boot>) -> uefi::Result<core::convert::Infallible> {
    let bs = system_table.boot_services();

    // Kernel ELF: PT_LOAD segments go to their physical addresses.
    let kernel_elf = load::read_file(bs, image, cstr16!("valkyrie.elf"))?;
    let entry_point = load::load_elf(bs, kernel_elf)?;
    info!("kernel loaded, entry @ {:#x}", entry_point);

    // Guest payloads stay as flat blobs in LoaderData pages.
    let (kernel_base, kernel_size) = {
        let blob = load::read_file(bs, image, cstr16!("bzImage"))?;
        (blob.as_ptr() as u64, blob.len())
    };
    info!("guest kernel: {} KiB", kernel_size >> 10);
    let (initrd_base, initrd_size) = match load::read_file(bs, image, cstr16!("rootfs.cpio.gz")) {
        Ok(blob) => (blob.as_ptr() as u64, blob.len()),
        Err(_) => {
            info!("no rootfs.cpio.gz, booting without an initramfs");
            (0, 0)
        }
    };

    // ACPI 2.0 RSDP from the configuration tables.
    let acpi_rsdp = system_table
        .config_table()
        .iter()
        .find(|entry| entry.guid == ACPI2_GUID)
        .map(|entry| entry.address as u64)
        .unwrap_or(0);
    info!("ACPI 2.0 RSDP @ {:#x}", acpi_rsdp);

    unsafe {
        BOOT_INFO.guest = GuestInfo {
            kernel_base,
            kernel_size,
            initrd_base,
            initrd_size,
        };
        BOOT_INFO.acpi_rsdp = acpi_rsdp;
    }

    info!("exiting boot services");
    // The uefi crate re-fetches the map and retries on a stale map key.
    let (_runtime, final_map) =
        unsafe { system_table.exit_boot_services(MemoryType::LOADER_DATA) };

    let meta = final_map.meta();
    unsafe {
        BOOT_INFO.memory_map = MemoryMap {
            descriptors: final_map.buffer().as_ptr().cast(),
            size: meta.map_size,
            descriptor_size: meta.desc_size,
            // Opaque to us; forwarded verbatim for the kernel's record.
            map_key: core::mem::transmute_copy(&meta.map_key),
        };
    }

    unsafe {
        let entry: extern "win64" fn(*const BootInfo) -> ! =
            core::mem::transmute(entry_point as usize);
        entry(addr_of!(BOOT_INFO));
    }
}
