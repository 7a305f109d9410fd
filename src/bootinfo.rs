//! Validation of the loader → kernel handoff.
//!
//! Runs before any allocator exists, so the error paths must not
//! allocate: details go to the log, the error itself carries only its
//! kind.

use bootproto::BootInfo;

use crate::error::HvResult;

/// Check the handoff record the entry stub received. Everything else the
/// kernel does is downstream of this pointer, so a bad magic aborts
/// before any other subsystem is touched.
pub fn validate(boot_info: &'static BootInfo) -> HvResult<&'static BootInfo> {
    if boot_info.magic != bootproto::MAGIC {
        error!(
            "boot info magic mismatch: expected {:#x}, got {:#x}",
            bootproto::MAGIC,
            boot_info.magic
        );
        return hv_result_err!(InvalidMagic);
    }
    if boot_info.memory_map.descriptors.is_null() || boot_info.memory_map.descriptor_size == 0 {
        error!("boot info carries an empty memory map");
        return hv_result_err!(BadAddress);
    }
    if boot_info.guest.kernel_base == 0 || boot_info.guest.kernel_size == 0 {
        error!("boot info carries no guest kernel image");
        return hv_result_err!(BadAddress);
    }
    Ok(boot_info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use bootproto::{GuestInfo, MemoryMap};

    fn boot_info(magic: u64) -> BootInfo {
        static DESC: bootproto::MemoryDescriptor = bootproto::MemoryDescriptor {
            ty: bootproto::MEMORY_TYPE_CONVENTIONAL,
            physical_start: 0,
            virtual_start: 0,
            number_of_pages: 1,
            attribute: 0,
        };
        BootInfo {
            magic,
            memory_map: MemoryMap {
                descriptors: &DESC,
                size: core::mem::size_of::<bootproto::MemoryDescriptor>(),
                descriptor_size: core::mem::size_of::<bootproto::MemoryDescriptor>(),
                map_key: 0,
            },
            guest: GuestInfo {
                kernel_base: 0x100000,
                kernel_size: 0x1000,
                initrd_base: 0,
                initrd_size: 0,
            },
            acpi_rsdp: 0,
        }
    }

    #[test]
    fn rejects_zero_magic() {
        let info = Box::leak(Box::new(boot_info(0)));
        assert_eq!(validate(info).unwrap_err().kind(), ErrorKind::InvalidMagic);
    }

    #[test]
    fn rejects_a_missing_guest_image() {
        let mut info = boot_info(bootproto::MAGIC);
        info.guest.kernel_size = 0;
        let info = Box::leak(Box::new(info));
        assert_eq!(validate(info).unwrap_err().kind(), ErrorKind::BadAddress);
    }

    #[test]
    fn accepts_the_agreed_magic() {
        let info = Box::leak(Box::new(boot_info(bootproto::MAGIC)));
        assert!(validate(info).is_ok());
    }
}
