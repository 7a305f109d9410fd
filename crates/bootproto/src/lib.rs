//! Types passed from the UEFI loader to the kernel entry point.
//!
//! The kernel must not link against the `uefi` crate, so the pieces of
//! firmware state it consumes (the memory map above all) are re-described
//! here with the exact in-memory layout UEFI hands out.

#![cfg_attr(not(test), no_std)]

/// Value of [`BootInfo::magic`]. ASCII "VALKYRIE".
pub const MAGIC: u64 = 0x5641_4c4b_5952_4945;

/// The single argument of the kernel entry function.
#[derive(Debug)]
#[repr(C)]
pub struct BootInfo {
    /// Must equal [`MAGIC`]; anything else aborts the boot.
    pub magic: u64,
    /// Final UEFI memory map, obtained at ExitBootServices time.
    pub memory_map: MemoryMap,
    /// Guest kernel image and initial ramdisk.
    pub guest: GuestInfo,
    /// Physical address of the ACPI 2.0 RSDP, 0 if the firmware has none.
    pub acpi_rsdp: u64,
}

/// Raw UEFI memory map. `descriptors` points at a buffer of `size` bytes
/// holding descriptors every `descriptor_size` bytes (the stride is set by
/// the firmware and may exceed `size_of::<MemoryDescriptor>()`).
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct MemoryMap {
    pub descriptors: *const MemoryDescriptor,
    pub size: usize,
    pub descriptor_size: usize,
    pub map_key: usize,
}

/// Location of the images the loader read from the ESP.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct GuestInfo {
    /// Physical address of the Linux bzImage.
    pub kernel_base: u64,
    pub kernel_size: usize,
    /// Physical address of the initramfs (cpio archive), 0 if absent.
    pub initrd_base: u64,
    pub initrd_size: usize,
}

/// Mirror of `EFI_MEMORY_DESCRIPTOR`.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct MemoryDescriptor {
    pub ty: u32,
    pub physical_start: u64,
    pub virtual_start: u64,
    pub number_of_pages: u64,
    pub attribute: u64,
}

/// `EfiLoaderCode`
pub const MEMORY_TYPE_LOADER_CODE: u32 = 1;
/// `EfiLoaderData`
pub const MEMORY_TYPE_LOADER_DATA: u32 = 2;
/// `EfiBootServicesCode`
pub const MEMORY_TYPE_BOOT_SERVICES_CODE: u32 = 3;
/// `EfiBootServicesData`
pub const MEMORY_TYPE_BOOT_SERVICES_DATA: u32 = 4;
/// `EfiConventionalMemory`
pub const MEMORY_TYPE_CONVENTIONAL: u32 = 7;

impl MemoryDescriptor {
    /// Whether the region is free RAM once boot services have exited.
    /// Loader allocations (kernel image, guest images, boot info) are
    /// typed `LoaderCode`/`LoaderData` and therefore stay reserved.
    pub fn is_usable(&self) -> bool {
        matches!(
            self.ty,
            MEMORY_TYPE_BOOT_SERVICES_CODE
                | MEMORY_TYPE_BOOT_SERVICES_DATA
                | MEMORY_TYPE_CONVENTIONAL
        )
    }
}

impl MemoryMap {
    /// Iterate descriptors honoring the firmware stride.
    pub fn iter(&self) -> MemoryMapIter {
        MemoryMapIter { map: self, offset: 0 }
    }
}

pub struct MemoryMapIter<'a> {
    map: &'a MemoryMap,
    offset: usize,
}

impl<'a> Iterator for MemoryMapIter<'a> {
    type Item = &'a MemoryDescriptor;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset + core::mem::size_of::<MemoryDescriptor>() > self.map.size {
            return None;
        }
        let ptr = unsafe { self.map.descriptors.cast::<u8>().add(self.offset) };
        self.offset += self.map.descriptor_size;
        Some(unsafe { &*ptr.cast::<MemoryDescriptor>() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iterates_with_firmware_stride() {
        const STRIDE: usize = 48;
        let mut buf = [0u8; STRIDE * 3];
        for (i, chunk) in buf.chunks_mut(STRIDE).enumerate() {
            let desc = MemoryDescriptor {
                ty: MEMORY_TYPE_CONVENTIONAL,
                physical_start: (i as u64) << 20,
                virtual_start: 0,
                number_of_pages: 16,
                attribute: 0,
            };
            let bytes = unsafe {
                core::slice::from_raw_parts(
                    (&desc as *const MemoryDescriptor).cast::<u8>(),
                    core::mem::size_of::<MemoryDescriptor>(),
                )
            };
            chunk[..bytes.len()].copy_from_slice(bytes);
        }
        let map = MemoryMap {
            descriptors: buf.as_ptr().cast(),
            size: buf.len(),
            descriptor_size: STRIDE,
            map_key: 0,
        };
        let starts: Vec<u64> = map.iter().map(|d| d.physical_start).collect();
        assert_eq!(starts, vec![0, 1 << 20, 2 << 20]);
        assert!(map.iter().all(|d| d.is_usable()));
    }
}
