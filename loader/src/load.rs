//! ESP file access and ELF segment loading.

use core::slice;

use log::{info, warn};
use uefi::proto::media::file::{File, FileAttribute, FileInfo, FileMode};
use uefi::table::boot::{AllocateType, BootServices, MemoryType};
use uefi::{CStr16, Handle, ResultExt, Status};

use elf::abi::PT_LOAD;
use elf::endian::LittleEndian;
use elf::ElfBytes;

const PAGE_SIZE: usize = 0x1000;

/// Read a whole file from the volume this image booted from into
/// LoaderData pages (which survive ExitBootServices).
pub fn read_file(
    bs: &BootServices,
    image: Handle,
    path: &CStr16,
) -> uefi::Result<&'static mut [u8]> {
    let mut fs = bs.get_image_file_system(image)?;
    let mut root = fs.open_volume()?;
    let handle = root.open(path, FileMode::Read, FileAttribute::empty())?;
    let mut file = handle
        .into_regular_file()
        .ok_or(uefi::Error::from(Status::NOT_FOUND))?;

    let info = file.get_boxed_info::<FileInfo>()?;
    let size = info.file_size() as usize;
    let pages = size.div_ceil(PAGE_SIZE);
    let addr = bs.allocate_pages(AllocateType::AnyPages, MemoryType::LOADER_DATA, pages)?;

    let buf = unsafe { slice::from_raw_parts_mut(addr as *mut u8, size) };
    let mut read = 0;
    while read < size {
        let n = file.read(&mut buf[read..]).discard_errdata()?;
        if n == 0 {
            warn!("{}: short read at {} of {} bytes", path, read, size);
            return Err(uefi::Error::from(Status::END_OF_FILE));
        }
        read += n;
    }
    Ok(buf)
}

/// Place every PT_LOAD segment of `elf_bytes` at its physical address and
/// return the ELF entry point.
pub fn load_elf(bs: &BootServices, elf_bytes: &[u8]) -> uefi::Result<u64> {
    let elf = ElfBytes::<LittleEndian>::minimal_parse(elf_bytes)
        .map_err(|_| uefi::Error::from(Status::LOAD_ERROR))?;
    let segments = elf
        .segments()
        .ok_or(uefi::Error::from(Status::LOAD_ERROR))?;

    for ph in segments.iter() {
        if ph.p_type != PT_LOAD || ph.p_memsz == 0 {
            continue;
        }
        let dest = ph.p_paddr;
        let page_base = dest & !(PAGE_SIZE as u64 - 1);
        let page_count =
            ((dest + ph.p_memsz - page_base) as usize).div_ceil(PAGE_SIZE);
        bs.allocate_pages(
            AllocateType::Address(page_base),
            MemoryType::LOADER_DATA,
            page_count,
        )?;

        unsafe {
            let target = slice::from_raw_parts_mut(dest as *mut u8, ph.p_memsz as usize);
            target.fill(0);
            let file_end = (ph.p_offset + ph.p_filesz) as usize;
            target[..ph.p_filesz as usize]
                .copy_from_slice(&elf_bytes[ph.p_offset as usize..file_end]);
        }
        info!(
            "segment: {:#x} ({:#x} file / {:#x} mem)",
            dest, ph.p_filesz, ph.p_memsz
        );
    }
    Ok(elf.ehdr.e_entry)
}
