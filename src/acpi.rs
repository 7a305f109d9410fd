//! ACPI table discovery: RSDP → XSDT → FADT.
//!
//! Only the ACPI 2.0+ chain is accepted; the legacy RSDT path is not
//! implemented. Tables are read in place through the direct map.

use core::mem::size_of;

use crate::error::HvResult;
use crate::memory::addr::phys_to_virt;

/// Root System Description Pointer, ACPI 2.0 shape (36 bytes).
#[repr(C, packed)]
pub struct Rsdp {
    pub signature: [u8; 8],
    pub checksum: u8,
    pub oem_id: [u8; 6],
    pub revision: u8,
    pub rsdt_address: u32,
    pub length: u32,
    pub xsdt_address: u64,
    pub extended_checksum: u8,
    reserved: [u8; 3],
}

static_assertions::const_assert_eq!(size_of::<Rsdp>(), 36);

/// Common System Description Table header.
#[repr(C, packed)]
pub struct SdtHeader {
    pub signature: [u8; 4],
    pub length: u32,
    pub revision: u8,
    pub checksum: u8,
    pub oem_id: [u8; 6],
    pub oem_table_id: [u8; 8],
    pub oem_revision: u32,
    pub creator_id: u32,
    pub creator_revision: u32,
}

static_assertions::const_assert_eq!(size_of::<SdtHeader>(), 36);

/// Fixed ACPI Description Table prefix; the full table is longer but the
/// hypervisor only consumes these fields.
#[repr(C, packed)]
pub struct Fadt {
    pub header: SdtHeader,
    pub firmware_ctrl: u32,
    pub dsdt: u32,
    reserved: u8,
    pub preferred_pm_profile: u8,
    pub sci_interrupt: u16,
}

const RSDP_SIGNATURE: &[u8; 8] = b"RSD PTR ";
const XSDT_SIGNATURE: &[u8; 4] = b"XSDT";
const FADT_SIGNATURE: &[u8; 4] = b"FACP";

/// Sum of `bytes` mod 256; a valid ACPI structure sums to zero.
fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

fn bytes_of<T>(value: &T, len: usize) -> &[u8] {
    unsafe { core::slice::from_raw_parts((value as *const T).cast::<u8>(), len) }
}

/// Validate an ACPI 2.0 RSDP: signature, revision, the 20-byte ACPI 1.0
/// checksum and the 36-byte extended checksum.
pub fn validate_rsdp(rsdp: &Rsdp) -> HvResult {
    if { rsdp.signature } != *RSDP_SIGNATURE {
        return hv_result_err!(BadChecksum, "RSDP: InvalidSignature");
    }
    if rsdp.revision != 2 {
        return hv_result_err!(NotSupported, format!("RSDP: revision {}", rsdp.revision));
    }
    if checksum(&bytes_of(rsdp, size_of::<Rsdp>())[..20]) != 0 {
        return hv_result_err!(BadChecksum, "RSDP: InvalidChecksum");
    }
    if checksum(bytes_of(rsdp, size_of::<Rsdp>())) != 0 {
        return hv_result_err!(BadChecksum, "RSDP: InvalidExtendedChecksum");
    }
    Ok(())
}

/// Validate an SDT against an expected signature and its full-length
/// checksum.
///
/// # Safety
///
/// `header` must head a table whose `length` bytes are readable.
unsafe fn validate_sdt(header: &SdtHeader, signature: &[u8; 4]) -> HvResult {
    if { header.signature } != *signature {
        return hv_result_err!(
            BadChecksum,
            format!(
                "SDT: expected {:?}, found {:?}",
                core::str::from_utf8(signature),
                core::str::from_utf8(&{ header.signature })
            )
        );
    }
    if checksum(bytes_of(header, header.length as usize)) != 0 {
        return hv_result_err!(BadChecksum, "SDT: InvalidChecksum");
    }
    Ok(())
}

/// XSDT entries are 64-bit physical pointers packed right after the
/// header, so they sit at 4-byte alignment. Read as two halves.
unsafe fn xsdt_entry(xsdt: &SdtHeader, index: usize) -> u64 {
    let base = (xsdt as *const SdtHeader).cast::<u8>();
    let entry = base.add(size_of::<SdtHeader>() + index * 8).cast::<u32>();
    let lo = entry.read_unaligned() as u64;
    let hi = entry.add(1).read_unaligned() as u64;
    lo | (hi << 32)
}

/// Walk the chain from a physical RSDP address down to the FADT.
pub fn init(rsdp_paddr: usize) -> HvResult<&'static Fadt> {
    if rsdp_paddr == 0 {
        return hv_result_err!(NotFound, "firmware provided no RSDP");
    }
    let rsdp = unsafe { &*(phys_to_virt(rsdp_paddr) as *const Rsdp) };
    validate_rsdp(rsdp)?;

    let xsdt = unsafe { &*(phys_to_virt(rsdp.xsdt_address as usize) as *const SdtHeader) };
    unsafe { validate_sdt(xsdt, XSDT_SIGNATURE)? };

    let entry_count = (xsdt.length as usize - size_of::<SdtHeader>()) / 8;
    for i in 0..entry_count {
        let paddr = unsafe { xsdt_entry(xsdt, i) };
        let header = unsafe { &*(phys_to_virt(paddr as usize) as *const SdtHeader) };
        if { header.signature } == *FADT_SIGNATURE {
            unsafe { validate_sdt(header, FADT_SIGNATURE)? };
            let fadt = unsafe { &*(header as *const SdtHeader).cast::<Fadt>() };
            info!(
                "FADT found @ {:#x}, revision {}, SCI interrupt {}",
                paddr,
                { fadt.header.revision },
                { fadt.sci_interrupt }
            );
            return Ok(fadt);
        }
    }
    hv_result_err!(NotFound, "XSDT holds no FACP entry")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn rsdp_with(xsdt_address: u64) -> Rsdp {
        let mut rsdp = Rsdp {
            signature: *RSDP_SIGNATURE,
            checksum: 0,
            oem_id: *b"VALKYR",
            revision: 2,
            rsdt_address: 0,
            length: size_of::<Rsdp>() as u32,
            xsdt_address,
            extended_checksum: 0,
            reserved: [0; 3],
        };
        rsdp.checksum = 0u8.wrapping_sub(checksum(&bytes_of(&rsdp, size_of::<Rsdp>())[..20]));
        rsdp.extended_checksum =
            0u8.wrapping_sub(checksum(bytes_of(&rsdp, size_of::<Rsdp>())));
        rsdp
    }

    fn header(signature: [u8; 4], length: u32) -> SdtHeader {
        SdtHeader {
            signature,
            length,
            revision: 1,
            checksum: 0,
            oem_id: *b"VALKYR",
            oem_table_id: *b"VLKYHVSR",
            oem_revision: 1,
            creator_id: 0,
            creator_revision: 0,
        }
    }

    fn seal(bytes: &mut [u8]) {
        // Checksum byte sits at offset 9 of every SDT header.
        bytes[9] = 0;
        bytes[9] = 0u8.wrapping_sub(checksum(bytes));
    }

    #[test]
    fn valid_rsdp_passes_both_checksums() {
        let rsdp = rsdp_with(0);
        assert!(validate_rsdp(&rsdp).is_ok());
    }

    #[test]
    fn corrupted_extended_checksum_is_called_out() {
        let mut rsdp = rsdp_with(0);
        // Keep the first 20 bytes (and their checksum) intact, corrupt a
        // 2.0-only field.
        rsdp.xsdt_address ^= 0xFF;
        let err = validate_rsdp(&rsdp).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadChecksum);
        assert!(format!("{:?}", err).contains("InvalidExtendedChecksum"));
    }

    #[test]
    fn corrupted_base_checksum_is_detected_first() {
        let mut rsdp = rsdp_with(0);
        rsdp.revision = 2;
        rsdp.checksum ^= 0x5A;
        let err = validate_rsdp(&rsdp).unwrap_err();
        assert!(format!("{:?}", err).contains("InvalidChecksum"));
    }

    #[test]
    fn wrong_revision_is_rejected() {
        let mut rsdp = rsdp_with(0);
        rsdp.revision = 0;
        assert_eq!(
            validate_rsdp(&rsdp).unwrap_err().kind(),
            ErrorKind::NotSupported
        );
    }

    #[test]
    fn walks_xsdt_to_the_fadt() {
        // A FADT-sized table with a valid checksum...
        let mut fadt_bytes = [0u8; size_of::<Fadt>()];
        let fadt_header = header(*FADT_SIGNATURE, size_of::<Fadt>() as u32);
        fadt_bytes[..size_of::<SdtHeader>()].copy_from_slice(bytes_of(
            &fadt_header,
            size_of::<SdtHeader>(),
        ));
        seal(&mut fadt_bytes);

        // ...referenced by a one-entry XSDT. The test runs with an identity
        // phys<->virt mapping, so host pointers stand in for physical
        // addresses.
        let mut xsdt_bytes = [0u8; size_of::<SdtHeader>() + 8];
        let xsdt_header = header(*XSDT_SIGNATURE, xsdt_bytes.len() as u32);
        xsdt_bytes[..size_of::<SdtHeader>()].copy_from_slice(bytes_of(
            &xsdt_header,
            size_of::<SdtHeader>(),
        ));
        xsdt_bytes[size_of::<SdtHeader>()..]
            .copy_from_slice(&(fadt_bytes.as_ptr() as u64).to_le_bytes());
        seal(&mut xsdt_bytes);

        let rsdp = rsdp_with(xsdt_bytes.as_ptr() as u64);
        let fadt = init(&rsdp as *const Rsdp as usize).unwrap();
        assert_eq!({ fadt.header.signature }, *FADT_SIGNATURE);
    }
}
