//! # bzImage Setup Header Parser
//!
//! Parses and validates the setup area of an x86 bzImage.

use crate::fs::OpenFile;
use crate::kernel::params::{BOOT_SECT_SIGNATURE, HDR_MAGIC, SetupHeader};
use crate::limits::{MIN_PROTOCOL_VERSION, SECTOR_SIZE, SETUP_SECTS_OFFSET};
use crate::status::{LoaderError, Result};
use alloc::vec::Vec;

/// Offset of the boot-sector signature word within the setup area.
const BOOT_SIGNATURE_OFFSET: usize = 0x1FE;
/// Offset of the setup header within the setup area (matches `BootParams::hdr`).
const SETUP_HEADER_OFFSET: usize = 0x1F1;

/// The parsed, validated setup area of a kernel image.
pub struct ParsedSetup {
    /// Raw bytes of the setup area (`(setup_sects + 1) * 512` bytes),
    /// used later to seed the first two sectors of `boot_params`.
    pub setup_bytes: Vec<u8>,
    pub header: SetupHeader,
}

/// Reads and validates the setup header of `file`, per the boot-protocol invariants:
/// boot-sector signature `0xAA55`, header magic `"HdrS"`, version `>= 0x205`, and
/// the relocatable-kernel flag set.
pub fn load_and_validate(file: &mut OpenFile) -> Result<ParsedSetup> {
    file.seek(SETUP_SECTS_OFFSET)?;
    let mut nr_setup_secs = [0u8; 1];
    file.read(&mut nr_setup_secs)?;

    // setup_sects == 0 historically meant 4, but modern bzImages always set it.
    let setup_sects = if nr_setup_secs[0] == 0 {
        4
    } else {
        nr_setup_secs[0]
    };
    let setup_bytes_len = (u64::from(setup_sects) + 1) * SECTOR_SIZE;

    file.seek(0)?;
    let mut setup_bytes = alloc::vec![0u8; setup_bytes_len as usize];
    let mut total = 0usize;
    while total < setup_bytes.len() {
        let n = file.read(&mut setup_bytes[total..])?;
        if n == 0 {
            return Err(LoaderError::Invalid("short read while loading setup area"));
        }
        total += n;
    }

    validate(&setup_bytes)?;

    let header = read_header(&setup_bytes);

    Ok(ParsedSetup {
        setup_bytes,
        header,
    })
}

fn validate(setup_bytes: &[u8]) -> Result<()> {
    if setup_bytes.len() < SETUP_HEADER_OFFSET + core::mem::size_of::<SetupHeader>() {
        return Err(LoaderError::Invalid("corrupt: setup area too short"));
    }

    let signature = u16::from_le_bytes([
        setup_bytes[BOOT_SIGNATURE_OFFSET],
        setup_bytes[BOOT_SIGNATURE_OFFSET + 1],
    ]);
    if signature != BOOT_SECT_SIGNATURE {
        return Err(LoaderError::Invalid("corrupt: boot sector signature mismatch"));
    }

    let header = read_header(setup_bytes);
    let magic = header.header;
    let version = header.version;

    if magic != HDR_MAGIC {
        return Err(LoaderError::Invalid("invalid header: magic mismatch"));
    }
    if version < MIN_PROTOCOL_VERSION {
        return Err(LoaderError::Invalid("unsupported: boot protocol too old"));
    }
    if !header.is_relocatable() {
        return Err(LoaderError::Invalid("invalid: kernel is not relocatable"));
    }

    Ok(())
}

fn read_header(setup_bytes: &[u8]) -> SetupHeader {
    let src = &setup_bytes[SETUP_HEADER_OFFSET..SETUP_HEADER_OFFSET + core::mem::size_of::<SetupHeader>()];
    unsafe { core::ptr::read_unaligned(src.as_ptr().cast::<SetupHeader>()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::params::LOADFLAG_RELOCATABLE;

    fn fixture_setup_bytes(signature: u16, magic: u32, version: u16, relocatable: bool) -> Vec<u8> {
        let mut buf = alloc::vec![0u8; 1024];
        buf[BOOT_SIGNATURE_OFFSET..BOOT_SIGNATURE_OFFSET + 2]
            .copy_from_slice(&signature.to_le_bytes());

        // Offsets relative to the setup header itself (field order mirrors
        // `SetupHeader`): `header` at +0x11, `version` at +0x15, `loadflags` at +0x20.
        let header_off = SETUP_HEADER_OFFSET;
        buf[header_off + 0x11..header_off + 0x15].copy_from_slice(&magic.to_le_bytes());
        buf[header_off + 0x15..header_off + 0x17].copy_from_slice(&version.to_le_bytes());
        if relocatable {
            buf[header_off + 0x20] = LOADFLAG_RELOCATABLE;
        }
        buf
    }

    #[test]
    fn accepts_well_formed_header() {
        let buf = fixture_setup_bytes(BOOT_SECT_SIGNATURE, HDR_MAGIC, 0x20d, true);
        assert!(validate(&buf).is_ok());
    }

    #[test]
    fn rejects_bad_signature() {
        let buf = fixture_setup_bytes(0x1234, HDR_MAGIC, 0x20d, true);
        assert!(validate(&buf).is_err());
    }

    #[test]
    fn rejects_bad_magic() {
        let buf = fixture_setup_bytes(BOOT_SECT_SIGNATURE, 0xdead_beef, 0x20d, true);
        assert!(validate(&buf).is_err());
    }

    #[test]
    fn rejects_old_version() {
        let buf = fixture_setup_bytes(BOOT_SECT_SIGNATURE, HDR_MAGIC, 0x204, true);
        assert!(validate(&buf).is_err());
    }

    #[test]
    fn rejects_non_relocatable() {
        let buf = fixture_setup_bytes(BOOT_SECT_SIGNATURE, HDR_MAGIC, 0x20d, false);
        assert!(validate(&buf).is_err());
    }
}
