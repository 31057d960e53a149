//! # E820 Memory Map Conversion
//!
//! Converts a firmware memory map into the legacy E820 format the kernel consumes.

use crate::kernel::params::{BootE820Entry, E820Type, E820_MAX_ENTRIES_ZEROPAGE};
use alloc::vec::Vec;
use log::warn;
use uefi::boot::MemoryType;
use uefi::mem::memory_map::{MemoryMap, MemoryMapOwned};

/// Maps a UEFI descriptor type to its E820 classification, or `None` if the
/// descriptor should be dropped from the E820 view entirely.
#[must_use]
pub fn classify(ty: MemoryType) -> Option<E820Type> {
    match ty {
        MemoryType::RESERVED
        | MemoryType::RUNTIME_SERVICES_CODE
        | MemoryType::RUNTIME_SERVICES_DATA
        | MemoryType::MMIO
        | MemoryType::MMIO_PORT_SPACE
        | MemoryType::PAL_CODE => Some(E820Type::Reserved),
        MemoryType::UNUSABLE => Some(E820Type::Unusable),
        MemoryType::ACPI_RECLAIM => Some(E820Type::Acpi),
        MemoryType::ACPI_NON_VOLATILE => Some(E820Type::Nvs),
        MemoryType::LOADER_CODE
        | MemoryType::LOADER_DATA
        | MemoryType::BOOT_SERVICES_CODE
        | MemoryType::BOOT_SERVICES_DATA
        | MemoryType::CONVENTIONAL => Some(E820Type::Ram),
        _ => None,
    }
}

/// Converts `map` into a coalesced, ordered list of E820 entries. Adjacent
/// entries of the same type whose ranges touch (`prev.addr + prev.size ==
/// next.addr`) are merged into one.
#[must_use]
pub fn convert(map: &MemoryMapOwned) -> Vec<BootE820Entry> {
    let mut entries: Vec<BootE820Entry> = Vec::new();

    for desc in map.entries() {
        let Some(typ) = classify(desc.ty) else {
            continue;
        };
        let size = desc.page_count * 0x1000;
        let addr = desc.phys_start;

        if let Some(last) = entries.last_mut() {
            let last_addr = last.addr;
            let last_size = last.size;
            let last_typ = last.typ;
            if last_typ == typ && last_addr + last_size == addr {
                last.size = last_size + size;
                continue;
            }
        }

        entries.push(BootE820Entry { addr, size, typ });
    }

    if entries.len() > E820_MAX_ENTRIES_ZEROPAGE {
        warn!(
            "e820: {} entries exceeds zero-page capacity {}, truncating",
            entries.len(),
            E820_MAX_ENTRIES_ZEROPAGE
        );
        entries.truncate(E820_MAX_ENTRIES_ZEROPAGE);
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_conventional_as_ram() {
        assert_eq!(classify(MemoryType::CONVENTIONAL), Some(E820Type::Ram));
    }

    #[test]
    fn classifies_mmio_as_reserved() {
        assert_eq!(classify(MemoryType::MMIO), Some(E820Type::Reserved));
    }

    #[test]
    fn classifies_acpi_reclaim() {
        assert_eq!(classify(MemoryType::ACPI_RECLAIM), Some(E820Type::Acpi));
    }

    #[test]
    fn classifies_acpi_nvs() {
        assert_eq!(classify(MemoryType::ACPI_NON_VOLATILE), Some(E820Type::Nvs));
    }

    #[test]
    fn classifies_unusable() {
        assert_eq!(classify(MemoryType::UNUSABLE), Some(E820Type::Unusable));
    }

    #[test]
    fn unknown_type_is_dropped() {
        assert_eq!(classify(MemoryType::custom(0x7FFF_FFFF)), None);
    }
}
