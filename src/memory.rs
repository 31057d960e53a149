//! # Physical Memory Staging Allocator
//!
//! Memory-map facade and the `emalloc`/`efree` staging allocator.
//!
//! The staging allocator places buffers at physical addresses the kernel's
//! boot protocol can legally use, by scanning the firmware's own memory map
//! for `Conventional` ranges wide enough to hold the request.

use crate::limits::LOW_MEMORY_FLOOR;
use crate::status::{LoaderError, Result};
use core::ptr::NonNull;
use log::{debug, warn};
use uefi::boot::{self, AllocateType, MemoryType};
use uefi::mem::memory_map::{MemoryMap, MemoryMapOwned};

/// Acquires a fresh snapshot of the firmware memory map.
///
/// `uefi::boot::memory_map` already implements the "start with a guess, retry
/// on `buffer_too_small` with the firmware-reported size" strategy internally;
/// this wrapper exists so every caller goes through one typed error path and
/// one log line.
pub fn acquire() -> Result<MemoryMapOwned> {
    boot::memory_map(MemoryType::LOADER_DATA).map_err(|e| LoaderError::from(e.status()))
}

/// Rounds `value` up to the next multiple of `align`. `align` must be a power of two.
#[must_use]
pub const fn align_up(value: u64, align: u64) -> u64 {
    (value + (align - 1)) & !(align - 1)
}

/// Number of 4 KiB pages needed to hold `size` bytes.
#[must_use]
pub const fn pages_for(size: u64) -> u64 {
    align_up(size, 0x1000) / 0x1000
}

/// Allocates `size` bytes at a physical address that is a multiple of `align`,
/// at or above the 1 MiB low-memory floor, and (if `ceiling` is given) such
/// that `addr + size <= ceiling`.
///
/// Scans the current `Conventional` memory descriptors for a sub-range that
/// satisfies every constraint, then asks the firmware for that exact address.
pub fn emalloc(size: u64, align: u64, ceiling: Option<u64>) -> Result<u64> {
    debug_assert!(align >= 1 && size > 0);

    let map = acquire()?;
    let ceiling = ceiling.unwrap_or(u64::MAX);

    for desc in map.entries() {
        if desc.ty != MemoryType::CONVENTIONAL {
            continue;
        }

        let page_bytes = desc.page_count * 0x1000;
        if page_bytes < size {
            continue;
        }

        let mut start = desc.phys_start;
        let end = desc.phys_start + page_bytes;

        // Clip below 1 MiB: low memory is precious for legacy uses.
        if end <= LOW_MEMORY_FLOOR {
            continue;
        }
        if start < LOW_MEMORY_FLOOR {
            start = LOW_MEMORY_FLOOR;
        }

        let aligned = align_up(start, align);
        if aligned.checked_add(size).is_none_or(|top| top > end || top > ceiling) {
            continue;
        }

        let pages = pages_for(size);
        match boot::allocate_pages(
            AllocateType::Address(aligned),
            MemoryType::LOADER_DATA,
            pages as usize,
        ) {
            Ok(_ptr) => {
                debug!("emalloc: placed {size:#x} bytes at {aligned:#x} (align {align:#x})");
                return Ok(aligned);
            }
            Err(_) => continue,
        }
    }

    warn!("emalloc: no conventional range satisfies size={size:#x} align={align:#x}");
    Err(LoaderError::OutOfResources("no suitable conventional range"))
}

/// Releases pages previously returned by [`emalloc`]. The caller must supply
/// the same `size` used to allocate them; there is no per-allocation header.
pub fn efree(addr: u64, size: u64) {
    debug_assert!(size > 0);
    let pages = pages_for(size);
    let Some(ptr) = NonNull::new(addr as *mut u8) else {
        return;
    };
    if let Err(e) = unsafe { boot::free_pages(ptr, pages as usize) } {
        warn!("efree: failed to release {size:#x} bytes at {addr:#x}: {e:?}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_rounds_to_multiple() {
        assert_eq!(align_up(0x1001, 0x1000), 0x2000);
        assert_eq!(align_up(0x1000, 0x1000), 0x1000);
        assert_eq!(align_up(0, 0x1000), 0);
    }

    #[test]
    fn pages_for_rounds_up() {
        assert_eq!(pages_for(1), 1);
        assert_eq!(pages_for(0x1000), 1);
        assert_eq!(pages_for(0x1001), 2);
    }
}
