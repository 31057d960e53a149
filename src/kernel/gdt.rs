//! # Descriptor Tables
//!
//! Flat GDT the loader hands the kernel, plus the empty IDT descriptor.

use crate::limits::GDT_LIMIT;
use crate::memory::emalloc;
use crate::status::Result;

/// Flat 4 GiB, 32-bit, read/execute code segment.
pub const CODE_SEGMENT: u64 = 0x00CF_9A00_0000_FFFF;
/// Flat 4 GiB, 32-bit, read/write data segment.
pub const DATA_SEGMENT: u64 = 0x00CF_9200_0000_FFFF;
/// Task-segment descriptor (placeholder; the kernel installs its own TSS).
pub const TASK_SEGMENT: u64 = 0x0080_8900_0000_0000;

/// A firmware-visible descriptor-table descriptor: `{limit, base}`, where
/// `base` points at a page-aligned array of 64-bit segment descriptors.
#[derive(Copy, Clone, Debug, Default)]
#[repr(C, packed)]
pub struct DescriptorTable {
    pub limit: u16,
    pub base: u64,
}

/// Allocates and populates the flat GDT described in the boot-protocol
/// compatibility section: entries 2 (code), 3 (data), and 4 (TSS); every
/// other slot within `limit` stays zero.
pub fn build() -> Result<DescriptorTable> {
    let base = emalloc(u64::from(GDT_LIMIT), 8, None)?;

    let slots = unsafe {
        core::slice::from_raw_parts_mut(base as *mut u64, usize::from(GDT_LIMIT) / 8)
    };
    slots.fill(0);
    slots[2] = CODE_SEGMENT;
    slots[3] = DATA_SEGMENT;
    slots[4] = TASK_SEGMENT;

    Ok(DescriptorTable {
        limit: GDT_LIMIT,
        base,
    })
}

/// The kernel installs its own IDT; the loader only ever hands it an empty one.
#[must_use]
pub const fn empty_idt() -> DescriptorTable {
    DescriptorTable { limit: 0, base: 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_constants_match_boot_protocol() {
        assert_eq!(CODE_SEGMENT, 0x00CF_9A00_0000_FFFF);
        assert_eq!(DATA_SEGMENT, 0x00CF_9200_0000_FFFF);
        assert_eq!(TASK_SEGMENT, 0x0080_8900_0000_0000);
    }

    #[test]
    fn empty_idt_is_zeroed() {
        let idt = empty_idt();
        assert_eq!(idt.limit, 0);
        assert_eq!(idt.base, 0);
    }
}
