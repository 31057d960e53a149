//! # Shared Constants
//!
//! Magic numbers shared across the loader, collected at one definition site.

/// Required alignment for a concatenated initrd buffer.
pub const RAMDISK_ALIGN: u64 = 0x1000;

/// Highest byte a staged command line may occupy (just below the legacy 640 KiB hole).
pub const CMDLINE_CEILING: u64 = 0xA_0000;

/// Highest byte a `boot_params` block may occupy.
pub const BOOT_PARAMS_CEILING: u64 = 0x3FFF_FFFF;

/// Byte length of the GDT region (`0x800` / 8 = 256 descriptor slots).
pub const GDT_LIMIT: u16 = 0x800;

/// No staging allocation is ever permitted to land below this address.
pub const LOW_MEMORY_FLOOR: u64 = 0x10_0000;

/// Size in bytes of a `boot_params` block.
pub const BOOT_PARAMS_SIZE: usize = 0x4000;

/// Sector size used throughout the bzImage setup header.
pub const SECTOR_SIZE: u64 = 512;

/// Offset of `setup_sects` within the boot sector.
pub const SETUP_SECTS_OFFSET: u64 = 0x1F1;

/// Minimum supported boot protocol version (2.05).
pub const MIN_PROTOCOL_VERSION: u16 = 0x205;

/// Boot protocol version from which `pref_address`/`init_size` are honoured (2.10).
pub const RELOCATABLE_VERSION: u16 = 0x20a;

/// Boot protocol version from which the hand-over entry convention is available (2.11).
pub const HANDOVER_VERSION: u16 = 0x20b;

/// Identifies this loader to the kernel (`type_of_loader`).
pub const LOADER_ID: u8 = 0x1;

/// `alt_mem_k` stamped into `boot_params` (32 MiB in KiB units).
pub const ALT_MEM_K: u32 = 32 * 1024;

/// Maximum bytes read from a config file before it is rejected.
pub const CONFIG_FILE_CAP: usize = 64 * 1024;

/// Maximum length of a resolved filesystem path, matching the original `fs.h` constant.
pub const MAX_FILENAME: usize = 256;
