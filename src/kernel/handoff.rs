//! # Boot Hand-Off Sequencer
//!
//! Finalises the memory map, exits boot services
//! (direct path only), builds E820, loads GDT/IDT, and jumps into the kernel.
//!
//! Two architectures times two call conventions are four concrete jumps,
//! modelled as a tagged sum so the sequencer only ever has to pick a variant
//! and hand it off; each variant's transfer is a leaf operation that never
//! returns.

use crate::kernel::e820;
use crate::kernel::gdt::DescriptorTable;
use crate::kernel::params::{BootParams, EFI_LOADER_SIGNATURE_32, EFI_LOADER_SIGNATURE_64};
use crate::limits::{ALT_MEM_K, HANDOVER_VERSION};
use crate::status::{LoaderError, Result};
use log::info;
use uefi::Handle;
use uefi::boot;
use uefi::mem::memory_map::MemoryMap;

/// Selects which of the four concrete kernel-jump conventions applies.
///
/// `version >= 0x20b` takes the hand-over path, which defers exiting boot
/// services to the kernel's own EFI stub; earlier versions take the direct
/// path, where the loader itself exits boot services before jumping.
pub enum Entry {
    Direct32 { kernel_start: u32, boot_params: u32 },
    Direct64 { kernel_start: u64, boot_params: u64 },
    Handover32 { kernel_start: u32, boot_params: u32, image: Handle },
    Handover64 { kernel_start: u64, boot_params: u64, image: Handle },
}

impl Entry {
    /// Picks the variant matching the kernel's protocol version and the
    /// compile-time architecture tag.
    #[must_use]
    pub fn select(version: u16, kernel_start: u64, boot_params: u64, image: Handle) -> Self {
        let hand_over = version >= HANDOVER_VERSION;

        #[cfg(target_arch = "x86_64")]
        {
            if hand_over {
                Entry::Handover64 {
                    kernel_start,
                    boot_params,
                    image,
                }
            } else {
                Entry::Direct64 {
                    kernel_start,
                    boot_params,
                }
            }
        }

        #[cfg(target_arch = "x86")]
        {
            let kernel_start = kernel_start as u32;
            let boot_params = boot_params as u32;
            if hand_over {
                Entry::Handover32 {
                    kernel_start,
                    boot_params,
                    image,
                }
            } else {
                Entry::Direct32 {
                    kernel_start,
                    boot_params,
                }
            }
        }
    }

    /// `true` for the hand-over conventions, where the loader must *not*
    /// call `exit_boot_services` itself.
    #[must_use]
    pub const fn is_handover(&self) -> bool {
        matches!(self, Entry::Handover32 { .. } | Entry::Handover64 { .. })
    }
}

/// EFI loader signature for the running architecture (`"EL32"` or `"EL64"`).
#[must_use]
pub const fn loader_signature() -> u32 {
    #[cfg(target_arch = "x86_64")]
    {
        EFI_LOADER_SIGNATURE_64
    }
    #[cfg(target_arch = "x86")]
    {
        EFI_LOADER_SIGNATURE_32
    }
}

/// Exits boot services and populates `boot_params`'s `efi_info`/`alt_mem_k`/E820
/// table from the resulting owned memory map.
///
/// Only runs on the direct path; the hand-over path leaves boot services for
/// the kernel's own EFI stub to exit.
pub fn exit_boot_services_and_finalize(boot_params: &mut BootParams, image: Handle) -> Result<()> {
    info!("hand-off: exiting boot services");

    // `boot::exit_boot_services` re-queries and retries internally if the map
    // grows between its internal snapshot and the firmware's key check, so no
    // separate slack-buffer pre-allocation is needed here.
    //
    // SAFETY: no boot service is called again after this returns; every
    // firmware-backed resource (file handles, pool buffers) must already be closed.
    let owned_map = unsafe { boot::exit_boot_services(None) };

    let systab = uefi::table::system_table_raw()
        .ok_or(LoaderError::Invalid("system table pointer unavailable"))?;
    let systab_addr = systab.as_ptr() as u64;

    boot_params.efi_info.efi_loader_signature = loader_signature();
    boot_params.efi_info.efi_systab = systab_addr as u32;
    boot_params.efi_info.efi_systab_hi = (systab_addr >> 32) as u32;
    boot_params.efi_info.efi_memdesc_size = owned_map.meta().desc_size as u32;
    boot_params.efi_info.efi_memdesc_version = owned_map.meta().desc_version;
    let mmap_addr = owned_map.buffer().as_ptr() as u64;
    boot_params.efi_info.efi_memmap = mmap_addr as u32;
    boot_params.efi_info.efi_memmap_hi = (mmap_addr >> 32) as u32;
    boot_params.efi_info.efi_memmap_size = owned_map.buffer().len() as u32;

    boot_params.alt_mem_k = ALT_MEM_K;

    let entries = e820::convert(&owned_map);
    boot_params.e820_entries = entries.len() as u8;
    for (i, entry) in entries.into_iter().enumerate() {
        boot_params.e820_table[i] = entry;
    }

    // The owned map's backing allocation must outlive the kernel, so leak it
    // rather than letting it drop (which would try to free pool memory that
    // no longer exists post-exit).
    core::mem::forget(owned_map);

    let _ = image;
    Ok(())
}

/// Loads `idt` then `gdt` via `lidt`/`lgdt`, matching the hand-off ordering.
///
/// # Safety
/// Both descriptor tables must already be populated and must outlive the
/// kernel; this function disables interrupts and must only be called
/// immediately before the kernel jump.
pub unsafe fn load_tables(idt: &DescriptorTable, gdt: &DescriptorTable) {
    unsafe {
        core::arch::asm!(
            "cli",
            "lidt [{idt}]",
            "lgdt [{gdt}]",
            idt = in(reg) idt,
            gdt = in(reg) gdt,
            options(nostack, preserves_flags),
        );
    }
}

/// Transfers control to the kernel via `entry`. Never returns.
///
/// # Safety
/// `kernel_start` must point at a kernel body staged exactly as the setup
/// header promised, and `boot_params` must be a fully populated, page-stable
/// `boot_params` block. Interrupts must already be (or are about to be)
/// disabled; neither jump re-enables them.
pub unsafe fn jump(entry: Entry) -> ! {
    match entry {
        #[cfg(target_arch = "x86_64")]
        Entry::Direct64 {
            kernel_start,
            boot_params,
        } => unsafe {
            // The 64-bit kernel entry point is 512 bytes after the start of
            // the staged body; boot_params arrives in rsi per the protocol,
            // so a dummy value occupies the first argument register.
            let entry_addr = kernel_start + 512;
            core::arch::asm!(
                "cli",
                "jmp {entry}",
                entry = in(reg) entry_addr,
                in("rdi") 0u64,
                in("rsi") boot_params,
                options(noreturn),
            );
        },
        #[cfg(target_arch = "x86_64")]
        Entry::Handover64 {
            kernel_start,
            boot_params,
            image,
        } => unsafe {
            let handover_offset = (*(boot_params as *const BootParams)).hdr.handover_offset;
            let entry_addr = kernel_start + 512 + u64::from(handover_offset);
            let systab = uefi::table::system_table_raw()
                .expect("system table pointer unavailable")
                .as_ptr() as u64;
            core::arch::asm!(
                "cli",
                "jmp {entry}",
                entry = in(reg) entry_addr,
                in("rdi") image.as_ptr() as u64,
                in("rsi") systab,
                in("rdx") boot_params,
                options(noreturn),
            );
        },
        #[cfg(target_arch = "x86")]
        Entry::Direct32 {
            kernel_start,
            boot_params,
        } => unsafe {
            core::arch::asm!(
                "cli",
                "mov esi, {boot_params:e}",
                "jmp {entry:e}",
                boot_params = in(reg) boot_params,
                entry = in(reg) kernel_start,
                options(noreturn),
            );
        },
        #[cfg(target_arch = "x86")]
        Entry::Handover32 {
            kernel_start,
            boot_params,
            image,
        } => unsafe {
            let handover_offset = (*(boot_params as *const BootParams)).hdr.handover_offset;
            let entry_addr = kernel_start + handover_offset;
            let systab = uefi::table::system_table_raw()
                .expect("system table pointer unavailable")
                .as_ptr() as u32;
            // Firmware's 32-bit calling convention passes these on the stack,
            // with interrupts disabled before the call.
            core::arch::asm!(
                "cli",
                "push {bp:e}",
                "push {st:e}",
                "push {img:e}",
                "jmp {entry:e}",
                bp = in(reg) boot_params,
                st = in(reg) systab,
                img = in(reg) image.as_ptr() as u32,
                entry = in(reg) entry_addr,
                options(noreturn),
            );
        },
        #[allow(unreachable_patterns)]
        _ => unreachable!("Entry variant selected for the wrong target architecture"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loader_signature_matches_architecture() {
        #[cfg(target_arch = "x86_64")]
        assert_eq!(loader_signature(), EFI_LOADER_SIGNATURE_64);
        #[cfg(target_arch = "x86")]
        assert_eq!(loader_signature(), EFI_LOADER_SIGNATURE_32);
    }
}
