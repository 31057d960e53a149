//! # Kernel Loading and Hand-Off Orchestration
//!
//! Orchestrates the kernel-specific half of the boot process: locating and
//! validating the setup header, staging the command line/initrd/kernel body,
//! building `boot_params`, and handing off to the kernel.

pub mod e820;
pub mod gdt;
pub mod graphics;
pub mod handoff;
pub mod header;
pub mod initrd;
pub mod params;

use crate::cli::CliOptions;
use crate::fs::FileSystem;
use crate::limits::{BOOT_PARAMS_CEILING, BOOT_PARAMS_SIZE, CMDLINE_CEILING, LOADER_ID, RELOCATABLE_VERSION};
use crate::memory::{emalloc, pages_for};
use crate::status::{LoaderError, Result};
use log::{debug, info, warn};
use params::BootParams;
use uefi::Handle;
use uefi::boot::{self, AllocateType, MemoryType};

/// Runs the whole kernel-loading pipeline for `opts.filename` and transfers
/// control to the kernel. Returns only on failure — success ends in a jump.
pub fn load_and_boot(fs: &mut FileSystem, image: Handle, opts: &CliOptions) -> Result<()> {
    let filename = opts
        .filename
        .as_deref()
        .ok_or(LoaderError::Invalid("no kernel filename given"))?;

    let mut file = fs.open(filename)?;
    let setup = header::load_and_validate(&mut file)?;
    let version = setup.header.version;

    info!("kernel: boot protocol version {version:#x}, loading body");

    let (cmdline_addr, cmdline_len) = stage_cmdline(&opts.cmdline)?;

    let kernel_alignment = setup.header.kernel_alignment;
    let setup_bytes_len = setup.setup_bytes.len() as u64;
    let body_size = file.size()? - setup_bytes_len;
    let kernel_start = place_kernel_body(&mut file, &setup, setup_bytes_len, body_size, kernel_alignment)?;

    let ramdisk_max = setup.header.ramdisk_max;
    let staged_initrd = initrd::stage(fs, &opts.cmdline, ramdisk_max);

    let boot_params_addr = build_boot_params(
        &setup,
        kernel_start,
        cmdline_addr,
        cmdline_len,
        staged_initrd.ramdisk_start,
        staged_initrd.ramdisk_len,
    )?;

    // SAFETY: boot_params_addr was just allocated with BootParams's layout and
    // is exclusively owned by this function until the kernel jump below.
    let boot_params = unsafe { &mut *(boot_params_addr as *mut BootParams) };

    graphics::probe(&mut boot_params.screen_info);

    let gdt = gdt::build()?;
    let idt = gdt::empty_idt();

    let gdt_base = gdt.base;
    if kernel_start < boot_params_addr || kernel_start < gdt_base {
        warn!("kernel: kernel_start {kernel_start:#x} is too low");
    }

    let entry = handoff::Entry::select(version, kernel_start, boot_params_addr, image);

    // No more file I/O past this point on either path.
    fs.close_all();

    if entry.is_handover() {
        info!("kernel: taking hand-over path, boot services stay alive");
    } else {
        handoff::exit_boot_services_and_finalize(boot_params, image)?;
    }

    // SAFETY: both tables were just built and are never touched again.
    unsafe {
        handoff::load_tables(&idt, &gdt);
    }

    // SAFETY: kernel_start points at a freshly staged kernel body, boot_params
    // at a fully populated zero page; this is the last thing this function does.
    unsafe { handoff::jump(entry) }
}

/// Stages `cmdline` (NUL-terminated) into a page-aligned buffer whose last
/// byte lies below [`CMDLINE_CEILING`]. Returns `(address, length_including_nul)`.
fn stage_cmdline(cmdline: &str) -> Result<(u32, u32)> {
    let len = cmdline.len() + 1;
    let addr = emalloc(len as u64, 0x1000, Some(CMDLINE_CEILING))?;

    let dst = unsafe { core::slice::from_raw_parts_mut(addr as *mut u8, len) };
    dst[..cmdline.len()].copy_from_slice(cmdline.as_bytes());
    dst[cmdline.len()] = 0;

    debug!("kernel: command line staged at {addr:#x} ({len} bytes)");
    Ok((addr as u32, len as u32))
}

/// Places the kernel body (everything in the image after the setup area) in
/// physical memory, preferring the header's `pref_address` from protocol
/// version 2.10 onward, and reads the body in. Returns the staged address.
fn place_kernel_body(
    file: &mut crate::fs::OpenFile,
    setup: &header::ParsedSetup,
    setup_bytes_len: u64,
    body_size: u64,
    kernel_alignment: u32,
) -> Result<u64> {
    let version = setup.header.version;
    let pref_address = setup.header.pref_address;
    let init_size = u64::from(setup.header.init_size);

    let kernel_start = if version >= RELOCATABLE_VERSION {
        let pages = pages_for(init_size);
        match boot::allocate_pages(
            AllocateType::Address(pref_address),
            MemoryType::LOADER_DATA,
            pages as usize,
        ) {
            Ok(_) => {
                debug!("kernel: placed body at preferred address {pref_address:#x}");
                pref_address
            }
            Err(_) => {
                warn!("kernel: preferred address {pref_address:#x} unavailable, falling back");
                emalloc(init_size, u64::from(kernel_alignment), None)?
            }
        }
    } else {
        // Heuristic carried over from the pre-2.10 protocol: the in-place
        // decompressor needs headroom, so triple the on-disk body size.
        emalloc(3 * body_size, u64::from(kernel_alignment), None)?
    };

    file.seek(setup_bytes_len)?;
    let dst = unsafe { core::slice::from_raw_parts_mut(kernel_start as *mut u8, body_size as usize) };
    let mut total = 0usize;
    while total < dst.len() {
        let n = file.read(&mut dst[total..])?;
        if n == 0 {
            return Err(LoaderError::Invalid("short read while loading kernel body"));
        }
        total += n;
    }

    Ok(kernel_start)
}

/// Allocates and populates the 16 KiB `boot_params` block: zeroes it, copies
/// the first two sectors of the setup area into its head, then stamps the
/// fields the loader itself owns. Returns the block's physical address.
fn build_boot_params(
    setup: &header::ParsedSetup,
    kernel_start: u64,
    cmdline_addr: u32,
    cmdline_len: u32,
    ramdisk_start: u32,
    ramdisk_len: u32,
) -> Result<u64> {
    let addr = emalloc(BOOT_PARAMS_SIZE as u64, 0x1000, Some(BOOT_PARAMS_CEILING))?;

    let region = unsafe { core::slice::from_raw_parts_mut(addr as *mut u8, BOOT_PARAMS_SIZE) };
    region.fill(0);

    let head_len = core::cmp::min(1024, setup.setup_bytes.len());
    region[..head_len].copy_from_slice(&setup.setup_bytes[..head_len]);

    // SAFETY: `region` is exactly sized and aligned for `BootParams`.
    let boot_params = unsafe { &mut *(addr as *mut BootParams) };
    boot_params.hdr.type_of_loader = LOADER_ID;
    boot_params.hdr.code32_start = kernel_start as u32;
    boot_params.hdr.cmd_line_ptr = cmdline_addr;
    boot_params.hdr.cmdline_size = cmdline_len;
    boot_params.hdr.ramdisk_start = ramdisk_start;
    boot_params.hdr.ramdisk_len = ramdisk_len;

    debug!("kernel: boot_params staged at {addr:#x}");
    Ok(addr)
}
