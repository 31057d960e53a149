//! # UEFI Loader for the Linux x86 Boot Protocol
//!
//! UEFI application that discovers an x86 bzImage kernel on a firmware
//! filesystem volume, stages it and its initrd into physical memory, builds
//! the Linux boot-protocol hand-off structures, and jumps into the kernel.
//!
//! ## Boot sequence
//!
//! ```text
//! efi_main
//!   -> logger init (QEMU debug port + UEFI console)
//!   -> filesystem init (every SimpleFileSystem handle, own device located)
//!   -> options: efilinux.cfg if present, else firmware load options
//!   -> -h / -l short-circuit; otherwise:
//!   -> kernel::load_and_boot
//!        -> parse + validate setup header
//!        -> stage command line, kernel body, initrd
//!        -> build boot_params, GDT/IDT, graphics probe
//!        -> exit boot services (direct path) or not (hand-over path)
//!        -> jump to kernel entry
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![no_main]
#![allow(unsafe_code)]
extern crate alloc;

mod cli;
mod config;
mod fs;
mod kernel;
mod limits;
mod logger;
mod memory;
mod status;

use crate::logger::UefiLogger;
use crate::status::LoaderError;
use alloc::string::String;
use log::{LevelFilter, error, info};
use uefi::prelude::*;
use uefi::proto::loaded_image::LoadedImage;

#[entry]
fn efi_main() -> Status {
    if uefi::helpers::init().is_err() {
        return Status::UNSUPPORTED;
    }

    let logger = UefiLogger::new(LevelFilter::Info);
    let logger = logger.init().expect("logger init");

    info!("efilinux starting");

    match run() {
        Ok(()) => unreachable!("run() only returns on failure; success ends in a kernel jump"),
        Err(err) => {
            logger.exit_boot_services();
            error!("boot failed: {err}");
            err.into()
        }
    }
}

fn run() -> status::Result<()> {
    let image = boot::image_handle();

    let mut filesystem = fs::FileSystem::init()?;
    info!(
        "filesystem: {} device(s) discovered, own device is index {}",
        filesystem.device_count(),
        filesystem.own_device_index()
    );

    let loader_dir = loader_directory(image)?;

    let opts = match config::load(&mut filesystem, &loader_dir)? {
        Some(opts) => opts,
        None => {
            let raw = load_options(image)?;
            cli::parse(&raw)?
        }
    };

    if opts.show_usage {
        info!("{}", cli::USAGE);
        return Err(LoaderError::Invalid("usage requested"));
    }

    if opts.list_devices {
        for (index, path) in filesystem.list_devices()? {
            info!("device {index}: {path}");
        }
        return Err(LoaderError::Invalid("device list requested"));
    }

    if opts.show_memory_map {
        let map = memory::acquire()?;
        info!("memory map: {} descriptor(s)", map.entries().count());
    }

    kernel::load_and_boot(&mut filesystem, image, &opts)
}

/// Extracts the UEFI load-options string (the command line the firmware or a
/// prior boot manager passed to this image) and narrows it from UCS-2.
fn load_options(image: Handle) -> status::Result<String> {
    let loaded_image = boot::open_protocol_exclusive::<LoadedImage>(image)
        .map_err(|e| LoaderError::from(e.status()))?;

    let Some(bytes) = loaded_image.load_options_as_bytes() else {
        return Ok(String::new());
    };
    if bytes.len() % 2 != 0 {
        return Err(LoaderError::Invalid("load options are not valid UCS-2"));
    }

    let mut narrow = alloc::vec::Vec::with_capacity(bytes.len() / 2);
    for pair in bytes.chunks_exact(2) {
        if pair[1] != 0 {
            return Err(LoaderError::Invalid("load options contain non-ASCII text"));
        }
        narrow.push(pair[0]);
    }

    String::from_utf8(narrow).map_err(|_| LoaderError::Invalid("load options are not valid ASCII"))
}

/// Directory portion of the path this image was itself loaded from, used to
/// locate a sibling `efilinux.cfg`.
fn loader_directory(image: Handle) -> status::Result<String> {
    let loaded_image = boot::open_protocol_exclusive::<LoadedImage>(image)
        .map_err(|e| LoaderError::from(e.status()))?;
    let Some(path) = loaded_image.file_path() else {
        return Ok(String::from("\\"));
    };
    let to_text = boot::locate_protocol::<uefi::proto::device_path::text::DevicePathToText>()
        .map_err(|e| LoaderError::from(e.status()))?;
    let text = to_text
        .convert_device_path_to_text(
            path,
            uefi::proto::device_path::text::DisplayOnly(true),
            uefi::proto::device_path::text::AllowShortcuts(false),
        )
        .map_err(|e| LoaderError::from(e.status()))?
        .to_string();
    let dir = text.rsplit_once('\\').map_or("\\", |(dir, _)| dir);
    Ok(String::from(dir))
}
