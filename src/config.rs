//! # Configuration File Reader
//!
//! Reader for `efilinux.cfg`, which supersedes firmware load options when present.

use crate::cli::{self, CliOptions};
use crate::fs::FileSystem;
use crate::limits::CONFIG_FILE_CAP;
use crate::status::LoaderError;
use alloc::format;
use log::info;

const CONFIG_FILE_NAME: &str = "efilinux.cfg";

/// Attempts to load and parse `efilinux.cfg` from the loader's own device and
/// directory. Returns `Ok(None)` if the file simply doesn't exist — that is
/// not an error, the caller falls back to firmware-supplied load options.
pub fn load(fs: &mut FileSystem, loader_dir: &str) -> crate::status::Result<Option<CliOptions>> {
    let path = format!("{}:{}\\{}", fs.own_device_index(), loader_dir, CONFIG_FILE_NAME);

    let mut file = match fs.open(&path) {
        Ok(file) => file,
        Err(LoaderError::NotFound(_)) => return Ok(None),
        Err(e) => return Err(e),
    };

    let size = file.size()?;
    if size as usize > CONFIG_FILE_CAP {
        return Err(LoaderError::Invalid("efilinux.cfg exceeds the size cap"));
    }

    let bytes = file.read_to_vec()?;
    file.close();

    let line_end = bytes.iter().position(|&b| b == b'\n').unwrap_or(bytes.len());
    let line = core::str::from_utf8(&bytes[..line_end])
        .map_err(|_| LoaderError::Invalid("efilinux.cfg is not ASCII"))?
        .trim_end_matches('\r');

    info!("efilinux.cfg found, superseding firmware load options");
    cli::parse(line).map(Some)
}
