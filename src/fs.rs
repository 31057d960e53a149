//! # Filesystem Facade
//!
//! Filesystem facade over the firmware's `SimpleFileSystem` protocol.
//!
//! Builds an index-addressable table of every filesystem-capable handle at
//! `init()`, then resolves `<prefix>:<path>` names against that table the
//! way the original loader's `fs.c` does.

use crate::limits::MAX_FILENAME;
use crate::status::{LoaderError, Result};
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use uefi::boot::{self, ScopedProtocol, SearchType};
use uefi::proto::device_path::DevicePath;
use uefi::proto::device_path::text::{AllowShortcuts, DevicePathToText, DisplayOnly};
use uefi::proto::loaded_image::LoadedImage;
use uefi::proto::media::file::{File, FileAttribute, FileInfo, FileMode, RegularFile};
use uefi::proto::media::fs::SimpleFileSystem;
use uefi::{CStr16, Handle};

/// One entry of the filesystem-device table: the firmware handle and its
/// already-open volume root.
pub struct Device {
    pub handle: Handle,
    root: ScopedProtocol<SimpleFileSystem>,
}

/// An opened file. Reads advance an internal firmware-tracked position.
pub struct OpenFile {
    file: RegularFile,
}

impl OpenFile {
    /// Reads up to `buf.len()` bytes, returning the number actually read.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.file
            .read(buf)
            .map_err(|e| LoaderError::from(e.status()))
    }

    /// Reads the file to end-of-file into a freshly allocated buffer.
    pub fn read_to_vec(&mut self) -> Result<Vec<u8>> {
        let len = self.size()?;
        let mut buf = alloc::vec![0u8; len as usize];
        let mut total = 0usize;
        while total < buf.len() {
            let n = self.read(&mut buf[total..])?;
            if n == 0 {
                break;
            }
            total += n;
        }
        buf.truncate(total);
        Ok(buf)
    }

    /// Moves the internal position to `offset` bytes from the start of the file.
    pub fn seek(&mut self, offset: u64) -> Result<()> {
        self.file
            .set_position(offset)
            .map_err(|e| LoaderError::from(e.status()))
    }

    /// Returns the file's size in bytes.
    pub fn size(&mut self) -> Result<u64> {
        let info = self
            .file
            .get_boxed_info::<FileInfo>()
            .map_err(|e| LoaderError::from(e.status()))?;
        Ok(info.file_size())
    }

    /// Closes the file handle.
    pub fn close(self) {
        self.file.close();
    }
}

/// The filesystem-device table: every filesystem-capable handle discovered
/// at `init()`, plus which index names "the device the loader was loaded from".
pub struct FileSystem {
    devices: Vec<Device>,
    own_device: usize,
}

impl FileSystem {
    /// Locates every handle exposing `SimpleFileSystem`, opens each volume's
    /// root directory, and records the index of the loader's own device.
    pub fn init() -> Result<Self> {
        let handles = boot::locate_handle_buffer(SearchType::ByProtocol(&SimpleFileSystem::GUID))
            .map_err(|e| LoaderError::from(e.status()))?;

        let mut devices = Vec::with_capacity(handles.len());
        for &handle in handles.iter() {
            let root = boot::open_protocol_exclusive::<SimpleFileSystem>(handle)
                .map_err(|e| LoaderError::from(e.status()))?;
            devices.push(Device { handle, root });
        }

        let own_device = Self::locate_own_device(&devices).unwrap_or(0);

        Ok(Self {
            devices,
            own_device,
        })
    }

    /// Finds which table entry corresponds to the device the image itself
    /// was loaded from, by comparing `LoadedImage::device()` against each
    /// table entry's handle.
    fn locate_own_device(devices: &[Device]) -> Option<usize> {
        let image_handle = boot::image_handle();
        let loaded_image =
            boot::open_protocol_exclusive::<LoadedImage>(image_handle).ok()?;
        let own_handle = loaded_image.device()?;
        devices.iter().position(|d| d.handle == own_handle)
    }

    /// Human-readable device-path text for table entry `index`, used by `-l`
    /// and by the textual-device-path prefix match.
    fn device_path_text(&self, index: usize) -> Result<String> {
        let handle = self
            .devices
            .get(index)
            .ok_or(LoaderError::NotFound("device index out of range"))?
            .handle;
        let device_path = boot::open_protocol_exclusive::<DevicePath>(handle)
            .map_err(|e| LoaderError::from(e.status()))?;
        let to_text = boot::locate_protocol::<DevicePathToText>()
            .map_err(|e| LoaderError::from(e.status()))?;
        let text = to_text
            .convert_device_path_to_text(&device_path, DisplayOnly(true), AllowShortcuts(false))
            .map_err(|e| LoaderError::from(e.status()))?;
        Ok(text.to_string())
    }

    /// Lists every device's index and device-path text, for the `-l` CLI flag.
    pub fn list_devices(&self) -> Result<Vec<(usize, String)>> {
        (0..self.devices.len())
            .map(|i| Ok((i, self.device_path_text(i)?)))
            .collect()
    }

    /// Resolves a `<prefix>:<path>` name and opens the file read-only.
    ///
    /// Prefix rules: empty prefix resolves to the loader's own device; a
    /// decimal prefix indexes the table; any other prefix is matched
    /// case-insensitively against each entry's device-path text. Consecutive
    /// `:`/`\` separators after the prefix are skipped.
    pub fn open(&mut self, name: &str) -> Result<OpenFile> {
        if name.is_empty() {
            return Err(LoaderError::Invalid("empty filename"));
        }
        if name.len() >= MAX_FILENAME {
            return Err(LoaderError::Invalid("filename exceeds MAX_FILENAME"));
        }

        let (prefix, rest) = match name.split_once(':') {
            Some((prefix, rest)) => (prefix, rest),
            None => ("", name),
        };
        let path = rest.trim_start_matches([':', '\\']);

        let index = self.resolve_prefix(prefix)?;

        let mut buf = [0u16; MAX_FILENAME];
        let wide = CStr16::from_str_with_buf(path, &mut buf)
            .map_err(|_| LoaderError::Invalid("path is not representable in UCS-2"))?;

        let device = &mut self.devices[index];
        let mut root = device
            .root
            .open_volume()
            .map_err(|e| LoaderError::from(e.status()))?;
        let handle = root
            .open(wide, FileMode::Read, FileAttribute::empty())
            .map_err(|e| LoaderError::from(e.status()))?;
        let file = handle
            .into_regular_file()
            .ok_or(LoaderError::Invalid("path resolved to a directory"))?;

        Ok(OpenFile { file })
    }

    fn resolve_prefix(&self, prefix: &str) -> Result<usize> {
        if prefix.is_empty() {
            return Ok(self.own_device);
        }
        if let Ok(index) = prefix.parse::<usize>() {
            if index < self.devices.len() {
                return Ok(index);
            }
            return Err(LoaderError::NotFound("device index out of range"));
        }
        for i in 0..self.devices.len() {
            if let Ok(text) = self.device_path_text(i) {
                if text.eq_ignore_ascii_case(prefix) {
                    return Ok(i);
                }
            }
        }
        Err(LoaderError::NotFound("no device matches prefix"))
    }

    /// Index of the device the loader itself was loaded from.
    #[must_use]
    pub const fn own_device_index(&self) -> usize {
        self.own_device
    }

    /// Drops every open volume-root handle without calling back into the
    /// firmware's close-protocol service.
    ///
    /// Call this once, immediately before `exit_boot_services`: after boot
    /// services exit, the protocol pointers `ScopedProtocol` would otherwise
    /// close on drop no longer point at anything live.
    pub fn close_all(&mut self) {
        for device in self.devices.drain(..) {
            core::mem::forget(device);
        }
    }

    /// Number of table entries.
    #[must_use]
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn path_trims_leading_separators() {
        assert_eq!("\\bzImage".trim_start_matches(['\\', ':']), "bzImage");
        assert_eq!("::\\bzImage".trim_start_matches(['\\', ':']), "bzImage");
    }
}
