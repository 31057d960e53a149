//! # Initrd Staging
//!
//! Concatenates `initrd=` files named on the kernel command line into one
//! contiguous staged buffer.

use crate::fs::FileSystem;
use crate::limits::RAMDISK_ALIGN;
use crate::memory::{efree, emalloc};
use alloc::string::String;
use alloc::vec::Vec;
use log::warn;

/// Result of a (possibly partial/aborted) initrd staging attempt.
#[derive(Default)]
pub struct StagedInitrd {
    pub ramdisk_start: u32,
    pub ramdisk_len: u32,
}

/// Scans `cmdline` for `initrd=<path>` tokens, in order of appearance.
pub fn find_initrd_paths(cmdline: &str) -> Vec<String> {
    let mut paths = Vec::new();
    let mut rest = cmdline;
    while let Some(idx) = rest.find("initrd=") {
        let after = &rest[idx + "initrd=".len()..];
        let end = after.find(' ').unwrap_or(after.len());
        paths.push(String::from(&after[..end]));
        rest = &after[end..];
    }
    paths
}

/// Opens every `initrd=` file named in `cmdline`, concatenates them into a
/// single staged buffer below `ramdisk_max`, and returns the result.
///
/// Per the documented best-effort behavior: if the concatenated buffer would
/// land above `ramdisk_max`, or any file fails to read, the allocation is
/// released and an *empty* `StagedInitrd` is returned rather than propagating
/// an error — the kernel simply boots without an initrd.
pub fn stage(fs: &mut FileSystem, cmdline: &str, ramdisk_max: u32) -> StagedInitrd {
    let paths = find_initrd_paths(cmdline);
    if paths.is_empty() {
        return StagedInitrd::default();
    }

    let mut files = Vec::with_capacity(paths.len());
    let mut total: u64 = 0;
    for path in &paths {
        let mut file = match fs.open(path) {
            Ok(file) => file,
            Err(e) => {
                warn!("initrd: failed to open {path}: {e}");
                return StagedInitrd::default();
            }
        };
        let size = match file.size() {
            Ok(size) => size,
            Err(e) => {
                warn!("initrd: failed to stat {path}: {e}");
                return StagedInitrd::default();
            }
        };
        total += size;
        files.push((file, size));
    }

    let addr = match emalloc(total, RAMDISK_ALIGN, None) {
        Ok(addr) => addr,
        Err(e) => {
            warn!("initrd: allocation for {total:#x} bytes failed: {e}");
            return StagedInitrd::default();
        }
    };

    if addr > u64::from(ramdisk_max) {
        warn!("initrd: staged address {addr:#x} exceeds ramdisk_max {ramdisk_max:#x}, aborting");
        efree(addr, total);
        return StagedInitrd::default();
    }

    let mut offset = addr;
    for (mut file, size) in files {
        let dst = unsafe {
            core::slice::from_raw_parts_mut(offset as *mut u8, size as usize)
        };
        let mut read_total = 0usize;
        let mut ok = true;
        while read_total < dst.len() {
            match file.read(&mut dst[read_total..]) {
                Ok(0) => {
                    ok = false;
                    break;
                }
                Ok(n) => read_total += n,
                Err(e) => {
                    warn!("initrd: read error: {e}");
                    ok = false;
                    break;
                }
            }
        }
        file.close();
        if !ok {
            efree(addr, total);
            return StagedInitrd::default();
        }
        offset += size;
    }

    StagedInitrd {
        ramdisk_start: addr as u32,
        ramdisk_len: total as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_single_initrd() {
        let paths = find_initrd_paths("root=/dev/sda1 initrd=a.img quiet");
        assert_eq!(paths, alloc::vec![String::from("a.img")]);
    }

    #[test]
    fn finds_multiple_initrds_in_order() {
        let paths = find_initrd_paths("foo initrd=a.img bar initrd=b.img");
        assert_eq!(
            paths,
            alloc::vec![String::from("a.img"), String::from("b.img")]
        );
    }

    #[test]
    fn no_initrd_tokens() {
        assert!(find_initrd_paths("root=/dev/sda1 quiet").is_empty());
    }

    #[test]
    fn initrd_at_end_of_string() {
        let paths = find_initrd_paths("quiet initrd=end.img");
        assert_eq!(paths, alloc::vec![String::from("end.img")]);
    }
}
