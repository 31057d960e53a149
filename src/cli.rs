//! # Command-Line Option Parser
//!
//! Parser for the firmware load-options string and `efilinux.cfg` lines.
//!
//! Grammar: `efilinux [-h] [-l] [-m] -f <filename> [<kernel-cmdline-words>...]`

use crate::limits::MAX_FILENAME;
use crate::status::{LoaderError, Result};
use alloc::string::String;

/// Parsed command-line options, independent of whether they came from the
/// firmware's `LoadOptions` or from a config file.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CliOptions {
    /// Path of the kernel image to load, resolved through the device-naming grammar.
    pub filename: Option<String>,
    /// `-h` was given: print usage and abort.
    pub show_usage: bool,
    /// `-l` was given: list filesystem devices and abort.
    pub list_devices: bool,
    /// `-m` was given: print the firmware memory map, then continue.
    pub show_memory_map: bool,
    /// Everything after the flags, rejoined with single spaces.
    pub cmdline: String,
}

/// Usage text emitted on `-h` or a malformed command line.
pub const USAGE: &str = "efilinux [-h] [-l] [-m] -f <filename> [<kernel-cmdline-words>...]";

/// Parses a whitespace-tokenized ASCII options string.
///
/// `-f` is mandatory unless `-h` or `-l` is present. Non-ASCII bytes are rejected
/// with `LoaderError::Invalid`, matching the original loader's narrowing of the
/// UCS-2 load-options string.
pub fn parse(options: &str) -> Result<CliOptions> {
    if !options.is_ascii() {
        return Err(LoaderError::Invalid("load options contain non-ASCII text"));
    }

    let mut opts = CliOptions::default();
    let mut tokens = options.split_whitespace().peekable();
    let mut cmdline_words: alloc::vec::Vec<&str> = alloc::vec::Vec::new();

    while let Some(token) = tokens.next() {
        match token {
            "-h" => {
                opts.show_usage = true;
                return Ok(opts);
            }
            "-l" => {
                opts.list_devices = true;
                return Ok(opts);
            }
            "-m" => opts.show_memory_map = true,
            "-f" => {
                let name = tokens
                    .next()
                    .ok_or(LoaderError::Invalid("-f requires a filename argument"))?;
                if name.len() >= MAX_FILENAME {
                    return Err(LoaderError::Invalid("filename exceeds MAX_FILENAME"));
                }
                opts.filename = Some(String::from(name));
            }
            word => {
                cmdline_words.push(word);
                // Everything from here to end-of-options is the kernel command line.
                for rest in tokens.by_ref() {
                    cmdline_words.push(rest);
                }
            }
        }
    }

    opts.cmdline = cmdline_words.join(" ");

    if opts.filename.is_none() {
        return Err(LoaderError::Invalid("missing required -f <filename>"));
    }

    Ok(opts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_filename_and_cmdline() {
        let opts = parse("-f bzImage root=/dev/sda1").unwrap();
        assert_eq!(opts.filename.as_deref(), Some("bzImage"));
        assert_eq!(opts.cmdline, "root=/dev/sda1");
        assert!(!opts.show_usage);
    }

    #[test]
    fn usage_flag_short_circuits() {
        let opts = parse("-h").unwrap();
        assert!(opts.show_usage);
        assert!(opts.filename.is_none());
    }

    #[test]
    fn list_devices_short_circuits() {
        let opts = parse("-l -f ignored").unwrap();
        assert!(opts.list_devices);
        assert!(opts.filename.is_none());
    }

    #[test]
    fn missing_filename_is_invalid() {
        assert!(parse("-m").is_err());
    }

    #[test]
    fn dash_f_without_value_is_invalid() {
        assert!(parse("-f").is_err());
    }

    #[test]
    fn memory_map_flag_continues_parsing() {
        let opts = parse("-m -f bzImage quiet").unwrap();
        assert!(opts.show_memory_map);
        assert_eq!(opts.filename.as_deref(), Some("bzImage"));
        assert_eq!(opts.cmdline, "quiet");
    }

    #[test]
    fn non_ascii_is_rejected() {
        assert!(parse("-f bzImage\u{00e9}").is_err());
    }
}
