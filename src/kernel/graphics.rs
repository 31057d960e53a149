//! # Graphics Output Protocol Probe
//!
//! Populates `screen_info` with a linear framebuffer descriptor, or leaves it
//! zeroed if no GOP is present.

use crate::kernel::params::ScreenInfo;
use log::{info, warn};
use uefi::boot;
use uefi::proto::console::gop::{GraphicsOutput, PixelFormat};

/// EFI framebuffer marker stamped into `orig_video_isVGA`.
const ORIG_VIDEO_IS_VGA_EFI: u8 = 0x70;

/// Finds the lowest set bit's index (`pos`) and the length of the contiguous
/// run of set bits starting there (`size`). Returns `(0, 0)` for a zero mask.
#[must_use]
pub const fn find_bits(mask: u32) -> (u8, u8) {
    if mask == 0 {
        return (0, 0);
    }
    let pos = mask.trailing_zeros() as u8;
    let size = (mask >> pos).count_ones() as u8;
    (pos, size)
}

/// Queries the graphics-output protocol, if present, and fills `screen_info`.
/// Absence of GOP is non-fatal; `screen_info` is left zero-initialised.
pub fn probe(screen_info: &mut ScreenInfo) {
    let Ok(handle) = boot::get_handle_for_protocol::<GraphicsOutput>() else {
        info!("graphics: no GraphicsOutput protocol present, screen_info left zeroed");
        return;
    };
    let Ok(mut gop) = boot::open_protocol_exclusive::<GraphicsOutput>(handle) else {
        warn!("graphics: failed to open GraphicsOutput protocol");
        return;
    };

    let mode = gop.current_mode_info();
    let (width, height) = mode.resolution();
    let fb = gop.frame_buffer();

    screen_info.orig_video_isVGA = ORIG_VIDEO_IS_VGA_EFI;
    screen_info.lfb_base = fb.as_mut_ptr() as u32;
    screen_info.ext_lfb_base = (fb.as_mut_ptr() as u64 >> 32) as u32;
    screen_info.lfb_size = fb.size() as u32;
    screen_info.lfb_width = width as u16;
    screen_info.lfb_height = height as u16;

    let pixels_per_scanline = mode.stride() as u32;

    match mode.pixel_format() {
        PixelFormat::Rgb => {
            screen_info.lfb_depth = 32;
            screen_info.red_pos = 0;
            screen_info.red_size = 8;
            screen_info.green_pos = 8;
            screen_info.green_size = 8;
            screen_info.blue_pos = 16;
            screen_info.blue_size = 8;
            screen_info.rsvd_pos = 24;
            screen_info.rsvd_size = 8;
            screen_info.lfb_linelength = (pixels_per_scanline * 4) as u16;
        }
        PixelFormat::Bgr => {
            screen_info.lfb_depth = 32;
            screen_info.blue_pos = 0;
            screen_info.blue_size = 8;
            screen_info.green_pos = 8;
            screen_info.green_size = 8;
            screen_info.red_pos = 16;
            screen_info.red_size = 8;
            screen_info.rsvd_pos = 24;
            screen_info.rsvd_size = 8;
            screen_info.lfb_linelength = (pixels_per_scanline * 4) as u16;
        }
        PixelFormat::Bitmask => {
            if let Some(bitmask) = mode.pixel_bitmask() {
                let (red_pos, red_size) = find_bits(bitmask.red);
                let (green_pos, green_size) = find_bits(bitmask.green);
                let (blue_pos, blue_size) = find_bits(bitmask.blue);
                let (rsvd_pos, rsvd_size) = find_bits(bitmask.reserved);

                screen_info.red_pos = red_pos;
                screen_info.red_size = red_size;
                screen_info.green_pos = green_pos;
                screen_info.green_size = green_size;
                screen_info.blue_pos = blue_pos;
                screen_info.blue_size = blue_size;
                screen_info.rsvd_pos = rsvd_pos;
                screen_info.rsvd_size = rsvd_size;

                let depth = u16::from(red_size) + u16::from(green_size) + u16::from(blue_size)
                    + u16::from(rsvd_size);
                screen_info.lfb_depth = depth;
                screen_info.lfb_linelength = (pixels_per_scanline * u32::from(depth) / 8) as u16;
            }
        }
        PixelFormat::BltOnly => {
            screen_info.lfb_depth = 4;
            screen_info.lfb_linelength = (width / 2) as u16;
        }
        _ => {
            warn!("graphics: unrecognised pixel format, screen_info left zeroed");
        }
    }

    info!(
        "graphics: {width}x{height} framebuffer at {:#x}, depth {}",
        screen_info.lfb_base, screen_info.lfb_depth
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_mask_yields_zero_zero() {
        assert_eq!(find_bits(0), (0, 0));
    }

    #[test]
    fn single_contiguous_run() {
        // 0xFF00: bits 8..16 set.
        assert_eq!(find_bits(0xFF00), (8, 8));
    }

    #[test]
    fn run_starting_at_zero() {
        assert_eq!(find_bits(0x00FF), (0, 8));
    }

    #[test]
    fn single_bit() {
        assert_eq!(find_bits(0x0001), (0, 1));
        assert_eq!(find_bits(0x8000_0000), (31, 1));
    }

    #[test]
    fn find_bits_round_trip_for_contiguous_masks() {
        for pos in 0u8..8 {
            for size in 1u8..=(8 - pos) {
                let mask: u32 = ((1u32 << size) - 1) << pos;
                assert_eq!(find_bits(mask), (pos, size));
            }
        }
    }
}
