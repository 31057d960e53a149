//! # Linux x86 Boot Protocol Structures
//!
//! The setup header and the 16 KiB
//! `boot_params` ("zero page") block the kernel expects a pointer to at entry.
//!
//! Field layout is bit-exact with `linux/arch/x86/include/uapi/asm/bootparam.h`;
//! every struct is `#[repr(C, packed)]` so its in-memory shape matches what the
//! kernel's own entry code reads.

#![allow(non_snake_case)]

/// `"HdrS"` as a little-endian 32-bit value, the setup header's magic number.
pub const HDR_MAGIC: u32 = 0x5372_6448;

/// Boot-sector signature, at a fixed offset in every x86 kernel image.
pub const BOOT_SECT_SIGNATURE: u16 = 0xAA55;

/// The `loadflags` bit that marks a kernel as position-independent.
pub const LOADFLAG_RELOCATABLE: u8 = 0x1;

#[derive(Copy, Clone, Debug, Default)]
#[repr(C, packed)]
pub struct ScreenInfo {
    pub orig_x: u8,
    pub orig_y: u8,
    pub ext_mem_k: u16,
    pub orig_video_page: u16,
    pub orig_video_mode: u8,
    pub orig_video_cols: u8,
    pub flags: u8,
    pub unused2: u8,
    pub orig_video_ega_bx: u16,
    pub unused3: u16,
    pub orig_video_lines: u8,
    /// EFI framebuffer marker; set to `0x70` by the graphics probe.
    pub orig_video_isVGA: u8,
    pub orig_video_points: u16,
    pub lfb_width: u16,
    pub lfb_height: u16,
    pub lfb_depth: u16,
    pub lfb_base: u32,
    pub lfb_size: u32,
    pub cl_magic: u16,
    pub cl_offset: u16,
    pub lfb_linelength: u16,
    pub red_size: u8,
    pub red_pos: u8,
    pub green_size: u8,
    pub green_pos: u8,
    pub blue_size: u8,
    pub blue_pos: u8,
    pub rsvd_size: u8,
    pub rsvd_pos: u8,
    pub vesapm_seg: u16,
    pub vesapm_off: u16,
    pub pages: u16,
    pub vesa_attributes: u16,
    pub capabilities: u32,
    pub ext_lfb_base: u32,
    pub _reserved: [u8; 2],
}

#[derive(Copy, Clone, Debug, Default)]
#[repr(C, packed)]
pub struct ApmBiosInfo {
    pub version: u16,
    pub cseg: u16,
    pub offset: u32,
    pub cseg_16: u16,
    pub dseg: u16,
    pub flags: u16,
    pub cseg_len: u16,
    pub cseg_16_len: u16,
    pub dseg_len: u16,
}

#[derive(Copy, Clone, Debug, Default)]
#[repr(C, packed)]
pub struct IstInfo {
    pub signature: u32,
    pub command: u32,
    pub event: u32,
    pub perf_level: u32,
}

#[derive(Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct SysDescTable {
    pub length: u16,
    pub table: [u8; 14],
}

impl Default for SysDescTable {
    fn default() -> Self {
        Self {
            length: 0,
            table: [0; 14],
        }
    }
}

#[derive(Copy, Clone, Debug, Default)]
#[repr(C, packed)]
pub struct OlpcOfwHeader {
    pub ofw_magic: u32,
    pub ofw_version: u32,
    pub cif_handler: u32,
    pub irq_desc_table: u32,
}

#[derive(Copy, Clone, Debug)]
#[repr(C)]
pub struct EdidInfo {
    pub dummy: [u8; 128],
}

impl Default for EdidInfo {
    fn default() -> Self {
        Self { dummy: [0; 128] }
    }
}

/// UEFI runtime-table coordinates handed to the kernel so it can continue
/// calling runtime services after the hand-off.
#[derive(Copy, Clone, Debug, Default)]
#[repr(C)]
pub struct EfiInfo {
    /// `"EL32"` or `"EL64"` depending on target architecture.
    pub efi_loader_signature: u32,
    pub efi_systab: u32,
    pub efi_memdesc_size: u32,
    pub efi_memdesc_version: u32,
    pub efi_memmap: u32,
    pub efi_memmap_size: u32,
    pub efi_systab_hi: u32,
    pub efi_memmap_hi: u32,
}

/// `"EL32"` little-endian as a u32, stamped into `efi_loader_signature` on x86.
pub const EFI_LOADER_SIGNATURE_32: u32 = u32::from_le_bytes(*b"EL32");
/// `"EL64"` little-endian as a u32, stamped into `efi_loader_signature` on x86_64.
pub const EFI_LOADER_SIGNATURE_64: u32 = u32::from_le_bytes(*b"EL64");

/// The setup header embedded in the kernel's boot sector / first setup sectors.
#[derive(Copy, Clone, Debug, Default)]
#[repr(C, packed)]
pub struct SetupHeader {
    pub setup_sects: u8,
    pub root_flags: u16,
    pub syssize: u32,
    pub ram_size: u16,
    pub vid_mode: u16,
    pub root_dev: u16,
    pub boot_flag: u16,
    pub jump: u16,
    /// Must equal [`HDR_MAGIC`] ("HdrS") for this to be a valid header.
    pub header: u32,
    /// Boot protocol version, e.g. `0x20d` for 2.13.
    pub version: u16,
    pub realmode_swtch: u32,
    pub start_sys_seg: u16,
    pub kernel_version: u16,
    /// Stamped to [`crate::limits::LOADER_ID`] by this loader.
    pub type_of_loader: u8,
    pub loadflags: u8,
    pub setup_move_size: u16,
    pub code32_start: u32,
    pub ramdisk_image: u32,
    pub ramdisk_size: u32,
    pub bootsect_kludge: u32,
    pub heap_end_ptr: u16,
    pub ext_loader_ver: u8,
    pub ext_loader_type: u8,
    pub cmd_line_ptr: u32,
    pub ramdisk_max: u32,
    pub kernel_alignment: u32,
    pub relocatable_kernel: u8,
    pub min_alignment: u8,
    pub xloadflags: u16,
    pub cmdline_size: u32,
    pub hardware_subarch: u32,
    pub hardware_subarch_data: u64,
    pub payload_offset: u32,
    pub payload_length: u32,
    pub setup_data: u64,
    pub pref_address: u64,
    pub init_size: u32,
    pub handover_offset: u32,
    pub kernel_info_offset: u32,
}

impl SetupHeader {
    /// `true` once [`SetupHeader::loadflags`]'s relocatable bit is set.
    #[must_use]
    pub const fn is_relocatable(&self) -> bool {
        self.loadflags & LOADFLAG_RELOCATABLE != 0
    }
}

/// E820 memory type, as the kernel's `e820.h` defines it.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum E820Type {
    Ram = 1,
    Reserved = 2,
    Acpi = 3,
    Nvs = 4,
    Unusable = 5,
}

#[derive(Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct BootE820Entry {
    pub addr: u64,
    pub size: u64,
    pub typ: E820Type,
}

/// Maximum number of E820 entries `boot_params` can hold.
pub const E820_MAX_ENTRIES_ZEROPAGE: usize = 128;

#[derive(Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct EddDeviceParams {
    pub _dummy: [u8; (0xeec - 0xd00) / 6 - 8],
}

impl Default for EddDeviceParams {
    fn default() -> Self {
        Self {
            _dummy: [0; (0xeec - 0xd00) / 6 - 8],
        }
    }
}

#[derive(Copy, Clone, Debug, Default)]
#[repr(C, packed)]
pub struct EddInfo {
    pub device: u8,
    pub version: u8,
    pub interface_support: u16,
    pub legacy_max_cylinder: u16,
    pub legacy_max_head: u8,
    pub legacy_sectors_per_track: u8,
    pub params: EddDeviceParams,
}

const EDD_MBR_SIG_MAX: usize = 16;
const EDDMAXNR: usize = 6;

/// The full 16 KiB "zero page" handed to the kernel at entry.
#[repr(C, packed)]
pub struct BootParams {
    pub screen_info: ScreenInfo,
    pub apm_bios_info: ApmBiosInfo,
    pub _pad2: [u8; 4],
    pub tboot_addr: u64,
    pub ist_info: IstInfo,
    pub acpi_rsdp_addr: u64,
    pub _pad3: [u8; 8],
    pub hd0_info: [u8; 16],
    pub hd1_info: [u8; 16],
    pub sys_desc_table: SysDescTable,
    pub olpc_ofw_header: OlpcOfwHeader,
    pub ext_ramdisk_image: u32,
    pub ext_ramdisk_size: u32,
    pub ext_cmd_line_ptr: u32,
    pub _pad4: [u8; 112],
    pub cc_blob_address: u32,
    pub edid_info: EdidInfo,
    pub efi_info: EfiInfo,
    pub alt_mem_k: u32,
    pub scratch: u32,
    pub e820_entries: u8,
    pub eddbuf_entries: u8,
    pub edd_mbr_sig_buf_entries: u8,
    pub kbd_status: u8,
    pub secure_boot: u8,
    pub _pad5: [u8; 2],
    pub sentinel: u8,
    pub _pad6: [u8; 1],
    pub hdr: SetupHeader,
    pub _pad7: [u8; 0x290 - 0x1f1 - core::mem::size_of::<SetupHeader>()],
    pub edd_mbr_sig_buffer: [u32; EDD_MBR_SIG_MAX],
    pub e820_table: [BootE820Entry; E820_MAX_ENTRIES_ZEROPAGE],
    pub _pad8: [u8; 48],
    pub eddbuf: [EddInfo; EDDMAXNR],
    pub _pad9: [u8; 276],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boot_params_is_16kib() {
        assert_eq!(core::mem::size_of::<BootParams>(), 0x1000 + 0x1000 * 3);
    }

    #[test]
    fn hdr_sits_at_0x1f1() {
        assert_eq!(core::mem::offset_of!(BootParams, hdr), 0x1f1);
    }

    #[test]
    fn e820_table_sits_at_0x2d0() {
        assert_eq!(core::mem::offset_of!(BootParams, e820_table), 0x2d0);
    }

    #[test]
    fn relocatable_flag_detection() {
        let mut hdr = SetupHeader::default();
        assert!(!hdr.is_relocatable());
        hdr.loadflags = LOADFLAG_RELOCATABLE;
        assert!(hdr.is_relocatable());
    }
}
