//! Seam between the icon service and the platform shell

use crate::bitmap::{IconPixels, RawBitmap};
use bitflags::bitflags;

bitflags! {
    /// Caller preferences for [`IconService::resolve_icon`](crate::IconService::resolve_icon)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct IconOptions: u32 {
        /// Never return a content thumbnail
        const ICON_ONLY = 0x1;
        /// Never fall back to an icon
        const THUMBNAIL_ONLY = 0x2;
        /// Only return images the shell already has cached
        const CACHED_ONLY = 0x4;
    }
}

bitflags! {
    /// `SIIGBF` flags passed to the per-item image factory
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ItemImageFlags: u32 {
        const BIGGER_SIZE_OK = 0x01;
        const ICON_ONLY = 0x04;
        const THUMBNAIL_ONLY = 0x08;
        const IN_CACHE_ONLY = 0x10;
    }
}

impl IconOptions {
    /// Factory flags for these options; larger images are always acceptable
    pub fn item_image_flags(self) -> ItemImageFlags {
        let mut flags = ItemImageFlags::BIGGER_SIZE_OK;
        if self.contains(IconOptions::ICON_ONLY) {
            flags |= ItemImageFlags::ICON_ONLY;
        }
        if self.contains(IconOptions::THUMBNAIL_ONLY) {
            flags |= ItemImageFlags::THUMBNAIL_ONLY;
        }
        if self.contains(IconOptions::CACHED_ONLY) {
            flags |= ItemImageFlags::IN_CACHE_ONLY;
        }
        flags
    }
}

/// System image list tiers, valued as their `SHIL_*` codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ImageListTier {
    Large = 0,
    Small = 1,
    ExtraLarge = 2,
    Jumbo = 4,
}

impl ImageListTier {
    pub fn for_size(size: i32) -> Self {
        match size {
            s if s <= 16 => ImageListTier::Small,
            s if s <= 32 => ImageListTier::Large,
            s if s <= 48 => ImageListTier::ExtraLarge,
            _ => ImageListTier::Jumbo,
        }
    }

    pub fn code(self) -> i32 {
        self as i32
    }
}

/// `SHFILEINFO.iIcon`: image index in the low 24 bits, overlay index above
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShellIconInfo {
    pub raw_index: i32,
}

impl ShellIconInfo {
    pub fn icon_index(&self) -> i32 {
        self.raw_index & 0x00FF_FFFF
    }

    pub fn overlay_index(&self) -> i32 {
        ((self.raw_index as u32) >> 24) as i32
    }
}

/// Native imaging calls used by the icon service. Implementations return
/// `None` on any failure and release every native object they create.
pub trait ShellImaging: Send + Sync {
    /// Thumbnail or icon from the per-item image factory
    fn item_image(&self, path: &str, size: i32, flags: ItemImageFlags) -> Option<RawBitmap>;

    /// Shell file info for `path`. With `use_file_attributes` the file itself
    /// is not accessed.
    fn file_icon_info(
        &self,
        path: &str,
        is_directory: bool,
        use_file_attributes: bool,
    ) -> Option<ShellIconInfo>;

    /// Icon `index` of the given system image list tier
    fn image_list_icon(&self, tier: ImageListTier, index: i32) -> Option<IconPixels>;

    /// Overlay badge `overlay_index` from the large image list
    fn overlay_icon(&self, overlay_index: i32) -> Option<IconPixels>;

    /// Icon with resource id `index` from a binary, at `size`
    fn extract_dll_icon(&self, file: &str, index: i32, size: i32) -> Option<IconPixels>;

    /// Number of icons embedded in a binary; 0 when unknown
    fn dll_icon_count(&self, file: &str) -> u32;

    /// Icon at `position` of a binary, at native size
    fn extract_icon_at(&self, file: &str, position: u32) -> Option<IconPixels>;

    /// Write the icon entry of a folder's custom settings. `None` clears it.
    fn set_folder_icon(&self, folder: &str, icon_file: Option<&str>, index: i32) -> bool;

    /// Point the icon location of the shortcut at `link` to `icon_file`
    fn set_shortcut_icon(&self, link: &str, icon_file: &str, index: i32) -> bool;

    /// String resource `id` of a binary
    fn load_string(&self, file: &str, id: u32) -> Option<String>;
}
