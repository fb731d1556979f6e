//! Shell imaging on platforms without a Windows shell

use crate::bitmap::{IconPixels, RawBitmap};
use crate::imaging::{ImageListTier, ItemImageFlags, ShellIconInfo, ShellImaging};

/// Every query fails, so every icon resolution yields nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedShell;

impl ShellImaging for UnsupportedShell {
    fn item_image(&self, path: &str, _size: i32, _flags: ItemImageFlags) -> Option<RawBitmap> {
        tracing::trace!("No shell imaging available for {}", path);
        None
    }

    fn file_icon_info(&self, _path: &str, _is_directory: bool, _attrs: bool) -> Option<ShellIconInfo> {
        None
    }

    fn image_list_icon(&self, _tier: ImageListTier, _index: i32) -> Option<IconPixels> {
        None
    }

    fn overlay_icon(&self, _overlay_index: i32) -> Option<IconPixels> {
        None
    }

    fn extract_dll_icon(&self, _file: &str, _index: i32, _size: i32) -> Option<IconPixels> {
        None
    }

    fn dll_icon_count(&self, _file: &str) -> u32 {
        0
    }

    fn extract_icon_at(&self, _file: &str, _position: u32) -> Option<IconPixels> {
        None
    }

    fn set_folder_icon(&self, folder: &str, _icon_file: Option<&str>, _index: i32) -> bool {
        tracing::trace!("No folder settings available for {}", folder);
        false
    }

    fn set_shortcut_icon(&self, _link: &str, _icon_file: &str, _index: i32) -> bool {
        false
    }

    fn load_string(&self, _file: &str, _id: u32) -> Option<String> {
        None
    }
}
