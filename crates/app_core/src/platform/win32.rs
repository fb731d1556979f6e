//! Shell imaging through the Win32 shell and GDI

use crate::bitmap::{IconPixels, RawBitmap};
use crate::imaging::{ImageListTier, ItemImageFlags, ShellIconInfo, ShellImaging};
use std::ffi::c_void;
use windows::core::{Interface, HSTRING, PCWSTR, PWSTR};
use windows::Win32::Foundation::{FreeLibrary, BOOL, HANDLE, HINSTANCE, HMODULE, HWND, SIZE};
use windows::Win32::Graphics::Gdi::{
    DeleteObject, GetDC, GetDIBits, GetObjectW, ReleaseDC, BITMAP, BITMAPINFO,
    BITMAPINFOHEADER, BI_RGB, DIB_RGB_COLORS, HBITMAP, HGDIOBJ,
};
use windows::Win32::Storage::FileSystem::{FILE_ATTRIBUTE_DIRECTORY, FILE_FLAGS_AND_ATTRIBUTES};
use windows::Win32::System::Com::{
    CoCreateInstance, CoInitializeEx, CoUninitialize, IBindCtx, IPersistFile,
    CLSCTX_INPROC_SERVER, COINIT_APARTMENTTHREADED, STGM_READWRITE,
};
use windows::Win32::System::LibraryLoader::{
    GetModuleHandleW, LoadLibraryExW, LOAD_LIBRARY_AS_DATAFILE, LOAD_LIBRARY_AS_IMAGE_RESOURCE,
};
use windows::Win32::UI::Controls::{IImageList, ILD_TRANSPARENT};
use windows::Win32::UI::Shell::{
    ExtractIconW, IShellItemImageFactory, SHCreateItemFromParsingName, SHDefExtractIconW,
    IShellLinkW, SHGetFileInfoW, SHGetImageList, SHGetSetFolderCustomSettings, ShellLink,
    SHFILEINFOW, SHFOLDERCUSTOMSETTINGS, SHGFI_ICON, SHGFI_ICONLOCATION, SHGFI_OVERLAYINDEX,
    SHGFI_SYSICONINDEX, SHGFI_USEFILEATTRIBUTES, SIIGBF,
};
use windows::Win32::UI::WindowsAndMessaging::{
    DestroyIcon, GetIconInfo, LoadStringW, HICON, ICONINFO,
};

/// `SHFOLDERCUSTOMSETTINGS.dwMask` bit for the icon fields
const FCSM_ICONFILE: u32 = 0x10;
/// Write the settings even when desktop.ini is missing
const FCS_FORCEWRITE: u32 = 0x2;

/// Longest string resource read back, in UTF-16 code units
const MAX_STRING_RESOURCE: usize = 2048;

/// Keeps COM initialized on the calling thread for one query
struct ComScope {
    owned: bool,
}

impl ComScope {
    fn enter() -> Self {
        // S_FALSE (already initialized) still needs a matching uninitialize
        let owned = unsafe { CoInitializeEx(None, COINIT_APARTMENTTHREADED) }.is_ok();
        Self { owned }
    }
}

impl Drop for ComScope {
    fn drop(&mut self) {
        if self.owned {
            unsafe { CoUninitialize() };
        }
    }
}

/// A binary mapped for resource access only, unloaded on drop
struct ResourceModule(HMODULE);

impl ResourceModule {
    fn load(file: &str) -> Option<Self> {
        let module = unsafe {
            LoadLibraryExW(
                &HSTRING::from(file),
                HANDLE::default(),
                LOAD_LIBRARY_AS_DATAFILE | LOAD_LIBRARY_AS_IMAGE_RESOURCE,
            )
        }
        .map_err(|e| tracing::trace!("LoadLibraryExW({}) failed: {}", file, e))
        .ok()?;
        Some(Self(module))
    }
}

impl Drop for ResourceModule {
    fn drop(&mut self) {
        let _ = unsafe { FreeLibrary(self.0) };
    }
}

fn delete_bitmap(bitmap: HBITMAP) {
    if !bitmap.is_invalid() {
        let _ = unsafe { DeleteObject(HGDIOBJ(bitmap.0)) };
    }
}

/// Read any bitmap back as top-down 32bpp BGRA
fn read_bitmap(bitmap: HBITMAP) -> Option<RawBitmap> {
    let mut info = BITMAP::default();
    let got = unsafe {
        GetObjectW(
            HGDIOBJ(bitmap.0),
            std::mem::size_of::<BITMAP>() as i32,
            Some(&mut info as *mut _ as *mut c_void),
        )
    };
    if got == 0 || info.bmWidth <= 0 || info.bmHeight == 0 {
        return None;
    }

    let width = info.bmWidth as u32;
    let height = info.bmHeight.unsigned_abs();
    let mut header = BITMAPINFO {
        bmiHeader: BITMAPINFOHEADER {
            biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
            biWidth: width as i32,
            biHeight: -(height as i32),
            biPlanes: 1,
            biBitCount: 32,
            biCompression: BI_RGB.0,
            ..Default::default()
        },
        ..Default::default()
    };
    let mut bgra = vec![0u8; width as usize * height as usize * 4];

    let lines = unsafe {
        let hdc = GetDC(HWND::default());
        let lines = GetDIBits(
            hdc,
            bitmap,
            0,
            height,
            Some(bgra.as_mut_ptr() as *mut c_void),
            &mut header,
            DIB_RGB_COLORS,
        );
        ReleaseDC(HWND::default(), hdc);
        lines
    };
    if lines == 0 {
        tracing::trace!("GetDIBits returned no lines");
        return None;
    }

    Some(RawBitmap::new(width, height, info.bmBitsPixel, bgra))
}

/// Take ownership of `icon`, read its planes and destroy it
fn read_icon(icon: HICON) -> Option<IconPixels> {
    if icon.is_invalid() {
        return None;
    }

    let mut info = ICONINFO::default();
    let got = unsafe { GetIconInfo(icon, &mut info) };
    let _ = unsafe { DestroyIcon(icon) };
    if let Err(e) = got {
        tracing::trace!("GetIconInfo failed: {}", e);
        return None;
    }

    let color = (!info.hbmColor.is_invalid())
        .then(|| read_bitmap(info.hbmColor))
        .flatten();
    let mask = (!info.hbmMask.is_invalid())
        .then(|| read_bitmap(info.hbmMask))
        .flatten();
    delete_bitmap(info.hbmColor);
    delete_bitmap(info.hbmMask);

    match (color, mask) {
        (Some(color), mask) => Some(IconPixels { color, mask }),
        // Monochrome icon: AND plane on top, XOR plane below
        (None, Some(mask)) => {
            let half = mask.height / 2;
            Some(IconPixels {
                color: mask.rows(half, half)?,
                mask: mask.rows(0, half),
            })
        }
        (None, None) => None,
    }
}

fn module_instance() -> Option<HINSTANCE> {
    let module = unsafe { GetModuleHandleW(PCWSTR::null()) }.ok()?;
    Some(HINSTANCE(module.0))
}

/// Shell imaging backed by `IShellItemImageFactory`, the system image lists
/// and icon extraction from binaries
#[derive(Debug, Default)]
pub struct WindowsShell;

impl WindowsShell {
    pub fn new() -> Self {
        Self
    }

    fn image_list(tier: ImageListTier) -> Option<IImageList> {
        match unsafe { SHGetImageList::<IImageList>(tier.code()) } {
            Ok(list) => Some(list),
            Err(e) => {
                tracing::debug!("SHGetImageList({:?}) failed: {}", tier, e);
                None
            }
        }
    }
}

impl ShellImaging for WindowsShell {
    fn item_image(&self, path: &str, size: i32, flags: ItemImageFlags) -> Option<RawBitmap> {
        let _com = ComScope::enter();

        let factory: IShellItemImageFactory =
            match unsafe { SHCreateItemFromParsingName(&HSTRING::from(path), None::<&IBindCtx>) } {
                Ok(factory) => factory,
                Err(e) => {
                    tracing::trace!("No shell item for {}: {}", path, e);
                    return None;
                }
            };

        let bitmap = unsafe {
            factory.GetImage(
                SIZE {
                    cx: size,
                    cy: size,
                },
                SIIGBF(flags.bits() as i32),
            )
        }
        .map_err(|e| tracing::trace!("GetImage({}) failed: {}", path, e))
        .ok()?;

        let raw = read_bitmap(bitmap);
        delete_bitmap(bitmap);
        raw
    }

    fn file_icon_info(
        &self,
        path: &str,
        is_directory: bool,
        use_file_attributes: bool,
    ) -> Option<ShellIconInfo> {
        let mut flags = SHGFI_OVERLAYINDEX | SHGFI_ICON | SHGFI_SYSICONINDEX | SHGFI_ICONLOCATION;
        if use_file_attributes {
            flags |= SHGFI_USEFILEATTRIBUTES;
        }
        let attributes = if is_directory {
            FILE_ATTRIBUTE_DIRECTORY
        } else {
            FILE_FLAGS_AND_ATTRIBUTES(0)
        };

        let mut info = SHFILEINFOW::default();
        let ret = unsafe {
            SHGetFileInfoW(
                &HSTRING::from(path),
                attributes,
                Some(&mut info),
                std::mem::size_of::<SHFILEINFOW>() as u32,
                flags,
            )
        };
        if ret == 0 {
            return None;
        }

        if !info.hIcon.is_invalid() {
            let _ = unsafe { DestroyIcon(info.hIcon) };
        }
        Some(ShellIconInfo {
            raw_index: info.iIcon,
        })
    }

    fn image_list_icon(&self, tier: ImageListTier, index: i32) -> Option<IconPixels> {
        let _com = ComScope::enter();
        let list = Self::image_list(tier)?;
        let icon = unsafe { list.GetIcon(index, ILD_TRANSPARENT.0) }.ok()?;
        read_icon(icon)
    }

    fn overlay_icon(&self, overlay_index: i32) -> Option<IconPixels> {
        let _com = ComScope::enter();
        let list = Self::image_list(ImageListTier::Large)?;
        let image = unsafe { list.GetOverlayImage(overlay_index) }.ok()?;
        let icon = unsafe { list.GetIcon(image, ILD_TRANSPARENT.0) }.ok()?;
        read_icon(icon)
    }

    fn extract_dll_icon(&self, file: &str, index: i32, size: i32) -> Option<IconPixels> {
        let mut large = HICON::default();
        let mut small = HICON::default();

        // Negative indices address icons by resource id
        let extracted = unsafe {
            SHDefExtractIconW(
                &HSTRING::from(file),
                -index,
                0,
                Some(&mut large),
                Some(&mut small),
                size as u32,
            )
        };
        if !small.is_invalid() {
            let _ = unsafe { DestroyIcon(small) };
        }
        if let Err(e) = extracted {
            tracing::trace!("SHDefExtractIconW({}, {}) failed: {}", file, index, e);
            return None;
        }

        read_icon(large)
    }

    fn dll_icon_count(&self, file: &str) -> u32 {
        let Some(instance) = module_instance() else {
            return 0;
        };
        // An index of -1 asks for the icon count instead of an icon
        let count = unsafe { ExtractIconW(instance, &HSTRING::from(file), u32::MAX) };
        (count.0 as isize).clamp(0, u32::MAX as isize) as u32
    }

    fn extract_icon_at(&self, file: &str, position: u32) -> Option<IconPixels> {
        let instance = module_instance()?;
        let icon = unsafe { ExtractIconW(instance, &HSTRING::from(file), position) };
        // 1 means the file is not an icon container
        if icon.0 as isize == 1 {
            return None;
        }
        read_icon(icon)
    }

    fn set_folder_icon(&self, folder: &str, icon_file: Option<&str>, index: i32) -> bool {
        let mut icon_path: Option<Vec<u16>> =
            icon_file.map(|f| f.encode_utf16().chain(std::iter::once(0)).collect());

        let mut settings = SHFOLDERCUSTOMSETTINGS {
            dwSize: std::mem::size_of::<SHFOLDERCUSTOMSETTINGS>() as u32,
            dwMask: FCSM_ICONFILE,
            pszIconFile: icon_path
                .as_mut()
                .map_or(PWSTR::null(), |p| PWSTR(p.as_mut_ptr())),
            cchIconFile: 0,
            iIconIndex: index,
            ..Default::default()
        };

        match unsafe {
            SHGetSetFolderCustomSettings(&mut settings, &HSTRING::from(folder), FCS_FORCEWRITE)
        } {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!("SHGetSetFolderCustomSettings({}) failed: {}", folder, e);
                false
            }
        }
    }

    fn set_shortcut_icon(&self, link: &str, icon_file: &str, index: i32) -> bool {
        let _com = ComScope::enter();

        let result: windows::core::Result<()> = (|| unsafe {
            let shell_link: IShellLinkW = CoCreateInstance(&ShellLink, None, CLSCTX_INPROC_SERVER)?;
            let persist: IPersistFile = shell_link.cast()?;
            persist.Load(&HSTRING::from(link), STGM_READWRITE)?;
            shell_link.SetIconLocation(&HSTRING::from(icon_file), index)?;
            persist.Save(PCWSTR::null(), BOOL(1))
        })();

        if let Err(e) = &result {
            tracing::debug!("Setting shortcut icon of {} failed: {}", link, e);
        }
        result.is_ok()
    }

    fn load_string(&self, file: &str, id: u32) -> Option<String> {
        let module = ResourceModule::load(file)?;
        let mut buffer = vec![0u16; MAX_STRING_RESOURCE];
        let len = unsafe {
            LoadStringW(
                HINSTANCE(module.0 .0),
                id,
                PWSTR(buffer.as_mut_ptr()),
                buffer.len() as i32,
            )
        };
        if len <= 0 {
            tracing::trace!("No string {} in {}", id, file);
            return None;
        }
        Some(String::from_utf16_lossy(&buffer[..len as usize]))
    }
}
