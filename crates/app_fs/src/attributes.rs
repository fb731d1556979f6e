//! File attributes and NTFS compression control

use crate::{win_path, FsError, Result};
use bitflags::bitflags;

bitflags! {
    /// Win32 file attribute bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FileAttributes: u32 {
        const READONLY = 0x0000_0001;
        const HIDDEN = 0x0000_0002;
        const SYSTEM = 0x0000_0004;
        const DIRECTORY = 0x0000_0010;
        const ARCHIVE = 0x0000_0020;
        const NORMAL = 0x0000_0080;
        const TEMPORARY = 0x0000_0100;
        const SPARSE_FILE = 0x0000_0200;
        const REPARSE_POINT = 0x0000_0400;
        const COMPRESSED = 0x0000_0800;
        const OFFLINE = 0x0000_1000;
        const NOT_CONTENT_INDEXED = 0x0000_2000;
        const ENCRYPTED = 0x0000_4000;
        const PINNED = 0x0008_0000;
        const UNPINNED = 0x0010_0000;

        // Bits this crate does not name still round-trip untouched
        const _ = !0;
    }
}

/// Filesystem flag advertising per-file compression support
pub const FILE_FILE_COMPRESSION: u32 = 0x0000_0010;

/// Format code carried by `FSCTL_SET_COMPRESSION`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum CompressionFormat {
    None = 0,
    Default = 1,
}

impl CompressionFormat {
    pub fn for_state(enabled: bool) -> Self {
        if enabled {
            CompressionFormat::Default
        } else {
            CompressionFormat::None
        }
    }
}

/// Attribute word after setting `mask`
pub fn with_set(current: FileAttributes, mask: FileAttributes) -> FileAttributes {
    current | mask
}

/// Attribute word after clearing `mask`
pub fn with_cleared(current: FileAttributes, mask: FileAttributes) -> FileAttributes {
    current & !mask
}

/// True when every bit of `mask` is set on `path`
pub fn has_attribute(path: &str, mask: FileAttributes) -> bool {
    match read_attributes(path) {
        Ok(current) => current.contains(mask),
        Err(e) => {
            tracing::debug!("Cannot read attributes of {}: {}", path, e);
            false
        }
    }
}

/// Add `mask` to the attributes of `path`, leaving other bits alone
pub fn set_attribute(path: &str, mask: FileAttributes) -> bool {
    update_attributes(path, |current| with_set(current, mask))
}

/// Remove `mask` from the attributes of `path`, leaving other bits alone
pub fn clear_attribute(path: &str, mask: FileAttributes) -> bool {
    update_attributes(path, |current| with_cleared(current, mask))
}

fn update_attributes(path: &str, f: impl FnOnce(FileAttributes) -> FileAttributes) -> bool {
    let current = match read_attributes(path) {
        Ok(current) => current,
        Err(e) => {
            tracing::debug!("Cannot read attributes of {}: {}", path, e);
            return false;
        }
    };

    match write_attributes(path, f(current)) {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!("Cannot write attributes of {}: {}", path, e);
            false
        }
    }
}

/// Does the volume holding `path` support NTFS compression
pub fn can_compress(path: &str) -> bool {
    let Some(root) = win_path::path_root(path) else {
        return false;
    };

    match volume_flags(&root) {
        Ok(flags) => flags & FILE_FILE_COMPRESSION != 0,
        Err(e) => {
            tracing::debug!("Volume query failed for {}: {}", root, e);
            false
        }
    }
}

/// Turn NTFS compression on or off for a file or directory
pub fn set_compression(path: &str, enabled: bool) -> bool {
    let format = CompressionFormat::for_state(enabled);
    match send_compression_request(path, format) {
        Ok(ok) => ok,
        Err(e) => {
            tracing::debug!("Cannot open {} for compression change: {}", path, e);
            false
        }
    }
}

#[cfg(windows)]
pub(crate) fn read_attributes(path: &str) -> Result<FileAttributes> {
    use windows::core::HSTRING;
    use windows::Win32::Storage::FileSystem::{
        GetFileAttributesExW, GetFileExInfoStandard, WIN32_FILE_ATTRIBUTE_DATA,
    };

    let mut data = WIN32_FILE_ATTRIBUTE_DATA::default();
    unsafe {
        GetFileAttributesExW(
            &HSTRING::from(path),
            GetFileExInfoStandard,
            &mut data as *mut _ as *mut std::ffi::c_void,
        )?;
    }
    Ok(FileAttributes::from_bits_retain(data.dwFileAttributes))
}

#[cfg(windows)]
fn write_attributes(path: &str, attributes: FileAttributes) -> Result<()> {
    use windows::core::HSTRING;
    use windows::Win32::Storage::FileSystem::{SetFileAttributesW, FILE_FLAGS_AND_ATTRIBUTES};

    unsafe {
        SetFileAttributesW(
            &HSTRING::from(path),
            FILE_FLAGS_AND_ATTRIBUTES(attributes.bits()),
        )?;
    }
    Ok(())
}

#[cfg(windows)]
fn volume_flags(root: &str) -> Result<u32> {
    use windows::core::HSTRING;
    use windows::Win32::Storage::FileSystem::GetVolumeInformationW;

    let mut flags = 0u32;
    unsafe {
        GetVolumeInformationW(
            &HSTRING::from(root),
            None,
            None,
            None,
            Some(&mut flags),
            None,
        )?;
    }
    Ok(flags)
}

#[cfg(windows)]
fn send_compression_request(path: &str, format: CompressionFormat) -> Result<bool> {
    use crate::raw_io::{self, FLAG_BACKUP_SEMANTICS};
    use windows::Win32::Storage::FileSystem::{
        FILE_GENERIC_READ, FILE_GENERIC_WRITE, FILE_SHARE_READ, FILE_SHARE_WRITE,
        FILE_WRITE_ATTRIBUTES, OPEN_EXISTING,
    };
    use windows::Win32::System::Ioctl::FSCTL_SET_COMPRESSION;
    use windows::Win32::System::IO::DeviceIoControl;

    const FILE_ATTRIBUTE_NORMAL: u32 = 0x80;

    let handle = raw_io::sys::open(
        path,
        FILE_GENERIC_READ.0 | FILE_GENERIC_WRITE.0 | FILE_WRITE_ATTRIBUTES.0,
        FILE_SHARE_READ | FILE_SHARE_WRITE,
        OPEN_EXISTING,
        FILE_ATTRIBUTE_NORMAL | FLAG_BACKUP_SEMANTICS,
    )?;
    let Some(&h) = handle.get() else {
        return Err(FsError::NotFound(path.to_string()));
    };

    let code = format as u16;
    let mut returned = 0u32;
    let result = unsafe {
        DeviceIoControl(
            h,
            FSCTL_SET_COMPRESSION,
            Some(&code as *const u16 as *const std::ffi::c_void),
            std::mem::size_of::<u16>() as u32,
            None,
            0,
            Some(&mut returned),
            None,
        )
    };

    if let Err(e) = &result {
        tracing::debug!("FSCTL_SET_COMPRESSION failed for {}: {}", path, e);
    }
    Ok(result.is_ok())
}

#[cfg(not(windows))]
pub(crate) fn read_attributes(path: &str) -> Result<FileAttributes> {
    // Only the bits with a POSIX analogue are reported
    let metadata = std::fs::symlink_metadata(path)?;
    let mut attributes = FileAttributes::empty();
    if metadata.permissions().readonly() {
        attributes |= FileAttributes::READONLY;
    }
    if metadata.is_dir() {
        attributes |= FileAttributes::DIRECTORY;
    }
    if metadata.file_type().is_symlink() {
        attributes |= FileAttributes::REPARSE_POINT;
    }
    if attributes.is_empty() {
        attributes = FileAttributes::NORMAL;
    }
    Ok(attributes)
}

#[cfg(not(windows))]
fn write_attributes(path: &str, attributes: FileAttributes) -> Result<()> {
    // READONLY is the only bit that can be written through permissions
    let current = read_attributes(path)?;
    let changed = (current ^ attributes) - FileAttributes::READONLY - FileAttributes::NORMAL;
    if !changed.is_empty() {
        return Err(FsError::Unsupported("attribute bits other than READONLY"));
    }

    let metadata = std::fs::metadata(path)?;
    let mut permissions = metadata.permissions();
    #[allow(clippy::permissions_set_readonly_false)]
    permissions.set_readonly(attributes.contains(FileAttributes::READONLY));
    std::fs::set_permissions(path, permissions)?;
    Ok(())
}

#[cfg(not(windows))]
fn volume_flags(_root: &str) -> Result<u32> {
    Err(FsError::Unsupported("volume information"))
}

#[cfg(not(windows))]
fn send_compression_request(_path: &str, _format: CompressionFormat) -> Result<bool> {
    Err(FsError::Unsupported("FSCTL_SET_COMPRESSION"))
}
