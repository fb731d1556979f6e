//! Volume-scoped file identity (file reference numbers)

/// Identifier of a file within its volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileIdentity {
    /// 64-bit file reference number
    Frn64(u64),
    /// 128-bit id from `FILE_ID_INFO`
    Id128(u128),
}

impl FileIdentity {
    /// 64-bit value accepted by open-by-id. On NTFS the low half of the
    /// 128-bit id is the reference number.
    pub fn as_frn(&self) -> u64 {
        match *self {
            FileIdentity::Frn64(frn) => frn,
            FileIdentity::Id128(id) => id as u64,
        }
    }
}

impl std::fmt::Display for FileIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileIdentity::Frn64(frn) => write!(f, "{:#018x}", frn),
            FileIdentity::Id128(id) => write!(f, "{:#034x}", id),
        }
    }
}

/// Identity of a file, from its 128-bit id record
pub fn get_file_identity(path: &str) -> Option<FileIdentity> {
    sys::file_identity(path)
        .map_err(|e| tracing::debug!("get_file_identity({}): {}", path, e))
        .ok()
}

/// Identity of a directory, from its directory-info record
pub fn get_folder_identity(path: &str) -> Option<FileIdentity> {
    sys::folder_identity(path)
        .map_err(|e| tracing::debug!("get_folder_identity({}): {}", path, e))
        .ok()
}

/// Current path of the file with reference number `frn` on the volume that
/// holds `volume_hint`
pub fn resolve_path_from_identity(frn: u64, volume_hint: &str) -> Option<String> {
    sys::path_from_identity(frn, volume_hint)
        .map_err(|e| tracing::debug!("resolve_path_from_identity({:#x}): {}", frn, e))
        .ok()
        .flatten()
}

#[cfg(windows)]
mod sys {
    use super::FileIdentity;
    use crate::raw_io::{self, FLAG_BACKUP_SEMANTICS};
    use crate::{win_path, FsError, OwnedHandle, Result};
    use windows::Win32::Storage::FileSystem::{
        FileIdBothDirectoryInfo, FileIdInfo, FileIdType, GetFileInformationByHandleEx,
        GetFinalPathNameByHandleW, OpenFileById, FILE_FLAGS_AND_ATTRIBUTES,
        FILE_GENERIC_READ, FILE_ID_BOTH_DIR_INFO, FILE_ID_DESCRIPTOR, FILE_ID_DESCRIPTOR_0,
        FILE_ID_INFO, FILE_NAME_NORMALIZED, FILE_SHARE_READ,
    };

    /// Scratch size for the directory-info query
    const DIR_INFO_BUFFER: usize = 4096;

    /// Longest path `GetFinalPathNameByHandleW` is asked for
    const FINAL_PATH_CAPACITY: usize = 4096;

    fn open(path: &str) -> Result<OwnedHandle> {
        raw_io::sys::open_for_read(path, false, 0)
    }

    pub fn file_identity(path: &str) -> Result<FileIdentity> {
        let handle = open(path)?;
        let &h = handle.get().ok_or_else(|| FsError::NotFound(path.to_string()))?;

        let mut info = FILE_ID_INFO::default();
        unsafe {
            GetFileInformationByHandleEx(
                h,
                FileIdInfo,
                &mut info as *mut _ as *mut std::ffi::c_void,
                std::mem::size_of::<FILE_ID_INFO>() as u32,
            )?;
        }
        Ok(FileIdentity::Id128(u128::from_le_bytes(info.FileId.Identifier)))
    }

    pub fn folder_identity(path: &str) -> Result<FileIdentity> {
        let handle = open(path)?;
        let &h = handle.get().ok_or_else(|| FsError::NotFound(path.to_string()))?;

        // u64 storage keeps the record suitably aligned
        let mut buffer = vec![0u64; DIR_INFO_BUFFER / 8];
        unsafe {
            GetFileInformationByHandleEx(
                h,
                FileIdBothDirectoryInfo,
                buffer.as_mut_ptr() as *mut std::ffi::c_void,
                DIR_INFO_BUFFER as u32,
            )?;
        }
        // SAFETY: the call succeeded, so the buffer starts with one record
        let info = unsafe { &*(buffer.as_ptr() as *const FILE_ID_BOTH_DIR_INFO) };
        Ok(FileIdentity::Frn64(info.FileId as u64))
    }

    pub fn path_from_identity(frn: u64, volume_hint: &str) -> Result<Option<String>> {
        let root = win_path::path_root(volume_hint)
            .ok_or_else(|| FsError::InvalidPath(volume_hint.to_string()))?;

        let volume = open(&root)?;
        let &vh = volume.get().ok_or_else(|| FsError::NotFound(root.clone()))?;

        let descriptor = FILE_ID_DESCRIPTOR {
            dwSize: std::mem::size_of::<FILE_ID_DESCRIPTOR>() as u32,
            Type: FileIdType,
            Anonymous: FILE_ID_DESCRIPTOR_0 { FileId: frn as i64 },
        };
        let raw = unsafe {
            OpenFileById(
                vh,
                &descriptor,
                FILE_GENERIC_READ.0,
                FILE_SHARE_READ,
                None,
                FILE_FLAGS_AND_ATTRIBUTES(FLAG_BACKUP_SEMANTICS),
            )?
        };
        let file = OwnedHandle::new(raw);
        let Some(&fh) = file.get() else {
            return Ok(None);
        };

        let mut buf = vec![0u16; FINAL_PATH_CAPACITY];
        let len = unsafe {
            GetFinalPathNameByHandleW(fh, &mut buf[..FINAL_PATH_CAPACITY - 1], FILE_NAME_NORMALIZED)
        };
        if len == 0 || len as usize >= FINAL_PATH_CAPACITY {
            return Ok(None);
        }
        Ok(Some(String::from_utf16_lossy(&buf[..len as usize])))
    }
}

#[cfg(not(windows))]
mod sys {
    use super::FileIdentity;
    use crate::Result;
    use std::os::unix::fs::MetadataExt;

    pub fn file_identity(path: &str) -> Result<FileIdentity> {
        Ok(FileIdentity::Frn64(std::fs::metadata(path)?.ino()))
    }

    pub fn folder_identity(path: &str) -> Result<FileIdentity> {
        file_identity(path)
    }

    /// Inode numbers cannot be opened directly on this platform
    pub fn path_from_identity(_frn: u64, _volume_hint: &str) -> Result<Option<String>> {
        Ok(None)
    }
}
