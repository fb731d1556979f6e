//! File times, allocation size and find records

use crate::attributes::FileAttributes;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// 100ns intervals between 1601-01-01 and 1970-01-01
const EPOCH_DIFFERENCE_TICKS: u64 = 116_444_736_000_000_000;

const TICKS_PER_SECOND: u64 = 10_000_000;

/// Win32 `FILETIME`: 100ns ticks since 1601-01-01 UTC
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileTime(pub u64);

impl FileTime {
    pub fn from_parts(low: u32, high: u32) -> Self {
        FileTime(((high as u64) << 32) | low as u64)
    }

    pub fn low(&self) -> u32 {
        self.0 as u32
    }

    pub fn high(&self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// `None` for instants before 1601
    pub fn from_system_time(time: SystemTime) -> Option<Self> {
        match time.duration_since(UNIX_EPOCH) {
            Ok(after) => {
                let ticks = after.as_secs() * TICKS_PER_SECOND + (after.subsec_nanos() / 100) as u64;
                Some(FileTime(EPOCH_DIFFERENCE_TICKS + ticks))
            }
            Err(e) => {
                let before = e.duration();
                let ticks = before.as_secs() * TICKS_PER_SECOND + (before.subsec_nanos() / 100) as u64;
                EPOCH_DIFFERENCE_TICKS.checked_sub(ticks).map(FileTime)
            }
        }
    }

    pub fn to_system_time(&self) -> SystemTime {
        let to_duration = |ticks: u64| {
            Duration::new(ticks / TICKS_PER_SECOND, ((ticks % TICKS_PER_SECOND) * 100) as u32)
        };
        if self.0 >= EPOCH_DIFFERENCE_TICKS {
            UNIX_EPOCH + to_duration(self.0 - EPOCH_DIFFERENCE_TICKS)
        } else {
            UNIX_EPOCH - to_duration(EPOCH_DIFFERENCE_TICKS - self.0)
        }
    }
}

/// Directory entry record for one path, as a find call reports it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindData {
    pub attributes: FileAttributes,
    /// `FileTime(0)` when the platform does not record it
    pub creation_time: FileTime,
    pub last_access_time: FileTime,
    pub last_write_time: FileTime,
    pub size: u64,
    /// Final component of the entry name
    pub file_name: String,
}

impl FindData {
    pub fn is_directory(&self) -> bool {
        self.attributes.contains(FileAttributes::DIRECTORY)
    }
}

/// Bytes allocated on disk for `path`
pub fn size_on_disk(path: &str) -> Option<i64> {
    sys::size_on_disk(path)
        .map_err(|e| tracing::debug!("size_on_disk({}): {}", path, e))
        .ok()
}

/// Last write time of `path`
pub fn modified_time(path: &str) -> Option<FileTime> {
    sys::modified_time(path)
        .map_err(|e| tracing::debug!("modified_time({}): {}", path, e))
        .ok()
}

/// Set the last write time of `path`, leaving creation and access times alone
pub fn set_modified_time(path: &str, time: FileTime) -> bool {
    sys::set_modified_time(path, time)
        .map_err(|e| tracing::debug!("set_modified_time({}): {}", path, e))
        .is_ok()
}

/// Find record of `path` without opening the file itself
pub fn find_data(path: &str) -> Option<FindData> {
    sys::find_data(path)
        .map_err(|e| tracing::trace!("find_data({}): {}", path, e))
        .ok()
}

/// Does a directory entry named `path` exist
pub fn path_exists(path: &str) -> bool {
    find_data(path).is_some()
}

#[cfg(windows)]
mod sys {
    use super::{FileAttributes, FileTime, FindData};
    use crate::handle::SearchHandle;
    use crate::raw_io::{self, FLAG_BACKUP_SEMANTICS};
    use crate::{FindHandle, FsError, Result};
    use windows::core::HSTRING;
    use windows::Win32::Foundation::FILETIME;
    use windows::Win32::Storage::FileSystem::{
        FileStandardInfo, FindExInfoBasic, FindExSearchNameMatch, FindFirstFileExW,
        GetFileInformationByHandleEx, GetFileTime, SetFileTime, FILE_SHARE_NONE,
        FILE_STANDARD_INFO, FILE_WRITE_ATTRIBUTES, FIND_FIRST_EX_LARGE_FETCH, OPEN_EXISTING,
        WIN32_FIND_DATAW,
    };

    pub fn size_on_disk(path: &str) -> Result<i64> {
        let handle = raw_io::sys::open_for_read(path, false, 0)?;
        let &h = handle.get().ok_or_else(|| FsError::NotFound(path.to_string()))?;

        let mut info = FILE_STANDARD_INFO::default();
        unsafe {
            GetFileInformationByHandleEx(
                h,
                FileStandardInfo,
                &mut info as *mut _ as *mut std::ffi::c_void,
                std::mem::size_of::<FILE_STANDARD_INFO>() as u32,
            )?;
        }
        Ok(info.AllocationSize)
    }

    pub fn modified_time(path: &str) -> Result<FileTime> {
        let handle = raw_io::sys::open_for_read(path, false, 0)?;
        let &h = handle.get().ok_or_else(|| FsError::NotFound(path.to_string()))?;

        let mut written = FILETIME::default();
        unsafe { GetFileTime(h, None, None, Some(&mut written))? };
        Ok(FileTime::from_parts(written.dwLowDateTime, written.dwHighDateTime))
    }

    pub fn set_modified_time(path: &str, time: FileTime) -> Result<()> {
        let handle = raw_io::sys::open(
            path,
            FILE_WRITE_ATTRIBUTES.0,
            FILE_SHARE_NONE,
            OPEN_EXISTING,
            FLAG_BACKUP_SEMANTICS,
        )?;
        let &h = handle.get().ok_or_else(|| FsError::NotFound(path.to_string()))?;

        let written = FILETIME {
            dwLowDateTime: time.low(),
            dwHighDateTime: time.high(),
        };
        unsafe { SetFileTime(h, None, None, Some(&written))? };
        Ok(())
    }

    pub fn find_data(path: &str) -> Result<FindData> {
        let mut data = WIN32_FIND_DATAW::default();
        let raw = unsafe {
            FindFirstFileExW(
                &HSTRING::from(path),
                FindExInfoBasic,
                &mut data as *mut _ as *mut std::ffi::c_void,
                FindExSearchNameMatch,
                None,
                FIND_FIRST_EX_LARGE_FETCH,
            )?
        };
        let search = FindHandle::new(SearchHandle(raw));
        if !search.is_valid() {
            return Err(FsError::NotFound(path.to_string()));
        }

        let time = |t: FILETIME| FileTime::from_parts(t.dwLowDateTime, t.dwHighDateTime);
        let name_len = data
            .cFileName
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(data.cFileName.len());

        Ok(FindData {
            attributes: FileAttributes::from_bits_retain(data.dwFileAttributes),
            creation_time: time(data.ftCreationTime),
            last_access_time: time(data.ftLastAccessTime),
            last_write_time: time(data.ftLastWriteTime),
            size: ((data.nFileSizeHigh as u64) << 32) | data.nFileSizeLow as u64,
            file_name: String::from_utf16_lossy(&data.cFileName[..name_len]),
        })
    }
}

#[cfg(not(windows))]
mod sys {
    use super::{FileTime, FindData};
    use crate::{FsError, Result};
    use std::os::unix::fs::MetadataExt;
    use std::path::Path;
    use std::time::SystemTime;

    pub fn size_on_disk(path: &str) -> Result<i64> {
        // st_blocks counts 512-byte units regardless of the filesystem block size
        Ok(std::fs::metadata(path)?.blocks() as i64 * 512)
    }

    pub fn modified_time(path: &str) -> Result<FileTime> {
        let modified = std::fs::metadata(path)?.modified()?;
        FileTime::from_system_time(modified)
            .ok_or_else(|| FsError::InvalidPath(path.to_string()))
    }

    pub fn set_modified_time(path: &str, time: FileTime) -> Result<()> {
        let file = std::fs::OpenOptions::new().write(true).open(path)?;
        file.set_modified(time.to_system_time())?;
        Ok(())
    }

    pub fn find_data(path: &str) -> Result<FindData> {
        let metadata = std::fs::symlink_metadata(path)?;
        let time = |t: std::io::Result<SystemTime>| {
            t.ok()
                .and_then(FileTime::from_system_time)
                .unwrap_or(FileTime(0))
        };
        let file_name = Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(FindData {
            attributes: crate::attributes::read_attributes(path)?,
            creation_time: time(metadata.created()),
            last_access_time: time(metadata.accessed()),
            last_write_time: time(metadata.modified()),
            size: metadata.len(),
            file_name,
        })
    }
}
