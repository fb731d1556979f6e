//! ShellMeta Native File System Layer
//!
//! Thin, total wrappers over the Win32 storage APIs:
//! - Handle guards that close exactly once
//! - Raw synchronous and overlapped I/O
//! - File attributes and NTFS compression
//! - Reparse point (symlink / junction) resolution
//! - Alternate data stream enumeration
//! - File reference numbers and open-by-id
//!
//! Public operations never panic and never surface OS errors; failures come
//! back as `None`, `false` or an empty sequence and are logged at debug level.

mod encoding;
mod handle;

pub mod attributes;
pub mod identity;
pub mod metadata;
pub mod overlapped;
pub mod raw_io;
pub mod reparse;
pub mod streams;
pub mod win_path;

pub use attributes::{
    can_compress, clear_attribute, has_attribute, set_attribute, set_compression,
    CompressionFormat, FileAttributes,
};
pub use encoding::decode_text;
pub use handle::{HandleGuard, NativeHandle, OwnedHandle};
#[cfg(windows)]
pub use handle::{FindHandle, SearchHandle};
#[cfg(not(windows))]
pub use handle::FileHandle;
pub use identity::{
    get_file_identity, get_folder_identity, resolve_path_from_identity, FileIdentity,
};
pub use metadata::{
    find_data, modified_time, path_exists, set_modified_time, size_on_disk, FileTime, FindData,
};
pub use overlapped::{begin_overlapped_write, write_overlapped, OverlappedWrite, WriteCompletion};
pub use raw_io::{
    create_for_write, open_for_read, read_all, read_string_from_file, write_all,
    write_string_to_file,
};
pub use reparse::{
    parse_symlink, resolve as resolve_reparse_point, ReparseError, ReparseTag, ReparseTarget,
};
pub use streams::{alternate_streams, AlternateStreamDescriptor, AlternateStreams};

use thiserror::Error;

/// File system errors
#[derive(Error, Debug)]
pub enum FsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(windows)]
    #[error("Win32 error: {0}")]
    Win32(#[from] windows::core::Error),

    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Not supported on this platform: {0}")]
    Unsupported(&'static str),
}

pub type Result<T> = std::result::Result<T, FsError>;

/// The Windows system directory (`C:\Windows\System32`), if known
pub fn system_directory() -> Option<String> {
    #[cfg(windows)]
    {
        use windows::Win32::System::SystemInformation::GetSystemDirectoryW;

        let mut buf = [0u16; 260];
        let len = unsafe { GetSystemDirectoryW(Some(&mut buf)) } as usize;
        if len == 0 || len > buf.len() {
            return None;
        }
        Some(String::from_utf16_lossy(&buf[..len]))
    }

    #[cfg(not(windows))]
    {
        None
    }
}
