//! Synchronous I/O against raw handles
//!
//! All opens use backup semantics so directories can be opened as pseudo-files.
//! Failures come back as an invalid [`OwnedHandle`], `None` or `false`; nothing
//! here panics or propagates an OS error to the caller.

use crate::encoding::decode_text;
use crate::OwnedHandle;

/// Size of the scratch buffer used by [`read_all`]
pub const READ_CHUNK: usize = 4096;

/// `FILE_FLAG_BACKUP_SEMANTICS`
pub const FLAG_BACKUP_SEMANTICS: u32 = 0x0200_0000;

/// `FILE_FLAG_OPEN_REPARSE_POINT`
pub const FLAG_OPEN_REPARSE_POINT: u32 = 0x0020_0000;

/// `FILE_FLAG_OVERLAPPED`
pub const FLAG_OVERLAPPED: u32 = 0x4000_0000;

/// Open an existing file or directory for reading.
///
/// Other readers are always allowed. Other writers are allowed unless
/// `allow_write` asks for write access on this handle too.
pub fn open_for_read(path: &str, allow_write: bool, extra_flags: u32) -> OwnedHandle {
    match sys::open_for_read(path, allow_write, extra_flags) {
        Ok(handle) => handle,
        Err(e) => {
            tracing::debug!("open_for_read({}) failed: {}", path, e);
            OwnedHandle::invalid()
        }
    }
}

/// Create a file for writing. `overwrite` truncates an existing file,
/// otherwise an existing file is opened as-is.
pub fn create_for_write(path: &str, overwrite: bool) -> OwnedHandle {
    create_for_write_with(path, overwrite, 0)
}

pub(crate) fn create_for_write_with(path: &str, overwrite: bool, extra_flags: u32) -> OwnedHandle {
    match sys::create_for_write(path, overwrite, extra_flags) {
        Ok(handle) => handle,
        Err(e) => {
            tracing::debug!("create_for_write({}) failed: {}", path, e);
            OwnedHandle::invalid()
        }
    }
}

/// Read from the current position until a zero-length or failed read
pub fn read_all(handle: &OwnedHandle) -> Option<Vec<u8>> {
    if !handle.is_valid() {
        return None;
    }

    let mut out = Vec::new();
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        // One byte of the scratch buffer is left unused per call
        match sys::read_chunk(handle, &mut chunk[..READ_CHUNK - 1]) {
            Some(0) | None => break,
            Some(n) => out.extend_from_slice(&chunk[..n]),
        }
    }
    Some(out)
}

/// Write every byte, looping over short writes
pub fn write_all(handle: &OwnedHandle, bytes: &[u8]) -> bool {
    if !handle.is_valid() {
        return false;
    }

    let mut written = 0;
    while written < bytes.len() {
        match sys::write_chunk(handle, &bytes[written..]) {
            Some(0) | None => {
                tracing::debug!("write stalled after {} of {} bytes", written, bytes.len());
                return false;
            }
            Some(n) => written += n,
        }
    }
    true
}

/// Read a whole file as text
pub fn read_string_from_file(path: &str) -> Option<String> {
    let handle = open_for_read(path, false, 0);
    let bytes = read_all(&handle)?;
    Some(decode_text(&bytes))
}

/// Replace the file's contents with `text` encoded as UTF-8
pub fn write_string_to_file(path: &str, text: &str, extra_flags: u32) -> bool {
    let handle = create_for_write_with(path, true, extra_flags);
    write_all(&handle, text.as_bytes())
}

#[cfg(windows)]
pub(crate) mod sys {
    use super::FLAG_BACKUP_SEMANTICS;
    use crate::{OwnedHandle, Result};
    use windows::core::HSTRING;
    use windows::Win32::Foundation::HANDLE;
    use windows::Win32::Storage::FileSystem::{
        CreateFileW, ReadFile, WriteFile, CREATE_ALWAYS, FILE_CREATION_DISPOSITION,
        FILE_FLAGS_AND_ATTRIBUTES, FILE_GENERIC_READ, FILE_GENERIC_WRITE, FILE_SHARE_MODE,
        FILE_SHARE_NONE, FILE_SHARE_READ, FILE_SHARE_WRITE, OPEN_ALWAYS, OPEN_EXISTING,
    };

    pub fn open(
        path: &str,
        access: u32,
        share: FILE_SHARE_MODE,
        disposition: FILE_CREATION_DISPOSITION,
        flags: u32,
    ) -> Result<OwnedHandle> {
        let raw = unsafe {
            CreateFileW(
                &HSTRING::from(path),
                access,
                share,
                None,
                disposition,
                FILE_FLAGS_AND_ATTRIBUTES(flags),
                HANDLE::default(),
            )?
        };
        Ok(OwnedHandle::new(raw))
    }

    pub fn open_for_read(path: &str, allow_write: bool, extra_flags: u32) -> Result<OwnedHandle> {
        let access = if allow_write {
            FILE_GENERIC_READ.0 | FILE_GENERIC_WRITE.0
        } else {
            FILE_GENERIC_READ.0
        };
        let share = if allow_write {
            FILE_SHARE_READ
        } else {
            FILE_SHARE_READ | FILE_SHARE_WRITE
        };
        open(path, access, share, OPEN_EXISTING, FLAG_BACKUP_SEMANTICS | extra_flags)
    }

    pub fn create_for_write(path: &str, overwrite: bool, extra_flags: u32) -> Result<OwnedHandle> {
        let disposition = if overwrite { CREATE_ALWAYS } else { OPEN_ALWAYS };
        open(
            path,
            FILE_GENERIC_WRITE.0,
            FILE_SHARE_NONE,
            disposition,
            FLAG_BACKUP_SEMANTICS | extra_flags,
        )
    }

    pub fn read_chunk(handle: &OwnedHandle, buf: &mut [u8]) -> Option<usize> {
        let &h = handle.get()?;
        let mut read = 0u32;
        unsafe { ReadFile(h, Some(buf), Some(&mut read), None) }.ok()?;
        Some(read as usize)
    }

    pub fn write_chunk(handle: &OwnedHandle, buf: &[u8]) -> Option<usize> {
        let &h = handle.get()?;
        let mut written = 0u32;
        unsafe { WriteFile(h, Some(buf), Some(&mut written), None) }.ok()?;
        Some(written as usize)
    }
}

#[cfg(not(windows))]
pub(crate) mod sys {
    use crate::handle::FileHandle;
    use crate::{OwnedHandle, Result};
    use std::fs::OpenOptions;
    use std::io::{Read, Write};

    pub fn open_for_read(path: &str, allow_write: bool, _extra_flags: u32) -> Result<OwnedHandle> {
        let file = OpenOptions::new().read(true).write(allow_write).open(path)?;
        Ok(OwnedHandle::new(FileHandle(Some(file))))
    }

    pub fn create_for_write(path: &str, overwrite: bool, _extra_flags: u32) -> Result<OwnedHandle> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(overwrite)
            .open(path)?;
        Ok(OwnedHandle::new(FileHandle(Some(file))))
    }

    pub fn read_chunk(handle: &OwnedHandle, buf: &mut [u8]) -> Option<usize> {
        let mut file = handle.file()?;
        file.read(buf).ok()
    }

    pub fn write_chunk(handle: &OwnedHandle, buf: &[u8]) -> Option<usize> {
        let mut file = handle.file()?;
        file.write(buf).ok()
    }
}
