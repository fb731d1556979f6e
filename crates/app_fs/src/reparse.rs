//! Reparse point (symlink / junction) resolution

use crate::win_path;
use crate::FsError;
use thiserror::Error;

/// `IO_REPARSE_TAG_SYMLINK`
pub const IO_REPARSE_TAG_SYMLINK: u32 = 0xA000_000C;

/// `IO_REPARSE_TAG_MOUNT_POINT` (junctions and volume mount points)
pub const IO_REPARSE_TAG_MOUNT_POINT: u32 = 0xA000_0003;

/// `MAXIMUM_REPARSE_DATA_BUFFER_SIZE`
pub const MAX_REPARSE_BUFFER: usize = 16 * 1024;

/// `SYMLINK_FLAG_RELATIVE`
pub const SYMLINK_FLAG_RELATIVE: u32 = 0x1;

/// Header: tag, data length, reserved, then four u16 name fields
const NAME_FIELDS_END: usize = 16;

#[derive(Error, Debug)]
pub enum ReparseError {
    #[error("Not a reparse point")]
    NotAReparsePoint,

    #[error("Malformed reparse buffer: {0}")]
    Malformed(&'static str),

    #[error("Unsupported reparse tag: {0:#010x}")]
    UnsupportedTag(u32),

    #[error(transparent)]
    Io(#[from] FsError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReparseTag {
    Symlink,
    MountPoint,
    Other(u32),
}

impl From<u32> for ReparseTag {
    fn from(raw: u32) -> Self {
        match raw {
            IO_REPARSE_TAG_SYMLINK => ReparseTag::Symlink,
            IO_REPARSE_TAG_MOUNT_POINT => ReparseTag::MountPoint,
            other => ReparseTag::Other(other),
        }
    }
}

/// Decoded contents of a reparse buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReparseTarget {
    pub substitute_name: String,
    pub print_name: String,
    pub tag: ReparseTag,
    pub is_relative: bool,
}

impl ReparseTarget {
    /// The name to present: print name, or the substitute name without its
    /// NT object prefix when the print name is empty
    pub fn display_name(&self) -> &str {
        if !self.print_name.is_empty() {
            return &self.print_name;
        }
        self.substitute_name
            .strip_prefix(win_path::NT_OBJECT_PREFIX)
            .unwrap_or(&self.substitute_name)
    }

    /// Final target path as seen from the link at `link_path`
    pub fn resolve_from(&self, link_path: &str) -> String {
        let name = self.display_name();
        if self.tag == ReparseTag::Symlink && !win_path::is_drive_rooted(name) {
            return win_path::resolve_relative_to_link(link_path, name);
        }
        name.to_string()
    }
}

fn read_u16(buf: &[u8], at: usize) -> Result<u16, ReparseError> {
    buf.get(at..at + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or(ReparseError::Malformed("truncated header"))
}

fn read_u32(buf: &[u8], at: usize) -> Result<u32, ReparseError> {
    buf.get(at..at + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(ReparseError::Malformed("truncated header"))
}

fn read_name(path_buffer: &[u8], offset: u16, length: u16) -> Result<String, ReparseError> {
    let start = offset as usize;
    let end = start + length as usize;
    if length % 2 != 0 {
        return Err(ReparseError::Malformed("odd name length"));
    }
    let bytes = path_buffer
        .get(start..end)
        .ok_or(ReparseError::Malformed("name runs past buffer"))?;

    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    Ok(String::from_utf16_lossy(&units))
}

/// Decode a raw `REPARSE_DATA_BUFFER`.
///
/// Symlink buffers carry a flags word ahead of the path buffer; mount point
/// buffers do not. Offsets that run past the end are rejected.
pub fn decode_reparse_buffer(buf: &[u8]) -> Result<ReparseTarget, ReparseError> {
    let raw_tag = read_u32(buf, 0)?;
    let tag = ReparseTag::from(raw_tag);

    let substitute_offset = read_u16(buf, 8)?;
    let substitute_length = read_u16(buf, 10)?;
    let print_offset = read_u16(buf, 12)?;
    let print_length = read_u16(buf, 14)?;

    let (path_start, is_relative) = match tag {
        ReparseTag::Symlink => {
            let flags = read_u32(buf, NAME_FIELDS_END)?;
            (NAME_FIELDS_END + 4, flags & SYMLINK_FLAG_RELATIVE != 0)
        }
        // No flags word here, so mount point names skip the two extra code units
        ReparseTag::MountPoint => (NAME_FIELDS_END, false),
        ReparseTag::Other(raw) => return Err(ReparseError::UnsupportedTag(raw)),
    };

    let path_buffer = buf
        .get(path_start..)
        .ok_or(ReparseError::Malformed("missing path buffer"))?;

    Ok(ReparseTarget {
        substitute_name: read_name(path_buffer, substitute_offset, substitute_length)?,
        print_name: read_name(path_buffer, print_offset, print_length)?,
        tag,
        is_relative,
    })
}

/// Resolve the reparse point at `path` to a target path.
///
/// A reparse point whose names are both empty resolves to `Ok("")`.
pub fn resolve(path: &str) -> Result<String, ReparseError> {
    sys::resolve(path)
}

/// [`resolve`], with every failure collapsed to `None`
pub fn parse_symlink(path: &str) -> Option<String> {
    match resolve(path) {
        Ok(target) => Some(target),
        Err(e) => {
            tracing::debug!("parse_symlink({}): {}", path, e);
            None
        }
    }
}

#[cfg(windows)]
mod sys {
    use super::{decode_reparse_buffer, ReparseError, MAX_REPARSE_BUFFER};
    use crate::raw_io::{self, FLAG_OPEN_REPARSE_POINT};
    use windows::Win32::System::Ioctl::FSCTL_GET_REPARSE_POINT;
    use windows::Win32::System::IO::DeviceIoControl;

    pub fn resolve(path: &str) -> Result<String, ReparseError> {
        let handle = raw_io::sys::open_for_read(path, false, FLAG_OPEN_REPARSE_POINT)?;
        let Some(&h) = handle.get() else {
            return Err(ReparseError::NotAReparsePoint);
        };

        let mut buffer = vec![0u8; MAX_REPARSE_BUFFER];
        let mut returned = 0u32;
        let result = unsafe {
            DeviceIoControl(
                h,
                FSCTL_GET_REPARSE_POINT,
                None,
                0,
                Some(buffer.as_mut_ptr() as *mut std::ffi::c_void),
                buffer.len() as u32,
                Some(&mut returned),
                None,
            )
        };
        if let Err(e) = result {
            tracing::trace!("FSCTL_GET_REPARSE_POINT on {}: {}", path, e);
            return Err(ReparseError::NotAReparsePoint);
        }

        buffer.truncate(returned as usize);
        let target = decode_reparse_buffer(&buffer)?;
        Ok(target.resolve_from(path))
    }
}

#[cfg(not(windows))]
mod sys {
    use super::ReparseError;
    use crate::FsError;
    use std::path::{Component, Path, PathBuf};

    /// Collapse `.` and `..` lexically; `..` never climbs above the root
    fn collapse(path: &Path) -> PathBuf {
        let mut out = PathBuf::new();
        for component in path.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    let at_parent = matches!(out.components().next_back(), Some(Component::ParentDir));
                    if at_parent || (!out.pop() && !path.has_root()) {
                        out.push("..");
                    }
                }
                other => out.push(other.as_os_str()),
            }
        }
        out
    }

    pub fn resolve(path: &str) -> Result<String, ReparseError> {
        let metadata = std::fs::symlink_metadata(path).map_err(FsError::from)?;
        if !metadata.file_type().is_symlink() {
            return Err(ReparseError::NotAReparsePoint);
        }

        let target = std::fs::read_link(path).map_err(FsError::from)?;
        if target.is_absolute() {
            return Ok(target.to_string_lossy().into_owned());
        }
        let base = Path::new(path).parent().unwrap_or_else(|| Path::new(""));
        Ok(collapse(&base.join(target)).to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf16(s: &str) -> Vec<u8> {
        s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
    }

    /// Build a symlink or mount point buffer with substitute name first
    fn build(tag: u32, substitute: &str, print: &str, flags: Option<u32>) -> Vec<u8> {
        let sub = utf16(substitute);
        let prn = utf16(print);

        let mut path_buffer = Vec::new();
        if let Some(flags) = flags {
            path_buffer.extend_from_slice(&flags.to_le_bytes());
        }
        path_buffer.extend_from_slice(&sub);
        path_buffer.extend_from_slice(&prn);

        let mut buf = Vec::new();
        buf.extend_from_slice(&tag.to_le_bytes());
        buf.extend_from_slice(&((8 + path_buffer.len()) as u16).to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&(sub.len() as u16).to_le_bytes());
        buf.extend_from_slice(&(sub.len() as u16).to_le_bytes());
        buf.extend_from_slice(&(prn.len() as u16).to_le_bytes());
        buf.extend_from_slice(&path_buffer);
        buf
    }

    #[test]
    fn test_relative_symlink_resolves_against_link() {
        let buf = build(IO_REPARSE_TAG_SYMLINK, r"..\target", "", Some(SYMLINK_FLAG_RELATIVE));
        let target = decode_reparse_buffer(&buf).unwrap();

        assert_eq!(target.tag, ReparseTag::Symlink);
        assert!(target.is_relative);
        assert_eq!(target.resolve_from(r"C:\a\b\link"), r"C:\a\target");
    }

    #[test]
    fn test_absolute_print_name_passes_through() {
        let buf = build(IO_REPARSE_TAG_SYMLINK, r"\??\D:\real\path", r"D:\real\path", Some(0));
        let target = decode_reparse_buffer(&buf).unwrap();

        assert!(!target.is_relative);
        assert_eq!(target.resolve_from(r"C:\a\b\link"), r"D:\real\path");
    }

    #[test]
    fn test_mount_point_strips_nt_prefix() {
        let buf = build(IO_REPARSE_TAG_MOUNT_POINT, r"\??\E:\data", "", None);
        let target = decode_reparse_buffer(&buf).unwrap();

        assert_eq!(target.tag, ReparseTag::MountPoint);
        assert_eq!(target.resolve_from(r"C:\junction"), r"E:\data");
    }

    #[test]
    fn test_empty_names_resolve_to_empty_target() {
        let buf = build(IO_REPARSE_TAG_MOUNT_POINT, "", "", None);
        let target = decode_reparse_buffer(&buf).unwrap();
        assert_eq!(target.resolve_from(r"C:\junction"), "");
    }

    #[test]
    fn test_offsets_past_end_are_malformed() {
        let mut buf = build(IO_REPARSE_TAG_SYMLINK, r"C:\x", "", Some(0));
        // Inflate the substitute length beyond the buffer
        buf[10..12].copy_from_slice(&0x0400u16.to_le_bytes());

        assert!(matches!(
            decode_reparse_buffer(&buf),
            Err(ReparseError::Malformed(_))
        ));
        assert!(matches!(
            decode_reparse_buffer(&buf[..6]),
            Err(ReparseError::Malformed(_))
        ));
    }

    #[test]
    fn test_other_tags_are_not_guessed() {
        let buf = build(0x8000_0017, r"C:\x", "", None);
        assert!(matches!(
            decode_reparse_buffer(&buf),
            Err(ReparseError::UnsupportedTag(0x8000_0017))
        ));
    }

    #[test]
    fn test_plain_file_is_not_a_reparse_point() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain.txt");
        std::fs::write(&file, b"x").unwrap();

        assert!(matches!(
            resolve(file.to_str().unwrap()),
            Err(ReparseError::NotAReparsePoint)
        ));
        assert!(parse_symlink(file.to_str().unwrap()).is_none());
    }

    #[test]
    fn test_missing_path_degrades() {
        assert!(parse_symlink("definitely_missing_dir/link").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_relative_symlink_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("real.txt"), b"x").unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink("real.txt", &link).unwrap();

        let resolved = parse_symlink(link.to_str().unwrap()).unwrap();
        assert_eq!(resolved, dir.path().join("real.txt").to_str().unwrap());

        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let nested = dir.path().join("sub").join("link");
        std::os::unix::fs::symlink("../real.txt", &nested).unwrap();
        let resolved = parse_symlink(nested.to_str().unwrap()).unwrap();
        assert_eq!(resolved, dir.path().join("real.txt").to_str().unwrap());

        let dotted = dir.path().join("sub").join("dotted");
        std::os::unix::fs::symlink("./.././sub/../real.txt", &dotted).unwrap();
        let resolved = parse_symlink(dotted.to_str().unwrap()).unwrap();
        assert_eq!(resolved, dir.path().join("real.txt").to_str().unwrap());
    }
}
