//! Alternate data stream enumeration

/// Suffix carried by every data stream name
pub const DATA_SUFFIX: &str = ":$DATA";

/// Name of the unnamed (main) data stream
pub const MAIN_STREAM: &str = "::$DATA";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlternateStreamDescriptor {
    /// Full stream name, e.g. `:Zone.Identifier:$DATA`
    pub name: String,
    pub size_bytes: i64,
}

/// Named data streams only; the main stream and non-data streams are skipped
pub fn is_named_data_stream(name: &str) -> bool {
    name.ends_with(DATA_SUFFIX) && name != MAIN_STREAM
}

fn accept(name: String, size_bytes: i64) -> Option<AlternateStreamDescriptor> {
    is_named_data_stream(&name).then_some(AlternateStreamDescriptor { name, size_bytes })
}

/// Lazily enumerate the alternate data streams of `path`.
///
/// The search starts on the first call to `next`. A path that cannot be
/// searched yields nothing.
pub fn alternate_streams(path: &str) -> AlternateStreams {
    AlternateStreams {
        path: path.to_string(),
        state: sys::SearchState::Unopened,
    }
}

/// Iterator returned by [`alternate_streams`]. Dropping it closes the search.
pub struct AlternateStreams {
    path: String,
    state: sys::SearchState,
}

impl Iterator for AlternateStreams {
    type Item = AlternateStreamDescriptor;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (name, size) = sys::next_raw(&self.path, &mut self.state)?;
            if let Some(descriptor) = accept(name, size) {
                return Some(descriptor);
            }
        }
    }
}

impl std::iter::FusedIterator for AlternateStreams {}

#[cfg(windows)]
mod sys {
    use crate::handle::SearchHandle;
    use crate::FindHandle;
    use windows::core::HSTRING;
    use windows::Win32::Storage::FileSystem::{
        FindFirstStreamW, FindNextStreamW, FindStreamInfoStandard, WIN32_FIND_STREAM_DATA,
    };

    pub enum SearchState {
        Unopened,
        Open(FindHandle),
        Done,
    }

    fn entry(data: &WIN32_FIND_STREAM_DATA) -> (String, i64) {
        let len = data
            .cStreamName
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(data.cStreamName.len());
        (
            String::from_utf16_lossy(&data.cStreamName[..len]),
            data.StreamSize,
        )
    }

    pub fn next_raw(path: &str, state: &mut SearchState) -> Option<(String, i64)> {
        let mut data = WIN32_FIND_STREAM_DATA::default();

        match state {
            SearchState::Unopened => {
                let first = unsafe {
                    FindFirstStreamW(
                        &HSTRING::from(path),
                        FindStreamInfoStandard,
                        &mut data as *mut _ as *mut std::ffi::c_void,
                        0,
                    )
                };
                match first {
                    Ok(raw) => {
                        *state = SearchState::Open(FindHandle::new(SearchHandle(raw)));
                        Some(entry(&data))
                    }
                    Err(e) => {
                        tracing::debug!("FindFirstStreamW({}) failed: {}", path, e);
                        *state = SearchState::Done;
                        None
                    }
                }
            }
            SearchState::Open(handle) => {
                let Some(search) = handle.get() else {
                    *state = SearchState::Done;
                    return None;
                };
                let next = unsafe {
                    FindNextStreamW(search.0, &mut data as *mut _ as *mut std::ffi::c_void)
                };
                match next {
                    Ok(()) => Some(entry(&data)),
                    Err(_) => {
                        // Dropping the guard ends the search
                        *state = SearchState::Done;
                        None
                    }
                }
            }
            SearchState::Done => None,
        }
    }
}

#[cfg(not(windows))]
mod sys {
    /// Streams are an NTFS feature; other hosts have none to report
    pub enum SearchState {
        Unopened,
        Done,
    }

    pub fn next_raw(path: &str, state: &mut SearchState) -> Option<(String, i64)> {
        if let SearchState::Unopened = state {
            tracing::trace!("No alternate streams on this platform for {}", path);
        }
        *state = SearchState::Done;
        None
    }
}
