//! Native handle ownership
//!
//! Every handle opened by this crate lives inside a [`HandleGuard`]. The guard
//! closes the handle exactly once, whichever way the owning scope is left, and
//! never closes a handle whose open call failed.

/// A raw OS handle type that the guard knows how to validate and release
pub trait NativeHandle {
    /// True when the value is the sentinel returned by a failed open
    fn is_invalid(&self) -> bool;

    /// Release the underlying OS object
    fn close(&mut self);
}

/// RAII owner of one native handle
pub struct HandleGuard<H: NativeHandle> {
    raw: H,
    live: bool,
}

impl<H: NativeHandle> HandleGuard<H> {
    /// Take ownership of a freshly opened handle
    pub fn new(raw: H) -> Self {
        let live = !raw.is_invalid();
        Self { raw, live }
    }

    /// Whether the open succeeded and the handle has not been closed yet
    pub fn is_valid(&self) -> bool {
        self.live
    }

    /// Borrow the raw handle, if it is still usable
    pub fn get(&self) -> Option<&H> {
        self.live.then_some(&self.raw)
    }

    /// Close now instead of at scope exit. Returns false if already closed.
    pub fn close(&mut self) -> bool {
        if !self.live {
            return false;
        }
        self.live = false;
        self.raw.close();
        true
    }

    /// Give up ownership without closing
    pub fn into_raw(mut self) -> Option<H> {
        let live = std::mem::replace(&mut self.live, false);
        // SAFETY: `self` is forgotten right after, so `raw` is moved out exactly once
        let raw = unsafe { std::ptr::read(&self.raw) };
        std::mem::forget(self);
        live.then_some(raw)
    }
}

impl<H: NativeHandle> Drop for HandleGuard<H> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<H: NativeHandle + std::fmt::Debug> std::fmt::Debug for HandleGuard<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleGuard")
            .field("raw", &self.raw)
            .field("live", &self.live)
            .finish()
    }
}

#[cfg(windows)]
mod sys {
    use super::{HandleGuard, NativeHandle};
    use windows::Win32::Foundation::{CloseHandle, HANDLE};
    use windows::Win32::Storage::FileSystem::FindClose;

    impl NativeHandle for HANDLE {
        fn is_invalid(&self) -> bool {
            HANDLE::is_invalid(self)
        }

        fn close(&mut self) {
            if let Err(e) = unsafe { CloseHandle(*self) } {
                tracing::trace!("CloseHandle failed: {}", e);
            }
        }
    }

    /// Handle returned by the FindFirst* family, released with `FindClose`
    #[derive(Debug, Clone, Copy)]
    pub struct SearchHandle(pub HANDLE);

    impl NativeHandle for SearchHandle {
        fn is_invalid(&self) -> bool {
            self.0.is_invalid()
        }

        fn close(&mut self) {
            if let Err(e) = unsafe { FindClose(self.0) } {
                tracing::trace!("FindClose failed: {}", e);
            }
        }
    }

    /// File or volume handle
    pub type OwnedHandle = HandleGuard<HANDLE>;

    /// Stream or file search handle
    pub type FindHandle = HandleGuard<SearchHandle>;

    impl OwnedHandle {
        /// Guard for a failed open
        pub fn invalid() -> Self {
            Self::new(windows::Win32::Foundation::INVALID_HANDLE_VALUE)
        }
    }
}

#[cfg(not(windows))]
mod sys {
    use super::{HandleGuard, NativeHandle};

    /// Portable stand-in for a native file handle
    #[derive(Debug)]
    pub struct FileHandle(pub Option<std::fs::File>);

    impl NativeHandle for FileHandle {
        fn is_invalid(&self) -> bool {
            self.0.is_none()
        }

        fn close(&mut self) {
            self.0.take();
        }
    }

    /// File handle
    pub type OwnedHandle = HandleGuard<FileHandle>;

    impl OwnedHandle {
        /// Guard for a failed open
        pub fn invalid() -> Self {
            Self::new(FileHandle(None))
        }

        /// Borrow the open file, if any
        pub fn file(&self) -> Option<&std::fs::File> {
            self.get().and_then(|h| h.0.as_ref())
        }
    }
}

pub use sys::*;
