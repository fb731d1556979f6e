//! Asynchronous (overlapped) whole-buffer writes
//!
//! A write owns its buffer and its handle until the kernel reports completion.
//! The completion is delivered once, either to a callback or through the
//! [`OverlappedWrite`] future, and the handle is closed after delivery.

use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// `ERROR_OPERATION_ABORTED`
pub const ERROR_OPERATION_ABORTED: u32 = 995;

/// Outcome of one overlapped write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteCompletion {
    /// Win32 error code, 0 on success
    pub error_code: u32,
    pub bytes_transferred: u32,
}

impl WriteCompletion {
    pub fn is_success(&self) -> bool {
        self.error_code == 0
    }

    fn aborted() -> Self {
        Self {
            error_code: ERROR_OPERATION_ABORTED,
            bytes_transferred: 0,
        }
    }
}

type Completion = Box<dyn FnOnce(WriteCompletion) + Send + 'static>;

/// Start writing `buffer` to `path` (created or truncated) and invoke
/// `on_complete` from a worker thread when the write finishes.
///
/// Returns false when the write could not be started; the callback is then
/// never called.
pub fn write_overlapped<F>(path: &str, buffer: Vec<u8>, on_complete: F) -> bool
where
    F: FnOnce(WriteCompletion) + Send + 'static,
{
    sys::start(path, buffer, Box::new(on_complete)).is_some()
}

/// Start writing `buffer` to `path` and return a future for the completion
pub fn begin_overlapped_write(path: &str, buffer: Vec<u8>) -> Option<OverlappedWrite> {
    let (tx, rx) = oneshot::channel();
    let cancel = sys::start(
        path,
        buffer,
        Box::new(move |completion| {
            // Receiver may already be gone
            let _ = tx.send(completion);
        }),
    )?;
    Some(OverlappedWrite { rx, cancel })
}

/// An in-flight write
pub struct OverlappedWrite {
    rx: oneshot::Receiver<WriteCompletion>,
    cancel: CancelToken,
}

impl OverlappedWrite {
    /// Ask the kernel to abandon the write. The future still resolves,
    /// normally with [`ERROR_OPERATION_ABORTED`].
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Future for OverlappedWrite {
    type Output = WriteCompletion;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(completion)) => Poll::Ready(completion),
            Poll::Ready(Err(_)) => Poll::Ready(WriteCompletion::aborted()),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Shared slot for the in-flight handle. The worker empties it before closing
/// the handle, so cancellation never touches a closed handle.
#[derive(Clone)]
struct CancelToken {
    slot: Arc<Mutex<Option<isize>>>,
}

impl CancelToken {
    fn new(raw: isize) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(raw))),
        }
    }

    fn cancel(&self) {
        let mut slot = self.slot.lock();
        sys::cancel(&mut slot);
    }

    fn take(&self) -> Option<isize> {
        self.slot.lock().take()
    }
}

#[cfg(windows)]
mod sys {
    use super::{CancelToken, Completion, WriteCompletion};
    use crate::handle::{HandleGuard, OwnedHandle};
    use crate::raw_io::{create_for_write_with, FLAG_OVERLAPPED};
    use windows::core::PCWSTR;
    use windows::Win32::Foundation::{ERROR_IO_PENDING, HANDLE};
    use windows::Win32::Storage::FileSystem::WriteFile;
    use windows::Win32::System::Threading::CreateEventW;
    use windows::Win32::System::IO::{CancelIoEx, GetOverlappedResult, OVERLAPPED};

    /// Everything that must stay alive until the kernel is done with the write
    struct Pending {
        file: OwnedHandle,
        _event: HandleGuard<HANDLE>,
        overlapped: Box<OVERLAPPED>,
        _buffer: Vec<u8>,
    }

    // SAFETY: the handles and the OVERLAPPED block are only used by the
    // worker thread once the write has been issued
    unsafe impl Send for Pending {}

    fn to_handle(raw: isize) -> HANDLE {
        HANDLE(raw as *mut std::ffi::c_void)
    }

    fn win32_code(e: &windows::core::Error) -> u32 {
        (e.code().0 as u32) & 0xFFFF
    }

    pub fn start(path: &str, buffer: Vec<u8>, on_complete: Completion) -> Option<CancelToken> {
        let file = create_for_write_with(path, true, FLAG_OVERLAPPED);
        let &h = file.get()?;

        let event = match unsafe { CreateEventW(None, true, false, PCWSTR::null()) } {
            Ok(event) => HandleGuard::new(event),
            Err(e) => {
                tracing::debug!("CreateEventW failed: {}", e);
                return None;
            }
        };

        let mut overlapped = Box::<OVERLAPPED>::default();
        overlapped.hEvent = *event.get()?;

        let issued = unsafe { WriteFile(h, Some(&buffer), None, Some(&mut *overlapped)) };
        if let Err(e) = issued {
            if e.code() != ERROR_IO_PENDING.to_hresult() {
                tracing::debug!("WriteFile({}) failed: {}", path, e);
                return None;
            }
        }

        let token = CancelToken::new(h.0 as isize);
        let worker_token = token.clone();
        let pending = Pending {
            file,
            _event: event,
            overlapped,
            _buffer: buffer,
        };

        std::thread::spawn(move || {
            let pending = pending;
            let mut transferred = 0u32;
            let result = match pending.file.get() {
                Some(&h) => unsafe {
                    GetOverlappedResult(h, &*pending.overlapped, &mut transferred, true)
                },
                None => Ok(()),
            };
            let completion = match result {
                Ok(()) => WriteCompletion {
                    error_code: 0,
                    bytes_transferred: transferred,
                },
                Err(e) => WriteCompletion {
                    error_code: win32_code(&e),
                    bytes_transferred: transferred,
                },
            };

            // Cancellation must stop targeting the handle before it closes
            worker_token.take();
            drop(pending);

            on_complete(completion);
        });

        Some(token)
    }

    pub fn cancel(slot: &mut Option<isize>) {
        let Some(raw) = *slot else {
            return;
        };
        if let Err(e) = unsafe { CancelIoEx(to_handle(raw), None) } {
            tracing::trace!("CancelIoEx failed: {}", e);
        }
    }
}

#[cfg(not(windows))]
mod sys {
    use super::{CancelToken, Completion, WriteCompletion, ERROR_OPERATION_ABORTED};
    use crate::raw_io::{create_for_write, write_all};

    pub fn start(path: &str, buffer: Vec<u8>, on_complete: Completion) -> Option<CancelToken> {
        let file = create_for_write(path, true);
        if !file.is_valid() {
            return None;
        }

        let token = CancelToken::new(1);
        let worker_token = token.clone();

        std::thread::spawn(move || {
            // A cancel that landed before the worker ran empties the slot
            let Some(_) = worker_token.take() else {
                drop(file);
                on_complete(WriteCompletion {
                    error_code: ERROR_OPERATION_ABORTED,
                    bytes_transferred: 0,
                });
                return;
            };

            let completion = if write_all(&file, &buffer) {
                WriteCompletion {
                    error_code: 0,
                    bytes_transferred: buffer.len() as u32,
                }
            } else {
                WriteCompletion {
                    error_code: 29, // ERROR_WRITE_FAULT
                    bytes_transferred: 0,
                }
            };
            drop(file);
            on_complete(completion);
        });

        Some(token)
    }

    /// The worker checks the slot before writing, so emptying it aborts
    pub fn cancel(slot: &mut Option<isize>) {
        slot.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_future_resolves_with_byte_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("async.bin");
        let payload = vec![7u8; 64 * 1024];

        let write = begin_overlapped_write(path.to_str().unwrap(), payload.clone()).unwrap();
        let completion = write.await;

        assert!(completion.is_success());
        assert_eq!(completion.bytes_transferred as usize, payload.len());
        assert_eq!(std::fs::read(&path).unwrap(), payload);
    }

    #[test]
    fn test_callback_invoked_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("callback.txt");
        let (tx, rx) = std::sync::mpsc::channel();

        assert!(write_overlapped(path.to_str().unwrap(), b"hello".to_vec(), move |c| {
            tx.send(c).unwrap();
        }));

        let completion = rx.recv().unwrap();
        assert_eq!(completion.error_code, 0);
        assert_eq!(completion.bytes_transferred, 5);
        assert!(rx.recv().is_err());
    }

    #[tokio::test]
    async fn test_handle_released_after_completion() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("released.bin");
        let path = path.to_str().unwrap();

        let write = begin_overlapped_write(path, vec![3u8; 1024]).unwrap();
        let token = write.cancel.clone();
        assert!(write.await.is_success());

        // The worker emptied the slot, so a late cancel has nothing to target
        assert!(token.take().is_none());
        token.cancel();

        // Exclusive reopen only succeeds once the writer's handle is closed
        let reopened = crate::raw_io::create_for_write(path, false);
        assert!(reopened.is_valid());
    }

    #[test]
    fn test_unopenable_target_never_starts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no_such_dir").join("file.bin");

        assert!(!write_overlapped(path.to_str().unwrap(), vec![1, 2, 3], |_| {
            panic!("callback must not run");
        }));
        assert!(begin_overlapped_write(path.to_str().unwrap(), vec![1]).is_none());
    }
}
