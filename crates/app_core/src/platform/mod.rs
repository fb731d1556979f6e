//! Platform implementations of [`ShellImaging`]

use crate::imaging::ShellImaging;

#[cfg(windows)]
mod win32;
#[cfg(windows)]
pub use self::win32::WindowsShell;

#[cfg(not(windows))]
mod unsupported;
#[cfg(not(windows))]
pub use self::unsupported::UnsupportedShell;

/// The shell imaging backend for this platform
pub fn shell_imaging() -> Box<dyn ShellImaging> {
    #[cfg(windows)]
    {
        Box::new(WindowsShell::new())
    }

    #[cfg(not(windows))]
    {
        Box::new(UnsupportedShell)
    }
}
