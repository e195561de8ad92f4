use std::sync::Arc;
use std::time::Duration;

use blueclick_types::Point;

mod keys;
#[cfg(windows)]
mod win32;

pub use keys::{VirtualKey, parse_key};
#[cfg(windows)]
pub use win32::Win32Driver;

#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("{call} failed: {message}")]
    Os { call: &'static str, message: String },

    #[error("{call} injected {sent} of {expected} events")]
    Partial {
        call: &'static str,
        sent: u32,
        expected: u32,
    },

    #[error("unknown key name '{0}'")]
    UnknownKey(String),

    #[error("input injection is not supported on this platform")]
    Unsupported,
}

/// Opaque top-level window handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub isize);

/// Synthetic mouse and keyboard input plus the window bookkeeping around it
pub trait InputDriver: Send + Sync {
    fn cursor_position(&self) -> Result<Point, InputError>;

    fn move_cursor(&self, to: Point) -> Result<(), InputError>;

    /// Left button down and up at the current cursor position
    fn left_click(&self) -> Result<(), InputError>;

    /// Key down and up
    fn press_key(&self, key: VirtualKey) -> Result<(), InputError>;

    fn foreground_window(&self) -> Option<WindowHandle>;

    /// Bring `window` back to the foreground and give it keyboard focus
    fn restore_focus(&self, window: WindowHandle) -> Result<(), InputError>;

    /// Block or unblock user keyboard and mouse input
    fn block_input(&self, blocked: bool) -> Result<(), InputError>;

    fn beep(&self, frequency: u32, duration: Duration) -> Result<(), InputError>;
}

/// Platform input backend
pub fn default_driver() -> Result<Arc<dyn InputDriver>, InputError> {
    #[cfg(windows)]
    {
        Ok(Arc::new(Win32Driver::new()))
    }
    #[cfg(not(windows))]
    {
        Err(InputError::Unsupported)
    }
}
