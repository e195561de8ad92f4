mod capture;
mod color_blobs;
mod error;
mod hotkey;
mod matcher;
mod template;

#[cfg(windows)]
pub use capture::XcapScreen;
pub use capture::{Frame, ScreenSource, default_screen};
pub use color_blobs::{ColorBlob, HsvRange, MIN_BLOB_AREA, detect_blobs, detect_blue};
pub use error::{CaptureError, TemplateError};
pub use hotkey::{HotkeyAction, HotkeyManager, parse_hotkey};
pub use matcher::{ColorSpace, best_match, find_matches, suppress_duplicates};
pub use template::Template;
