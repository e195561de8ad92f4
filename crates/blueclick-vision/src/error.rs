use std::path::PathBuf;

use blueclick_types::CaptureRegion;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("failed to enumerate monitors: {0}")]
    Monitors(String),

    #[error("no monitor found")]
    NoMonitor,

    #[error("failed to capture screen: {0}")]
    Capture(String),

    #[error("region {0:?} lies outside the monitor")]
    OutOfBounds(CaptureRegion),

    #[error("screen capture is not supported on this platform")]
    Unsupported,
}

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("failed to load template {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to decode template '{name}': {source}")]
    Decode {
        name: String,
        #[source]
        source: image::ImageError,
    },

    #[error("template '{0}' is empty")]
    Empty(String),
}
