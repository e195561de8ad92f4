use blueclick_input::InputError;
use blueclick_vision::CaptureError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("capture failed: {0}")]
    Capture(#[from] CaptureError),

    #[error("input failed: {0}")]
    Input(#[from] InputError),

    #[error("scan pass did not complete: {0}")]
    Join(#[from] tokio::task::JoinError),
}
