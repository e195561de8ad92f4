pub mod action;
pub mod engine;
pub mod error;
pub mod policy;
pub mod roi;
pub mod scheduler;
pub mod state;
pub mod suppression;

#[cfg(any(test, feature = "fakes"))]
pub mod fakes;

pub use engine::{Engine, PassReport};
pub use error::EngineError;
pub use state::{EngineSettings, Session, SharedSession, Stats};
