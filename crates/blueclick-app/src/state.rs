use std::sync::{Arc, Mutex};

use blueclick_config::Config;
use blueclick_core::Engine;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::profile::ProfilePaths;
use crate::status::AppStatus;

pub struct AppState {
    pub config: Arc<RwLock<Config>>,
    pub paths: ProfilePaths,
    pub engine: Engine,
    pub status: AppStatus,
    /// Token of the current auto loop; cancelled once the loop is gone
    pub auto_cancel: Mutex<Option<CancellationToken>>,
}

impl AppState {
    pub fn new(config: Config, paths: ProfilePaths, engine: Engine) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            paths,
            engine,
            status: AppStatus::new(),
            auto_cancel: Mutex::new(None),
        }
    }

    /// Stop the auto loop if one is running
    pub fn cancel_auto_loop(&self) {
        let slot = self
            .auto_cancel
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(token) = slot.as_ref() {
            token.cancel();
        }
    }
}
