use std::sync::Arc;
use std::time::SystemTime;

use blueclick_types::{AppEvent, ScanMode};
use kanal::AsyncReceiver;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Scan status information
#[derive(Clone, Debug, Default)]
pub struct ScanStatus {
    pub mode: ScanMode,
    pub last_pass_time: Option<SystemTime>,
    pub pass_count: u64,
    pub match_count: u64,
    pub action_count: u64,
    pub error_count: u64,
    pub script: Option<String>,
    pub current_message: String,
}

impl ScanStatus {
    /// Fold one outgoing event into the counters
    pub fn apply(&mut self, event: &AppEvent) {
        match event {
            AppEvent::PassCompleted(summary) => {
                self.pass_count += 1;
                self.match_count += summary.found as u64;
                self.action_count += summary.acted as u64;
                self.last_pass_time = Some(SystemTime::now());
                if summary.acted > 0 {
                    tracing::info!(
                        "Acted on {} of {} matches ({} retries, roi: {})",
                        summary.acted,
                        summary.found,
                        summary.retries,
                        summary.roi
                    );
                }
            }
            AppEvent::PassFailed(error) => {
                self.pass_count += 1;
                self.error_count += 1;
                self.last_pass_time = Some(SystemTime::now());
                self.current_message = error.clone();
                tracing::warn!("Pass failed: {}", error);
            }
            AppEvent::ScriptLoaded { name, templates } => {
                tracing::info!("Script '{}' ready with {} templates", name, templates);
                self.script = Some(name.clone());
            }
            AppEvent::StatusUpdate { status, mode } => {
                tracing::info!("[{}] {}", mode, status);
                self.mode = *mode;
                self.current_message = status.clone();
            }
            _ => {}
        }
    }
}

/// Application status
pub struct AppStatus {
    pub scan: Arc<RwLock<ScanStatus>>,
}

impl AppStatus {
    pub fn new() -> Self {
        Self {
            scan: Arc::new(RwLock::new(ScanStatus::default())),
        }
    }
}

impl Default for AppStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Drain app-to-status events until cancelled or the channel closes
pub async fn status_loop(
    status: Arc<RwLock<ScanStatus>>,
    rx: AsyncReceiver<AppEvent>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = rx.recv() => match event {
                Ok(event) => event,
                Err(_) => break,
            },
        };
        status.write().await.apply(&event);
    }

    let status = status.read().await;
    tracing::info!(
        "Status loop stopping: {} passes, {} matches, {} actions, {} errors",
        status.pass_count,
        status.match_count,
        status.action_count,
        status.error_count
    );
    Ok(())
}
