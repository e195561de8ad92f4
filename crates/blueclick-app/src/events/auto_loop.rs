use std::sync::Arc;

use blueclick_core::scheduler::{LoopEvent, run_auto_loop};
use blueclick_types::{AppEvent, ScanMode};
use kanal::AsyncSender;
use tokio_util::sync::CancellationToken;

use crate::state::AppState;

/// Spawn the background scan loop unless one is already running
pub fn start_auto_loop(
    state: &Arc<AppState>,
    status_tx: &AsyncSender<AppEvent>,
    parent: &CancellationToken,
) {
    let token = {
        let mut slot = state
            .auto_cancel
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.as_ref().is_some_and(|token| !token.is_cancelled()) {
            return;
        }
        let token = parent.child_token();
        *slot = Some(token.clone());
        token
    };

    let engine = state.engine.clone();
    let tx = status_tx.clone();

    tokio::spawn(async move {
        let notify = move |event: LoopEvent| {
            let event = match event {
                LoopEvent::Pass(report) => AppEvent::PassCompleted(report.summary()),
                LoopEvent::Failed(error) => AppEvent::PassFailed(error),
                LoopEvent::AutoStopped => AppEvent::StatusUpdate {
                    status: "auto-stop time reached".to_string(),
                    mode: ScanMode::Off,
                },
            };
            // Status is best effort; a full channel drops the update
            if let Err(e) = tx.try_send(event) {
                tracing::debug!("Status channel closed: {}", e);
            }
        };

        let exit = run_auto_loop(engine, token.clone(), notify).await;
        tracing::debug!("Auto loop finished: {:?}", exit);
        token.cancel();
    });
}
