use std::sync::Arc;

use blueclick_core::action::Trigger;
use blueclick_types::{AppEvent, ScanMode};
use kanal::AsyncSender;

use crate::state::AppState;

/// Run one full-screen pass for the trigger hotkey
///
/// The pass runs on its own task so a long retry sequence does not hold up
/// the stop hotkey.
pub async fn handle_pass_trigger(state: &Arc<AppState>, status_tx: &AsyncSender<AppEvent>) {
    let mode = state.engine.session().lock().await.mode();
    if mode != ScanMode::Hotkey {
        tracing::debug!("Trigger hotkey ignored in {} mode", mode);
        return;
    }

    let engine = state.engine.clone();
    let tx = status_tx.clone();
    tokio::spawn(async move {
        let event = match engine.run_pass_async(Trigger::Manual).await {
            Ok(report) => AppEvent::PassCompleted(report.summary()),
            Err(e) => AppEvent::PassFailed(e.to_string()),
        };
        if let Err(e) = tx.send(event).await {
            tracing::error!("Failed to send pass result: {}", e);
        }
    });
}
