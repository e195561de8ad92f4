use std::sync::Arc;

use blueclick_types::{AppEvent, ScanMode};
use kanal::{AsyncReceiver, AsyncSender};
use tokio_util::sync::CancellationToken;

use crate::state::AppState;

pub mod auto_loop;
pub mod load_script;
pub mod set_mode;
pub mod trigger_pass;

use load_script::handle_load_script;
use set_mode::handle_set_mode;
use trigger_pass::handle_pass_trigger;

/// App's main loop
pub async fn event_loop(
    state: Arc<AppState>,
    control_rx: AsyncReceiver<AppEvent>,
    status_tx: AsyncSender<AppEvent>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    tracing::info!("[EVENT_LOOP] Starting main loop, waiting for events");
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = control_rx.recv() => event?,
        };

        tracing::debug!("[EVENT_LOOP] Event received: {:?}", event);
        if matches!(event, AppEvent::Shutdown) {
            break;
        }

        if let Err(e) = handle_events(&state, &status_tx, &cancel, event).await {
            tracing::error!("[EVENT_LOOP] {e:#}");
            let mode = state.engine.session().lock().await.mode();
            status_tx
                .send(AppEvent::StatusUpdate {
                    status: format!("{e:#}"),
                    mode,
                })
                .await?;
        }
    }

    state.cancel_auto_loop();
    tracing::info!("[EVENT_LOOP] Stopped");
    Ok(())
}

async fn handle_events(
    state: &Arc<AppState>,
    status_tx: &AsyncSender<AppEvent>,
    cancel: &CancellationToken,
    event: AppEvent,
) -> anyhow::Result<()> {
    match event {
        AppEvent::SetMode(mode) => {
            handle_set_mode(state, mode, status_tx, cancel).await?;
        }
        AppEvent::HotkeyTriggered => {
            handle_pass_trigger(state, status_tx).await;
        }
        AppEvent::StopRequested => {
            tracing::info!("Stop hotkey pressed");
            handle_set_mode(state, ScanMode::Off, status_tx, cancel).await?;
        }
        AppEvent::LoadScript(path) => {
            handle_load_script(state, path, status_tx).await?;
        }
        AppEvent::UpdateThreshold(threshold) => {
            let threshold = threshold.clamp(0.0, 1.0);
            state.engine.session().lock().await.set_threshold(threshold);
            state.config.write().await.similarity_threshold = threshold;
            tracing::info!("Similarity threshold set to {:.2}", threshold);
        }
        AppEvent::ScriptLoaded { .. }
        | AppEvent::PassCompleted(_)
        | AppEvent::PassFailed(_)
        | AppEvent::StatusUpdate { .. } => {
            // Outgoing events, nothing to do here
        }
        AppEvent::Shutdown => {}
    }

    Ok(())
}
