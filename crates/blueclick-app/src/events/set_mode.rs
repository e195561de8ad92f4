use std::sync::Arc;

use blueclick_types::{AppEvent, ScanMode};
use kanal::AsyncSender;
use tokio_util::sync::CancellationToken;

use crate::state::AppState;

use super::auto_loop::start_auto_loop;

pub async fn handle_set_mode(
    state: &Arc<AppState>,
    mode: ScanMode,
    status_tx: &AsyncSender<AppEvent>,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let changed = state.engine.session().lock().await.set_mode(mode);

    if mode == ScanMode::Auto {
        start_auto_loop(state, status_tx, cancel);
    } else {
        state.cancel_auto_loop();
    }

    let status = match (changed, mode) {
        (false, _) => format!("already in {mode} mode"),
        (true, ScanMode::Off) => "scanning stopped".to_string(),
        (true, ScanMode::Hotkey) => {
            let key = state.config.read().await.hotkeys.trigger.clone();
            format!("waiting for {key}")
        }
        (true, ScanMode::Auto) => "scanning in the background".to_string(),
    };
    status_tx.send(AppEvent::StatusUpdate { status, mode }).await?;
    Ok(())
}
