use std::sync::Arc;
use std::time::Duration;

use blueclick_types::AppEvent;
use blueclick_vision::{HotkeyAction, HotkeyManager};
use kanal::AsyncSender;
use tokio_util::sync::CancellationToken;

use crate::state::AppState;

/// Listen for the global trigger and stop hotkeys
///
/// Registration happens on the polling thread, which also pumps its
/// messages. A key that cannot be registered ends the task with an error.
pub async fn watcher_io(
    state: Arc<AppState>,
    poll_interval: Duration,
    cancel: CancellationToken,
    event_tx: AsyncSender<AppEvent>,
) -> anyhow::Result<()> {
    let (trigger, stop) = {
        let config = state.config.read().await;
        (config.hotkeys.trigger.clone(), config.hotkeys.stop.clone())
    };

    let tx = event_tx.to_sync();
    tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        let manager = HotkeyManager::new(&trigger, &stop)?;
        tracing::info!("Hotkeys registered (trigger: {}, stop: {})", trigger, stop);

        while !cancel.is_cancelled() {
            if let Some(action) = manager.poll() {
                let event = match action {
                    HotkeyAction::Trigger => AppEvent::HotkeyTriggered,
                    HotkeyAction::Stop => AppEvent::StopRequested,
                };
                tracing::debug!("Hotkey pressed: {:?}", action);
                if let Err(e) = tx.send(event) {
                    tracing::error!("Failed to send hotkey event: {}", e);
                    break;
                }
            }

            std::thread::sleep(poll_interval);
        }

        tracing::info!("Hotkey listener stopping");
        Ok(())
    })
    .await?
}
