use std::sync::Arc;
use std::time::Duration;

use blueclick_types::AppEvent;
use kanal::{AsyncReceiver, AsyncSender};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::events::event_loop;
use crate::io::watcher_io;
use crate::state::AppState;
use crate::status::status_loop;

/// Centralized channel management
pub struct ChannelSet {
    /// Hotkeys and startup commands into the event loop
    pub control: (AsyncSender<AppEvent>, AsyncReceiver<AppEvent>),
    /// Results and status out of the event loop
    pub status: (AsyncSender<AppEvent>, AsyncReceiver<AppEvent>),
}

impl ChannelSet {
    pub fn new() -> Self {
        Self {
            control: kanal::bounded_async(64),
            status: kanal::bounded_async(256), // auto passes can burst
        }
    }
}

impl Default for ChannelSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Application controller for task spawning and lifecycle
pub struct AppController {
    channels: ChannelSet,
    state: Arc<AppState>,
    cancel_token: CancellationToken,
}

impl AppController {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            channels: ChannelSet::new(),
            state,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Sender for commands into the event loop
    pub fn sender(&self) -> AsyncSender<AppEvent> {
        self.channels.control.0.clone()
    }

    pub fn spawn_tasks(&self) -> JoinSet<anyhow::Result<()>> {
        let mut tasks = JoinSet::new();

        // Event loop
        tasks.spawn(event_loop(
            self.state.clone(),
            self.channels.control.1.clone(),
            self.channels.status.0.clone(),
            self.cancel_token.child_token(),
        ));

        // Status loop
        tasks.spawn(status_loop(
            self.state.status.scan.clone(),
            self.channels.status.1.clone(),
            self.cancel_token.child_token(),
        ));

        // Hotkey watcher
        let poll_interval = Duration::from_millis(50);
        tasks.spawn(watcher_io(
            self.state.clone(),
            poll_interval,
            self.cancel_token.child_token(),
            self.channels.control.0.clone(),
        ));

        tasks
    }

    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}
