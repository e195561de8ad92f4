use std::str::FromStr;

use anyhow::{Context, Result};
use global_hotkey::{
    GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState,
    hotkey::HotKey,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyAction {
    /// Run one scan pass
    Trigger,
    /// Leave the current mode
    Stop,
}

pub struct HotkeyManager {
    manager: GlobalHotKeyManager,
    trigger: HotKey,
    stop: HotKey,
}

pub fn parse_hotkey(name: &str) -> Result<HotKey> {
    HotKey::from_str(name.trim()).with_context(|| format!("Invalid hotkey '{name}'"))
}

impl HotkeyManager {
    /// Register the trigger and stop keys, e.g. `"F6"` and `"F7"`
    ///
    /// Must stay on the thread that created it; events only arrive while
    /// [`HotkeyManager::poll`] is called.
    pub fn new(trigger: &str, stop: &str) -> Result<Self> {
        let trigger = parse_hotkey(trigger)?;
        let stop = parse_hotkey(stop)?;
        anyhow::ensure!(trigger != stop, "Trigger and stop hotkeys must differ");

        let manager = GlobalHotKeyManager::new().context("Failed to create hotkey manager")?;
        manager
            .register(trigger)
            .context("Failed to register trigger hotkey")?;
        if let Err(e) = manager.register(stop) {
            let _ = manager.unregister(trigger);
            return Err(e).context("Failed to register stop hotkey");
        }

        Ok(Self {
            manager,
            trigger,
            stop,
        })
    }

    /// Next key press, if any (non-blocking)
    pub fn poll(&self) -> Option<HotkeyAction> {
        pump_messages();

        let receiver = GlobalHotKeyEvent::receiver();
        while let Ok(event) = receiver.try_recv() {
            if event.state != HotKeyState::Pressed {
                continue;
            }
            if let Some(action) = self.action_for(event.id) {
                tracing::trace!("Hotkey event {:?} -> {:?}", event.id, action);
                return Some(action);
            }
            tracing::trace!("Ignoring unknown hotkey id {:?}", event.id);
        }
        None
    }

    fn action_for(&self, id: u32) -> Option<HotkeyAction> {
        if id == self.trigger.id() {
            Some(HotkeyAction::Trigger)
        } else if id == self.stop.id() {
            Some(HotkeyAction::Stop)
        } else {
            None
        }
    }
}

impl Drop for HotkeyManager {
    fn drop(&mut self) {
        let _ = self.manager.unregister(self.trigger);
        let _ = self.manager.unregister(self.stop);
    }
}

/// Hotkey messages are posted to this thread's queue and need dispatching
#[cfg(windows)]
fn pump_messages() {
    use windows::Win32::UI::WindowsAndMessaging::{
        DispatchMessageW, MSG, PM_REMOVE, PeekMessageW, TranslateMessage,
    };

    let mut msg = MSG::default();
    unsafe {
        while PeekMessageW(&mut msg, None, 0, 0, PM_REMOVE).as_bool() {
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }
}

#[cfg(not(windows))]
fn pump_messages() {}
