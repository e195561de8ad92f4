//! Synthetic input at a target, leaving the user's cursor and focus as found.

use std::time::Duration;

use blueclick_input::{InputDriver, VirtualKey, WindowHandle, parse_key};
use blueclick_types::{ActionConfig, ActionPolicy, Point};
use rand::Rng;
use tracing::{debug, warn};

use crate::error::EngineError;

/// Tone played before an action when sound is on
pub const ACTION_BEEP: (u32, Duration) = (1000, Duration::from_millis(100));
/// Tone played before a verification key
pub const CONFIRM_BEEP: (u32, Duration) = (1500, Duration::from_millis(100));

/// Who asked for the action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Hotkey or explicit user request
    Manual,
    /// Autonomous scan loop
    Background,
}

/// Whether clicks count towards the lifetime counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Billing {
    Counted,
    Retry,
}

/// Waits between the sub-steps of an action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub move_settle: Duration,
    pub before_key: Duration,
    pub key_gap: Duration,
    pub focus_wait: Duration,
    pub sound_delay: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            move_settle: Duration::from_millis(20),
            before_key: Duration::from_millis(100),
            key_gap: Duration::from_millis(50),
            focus_wait: Duration::from_millis(100),
            sound_delay: Duration::from_millis(300),
        }
    }
}

impl Pacing {
    /// No waits at all, for tests and dry runs
    pub fn instant() -> Self {
        Self {
            move_settle: Duration::ZERO,
            before_key: Duration::ZERO,
            key_gap: Duration::ZERO,
            focus_wait: Duration::ZERO,
            sound_delay: Duration::ZERO,
        }
    }
}

pub(crate) fn pause(duration: Duration) {
    if !duration.is_zero() {
        std::thread::sleep(duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionReport {
    /// Where the input actually landed, after jitter
    pub target: Point,
    pub clicks: u32,
    /// Clicks to add to the lifetime counter
    pub billed: u32,
    pub keys: u32,
}

/// Puts the cursor, foreground window and input lock back on drop
struct RestoreGuard<'a> {
    driver: &'a dyn InputDriver,
    cursor: Option<Point>,
    window: Option<WindowHandle>,
    locked: bool,
}

impl<'a> RestoreGuard<'a> {
    fn capture(driver: &'a dyn InputDriver, restore_focus: bool, lock_input: bool) -> Self {
        let cursor = driver
            .cursor_position()
            .inspect_err(|e| warn!("Cannot read cursor position: {e}"))
            .ok();
        let window = if restore_focus {
            driver.foreground_window()
        } else {
            None
        };

        let locked = lock_input
            && match driver.block_input(true) {
                Ok(()) => true,
                Err(e) => {
                    warn!("Input lock unavailable, continuing without it: {e}");
                    false
                }
            };

        Self {
            driver,
            cursor,
            window,
            locked,
        }
    }
}

impl Drop for RestoreGuard<'_> {
    fn drop(&mut self) {
        if let Some(cursor) = self.cursor
            && let Err(e) = self.driver.move_cursor(cursor)
        {
            warn!("Failed to restore cursor to {}: {e}", cursor);
        }
        if let Some(window) = self.window
            && let Err(e) = self.driver.restore_focus(window)
        {
            warn!("Failed to restore focus to {:?}: {e}", window);
        }
        if self.locked
            && let Err(e) = self.driver.block_input(false)
        {
            warn!("Failed to release input lock: {e}");
        }
    }
}

/// Keys resolved before any input is sent
struct ResolvedKeys {
    key: Option<VirtualKey>,
    count: u32,
}

pub struct Executor<'a> {
    driver: &'a dyn InputDriver,
    config: &'a ActionConfig,
    pacing: &'a Pacing,
    input_lock: bool,
}

impl<'a> Executor<'a> {
    pub fn new(
        driver: &'a dyn InputDriver,
        config: &'a ActionConfig,
        pacing: &'a Pacing,
        input_lock: bool,
    ) -> Self {
        Self {
            driver,
            config,
            pacing,
            input_lock,
        }
    }

    pub fn config(&self) -> &ActionConfig {
        self.config
    }

    /// Run the configured input sequence at `target`
    pub fn execute(
        &self,
        target: Point,
        trigger: Trigger,
        billing: Billing,
    ) -> Result<ActionReport, EngineError> {
        let keys = self.resolve_keys()?;
        let restore_focus = trigger == Trigger::Manual || self.config.is_focus_mode();
        let guard = RestoreGuard::capture(self.driver, restore_focus, self.input_lock);

        let target = self.jitter(target);
        if self.config.sound_enabled {
            self.beep(ACTION_BEEP);
            pause(self.pacing.sound_delay);
        }

        let (clicks, keys_sent) = match &self.config.policy {
            ActionPolicy::SimpleClick {
                count, interval, ..
            } => {
                self.driver.move_cursor(target)?;
                pause(self.pacing.move_settle);
                for i in 0..*count {
                    self.driver.left_click()?;
                    if i + 1 < *count {
                        pause(*interval);
                    }
                }
                let sent = match keys.key {
                    Some(key) => {
                        pause(self.pacing.before_key);
                        self.press_repeated(key, keys.count)?
                    }
                    None => 0,
                };
                (*count, sent)
            }
            ActionPolicy::FocusAndKey { .. } => {
                self.driver.move_cursor(target)?;
                pause(self.pacing.move_settle);
                self.driver.left_click()?;
                pause(self.pacing.focus_wait);
                let sent = match keys.key {
                    Some(key) => self.press_repeated(key, keys.count)?,
                    None => 0,
                };
                (1, sent)
            }
        };
        drop(guard);

        let billed = match billing {
            Billing::Counted => clicks,
            Billing::Retry => 0,
        };
        debug!(
            "Acted at {} ({} clicks, {} keys, {:?})",
            target, clicks, keys_sent, trigger
        );
        Ok(ActionReport {
            target,
            clicks,
            billed,
            keys: keys_sent,
        })
    }

    /// Send one key without moving the cursor, with the confirmation tone
    pub fn confirm(&self, key_name: &str) -> Result<(), EngineError> {
        let key = parse_key(key_name)?;
        if self.config.sound_enabled {
            self.beep(CONFIRM_BEEP);
        }
        self.driver.press_key(key)?;
        Ok(())
    }

    fn resolve_keys(&self) -> Result<ResolvedKeys, EngineError> {
        let (name, count) = match &self.config.policy {
            ActionPolicy::SimpleClick {
                after_key,
                after_key_count,
                ..
            } => (after_key.as_deref(), *after_key_count),
            ActionPolicy::FocusAndKey { key, key_count } => (key.as_deref(), *key_count),
        };
        Ok(ResolvedKeys {
            key: name.map(parse_key).transpose()?,
            count,
        })
    }

    fn press_repeated(&self, key: VirtualKey, count: u32) -> Result<u32, EngineError> {
        for i in 0..count {
            self.driver.press_key(key)?;
            if i + 1 < count {
                pause(self.pacing.key_gap);
            }
        }
        Ok(count)
    }

    fn jitter(&self, target: Point) -> Point {
        let offset = self.config.click_offset as i32;
        if offset == 0 {
            return target;
        }
        let mut rng = rand::rng();
        target.offset(
            rng.random_range(-offset..=offset),
            rng.random_range(-offset..=offset),
        )
    }

    fn beep(&self, (frequency, duration): (u32, Duration)) {
        if let Err(e) = self.driver.beep(frequency, duration) {
            debug!("Beep failed: {e}");
        }
    }
}
