use serde::{Deserialize, Serialize};

fn default_trigger() -> String {
    "F6".to_string()
}

fn default_stop() -> String {
    "F7".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct HotkeyConfig {
    /// Runs one find-and-act pass while in hotkey mode
    #[serde(default = "default_trigger")]
    pub trigger: String,
    /// Forces the scheduler off
    #[serde(default = "default_stop")]
    pub stop: String,
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            trigger: default_trigger(),
            stop: default_stop(),
        }
    }
}
