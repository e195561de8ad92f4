use std::path::{Path, PathBuf};
use std::time::Duration;

use blueclick_types::{ActionConfig, ActionPolicy, PostActionPolicy};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Schema written by this version
pub const SCRIPT_VERSION: u32 = 2;

fn default_version() -> u32 {
    // Records without a version field predate versioning
    1
}

fn default_name() -> String {
    "Untitled".to_string()
}

fn default_click_count() -> u32 {
    1
}

fn default_click_interval() -> f64 {
    0.1
}

fn default_after_key_count() -> u32 {
    1
}

fn default_verify_delay() -> f64 {
    0.5
}

fn default_verify_key() -> String {
    "enter".to_string()
}

fn default_retry_max() -> u32 {
    3
}

fn default_scan_interval() -> f64 {
    0.5
}

fn default_sound_enabled() -> bool {
    true
}

/// Stored script: what to look for and what to do when it shows up.
///
/// Field names and units (seconds as floats) follow the on-disk format, so
/// records saved by older builds load with defaults for anything missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptRecord {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default = "default_name")]
    pub name: String,
    pub templates: Vec<PathBuf>,
    /// Single-template field from version 1, folded into `templates` on load
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<PathBuf>,

    #[serde(default = "default_click_count")]
    pub click_count: u32,
    #[serde(default = "default_click_interval")]
    pub click_interval: f64,
    pub after_key: String,
    #[serde(default = "default_after_key_count")]
    pub after_key_count: u32,

    pub verify_enabled: bool,
    #[serde(default = "default_verify_delay")]
    pub verify_delay: f64,
    #[serde(default = "default_verify_key")]
    pub verify_key: String,

    pub focus_mode: bool,
    pub retry_until_gone: bool,
    #[serde(default = "default_retry_max")]
    pub retry_max: u32,

    #[serde(default = "default_scan_interval")]
    pub scan_interval: f64,
    /// Overrides the global similarity threshold when set
    pub threshold: Option<f32>,
    #[serde(default = "default_sound_enabled")]
    pub sound_enabled: bool,
    /// Random jitter radius in pixels
    pub click_offset: u32,
}

impl Default for ScriptRecord {
    fn default() -> Self {
        Self {
            version: SCRIPT_VERSION,
            name: default_name(),
            templates: Vec::new(),
            template: None,
            click_count: default_click_count(),
            click_interval: default_click_interval(),
            after_key: String::new(),
            after_key_count: default_after_key_count(),
            verify_enabled: false,
            verify_delay: default_verify_delay(),
            verify_key: default_verify_key(),
            focus_mode: false,
            retry_until_gone: false,
            retry_max: default_retry_max(),
            scan_interval: default_scan_interval(),
            threshold: None,
            sound_enabled: default_sound_enabled(),
            click_offset: 0,
        }
    }
}

impl ScriptRecord {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&data)
    }

    pub fn from_json(data: &str) -> Result<Self, ConfigError> {
        let mut record: ScriptRecord = serde_json::from_str(data)?;
        record.migrate();
        Ok(record)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Bring an older record up to [`SCRIPT_VERSION`]
    pub fn migrate(&mut self) {
        if self.version >= SCRIPT_VERSION {
            return;
        }
        if let Some(single) = self.template.take()
            && !self.templates.contains(&single)
        {
            self.templates.insert(0, single);
        }
        tracing::debug!(
            "Migrated script '{}' from v{} to v{}",
            self.name,
            self.version,
            SCRIPT_VERSION
        );
        self.version = SCRIPT_VERSION;
    }

    /// Template paths resolved against the script's own directory
    pub fn resolved_templates(&self, base: &Path) -> Vec<PathBuf> {
        self.templates
            .iter()
            .map(|p| if p.is_absolute() { p.clone() } else { base.join(p) })
            .collect()
    }

    pub fn scan_interval(&self) -> Duration {
        secs(self.scan_interval)
    }

    /// Typed view of the flag soup stored on disk
    pub fn action_config(&self) -> ActionConfig {
        let key = non_empty(&self.after_key);

        let policy = if self.focus_mode {
            ActionPolicy::FocusAndKey {
                key,
                key_count: self.after_key_count.max(1),
            }
        } else {
            ActionPolicy::SimpleClick {
                count: self.click_count.max(1),
                interval: secs(self.click_interval),
                after_key: key,
                after_key_count: self.after_key_count.max(1),
            }
        };

        let post = if self.retry_until_gone {
            if self.verify_enabled {
                tracing::warn!(
                    "Script '{}' enables both verify and retry-until-gone, using retry-until-gone",
                    self.name
                );
            }
            PostActionPolicy::RetryUntilGone {
                delay: secs(self.verify_delay),
                max_attempts: self.retry_max,
            }
        } else if self.verify_enabled {
            PostActionPolicy::VerifyOnce {
                delay: secs(self.verify_delay),
                key: non_empty(&self.verify_key).unwrap_or_else(default_verify_key),
            }
        } else {
            PostActionPolicy::None
        };

        ActionConfig {
            policy,
            post,
            click_offset: self.click_offset,
            sound_enabled: self.sound_enabled,
        }
    }

    /// Enable verification, turning retry-until-gone off
    pub fn set_verify(&mut self, enabled: bool) {
        self.verify_enabled = enabled;
        if enabled {
            self.retry_until_gone = false;
        }
    }

    /// Enable retry-until-gone, turning verification off
    pub fn set_retry_until_gone(&mut self, enabled: bool) {
        self.retry_until_gone = enabled;
        if enabled {
            self.verify_enabled = false;
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub(crate) fn secs(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::from_secs_f64(value)
    } else {
        Duration::ZERO
    }
}
