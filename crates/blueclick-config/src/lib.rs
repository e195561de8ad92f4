use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use self::hotkeys::HotkeyConfig;
use self::scan::{AutoStopConfig, ScanTuning};

pub mod blob;
pub mod hotkeys;
pub mod scan;
pub mod script;

pub use blob::{BlobError, EmbeddedScript};
pub use script::ScriptRecord;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid document: {0}")]
    Json(#[from] serde_json::Error),
}

fn default_threshold() -> f32 {
    0.7
}

fn default_cooldown_secs() -> f64 {
    1.0
}

/// Cross-session settings, stored as one flat JSON document
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    #[serde(default = "default_threshold")]
    pub similarity_threshold: f32,
    /// Minimum time between two triggered actions
    #[serde(default = "default_cooldown_secs")]
    pub click_cooldown_secs: f64,
    /// Ignore the cooldown entirely
    pub continuous_click: bool,
    /// Lifetime click counter
    pub total_clicks: u64,
    /// Block user input while an action runs
    pub input_lock: bool,
    /// Match on grayscale instead of color
    pub use_grayscale: bool,
    pub auto_stop: AutoStopConfig,
    pub hotkeys: HotkeyConfig,
    pub scan: ScanTuning,
    /// Script loaded on the previous run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_script: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            similarity_threshold: default_threshold(),
            click_cooldown_secs: default_cooldown_secs(),
            continuous_click: false,
            total_clicks: 0,
            input_lock: false,
            use_grayscale: false,
            auto_stop: AutoStopConfig::default(),
            hotkeys: HotkeyConfig::default(),
            scan: ScanTuning::default(),
            last_script: None,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `BLUECLICK_*` environment overrides
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(threshold) = env::var("BLUECLICK_THRESHOLD")
            .ok()
            .and_then(|v| v.parse::<f32>().ok())
        {
            self.similarity_threshold = threshold.clamp(0.0, 1.0);
        }

        if let Some(cooldown_ms) = env::var("BLUECLICK_COOLDOWN_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            self.click_cooldown_secs = cooldown_ms as f64 / 1000.0;
        }

        self
    }

    pub fn click_cooldown(&self) -> Duration {
        script::secs(self.click_cooldown_secs)
    }

    pub fn suppression_window(&self) -> Duration {
        script::secs(self.scan.suppression_secs)
    }

    pub fn auto_stop_after(&self) -> Option<Duration> {
        self.auto_stop
            .enabled
            .then(|| script::secs(self.auto_stop.minutes * 60.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_nested_sections() {
        let config: Config =
            serde_json::from_str(r#"{"scan": {"roi_margin": 120}, "auto_stop": {"enabled": true}}"#)
                .unwrap();
        assert_eq!(config.scan.roi_margin, 120);
        assert_eq!(config.scan.roi_fallback_after, 3);
        assert_eq!(config.auto_stop_after(), Some(Duration::from_secs(30 * 60)));
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let config = Config {
            similarity_threshold: 0.9,
            total_clicks: 42,
            use_grayscale: true,
            last_script: Some("scripts/a.json".into()),
            ..Default::default()
        };
        config.save(&path).unwrap();

        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn test_load_missing_file_reports_path() {
        let err = Config::load(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(err.to_string().contains("not/here.json"));
    }
}
