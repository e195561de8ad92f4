use serde::{Deserialize, Serialize};

fn default_roi_margin() -> u32 {
    200
}

fn default_roi_fallback_after() -> u32 {
    3
}

fn default_suppression_secs() -> f64 {
    30.0
}

fn default_suppression_radius() -> u32 {
    80
}

fn default_batch_spacing_ms() -> u64 {
    150
}

fn default_idle_backoff_every() -> u32 {
    5
}

fn default_idle_backoff_max_factor() -> f64 {
    4.0
}

fn default_skip_unchanged() -> bool {
    true
}

/// Tuning knobs for the auto scan loop
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ScanTuning {
    /// Half-size of the capture window around the last hit
    #[serde(default = "default_roi_margin")]
    pub roi_margin: u32,
    /// Consecutive ROI misses before falling back to a full scan
    #[serde(default = "default_roi_fallback_after")]
    pub roi_fallback_after: u32,
    #[serde(default = "default_suppression_secs")]
    pub suppression_secs: f64,
    #[serde(default = "default_suppression_radius")]
    pub suppression_radius: u32,
    /// Delay between two actions of the same pass
    #[serde(default = "default_batch_spacing_ms")]
    pub batch_spacing_ms: u64,
    /// Empty passes per backoff step
    #[serde(default = "default_idle_backoff_every")]
    pub idle_backoff_every: u32,
    #[serde(default = "default_idle_backoff_max_factor")]
    pub idle_backoff_max_factor: f64,
    /// Skip matching when a full-screen capture hashes the same as the previous one
    #[serde(default = "default_skip_unchanged")]
    pub skip_unchanged: bool,
}

impl Default for ScanTuning {
    fn default() -> Self {
        Self {
            roi_margin: default_roi_margin(),
            roi_fallback_after: default_roi_fallback_after(),
            suppression_secs: default_suppression_secs(),
            suppression_radius: default_suppression_radius(),
            batch_spacing_ms: default_batch_spacing_ms(),
            idle_backoff_every: default_idle_backoff_every(),
            idle_backoff_max_factor: default_idle_backoff_max_factor(),
            skip_unchanged: default_skip_unchanged(),
        }
    }
}

fn default_auto_stop_minutes() -> f64 {
    30.0
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AutoStopConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_auto_stop_minutes")]
    pub minutes: f64,
}

impl Default for AutoStopConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            minutes: default_auto_stop_minutes(),
        }
    }
}
