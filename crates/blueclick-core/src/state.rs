use std::sync::Arc;
use std::time::{Duration, Instant};

use blueclick_config::{Config, ScriptRecord};
use blueclick_types::{ActionConfig, ScanMode};
use blueclick_vision::{ColorSpace, Template};
use tokio::sync::Mutex;

use crate::roi::RoiTracker;
use crate::suppression::Suppression;

const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_millis(500);

/// Everything a pass needs to know, resolved from settings and the loaded script
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub threshold: f32,
    pub color_space: ColorSpace,
    pub cooldown: Duration,
    pub continuous_click: bool,
    pub input_lock: bool,
    pub scan_interval: Duration,
    pub auto_stop: Option<Duration>,
    pub roi_margin: u32,
    pub roi_fallback_after: u32,
    pub suppression_window: Duration,
    pub suppression_radius: f64,
    pub batch_spacing: Duration,
    pub idle_backoff_every: u32,
    pub idle_backoff_max_factor: f64,
    pub skip_unchanged: bool,
    pub action: ActionConfig,
}

impl EngineSettings {
    /// A script's own threshold wins over the global one
    pub fn from_config(config: &Config, script: Option<&ScriptRecord>) -> Self {
        let threshold = script
            .and_then(|s| s.threshold)
            .unwrap_or(config.similarity_threshold)
            .clamp(0.0, 1.0);

        Self {
            threshold,
            color_space: ColorSpace::from_grayscale(config.use_grayscale),
            cooldown: config.click_cooldown(),
            continuous_click: config.continuous_click,
            input_lock: config.input_lock,
            scan_interval: script
                .map(|s| s.scan_interval())
                .unwrap_or(DEFAULT_SCAN_INTERVAL),
            auto_stop: config.auto_stop_after(),
            roi_margin: config.scan.roi_margin,
            roi_fallback_after: config.scan.roi_fallback_after,
            suppression_window: config.suppression_window(),
            suppression_radius: config.scan.suppression_radius as f64,
            batch_spacing: Duration::from_millis(config.scan.batch_spacing_ms),
            idle_backoff_every: config.scan.idle_backoff_every,
            idle_backoff_max_factor: config.scan.idle_backoff_max_factor.max(1.0),
            skip_unchanged: config.scan.skip_unchanged,
            action: script.map(|s| s.action_config()).unwrap_or_default(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default(), None)
    }
}

/// Mutable per-run scan bookkeeping
#[derive(Debug, Clone)]
pub struct ScanState {
    pub mode: ScanMode,
    pub roi: RoiTracker,
    /// Consecutive passes that found nothing
    pub idle_misses: u32,
    pub suppression: Suppression,
    pub last_click: Option<Instant>,
    pub last_hash: Option<u64>,
    pub auto_since: Option<Instant>,
}

impl ScanState {
    pub fn new(mode: ScanMode, settings: &EngineSettings) -> Self {
        Self {
            mode,
            roi: RoiTracker::new(settings.roi_margin, settings.roi_fallback_after),
            idle_misses: 0,
            suppression: Suppression::new(settings.suppression_radius, settings.suppression_window),
            last_click: None,
            last_hash: None,
            auto_since: (mode == ScanMode::Auto).then(Instant::now),
        }
    }

    /// Whether the cooldown still blocks an action at `now`
    pub fn cooling_down(&self, settings: &EngineSettings, now: Instant) -> bool {
        !settings.continuous_click
            && self
                .last_click
                .is_some_and(|last| now.saturating_duration_since(last) < settings.cooldown)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    pub passes: u64,
    pub matches: u64,
    pub actions: u64,
    /// Clicks billed to the lifetime counter
    pub clicks: u64,
    pub retries: u64,
    pub errors: u64,
}

/// Shared scan session: settings, templates and state
#[derive(Debug)]
pub struct Session {
    pub settings: EngineSettings,
    pub templates: Arc<Vec<Template>>,
    pub scan: ScanState,
    pub stats: Stats,
}

pub type SharedSession = Arc<Mutex<Session>>;

impl Session {
    pub fn new(settings: EngineSettings) -> Self {
        let scan = ScanState::new(ScanMode::Off, &settings);
        Self {
            settings,
            templates: Arc::new(Vec::new()),
            scan,
            stats: Stats::default(),
        }
    }

    pub fn shared(self) -> SharedSession {
        Arc::new(Mutex::new(self))
    }

    pub fn mode(&self) -> ScanMode {
        self.scan.mode
    }

    /// Switch mode; scan state starts over on any actual change
    pub fn set_mode(&mut self, mode: ScanMode) -> bool {
        if self.scan.mode == mode {
            return false;
        }
        tracing::info!("Scan mode {} -> {}", self.scan.mode, mode);
        self.scan = ScanState::new(mode, &self.settings);
        true
    }

    pub fn load_templates(&mut self, templates: Vec<Template>) {
        tracing::info!("Loaded {} templates", templates.len());
        self.templates = Arc::new(templates);
        self.scan = ScanState::new(self.scan.mode, &self.settings);
    }

    pub fn apply_settings(&mut self, settings: EngineSettings) {
        self.settings = settings;
        self.scan = ScanState::new(self.scan.mode, &self.settings);
    }

    pub fn set_threshold(&mut self, threshold: f32) {
        self.settings.threshold = threshold.clamp(0.0, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blueclick_types::PostActionPolicy;

    #[test]
    fn test_script_threshold_overrides_global() {
        let config = Config {
            similarity_threshold: 0.7,
            ..Default::default()
        };
        let script = ScriptRecord {
            threshold: Some(0.85),
            scan_interval: 1.5,
            ..Default::default()
        };

        let settings = EngineSettings::from_config(&config, Some(&script));
        assert_eq!(settings.threshold, 0.85);
        assert_eq!(settings.scan_interval, Duration::from_millis(1500));

        let settings = EngineSettings::from_config(&config, None);
        assert_eq!(settings.threshold, 0.7);
        assert_eq!(settings.scan_interval, DEFAULT_SCAN_INTERVAL);
    }

    #[test]
    fn test_retry_script_maps_to_policy() {
        let script = ScriptRecord {
            retry_until_gone: true,
            retry_max: 5,
            ..Default::default()
        };
        let settings = EngineSettings::from_config(&Config::default(), Some(&script));
        assert!(matches!(
            settings.action.post,
            PostActionPolicy::RetryUntilGone { max_attempts: 5, .. }
        ));
    }

    #[test]
    fn test_cooldown_gate() {
        let mut settings = EngineSettings {
            cooldown: Duration::from_secs(1),
            ..Default::default()
        };
        let mut scan = ScanState::new(ScanMode::Auto, &settings);
        let now = Instant::now();
        assert!(!scan.cooling_down(&settings, now));

        scan.last_click = Some(now);
        assert!(scan.cooling_down(&settings, now + Duration::from_millis(500)));
        assert!(!scan.cooling_down(&settings, now + Duration::from_secs(1)));

        settings.continuous_click = true;
        assert!(!scan.cooling_down(&settings, now));
    }

    #[test]
    fn test_mode_change_resets_scan_state() {
        let mut session = Session::new(EngineSettings::default());
        assert!(session.set_mode(ScanMode::Auto));
        assert!(session.scan.auto_since.is_some());

        session.scan.idle_misses = 7;
        session.scan.last_hash = Some(42);
        assert!(!session.set_mode(ScanMode::Auto));
        assert_eq!(session.scan.idle_misses, 7);

        assert!(session.set_mode(ScanMode::Hotkey));
        assert_eq!(session.scan.idle_misses, 0);
        assert_eq!(session.scan.last_hash, None);
        assert_eq!(session.scan.auto_since, None);
    }
}
