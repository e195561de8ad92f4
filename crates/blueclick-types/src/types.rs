use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Absolute screen position in physical pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: Point) -> f64 {
        let dx = (self.x - other.x) as f64;
        let dy = (self.y - other.y) as f64;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn offset(&self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRegion {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl CaptureRegion {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Square of `2 * margin` centered on `center`, before any clipping
    pub fn around(center: Point, margin: u32) -> Self {
        let margin_i = margin as i32;
        Self {
            x: center.x - margin_i,
            y: center.y - margin_i,
            width: margin * 2,
            height: margin * 2,
        }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width as i32
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height as i32
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn center(&self) -> Point {
        Point::new(
            self.x + (self.width / 2) as i32,
            self.y + (self.height / 2) as i32,
        )
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x && point.x < self.right() && point.y >= self.y && point.y < self.bottom()
    }

    /// Intersection with `bounds`, `None` when they do not overlap
    pub fn clip_to(&self, bounds: &CaptureRegion) -> Option<CaptureRegion> {
        let left = self.x.max(bounds.x);
        let top = self.y.max(bounds.y);
        let right = self.right().min(bounds.right());
        let bottom = self.bottom().min(bounds.bottom());

        if right <= left || bottom <= top {
            return None;
        }

        Some(CaptureRegion {
            x: left,
            y: top,
            width: (right - left) as u32,
            height: (bottom - top) as u32,
        })
    }
}

/// One template hit from a single matching pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    /// Template center in absolute screen coordinates
    pub pos: Point,
    /// Zero-mean normalized correlation in `[0, 1]`
    pub score: f32,
    /// Index into the template set that produced the hit
    pub template_index: usize,
    pub template_width: u32,
    pub template_height: u32,
}

impl Match {
    /// Minimum distance another hit must keep from this one to count as a separate object
    pub fn dedup_radius(&self) -> f64 {
        self.template_width.max(self.template_height) as f64 * 0.8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    #[default]
    Off,
    Hotkey,
    Auto,
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScanMode::Off => "off",
            ScanMode::Hotkey => "hotkey",
            ScanMode::Auto => "auto",
        };
        f.write_str(name)
    }
}

impl FromStr for ScanMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(ScanMode::Off),
            "hotkey" => Ok(ScanMode::Hotkey),
            "auto" => Ok(ScanMode::Auto),
            other => Err(format!("unknown scan mode '{other}'")),
        }
    }
}

/// What happens at a target once it is found
#[derive(Debug, Clone, PartialEq)]
pub enum ActionPolicy {
    SimpleClick {
        count: u32,
        interval: Duration,
        after_key: Option<String>,
        after_key_count: u32,
    },
    /// One click to move input focus, then keystrokes only
    FocusAndKey { key: Option<String>, key_count: u32 },
}

/// Follow-up after the first execution of an [`ActionPolicy`]
#[derive(Debug, Clone, PartialEq)]
pub enum PostActionPolicy {
    None,
    VerifyOnce { delay: Duration, key: String },
    RetryUntilGone { delay: Duration, max_attempts: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionConfig {
    pub policy: ActionPolicy,
    pub post: PostActionPolicy,
    /// Jitter radius in pixels, 0 disables it
    pub click_offset: u32,
    pub sound_enabled: bool,
}

impl ActionConfig {
    pub fn is_focus_mode(&self) -> bool {
        matches!(self.policy, ActionPolicy::FocusAndKey { .. })
    }
}

impl Default for ActionConfig {
    fn default() -> Self {
        Self {
            policy: ActionPolicy::SimpleClick {
                count: 1,
                interval: Duration::from_millis(100),
                after_key: None,
                after_key_count: 1,
            },
            post: PostActionPolicy::None,
            click_offset: 0,
            sound_enabled: false,
        }
    }
}

/// Summary of one find-and-act pass, published to listeners
#[derive(Debug, Clone, Default)]
pub struct PassSummary {
    pub roi: bool,
    pub found: usize,
    pub acted: usize,
    pub retries: u32,
    pub suppressed: usize,
}

#[derive(Debug, Clone)]
pub enum AppEvent {
    SetMode(ScanMode),
    /// Trigger hotkey pressed
    HotkeyTriggered,
    /// Stop hotkey pressed
    StopRequested,
    LoadScript(PathBuf),
    ScriptLoaded {
        name: String,
        templates: usize,
    },
    UpdateThreshold(f32),
    PassCompleted(PassSummary),
    PassFailed(String),
    StatusUpdate {
        status: String,
        mode: ScanMode,
    },
    Shutdown,
}
