use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use blueclick_types::{CaptureRegion, Point};
use image::RgbaImage;
use image::imageops::{self, FilterType};

use crate::error::CaptureError;

/// Size frames are reduced to before hashing
const FINGERPRINT_SIZE: (u32, u32) = (160, 90);

/// A captured bitmap and where it sits on screen
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbaImage,
    pub origin: Point,
}

impl Frame {
    pub fn new(image: RgbaImage, origin: Point) -> Self {
        Self { image, origin }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn region(&self) -> CaptureRegion {
        CaptureRegion::new(self.origin.x, self.origin.y, self.width(), self.height())
    }

    /// Sub-frame for an absolute screen region, clipped to this frame
    pub fn crop(&self, region: CaptureRegion) -> Option<Frame> {
        let clipped = region.clip_to(&self.region())?;
        let image = imageops::crop_imm(
            &self.image,
            (clipped.x - self.origin.x) as u32,
            (clipped.y - self.origin.y) as u32,
            clipped.width,
            clipped.height,
        )
        .to_image();
        Some(Frame::new(image, clipped.origin()))
    }

    /// Cheap content hash used to skip matching on an unchanged screen
    pub fn fingerprint(&self) -> u64 {
        let (w, h) = FINGERPRINT_SIZE;
        let small = imageops::resize(&self.image, w, h, FilterType::Nearest);
        let mut hasher = DefaultHasher::new();
        small.as_raw().hash(&mut hasher);
        hasher.finish()
    }
}

/// Source of screen pixels
pub trait ScreenSource: Send + Sync {
    /// Bounds of the monitor scans run against
    fn monitor_bounds(&self) -> Result<CaptureRegion, CaptureError>;

    /// Capture an absolute screen region inside [`ScreenSource::monitor_bounds`]
    fn capture(&self, region: CaptureRegion) -> Result<Frame, CaptureError>;

    /// Capture the whole monitor
    fn capture_full(&self) -> Result<Frame, CaptureError> {
        let bounds = self.monitor_bounds()?;
        self.capture(bounds)
    }
}

/// Primary monitor capture through xcap
#[cfg(windows)]
pub struct XcapScreen;

#[cfg(windows)]
impl XcapScreen {
    fn primary_monitor() -> Result<xcap::Monitor, CaptureError> {
        let monitors = xcap::Monitor::all().map_err(|e| CaptureError::Monitors(e.to_string()))?;
        monitors.into_iter().next().ok_or(CaptureError::NoMonitor)
    }

    fn bounds_of(monitor: &xcap::Monitor) -> CaptureRegion {
        CaptureRegion::new(monitor.x(), monitor.y(), monitor.width(), monitor.height())
    }
}

#[cfg(windows)]
impl ScreenSource for XcapScreen {
    fn monitor_bounds(&self) -> Result<CaptureRegion, CaptureError> {
        Ok(Self::bounds_of(&Self::primary_monitor()?))
    }

    fn capture(&self, region: CaptureRegion) -> Result<Frame, CaptureError> {
        let monitor = Self::primary_monitor()?;
        let bounds = Self::bounds_of(&monitor);
        let region = region
            .clip_to(&bounds)
            .ok_or(CaptureError::OutOfBounds(region))?;

        let captured = monitor
            .capture_image()
            .map_err(|e| CaptureError::Capture(e.to_string()))?;
        let (width, height) = (captured.width(), captured.height());
        let full = RgbaImage::from_raw(width, height, captured.into_raw())
            .ok_or_else(|| CaptureError::Capture("capture buffer size mismatch".into()))?;

        let frame = Frame::new(full, bounds.origin());
        if region == bounds {
            return Ok(frame);
        }
        frame.crop(region).ok_or(CaptureError::OutOfBounds(region))
    }
}

/// Platform capture backend
pub fn default_screen() -> Result<Arc<dyn ScreenSource>, CaptureError> {
    #[cfg(windows)]
    {
        Ok(Arc::new(XcapScreen))
    }
    #[cfg(not(windows))]
    {
        Err(CaptureError::Unsupported)
    }
}
