//! Color-region detection: threshold in HSV, clean up, label connected areas.

use std::collections::HashMap;

use blueclick_types::{CaptureRegion, Point};
use image::{GrayImage, Luma, Rgba};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{close, open};
use imageproc::region_labelling::{Connectivity, connected_components};
use tracing::debug;

use crate::capture::Frame;

/// Blobs smaller than this many pixels are noise
pub const MIN_BLOB_AREA: u32 = 100;

/// Inclusive HSV bounds, hue on the 0..180 scale
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HsvRange {
    pub hue: (u8, u8),
    pub saturation: (u8, u8),
    pub value: (u8, u8),
}

impl HsvRange {
    pub const BLUE: HsvRange = HsvRange {
        hue: (100, 130),
        saturation: (100, 255),
        value: (50, 255),
    };

    pub fn contains(&self, (h, s, v): (u8, u8, u8)) -> bool {
        (self.hue.0..=self.hue.1).contains(&h)
            && (self.saturation.0..=self.saturation.1).contains(&s)
            && (self.value.0..=self.value.1).contains(&v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorBlob {
    /// Centroid in screen coordinates
    pub center: Point,
    pub bounds: CaptureRegion,
    pub area: u32,
}

/// 8-bit HSV with hue halved to fit a byte
fn to_hsv(Rgba([r, g, b, _]): Rgba<u8>) -> (u8, u8, u8) {
    let (rf, gf, bf) = (r as f32, g as f32, b as f32);
    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let delta = max - min;

    let s = if max > 0.0 { delta / max * 255.0 } else { 0.0 };
    let mut h = if delta == 0.0 {
        0.0
    } else if max == rf {
        60.0 * (gf - bf) / delta
    } else if max == gf {
        120.0 + 60.0 * (bf - rf) / delta
    } else {
        240.0 + 60.0 * (rf - gf) / delta
    };
    if h < 0.0 {
        h += 360.0;
    }

    // 359.x rounds up to 180, which is red again
    (((h / 2.0).round() as u32 % 180) as u8, s.round() as u8, max as u8)
}

fn color_mask(frame: &Frame, range: &HsvRange) -> GrayImage {
    GrayImage::from_fn(frame.width(), frame.height(), |x, y| {
        if range.contains(to_hsv(*frame.image.get_pixel(x, y))) {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

#[derive(Default)]
struct Accumulator {
    area: u32,
    sum_x: u64,
    sum_y: u64,
    min: (u32, u32),
    max: (u32, u32),
}

impl Accumulator {
    fn add(&mut self, x: u32, y: u32) {
        if self.area == 0 {
            self.min = (x, y);
            self.max = (x, y);
        }
        self.area += 1;
        self.sum_x += x as u64;
        self.sum_y += y as u64;
        self.min = (self.min.0.min(x), self.min.1.min(y));
        self.max = (self.max.0.max(x), self.max.1.max(y));
    }

    fn into_blob(self, origin: Point) -> ColorBlob {
        let cx = (self.sum_x as f64 / self.area as f64).round() as i32;
        let cy = (self.sum_y as f64 / self.area as f64).round() as i32;
        ColorBlob {
            center: origin.offset(cx, cy),
            bounds: CaptureRegion::new(
                origin.x + self.min.0 as i32,
                origin.y + self.min.1 as i32,
                self.max.0 - self.min.0 + 1,
                self.max.1 - self.min.1 + 1,
            ),
            area: self.area,
        }
    }
}

/// Connected regions inside `range`, largest first
pub fn detect_blobs(frame: &Frame, range: &HsvRange, min_area: u32) -> Vec<ColorBlob> {
    let mask = color_mask(frame, range);
    let mask = close(&open(&mask, Norm::L1, 2), Norm::L1, 2);
    let labels = connected_components(&mask, Connectivity::Eight, Luma([0u8]));

    let mut regions: HashMap<u32, Accumulator> = HashMap::new();
    for (x, y, label) in labels.enumerate_pixels() {
        if label.0[0] != 0 {
            regions.entry(label.0[0]).or_default().add(x, y);
        }
    }

    let mut blobs: Vec<ColorBlob> = regions
        .into_values()
        .filter(|acc| acc.area >= min_area)
        .map(|acc| acc.into_blob(frame.origin))
        .collect();
    blobs.sort_by(|a, b| b.area.cmp(&a.area));

    debug!("Detected {} color blobs", blobs.len());
    blobs
}

pub fn detect_blue(frame: &Frame) -> Vec<ColorBlob> {
    detect_blobs(frame, &HsvRange::BLUE, MIN_BLOB_AREA)
}
