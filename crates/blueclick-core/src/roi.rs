use blueclick_types::{CaptureRegion, Point};

/// Region chosen for one pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanPlan {
    pub region: CaptureRegion,
    /// `true` when `region` is a window around the last hit
    pub roi: bool,
}

/// Narrows scans to the neighbourhood of the last hit until it keeps missing
#[derive(Debug, Clone)]
pub struct RoiTracker {
    margin: u32,
    fallback_after: u32,
    last_hit: Option<Point>,
    misses: u32,
}

impl RoiTracker {
    pub fn new(margin: u32, fallback_after: u32) -> Self {
        Self {
            margin,
            fallback_after,
            last_hit: None,
            misses: 0,
        }
    }

    pub fn last_hit(&self) -> Option<Point> {
        self.last_hit
    }

    pub fn misses(&self) -> u32 {
        self.misses
    }

    pub fn plan(&self, bounds: CaptureRegion) -> ScanPlan {
        let roi = self
            .last_hit
            .filter(|_| self.misses < self.fallback_after)
            .and_then(|hit| CaptureRegion::around(hit, self.margin).clip_to(&bounds));

        match roi {
            Some(region) => ScanPlan { region, roi: true },
            None => ScanPlan {
                region: bounds,
                roi: false,
            },
        }
    }

    /// Update after a pass ran with `plan`; `hit` is the first usable match
    pub fn record(&mut self, plan: &ScanPlan, hit: Option<Point>) {
        match hit {
            Some(point) => {
                self.last_hit = Some(point);
                self.misses = 0;
            }
            None if plan.roi => self.misses += 1,
            // Full-screen miss: last hit stays stale until a full scan succeeds
            None => {}
        }
    }

    pub fn reset(&mut self) {
        self.last_hit = None;
        self.misses = 0;
    }
}
