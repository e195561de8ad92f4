use std::time::{Duration, Instant};

use blueclick_types::Point;

/// Temporary exclusion zones around targets that would not go away
#[derive(Debug, Clone)]
pub struct Suppression {
    radius: f64,
    window: Duration,
    entries: Vec<(Point, Instant)>,
}

impl Suppression {
    pub fn new(radius: f64, window: Duration) -> Self {
        Self {
            radius,
            window,
            entries: Vec::new(),
        }
    }

    pub fn suppress(&mut self, point: Point) {
        self.suppress_at(point, Instant::now());
    }

    /// Add a zone; one already covering `point` has its window restarted
    pub fn suppress_at(&mut self, point: Point, now: Instant) {
        tracing::info!("Suppressing {} for {:?}", point, self.window);
        self.entries
            .retain(|(center, _)| center.distance(point) > self.radius);
        self.entries.push((point, now));
    }

    pub fn is_suppressed(&mut self, point: Point) -> bool {
        self.is_suppressed_at(point, Instant::now())
    }

    /// Expired entries are dropped on lookup
    pub fn is_suppressed_at(&mut self, point: Point, now: Instant) -> bool {
        self.prune(now);
        self.entries
            .iter()
            .any(|(center, _)| center.distance(point) <= self.radius)
    }

    fn prune(&mut self, now: Instant) {
        let window = self.window;
        self.entries.retain(|(center, since)| {
            let live = now.saturating_duration_since(*since) < window;
            if !live {
                tracing::debug!("Suppression around {} expired", center);
            }
            live
        });
    }

    /// Centers of the zones added so far, expired ones included until the next lookup
    pub fn active(&self) -> Vec<Point> {
        self.entries.iter().map(|(point, _)| *point).collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
