use std::sync::Arc;
use std::time::Instant;

use blueclick_input::InputDriver;
use blueclick_types::{Match, PassSummary};
use blueclick_vision::{ColorBlob, ScreenSource, detect_blue, find_matches};
use tracing::{debug, trace, warn};

use crate::action::{ActionReport, Billing, Executor, Pacing, Trigger, pause};
use crate::error::EngineError;
use crate::policy::PolicyRunner;
use crate::roi::ScanPlan;
use crate::state::SharedSession;

/// What one find-and-act pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub roi: bool,
    /// Full-screen capture identical to the previous one, matching skipped
    pub unchanged: bool,
    /// Usable matches after suppression
    pub found: usize,
    pub suppressed: usize,
    pub cooldown_blocked: bool,
    pub acted: usize,
    pub billed: u64,
    pub retries: u32,
    /// Consecutive empty passes, this one included
    pub idle_misses: u32,
}

impl PassReport {
    pub fn hit(&self) -> bool {
        self.found > 0
    }

    pub fn summary(&self) -> PassSummary {
        PassSummary {
            roi: self.roi,
            found: self.found,
            acted: self.acted,
            retries: self.retries,
            suppressed: self.suppressed,
        }
    }
}

/// Runs find-and-act passes against a shared session
///
/// The session lock is held only to snapshot state and to commit results,
/// never across capture, matching or input.
#[derive(Clone)]
pub struct Engine {
    session: SharedSession,
    screen: Arc<dyn ScreenSource>,
    driver: Arc<dyn InputDriver>,
    pacing: Pacing,
}

impl Engine {
    pub fn new(
        session: SharedSession,
        screen: Arc<dyn ScreenSource>,
        driver: Arc<dyn InputDriver>,
    ) -> Self {
        Self {
            session,
            screen,
            driver,
            pacing: Pacing::default(),
        }
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    /// [`Engine::run_pass`] on the blocking pool
    pub async fn run_pass_async(&self, trigger: Trigger) -> Result<PassReport, EngineError> {
        let engine = self.clone();
        tokio::task::spawn_blocking(move || engine.run_pass(trigger)).await?
    }

    /// One capture, match and act cycle; blocks the calling thread
    ///
    /// Manual passes always scan the full screen. Background passes follow
    /// the ROI tracker and skip matching when the screen has not changed.
    pub fn run_pass(&self, trigger: Trigger) -> Result<PassReport, EngineError> {
        let bounds = match self.screen.monitor_bounds() {
            Ok(bounds) => bounds,
            Err(e) => {
                self.record_failure(None);
                return Err(e.into());
            }
        };

        let (settings, templates, plan, previous_hash) = {
            let mut session = self.session.blocking_lock();
            session.stats.passes += 1;
            let plan = match trigger {
                Trigger::Manual => ScanPlan {
                    region: bounds,
                    roi: false,
                },
                Trigger::Background => session.scan.roi.plan(bounds),
            };
            (
                session.settings.clone(),
                session.templates.clone(),
                plan,
                session.scan.last_hash,
            )
        };

        let mut report = PassReport {
            roi: plan.roi,
            ..Default::default()
        };
        if templates.is_empty() {
            trace!("No templates loaded, nothing to match");
            return Ok(report);
        }

        let frame = match self.screen.capture(plan.region) {
            Ok(frame) => frame,
            Err(e) => {
                self.record_failure(Some(&plan));
                return Err(e.into());
            }
        };

        let hash = (trigger == Trigger::Background && !plan.roi && settings.skip_unchanged)
            .then(|| frame.fingerprint());
        let matches = if hash.is_some() && hash == previous_hash {
            trace!("Screen unchanged, skipping match");
            report.unchanged = true;
            Vec::new()
        } else {
            find_matches(&frame, &templates, settings.threshold, settings.color_space)
        };
        drop(frame);

        // Commit the match result and reserve the cooldown before acting
        let targets: Vec<Match> = {
            let mut session = self.session.blocking_lock();
            let scan = &mut session.scan;

            let raw = matches.len();
            let targets: Vec<Match> = matches
                .into_iter()
                .filter(|m| !scan.suppression.is_suppressed(m.pos))
                .collect();
            report.suppressed = raw - targets.len();
            report.found = targets.len();

            scan.roi.record(&plan, targets.first().map(|m| m.pos));
            // Only an empty screen may be skipped next time
            scan.last_hash = if raw == 0 { hash } else { None };

            if targets.is_empty() {
                scan.idle_misses += 1;
                report.idle_misses = scan.idle_misses;
                return Ok(report);
            }
            scan.idle_misses = 0;

            let now = Instant::now();
            if scan.cooling_down(&settings, now) {
                debug!("{} targets found during cooldown", targets.len());
                report.cooldown_blocked = true;
                return Ok(report);
            }
            scan.last_click = Some(now);
            session.stats.matches += targets.len() as u64;
            targets
        };

        let executor = Executor::new(
            self.driver.as_ref(),
            &settings.action,
            &self.pacing,
            settings.input_lock,
        );
        let runner = PolicyRunner {
            executor: &executor,
            screen: self.screen.as_ref(),
            templates: &templates,
            settings: &settings,
        };

        let mut suppress = Vec::new();
        let mut follow_up_errors = 0u64;
        let mut failure = None;
        for (i, target) in targets.iter().enumerate() {
            if i > 0 {
                pause(settings.batch_spacing);
            }
            match runner.run(target, trigger) {
                Ok(outcome) => {
                    report.acted += 1;
                    report.billed += outcome.billed as u64;
                    report.retries += outcome.retries;
                    suppress.extend(outcome.suppress);
                    if outcome.follow_up_failed {
                        follow_up_errors += 1;
                    }
                }
                Err(e) => {
                    warn!("Action at {} failed: {e}", target.pos);
                    failure = Some(e);
                    break;
                }
            }
        }

        {
            let mut session = self.session.blocking_lock();
            session.stats.actions += report.acted as u64;
            session.stats.clicks += report.billed;
            session.stats.retries += report.retries as u64;
            session.stats.errors += follow_up_errors + failure.is_some() as u64;
            for point in suppress {
                session.scan.suppression.suppress(point);
            }
            session.scan.last_click = Some(Instant::now());
            session.scan.last_hash = None;
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// Click the largest blue region on screen, if there is one
    pub fn click_largest_blue(
        &self,
        trigger: Trigger,
    ) -> Result<Option<(ColorBlob, ActionReport)>, EngineError> {
        let frame = self.screen.capture_full()?;
        let Some(blob) = detect_blue(&frame).into_iter().next() else {
            debug!("No blue region found");
            return Ok(None);
        };

        let (action, input_lock) = {
            let session = self.session.blocking_lock();
            (session.settings.action.clone(), session.settings.input_lock)
        };
        let report = Executor::new(self.driver.as_ref(), &action, &self.pacing, input_lock)
            .execute(blob.center, trigger, Billing::Counted)?;

        {
            let mut session = self.session.blocking_lock();
            session.stats.actions += 1;
            session.stats.clicks += report.billed as u64;
        }
        Ok(Some((blob, report)))
    }

    fn record_failure(&self, plan: Option<&ScanPlan>) {
        let mut session = self.session.blocking_lock();
        session.stats.errors += 1;
        session.scan.idle_misses += 1;
        if let Some(plan) = plan {
            session.scan.roi.record(plan, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use blueclick_types::{ActionConfig, ActionPolicy, CaptureRegion, Point, PostActionPolicy, ScanMode};
    use blueclick_vision::Template;
    use image::{DynamicImage, Rgba, RgbaImage};

    use crate::fakes::{FakeDriver, FakeScreen};
    use crate::state::{EngineSettings, Session};

    const BACKGROUND: Rgba<u8> = Rgba([30, 30, 30, 255]);

    fn pattern() -> RgbaImage {
        RgbaImage::from_fn(16, 12, |x, y| {
            let v = ((x * 53 + y * 29) % 256) as u8;
            Rgba([v, 255 - v, ((x * y * 17) % 256) as u8, 255])
        })
    }

    fn screen_with(copies: &[(i64, i64)]) -> RgbaImage {
        let mut img = RgbaImage::from_pixel(360, 260, BACKGROUND);
        for &(x, y) in copies {
            image::imageops::replace(&mut img, &pattern(), x, y);
        }
        img
    }

    fn settings() -> EngineSettings {
        EngineSettings {
            action: ActionConfig {
                policy: ActionPolicy::SimpleClick {
                    count: 1,
                    interval: Duration::ZERO,
                    after_key: None,
                    after_key_count: 1,
                },
                post: PostActionPolicy::None,
                click_offset: 0,
                sound_enabled: false,
            },
            batch_spacing: Duration::ZERO,
            ..Default::default()
        }
    }

    struct Rig {
        engine: Engine,
        screen: Arc<FakeScreen>,
        driver: Arc<FakeDriver>,
    }

    fn rig(image: RgbaImage, settings: EngineSettings) -> Rig {
        let mut session = Session::new(settings);
        let template = Template::from_image("t", DynamicImage::ImageRgba8(pattern())).unwrap();
        session.load_templates(vec![template]);
        session.set_mode(ScanMode::Auto);

        let screen = Arc::new(FakeScreen::new(image));
        let driver = Arc::new(FakeDriver::new());
        let engine = Engine::new(session.shared(), screen.clone(), driver.clone())
            .with_pacing(Pacing::instant());
        Rig {
            engine,
            screen,
            driver,
        }
    }

    #[test]
    fn test_static_target_clicked_at_center() {
        let rig = rig(screen_with(&[(300, 200)]), settings());

        let report = rig.engine.run_pass(Trigger::Background).unwrap();
        assert_eq!(report.found, 1);
        assert_eq!(report.acted, 1);
        assert_eq!(rig.driver.clicks(), vec![Point::new(300 + 8, 200 + 6)]);

        let session = rig.engine.session().blocking_lock();
        assert_eq!(session.stats.clicks, 1);
        assert_eq!(session.scan.roi.last_hit(), Some(Point::new(308, 206)));
    }

    #[test]
    fn test_two_copies_one_pass_two_actions() {
        let rig = rig(screen_with(&[(20, 30), (250, 180)]), settings());

        let report = rig.engine.run_pass(Trigger::Background).unwrap();
        assert_eq!(report.acted, 2);
        let mut clicks = rig.driver.clicks();
        clicks.sort_by_key(|p| p.x);
        assert_eq!(clicks, vec![Point::new(28, 36), Point::new(258, 186)]);
    }

    #[test]
    fn test_cooldown_allows_one_action() {
        let rig = rig(
            screen_with(&[(100, 100)]),
            EngineSettings {
                cooldown: Duration::from_secs(60),
                ..settings()
            },
        );

        let first = rig.engine.run_pass(Trigger::Background).unwrap();
        let second = rig.engine.run_pass(Trigger::Background).unwrap();
        assert_eq!(first.acted, 1);
        assert_eq!(second.found, 1);
        assert!(second.cooldown_blocked);
        assert_eq!(rig.driver.clicks().len(), 1);
    }

    #[test]
    fn test_continuous_click_ignores_cooldown() {
        let rig = rig(
            screen_with(&[(100, 100)]),
            EngineSettings {
                cooldown: Duration::from_secs(60),
                continuous_click: true,
                ..settings()
            },
        );

        rig.engine.run_pass(Trigger::Background).unwrap();
        rig.engine.run_pass(Trigger::Background).unwrap();
        assert_eq!(rig.driver.clicks().len(), 2);
    }

    #[test]
    fn test_roi_used_after_hit() {
        let rig = rig(
            screen_with(&[(100, 100)]),
            EngineSettings {
                continuous_click: true,
                roi_margin: 50,
                ..settings()
            },
        );

        rig.engine.run_pass(Trigger::Background).unwrap();
        let second = rig.engine.run_pass(Trigger::Background).unwrap();
        assert!(second.roi);
        assert_eq!(second.acted, 1);
        assert_eq!(
            rig.screen.captures()[1],
            CaptureRegion::new(108 - 50, 106 - 50, 100, 100)
        );
        assert_eq!(rig.driver.clicks(), vec![Point::new(108, 106); 2]);
    }

    #[test]
    fn test_manual_pass_scans_full_screen() {
        let rig = rig(
            screen_with(&[(100, 100)]),
            EngineSettings {
                continuous_click: true,
                ..settings()
            },
        );

        rig.engine.run_pass(Trigger::Background).unwrap();
        let manual = rig.engine.run_pass(Trigger::Manual).unwrap();
        assert!(!manual.roi);
        assert_eq!(rig.screen.captures()[1], CaptureRegion::new(0, 0, 360, 260));
    }

    #[test]
    fn test_unchanged_empty_screen_skips_matching() {
        let rig = rig(screen_with(&[]), settings());

        let first = rig.engine.run_pass(Trigger::Background).unwrap();
        let second = rig.engine.run_pass(Trigger::Background).unwrap();
        assert!(!first.unchanged);
        assert!(second.unchanged);
        assert_eq!(second.idle_misses, 2);

        rig.screen.set_image(screen_with(&[(40, 40)]));
        let third = rig.engine.run_pass(Trigger::Background).unwrap();
        assert!(!third.unchanged);
        assert_eq!(third.acted, 1);
        assert_eq!(third.idle_misses, 0);
    }

    #[test]
    fn test_capture_error_counts_as_miss() {
        let rig = rig(screen_with(&[(100, 100)]), settings());
        rig.screen.fail_next(1);

        assert!(matches!(
            rig.engine.run_pass(Trigger::Background),
            Err(EngineError::Capture(_))
        ));
        {
            let session = rig.engine.session().blocking_lock();
            assert_eq!(session.stats.errors, 1);
            assert_eq!(session.scan.idle_misses, 1);
        }

        let report = rig.engine.run_pass(Trigger::Background).unwrap();
        assert_eq!(report.acted, 1);
    }

    #[test]
    fn test_suppressed_target_skipped_until_expiry() {
        let rig = rig(
            screen_with(&[(100, 100)]),
            EngineSettings {
                suppression_window: Duration::from_millis(50),
                continuous_click: true,
                ..settings()
            },
        );
        rig.engine
            .session()
            .blocking_lock()
            .scan
            .suppression
            .suppress(Point::new(150, 130));

        let blocked = rig.engine.run_pass(Trigger::Background).unwrap();
        assert_eq!(blocked.found, 0);
        assert_eq!(blocked.suppressed, 1);
        assert!(rig.driver.clicks().is_empty());

        std::thread::sleep(Duration::from_millis(80));
        let after = rig.engine.run_pass(Trigger::Background).unwrap();
        assert_eq!(after.acted, 1);
    }

    #[test]
    fn test_retry_budget_exhaustion_suppresses_target() {
        let mut settings = settings();
        settings.continuous_click = true;
        settings.action.post = PostActionPolicy::RetryUntilGone {
            delay: Duration::ZERO,
            max_attempts: 3,
        };
        let rig = rig(screen_with(&[(100, 100)]), settings);

        let report = rig.engine.run_pass(Trigger::Background).unwrap();
        assert_eq!(report.retries, 3);
        assert_eq!(report.billed, 1);
        assert_eq!(rig.driver.clicks().len(), 4);

        let next = rig.engine.run_pass(Trigger::Background).unwrap();
        assert_eq!(next.acted, 0);
        assert_eq!(next.suppressed, 1);
        assert_eq!(rig.driver.clicks().len(), 4);
    }

    #[test]
    fn test_every_stubborn_target_is_suppressed() {
        let mut settings = settings();
        settings.continuous_click = true;
        settings.action.post = PostActionPolicy::RetryUntilGone {
            delay: Duration::ZERO,
            max_attempts: 2,
        };
        let rig = rig(screen_with(&[(20, 30), (250, 180)]), settings);

        let first = rig.engine.run_pass(Trigger::Background).unwrap();
        assert_eq!(first.acted, 2);
        assert_eq!(first.retries, 4);
        assert_eq!(rig.driver.clicks().len(), 6);

        // Full screen so both positions are in view again
        let second = rig.engine.run_pass(Trigger::Manual).unwrap();
        assert_eq!(second.acted, 0);
        assert_eq!(second.suppressed, 2);
        assert_eq!(rig.driver.clicks().len(), 6);
    }

    #[test]
    fn test_no_templates_no_capture() {
        let screen = Arc::new(FakeScreen::new(screen_with(&[(100, 100)])));
        let engine = Engine::new(
            Session::new(settings()).shared(),
            screen.clone(),
            Arc::new(FakeDriver::new()),
        );

        let report = engine.run_pass(Trigger::Background).unwrap();
        assert_eq!(report, PassReport::default());
        assert!(screen.captures().is_empty());
    }

    #[test]
    fn test_click_largest_blue() {
        let mut img = RgbaImage::from_pixel(200, 150, Rgba([240, 240, 240, 255]));
        for x in 50..80 {
            for y in 40..70 {
                img.put_pixel(x, y, Rgba([0, 0, 255, 255]));
            }
        }
        let rig = rig(img, settings());

        let (blob, report) = rig
            .engine
            .click_largest_blue(Trigger::Manual)
            .unwrap()
            .unwrap();
        assert_eq!(report.target, blob.center);
        assert_eq!(rig.driver.clicks(), vec![blob.center]);
    }
}
