//! Follow-up after an action: verify once, or keep retrying until the target is gone.

use blueclick_types::{CaptureRegion, Match, Point, PostActionPolicy};
use blueclick_vision::{ScreenSource, Template, find_matches};
use tracing::{debug, info, warn};

use crate::action::{Billing, Executor, Trigger, pause};
use crate::error::EngineError;
use crate::state::EngineSettings;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyOutcome {
    pub clicks: u32,
    /// Clicks to add to the lifetime counter
    pub billed: u32,
    pub retries: u32,
    pub confirmed: bool,
    /// Position to exclude for the suppression window
    pub suppress: Option<Point>,
    /// A follow-up step failed and was abandoned
    pub follow_up_failed: bool,
}

pub struct PolicyRunner<'a> {
    pub executor: &'a Executor<'a>,
    pub screen: &'a dyn ScreenSource,
    pub templates: &'a [Template],
    pub settings: &'a EngineSettings,
}

impl PolicyRunner<'_> {
    /// Act on `target` once, then apply the configured follow-up
    ///
    /// Only the first execution can fail the call; follow-up errors are
    /// logged and reported through [`PolicyOutcome::follow_up_failed`].
    pub fn run(&self, target: &Match, trigger: Trigger) -> Result<PolicyOutcome, EngineError> {
        let first = self.executor.execute(target.pos, trigger, Billing::Counted)?;
        let mut outcome = PolicyOutcome {
            clicks: first.clicks,
            billed: first.billed,
            ..Default::default()
        };

        if let Err(e) = self.follow_up(target, trigger, &mut outcome) {
            warn!("Follow-up at {} abandoned: {e}", target.pos);
            outcome.follow_up_failed = true;
        }
        Ok(outcome)
    }

    fn follow_up(
        &self,
        target: &Match,
        trigger: Trigger,
        outcome: &mut PolicyOutcome,
    ) -> Result<(), EngineError> {
        match &self.executor.config().post {
            PostActionPolicy::None => Ok(()),
            PostActionPolicy::VerifyOnce { delay, key } => {
                pause(*delay);
                if self.present_anywhere()? {
                    debug!("Target still on screen, sending '{}'", key);
                    self.executor.confirm(key)?;
                    outcome.confirmed = true;
                }
                Ok(())
            }
            PostActionPolicy::RetryUntilGone {
                delay,
                max_attempts,
            } => {
                for attempt in 1..=*max_attempts {
                    pause(*delay);
                    if !self.present_near(target)? {
                        debug!("Target at {} gone after {} retries", target.pos, attempt - 1);
                        return Ok(());
                    }
                    let report = self.executor.execute(target.pos, trigger, Billing::Retry)?;
                    outcome.clicks += report.clicks;
                    outcome.retries += 1;
                }

                pause(*delay);
                if self.present_near(target)? {
                    info!(
                        "Target at {} persisted through {} retries",
                        target.pos, max_attempts
                    );
                    outcome.suppress = Some(target.pos);
                }
                Ok(())
            }
        }
    }

    fn present_anywhere(&self) -> Result<bool, EngineError> {
        let frame = self.screen.capture_full()?;
        let matches = find_matches(
            &frame,
            self.templates,
            self.settings.threshold,
            self.settings.color_space,
        );
        Ok(!matches.is_empty())
    }

    /// Look for the same template in a small window around the target
    fn present_near(&self, target: &Match) -> Result<bool, EngineError> {
        let margin = target.template_width.max(target.template_height);
        let bounds = self.screen.monitor_bounds()?;
        let Some(region) = CaptureRegion::around(target.pos, margin).clip_to(&bounds) else {
            return Ok(false);
        };

        let frame = self.screen.capture(region)?;
        let templates = match self.templates.get(target.template_index) {
            Some(template) => std::slice::from_ref(template),
            None => self.templates,
        };
        let matches = find_matches(
            &frame,
            templates,
            self.settings.threshold,
            self.settings.color_space,
        );
        Ok(matches
            .iter()
            .any(|m| m.pos.distance(target.pos) <= target.dedup_radius()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use blueclick_input::VirtualKey;
    use blueclick_types::{ActionConfig, ActionPolicy};
    use blueclick_vision::{ColorSpace, find_matches};
    use image::{DynamicImage, Rgba, RgbaImage};

    use crate::action::Pacing;
    use crate::fakes::{FakeDriver, FakeScreen};

    fn pattern() -> RgbaImage {
        RgbaImage::from_fn(16, 12, |x, y| {
            let v = ((x * 53 + y * 29) % 256) as u8;
            Rgba([v, 255 - v, ((x * y * 17) % 256) as u8, 255])
        })
    }

    fn screen_with_target() -> (Arc<FakeScreen>, Template) {
        let tpl = pattern();
        let mut img = RgbaImage::from_pixel(360, 260, Rgba([30, 30, 30, 255]));
        image::imageops::replace(&mut img, &tpl, 300, 200);
        let template = Template::from_image("t", DynamicImage::ImageRgba8(tpl)).unwrap();
        (Arc::new(FakeScreen::new(img)), template)
    }

    fn first_match(screen: &FakeScreen, template: &Template) -> Match {
        let frame = screen.capture_full().unwrap();
        find_matches(&frame, std::slice::from_ref(template), 0.7, ColorSpace::Color)[0]
    }

    fn config(post: PostActionPolicy) -> ActionConfig {
        ActionConfig {
            policy: ActionPolicy::SimpleClick {
                count: 1,
                interval: Duration::ZERO,
                after_key: None,
                after_key_count: 1,
            },
            post,
            click_offset: 0,
            sound_enabled: false,
        }
    }

    fn erase(screen: &FakeScreen) {
        screen.set_image(RgbaImage::from_pixel(360, 260, Rgba([30, 30, 30, 255])));
    }

    #[test]
    fn test_retry_exhausts_budget_then_suppresses() {
        let (screen, template) = screen_with_target();
        let target = first_match(&screen, &template);
        let driver = FakeDriver::new();
        let action = config(PostActionPolicy::RetryUntilGone {
            delay: Duration::ZERO,
            max_attempts: 4,
        });
        let pacing = Pacing::instant();
        let settings = EngineSettings::default();
        let executor = Executor::new(&driver, &action, &pacing, false);
        let templates = [template];

        let outcome = PolicyRunner {
            executor: &executor,
            screen: screen.as_ref(),
            templates: &templates,
            settings: &settings,
        }
        .run(&target, Trigger::Background)
        .unwrap();

        assert_eq!(outcome.retries, 4);
        assert_eq!(driver.clicks().len(), 5);
        assert_eq!(outcome.billed, 1);
        assert_eq!(outcome.suppress, Some(target.pos));
    }

    #[test]
    fn test_retry_stops_when_target_disappears() {
        let (screen, template) = screen_with_target();
        let target = first_match(&screen, &template);
        let driver = FakeDriver::new();
        let clicked = screen.clone();
        driver.on_click(move |_| erase(&clicked));

        let action = config(PostActionPolicy::RetryUntilGone {
            delay: Duration::ZERO,
            max_attempts: 3,
        });
        let pacing = Pacing::instant();
        let settings = EngineSettings::default();
        let executor = Executor::new(&driver, &action, &pacing, false);
        let templates = [template];

        let outcome = PolicyRunner {
            executor: &executor,
            screen: screen.as_ref(),
            templates: &templates,
            settings: &settings,
        }
        .run(&target, Trigger::Background)
        .unwrap();

        assert_eq!(outcome.retries, 0);
        assert_eq!(driver.clicks().len(), 1);
        assert_eq!(outcome.suppress, None);
    }

    #[test]
    fn test_retry_stops_partway_when_target_goes() {
        let (screen, template) = screen_with_target();
        let target = first_match(&screen, &template);
        let driver = FakeDriver::new();
        let clicked = screen.clone();
        let count = AtomicU32::new(0);
        driver.on_click(move |_| {
            if count.fetch_add(1, Ordering::SeqCst) + 1 == 3 {
                erase(&clicked);
            }
        });

        let action = config(PostActionPolicy::RetryUntilGone {
            delay: Duration::ZERO,
            max_attempts: 4,
        });
        let pacing = Pacing::instant();
        let settings = EngineSettings::default();
        let executor = Executor::new(&driver, &action, &pacing, false);
        let templates = [template];

        let outcome = PolicyRunner {
            executor: &executor,
            screen: screen.as_ref(),
            templates: &templates,
            settings: &settings,
        }
        .run(&target, Trigger::Background)
        .unwrap();

        assert_eq!(outcome.retries, 2);
        assert_eq!(outcome.clicks, 3);
        assert_eq!(outcome.billed, 1);
        assert_eq!(driver.clicks().len(), 3);
        assert_eq!(outcome.suppress, None);
    }

    #[test]
    fn test_verify_sends_key_while_present() {
        let (screen, template) = screen_with_target();
        let target = first_match(&screen, &template);
        let driver = FakeDriver::new();
        let action = config(PostActionPolicy::VerifyOnce {
            delay: Duration::ZERO,
            key: "enter".into(),
        });
        let pacing = Pacing::instant();
        let settings = EngineSettings::default();
        let executor = Executor::new(&driver, &action, &pacing, false);
        let templates = [template];
        let runner = PolicyRunner {
            executor: &executor,
            screen: screen.as_ref(),
            templates: &templates,
            settings: &settings,
        };

        let outcome = runner.run(&target, Trigger::Background).unwrap();
        assert!(outcome.confirmed);
        assert_eq!(driver.keys(), vec![VirtualKey::ENTER]);

        erase(&screen);
        let outcome = runner.run(&target, Trigger::Background).unwrap();
        assert!(!outcome.confirmed);
        assert_eq!(driver.keys(), vec![VirtualKey::ENTER]);
    }

    #[test]
    fn test_follow_up_capture_failure_keeps_first_action() {
        let (screen, template) = screen_with_target();
        let target = first_match(&screen, &template);
        let driver = FakeDriver::new();
        let action = config(PostActionPolicy::RetryUntilGone {
            delay: Duration::ZERO,
            max_attempts: 2,
        });
        let pacing = Pacing::instant();
        let settings = EngineSettings::default();
        let executor = Executor::new(&driver, &action, &pacing, false);
        let templates = [template];

        screen.fail_next(1);
        let outcome = PolicyRunner {
            executor: &executor,
            screen: screen.as_ref(),
            templates: &templates,
            settings: &settings,
        }
        .run(&target, Trigger::Background)
        .unwrap();

        assert!(outcome.follow_up_failed);
        assert_eq!(outcome.billed, 1);
        assert_eq!(outcome.suppress, None);
    }
}
