use std::sync::Arc;
use std::time::Duration;

use blueclick_config::Config;
use blueclick_core::action::Pacing;
use blueclick_core::fakes::{FakeDriver, FakeScreen};
use blueclick_core::{Engine, EngineSettings, Session};
use blueclick_types::{ActionConfig, ActionPolicy, AppEvent, PostActionPolicy};
use blueclick_vision::Template;
use image::{DynamicImage, Rgba, RgbaImage};
use kanal::{AsyncReceiver, AsyncSender};
use tokio_util::sync::CancellationToken;

use crate::events::event_loop;
use crate::profile::ProfilePaths;
use crate::state::AppState;

mod channel_tests;
mod event_loop_tests;

pub fn pattern() -> RgbaImage {
    RgbaImage::from_fn(16, 12, |x, y| {
        let v = ((x * 53 + y * 29) % 256) as u8;
        Rgba([v, 255 - v, ((x * y * 17) % 256) as u8, 255])
    })
}

/// 200x150 screen with the pattern at (60, 50), centered on (68, 56)
pub fn screen_with_target() -> RgbaImage {
    let mut img = RgbaImage::from_pixel(200, 150, Rgba([30, 30, 30, 255]));
    image::imageops::replace(&mut img, &pattern(), 60, 50);
    img
}

pub fn quick_action() -> ActionConfig {
    ActionConfig {
        policy: ActionPolicy::SimpleClick {
            count: 1,
            interval: Duration::ZERO,
            after_key: None,
            after_key_count: 1,
        },
        post: PostActionPolicy::None,
        click_offset: 0,
        sound_enabled: false,
    }
}

pub struct Harness {
    pub state: Arc<AppState>,
    pub driver: Arc<FakeDriver>,
    pub control: AsyncSender<AppEvent>,
    pub status: AsyncReceiver<AppEvent>,
    pub cancel: CancellationToken,
    _profile: tempfile::TempDir,
}

impl Harness {
    pub fn new(image: RgbaImage, with_template: bool) -> Self {
        let mut session = Session::new(EngineSettings {
            scan_interval: Duration::from_millis(20),
            cooldown: Duration::from_secs(60),
            action: quick_action(),
            ..Default::default()
        });
        if with_template {
            session.load_templates(vec![
                Template::from_image("t", DynamicImage::ImageRgba8(pattern())).unwrap(),
            ]);
        }

        let driver = Arc::new(FakeDriver::new());
        let engine = Engine::new(
            session.shared(),
            Arc::new(FakeScreen::new(image)),
            driver.clone(),
        )
        .with_pacing(Pacing::instant());

        let profile = tempfile::tempdir().unwrap();
        let state = Arc::new(AppState::new(
            Config::default(),
            ProfilePaths::new(profile.path()),
            engine,
        ));

        let (control, control_rx) = kanal::bounded_async(64);
        let (status_tx, status) = kanal::bounded_async(256);
        let cancel = CancellationToken::new();
        tokio::spawn(event_loop(
            state.clone(),
            control_rx,
            status_tx,
            cancel.clone(),
        ));

        Self {
            state,
            driver,
            control,
            status,
            cancel,
            _profile: profile,
        }
    }

    pub async fn send(&self, event: AppEvent) {
        self.control.send(event).await.unwrap();
    }

    /// Next status event matching `pred`, skipping the rest
    pub async fn expect(&self, pred: impl Fn(&AppEvent) -> bool) -> AppEvent {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let event = self.status.recv().await.unwrap();
                if pred(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("timed out waiting for status event")
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
