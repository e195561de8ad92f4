//! In-memory screen and input driver.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use blueclick_input::{InputDriver, InputError, VirtualKey, WindowHandle};
use blueclick_types::{CaptureRegion, Point};
use blueclick_vision::{CaptureError, Frame, ScreenSource};
use image::RgbaImage;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Screen backed by a single image
pub struct FakeScreen {
    origin: Point,
    image: Mutex<RgbaImage>,
    captures: Mutex<Vec<CaptureRegion>>,
    failures: AtomicU32,
}

impl FakeScreen {
    pub fn new(image: RgbaImage) -> Self {
        Self::with_origin(image, Point::new(0, 0))
    }

    pub fn with_origin(image: RgbaImage, origin: Point) -> Self {
        Self {
            origin,
            image: Mutex::new(image),
            captures: Mutex::new(Vec::new()),
            failures: AtomicU32::new(0),
        }
    }

    pub fn set_image(&self, image: RgbaImage) {
        *lock(&self.image) = image;
    }

    pub fn paint(&self, f: impl FnOnce(&mut RgbaImage)) {
        f(&mut lock(&self.image));
    }

    /// Make the next `n` captures fail
    pub fn fail_next(&self, n: u32) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Regions captured so far, oldest first
    pub fn captures(&self) -> Vec<CaptureRegion> {
        lock(&self.captures).clone()
    }
}

impl ScreenSource for FakeScreen {
    fn monitor_bounds(&self) -> Result<CaptureRegion, CaptureError> {
        let image = lock(&self.image);
        Ok(CaptureRegion::new(
            self.origin.x,
            self.origin.y,
            image.width(),
            image.height(),
        ))
    }

    fn capture(&self, region: CaptureRegion) -> Result<Frame, CaptureError> {
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(CaptureError::Capture("injected failure".into()));
        }

        lock(&self.captures).push(region);
        let frame = Frame::new(lock(&self.image).clone(), self.origin);
        frame.crop(region).ok_or(CaptureError::OutOfBounds(region))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Move(Point),
    Click(Point),
    Key(VirtualKey),
    Focus(WindowHandle),
    Block(bool),
    Beep(u32),
}

type ClickHook = Box<dyn Fn(Point) + Send + Sync>;

/// Records input instead of sending it
pub struct FakeDriver {
    cursor: Mutex<Point>,
    foreground: Option<WindowHandle>,
    events: Mutex<Vec<InputEvent>>,
    lock_fails: bool,
    hooks: Mutex<Vec<ClickHook>>,
}

impl Default for FakeDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeDriver {
    pub fn new() -> Self {
        Self {
            cursor: Mutex::new(Point::new(0, 0)),
            foreground: None,
            events: Mutex::new(Vec::new()),
            lock_fails: false,
            hooks: Mutex::new(Vec::new()),
        }
    }

    pub fn with_cursor(self, cursor: Point) -> Self {
        *lock(&self.cursor) = cursor;
        self
    }

    pub fn with_foreground(mut self, window: WindowHandle) -> Self {
        self.foreground = Some(window);
        self
    }

    pub fn failing_input_lock(mut self) -> Self {
        self.lock_fails = true;
        self
    }

    /// Run `hook` after every click, e.g. to change the fake screen
    pub fn on_click(&self, hook: impl Fn(Point) + Send + Sync + 'static) {
        lock(&self.hooks).push(Box::new(hook));
    }

    pub fn cursor(&self) -> Point {
        *lock(&self.cursor)
    }

    pub fn events(&self) -> Vec<InputEvent> {
        lock(&self.events).clone()
    }

    pub fn clicks(&self) -> Vec<Point> {
        lock(&self.events)
            .iter()
            .filter_map(|e| match e {
                InputEvent::Click(at) => Some(*at),
                _ => None,
            })
            .collect()
    }

    pub fn keys(&self) -> Vec<VirtualKey> {
        lock(&self.events)
            .iter()
            .filter_map(|e| match e {
                InputEvent::Key(key) => Some(*key),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: InputEvent) {
        lock(&self.events).push(event);
    }
}

impl InputDriver for FakeDriver {
    fn cursor_position(&self) -> Result<Point, InputError> {
        Ok(self.cursor())
    }

    fn move_cursor(&self, to: Point) -> Result<(), InputError> {
        *lock(&self.cursor) = to;
        self.record(InputEvent::Move(to));
        Ok(())
    }

    fn left_click(&self) -> Result<(), InputError> {
        let at = self.cursor();
        self.record(InputEvent::Click(at));
        for hook in lock(&self.hooks).iter() {
            hook(at);
        }
        Ok(())
    }

    fn press_key(&self, key: VirtualKey) -> Result<(), InputError> {
        self.record(InputEvent::Key(key));
        Ok(())
    }

    fn foreground_window(&self) -> Option<WindowHandle> {
        self.foreground
    }

    fn restore_focus(&self, window: WindowHandle) -> Result<(), InputError> {
        self.record(InputEvent::Focus(window));
        Ok(())
    }

    fn block_input(&self, blocked: bool) -> Result<(), InputError> {
        if self.lock_fails {
            return Err(InputError::Os {
                call: "BlockInput",
                message: "access denied".into(),
            });
        }
        self.record(InputEvent::Block(blocked));
        Ok(())
    }

    fn beep(&self, frequency: u32, _duration: Duration) -> Result<(), InputError> {
        self.record(InputEvent::Beep(frequency));
        Ok(())
    }
}
