//! Test doubles: counting backend and recording canvas

use image::{Rgba, RgbaImage};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::entities::{Bitmap, Canvas, FrameBackend, ViewerError};

/// Backend that fabricates 2x2 bitmaps and counts everything
#[derive(Default)]
pub struct MockBackend {
    fetches: Mutex<HashMap<String, usize>>,
    fetch_log: Mutex<Vec<String>>,
    failing_fetch: Mutex<HashSet<String>>,
    failing_decode: Mutex<HashSet<String>>,
    delay: Mutex<Duration>,
    /// true = fetches block until reopened
    gate: Mutex<bool>,
    gate_cv: Condvar,
    decoded: AtomicUsize,
    released: AtomicUsize,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn fail_fetch(&self, url: &str) {
        self.failing_fetch.lock().unwrap().insert(url.to_string());
    }

    pub fn fail_decode(&self, url: &str) {
        self.failing_decode.lock().unwrap().insert(url.to_string());
    }

    pub fn close_gate(&self) {
        *self.gate.lock().unwrap() = true;
    }

    pub fn open_gate(&self) {
        *self.gate.lock().unwrap() = false;
        self.gate_cv.notify_all();
    }

    pub fn fetch_count(&self, url: &str) -> usize {
        self.fetches.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        self.fetch_log.lock().unwrap().len()
    }

    pub fn fetch_log(&self) -> Vec<String> {
        self.fetch_log.lock().unwrap().clone()
    }

    /// Largest fetch count for any single URL
    pub fn max_fetches_per_url(&self) -> usize {
        self.fetches.lock().unwrap().values().copied().max().unwrap_or(0)
    }

    pub fn decoded(&self) -> usize {
        self.decoded.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Wait until at least `n` fetches have started
    pub fn wait_for_fetches(&self, n: usize, timeout: Duration) -> bool {
        wait_until(timeout, || self.total_fetches() >= n)
    }
}

impl FrameBackend for MockBackend {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, ViewerError> {
        *self.fetches.lock().unwrap().entry(url.to_string()).or_insert(0) += 1;
        self.fetch_log.lock().unwrap().push(url.to_string());

        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        {
            let mut closed = self.gate.lock().unwrap();
            while *closed {
                closed = self.gate_cv.wait(closed).unwrap();
            }
        }
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        self.running.fetch_sub(1, Ordering::SeqCst);

        if self.failing_fetch.lock().unwrap().contains(url) {
            return Err(ViewerError::FetchFailed { url: url.to_string(), reason: "HTTP 404".into() });
        }
        Ok(url.as_bytes().to_vec())
    }

    fn decode(&self, url: &str, _bytes: &[u8]) -> Result<Bitmap, ViewerError> {
        if self.failing_decode.lock().unwrap().contains(url) {
            return Err(ViewerError::DecodeFailed { url: url.to_string(), reason: "corrupt".into() });
        }
        self.decoded.fetch_add(1, Ordering::SeqCst);
        Ok(Bitmap::new(RgbaImage::from_pixel(2, 2, Rgba([200, 100, 50, 255]))))
    }

    fn release(&self, bitmap: Bitmap) {
        self.released.fetch_add(1, Ordering::SeqCst);
        drop(bitmap);
    }
}

/// One `draw_bitmap` call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawCall {
    pub bitmap_id: u64,
    pub width: u32,
    pub height: u32,
    pub alpha: f32,
}

/// Canvas that records what it was asked to do
#[derive(Debug, Clone)]
pub struct RecordingCanvas {
    pub has_context: bool,
    pub client: (f32, f32),
    pub dpr: f32,
    pub backing: (u32, u32),
    pub draws: Vec<DrawCall>,
    pub captured: Vec<i32>,
    pub released: Vec<i32>,
    pub detached: bool,
}

impl RecordingCanvas {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            has_context: true,
            client: (width, height),
            dpr: 1.0,
            backing: (0, 0),
            draws: Vec::new(),
            captured: Vec::new(),
            released: Vec::new(),
            detached: false,
        }
    }

    /// Canvas whose context cannot be acquired
    pub fn without_context() -> Self {
        Self { has_context: false, ..Self::new(100.0, 100.0) }
    }

    pub fn last_draw(&self) -> Option<DrawCall> {
        self.draws.last().copied()
    }
}

impl Canvas for RecordingCanvas {
    fn acquire_context(&mut self) -> bool {
        self.has_context
    }

    fn client_size(&self) -> (f32, f32) {
        self.client
    }

    fn device_pixel_ratio(&self) -> f32 {
        self.dpr
    }

    fn set_backing_size(&mut self, width: u32, height: u32) {
        self.backing = (width, height);
    }

    fn draw_bitmap(&mut self, bitmap: &Bitmap, width: u32, height: u32, alpha: f32) {
        self.draws.push(DrawCall { bitmap_id: bitmap.id(), width, height, alpha });
    }

    fn set_pointer_capture(&mut self, pointer_id: i32) {
        self.captured.push(pointer_id);
    }

    fn release_pointer_capture(&mut self, pointer_id: i32) {
        self.released.push(pointer_id);
    }

    fn detach(&mut self) {
        self.detached = true;
    }
}

/// Poll `cond` every millisecond until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}
