//! Debouncer - delays an action until input has been quiet for a while.
//!
//! Pointer-up schedules a high-res promotion; a fast flick-and-release that
//! immediately continues dragging must not fire it. So:
//! 1. `schedule()` on release (re-scheduling resets the timer)
//! 2. `cancel()` on pointer-down
//! 3. `tick()` from the render loop fires once the delay has elapsed

use std::time::{Duration, Instant};

/// Tick-driven debouncer carrying the payload of the latest schedule.
///
/// # Usage
/// ```ignore
/// // On pointer up:
/// debounce.schedule(target_frame);
///
/// // In the frame tick:
/// if let Some(frame) = debounce.tick() {
///     promoter.promote(frame);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    delay: Duration,
    /// Pending payload and trigger time
    pending: Option<(T, Instant)>,
}

impl<T: Copy> Debouncer<T> {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            pending: None,
        }
    }

    /// Schedule `payload`. Replaces any pending one and restarts the timer.
    pub fn schedule(&mut self, payload: T) {
        self.pending = Some((payload, Instant::now() + self.delay));
        log::trace!("Debouncer: scheduled in {}ms", self.delay.as_millis());
    }

    pub fn cancel(&mut self) {
        if self.pending.take().is_some() {
            log::trace!("Debouncer: cancelled");
        }
    }

    /// Returns the payload once the delay has elapsed, clearing it.
    pub fn tick(&mut self) -> Option<T> {
        self.tick_at(Instant::now())
    }

    fn tick_at(&mut self, now: Instant) -> Option<T> {
        let (payload, trigger_at) = self.pending?;
        if now >= trigger_at {
            self.pending = None;
            Some(payload)
        } else {
            None
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}
