//! Scripted rotation: sweep the target from one frame to another over time

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::entities::wrap_index;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RotateDirection {
    #[default]
    Forward,
    Backward,
}

/// Auto-rotate request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AutoRotate {
    pub start_frame: usize,
    pub end_frame: usize,
    pub duration_ms: u64,
    /// Ease in and out instead of constant speed
    pub ease: bool,
    pub direction: RotateDirection,
}

impl Default for AutoRotate {
    fn default() -> Self {
        Self {
            start_frame: 0,
            end_frame: 0,
            duration_ms: 2000,
            ease: true,
            direction: RotateDirection::Forward,
        }
    }
}

/// Cubic ease-in-out on `[0, 1]`
pub fn ease_in_out_cubic(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
    }
}

/// One running rotation
#[derive(Debug, Clone)]
pub struct RotationRun {
    options: AutoRotate,
    total: usize,
    /// Frames to travel in `options.direction`
    distance: usize,
    started: Instant,
}

impl RotationRun {
    pub fn new(options: AutoRotate, total: usize) -> Self {
        Self::started_at(options, total, Instant::now())
    }

    fn started_at(options: AutoRotate, total: usize, started: Instant) -> Self {
        let (start, end) = (options.start_frame as i64, options.end_frame as i64);
        let distance = match options.direction {
            RotateDirection::Forward => wrap_index(end - start, total),
            RotateDirection::Backward => wrap_index(start - end, total),
        };
        Self { options, total, distance, started }
    }

    pub fn distance(&self) -> usize {
        self.distance
    }

    /// Target frame at `now` and whether the run is complete
    pub fn sample(&self, now: Instant) -> (usize, bool) {
        let duration = Duration::from_millis(self.options.duration_ms);
        let linear = if duration.is_zero() {
            1.0
        } else {
            (now.saturating_duration_since(self.started).as_secs_f64() / duration.as_secs_f64()).min(1.0)
        };
        let t = if self.options.ease { ease_in_out_cubic(linear) } else { linear };

        let travelled = (self.distance as f64 * t).round() as i64;
        let offset = match self.options.direction {
            RotateDirection::Forward => travelled,
            RotateDirection::Backward => -travelled,
        };
        let frame = wrap_index(self.options.start_frame as i64 + offset, self.total);
        (frame, linear >= 1.0)
    }
}
