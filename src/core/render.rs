//! Per-tick frame follow + draw
//!
//! Each tick moves `current_frame_float` toward `target_frame` along the short
//! way round, rounds to a frame and draws the best cached bitmap for it (high
//! before low). A frame with nothing cached is skipped: whatever is on the
//! canvas stays there, it is never cleared.
//!
//! The tick never blocks and never requests loads; it only reads the caches.

use log::trace;

use super::pipeline::DecodePipeline;
use crate::entities::{shortest_delta, wrap_index, wrap_position, Bitmap, Canvas, Tier, ViewerState};

/// Remaining distance below which the follow snaps onto the target
const SNAP_EPSILON: f64 = 0.01;

/// Crossfade is considered complete at this accumulated opacity
const FADE_DONE: f32 = 0.98;

/// What a tick did to the canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrawOutcome {
    Drawn { index: usize, tier: Tier },
    /// Frame not cached yet; previous frame left on screen
    Held { index: usize },
    /// Nothing changed since the last draw
    #[default]
    Unchanged,
}

#[derive(Debug)]
pub struct RenderLoop {
    /// Fraction of the remaining distance covered per tick (1.0 = snap)
    damping: f64,
    /// Alpha for drawing a new frame over the previous one
    crossfade: f32,
    last_drawn: Option<(usize, Tier)>,
    force_redraw: bool,
    /// Canvas has shown something (across sequence switches)
    has_content: bool,
    /// Accumulated opacity of the last drawn frame
    coverage: f32,
    backing: (u32, u32),
}

impl RenderLoop {
    pub fn new(damping: f64, crossfade: f32) -> Self {
        Self {
            damping: damping.clamp(f64::EPSILON, 1.0),
            crossfade: crossfade.clamp(f32::EPSILON, 1.0),
            last_drawn: None,
            force_redraw: true,
            has_content: false,
            coverage: 1.0,
            backing: (1, 1),
        }
    }

    /// New backing store size; forces the next tick to redraw
    pub fn set_backing(&mut self, width: u32, height: u32) {
        self.backing = (width.max(1), height.max(1));
        self.force_redraw = true;
    }

    pub fn backing(&self) -> (u32, u32) {
        self.backing
    }

    pub fn force_redraw(&mut self) {
        self.force_redraw = true;
    }

    /// Forget the drawn frame (its index refers to a replaced sequence)
    pub fn invalidate(&mut self) {
        self.last_drawn = None;
        self.force_redraw = true;
        self.coverage = 1.0;
    }

    pub fn last_drawn(&self) -> Option<(usize, Tier)> {
        self.last_drawn
    }

    /// Advance the follow and draw if the shown frame should change
    pub fn tick(&mut self, state: &mut ViewerState, pipeline: &DecodePipeline, canvas: &mut dyn Canvas) -> DrawOutcome {
        let total = pipeline.logical_frame_count();
        if total == 0 {
            return DrawOutcome::Unchanged;
        }
        self.advance(state, total);
        let index = wrap_index(state.current_frame_float.round() as i64, total);

        let high_ready = pipeline.cache(Tier::High).contains(index);
        let wanted = match self.last_drawn {
            _ if self.force_redraw => true,
            Some((last, tier)) if last == index => tier == Tier::Low && high_ready,
            _ => true,
        };
        if !wanted {
            return self.continue_fade(pipeline, canvas);
        }

        let chosen = pipeline
            .cache(Tier::High)
            .peek(index)
            .map(|bitmap| (bitmap, Tier::High))
            .or_else(|| pipeline.cache(Tier::Low).get(index).map(|bitmap| (bitmap, Tier::Low)));
        let Some((bitmap, tier)) = chosen else {
            return DrawOutcome::Held { index };
        };

        let alpha = if self.has_content { self.crossfade } else { 1.0 };
        self.draw(canvas, &bitmap, alpha);
        self.coverage = alpha;
        self.last_drawn = Some((index, tier));
        self.force_redraw = false;
        trace!("Drew frame {} ({}) alpha {:.2}", index, tier, alpha);
        DrawOutcome::Drawn { index, tier }
    }

    fn advance(&self, state: &mut ViewerState, total: usize) {
        let target = state.target_frame as f64;
        let delta = shortest_delta(state.current_frame_float, target, total as f64);
        state.current_frame_float = if self.damping >= 1.0 || delta.abs() < SNAP_EPSILON {
            wrap_position(target, total)
        } else {
            wrap_position(state.current_frame_float + delta * self.damping, total)
        };
    }

    /// Keep blending the last frame in until it is fully opaque
    fn continue_fade(&mut self, pipeline: &DecodePipeline, canvas: &mut dyn Canvas) -> DrawOutcome {
        let Some((index, tier)) = self.last_drawn else {
            return DrawOutcome::Unchanged;
        };
        if self.coverage >= FADE_DONE {
            return DrawOutcome::Unchanged;
        }
        let Some(bitmap) = pipeline.cache(tier).peek(index) else {
            self.coverage = 1.0;
            return DrawOutcome::Unchanged;
        };

        let next = 1.0 - (1.0 - self.coverage) * (1.0 - self.crossfade);
        let alpha = if next >= FADE_DONE { 1.0 } else { self.crossfade };
        self.draw(canvas, &bitmap, alpha);
        self.coverage = if alpha >= 1.0 { 1.0 } else { next };
        DrawOutcome::Drawn { index, tier }
    }

    fn draw(&mut self, canvas: &mut dyn Canvas, bitmap: &Bitmap, alpha: f32) {
        canvas.draw_bitmap(bitmap, self.backing.0, self.backing.1, alpha);
        self.has_content = true;
    }
}
