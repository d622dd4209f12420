//! Pointer drag -> target frame
//!
//! `Idle -> Dragging -> Idle`. Horizontal travel since pointer-down maps to a
//! frame offset from the drag origin: one full turn per `pixels_per_rotation`
//! (scaled by `sensitivity`). Each move may change the target by at most
//! `max_frames_per_move` frames, so a single jumpy event cannot spin the object.

use log::trace;

use crate::config::ViewerConfig;
use crate::entities::{shortest_delta, wrap_index, ViewerState};

/// Drag-to-frame mapping parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragSettings {
    pub sensitivity: f32,
    /// Fixed pixels per full turn; `None` derives it from the client width
    pub pixels_per_rotation: Option<f32>,
    pub rotation_width_factor: f32,
    pub max_frames_per_move: usize,
}

impl From<&ViewerConfig> for DragSettings {
    fn from(config: &ViewerConfig) -> Self {
        Self {
            sensitivity: config.sensitivity,
            pixels_per_rotation: config.pixels_per_rotation,
            rotation_width_factor: config.rotation_width_factor,
            max_frames_per_move: config.max_frames_per_move,
        }
    }
}

impl DragSettings {
    /// Pixels of (scaled) travel for one full turn, never below 1
    pub fn pixels_per_rotation(&self, client_width: f32) -> f32 {
        self.pixels_per_rotation
            .unwrap_or(client_width * self.rotation_width_factor)
            .max(1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragPhase {
    Idle,
    Dragging { pointer_id: i32, start_x: f32, origin_frame: usize },
}

#[derive(Debug, Clone)]
pub struct InteractionController {
    settings: DragSettings,
    phase: DragPhase,
}

impl InteractionController {
    pub fn new(settings: DragSettings) -> Self {
        Self { settings, phase: DragPhase::Idle }
    }

    pub fn phase(&self) -> DragPhase {
        self.phase
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.phase, DragPhase::Dragging { .. })
    }

    /// Start a drag from the current target
    pub fn pointer_down(&mut self, x: f32, pointer_id: i32, state: &mut ViewerState) {
        self.phase = DragPhase::Dragging {
            pointer_id,
            start_x: x,
            origin_frame: state.target_frame,
        };
        state.is_dragging = true;
        trace!("Drag start at x={:.1} from frame {}", x, state.target_frame);
    }

    /// Update the target while dragging. Returns the new target if it changed.
    pub fn pointer_move(&mut self, x: f32, state: &mut ViewerState, total: usize, client_width: f32) -> Option<usize> {
        let DragPhase::Dragging { start_x, origin_frame, .. } = self.phase else {
            return None;
        };
        if total == 0 {
            return None;
        }

        let travel = (x - start_x) as f64 * self.settings.sensitivity as f64;
        let per_rotation = self.settings.pixels_per_rotation(client_width) as f64;
        let offset = (travel * total as f64 / per_rotation).floor() as i64;
        let desired = wrap_index(origin_frame as i64 + offset, total);

        let limit = self.settings.max_frames_per_move.max(1) as i64;
        let step = shortest_delta(state.target_frame as f64, desired as f64, total as f64) as i64;
        let target = wrap_index(state.target_frame as i64 + step.clamp(-limit, limit), total);

        if target == state.target_frame {
            return None;
        }
        state.target_frame = target;
        Some(target)
    }

    /// End the drag. Returns the settled target if a drag was in progress.
    pub fn pointer_up(&mut self, state: &mut ViewerState) -> Option<usize> {
        let DragPhase::Dragging { pointer_id, .. } = self.phase else {
            return None;
        };
        self.phase = DragPhase::Idle;
        state.is_dragging = false;
        trace!("Drag end (pointer {}) at frame {}", pointer_id, state.target_frame);
        Some(state.target_frame)
    }

    /// Drop any drag without settling (sequence switch, teardown)
    pub fn reset(&mut self, state: &mut ViewerState) {
        self.phase = DragPhase::Idle;
        state.is_dragging = false;
    }
}
