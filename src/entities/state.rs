//! Per-viewer interaction state

use serde::{Deserialize, Serialize};

/// Continuous display position plus the frame the user asked for.
///
/// Created on `Viewer::init`, mutated by the interaction controller and the
/// render loop, dropped with the viewer.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ViewerState {
    /// Interpolated position in `[0, logical_frame_count)`
    pub current_frame_float: f64,
    /// Frame requested by interaction (always wrapped)
    pub target_frame: usize,
    pub is_dragging: bool,
}

impl ViewerState {
    /// State parked on `frame`
    pub fn at(frame: usize) -> Self {
        Self {
            current_frame_float: frame as f64,
            target_frame: frame,
            is_dragging: false,
        }
    }
}
