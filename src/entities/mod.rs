//! Entities module - sequence addressing, bitmaps, viewer state and host traits
//!
//! Nothing in here schedules work. `core/` builds the engine on top of these
//! types; hosts implement the traits.

pub mod frame;
pub mod loader;
pub mod sequence;
pub mod state;
pub mod traits;

pub use frame::{Bitmap, LoadOutcome, ViewerError};
pub use loader::ImageBackend;
pub use sequence::{shortest_delta, wrap_index, wrap_position, Sequence, Tier};
pub use state::ViewerState;
pub use traits::{Canvas, FrameBackend};
