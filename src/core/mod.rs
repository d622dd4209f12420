//! Core engine modules - generations, caches, decode pool, preload, render
//!
//! These modules form the viewer engine, independent of any host UI. The host
//! supplies a [`Canvas`](crate::entities::Canvas) and a
//! [`FrameBackend`](crate::entities::FrameBackend); [`Viewer`] wires the rest.

pub mod debounce;
pub mod frame_cache;
pub mod generation;
pub mod interaction;
pub mod pipeline;
pub mod preload;
pub mod promoter;
pub mod render;
pub mod rotate;
pub mod viewer;
pub mod workers;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience
pub use debounce::Debouncer;
pub use frame_cache::{CacheStats, FrameCache};
pub use generation::{CancelSignal, Generation, GenerationController};
pub use interaction::{DragPhase, DragSettings, InteractionController};
pub use pipeline::{DecodePipeline, FrameKey, LoadTicket, PipelineLimits, ProgressObserver};
pub use preload::{gap_midpoints, sparse_step, PreloadReport, PreloadScheduler};
pub use promoter::{HighResPromoter, Promotion};
pub use render::{DrawOutcome, RenderLoop};
pub use rotate::{ease_in_out_cubic, AutoRotate, RotateDirection, RotationRun};
pub use viewer::{TickReport, Viewer, ViewerStats};
pub use workers::Workers;
