//! ORBITVIEW - progressive 360° frame-sequence viewer engine
//!
//! Shows a rotating object as a sequence of pre-rendered frames: low-res
//! frames are preloaded in a coarse-to-fine order so dragging is smooth from
//! the start, and the settled frame is upgraded to high-res.
//!
//! Re-exports all modules for use by binary targets.

// Core engine (generations, caches, decode pool, preload, render)
pub mod core;

// App modules
pub mod cli;
pub mod config;
pub mod entities;
pub mod paths;
pub mod raster;

// Re-export commonly used types from core
pub use crate::core::viewer::{TickReport, Viewer, ViewerStats};
pub use crate::core::rotate::AutoRotate;
pub use crate::core::pipeline::ProgressObserver;

// Re-export entities
pub use config::ViewerConfig;
pub use entities::{Bitmap, Canvas, FrameBackend, ImageBackend, Sequence, Tier, ViewerError};
pub use raster::RasterCanvas;
