//! Abstract traits for dependency inversion.
//!
//! The engine in `core/` talks to the host only through these: a backend that
//! turns URLs into bitmaps, and a canvas it can draw on. Implementations live in
//! `entities::loader` and `raster`; tests plug in counting mocks.

use std::sync::Arc;

use super::frame::{Bitmap, ViewerError};

/// Asset fetch + decode + release.
///
/// Called from decode worker threads, hence `Send + Sync`.
pub trait FrameBackend: Send + Sync {
    /// Fetch raw bytes for `url` (network or filesystem).
    fn fetch(&self, url: &str) -> Result<Vec<u8>, ViewerError>;

    /// Decode a fetched payload into a drawable bitmap.
    fn decode(&self, url: &str, bytes: &[u8]) -> Result<Bitmap, ViewerError>;

    /// Give a bitmap back. Called exactly once for every bitmap the engine
    /// decoded and does not hand to a caller.
    fn release(&self, bitmap: Bitmap) {
        drop(bitmap);
    }
}

/// Blanket impl: Arc<T> implements FrameBackend if T does
impl<T: FrameBackend + ?Sized> FrameBackend for Arc<T> {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, ViewerError> {
        (**self).fetch(url)
    }

    fn decode(&self, url: &str, bytes: &[u8]) -> Result<Bitmap, ViewerError> {
        (**self).decode(url, bytes)
    }

    fn release(&self, bitmap: Bitmap) {
        (**self).release(bitmap)
    }
}

/// Host drawing surface.
///
/// Only ever touched from the thread that drives the viewer.
pub trait Canvas {
    /// Prepare the 2D context. `false` when the host has nothing to draw on.
    fn acquire_context(&mut self) -> bool;

    /// Layout size in CSS-like pixels
    fn client_size(&self) -> (f32, f32);

    fn device_pixel_ratio(&self) -> f32 {
        1.0
    }

    /// Resize the backing store in device pixels
    fn set_backing_size(&mut self, width: u32, height: u32);

    /// Draw `bitmap` stretched to `width` x `height`, blended with `alpha` (1.0 = replace)
    fn draw_bitmap(&mut self, bitmap: &Bitmap, width: u32, height: u32, alpha: f32);

    fn set_pointer_capture(&mut self, _pointer_id: i32) {}

    fn release_pointer_capture(&mut self, _pointer_id: i32) {}

    /// Viewer is going away; drop any references to the surface
    fn detach(&mut self) {}
}
