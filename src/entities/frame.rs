//! Decoded frame bitmaps, load outcomes and the viewer error taxonomy
//!
//! **Why**: Every background load resolves to exactly one [`LoadOutcome`], so
//! callers never have to guess whether a swallowed failure was a cancellation.
//!
//! Bitmaps are cheap clonable handles. The cache that stores a bitmap owns its
//! lifetime: it hands it back to [`FrameBackend::release`](super::FrameBackend::release)
//! on eviction, clear or stale commit.

use image::RgbaImage;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_BITMAP_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque decoded raster
#[derive(Clone)]
pub struct Bitmap {
    id: u64,
    image: Arc<RgbaImage>,
}

impl Bitmap {
    pub fn new(image: RgbaImage) -> Self {
        Self {
            id: NEXT_BITMAP_ID.fetch_add(1, Ordering::Relaxed),
            image: Arc::new(image),
        }
    }

    /// Unique per decode, stable across clones
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Pixel memory in bytes
    pub fn mem(&self) -> usize {
        self.image.as_raw().len()
    }
}

impl std::fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bitmap")
            .field("id", &self.id)
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

/// Viewer error taxonomy
#[derive(Debug, Clone, PartialEq)]
pub enum ViewerError {
    /// Network / filesystem error while fetching an asset
    FetchFailed { url: String, reason: String },
    /// Payload is not a decodable image
    DecodeFailed { url: String, reason: String },
    /// Generation superseded; expected and silent
    Cancelled,
    /// Host has no drawable surface
    ContextUnavailable,
    InvalidConfig(String),
}

impl std::fmt::Display for ViewerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViewerError::FetchFailed { url, reason } => write!(f, "Fetch failed for {}: {}", url, reason),
            ViewerError::DecodeFailed { url, reason } => write!(f, "Decode failed for {}: {}", url, reason),
            ViewerError::Cancelled => write!(f, "Cancelled (generation superseded)"),
            ViewerError::ContextUnavailable => write!(f, "Drawing context unavailable"),
            ViewerError::InvalidConfig(e) => write!(f, "Invalid config: {}", e),
        }
    }
}

impl std::error::Error for ViewerError {}

/// Result of one frame load
#[derive(Debug, Clone)]
pub enum LoadOutcome {
    Ready(Bitmap),
    Failed(ViewerError),
    Cancelled,
}

impl LoadOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, LoadOutcome::Ready(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, LoadOutcome::Cancelled)
    }

    pub fn into_result(self) -> Result<Bitmap, ViewerError> {
        match self {
            LoadOutcome::Ready(bitmap) => Ok(bitmap),
            LoadOutcome::Failed(e) => Err(e),
            LoadOutcome::Cancelled => Err(ViewerError::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitmap_ids_unique_and_shared_by_clones() {
        let a = Bitmap::new(RgbaImage::new(2, 2));
        let b = Bitmap::new(RgbaImage::new(2, 2));
        assert_ne!(a.id(), b.id());
        assert_eq!(a.clone().id(), a.id());
        assert_eq!(a.mem(), 16);
    }

    #[test]
    fn test_outcome_into_result() {
        assert_eq!(LoadOutcome::Cancelled.into_result().unwrap_err(), ViewerError::Cancelled);
        let err = ViewerError::FetchFailed { url: "a.png".into(), reason: "404".into() };
        assert_eq!(LoadOutcome::Failed(err.clone()).into_result().unwrap_err(), err);
        assert!(LoadOutcome::Ready(Bitmap::new(RgbaImage::new(1, 1))).is_ready());
        assert_eq!(err.to_string(), "Fetch failed for a.png: 404");
    }
}
