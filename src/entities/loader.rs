//! Image backend: fetch over HTTP or filesystem, decode with the `image` crate
//!
//! URLs starting with `http://` or `https://` go through a shared `ureq` agent
//! (plain GET, the transport's own timeouts only). Everything else is read as a
//! filesystem path, optionally resolved against a root directory.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use log::trace;

use super::frame::{Bitmap, ViewerError};
use super::traits::FrameBackend;

/// Upper bound on a single asset payload (256 MB)
const MAX_PAYLOAD_BYTES: u64 = 256 * 1024 * 1024;

/// Default [`FrameBackend`] used by the binary
pub struct ImageBackend {
    agent: ureq::Agent,
    /// Root for relative filesystem URLs
    root: Option<PathBuf>,
    decoded: AtomicU64,
    released: AtomicU64,
}

impl ImageBackend {
    pub fn new() -> Self {
        Self {
            agent: ureq::AgentBuilder::new().build(),
            root: None,
            decoded: AtomicU64::new(0),
            released: AtomicU64::new(0),
        }
    }

    /// Resolve relative filesystem URLs against `root`
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Bitmaps decoded so far
    pub fn decoded_count(&self) -> u64 {
        self.decoded.load(Ordering::Relaxed)
    }

    /// Bitmaps handed back by the engine so far
    pub fn released_count(&self) -> u64 {
        self.released.load(Ordering::Relaxed)
    }

    fn is_http(url: &str) -> bool {
        let lower = url.to_ascii_lowercase();
        lower.starts_with("http://") || lower.starts_with("https://")
    }

    fn resolve_path(&self, url: &str) -> PathBuf {
        let path = Path::new(url.strip_prefix("file://").unwrap_or(url));
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }

    fn fetch_http(&self, url: &str) -> Result<Vec<u8>, ViewerError> {
        let fail = |reason: String| ViewerError::FetchFailed { url: url.to_string(), reason };

        let response = self.agent.get(url).call().map_err(|e| match e {
            ureq::Error::Status(code, _) => fail(format!("HTTP {}", code)),
            ureq::Error::Transport(t) => fail(t.to_string()),
        })?;

        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_PAYLOAD_BYTES)
            .read_to_end(&mut bytes)
            .map_err(|e| fail(e.to_string()))?;
        Ok(bytes)
    }

    fn fetch_file(&self, url: &str) -> Result<Vec<u8>, ViewerError> {
        let path = self.resolve_path(url);
        std::fs::read(&path).map_err(|e| ViewerError::FetchFailed {
            url: url.to_string(),
            reason: format!("{}: {}", path.display(), e),
        })
    }
}

impl Default for ImageBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBackend for ImageBackend {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, ViewerError> {
        trace!("Fetching {}", url);
        if Self::is_http(url) {
            self.fetch_http(url)
        } else {
            self.fetch_file(url)
        }
    }

    fn decode(&self, url: &str, bytes: &[u8]) -> Result<Bitmap, ViewerError> {
        let img = image::load_from_memory(bytes).map_err(|e| ViewerError::DecodeFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let rgba = img.to_rgba8();
        trace!("Decoded {} ({}x{})", url, rgba.width(), rgba.height());
        self.decoded.fetch_add(1, Ordering::Relaxed);
        Ok(Bitmap::new(rgba))
    }

    fn release(&self, bitmap: Bitmap) {
        self.released.fetch_add(1, Ordering::Relaxed);
        drop(bitmap);
    }
}
