//! Viewer configuration (JSON, camelCase keys, every field optional)
//!
//! Missing keys fall back to [`ViewerConfig::default`], so a config file only
//! needs the fields that differ, e.g.
//!
//! ```json
//! { "totalFrames": 180, "basePath": "assets/Orbits/Exterior/Day/Exterior360_2.", "extension": "jpeg" }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::entities::{Sequence, ViewerError};

/// Upper bound for the decode concurrency ceiling (single digit)
pub const MAX_CONCURRENT_DECODES: usize = 9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ViewerConfig {
    /// Raw frames on disk
    pub total_frames: usize,
    /// Decimation factor (>= 1)
    pub frame_step: usize,
    /// Radius for drag-time neighbourhood preload (0 = off)
    pub preload_radius: usize,
    /// Low-res cache bound
    pub max_cache_size: usize,
    /// High-res cache bound
    pub max_high_res_cache_size: usize,
    pub max_concurrent_decodes: usize,
    /// Path prefix up to the frame number, e.g. `orbit/Day/Exterior360_2.`
    pub base_path: String,
    pub extension: String,
    /// Zero padding of the frame number
    pub padding: usize,
    pub low_res_suffix: String,
    pub high_res_suffix: String,

    /// Fraction of the remaining distance covered per tick (1.0 = snap)
    pub damping: f64,
    /// Drag distance multiplier
    pub sensitivity: f32,
    /// Pixels of drag for one full turn; `None` = client width * `rotation_width_factor`
    pub pixels_per_rotation: Option<f32>,
    pub rotation_width_factor: f32,
    /// Largest target change a single pointer move may cause
    pub max_frames_per_move: usize,
    /// Alpha of a new frame over the previous one (1.0 = replace)
    pub crossfade: f32,

    /// Quiet time after pointer-up before the high-res upgrade
    pub promote_delay_ms: u64,
    /// Wait after the sparse pass before refining
    pub settle_delay_ms: u64,
    /// Pause between refinement rounds
    pub pacing_delay_ms: u64,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            total_frames: 180,
            frame_step: 1,
            preload_radius: 0,
            max_cache_size: 180,
            max_high_res_cache_size: 8,
            max_concurrent_decodes: 6,
            base_path: String::new(),
            extension: "jpeg".to_string(),
            padding: 4,
            low_res_suffix: "_low".to_string(),
            high_res_suffix: String::new(),
            damping: 1.0,
            sensitivity: 0.25,
            pixels_per_rotation: None,
            rotation_width_factor: 0.6,
            max_frames_per_move: 30,
            crossfade: 1.0,
            promote_delay_ms: 200,
            settle_delay_ms: 100,
            pacing_delay_ms: 20,
        }
    }
}

impl ViewerConfig {
    /// Load from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Write as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text).with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), ViewerError> {
        let invalid = |msg: String| Err(ViewerError::InvalidConfig(msg));
        if self.total_frames == 0 {
            return invalid("totalFrames must be > 0".into());
        }
        if self.frame_step == 0 {
            return invalid("frameStep must be >= 1".into());
        }
        if self.max_cache_size == 0 || self.max_high_res_cache_size == 0 {
            return invalid("cache sizes must be > 0".into());
        }
        if !(1..=MAX_CONCURRENT_DECODES).contains(&self.max_concurrent_decodes) {
            return invalid(format!("maxConcurrentDecodes must be 1..={}", MAX_CONCURRENT_DECODES));
        }
        if !(self.damping > 0.0 && self.damping <= 1.0) {
            return invalid(format!("damping must be in (0, 1], got {}", self.damping));
        }
        if !(self.crossfade > 0.0 && self.crossfade <= 1.0) {
            return invalid(format!("crossfade must be in (0, 1], got {}", self.crossfade));
        }
        if let Some(px) = self.pixels_per_rotation.filter(|px| !(*px > 0.0)) {
            return invalid(format!("pixelsPerRotation must be > 0, got {}", px));
        }
        Ok(())
    }

    /// Sequence described by this config
    pub fn sequence(&self) -> Sequence {
        Sequence::new(self.base_path.clone(), self.extension.clone(), self.total_frames, self.frame_step)
            .with_padding(self.padding)
            .with_suffixes(self.low_res_suffix.clone(), self.high_res_suffix.clone())
    }

    pub fn logical_frame_count(&self) -> usize {
        self.sequence().logical_frame_count()
    }
}
