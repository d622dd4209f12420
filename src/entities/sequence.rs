//! Frame addressing for decimated rotational sequences
//!
//! A sequence on disk is `basePath + zero-padded index + suffix + "." + extension`.
//! Logical frame `i` maps to raw asset `i * frame_step`. All index arithmetic is
//! circular and goes through [`wrap_index`] / [`wrap_position`].
//!
//! **Used by**: DecodePipeline (URL resolution), PreloadScheduler (gap math),
//! RenderLoop (frame selection), InteractionController (drag target).

use serde::{Deserialize, Serialize};

/// Resolution class of a cached bitmap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    /// Always-available preview frames (filled by preload)
    Low,
    /// On-demand full resolution (filled by promotion)
    High,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Low => write!(f, "low"),
            Tier::High => write!(f, "high"),
        }
    }
}

/// Wrap any integer index into `[0, count)`.
///
/// Returns 0 for an empty ring.
pub fn wrap_index(index: i64, count: usize) -> usize {
    if count == 0 {
        return 0;
    }
    index.rem_euclid(count as i64) as usize
}

/// Wrap a continuous position into `[0, count)`.
pub fn wrap_position(position: f64, count: usize) -> f64 {
    if count == 0 {
        return 0.0;
    }
    let wrapped = position.rem_euclid(count as f64);
    // rem_euclid can round up to exactly `count` for tiny negative inputs
    if wrapped >= count as f64 { 0.0 } else { wrapped }
}

/// Signed shortest circular step from `current` to `target` on a ring of `total`.
///
/// Never takes the long way around. Exactly half a turn resolves to `+total/2`
/// (remainder keeps the sign of `target - current`).
pub fn shortest_delta(current: f64, target: f64, total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    let mut delta = (target - current) % total;
    if delta > total / 2.0 {
        delta -= total;
    }
    if delta < -total / 2.0 {
        delta += total;
    }
    delta
}

/// Active image sequence: where frames live and how they are decimated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    pub base_path: String,
    /// Extension without leading dot
    pub extension: String,
    pub total_frames_raw: usize,
    /// Decimation factor, always >= 1
    pub frame_step: usize,
    /// Zero padding of the raw index
    pub padding: usize,
    pub low_suffix: String,
    pub high_suffix: String,
}

impl Sequence {
    pub fn new(base_path: impl Into<String>, extension: impl Into<String>, total_frames_raw: usize, frame_step: usize) -> Self {
        Self {
            base_path: base_path.into(),
            extension: normalize_extension(&extension.into()),
            total_frames_raw,
            frame_step: frame_step.max(1),
            padding: 4,
            low_suffix: "_low".to_string(),
            high_suffix: String::new(),
        }
    }

    /// Override the per-tier filename suffixes
    pub fn with_suffixes(mut self, low: impl Into<String>, high: impl Into<String>) -> Self {
        self.low_suffix = low.into();
        self.high_suffix = high.into();
        self
    }

    pub fn with_padding(mut self, padding: usize) -> Self {
        self.padding = padding;
        self
    }

    /// Same sequence geometry, different asset location
    pub fn relocated(&self, base_path: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            extension: normalize_extension(&extension.into()),
            ..self.clone()
        }
    }

    /// `ceil(total_frames_raw / frame_step)`
    pub fn logical_frame_count(&self) -> usize {
        self.total_frames_raw.div_ceil(self.frame_step.max(1))
    }

    /// Normalize a logical index into range
    pub fn wrap(&self, index: i64) -> usize {
        wrap_index(index, self.logical_frame_count())
    }

    /// Raw asset index for a logical index (wrapped first)
    pub fn actual_index(&self, index: i64) -> usize {
        self.wrap(index) * self.frame_step.max(1)
    }

    /// Stable asset URL for `index` at `tier`. Pure, total over all integers.
    pub fn frame_url(&self, index: i64, tier: Tier) -> String {
        let suffix = match tier {
            Tier::Low => &self.low_suffix,
            Tier::High => &self.high_suffix,
        };
        format!(
            "{}{:0pad$}{}.{}",
            self.base_path,
            self.actual_index(index),
            suffix,
            self.extension,
            pad = self.padding
        )
    }
}

fn normalize_extension(ext: &str) -> String {
    ext.trim_start_matches('.').to_string()
}
