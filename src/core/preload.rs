//! Staged background preload: sparse pass, then gap-midpoint refinement
//!
//! **Why**: Loading 0, 1, 2, ... in order leaves the far side of the orbit empty
//! for seconds. Sampling every Nth frame first and then repeatedly splitting the
//! largest gaps converges roughly logarithmically, so wherever the user drags
//! there is already a cached frame close by.
//!
//! # Stages
//!
//! 1. Sparse: every `sparse_step(total)`-th frame, fire-and-forget
//! 2. Settle: short sleep so some sparse loads land
//! 3. Refine: midpoint of every circular gap > 1, all at once, wait, pace, repeat
//!
//! Per-frame failures are counted and swallowed. A superseded generation stops
//! the loop at the next check without error.

use log::{debug, info};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use super::generation::Generation;
use super::pipeline::{DecodePipeline, LoadTicket};
use crate::config::ViewerConfig;
use crate::entities::{LoadOutcome, Tier};

/// Sampling stride of the sparse pass: coarser for longer sequences
pub fn sparse_step(total: usize) -> usize {
    if total <= 180 {
        10
    } else if total <= 360 {
        15
    } else {
        (total / 24).max(5)
    }
}

/// Midpoints of every circular gap > 1 between `attempted` frames.
///
/// A single attempted frame spans the whole ring.
pub fn gap_midpoints(attempted: &BTreeSet<usize>, total: usize) -> Vec<usize> {
    if total == 0 || attempted.is_empty() {
        return Vec::new();
    }
    let sorted: Vec<usize> = attempted.iter().copied().collect();
    let mut midpoints = Vec::new();
    for (i, &start) in sorted.iter().enumerate() {
        let end = sorted[(i + 1) % sorted.len()];
        let gap = match (end + total - start) % total {
            0 => total,
            g => g,
        };
        if gap > 1 {
            let midpoint = (start + gap / 2) % total;
            if !attempted.contains(&midpoint) {
                midpoints.push(midpoint);
            }
        }
    }
    midpoints
}

/// Summary of one staged preload run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreloadReport {
    /// Frames requested by this run (sparse + refinement)
    pub requested: usize,
    pub loaded: usize,
    pub failed: usize,
    pub rounds: usize,
    /// Stopped because the generation was superseded
    pub cancelled: bool,
}

impl PreloadReport {
    fn tally(&mut self, outcome: LoadOutcome) {
        match outcome {
            LoadOutcome::Ready(_) => self.loaded += 1,
            LoadOutcome::Failed(_) => self.failed += 1,
            LoadOutcome::Cancelled => self.cancelled = true,
        }
    }
}

/// Schedules background low-res loads for one generation at a time
#[derive(Clone)]
pub struct PreloadScheduler {
    pipeline: Arc<DecodePipeline>,
    settle_delay: Duration,
    pacing_delay: Duration,
    radius: usize,
}

impl PreloadScheduler {
    pub fn new(pipeline: Arc<DecodePipeline>, config: &ViewerConfig) -> Self {
        Self {
            pipeline,
            settle_delay: Duration::from_millis(config.settle_delay_ms),
            pacing_delay: Duration::from_millis(config.pacing_delay_ms),
            radius: config.preload_radius,
        }
    }

    /// Run the staged preload on a background thread
    pub fn spawn(&self, initial_frame: usize, generation: Generation) -> std::io::Result<thread::JoinHandle<PreloadReport>> {
        let scheduler = self.clone();
        thread::Builder::new()
            .name(format!("preload-gen{}", generation.id()))
            .spawn(move || scheduler.staged_preload(initial_frame, &generation))
    }

    /// Sparse pass + midpoint refinement. Blocks until the whole sequence has
    /// been attempted or `generation` is superseded.
    pub fn staged_preload(&self, initial_frame: usize, generation: &Generation) -> PreloadReport {
        let started = Instant::now();
        let total = self.pipeline.logical_frame_count();
        let mut report = PreloadReport::default();
        if total == 0 {
            return report;
        }

        let initial = initial_frame % total;
        let step = sparse_step(total);
        let mut attempted = BTreeSet::from([initial]);

        let sparse: Vec<LoadTicket> = (0..total)
            .step_by(step)
            .filter(|&idx| idx != initial)
            .map(|idx| {
                attempted.insert(idx);
                self.pipeline.load_frame(idx as i64, Tier::Low, generation)
            })
            .collect();
        report.requested += sparse.len();
        debug!("Preload gen {}: sparse pass {} frames (step {})", generation.id(), sparse.len(), step);

        if sleep_unless_cancelled(self.settle_delay, generation) {
            while attempted.len() < total {
                if !self.pipeline.generations().is_current(generation) {
                    report.cancelled = true;
                    break;
                }

                let midpoints = gap_midpoints(&attempted, total);
                if midpoints.is_empty() {
                    break;
                }
                report.rounds += 1;
                report.requested += midpoints.len();

                let tickets: Vec<LoadTicket> = midpoints
                    .iter()
                    .map(|&idx| self.pipeline.load_frame(idx as i64, Tier::Low, generation))
                    .collect();
                attempted.extend(midpoints);

                for ticket in tickets {
                    report.tally(ticket.wait_or_cancel(generation));
                }
                if report.cancelled || !sleep_unless_cancelled(self.pacing_delay, generation) {
                    report.cancelled = true;
                    break;
                }
            }
        } else {
            report.cancelled = true;
        }

        for ticket in sparse {
            report.tally(ticket.wait_or_cancel(generation));
        }

        if report.cancelled {
            debug!("Preload gen {} superseded after {} rounds", generation.id(), report.rounds);
        } else {
            info!(
                "Preload gen {} done: {} loaded, {} failed, {} rounds in {:.0?}",
                generation.id(),
                report.loaded,
                report.failed,
                report.rounds,
                started.elapsed()
            );
        }
        report
    }

    /// Fire-and-forget loads for `center ± radius` that are neither cached nor
    /// pending. Returns how many were requested.
    pub fn preload_radius(&self, center: usize, generation: &Generation) -> usize {
        if self.radius == 0 {
            return 0;
        }
        let sequence = self.pipeline.sequence();
        let radius = self.radius as i64;
        let cache = self.pipeline.cache(Tier::Low);
        let mut seen = BTreeSet::new();
        let mut requested = 0;
        for offset in -radius..=radius {
            let idx = sequence.wrap(center as i64 + offset);
            if !seen.insert(idx) || cache.contains(idx) || self.pipeline.is_pending(idx, Tier::Low) {
                continue;
            }
            drop(self.pipeline.load_frame(idx as i64, Tier::Low, generation));
            requested += 1;
        }
        requested
    }
}

/// Sleep in short slices. Returns false if `generation` got cancelled.
fn sleep_unless_cancelled(duration: Duration, generation: &Generation) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if generation.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(Duration::from_millis(5)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::generation::GenerationController;
    use crate::core::pipeline::PipelineLimits;
    use crate::core::testing::{wait_until, MockBackend};
    use crate::entities::Sequence;

    fn setup(frames: usize, cap: usize) -> (Arc<MockBackend>, Arc<GenerationController>, PreloadScheduler) {
        let backend = Arc::new(MockBackend::new());
        let generations = Arc::new(GenerationController::new("test"));
        let pipeline = Arc::new(DecodePipeline::new(
            Sequence::new("o/f.", "jpg", frames, 1),
            PipelineLimits { max_concurrent_decodes: 6, max_cache_size: cap, max_high_res_cache_size: 4 },
            backend.clone(),
            Arc::clone(&generations),
        ));
        let config = ViewerConfig {
            total_frames: frames,
            settle_delay_ms: 5,
            pacing_delay_ms: 1,
            preload_radius: 3,
            ..ViewerConfig::default()
        };
        (backend, generations, PreloadScheduler::new(pipeline, &config))
    }

    #[test]
    fn test_sparse_step_grows_with_length() {
        assert_eq!(sparse_step(36), 10);
        assert_eq!(sparse_step(180), 10);
        assert_eq!(sparse_step(360), 15);
        assert_eq!(sparse_step(720), 30);
        assert_eq!(sparse_step(400), 16);
    }

    #[test]
    fn test_gap_midpoints_wrap() {
        let set = BTreeSet::from([0, 10]);
        // gaps: 0->10 (10), 10->0 (10 wrapping)
        assert_eq!(gap_midpoints(&set, 20), vec![5, 15]);

        let single = BTreeSet::from([7]);
        assert_eq!(gap_midpoints(&single, 10), vec![2]);

        let dense: BTreeSet<usize> = (0..10).collect();
        assert!(gap_midpoints(&dense, 10).is_empty());

        // gap of exactly 2 splits to the single frame in between
        assert_eq!(gap_midpoints(&BTreeSet::from([0, 2]), 4), vec![1, 3]);
    }

    #[test]
    fn test_staged_preload_caches_all_180_once_each() {
        let (backend, generations, scheduler) = setup(180, 180);
        let generation = generations.begin_new_generation();

        // First frame drawn before the preload starts
        assert!(scheduler.pipeline.load_frame(37, Tier::Low, &generation).wait().is_ready());

        let report = scheduler.staged_preload(37, &generation);
        assert!(!report.cancelled);
        assert_eq!(report.requested, 179);
        assert_eq!(report.loaded, 179);
        assert!(report.rounds >= 3);

        assert_eq!(scheduler.pipeline.cache(Tier::Low).len(), 180);
        assert_eq!(backend.total_fetches(), 180);
        assert_eq!(backend.max_fetches_per_url(), 1);
    }

    #[test]
    fn test_failures_do_not_stop_the_fill() {
        let (backend, generations, scheduler) = setup(60, 60);
        backend.fail_fetch("o/f.0013_low.jpg");
        backend.fail_decode("o/f.0041_low.jpg");
        let generation = generations.begin_new_generation();

        let report = scheduler.staged_preload(0, &generation);
        assert!(!report.cancelled);
        assert_eq!(report.failed, 2);
        // Everything but the initial frame (never loaded here) and the two bad ones
        assert_eq!(scheduler.pipeline.cache(Tier::Low).len(), 57);
        assert_eq!(backend.max_fetches_per_url(), 1);
    }

    #[test]
    fn test_new_generation_stops_background_run() {
        let (backend, generations, scheduler) = setup(720, 720);
        backend.set_delay(Duration::from_millis(2));
        let generation = generations.begin_new_generation();

        let handle = scheduler.spawn(0, generation).unwrap();
        assert!(backend.wait_for_fetches(5, Duration::from_secs(2)));
        generations.begin_new_generation();

        let report = handle.join().unwrap();
        assert!(report.cancelled);
        assert!(scheduler.pipeline.wait_idle(Duration::from_secs(5)));
        assert!(scheduler.pipeline.cache(Tier::Low).len() < 720);
    }

    #[test]
    fn test_radius_preload_skips_cached_and_pending() {
        let (backend, generations, scheduler) = setup(36, 36);
        let generation = generations.begin_new_generation();
        assert!(scheduler.pipeline.load_frame(0, Tier::Low, &generation).wait().is_ready());

        // 33..=3 around 0, minus the cached 0
        assert_eq!(scheduler.preload_radius(0, &generation), 6);
        assert!(wait_until(Duration::from_secs(2), || scheduler.pipeline.cache(Tier::Low).len() == 7));

        assert_eq!(scheduler.preload_radius(1, &generation), 1);
        assert!(scheduler.pipeline.wait_idle(Duration::from_secs(2)));
        assert_eq!(backend.max_fetches_per_url(), 1);
    }
}
