//! Viewer - one embedded 360° frame-sequence viewer instance
//!
//! Owns the canvas, the per-viewer state and every engine component. Lifecycle
//! is `init` -> (pointer events, resize, sequence switches, ticks) -> `destroy`.
//!
//! # Threads
//!
//! Everything here runs on the host thread that owns the canvas. Background
//! work lives in the decode pool and in one preload thread per generation;
//! both only ever touch the caches, never the canvas.
//!
//! # Generations
//!
//! `init` and `change_sequence` start a new generation before issuing any
//! load. Work from older generations is released instead of cached.

use log::{debug, error, info, warn};
use serde::Serialize;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::debounce::Debouncer;
use super::generation::{Generation, GenerationController};
use super::interaction::{DragSettings, InteractionController};
use super::pipeline::{DecodePipeline, PipelineLimits, ProgressObserver};
use super::preload::{PreloadReport, PreloadScheduler};
use super::promoter::{HighResPromoter, Promotion};
use super::render::{DrawOutcome, RenderLoop};
use super::rotate::{AutoRotate, RotationRun};
use crate::config::ViewerConfig;
use crate::entities::{Canvas, FrameBackend, Tier, ViewerError, ViewerState};

/// Snapshot of engine counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ViewerStats {
    pub generation: u64,
    pub total_frames: usize,
    pub low_cached: usize,
    pub high_cached: usize,
    pub in_flight: usize,
    pub low_hit_rate: f64,
}

/// What one `tick` did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub draw: DrawOutcome,
    /// A high-res frame landed this tick
    pub promoted: Option<usize>,
    /// An auto-rotation reached its end frame this tick
    pub rotation_finished: bool,
}

pub struct Viewer<C: Canvas> {
    canvas: C,
    config: ViewerConfig,
    state: ViewerState,
    generation: Generation,
    pipeline: Arc<DecodePipeline>,
    preloader: PreloadScheduler,
    preload: Option<JoinHandle<PreloadReport>>,
    promoter: HighResPromoter,
    promote_debounce: Debouncer<usize>,
    interaction: InteractionController,
    render: RenderLoop,
    rotation: Option<RotationRun>,
    destroyed: bool,
}

impl<C: Canvas> Viewer<C> {
    /// Set up the viewer and draw `initial_frame`. Returns once it is on the canvas.
    pub fn init(canvas: C, initial_frame: usize, config: ViewerConfig, backend: Arc<dyn FrameBackend>) -> Result<Self, ViewerError> {
        Self::init_with_progress(canvas, initial_frame, config, backend, None)
    }

    /// [`init`](Self::init) with a progress observer registered before the first load
    pub fn init_with_progress(
        mut canvas: C,
        initial_frame: usize,
        config: ViewerConfig,
        backend: Arc<dyn FrameBackend>,
        progress: Option<ProgressObserver>,
    ) -> Result<Self, ViewerError> {
        config.validate()?;
        if !canvas.acquire_context() {
            error!("Viewer init: no drawable context");
            return Err(ViewerError::ContextUnavailable);
        }

        let generations = Arc::new(GenerationController::new("sequence"));
        let pipeline = Arc::new(DecodePipeline::new(
            config.sequence(),
            PipelineLimits::from(&config),
            backend,
            Arc::clone(&generations),
        ));
        pipeline.set_progress_observer(progress);
        let generation = generations.begin_new_generation();

        let mut viewer = Self {
            canvas,
            preloader: PreloadScheduler::new(Arc::clone(&pipeline), &config),
            promote_debounce: Debouncer::new(config.promote_delay_ms),
            interaction: InteractionController::new(DragSettings::from(&config)),
            render: RenderLoop::new(config.damping, config.crossfade),
            state: ViewerState::default(),
            generation,
            pipeline,
            preload: None,
            promoter: HighResPromoter::new(),
            rotation: None,
            destroyed: false,
            config,
        };
        viewer.on_host_resize();

        info!(
            "Viewer init: {} frames from '{}' (.{}), starting at {}",
            viewer.pipeline.logical_frame_count(),
            viewer.config.base_path,
            viewer.config.extension,
            initial_frame
        );
        viewer.start_generation(initial_frame).inspect_err(|e| error!("Viewer init: first frame failed: {}", e))?;
        Ok(viewer)
    }

    /// Show `start_frame` of the current sequence and start the preload behind it
    fn start_generation(&mut self, start_frame: usize) -> Result<(), ViewerError> {
        let start = self.pipeline.sequence().wrap(start_frame as i64);
        self.state = ViewerState::at(start);
        self.render.invalidate();

        let first = self.pipeline.load_frame(start as i64, Tier::Low, &self.generation).wait();
        if !first.is_ready() {
            return first.into_result().map(|_| ());
        }
        self.render.tick(&mut self.state, &self.pipeline, &mut self.canvas);

        match self.preloader.spawn(start, self.generation.clone()) {
            Ok(handle) => self.preload = Some(handle),
            Err(e) => warn!("Failed to spawn preload thread: {}", e),
        }
        Ok(())
    }

    /// Cancel the running preload thread's generation first, then call this
    fn join_preload(&mut self) {
        if let Some(handle) = self.preload.take() {
            match handle.join() {
                Ok(report) => debug!("Preload joined: {:?}", report),
                Err(_) => warn!("Preload thread panicked"),
            }
        }
    }

    fn cancel_pending_promotion(&mut self) {
        self.promote_debounce.cancel();
        self.promoter.cancel();
    }

    pub fn pointer_down(&mut self, x: f32, _y: f32, pointer_id: i32) {
        if self.destroyed {
            return;
        }
        self.rotation = None;
        self.cancel_pending_promotion();
        self.interaction.pointer_down(x, pointer_id, &mut self.state);
        self.canvas.set_pointer_capture(pointer_id);

        let target = self.state.target_frame;
        let dropped = self.pipeline.cache(Tier::High).retain(|idx| idx == target);
        if dropped > 0 {
            debug!("Drag start: dropped {} high-res frames", dropped);
        }
    }

    pub fn pointer_move(&mut self, x: f32, _y: f32) {
        if self.destroyed {
            return;
        }
        let total = self.pipeline.logical_frame_count();
        let (client_width, _) = self.canvas.client_size();
        if let Some(target) = self.interaction.pointer_move(x, &mut self.state, total, client_width) {
            self.preloader.preload_radius(target, &self.generation);
        }
    }

    pub fn pointer_up(&mut self, pointer_id: i32) {
        if self.destroyed {
            return;
        }
        if let Some(target) = self.interaction.pointer_up(&mut self.state) {
            self.canvas.release_pointer_capture(pointer_id);
            self.promote_debounce.schedule(target);
        }
    }

    /// Re-derive the backing store from the client size and pixel ratio
    pub fn on_host_resize(&mut self) {
        let (width, height) = self.canvas.client_size();
        let dpr = self.canvas.device_pixel_ratio().max(1.0);
        let backing = (
            (width * dpr).round().max(1.0) as u32,
            (height * dpr).round().max(1.0) as u32,
        );
        self.canvas.set_backing_size(backing.0, backing.1);
        self.render.set_backing(backing.0, backing.1);
        debug!("Resize: {}x{} @{} -> {}x{}", width, height, dpr, backing.0, backing.1);
    }

    /// Tear down the current sequence and restart from `start_frame` of another one.
    ///
    /// An error means the new first frame could not be shown; the viewer stays
    /// on the new sequence and the preload keeps filling it.
    pub fn change_sequence(&mut self, base_path: &str, extension: &str, start_frame: usize) -> Result<(), ViewerError> {
        if self.destroyed {
            return Err(ViewerError::Cancelled);
        }
        self.generation = self.pipeline.generations().begin_new_generation();
        self.join_preload();
        self.cancel_pending_promotion();
        self.rotation = None;
        self.interaction.reset(&mut self.state);

        let released = self.pipeline.reset();
        let sequence = self.pipeline.sequence().relocated(base_path, extension);
        self.config.base_path = sequence.base_path.clone();
        self.config.extension = sequence.extension.clone();
        self.pipeline.set_sequence(sequence);
        info!(
            "Sequence switch to '{}' (.{}), gen {}, {} bitmaps released",
            self.config.base_path,
            self.config.extension,
            self.generation.id(),
            released
        );

        let result = self.start_generation(start_frame);
        if let Err(e) = &result {
            warn!("Sequence switch: first frame failed: {}", e);
            match self.preloader.spawn(self.state.target_frame, self.generation.clone()) {
                Ok(handle) => self.preload = Some(handle),
                Err(e) => warn!("Failed to spawn preload thread: {}", e),
            }
        }
        result
    }

    /// Animate the target from `options.start_frame` to `options.end_frame`
    pub fn auto_rotate(&mut self, options: AutoRotate) {
        if self.destroyed || self.interaction.is_dragging() {
            return;
        }
        self.cancel_pending_promotion();
        let run = RotationRun::new(options, self.pipeline.logical_frame_count());
        debug!("Auto-rotate over {} frames in {}ms", run.distance(), options.duration_ms);
        self.state.target_frame = run.sample(Instant::now()).0;
        self.rotation = Some(run);
    }

    /// One animation frame: auto-rotation, due promotion, then draw
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();
        if self.destroyed {
            return report;
        }

        if let Some(run) = &self.rotation {
            let (frame, done) = run.sample(Instant::now());
            self.state.target_frame = frame;
            if done {
                self.rotation = None;
                self.promote_debounce.schedule(frame);
                report.rotation_finished = true;
            }
        }

        if let Some(frame) = self.promote_debounce.tick() {
            if let Promotion::AlreadyCached(_) = self.promoter.promote(frame, &self.pipeline, &self.generation) {
                self.render.force_redraw();
            }
        }
        report.promoted = self.promoter.poll();

        report.draw = self.render.tick(&mut self.state, &self.pipeline, &mut self.canvas);
        report
    }

    /// Preload finished and no promotion pending or in flight
    pub fn is_settled(&self) -> bool {
        self.preload.as_ref().is_none_or(|h| h.is_finished())
            && !self.promote_debounce.is_pending()
            && !self.promoter.is_pending()
            && self.rotation.is_none()
    }

    pub fn set_progress_observer(&self, observer: Option<ProgressObserver>) {
        self.pipeline.set_progress_observer(observer);
    }

    pub fn stats(&self) -> ViewerStats {
        let low = self.pipeline.cache(Tier::Low);
        ViewerStats {
            generation: self.pipeline.generations().current_id(),
            total_frames: self.pipeline.logical_frame_count(),
            low_cached: low.len(),
            high_cached: self.pipeline.cache(Tier::High).len(),
            in_flight: self.pipeline.in_flight(),
            low_hit_rate: low.stats().hit_rate(),
        }
    }

    /// Cancel all work, release every cached bitmap and detach from the canvas
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.pipeline.generations().cancel_current();
        self.cancel_pending_promotion();
        self.rotation = None;
        self.interaction.reset(&mut self.state);
        self.join_preload();
        let released = self.pipeline.reset();
        self.canvas.detach();
        info!("Viewer destroyed, {} bitmaps released", released);
    }

    /// Wait for queued decodes to drain. Returns false on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.pipeline.wait_idle(timeout)
    }

    pub fn canvas(&self) -> &C {
        &self.canvas
    }

    pub fn canvas_mut(&mut self) -> &mut C {
        &mut self.canvas
    }

    pub fn state(&self) -> &ViewerState {
        &self.state
    }

    pub fn target_frame(&self) -> usize {
        self.state.target_frame
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &Arc<DecodePipeline> {
        &self.pipeline
    }

    pub fn last_drawn(&self) -> Option<(usize, Tier)> {
        self.render.last_drawn()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

impl<C: Canvas> Drop for Viewer<C> {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::{wait_until, MockBackend, RecordingCanvas};
    use crate::raster::RasterCanvas;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config(frames: usize) -> ViewerConfig {
        ViewerConfig {
            total_frames: frames,
            base_path: "o/day.".into(),
            extension: "jpg".into(),
            sensitivity: 1.0,
            pixels_per_rotation: Some(360.0),
            max_frames_per_move: 60,
            promote_delay_ms: 20,
            settle_delay_ms: 5,
            pacing_delay_ms: 1,
            ..ViewerConfig::default()
        }
    }

    fn viewer(frames: usize) -> (Arc<MockBackend>, Viewer<RecordingCanvas>) {
        let backend = Arc::new(MockBackend::new());
        let viewer = Viewer::init(RecordingCanvas::new(360.0, 240.0), 0, config(frames), backend.clone()).unwrap();
        (backend, viewer)
    }

    fn high_fetches(backend: &MockBackend) -> Vec<String> {
        backend.fetch_log().into_iter().filter(|url| !url.ends_with("_low.jpg")).collect()
    }

    #[test]
    fn test_init_draws_first_frame() {
        let backend = Arc::new(MockBackend::new());
        let viewer = Viewer::init(RecordingCanvas::new(360.0, 240.0), 190, config(180), backend.clone()).unwrap();

        assert_eq!(viewer.target_frame(), 10);
        assert_eq!(viewer.last_drawn(), Some((10, Tier::Low)));
        assert_eq!(viewer.canvas().backing, (360, 240));
        assert_eq!(viewer.canvas().draws.len(), 1);
        assert!(backend.fetch_count("o/day.0010_low.jpg") >= 1);
    }

    #[test]
    fn test_drag_release_promotes_latest_target_once() {
        let (backend, mut viewer) = viewer(180);

        viewer.pointer_down(100.0, 50.0, 7);
        viewer.pointer_move(130.0, 50.0);
        viewer.pointer_move(160.0, 50.0);
        viewer.pointer_move(190.0, 50.0);
        assert_eq!(viewer.target_frame(), 45);
        viewer.pointer_up(7);
        // Late moves after release do nothing
        viewer.pointer_move(400.0, 50.0);
        assert_eq!(viewer.target_frame(), 45);
        assert_eq!(viewer.canvas().captured, vec![7]);
        assert_eq!(viewer.canvas().released, vec![7]);

        assert!(wait_until(Duration::from_secs(5), || {
            viewer.tick();
            viewer.last_drawn() == Some((45, Tier::High))
        }));
        assert_eq!(high_fetches(&backend), vec!["o/day.0045.jpg".to_string()]);

        // Second promotion of the same frame is free
        viewer.pointer_down(190.0, 50.0, 8);
        viewer.pointer_up(8);
        std::thread::sleep(Duration::from_millis(30));
        viewer.tick();
        assert_eq!(high_fetches(&backend).len(), 1);
        assert_eq!(viewer.pipeline().cache(Tier::High).keys(), vec![45]);
    }

    #[test]
    fn test_redrag_before_debounce_skips_promotion() {
        let (backend, mut viewer) = viewer(180);
        viewer.pointer_down(0.0, 0.0, 1);
        viewer.pointer_move(20.0, 0.0);
        viewer.pointer_up(1);
        viewer.pointer_down(20.0, 0.0, 1);

        std::thread::sleep(Duration::from_millis(40));
        viewer.tick();
        assert!(high_fetches(&backend).is_empty());
    }

    #[test]
    fn test_context_unavailable() {
        let result = Viewer::init(RecordingCanvas::without_context(), 0, config(36), Arc::new(MockBackend::new()));
        assert!(matches!(result, Err(ViewerError::ContextUnavailable)));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let bad = ViewerConfig { total_frames: 0, ..config(36) };
        let result = Viewer::init(RecordingCanvas::new(10.0, 10.0), 0, bad, Arc::new(MockBackend::new()));
        assert!(matches!(result, Err(ViewerError::InvalidConfig(_))));
    }

    #[test]
    fn test_first_frame_failure_surfaces() {
        let backend = Arc::new(MockBackend::new());
        backend.fail_fetch("o/day.0000_low.jpg");
        let result = Viewer::init(RecordingCanvas::new(10.0, 10.0), 0, config(36), backend);
        assert!(matches!(result, Err(ViewerError::FetchFailed { .. })));
    }

    #[test]
    fn test_change_sequence_then_destroy_releases_everything() {
        let (backend, mut viewer) = viewer(180);
        backend.set_delay(Duration::from_millis(1));

        viewer.change_sequence("o/night.", "jpg", 90).unwrap();
        assert_eq!(viewer.target_frame(), 90);
        assert_eq!(viewer.last_drawn(), Some((90, Tier::Low)));
        assert!(backend.fetch_count("o/night.0090_low.jpg") >= 1);

        viewer.destroy();
        assert!(viewer.wait_idle(Duration::from_secs(5)));
        assert!(viewer.canvas().detached);
        assert!(viewer.pipeline().cache(Tier::Low).is_empty());
        assert_eq!(backend.released(), backend.decoded());
    }

    #[test]
    fn test_resize_forces_redraw() {
        let (_backend, mut viewer) = viewer(36);
        let draws = viewer.canvas().draws.len();
        assert_eq!(viewer.tick().draw, DrawOutcome::Unchanged);

        viewer.canvas_mut().client = (200.0, 100.0);
        viewer.canvas_mut().dpr = 2.0;
        viewer.on_host_resize();
        assert_eq!(viewer.canvas().backing, (400, 200));
        assert!(matches!(viewer.tick().draw, DrawOutcome::Drawn { index: 0, .. }));
        assert_eq!(viewer.canvas().draws.len(), draws + 1);
    }

    #[test]
    fn test_preload_fills_and_reports_progress() {
        let backend = Arc::new(MockBackend::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let observer: ProgressObserver = Arc::new(move |loaded, total| {
            assert!(loaded <= total);
            seen.fetch_add(1, Ordering::SeqCst);
        });
        let mut viewer =
            Viewer::init_with_progress(RecordingCanvas::new(100.0, 100.0), 0, config(36), backend, Some(observer)).unwrap();

        assert!(wait_until(Duration::from_secs(5), || {
            viewer.tick();
            viewer.is_settled()
        }));
        let stats = viewer.stats();
        assert_eq!((stats.low_cached, stats.total_frames), (36, 36));
        assert_eq!(calls.load(Ordering::SeqCst), 36);
    }

    #[test]
    fn test_drag_during_preload_fetches_each_frame_once() {
        let backend = Arc::new(MockBackend::new());
        backend.set_delay(Duration::from_millis(1));
        let config = ViewerConfig { preload_radius: 40, ..config(180) };
        let mut viewer = Viewer::init(RecordingCanvas::new(360.0, 240.0), 0, config, backend.clone()).unwrap();

        viewer.pointer_down(0.0, 0.0, 1);
        for step in 1..=90 {
            viewer.pointer_move(step as f32 * 2.0, 0.0);
            viewer.tick();
        }
        viewer.pointer_up(1);
        assert!(wait_until(Duration::from_secs(10), || {
            viewer.tick();
            viewer.is_settled()
        }));
        assert!(viewer.wait_idle(Duration::from_secs(5)));

        assert_eq!(viewer.stats().low_cached, 180);
        assert_eq!(backend.max_fetches_per_url(), 1);
    }

    #[test]
    fn test_promotion_reports_progress() {
        let backend = Arc::new(MockBackend::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let observer: ProgressObserver = Arc::new(move |_, _| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        let mut viewer =
            Viewer::init_with_progress(RecordingCanvas::new(360.0, 240.0), 0, config(36), backend, Some(observer)).unwrap();
        assert!(wait_until(Duration::from_secs(5), || {
            viewer.tick();
            viewer.is_settled()
        }));
        assert_eq!(calls.load(Ordering::SeqCst), 36);

        viewer.pointer_down(0.0, 0.0, 1);
        viewer.pointer_move(50.0, 0.0);
        viewer.pointer_up(1);
        assert!(wait_until(Duration::from_secs(5), || {
            viewer.tick();
            viewer.last_drawn() == Some((5, Tier::High))
        }));
        assert_eq!(calls.load(Ordering::SeqCst), 37);
    }

    #[test]
    fn test_auto_rotate_lands_and_promotes() {
        let (backend, mut viewer) = viewer(36);
        viewer.auto_rotate(AutoRotate { start_frame: 0, end_frame: 12, duration_ms: 30, ..Default::default() });

        let mut finished = false;
        assert!(wait_until(Duration::from_secs(5), || {
            finished |= viewer.tick().rotation_finished;
            viewer.last_drawn() == Some((12, Tier::High))
        }));
        assert!(finished);
        assert_eq!(high_fetches(&backend), vec!["o/day.0012.jpg".to_string()]);
    }

    #[test]
    fn test_calls_after_destroy_are_inert() {
        let (backend, mut viewer) = viewer(36);
        viewer.destroy();
        assert!(viewer.is_destroyed());
        let fetches = backend.total_fetches();
        viewer.pointer_down(0.0, 0.0, 1);
        viewer.pointer_move(100.0, 0.0);
        assert_eq!(viewer.tick(), TickReport::default());
        assert!(matches!(viewer.change_sequence("x.", "png", 0), Err(ViewerError::Cancelled)));
        assert_eq!(backend.total_fetches(), fetches);
    }

    #[test]
    fn test_raster_host_resize_and_teardown() {
        let backend = Arc::new(MockBackend::new());
        let mut viewer = Viewer::init(RasterCanvas::new(100.0, 50.0), 0, config(36), backend).unwrap();
        assert_eq!(viewer.canvas().surface().dimensions(), (100, 50));

        viewer.canvas_mut().set_client_size(150.0, 75.0, 2.0);
        viewer.on_host_resize();
        viewer.tick();
        assert_eq!(viewer.canvas().surface().dimensions(), (300, 150));
        assert_eq!(*viewer.canvas().surface().get_pixel(0, 0), image::Rgba([200, 100, 50, 255]));

        viewer.destroy();
        assert!(viewer.canvas().is_detached());
    }
}
