//! Decode pipeline: cache hit -> queue -> wait for a worker slot -> fetch ->
//! decode -> re-check generation -> store
//!
//! **Why**: All background frame work funnels through one place so the three
//! hard rules live in one place too:
//! - at most `max_concurrent_decodes` fetch+decode jobs run at once (the pool size)
//! - a result from a superseded generation is released, never cached
//! - failures are logged once, here, and surfaced as [`LoadOutcome::Failed`]
//!
//! A request for a frame that is already queued or decoding joins that request
//! instead of fetching it again.
//!
//! **Used by**: Viewer (first frame), PreloadScheduler (background fill),
//! HighResPromoter (full-resolution upgrade).

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, trace, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use super::frame_cache::FrameCache;
use super::generation::{Generation, GenerationController};
use super::workers::Workers;
use crate::config::ViewerConfig;
use crate::entities::{FrameBackend, LoadOutcome, Sequence, Tier};

/// `(loaded_count, total_count)` callback, invoked after every cache insertion.
/// `loaded_count` is the low-res cache size.
pub type ProgressObserver = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// How often a cancellable wait re-checks its generation
const CANCEL_POLL: Duration = Duration::from_millis(10);

/// One frame at one tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameKey {
    pub index: usize,
    pub tier: Tier,
}

/// Capacity limits for the pipeline
#[derive(Debug, Clone, Copy)]
pub struct PipelineLimits {
    pub max_concurrent_decodes: usize,
    pub max_cache_size: usize,
    pub max_high_res_cache_size: usize,
}

impl From<&ViewerConfig> for PipelineLimits {
    fn from(config: &ViewerConfig) -> Self {
        Self {
            max_concurrent_decodes: config.max_concurrent_decodes,
            max_cache_size: config.max_cache_size,
            max_high_res_cache_size: config.max_high_res_cache_size,
        }
    }
}

/// Handle to one pending load. Drop it for fire-and-forget.
#[derive(Debug)]
pub struct LoadTicket {
    rx: Receiver<LoadOutcome>,
}

impl LoadTicket {
    fn resolved(outcome: LoadOutcome) -> Self {
        let (tx, rx) = bounded(1);
        let _ = tx.send(outcome);
        Self { rx }
    }

    /// Block until the load resolves
    pub fn wait(self) -> LoadOutcome {
        self.rx.recv().unwrap_or(LoadOutcome::Cancelled)
    }

    /// Block until the load resolves or `generation` is cancelled
    pub fn wait_or_cancel(self, generation: &Generation) -> LoadOutcome {
        loop {
            match self.rx.recv_timeout(CANCEL_POLL) {
                Ok(outcome) => return outcome,
                Err(RecvTimeoutError::Timeout) if generation.is_cancelled() => return LoadOutcome::Cancelled,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return LoadOutcome::Cancelled,
            }
        }
    }

    /// Non-blocking poll; `None` while still in flight
    pub fn try_outcome(&self) -> Option<LoadOutcome> {
        self.rx.try_recv().ok()
    }
}

/// One queued or running request and everyone waiting on it
struct InFlight {
    request: u64,
    generation: Generation,
    scope: Option<Generation>,
    waiters: Vec<Sender<LoadOutcome>>,
}

impl InFlight {
    /// Result can still be committed
    fn is_live(&self) -> bool {
        !self.generation.is_cancelled() && self.scope.as_ref().is_none_or(|s| !s.is_cancelled())
    }

    /// A new request under `generation`/`scope` may share this result.
    /// An unscoped result is good for any scope; a scoped one only for its own.
    fn joinable(&self, generation: &Generation, scope: Option<&Generation>) -> bool {
        let scope_ok = match (&self.scope, scope) {
            (None, _) => true,
            (Some(own), Some(other)) => own.id() == other.id(),
            (Some(_), None) => false,
        };
        scope_ok && self.generation.id() == generation.id() && self.is_live()
    }
}

/// Where a job delivers its outcome
enum Reply {
    /// Every waiter of this tracked request
    Waiters(u64),
    /// One untracked requester
    Direct(Sender<LoadOutcome>),
}

/// State shared with decode jobs
struct Shared {
    sequence: RwLock<Sequence>,
    low: FrameCache,
    high: FrameCache,
    backend: Arc<dyn FrameBackend>,
    generations: Arc<GenerationController>,
    /// Requests issued and not yet resolved
    pending: Mutex<HashMap<FrameKey, InFlight>>,
    next_request: AtomicU64,
    progress: RwLock<Option<ProgressObserver>>,
}

impl Shared {
    fn cache(&self, tier: Tier) -> &FrameCache {
        match tier {
            Tier::Low => &self.low,
            Tier::High => &self.high,
        }
    }

    fn is_live(&self, generation: &Generation, scope: Option<&Generation>) -> bool {
        self.generations.is_current(generation) && scope.is_none_or(|s| !s.is_cancelled())
    }

    /// Runs on a worker thread
    fn run_job(&self, key: FrameKey, url: &str, generation: &Generation, scope: Option<&Generation>) -> LoadOutcome {
        if !self.is_live(generation, scope) {
            trace!("Skip {} (generation {} stale)", url, generation.id());
            return LoadOutcome::Cancelled;
        }

        let cache = self.cache(key.tier);
        if let Some(bitmap) = cache.peek(key.index) {
            return LoadOutcome::Ready(bitmap);
        }

        let bytes = match self.backend.fetch(url) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("{}", e);
                return LoadOutcome::Failed(e);
            }
        };

        let bitmap = match self.backend.decode(url, &bytes) {
            Ok(bitmap) => bitmap,
            Err(e) => {
                warn!("{}", e);
                return LoadOutcome::Failed(e);
            }
        };

        match cache.commit_if(key.index, bitmap.clone(), || self.is_live(generation, scope)) {
            Ok(len) => {
                trace!("Cached {} frame {} ({} in cache)", key.tier, key.index, len);
                let loaded = match key.tier {
                    Tier::Low => len,
                    Tier::High => self.low.len(),
                };
                self.notify_progress(loaded);
                LoadOutcome::Ready(bitmap)
            }
            Err(rejected) => {
                trace!("Released {} (generation {} superseded)", url, generation.id());
                drop(bitmap);
                self.backend.release(rejected);
                LoadOutcome::Cancelled
            }
        }
    }

    fn notify_progress(&self, loaded: usize) {
        let observer = self.progress.read().unwrap_or_else(|e| e.into_inner()).clone();
        if let Some(observer) = observer {
            let total = self.sequence.read().unwrap_or_else(|e| e.into_inner()).logical_frame_count();
            observer(loaded.min(total), total);
        }
    }

    /// Hand the outcome to every waiter of `request`
    fn finish(&self, key: FrameKey, request: u64, outcome: LoadOutcome) {
        let waiters = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            match pending.get(&key) {
                Some(entry) if entry.request == request => pending.remove(&key).map(|e| e.waiters),
                _ => None,
            }
        };
        for tx in waiters.unwrap_or_default() {
            let _ = tx.send(outcome.clone());
        }
    }
}

/// Bounded concurrent fetch+decode into the two tier caches
pub struct DecodePipeline {
    shared: Arc<Shared>,
    workers: Workers,
}

impl DecodePipeline {
    pub fn new(
        sequence: Sequence,
        limits: PipelineLimits,
        backend: Arc<dyn FrameBackend>,
        generations: Arc<GenerationController>,
    ) -> Self {
        debug!(
            "DecodePipeline: {} frames, ceiling={}, low cap={}, high cap={}",
            sequence.logical_frame_count(),
            limits.max_concurrent_decodes,
            limits.max_cache_size,
            limits.max_high_res_cache_size
        );

        let shared = Shared {
            sequence: RwLock::new(sequence),
            low: FrameCache::new(Tier::Low, limits.max_cache_size, Arc::clone(&backend)),
            high: FrameCache::new(Tier::High, limits.max_high_res_cache_size, Arc::clone(&backend)),
            backend,
            generations,
            pending: Mutex::new(HashMap::new()),
            next_request: AtomicU64::new(0),
            progress: RwLock::new(None),
        };

        Self {
            shared: Arc::new(shared),
            workers: Workers::new(limits.max_concurrent_decodes, "decode"),
        }
    }

    /// Request frame `index` (any integer) at `tier` under `generation`.
    pub fn load_frame(&self, index: i64, tier: Tier, generation: &Generation) -> LoadTicket {
        self.load_scoped(index, tier, generation, None)
    }

    /// Like [`load_frame`](Self::load_frame), additionally cancelled by `scope`
    /// (an independent generation, e.g. the high-res promotion channel).
    pub fn load_scoped(&self, index: i64, tier: Tier, generation: &Generation, scope: Option<&Generation>) -> LoadTicket {
        let (idx, url) = {
            let sequence = self.shared.sequence.read().unwrap_or_else(|e| e.into_inner());
            let idx = sequence.wrap(index);
            (idx, sequence.frame_url(idx as i64, tier))
        };
        let key = FrameKey { index: idx, tier };

        if let Some(bitmap) = self.shared.cache(tier).peek(idx) {
            return LoadTicket::resolved(LoadOutcome::Ready(bitmap));
        }
        if !self.shared.is_live(generation, scope) {
            return LoadTicket::resolved(LoadOutcome::Cancelled);
        }

        let (tx, rx) = bounded(1);
        let reply = {
            let mut pending = self.shared.pending.lock().unwrap_or_else(|e| e.into_inner());
            match pending.get_mut(&key) {
                Some(entry) if entry.joinable(generation, scope) => {
                    trace!("Join in-flight {} frame {}", tier, idx);
                    entry.waiters.push(tx);
                    return LoadTicket { rx };
                }
                // A live request we may not join holds the slot; answer directly
                Some(entry) if entry.is_live() => Reply::Direct(tx),
                // Stale entry (if any) is replaced; its waiters see Cancelled
                _ => {
                    let request = self.shared.next_request.fetch_add(1, Ordering::Relaxed);
                    let entry = InFlight {
                        request,
                        generation: generation.clone(),
                        scope: scope.cloned(),
                        waiters: vec![tx],
                    };
                    pending.insert(key, entry);
                    Reply::Waiters(request)
                }
            }
        };

        let shared = Arc::clone(&self.shared);
        let generation = generation.clone();
        let scope = scope.cloned();
        self.workers.execute(move || {
            let outcome = shared.run_job(key, &url, &generation, scope.as_ref());
            match reply {
                Reply::Waiters(request) => shared.finish(key, request, outcome),
                Reply::Direct(tx) => {
                    let _ = tx.send(outcome);
                }
            }
        });

        LoadTicket { rx }
    }

    pub fn cache(&self, tier: Tier) -> &FrameCache {
        self.shared.cache(tier)
    }

    pub fn generations(&self) -> &Arc<GenerationController> {
        &self.shared.generations
    }

    pub fn sequence(&self) -> Sequence {
        self.shared.sequence.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Point at a new sequence. Call after starting a new generation.
    pub fn set_sequence(&self, sequence: Sequence) {
        *self.shared.sequence.write().unwrap_or_else(|e| e.into_inner()) = sequence;
    }

    pub fn logical_frame_count(&self) -> usize {
        self.shared.sequence.read().unwrap_or_else(|e| e.into_inner()).logical_frame_count()
    }

    pub fn set_progress_observer(&self, observer: Option<ProgressObserver>) {
        *self.shared.progress.write().unwrap_or_else(|e| e.into_inner()) = observer;
    }

    /// True if a request for this frame under the current generation is unresolved
    pub fn is_pending(&self, index: usize, tier: Tier) -> bool {
        let current = self.shared.generations.current_id();
        let pending = self.shared.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending
            .get(&FrameKey { index, tier })
            .is_some_and(|entry| entry.generation.id() == current)
    }

    /// Requests queued or running
    pub fn in_flight(&self) -> usize {
        self.workers.pending()
    }

    /// Concurrency ceiling
    pub fn max_concurrent(&self) -> usize {
        self.workers.size()
    }

    /// Release both caches and forget pending requests.
    /// The caller must have started a new generation first.
    pub fn reset(&self) -> usize {
        let released = self.shared.low.clear() + self.shared.high.clear();
        self.shared.pending.lock().unwrap_or_else(|e| e.into_inner()).clear();
        debug!("DecodePipeline reset: {} bitmaps released", released);
        released
    }

    /// Wait until no request is queued or running. Returns false on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.workers.is_idle() {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        true
    }
}
