//! Generation (epoch) controller with per-generation cancellation signals
//!
//! **Why**: Switching sequences or re-initializing must invalidate every decode
//! already queued or in flight. Instead of tracking each request, every request
//! carries the [`Generation`] it was issued under and is checked once, at the
//! point where its result would be committed to a cache.
//!
//! **Used by**: Viewer (main sequence epoch), HighResPromoter (independent
//! promotion epoch), DecodePipeline (commit check), PreloadScheduler (loop exit).

use log::debug;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Shared cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Epoch id plus its cancellation signal. Cheap to clone into tasks.
#[derive(Debug, Clone)]
pub struct Generation {
    id: u64,
    signal: CancelSignal,
}

impl Generation {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn signal(&self) -> &CancelSignal {
        &self.signal
    }

    pub fn is_cancelled(&self) -> bool {
        self.signal.is_cancelled()
    }
}

/// Issues monotonically increasing generations; exactly one is current.
#[derive(Debug)]
pub struct GenerationController {
    /// Current id, readable without the lock
    current_id: AtomicU64,
    current: Mutex<Generation>,
    label: &'static str,
}

impl GenerationController {
    /// Starts at generation 0 (live, not cancelled)
    pub fn new(label: &'static str) -> Self {
        Self {
            current_id: AtomicU64::new(0),
            current: Mutex::new(Generation { id: 0, signal: CancelSignal::new() }),
            label,
        }
    }

    /// Cancel the previous generation, bump the id, return the fresh one.
    pub fn begin_new_generation(&self) -> Generation {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        current.signal.cancel();

        let next = Generation {
            id: current.id + 1,
            signal: CancelSignal::new(),
        };
        self.current_id.store(next.id, Ordering::Release);
        *current = next.clone();

        debug!("{} generation -> {}", self.label, next.id);
        next
    }

    /// Snapshot of the current generation
    pub fn current(&self) -> Generation {
        self.current.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn current_id(&self) -> u64 {
        self.current_id.load(Ordering::Acquire)
    }

    /// True when `generation` is the live one and was not cancelled
    pub fn is_current(&self, generation: &Generation) -> bool {
        !generation.is_cancelled() && self.current_id() == generation.id
    }

    /// Cancel the current generation without starting a new one (teardown).
    pub fn cancel_current(&self) {
        let current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        current.signal.cancel();
        debug!("{} generation {} cancelled", self.label, current.id);
    }
}
