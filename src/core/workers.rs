//! Fixed-size decode worker pool
//!
//! The number of threads IS the decode concurrency ceiling: at most
//! `num_threads` jobs run at once, everything else waits in the injector queue.
//! Nothing is ever rejected for being over the limit.
//!
//! Cancellation is not handled here. Jobs carry their own generation and check
//! it when they start and again when they commit.

use crossbeam::deque::{Injector, Steal};
use log::trace;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Decode worker pool fed from a global FIFO injector.
///
/// # Example
/// ```ignore
/// let workers = Workers::new(6, "decode");
/// workers.execute(move || {
///     // fetch + decode one frame
/// });
/// ```
pub struct Workers {
    injector: Arc<Injector<Job>>,
    handles: Vec<thread::JoinHandle<()>>,
    /// Jobs queued or executing
    pending: Arc<AtomicUsize>,
    shutdown: Arc<AtomicBool>,
}

impl Workers {
    /// Spawn `num_threads` workers (minimum 1), named `{name}-worker-{i}`.
    pub fn new(num_threads: usize, name: &str) -> Self {
        let num_threads = num_threads.max(1);
        let injector: Arc<Injector<Job>> = Arc::new(Injector::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let pending = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::with_capacity(num_threads);
        for worker_id in 0..num_threads {
            let injector = Arc::clone(&injector);
            let shutdown = Arc::clone(&shutdown);
            let pending = Arc::clone(&pending);

            let spawned = thread::Builder::new()
                .name(format!("{}-worker-{}", name, worker_id))
                .spawn(move || {
                    trace!("Worker {} started", worker_id);
                    loop {
                        match injector.steal() {
                            Steal::Success(job) => {
                                job();
                                pending.fetch_sub(1, Ordering::AcqRel);
                                continue;
                            }
                            Steal::Retry => continue,
                            Steal::Empty => {}
                        }

                        // Queue drained: only now honour shutdown
                        if shutdown.load(Ordering::Relaxed) {
                            break;
                        }
                        thread::sleep(Duration::from_millis(1));
                    }
                    trace!("Worker {} stopped", worker_id);
                });

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => log::error!("Failed to spawn {} worker {}: {}", name, worker_id, e),
            }
        }

        trace!("Workers '{}' initialized: {} threads", name, handles.len());

        Self {
            injector,
            handles,
            pending,
            shutdown,
        }
    }

    /// Queue a job. Runs as soon as a worker is free.
    pub fn execute<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pending.fetch_add(1, Ordering::AcqRel);
        self.injector.push(Box::new(f));
    }

    /// Number of worker threads (the concurrency ceiling)
    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Jobs queued or running
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// True when nothing is queued or running
    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }
}

impl Drop for Workers {
    fn drop(&mut self) {
        let num_threads = self.handles.len();
        trace!("Workers shutting down ({} threads)...", num_threads);
        self.shutdown.store(true, Ordering::SeqCst);

        // Stale jobs bail out on their generation check, so draining is quick.
        // Timeout is a safety net for a hung transport.
        let deadline = Instant::now() + Duration::from_millis(2000);
        for handle in std::mem::take(&mut self.handles) {
            while !handle.is_finished() {
                if Instant::now() >= deadline {
                    trace!("Shutdown timeout reached, detaching remaining workers");
                    return;
                }
                thread::sleep(Duration::from_millis(1));
            }
            let _ = handle.join();
        }
        trace!("All {} workers stopped", num_threads);
    }
}
