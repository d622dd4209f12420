//! High-res promotion of the settled frame
//!
//! **Why**: Low-res frames are what makes dragging smooth; once the user lets
//! go, the frame under the cursor gets upgraded to full resolution. Promotions
//! run on their own cancellation channel so renewed dragging can abort them
//! without touching the main preload generation.
//!
//! **Used by**: Viewer (fired by the pointer-up debounce, cancelled on pointer-down)

use log::{debug, trace};

use super::generation::{Generation, GenerationController};
use super::pipeline::{DecodePipeline, LoadTicket};
use crate::entities::{Bitmap, LoadOutcome, Tier};

/// Result of a `promote` call
#[derive(Debug)]
pub enum Promotion {
    /// High-res bitmap was already cached; no request issued
    AlreadyCached(Bitmap),
    /// Request issued; see [`HighResPromoter::poll`]
    Requested(usize),
    /// Main generation is gone (viewer torn down or switching)
    Skipped,
}

/// At most one in-flight high-res request at a time
pub struct HighResPromoter {
    generations: GenerationController,
    active: Option<(usize, LoadTicket)>,
}

impl HighResPromoter {
    pub fn new() -> Self {
        Self {
            generations: GenerationController::new("promotion"),
            active: None,
        }
    }

    /// Cancel any previous promotion and upgrade `frame`.
    pub fn promote(&mut self, frame: usize, pipeline: &DecodePipeline, generation: &Generation) -> Promotion {
        let scope = self.generations.begin_new_generation();
        self.active = None;

        if let Some(bitmap) = pipeline.cache(Tier::High).get(frame) {
            trace!("Promotion: frame {} already high-res", frame);
            return Promotion::AlreadyCached(bitmap);
        }
        if !pipeline.generations().is_current(generation) {
            return Promotion::Skipped;
        }

        debug!("Promotion {}: requesting high-res frame {}", scope.id(), frame);
        let ticket = pipeline.load_scoped(frame as i64, Tier::High, generation, Some(&scope));
        self.active = Some((frame, ticket));
        Promotion::Requested(frame)
    }

    /// Non-blocking check on the active request. Returns the frame once its
    /// high-res bitmap has landed in the cache.
    pub fn poll(&mut self) -> Option<usize> {
        let outcome = self.active.as_ref()?.1.try_outcome()?;
        let (frame, _) = self.active.take()?;
        match outcome {
            LoadOutcome::Ready(_) => {
                debug!("Promotion: frame {} upgraded", frame);
                Some(frame)
            }
            // Already logged by the decode worker; low-res stays on screen
            LoadOutcome::Failed(_) => None,
            LoadOutcome::Cancelled => {
                trace!("Promotion: frame {} cancelled", frame);
                None
            }
        }
    }

    /// Abort the in-flight request, if any
    pub fn cancel(&mut self) {
        self.generations.begin_new_generation();
        if let Some((frame, _)) = self.active.take() {
            trace!("Promotion: frame {} superseded", frame);
        }
    }

    /// Frame currently being upgraded
    pub fn pending_frame(&self) -> Option<usize> {
        self.active.as_ref().map(|(frame, _)| *frame)
    }

    pub fn is_pending(&self) -> bool {
        self.active.is_some()
    }
}

impl Default for HighResPromoter {
    fn default() -> Self {
        Self::new()
    }
}
