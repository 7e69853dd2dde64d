//! Shared run counters
//!
//! All cross-worker tallies live behind one lock so that a snapshot always
//! satisfies `processed = success + failure + ambiguous`. The same lock guards
//! the completion watermark that becomes the checkpoint's `last_id`.

use crate::state::{Outcome, ScrapeState, SystemMode};
use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Tracks the largest identifier below which everything has completed
///
/// Workers finish out of order, so completions above the current floor are
/// parked until the gap beneath them closes.
#[derive(Debug, Default)]
struct Watermark {
    floor: u64,
    completed_above: BTreeSet<u64>,
}

impl Watermark {
    fn raise_floor(&mut self, floor: u64) {
        if floor > self.floor {
            self.floor = floor;
            self.completed_above = self.completed_above.split_off(&(floor + 1));
            self.settle();
        }
    }

    fn complete(&mut self, id: u64) {
        if id > self.floor {
            self.completed_above.insert(id);
            self.settle();
        }
    }

    fn settle(&mut self) {
        while self.completed_above.remove(&(self.floor + 1)) {
            self.floor += 1;
        }
    }
}

#[derive(Debug)]
struct Tally {
    state: ScrapeState,
    watermark: Watermark,
}

impl Tally {
    /// Copies the watermark into the checkpoint's `last_id`, never lowering it
    fn sync_resume_point(&mut self) {
        let floor = self.watermark.floor;
        if floor > self.state.last_processed_id {
            self.state.last_processed_id = floor;
        }
    }
}

/// Counters shared by every worker of a run
#[derive(Debug)]
pub struct RunCounters {
    inner: Mutex<Tally>,
}

impl RunCounters {
    /// Creates empty counters for a fresh run
    pub fn new(mode: SystemMode) -> Self {
        Self::from_state(ScrapeState::new(mode))
    }

    /// Restores counters from a loaded checkpoint
    pub fn from_state(state: ScrapeState) -> Self {
        let watermark = Watermark {
            floor: state.last_processed_id,
            completed_above: BTreeSet::new(),
        };
        Self {
            inner: Mutex::new(Tally { state, watermark }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Tally> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Marks everything before `first_id` as already resolved
    ///
    /// Called once per range before any identifier is dispatched, so the
    /// watermark can advance from the first identifier of the range. The
    /// resume point moves up to `first_id - 1` as well, so a run stopped
    /// before anything settles still resumes at `first_id`.
    pub fn begin_range(&self, first_id: u64) {
        let mut tally = self.lock();
        tally.watermark.raise_floor(first_id.saturating_sub(1));
        tally.sync_resume_point();
    }

    /// Records the outcome of one identifier and returns the resulting state
    ///
    /// With `advance_watermark` false only the counters move; this is how a
    /// single-identifier lookup leaves the range resume point untouched.
    pub fn record(&self, id: u64, outcome: &Outcome, advance_watermark: bool) -> ScrapeState {
        let mut tally = self.lock();

        match outcome {
            Outcome::Success(_) => tally.state.success_count += 1,
            Outcome::Challenge => tally.state.ambiguous_count += 1,
            Outcome::HardFailure(_) => tally.state.failure_count += 1,
        }
        tally.state.processed_count += 1;

        if advance_watermark {
            tally.watermark.complete(id);
            tally.sync_resume_point();
        }

        tally.state.clone()
    }

    /// Returns a consistent copy of the current state
    pub fn snapshot(&self) -> ScrapeState {
        self.lock().state.clone()
    }

    pub fn mode(&self) -> SystemMode {
        self.lock().state.mode
    }

    pub fn set_mode(&self, mode: SystemMode) {
        self.lock().state.mode = mode;
    }
}
