use std::fmt;
use std::sync::{Mutex, PoisonError};

/// Lifecycle of a range run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Running,
    /// Everything is enqueued; workers are finishing what is left
    Draining,
    /// Stop requested; in-flight identifiers are settling
    Cancelling,
    Completed,
    Paused,
}

impl RunPhase {
    fn rank(&self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Running => 1,
            Self::Draining | Self::Cancelling => 2,
            Self::Completed | Self::Paused => 3,
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Cancelling => "cancelling",
            Self::Completed => "completed",
            Self::Paused => "paused",
        };
        f.write_str(name)
    }
}

/// Shared phase cell; transitions only move forward
#[derive(Debug)]
pub struct PhaseTracker {
    phase: Mutex<RunPhase>,
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self {
            phase: Mutex::new(RunPhase::Idle),
        }
    }

    pub fn get(&self) -> RunPhase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Moves to `next` unless the run is already at or past that stage
    ///
    /// Returns true when the phase changed.
    pub fn advance(&self, next: RunPhase) -> bool {
        let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
        if next.rank() <= phase.rank() {
            return false;
        }
        tracing::debug!("Run phase {} -> {}", *phase, next);
        *phase = next;
        true
    }

    /// Returns to idle so the tracker can serve another run
    pub fn reset(&self) {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = RunPhase::Idle;
    }
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}
