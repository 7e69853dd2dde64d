//! Sweep statistics
//!
//! This module derives throughput and totals from the dispatcher's shared
//! counters and prints them for humans.

use crate::state::{now_unix_seconds, RunCounters, ScrapeState, SystemMode};
use std::sync::Arc;
use std::time::Duration;

/// Point-in-time view of a run's progress
#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub processed: u64,
    pub success: u64,
    pub failure: u64,
    pub ambiguous: u64,
    pub elapsed: Duration,
    /// Identifiers processed per minute
    pub throughput: f64,
    pub mode: SystemMode,
    pub last_processed_id: u64,
}

impl StatsSnapshot {
    /// Builds a snapshot from a state, measuring elapsed time up to `now`
    ///
    /// # Arguments
    ///
    /// * `state` - Counters and start time of the run
    /// * `now` - Current time as Unix seconds
    pub fn from_state(state: &ScrapeState, now: f64) -> Self {
        let elapsed_secs = (now - state.start_time).max(0.0);

        // Under a second the rate is meaningless
        let throughput = if elapsed_secs < 1.0 {
            0.0
        } else {
            state.processed_count as f64 / (elapsed_secs / 60.0)
        };

        Self {
            processed: state.processed_count,
            success: state.success_count,
            failure: state.failure_count,
            ambiguous: state.ambiguous_count,
            elapsed: Duration::try_from_secs_f64(elapsed_secs).unwrap_or(Duration::MAX),
            throughput,
            mode: state.mode,
            last_processed_id: state.last_processed_id,
        }
    }
}

/// Read-only view over a run's counters
#[derive(Debug, Clone)]
pub struct StatsReporter {
    counters: Arc<RunCounters>,
}

impl StatsReporter {
    pub fn new(counters: Arc<RunCounters>) -> Self {
        Self { counters }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot::from_state(&self.counters.snapshot(), now_unix_seconds())
    }

    /// Logs a one-line progress summary
    pub fn log_progress(&self) {
        let stats = self.snapshot();
        tracing::info!(
            "Progress: {} processed ({} ok, {} failed, {} captcha), {:.2} req/min, watermark {}",
            stats.processed,
            stats.success,
            stats.failure,
            stats.ambiguous,
            stats.throughput,
            stats.last_processed_id
        );
    }
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &StatsSnapshot) {
    println!("{}", "=".repeat(50));
    println!("Total processed: {}", stats.processed);
    println!(
        "Successful: {} | Failures: {} | CAPTCHAs: {}",
        stats.success, stats.failure, stats.ambiguous
    );
    println!("Speed: {:.2} requests/minute", stats.throughput);
    println!("Elapsed: {}", format_elapsed(stats.elapsed));
    println!("Current system: {}", stats.mode);
    if stats.last_processed_id > 0 {
        println!("Resume point: {}", stats.last_processed_id);
    }
    println!("{}", "=".repeat(50));
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}
