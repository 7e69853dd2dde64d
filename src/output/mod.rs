//! Output module for human-readable sweep reporting
//!
//! The durable outputs (results file and checkpoint) live in `storage`; this
//! module only turns counters into statistics and prints them.

pub mod stats;

pub use stats::{print_statistics, StatsReporter, StatsSnapshot};
