//! State module for tracking sweep progress
//!
//! # Components
//!
//! - `ScrapeState`: The persisted resume point and running totals
//! - `SystemMode`: Which result system the mirrors are asked to query
//! - `Outcome`: The result of processing one identifier
//! - `RunCounters`: Lock-guarded counters shared by all workers of a run

mod counters;
mod outcome;
mod scrape_state;

// Re-export main types
pub use counters::RunCounters;
pub use outcome::Outcome;
pub use scrape_state::{now_unix_seconds, ScrapeState, SystemMode};
