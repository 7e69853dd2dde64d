//! Harvest module for sweeping identifier ranges
//!
//! This module contains the concurrent sweep engine, including:
//! - Form submission with a browser-like client
//! - A bounded identifier queue fed by a producer task
//! - The worker pool and per-identifier classification
//! - Range orchestration with checkpointing and graceful stop

mod dispatcher;
mod fetcher;
mod phase;
mod queue;
mod worker;

pub use dispatcher::{
    clamp_workers, default_workers_for_range, Dispatcher, RangeRequest, RunOutcome, MAX_WORKERS,
    MIN_WORKERS,
};
pub use fetcher::{build_http_client, fetch_record, FetchResponse};
pub use phase::RunPhase;
pub use queue::{Dequeue, WorkQueue};
