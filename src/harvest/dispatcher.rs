//! Dispatcher - range sweep orchestration
//!
//! This module ties the sweep together:
//! - Loading and honouring the checkpoint
//! - Preparing the results file
//! - Running the worker pool over a range with a periodic progress report
//! - Deciding between completion and pause when the pool stops

use crate::config::{validate, Config, SweepConfig};
use crate::endpoint::EndpointRotator;
use crate::extract::{FieldExtractor, ResultPageExtractor};
use crate::harvest::fetcher::build_http_client;
use crate::harvest::phase::{PhaseTracker, RunPhase};
use crate::harvest::queue::{Produced, WorkQueue};
use crate::harvest::worker::{Settle, Worker, WorkerContext};
use crate::output::{StatsReporter, StatsSnapshot};
use crate::state::{Outcome, RunCounters, ScrapeState, SystemMode};
use crate::storage::{open_stores, CheckpointStore, RecordSink};
use crate::{ConfigError, SweepError};
use reqwest::Client;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Fewest workers a range run uses
pub const MIN_WORKERS: usize = 10;

/// Most workers a range run uses
pub const MAX_WORKERS: usize = 30;

/// Clamps a requested worker count into the supported pool size
pub fn clamp_workers(requested: usize) -> usize {
    requested.clamp(MIN_WORKERS, MAX_WORKERS)
}

/// Worker count suggested for a range when none is given
pub fn default_workers_for_range(start: u64, end: u64) -> usize {
    let span = end.saturating_sub(start) / 50 + 10;
    clamp_workers(usize::try_from(span).unwrap_or(MAX_WORKERS))
}

/// A request to sweep an inclusive range of identifiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeRequest {
    pub start: u64,
    pub end: u64,
    /// Worker count; the configured default when unset
    pub threads: Option<usize>,
    /// Continue from the checkpoint instead of starting fresh
    pub resume: bool,
    /// Mode override; the checkpoint's or configured mode when unset
    pub mode: Option<SystemMode>,
}

impl RangeRequest {
    pub fn new(start: u64, end: u64) -> Self {
        Self {
            start,
            end,
            threads: None,
            resume: true,
            mode: None,
        }
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    pub fn resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    pub fn mode(mut self, mode: SystemMode) -> Self {
        self.mode = Some(mode);
        self
    }
}

/// How a range run ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Every identifier was processed; the checkpoint was cleared
    Completed(StatsSnapshot),
    /// The run was stopped early; the checkpoint holds the resume point
    Paused(StatsSnapshot),
}

impl RunOutcome {
    pub fn stats(&self) -> &StatsSnapshot {
        match self {
            Self::Completed(stats) | Self::Paused(stats) => stats,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Main sweep dispatcher
///
/// One dispatcher serves a whole session: the endpoint rotation and the
/// session counters carry over between consecutive operations.
pub struct Dispatcher {
    settings: SweepConfig,
    client: Client,
    rotator: Arc<EndpointRotator>,
    extractor: Arc<dyn FieldExtractor>,
    checkpoints: Arc<dyn CheckpointStore>,
    sink: Arc<dyn RecordSink>,
    shutdown: CancellationToken,
    counters: Mutex<Arc<RunCounters>>,
    phase: Arc<PhaseTracker>,
}

impl Dispatcher {
    /// Creates a dispatcher with explicit extraction and storage
    ///
    /// # Arguments
    ///
    /// * `config` - Validated sweep configuration
    /// * `extractor` - Field extractor applied to every response body
    /// * `checkpoints` - Where the resume point is persisted
    /// * `sink` - Where successful records are written
    ///
    /// # Returns
    ///
    /// * `Ok(Dispatcher)` - Ready to run
    /// * `Err(SweepError)` - Invalid configuration or HTTP client failure
    pub fn new(
        config: &Config,
        extractor: Arc<dyn FieldExtractor>,
        checkpoints: Arc<dyn CheckpointStore>,
        sink: Arc<dyn RecordSink>,
    ) -> Result<Self, SweepError> {
        validate(config)?;

        let rotator = EndpointRotator::from_config(config)?;
        let client = build_http_client(&config.sweep)?;

        if config.sweep.accept_invalid_certs {
            tracing::warn!("TLS certificate verification is disabled for all endpoints");
        }
        tracing::info!("Rotating across {} endpoints", rotator.len());
        for endpoint in rotator.endpoints() {
            tracing::debug!("Endpoint {}", endpoint.form_url());
        }

        Ok(Self {
            settings: config.sweep.clone(),
            client,
            rotator: Arc::new(rotator),
            extractor,
            checkpoints,
            sink,
            shutdown: CancellationToken::new(),
            counters: Mutex::new(Arc::new(RunCounters::new(config.sweep.mode))),
            phase: Arc::new(PhaseTracker::new()),
        })
    }

    /// Creates a dispatcher with the stock extractor and file-backed stores
    pub fn from_config(config: &Config) -> Result<Self, SweepError> {
        let (checkpoints, sink) = open_stores(&config.output);
        Self::new(
            config,
            Arc::new(ResultPageExtractor::new()),
            Arc::new(checkpoints),
            Arc::new(sink),
        )
    }

    /// Token that stops the current and any later run when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Statistics of the session's current counters
    pub fn stats(&self) -> StatsReporter {
        StatsReporter::new(self.current_counters())
    }

    /// Phase of the current or most recent range run
    pub fn phase(&self) -> RunPhase {
        self.phase.get()
    }

    pub fn mode(&self) -> SystemMode {
        self.current_counters().mode()
    }

    /// Switches the session between the two single-system modes
    ///
    /// An existing checkpoint is rewritten with the new mode so that a later
    /// resume queries the same system.
    pub fn toggle_mode(&self) -> Result<SystemMode, SweepError> {
        let mode = self.mode().toggled();
        self.set_mode(mode)?;
        Ok(mode)
    }

    /// Sets the mode for the session and for an existing checkpoint
    pub fn set_mode(&self, mode: SystemMode) -> Result<(), SweepError> {
        self.current_counters().set_mode(mode);

        if let Some(mut state) = self.checkpoints.load() {
            state.mode = mode;
            self.checkpoints.save(&state)?;
        }

        tracing::info!("Switched to {}", mode);
        Ok(())
    }

    /// Creates the results file with its header if it does not exist yet
    pub fn prepare(&self) -> Result<(), SweepError> {
        self.sink.ensure_initialized()?;
        Ok(())
    }

    /// Loads the checkpoint, if any
    pub fn checkpoint(&self) -> Option<ScrapeState> {
        self.checkpoints.load()
    }

    fn current_counters(&self) -> Arc<RunCounters> {
        Arc::clone(&self.counters.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn install_counters(&self, counters: Arc<RunCounters>) {
        *self.counters.lock().unwrap_or_else(PoisonError::into_inner) = counters;
    }

    fn context(&self, counters: Arc<RunCounters>) -> WorkerContext {
        WorkerContext {
            client: self.client.clone(),
            rotator: Arc::clone(&self.rotator),
            extractor: Arc::clone(&self.extractor),
            checkpoints: Arc::clone(&self.checkpoints),
            sink: Arc::clone(&self.sink),
            counters,
            phase: Arc::clone(&self.phase),
            min_delay: Duration::from_millis(self.settings.min_delay_ms),
            max_delay: Duration::from_millis(self.settings.max_delay_ms),
            dequeue_timeout: Duration::from_millis(self.settings.dequeue_timeout_ms),
        }
    }

    /// Sweeps an inclusive range of identifiers
    ///
    /// With `resume` set and a usable checkpoint, identifiers at or below the
    /// checkpoint's `last_id` are skipped and its counters carry on;
    /// otherwise the results file is started afresh.
    ///
    /// # Returns
    ///
    /// * `Ok(RunOutcome::Completed)` - Every identifier was processed
    /// * `Ok(RunOutcome::Paused)` - Stopped by cancellation
    /// * `Err(SweepError)` - Invalid range or the results file could not be prepared
    pub async fn run_range(&self, request: RangeRequest) -> Result<RunOutcome, SweepError> {
        if request.start == 0 || request.start > request.end {
            return Err(ConfigError::Validation(format!(
                "invalid range {}..={}",
                request.start, request.end
            ))
            .into());
        }

        let prior = if request.resume {
            self.checkpoints.load().filter(|state| state.last_processed_id > 0)
        } else {
            None
        };

        let counters = match prior {
            Some(mut state) => {
                tracing::info!(
                    "Resuming after {} ({} processed so far)",
                    state.last_processed_id,
                    state.processed_count
                );
                if let Some(mode) = request.mode {
                    state.mode = mode;
                }
                Arc::new(RunCounters::from_state(state))
            }
            None => {
                self.checkpoints.clear()?;
                self.sink.initialize()?;
                let mode = request.mode.unwrap_or_else(|| self.mode());
                Arc::new(RunCounters::new(mode))
            }
        };
        self.install_counters(Arc::clone(&counters));
        self.phase.reset();

        let first = counters.snapshot().resume_start(request.start);
        if first > request.end {
            tracing::info!(
                "Range {}..={} already processed",
                request.start,
                request.end
            );
            self.phase.advance(RunPhase::Completed);
            return Ok(RunOutcome::Completed(self.stats().snapshot()));
        }

        counters.begin_range(first);

        let workers = clamp_workers(request.threads.unwrap_or(self.settings.threads));
        tracing::info!(
            "Sweeping {}..={} with {} workers in {}",
            first,
            request.end,
            workers,
            counters.mode()
        );

        let cancel = self.shutdown.child_token();
        let (queue, producer) = WorkQueue::spawn(first..=request.end, workers * 4, cancel.clone());
        self.phase.advance(RunPhase::Running);

        let reporter_stop = CancellationToken::new();
        let reporter = self.spawn_reporter(reporter_stop.clone());

        let context = Arc::new(self.context(Arc::clone(&counters)));
        let mut pool = JoinSet::new();
        for index in 0..workers {
            let worker = Worker {
                index,
                context: Arc::clone(&context),
            };
            pool.spawn(worker.run(Arc::clone(&queue), cancel.clone()));
        }

        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Worker task failed: {}", e);
            }
        }

        let produced = match producer.await {
            Ok(produced) => produced,
            Err(e) => {
                tracing::error!("Producer task failed: {}", e);
                cancel.cancel();
                Produced {
                    enqueued: 0,
                    finished: false,
                }
            }
        };

        reporter_stop.cancel();
        if let Some(reporter) = reporter {
            let _ = reporter.await;
        }

        let drained = produced.finished && queue.is_drained().await;
        let stats = self.stats().snapshot();

        if drained {
            self.checkpoints.clear()?;
            self.phase.advance(RunPhase::Completed);
            tracing::info!(
                "Range complete: {} processed, {} successful",
                stats.processed,
                stats.success
            );
            Ok(RunOutcome::Completed(stats))
        } else {
            self.checkpoints.save(&counters.snapshot())?;
            self.phase.advance(RunPhase::Paused);
            tracing::info!(
                "Paused after {}; resume continues from {}",
                stats.last_processed_id,
                stats.last_processed_id + 1
            );
            Ok(RunOutcome::Paused(stats))
        }
    }

    /// Looks up one identifier outside any range
    ///
    /// The counters of an existing checkpoint are updated, but its resume
    /// point is left untouched. Without a checkpoint nothing is persisted
    /// apart from the result row.
    pub async fn run_single(&self, id: u64) -> Result<Outcome, SweepError> {
        let prior = self.checkpoints.load();
        let persist = prior.is_some();

        let counters = match prior {
            Some(state) => Arc::new(RunCounters::from_state(state)),
            None => self.current_counters(),
        };
        self.install_counters(Arc::clone(&counters));

        self.sink.ensure_initialized()?;

        let context = self.context(counters);
        Ok(context.process(id, Settle::Lookup { persist }).await)
    }

    fn spawn_reporter(&self, stop: CancellationToken) -> Option<tokio::task::JoinHandle<()>> {
        if self.settings.progress_interval_secs == 0 {
            return None;
        }

        let period = Duration::from_secs(self.settings.progress_interval_secs);
        let reporter = self.stats();
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // First tick fires immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => reporter.log_progress(),
                }
            }
        }))
    }
}
