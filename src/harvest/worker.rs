//! Worker loop and per-identifier processing
//!
//! Each identifier goes through the same steps: pick the next endpoint, post
//! the form, extract fields, classify, then settle the outcome into the
//! counters, the results file and the checkpoint, in that order.

use crate::endpoint::{Endpoint, EndpointRotator};
use crate::extract::{is_challenge, FieldExtractor, FieldName};
use crate::harvest::fetcher::{fetch_record, FetchResponse};
use crate::harvest::phase::{PhaseTracker, RunPhase};
use crate::harvest::queue::{Dequeue, WorkQueue};
use crate::state::{Outcome, RunCounters};
use crate::storage::{CheckpointStore, RecordSink};
use crate::SweepError;
use rand::Rng;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Everything a worker needs, shared by all workers of a run
pub(crate) struct WorkerContext {
    pub client: Client,
    pub rotator: Arc<EndpointRotator>,
    pub extractor: Arc<dyn FieldExtractor>,
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub sink: Arc<dyn RecordSink>,
    pub counters: Arc<RunCounters>,
    pub phase: Arc<PhaseTracker>,
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub dequeue_timeout: Duration,
}

/// How a processed identifier affects the range checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Settle {
    /// Advance the watermark and persist the checkpoint
    Range,
    /// Count only; persist the counters if `persist` is set
    Lookup { persist: bool },
}

impl WorkerContext {
    /// Processes one identifier end to end and returns its outcome
    ///
    /// Never fails: every error is folded into [`Outcome::HardFailure`] and
    /// storage problems are logged.
    pub async fn process(&self, id: u64, settle: Settle) -> Outcome {
        let endpoint = self.rotator.next();
        let outcome = self.classify(id, endpoint).await;
        self.settle(id, endpoint, &outcome, settle);
        outcome
    }

    async fn classify(&self, id: u64, endpoint: &Endpoint) -> Outcome {
        let mode = self.counters.mode();
        match fetch_record(&self.client, endpoint, id, mode).await {
            Ok(response) => self.classify_response(id, endpoint, &response),
            Err(e) => Outcome::HardFailure(e),
        }
    }

    fn classify_response(&self, id: u64, endpoint: &Endpoint, response: &FetchResponse) -> Outcome {
        let record = self.extractor.extract(&response.body);

        if record.is_complete() {
            return Outcome::Success(record);
        }
        if is_challenge(&response.body) {
            return Outcome::Challenge;
        }
        if !response.is_success() {
            return Outcome::HardFailure(SweepError::HttpStatus {
                endpoint: endpoint.host().to_string(),
                status: response.status,
            });
        }

        let missing = record
            .missing_mandatory()
            .map(|field| field.as_str())
            .unwrap_or("record");
        Outcome::HardFailure(SweepError::ExtractionIncomplete { id, missing })
    }

    fn settle(&self, id: u64, endpoint: &Endpoint, outcome: &Outcome, settle: Settle) {
        let advance = settle == Settle::Range;
        let state = self.counters.record(id, outcome, advance);
        tracing::debug!("{} settled as {} via {}", id, outcome.label(), endpoint.host());

        match outcome {
            Outcome::Success(record) => {
                tracing::info!(
                    "{} - {} [{}]",
                    id,
                    record.get(FieldName::Name).unwrap_or_default(),
                    endpoint.host()
                );
                if let Err(e) = self.sink.append(record) {
                    tracing::error!("Failed to write result for {}: {}", id, e);
                }
            }
            Outcome::Challenge => {
                let challenge = SweepError::ChallengeDetected {
                    id,
                    endpoint: endpoint.host().to_string(),
                };
                tracing::warn!("{}", challenge);
            }
            Outcome::HardFailure(e) if e.is_transport() => {
                tracing::warn!("Error for {}: {}", id, e);
            }
            Outcome::HardFailure(e) => {
                tracing::info!("No result for {} on {}: {}", id, endpoint.host(), e);
            }
        }

        let persist = match settle {
            Settle::Range => true,
            Settle::Lookup { persist } => persist,
        };
        if persist {
            if let Err(e) = self.checkpoints.save(&state) {
                tracing::error!("Failed to save checkpoint after {}: {}", id, e);
            }
        }
    }

    /// Random pause between consecutive requests of one worker
    fn politeness_delay(&self) -> Duration {
        if self.max_delay <= self.min_delay {
            return self.min_delay;
        }
        rand::thread_rng().gen_range(self.min_delay..=self.max_delay)
    }
}

/// One member of the worker pool
pub(crate) struct Worker {
    pub index: usize,
    pub context: Arc<WorkerContext>,
}

impl Worker {
    /// Pulls identifiers until the queue closes or the run is cancelled
    ///
    /// Returns the number of identifiers this worker processed. An identifier
    /// already dequeued is always settled before the worker looks at the
    /// cancellation token again.
    pub async fn run(self, queue: Arc<WorkQueue>, cancel: CancellationToken) -> u64 {
        let ctx = &self.context;
        let mut processed = 0u64;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    ctx.phase.advance(RunPhase::Cancelling);
                    break;
                }
                next = queue.pop(ctx.dequeue_timeout) => next,
            };

            match next {
                Dequeue::Item(id) => {
                    ctx.process(id, Settle::Range).await;
                    processed += 1;

                    let pause = ctx.politeness_delay();
                    if !pause.is_zero() {
                        tokio::select! {
                            _ = cancel.cancelled() => {}
                            _ = tokio::time::sleep(pause) => {}
                        }
                    }
                }
                Dequeue::Empty => {
                    tracing::trace!("Worker {} idle", self.index);
                }
                Dequeue::Closed => {
                    ctx.phase.advance(RunPhase::Draining);
                    break;
                }
            }
        }

        tracing::debug!("Worker {} stopped after {} identifiers", self.index, processed);
        processed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, SweepConfig};
    use crate::extract::{ExtractedRecord, ResultPageExtractor};
    use crate::harvest::fetcher::build_http_client;
    use crate::state::{ScrapeState, SystemMode};
    use crate::storage::StorageResult;

    struct NullStore;

    impl CheckpointStore for NullStore {
        fn load(&self) -> Option<ScrapeState> {
            None
        }
        fn save(&self, _state: &ScrapeState) -> StorageResult<()> {
            Ok(())
        }
        fn clear(&self) -> StorageResult<()> {
            Ok(())
        }
    }

    struct NullSink;

    impl RecordSink for NullSink {
        fn initialize(&self) -> StorageResult<()> {
            Ok(())
        }
        fn ensure_initialized(&self) -> StorageResult<()> {
            Ok(())
        }
        fn append(&self, _record: &ExtractedRecord) -> StorageResult<()> {
            Ok(())
        }
    }

    fn context(min_ms: u64, max_ms: u64) -> WorkerContext {
        let config = Config::default();
        WorkerContext {
            client: build_http_client(&SweepConfig::default()).unwrap(),
            rotator: Arc::new(EndpointRotator::from_config(&config).unwrap()),
            extractor: Arc::new(ResultPageExtractor::new()),
            checkpoints: Arc::new(NullStore),
            sink: Arc::new(NullSink),
            counters: Arc::new(RunCounters::new(SystemMode::Legacy)),
            phase: Arc::new(PhaseTracker::new()),
            min_delay: Duration::from_millis(min_ms),
            max_delay: Duration::from_millis(max_ms),
            dequeue_timeout: Duration::from_millis(100),
        }
    }

    fn response(status: u16, body: &str) -> FetchResponse {
        FetchResponse {
            status,
            body: body.to_string(),
        }
    }

    const RESULT_PAGE: &str = r#"<div>
        <span class="formatt">رقم الجلوس</span><h1>1234</h1>
        <span class="formatt">الأسم</span><span>محمد أحمد</span>
    </div>"#;

    #[test]
    fn test_complete_page_is_success() {
        let ctx = context(0, 0);
        let endpoint = ctx.rotator.next();
        let outcome = ctx.classify_response(1234, endpoint, &response(200, RESULT_PAGE));

        match outcome {
            Outcome::Success(record) => {
                assert_eq!(record.get(FieldName::SeatingNo), Some("1234"));
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[test]
    fn test_challenge_page() {
        let ctx = context(0, 0);
        let endpoint = ctx.rotator.next();
        let body = "<html>Please solve the CAPTCHA</html>";

        assert!(matches!(
            ctx.classify_response(1, endpoint, &response(200, body)),
            Outcome::Challenge
        ));
        assert!(matches!(
            ctx.classify_response(1, endpoint, &response(403, body)),
            Outcome::Challenge
        ));
    }

    #[test]
    fn test_bad_status_without_fields() {
        let ctx = context(0, 0);
        let endpoint = ctx.rotator.next();

        match ctx.classify_response(1, endpoint, &response(502, "bad gateway")) {
            Outcome::HardFailure(SweepError::HttpStatus { status, .. }) => assert_eq!(status, 502),
            other => panic!("expected status failure, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_name_is_failure() {
        let ctx = context(0, 0);
        let endpoint = ctx.rotator.next();
        let body = r#"<span class="formatt">رقم الجلوس</span><h1>55</h1>"#;

        match ctx.classify_response(55, endpoint, &response(200, body)) {
            Outcome::HardFailure(SweepError::ExtractionIncomplete { id, missing }) => {
                assert_eq!(id, 55);
                assert_eq!(missing, "name");
            }
            other => panic!("expected incomplete record, got {:?}", other),
        }
    }

    #[test]
    fn test_politeness_delay_bounds() {
        let ctx = context(50, 200);
        for _ in 0..100 {
            let pause = ctx.politeness_delay();
            assert!(pause >= Duration::from_millis(50));
            assert!(pause <= Duration::from_millis(200));
        }
        assert_eq!(context(0, 0).politeness_delay(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_cancelled_worker_processes_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (queue, _producer) = WorkQueue::spawn(1..=5, 2, cancel.clone());

        let ctx = Arc::new(context(0, 0));
        let worker = Worker {
            index: 0,
            context: Arc::clone(&ctx),
        };

        assert_eq!(worker.run(queue, cancel).await, 0);
        assert_eq!(ctx.phase.get(), RunPhase::Cancelling);
        assert_eq!(ctx.counters.snapshot().processed_count, 0);
    }
}
