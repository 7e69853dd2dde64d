//! Integration tests for range sweeps and single lookups
//!
//! These tests use wiremock servers as mirror endpoints and drive the
//! dispatcher end to end against a real CSV results file.

use natega_sweep::config::{Config, EndpointEntry};
use natega_sweep::harvest::RunPhase;
use natega_sweep::storage::{
    CheckpointStore, CsvRecordSink, JsonCheckpointStore, RecordSink, StorageResult,
};
use natega_sweep::{
    Dispatcher, ExtractedRecord, FieldName, Outcome, RangeRequest, ResultPageExtractor,
    RunOutcome, ScrapeState, SystemMode,
};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

/// In-memory checkpoint that remembers every save
#[derive(Default)]
struct RecordingStore {
    current: Mutex<Option<ScrapeState>>,
    saves: Mutex<Vec<ScrapeState>>,
    clears: Mutex<usize>,
}

impl RecordingStore {
    fn with_state(state: ScrapeState) -> Self {
        let store = Self::default();
        *store.current.lock().unwrap() = Some(state);
        store
    }

    fn current(&self) -> Option<ScrapeState> {
        self.current.lock().unwrap().clone()
    }

    fn saves(&self) -> Vec<ScrapeState> {
        self.saves.lock().unwrap().clone()
    }

    fn clears(&self) -> usize {
        *self.clears.lock().unwrap()
    }

    fn max_saved_last_id(&self) -> u64 {
        self.saves()
            .iter()
            .map(|state| state.last_processed_id)
            .max()
            .unwrap_or(0)
    }
}

impl CheckpointStore for RecordingStore {
    fn load(&self) -> Option<ScrapeState> {
        self.current()
    }

    fn save(&self, state: &ScrapeState) -> StorageResult<()> {
        *self.current.lock().unwrap() = Some(state.clone());
        self.saves.lock().unwrap().push(state.clone());
        Ok(())
    }

    fn clear(&self) -> StorageResult<()> {
        *self.current.lock().unwrap() = None;
        *self.clears.lock().unwrap() += 1;
        Ok(())
    }
}

/// Creates a test configuration pointing at the given mock servers
fn create_test_config(servers: &[&MockServer], dir: &Path) -> Config {
    let mut config = Config::default();
    config.endpoints = servers
        .iter()
        .map(|server| EndpointEntry {
            host: server.address().to_string(),
            scheme: "http".to_string(),
            referer_query: String::new(),
        })
        .collect();
    config.sweep.min_delay_ms = 0;
    config.sweep.max_delay_ms = 0;
    config.sweep.request_timeout_ms = 500;
    config.sweep.dequeue_timeout_ms = 100;
    config.sweep.progress_interval_secs = 0;
    config.sweep.accept_invalid_certs = false;
    config.output.results_path = dir.join("results.csv").display().to_string();
    config.output.checkpoint_path = dir.join("state.json").display().to_string();
    config
}

fn create_dispatcher(config: &Config, store: Arc<RecordingStore>) -> Dispatcher {
    let sink = CsvRecordSink::new(&config.output.results_path);
    Dispatcher::new(
        config,
        Arc::new(ResultPageExtractor::new()),
        store,
        Arc::new(sink),
    )
    .expect("Failed to create dispatcher")
}

fn result_page(id: u64) -> String {
    format!(
        r#"<html><body><div class="result">
        <span class="formatt3">رقم الجلوس</span><h1>{id}</h1>
        <span class="formatt2">الأسم: </span><span>طالب {id}</span>
        <span class="formatt2">حالة الطالب</span><span>ناجح</span>
        </div></body></html>"#
    )
}

fn seating_no(request: &Request) -> u64 {
    url::form_urlencoded::parse(&request.body)
        .find(|(key, _)| key == "seating_no")
        .and_then(|(_, value)| value.parse().ok())
        .unwrap_or(0)
}

/// Mounts a form handler answering every seating number with a result page
async fn mount_results(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/Home/Natega"))
        .respond_with(|request: &Request| {
            ResponseTemplate::new(200).set_body_string(result_page(seating_no(request)))
        })
        .mount(server)
        .await;
}

async fn requested_ids(server: &MockServer) -> Vec<u64> {
    let mut ids: Vec<u64> = server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(seating_no)
        .collect();
    ids.sort_unstable();
    ids
}

/// Seating numbers in the results file, header excluded
fn result_ids(path: &str) -> BTreeSet<u64> {
    let mut reader = csv::Reader::from_path(path).expect("Failed to open results");
    reader
        .records()
        .map(|row| row.unwrap()[0].parse().unwrap())
        .collect()
}

fn result_row_count(path: &str) -> usize {
    let mut reader = csv::Reader::from_path(path).expect("Failed to open results");
    reader.records().count()
}

fn checkpoint(last_id: u64, processed: u64) -> ScrapeState {
    let mut state = ScrapeState::new(SystemMode::Legacy);
    state.last_processed_id = last_id;
    state.processed_count = processed;
    state.success_count = processed;
    state
}

#[tokio::test]
async fn test_sweep_range_across_two_endpoints() {
    let first = MockServer::start().await;
    let second = MockServer::start().await;
    mount_results(&first).await;
    mount_results(&second).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&[&first, &second], dir.path());
    let store = Arc::new(RecordingStore::default());
    let dispatcher = create_dispatcher(&config, Arc::clone(&store));

    let outcome = dispatcher
        .run_range(RangeRequest::new(1, 5))
        .await
        .expect("Sweep failed");

    assert!(outcome.is_completed());
    assert_eq!(dispatcher.phase(), RunPhase::Completed);
    let stats = outcome.stats();
    assert_eq!(stats.processed, 5);
    assert_eq!(stats.success, 5);
    assert_eq!(stats.failure, 0);

    assert_eq!(result_ids(&config.output.results_path), (1..=5).collect());

    // Each id was saved along the way, then the checkpoint was cleared
    let saves = store.saves();
    assert_eq!(saves.len(), 5);
    assert_eq!(store.max_saved_last_id(), 5);
    assert!(saves.iter().any(|s| s.processed_count == 5));
    assert!(store.current().is_none());

    // The single-threaded test runtime rotates right after each dequeue, so
    // ids alternate between mirrors starting from the second one
    assert_eq!(requested_ids(&second).await, vec![1, 3, 5]);
    assert_eq!(requested_ids(&first).await, vec![2, 4]);
}

#[tokio::test]
async fn test_consecutive_lookups_alternate_endpoints() {
    let first = MockServer::start().await;
    let second = MockServer::start().await;
    mount_results(&first).await;
    mount_results(&second).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&[&first, &second], dir.path());
    let dispatcher = create_dispatcher(&config, Arc::new(RecordingStore::default()));

    for id in 1..=4 {
        assert!(dispatcher.run_single(id).await.unwrap().is_success());
    }

    assert_eq!(requested_ids(&second).await, vec![1, 3]);
    assert_eq!(requested_ids(&first).await, vec![2, 4]);
}

#[tokio::test]
async fn test_timeout_counts_as_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/Home/Natega"))
        .respond_with(|request: &Request| {
            let id = seating_no(request);
            let response = ResponseTemplate::new(200).set_body_string(result_page(id));
            if id == 7 {
                response.set_delay(Duration::from_secs(3))
            } else {
                response
            }
        })
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&[&server], dir.path());
    let store = Arc::new(RecordingStore::default());
    let dispatcher = create_dispatcher(&config, Arc::clone(&store));

    let outcome = dispatcher.run_range(RangeRequest::new(6, 8)).await.unwrap();

    let stats = outcome.stats();
    assert_eq!(stats.processed, 3);
    assert_eq!(stats.success, 2);
    assert_eq!(stats.failure, 1);
    assert_eq!(stats.last_processed_id, 8);
    assert_eq!(store.max_saved_last_id(), 8);

    assert_eq!(
        result_ids(&config.output.results_path),
        BTreeSet::from([6, 8])
    );
}

#[tokio::test]
async fn test_challenge_page_is_counted_separately() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/Home/Natega"))
        .respond_with(|request: &Request| {
            let id = seating_no(request);
            if id == 3 {
                ResponseTemplate::new(200)
                    .set_body_string(r#"<div class="g-recaptcha" data-sitekey="x"></div>"#)
            } else {
                ResponseTemplate::new(200).set_body_string(result_page(id))
            }
        })
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&[&server], dir.path());
    let store = Arc::new(RecordingStore::default());
    let dispatcher = create_dispatcher(&config, store);

    let outcome = dispatcher.run_range(RangeRequest::new(1, 3)).await.unwrap();

    let stats = outcome.stats();
    assert_eq!(stats.success, 2);
    assert_eq!(stats.ambiguous, 1);
    assert_eq!(stats.failure, 0);
    assert_eq!(
        result_ids(&config.output.results_path),
        BTreeSet::from([1, 2])
    );
}

#[tokio::test]
async fn test_page_without_name_is_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/Home/Natega"))
        .respond_with(|request: &Request| {
            let id = seating_no(request);
            let body = if id == 2 {
                format!(r#"<span class="formatt3">رقم الجلوس</span><h1>{id}</h1>"#)
            } else {
                result_page(id)
            };
            ResponseTemplate::new(200).set_body_string(body)
        })
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&[&server], dir.path());
    let dispatcher = create_dispatcher(&config, Arc::new(RecordingStore::default()));

    let outcome = dispatcher.run_range(RangeRequest::new(1, 3)).await.unwrap();

    assert_eq!(outcome.stats().success, 2);
    assert_eq!(outcome.stats().failure, 1);
    assert_eq!(
        result_ids(&config.output.results_path),
        BTreeSet::from([1, 3])
    );
}

#[tokio::test]
async fn test_resume_skips_processed_ids() {
    let server = MockServer::start().await;
    mount_results(&server).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&[&server], dir.path());

    // Results of the interrupted run
    let sink = CsvRecordSink::new(&config.output.results_path);
    sink.initialize().unwrap();
    for id in 1..=3u64 {
        let mut record = ExtractedRecord::new();
        record.insert(FieldName::SeatingNo, id.to_string());
        record.insert(FieldName::Name, "earlier");
        sink.append(&record).unwrap();
    }

    let store = Arc::new(RecordingStore::with_state(checkpoint(3, 3)));
    let dispatcher = create_dispatcher(&config, Arc::clone(&store));

    let outcome = dispatcher.run_range(RangeRequest::new(1, 5)).await.unwrap();

    assert!(outcome.is_completed());
    assert_eq!(requested_ids(&server).await, vec![4, 5]);

    // Counters carry on from the checkpoint
    assert_eq!(outcome.stats().processed, 5);
    assert_eq!(outcome.stats().success, 5);
    assert_eq!(
        result_ids(&config.output.results_path),
        (1..=5).collect()
    );
}

#[tokio::test]
async fn test_fresh_run_ignores_checkpoint() {
    let server = MockServer::start().await;
    mount_results(&server).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&[&server], dir.path());
    let store = Arc::new(RecordingStore::with_state(checkpoint(3, 3)));
    let dispatcher = create_dispatcher(&config, Arc::clone(&store));

    let outcome = dispatcher
        .run_range(RangeRequest::new(1, 2).resume(false))
        .await
        .unwrap();

    assert_eq!(requested_ids(&server).await, vec![1, 2]);
    assert_eq!(outcome.stats().processed, 2);
    assert_eq!(
        result_ids(&config.output.results_path),
        BTreeSet::from([1, 2])
    );
}

#[tokio::test]
async fn test_cancelled_run_pauses_with_checkpoint() {
    let server = MockServer::start().await;
    mount_results(&server).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&[&server], dir.path());
    let store = Arc::new(RecordingStore::with_state(checkpoint(3, 3)));
    let dispatcher = create_dispatcher(&config, Arc::clone(&store));

    dispatcher.cancellation_token().cancel();
    let outcome = dispatcher.run_range(RangeRequest::new(1, 100)).await.unwrap();

    match outcome {
        RunOutcome::Paused(stats) => assert_eq!(stats.last_processed_id, 3),
        other => panic!("expected pause, got {:?}", other),
    }
    assert!(requested_ids(&server).await.is_empty());
    assert_eq!(dispatcher.phase(), RunPhase::Paused);

    assert_eq!(store.clears(), 0);
    let state = store.current().expect("checkpoint was cleared");
    assert_eq!(state.last_processed_id, 3);
    assert_eq!(state.processed_count, 3);
}

#[tokio::test]
async fn test_cancelled_fresh_run_resumes_at_range_start() {
    let server = MockServer::start().await;
    mount_results(&server).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&[&server], dir.path());
    let store = Arc::new(RecordingStore::default());
    let dispatcher = create_dispatcher(&config, Arc::clone(&store));

    dispatcher.cancellation_token().cancel();
    let outcome = dispatcher
        .run_range(RangeRequest::new(50, 60).resume(false))
        .await
        .unwrap();

    assert!(!outcome.is_completed());
    assert!(requested_ids(&server).await.is_empty());

    let state = store.current().expect("checkpoint was not saved");
    assert_eq!(state.last_processed_id, 49);
    assert_eq!(state.processed_count, 0);
    assert_eq!(state.resume_start(50), 50);
}

#[tokio::test]
async fn test_cancel_mid_run_then_resume() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/Home/Natega"))
        .respond_with(|request: &Request| {
            ResponseTemplate::new(200)
                .set_body_string(result_page(seating_no(request)))
                .set_delay(Duration::from_millis(100))
        })
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&[&server], dir.path());
    let checkpoint_path = config.output.checkpoint_path.clone();

    let dispatcher = Dispatcher::from_config(&config).expect("Failed to create dispatcher");
    let token = dispatcher.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(450)).await;
        token.cancel();
    });

    let outcome = dispatcher.run_range(RangeRequest::new(1, 300)).await.unwrap();
    let paused = match outcome {
        RunOutcome::Paused(stats) => stats,
        other => panic!("expected pause, got {:?}", other),
    };
    assert!(paused.last_processed_id > 0 && paused.last_processed_id < 300);

    // Everything dequeued settled, so the watermark covers exactly what was sent
    let saved = JsonCheckpointStore::new(&checkpoint_path)
        .load()
        .expect("checkpoint was not written");
    assert_eq!(saved.last_processed_id, paused.last_processed_id);
    assert_eq!(saved.processed_count, saved.last_processed_id);
    assert_eq!(
        requested_ids(&server).await,
        (1..=saved.last_processed_id).collect::<Vec<_>>()
    );

    // The first dispatcher's shutdown token stays cancelled
    let resumed = Dispatcher::from_config(&config).expect("Failed to create dispatcher");
    let outcome = resumed.run_range(RangeRequest::new(1, 300)).await.unwrap();

    assert!(outcome.is_completed());
    assert_eq!(outcome.stats().processed, 300);
    assert_eq!(outcome.stats().success, 300);

    // No id was fetched twice across the two runs
    assert_eq!(requested_ids(&server).await, (1..=300).collect::<Vec<_>>());
    assert_eq!(result_row_count(&config.output.results_path), 300);
    assert_eq!(
        result_ids(&config.output.results_path),
        (1..=300).collect()
    );
    assert!(!Path::new(&checkpoint_path).exists());
}

#[tokio::test]
async fn test_single_lookup_keeps_resume_point() {
    let server = MockServer::start().await;
    mount_results(&server).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&[&server], dir.path());
    let store = Arc::new(RecordingStore::with_state(checkpoint(10, 10)));
    let dispatcher = create_dispatcher(&config, Arc::clone(&store));

    let outcome = dispatcher.run_single(42).await.unwrap();

    match outcome {
        Outcome::Success(record) => assert_eq!(record.get(FieldName::SeatingNo), Some("42")),
        other => panic!("expected success, got {:?}", other),
    }

    let state = store.current().unwrap();
    assert_eq!(state.last_processed_id, 10);
    assert_eq!(state.processed_count, 11);
    assert_eq!(
        result_ids(&config.output.results_path),
        BTreeSet::from([42])
    );
}

#[tokio::test]
async fn test_single_lookup_without_checkpoint() {
    let server = MockServer::start().await;
    mount_results(&server).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&[&server], dir.path());
    let store = Arc::new(RecordingStore::default());
    let dispatcher = create_dispatcher(&config, Arc::clone(&store));

    let outcome = dispatcher.run_single(9).await.unwrap();

    assert!(outcome.is_success());
    assert!(store.saves().is_empty());
    assert_eq!(dispatcher.stats().snapshot().processed, 1);
}

#[tokio::test]
async fn test_form_carries_mode_and_origin() {
    let server = MockServer::start().await;
    let origin = format!("http://{}", server.address());

    Mock::given(method("POST"))
        .and(path("/Home/Natega"))
        .and(body_string_contains("system=1"))
        .and(header("origin", origin.as_str()))
        .respond_with(|request: &Request| {
            ResponseTemplate::new(200).set_body_string(result_page(seating_no(request)))
        })
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&[&server], dir.path());
    let dispatcher = create_dispatcher(&config, Arc::new(RecordingStore::default()));

    let outcome = dispatcher
        .run_range(RangeRequest::new(1, 1).mode(SystemMode::Modern))
        .await
        .unwrap();

    // Any mismatch falls through to wiremock's 404 and counts as a failure
    assert_eq!(outcome.stats().success, 1);
    assert_eq!(outcome.stats().mode, SystemMode::Modern);
}
