//! Job lifecycle integration tests.
//!
//! These tests drive real dispatchers with mock providers through the full
//! lifecycle: queued -> downloading (retries, fallback) -> completed | failed

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::broadcast;

use tubeline_core::{
    engine::BackoffPolicy,
    provider::ProgressUpdate,
    testing::{fixtures, MockOutcome, MockProvider},
    DispatchError, DispatcherConfig, DownloadDispatcher, ErrorKind, JobEvent, JobHistory,
    JobSnapshot, JobStatus, Provider, ProviderError, ProviderSlot, SqliteJobHistory,
};

const WAIT: Duration = Duration::from_secs(5);

/// Test helper holding the dispatcher and its mock providers.
struct TestHarness {
    dispatcher: Arc<DownloadDispatcher>,
    primary: Arc<MockProvider>,
    secondary: Option<Arc<MockProvider>>,
    _temp_dir: TempDir,
}

impl TestHarness {
    fn new(primary: MockProvider, secondary: Option<MockProvider>) -> Self {
        Self::with_config(primary, secondary, |_| {})
    }

    fn with_config(
        primary: MockProvider,
        secondary: Option<MockProvider>,
        tweak: impl FnOnce(&mut DispatcherConfig),
    ) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mut config = fixtures::fast_config(temp_dir.path());
        tweak(&mut config);

        let primary = Arc::new(primary);
        let secondary = secondary.map(Arc::new);
        let dispatcher = DownloadDispatcher::new(
            config,
            Arc::clone(&primary) as Arc<dyn Provider>,
            secondary
                .as_ref()
                .map(|s| Arc::clone(s) as Arc<dyn Provider>),
        );

        Self {
            dispatcher: Arc::new(dispatcher),
            primary,
            secondary,
            _temp_dir: temp_dir,
        }
    }

    fn start(&self, n: u32) -> String {
        self.dispatcher
            .start(&fixtures::video_url(n))
            .expect("valid url should be accepted")
    }

    async fn wait(&self, job_id: &str) -> JobSnapshot {
        let dispatcher = Arc::clone(&self.dispatcher);
        let id = job_id.to_string();
        fixtures::wait_for_terminal(WAIT, move || dispatcher.status(&id).ok())
            .await
            .expect("job did not finish in time")
    }

    async fn secondary_calls(&self) -> usize {
        match &self.secondary {
            Some(s) => s.call_count().await,
            None => 0,
        }
    }
}

fn network(msg: &str) -> ProviderError {
    ProviderError::network(msg)
}

/// Status events for one job, up to and including the terminal one.
async fn collect_statuses(
    rx: &mut broadcast::Receiver<JobEvent>,
    job_id: &str,
) -> Vec<(JobStatus, ProviderSlot, u32)> {
    let mut seen = Vec::new();
    loop {
        let event = tokio::time::timeout(WAIT, rx.recv())
            .await
            .expect("timed out waiting for events")
            .expect("event channel closed");
        if let JobEvent::StatusChanged {
            job_id: id,
            status,
            provider,
            attempt,
            ..
        } = event
        {
            if id == job_id {
                seen.push((status, provider, attempt));
                if status.is_terminal() {
                    return seen;
                }
            }
        }
    }
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn test_healthy_primary_completes_on_first_attempt() {
    let harness = TestHarness::new(
        MockProvider::new("primary").with_progress(vec![25.0, 50.0, 100.0]),
        Some(MockProvider::new("secondary")),
    );

    let id = harness.start(1);
    let job = harness.wait(&id).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.provider, ProviderSlot::Primary);
    assert_eq!(job.attempt, 1);
    assert_eq!(job.progress.percent, 100.0);
    assert!(job.error.is_none());
    let result = job.result.expect("completed job has a result");
    assert_eq!(result.title, "Mock Video");
    assert!(result.file_path.starts_with(harness._temp_dir.path()));
    assert_eq!(harness.secondary_calls().await, 0);
}

#[tokio::test]
async fn test_transient_failures_are_retried_on_primary() {
    let harness = TestHarness::new(
        MockProvider::new("primary").with_script(vec![
            MockOutcome::fail(network("connection reset")),
            MockOutcome::fail(network("connection reset")),
            MockOutcome::succeed("Third Time"),
        ]),
        Some(MockProvider::new("secondary")),
    );

    let id = harness.start(2);
    let job = harness.wait(&id).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.provider, ProviderSlot::Primary);
    assert_eq!(job.attempt, 3);
    assert_eq!(job.result.unwrap().title, "Third Time");
    assert_eq!(harness.primary.call_count().await, 3);
    assert_eq!(harness.secondary_calls().await, 0);
}

#[tokio::test]
async fn test_exhausted_primary_falls_back_to_secondary() {
    let harness = TestHarness::new(
        MockProvider::failing("primary", network("timed out")),
        Some(MockProvider::new("secondary")),
    );

    let id = harness.start(3);
    let job = harness.wait(&id).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.provider, ProviderSlot::Secondary);
    assert_eq!(job.attempt, 3);
    assert_eq!(harness.primary.call_count().await, 3);
    assert_eq!(harness.secondary_calls().await, 1);
}

#[tokio::test]
async fn test_both_providers_failing_reports_both_errors() {
    let harness = TestHarness::new(
        MockProvider::failing("primary", network("net down")),
        Some(MockProvider::failing(
            "secondary",
            ProviderError::quota("daily limit"),
        )),
    );

    let id = harness.start(4);
    let job = harness.wait(&id).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.result.is_none());
    let error = job.error.expect("failed job has an error");
    assert_eq!(error.kind, ErrorKind::Quota);
    assert_eq!(
        error.message,
        "primary (primary): network: net down; secondary (secondary): quota: daily limit"
    );
}

#[tokio::test]
async fn test_invalid_url_and_unknown_id() {
    let harness = TestHarness::new(MockProvider::new("primary"), None);

    let err = tokio_test::assert_err!(harness.dispatcher.start("not-a-url"));
    assert_eq!(err, DispatchError::InvalidUrl("not-a-url".to_string()));
    tokio_test::assert_err!(harness.dispatcher.start("   "));
    tokio_test::assert_err!(harness.dispatcher.start("https://vimeo.com/12345"));
    assert!(harness.dispatcher.list().is_empty());

    assert!(matches!(
        harness.dispatcher.status("00000000-0000-4000-8000-000000000000"),
        Err(DispatchError::NotFound(_))
    ));
    assert_eq!(harness.primary.call_count().await, 0);
}

// =============================================================================
// Properties
// =============================================================================

#[tokio::test]
async fn test_concurrent_starts_yield_distinct_ids() {
    let harness = TestHarness::new(MockProvider::new("primary"), None);

    let handles: Vec<_> = (0..8)
        .map(|task| {
            let dispatcher = Arc::clone(&harness.dispatcher);
            tokio::spawn(async move {
                (0..25)
                    .map(|i| {
                        dispatcher
                            .start(&fixtures::video_url(task * 100 + i))
                            .unwrap()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut ids = HashSet::new();
    for handle in handles {
        ids.extend(handle.await.unwrap());
    }
    assert_eq!(ids.len(), 200);
    assert_eq!(harness.dispatcher.list().len(), 200);

    for id in &ids {
        assert_eq!(harness.wait(id).await.status, JobStatus::Completed);
    }
}

#[tokio::test]
async fn test_same_url_twice_creates_independent_jobs() {
    let harness = TestHarness::new(MockProvider::new("primary"), None);
    let a = harness.start(7);
    let b = harness.start(7);
    assert_ne!(a, b);
    harness.wait(&a).await;
    harness.wait(&b).await;
    assert_eq!(harness.primary.call_count().await, 2);
}

#[tokio::test]
async fn test_observed_status_sequence_is_valid_path() {
    let harness = TestHarness::new(
        MockProvider::failing("primary", network("reset")),
        Some(MockProvider::new("secondary")),
    );
    let mut rx = harness.dispatcher.subscribe();

    let id = harness.start(5);
    let statuses = collect_statuses(&mut rx, &id).await;

    assert_eq!(
        statuses,
        vec![
            (JobStatus::Queued, ProviderSlot::None, 0),
            (JobStatus::Downloading, ProviderSlot::Primary, 1),
            (JobStatus::Downloading, ProviderSlot::Primary, 2),
            (JobStatus::Downloading, ProviderSlot::Primary, 3),
            (JobStatus::Downloading, ProviderSlot::Secondary, 3),
            (JobStatus::Completed, ProviderSlot::Secondary, 3),
        ]
    );
    for pair in statuses.windows(2) {
        assert!(pair[0].0.can_transition_to(pair[1].0));
    }
}

#[tokio::test]
async fn test_non_retryable_primary_error_falls_back_immediately() {
    for error in [
        ProviderError::auth("sign in to confirm"),
        ProviderError::quota("too many requests"),
        ProviderError::filesystem("no space left"),
    ] {
        let harness = TestHarness::new(
            MockProvider::failing("primary", error),
            Some(MockProvider::new("secondary")),
        );

        let job = harness.wait(&harness.start(6)).await;

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.provider, ProviderSlot::Secondary);
        assert_eq!(job.attempt, 1);
        assert_eq!(harness.primary.call_count().await, 1);
    }
}

#[tokio::test]
async fn test_retry_count_is_bounded_without_secondary() {
    let harness = TestHarness::new(
        MockProvider::failing("primary", ProviderError::extraction("unable to extract")),
        None,
    );

    let job = harness.wait(&harness.start(8)).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.attempt, 3);
    assert_eq!(harness.primary.call_count().await, 3);
    let error = job.error.unwrap();
    assert_eq!(error.kind, ErrorKind::Extraction);
    assert_eq!(error.message, "unable to extract");
}

#[tokio::test]
async fn test_zero_max_retries_still_attempts_once() {
    let harness = TestHarness::with_config(
        MockProvider::failing("primary", network("reset")),
        None,
        |config| {
            config.backoff =
                BackoffPolicy::new(0, Duration::from_millis(1), Duration::from_millis(1))
        },
    );

    let job = harness.wait(&harness.start(9)).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(harness.primary.call_count().await, 1);
}

#[tokio::test]
async fn test_progress_is_monotonic_within_attempt() {
    let harness = TestHarness::new(
        MockProvider::new("primary").with_progress(vec![10.0, 40.0, 30.0, 0.0, 80.0, 100.0]),
        None,
    );
    let mut rx = harness.dispatcher.subscribe();
    let id = harness.start(10);
    harness.wait(&id).await;

    let mut percents = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let JobEvent::Progress(p) = event {
            assert_eq!(p.job_id, id);
            percents.push(p.percent);
        }
    }
    assert_eq!(percents, vec![10.0, 40.0, 40.0, 40.0, 80.0, 100.0]);
}

#[tokio::test]
async fn test_attempt_timeout_counts_as_network_failure() {
    let harness = TestHarness::with_config(
        MockProvider::new("primary")
            .with_script(vec![MockOutcome::Hang, MockOutcome::succeed("After Timeout")]),
        None,
        |config| config.attempt_timeout = Duration::from_millis(50),
    );

    let job = harness.wait(&harness.start(11)).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.provider, ProviderSlot::Primary);
    assert_eq!(job.attempt, 2);
    let primary_error = job.primary_error.expect("timeout recorded");
    assert_eq!(primary_error.kind, ErrorKind::Network);
    assert!(primary_error.message.contains("timed out"));
}

#[tokio::test]
async fn test_late_progress_after_terminal_is_dropped() {
    let harness = TestHarness::new(MockProvider::new("primary"), None);
    let id = harness.start(12);
    let job = harness.wait(&id).await;
    assert_eq!(job.progress.percent, 100.0);

    let mut rx = harness.dispatcher.subscribe();
    let sink = harness.primary.last_sink().await.expect("attempt ran");
    sink(ProgressUpdate::new(10.0));

    let after = harness.dispatcher.status(&id).unwrap();
    assert_eq!(after.status, JobStatus::Completed);
    assert_eq!(after.progress.percent, 100.0);
    assert!(after.updated_at == job.updated_at);
    assert!(rx.try_recv().is_err());
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn test_cancel_while_waiting_for_slot() {
    let harness = TestHarness::with_config(
        MockProvider::new("primary").with_delay(Duration::from_millis(200)),
        Some(MockProvider::new("secondary")),
        |config| config.max_concurrent = 1,
    );

    let first = harness.start(13);
    let second = harness.start(14);
    assert_eq!(
        harness.dispatcher.status(&second).unwrap().status,
        JobStatus::Queued
    );

    harness.dispatcher.cancel(&second).unwrap();
    let canceled = harness.wait(&second).await;
    assert_eq!(canceled.status, JobStatus::Failed);
    assert_eq!(canceled.error.unwrap().kind, ErrorKind::Canceled);
    assert_eq!(canceled.attempt, 0);

    assert_eq!(harness.wait(&first).await.status, JobStatus::Completed);
    assert_eq!(harness.primary.call_count().await, 1);
    assert_eq!(harness.secondary_calls().await, 0);
}

#[tokio::test]
async fn test_cancel_during_backoff_wakes_worker() {
    let harness = TestHarness::with_config(
        MockProvider::failing("primary", network("reset")),
        Some(MockProvider::new("secondary")),
        |config| {
            config.backoff =
                BackoffPolicy::new(3, Duration::from_secs(30), Duration::from_secs(30))
        },
    );

    let id = harness.start(15);
    let dispatcher = Arc::clone(&harness.dispatcher);
    let job_id = id.clone();
    tokio::time::timeout(WAIT, async move {
        while dispatcher
            .status(&job_id)
            .map(|j| j.primary_error.is_none())
            .unwrap_or(true)
        {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("first attempt never failed");

    let started = std::time::Instant::now();
    harness.dispatcher.cancel(&id).unwrap();
    let job = harness.wait(&id).await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.unwrap().kind, ErrorKind::Canceled);
    assert_eq!(job.attempt, 1);
    assert_eq!(harness.primary.call_count().await, 1);
    assert_eq!(harness.secondary_calls().await, 0);
}

#[tokio::test]
async fn test_cancel_finished_job_is_rejected() {
    let harness = TestHarness::new(MockProvider::new("primary"), None);
    let id = harness.start(16);
    harness.wait(&id).await;

    assert_eq!(
        harness.dispatcher.cancel(&id),
        Err(DispatchError::AlreadyFinished(id.clone()))
    );
    assert_eq!(
        harness.dispatcher.status(&id).unwrap().status,
        JobStatus::Completed
    );
}

#[tokio::test]
async fn test_shutdown_cancels_active_jobs() {
    let harness = TestHarness::with_config(
        MockProvider::failing("primary", network("reset")),
        None,
        |config| {
            config.backoff =
                BackoffPolicy::new(5, Duration::from_secs(30), Duration::from_secs(30))
        },
    );
    let id = harness.start(17);

    harness.dispatcher.shutdown();
    let job = harness.wait(&id).await;

    assert_eq!(job.error.unwrap().kind, ErrorKind::Canceled);
    assert_eq!(
        harness.dispatcher.start(&fixtures::video_url(18)),
        Err(DispatchError::ShuttingDown)
    );
}

// =============================================================================
// Retention, summary, history
// =============================================================================

#[tokio::test]
async fn test_purge_and_summary() {
    let harness = TestHarness::new(MockProvider::new("primary"), None);
    let a = harness.start(19);
    let b = harness.start(20);
    harness.wait(&a).await;
    harness.wait(&b).await;

    let summary = harness.dispatcher.summary();
    assert!(summary.running);
    assert_eq!(summary.jobs.completed, 2);
    assert_eq!(summary.jobs.total(), 2);

    assert_eq!(harness.dispatcher.purge_finished(Duration::from_secs(3600)), 0);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(harness.dispatcher.purge_finished(Duration::ZERO), 2);
    assert!(harness.dispatcher.list().is_empty());
}

#[tokio::test]
async fn test_terminal_snapshots_are_recorded_in_history() {
    let temp_dir = TempDir::new().unwrap();
    let history = Arc::new(SqliteJobHistory::in_memory().unwrap());
    let dispatcher = DownloadDispatcher::new(
        fixtures::fast_config(temp_dir.path()),
        Arc::new(MockProvider::new("primary")),
        None,
    )
    .with_history(Arc::clone(&history) as Arc<dyn JobHistory>);

    let id = dispatcher.start(&fixtures::video_url(21)).unwrap();

    let recorded = tokio::time::timeout(WAIT, async {
        loop {
            if history.count().unwrap() > 0 {
                break history.recent(10).unwrap();
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("history never written");

    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].id, id);
    assert_eq!(recorded[0].status, JobStatus::Completed);
}
