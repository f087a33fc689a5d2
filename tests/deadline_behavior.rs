//! Behavior-driven tests for the execution deadline wrapper.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use sourcekit_core::adapters;
use sourcekit_core::{
    run_with_deadline, Connector, Credentials, DispatchConfig, DispatchRequest, Dispatcher,
    ErrorKind, ExecutionMode, HttpClient, HttpError, HttpRequest, HttpResponse, ProviderId,
    TaskFailure, TaskRegistry, TaskType, TimeRange,
};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn when_work_finishes_in_time_its_result_is_returned_unchanged() {
    // Given: Work that fails on its own well within the deadline
    let outcome: Result<u32, TaskFailure> = run_with_deadline(
        Some(Duration::from_secs(5)),
        CancellationToken::new(),
        async { Err(TaskFailure::no_data("nothing indexed")) },
    )
    .await;

    // Then: Its own error comes back, not a deadline error
    assert!(matches!(outcome, Err(TaskFailure::NoData(_))));
}

#[tokio::test]
async fn when_deadline_expires_the_worker_is_told_to_stop() {
    // Given: Work that only stops once it observes cancellation
    let cancel = CancellationToken::new();
    let observed = Arc::new(AtomicBool::new(false));
    let work = {
        let cancel = cancel.clone();
        let observed = Arc::clone(&observed);
        async move {
            cancel.cancelled().await;
            observed.store(true, Ordering::SeqCst);
            Ok::<_, TaskFailure>(())
        }
    };

    // When: The deadline elapses first
    let outcome = run_with_deadline(Some(Duration::from_millis(30)), cancel.clone(), work).await;

    // Then: The caller gets DeadlineExceeded and the worker sees the signal
    assert!(matches!(outcome, Err(TaskFailure::DeadlineExceeded(deadline)) if deadline == Duration::from_millis(30)));
    assert!(cancel.is_cancelled());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(observed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn when_no_deadline_is_given_work_runs_to_completion() {
    let outcome = run_with_deadline(None, CancellationToken::new(), async {
        tokio::time::sleep(Duration::from_millis(40)).await;
        Ok::<_, TaskFailure>("done")
    })
    .await;

    assert_eq!(outcome.expect("unbounded work completes"), "done");
}

#[test]
fn trigger_tasks_have_no_default_deadline() {
    let data_fetch = Duration::from_secs(120);
    assert_eq!(
        ExecutionMode::DataFetch.default_deadline(data_fetch),
        Some(data_fetch)
    );
    assert_eq!(ExecutionMode::Trigger.default_deadline(data_fetch), None);
}

/// Transport that never answers.
struct StalledHttpClient;

impl HttpClient for StalledHttpClient {
    fn execute<'a>(
        &'a self,
        _request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        Box::pin(std::future::pending())
    }
}

#[tokio::test]
async fn when_a_provider_stalls_dispatch_returns_at_the_deadline() {
    // Given: The bundled Elasticsearch adapter over a transport that never answers
    let mut builder = TaskRegistry::builder();
    adapters::register_all(&mut builder).expect("bundled tasks register");
    let dispatcher = Dispatcher::new(
        Arc::new(builder.build()),
        adapters::connector_factory(Some(Arc::new(StalledHttpClient))),
        DispatchConfig::default(),
    );
    let connector = Connector::new(
        ProviderId::Elasticsearch,
        Credentials::new().with("host", "http://es.test:9200"),
    );
    let request = DispatchRequest::new(
        ProviderId::Elasticsearch,
        TaskType::new("query_logs"),
        TimeRange::last(Duration::from_secs(900)).expect("valid range"),
    )
    .with_param("index", "logs-*")
    .with_param("lucene_query", "level:error")
    .with_deadline(Duration::from_millis(50));

    // When: The task is dispatched with a short deadline
    let started = Instant::now();
    let err = dispatcher
        .dispatch(request, &connector)
        .await
        .expect_err("stalled provider");

    // Then: The caller is released with a retryable deadline error
    assert_eq!(err.kind(), ErrorKind::DeadlineExceeded);
    assert!(err.retryable());
    assert!(started.elapsed() < Duration::from_secs(2));
}
