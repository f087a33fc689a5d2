use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use crate::TaskFailure;

/// How long a task may run when the caller does not pass a deadline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Query-style task, bounded by the configured data-fetch deadline.
    #[default]
    DataFetch,
    /// Fire-and-forget task (e.g. starting a job); unbounded.
    Trigger,
}

impl ExecutionMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DataFetch => "data_fetch",
            Self::Trigger => "trigger",
        }
    }

    pub fn default_deadline(self, data_fetch: Duration) -> Option<Duration> {
        match self {
            Self::DataFetch => Some(data_fetch),
            Self::Trigger => None,
        }
    }
}

/// Runs `work` and stops waiting for it once `deadline` elapses.
///
/// With a deadline, `work` runs on one spawned worker. On expiry `cancel` is
/// triggered and [`TaskFailure::DeadlineExceeded`] is returned; the worker is
/// not aborted, so an in-flight provider call may outlive the dispatch unless
/// it observes `cancel`. Errors from `work` come back unchanged. Without a
/// deadline `work` runs inline.
pub async fn run_with_deadline<F, T>(
    deadline: Option<Duration>,
    cancel: CancellationToken,
    work: F,
) -> Result<T, TaskFailure>
where
    F: Future<Output = Result<T, TaskFailure>> + Send + 'static,
    T: Send + 'static,
{
    let Some(deadline) = deadline else {
        return work.await;
    };

    let worker = tokio::spawn(work);
    match tokio::time::timeout(deadline, worker).await {
        Ok(Ok(outcome)) => {
            trace!(?deadline, "worker finished within deadline");
            outcome
        }
        Ok(Err(join_error)) => Err(TaskFailure::Other(format!(
            "task worker stopped unexpectedly: {join_error}"
        ))),
        Err(_) => {
            cancel.cancel();
            warn!(?deadline, "deadline exceeded, abandoning task worker");
            Err(TaskFailure::DeadlineExceeded(deadline))
        }
    }
}
