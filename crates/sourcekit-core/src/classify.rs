use crate::{DispatchError, ErrorKind, TaskFailure, ValidationError};

/// Tags a raw failure with its taxonomy kind. Context wrappers are looked through.
pub fn classify(failure: &TaskFailure) -> ErrorKind {
    match failure.root() {
        TaskFailure::Validation(_) => ErrorKind::Validation,
        TaskFailure::Credential(_) => ErrorKind::Credential,
        TaskFailure::Transport(_) => ErrorKind::Connection,
        TaskFailure::UpstreamStatus { status, .. } => classify_status(*status),
        TaskFailure::NoData(_) => ErrorKind::NoData,
        TaskFailure::DeadlineExceeded(_) => ErrorKind::DeadlineExceeded,
        TaskFailure::UnexpectedPayload(_)
        | TaskFailure::Decode(_)
        | TaskFailure::Context { .. }
        | TaskFailure::Other(_) => ErrorKind::Provider,
    }
}

/// Auth rejections, throttling and server errors are connection problems;
/// any other non-success status means the provider refused the request itself.
pub const fn classify_status(status: u16) -> ErrorKind {
    match status {
        401 | 403 | 407 | 408 | 429 | 500..=599 => ErrorKind::Connection,
        _ => ErrorKind::Provider,
    }
}

impl From<TaskFailure> for DispatchError {
    fn from(failure: TaskFailure) -> Self {
        DispatchError::new(classify(&failure), failure.to_string())
    }
}

impl From<ValidationError> for DispatchError {
    fn from(err: ValidationError) -> Self {
        DispatchError::new(ErrorKind::Validation, err.to_string())
    }
}
