use std::fmt::{Display, Formatter};
use std::time::Duration;

use thiserror::Error;

use crate::domain::ParamType;
use crate::http_client::HttpError;
use crate::{ProviderId, TaskType};

/// Validation and contract errors exposed by `sourcekit-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid provider '{value}'")]
    InvalidProvider { value: String },
    #[error("task type cannot be empty")]
    EmptyTaskType,
    #[error("invalid result kind '{value}', expected one of table, timeseries, text, logs")]
    InvalidResultKind { value: String },

    #[error("time range start {geq} must be before end {lt}")]
    InvalidTimeRange { geq: i64, lt: i64 },
    #[error("invalid RFC3339 timestamp '{value}'")]
    InvalidTimestamp { value: String },
    #[error("timeseries offset must be a positive number of seconds within range, got {offset}")]
    InvalidOffset { offset: i64 },
    #[error("timeseries offsets only apply to timeseries tasks, '{task_type}' returns {result_kind}")]
    OffsetsNotSupported {
        task_type: String,
        result_kind: String,
    },

    #[error("invalid task parameters: {}", render_issues(.issues))]
    InvalidParameters { issues: Vec<FieldIssue> },
    #[error("parameters do not match the executor's shape: {message}")]
    ParameterShape { message: String },

    #[error("global variable '{name}' has no value")]
    UnsetVariable { name: String },
}

/// One problem found while checking parameters against a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldIssue {
    Missing { name: String },
    WrongType {
        name: String,
        expected: ParamType,
        found: &'static str,
    },
}

impl FieldIssue {
    pub fn name(&self) -> &str {
        match self {
            Self::Missing { name } | Self::WrongType { name, .. } => name,
        }
    }
}

impl Display for FieldIssue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing { name } => write!(f, "missing required field '{name}'"),
            Self::WrongType {
                name,
                expected,
                found,
            } => write!(f, "field '{name}' expected {expected}, found {found}"),
        }
    }
}

fn render_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Raw failure raised anywhere below the dispatcher, before classification.
#[derive(Debug, Error)]
pub enum TaskFailure {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("credential error: {0}")]
    Credential(String),

    #[error("transport error: {0}")]
    Transport(#[from] HttpError),

    #[error("upstream returned status {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("no data found: {0}")]
    NoData(String),

    #[error("deadline of {}s exceeded", .0.as_secs_f64())]
    DeadlineExceeded(Duration),

    #[error("unexpected payload: {0}")]
    UnexpectedPayload(String),

    #[error("payload decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{context}: {inner}")]
    Context {
        context: String,
        #[source]
        inner: Box<TaskFailure>,
    },

    #[error("{0}")]
    Other(String),
}

impl TaskFailure {
    pub fn no_data(message: impl Into<String>) -> Self {
        Self::NoData(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::UnexpectedPayload(message.into())
    }

    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            inner: Box::new(self),
        }
    }

    /// Innermost failure under any `Context` wrapping.
    pub fn root(&self) -> &TaskFailure {
        match self {
            Self::Context { inner, .. } => inner.root(),
            other => other,
        }
    }
}

/// Fixed taxonomy every failure is tagged with before leaving the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Credential,
    Connection,
    NoData,
    DeadlineExceeded,
    Provider,
    NotRegistered,
    DuplicateRegistration,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Credential => "credential",
            Self::Connection => "connection",
            Self::NoData => "no_data",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::Provider => "provider",
            Self::NotRegistered => "not_registered",
            Self::DuplicateRegistration => "duplicate_registration",
        }
    }

    /// Whether a caller may reasonably try the same call again.
    pub const fn retryable(self) -> bool {
        matches!(self, Self::Connection | Self::DeadlineExceeded)
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified error returned to dispatch callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchError {
    kind: ErrorKind,
    message: String,
    provider: Option<ProviderId>,
    task_type: Option<TaskType>,
}

impl DispatchError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            provider: None,
            task_type: None,
        }
    }

    pub fn not_registered(provider: ProviderId, task_type: &TaskType) -> Self {
        Self::new(
            ErrorKind::NotRegistered,
            format!("task '{task_type}' is not registered for provider '{provider}'"),
        )
        .with_provider(provider)
        .with_task_type(task_type.clone())
    }

    pub fn duplicate_registration(provider: ProviderId, task_type: &TaskType) -> Self {
        Self::new(
            ErrorKind::DuplicateRegistration,
            format!("task '{task_type}' is already registered for provider '{provider}'"),
        )
        .with_provider(provider)
        .with_task_type(task_type.clone())
    }

    pub fn no_client_constructor(provider: ProviderId) -> Self {
        Self::new(
            ErrorKind::NotRegistered,
            format!("no client constructor is registered for provider '{provider}'"),
        )
        .with_provider(provider)
    }

    pub fn with_provider(mut self, provider: ProviderId) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_task_type(mut self, task_type: TaskType) -> Self {
        self.task_type = Some(task_type);
        self
    }

    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn provider(&self) -> Option<ProviderId> {
        self.provider
    }

    pub fn task_type(&self) -> Option<&TaskType> {
        self.task_type.as_ref()
    }

    pub const fn retryable(&self) -> bool {
        self.kind.retryable()
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            ErrorKind::Validation => "dispatch.validation",
            ErrorKind::Credential => "dispatch.credential",
            ErrorKind::Connection => "dispatch.connection",
            ErrorKind::NoData => "dispatch.no_data",
            ErrorKind::DeadlineExceeded => "dispatch.deadline_exceeded",
            ErrorKind::Provider => "dispatch.provider",
            ErrorKind::NotRegistered => "dispatch.not_registered",
            ErrorKind::DuplicateRegistration => "dispatch.duplicate_registration",
        }
    }
}

impl Display for DispatchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for DispatchError {}
