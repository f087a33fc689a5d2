use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::DispatchConfig;
use crate::connector::{Connector, ConnectorFactory};
use crate::deadline::run_with_deadline;
use crate::domain::{CanonicalResult, ResultKind, TimeRange};
use crate::inventory::{publish, MetadataSink, ModelType};
use crate::registry::{TaskInvocation, TaskRegistry, TaskType};
use crate::{DispatchError, ErrorKind, ProviderId, ValidationError};

/// One task call as supplied by a scheduler or operator.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchRequest {
    pub provider: ProviderId,
    pub task_type: TaskType,
    pub params: Map<String, Value>,
    pub time_range: TimeRange,
    /// Overrides the task's default deadline.
    pub deadline: Option<Duration>,
    /// Global variables substituted into string parameters; `None` marks a
    /// variable that is declared but unset.
    pub variables: BTreeMap<String, Option<String>>,
    /// Comparison windows for timeseries tasks, in seconds before `time_range`.
    pub offsets: Vec<i64>,
}

impl DispatchRequest {
    pub fn new(provider: ProviderId, task_type: TaskType, time_range: TimeRange) -> Self {
        Self {
            provider,
            task_type,
            params: Map::new(),
            time_range,
            deadline: None,
            variables: BTreeMap::new(),
            offsets: Vec::new(),
        }
    }

    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = params;
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: Option<String>) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    /// Also queries the window shifted back by each offset, in seconds.
    pub fn with_offsets(mut self, offsets: impl IntoIterator<Item = i64>) -> Self {
        self.offsets.extend(offsets);
        self
    }
}

/// Outcome of one inventory sync: items extracted per model type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InventoryReport {
    pub extracted: BTreeMap<ModelType, usize>,
    pub failed: Vec<ModelType>,
}

/// Resolves, validates and runs registered tasks.
///
/// Holds only read-only state, so a single dispatcher serves any number of
/// concurrent calls.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<TaskRegistry>,
    factory: ConnectorFactory,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(registry: Arc<TaskRegistry>, factory: ConnectorFactory, config: DispatchConfig) -> Self {
        Self {
            registry,
            factory,
            config,
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub const fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Runs one task and returns its canonical result or a classified error.
    #[instrument(
        level = "debug",
        skip_all,
        fields(
            dispatch_id = %Uuid::new_v4(),
            provider = %request.provider,
            task_type = %request.task_type,
        )
    )]
    pub async fn dispatch(
        &self,
        request: DispatchRequest,
        connector: &Connector,
    ) -> Result<CanonicalResult, DispatchError> {
        let provider = request.provider;
        let task_type = request.task_type.clone();

        match self.run(request, connector).await {
            Ok(result) => {
                debug!(kind = %result.kind(), "task completed");
                Ok(result)
            }
            Err(err) => {
                let err = err.with_provider(provider).with_task_type(task_type);
                log_failure(&err);
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        request: DispatchRequest,
        connector: &Connector,
    ) -> Result<CanonicalResult, DispatchError> {
        let DispatchRequest {
            provider,
            task_type,
            mut params,
            time_range,
            deadline,
            variables,
            offsets,
        } = request;

        let definition = self.registry.resolve(provider, &task_type)?;
        if connector.provider != provider {
            return Err(DispatchError::new(
                ErrorKind::Validation,
                format!("{} connector cannot run {provider} tasks", connector.provider),
            ));
        }

        check_offsets(&task_type, definition.result_kind, time_range, &offsets)?;
        let used_variables = definition.params.substitute_variables(&mut params, &variables)?;
        let params = definition.params.validate(&params)?;
        let client = self.factory.build(connector, &self.config)?;

        let deadline = deadline.or_else(|| {
            definition
                .mode
                .default_deadline(self.config.data_fetch_deadline)
        });
        let cancel = CancellationToken::new();
        let work = (definition.executor)(TaskInvocation {
            client,
            params,
            time_range,
            offsets,
            cancel: cancel.clone(),
        });

        debug!(?deadline, mode = definition.mode.as_str(), "running executor");
        let payload = run_with_deadline(deadline, cancel, work)
            .await
            .map_err(|failure| {
                DispatchError::from(
                    failure.with_context(format!("error while executing {task_type} for {provider}")),
                )
            })?;

        if payload.kind() != definition.result_kind {
            return Err(DispatchError::new(
                ErrorKind::Provider,
                format!(
                    "task declared a {} result but produced {}",
                    definition.result_kind,
                    payload.kind()
                ),
            ));
        }

        Ok(CanonicalResult::new(provider, payload).with_variables(used_variables))
    }

    /// Builds the connector's client and asks it to prove reachability.
    #[instrument(level = "debug", skip_all, fields(provider = %connector.provider))]
    pub async fn test_connection(&self, connector: &Connector) -> Result<bool, DispatchError> {
        let provider = connector.provider;
        let client = self.factory.build(connector, &self.config)?;

        let outcome = run_with_deadline(
            Some(self.config.data_fetch_deadline),
            CancellationToken::new(),
            async move { client.test_connection().await },
        )
        .await;

        match outcome {
            Ok(reachable) => {
                info!(reachable, "connection test finished");
                Ok(reachable)
            }
            Err(failure) => {
                let err = DispatchError::from(failure).with_provider(provider);
                log_failure(&err);
                Err(err)
            }
        }
    }

    /// Extracts every inventory model the provider's tasks depend on and hands
    /// each batch to `sink`. Extraction and sink failures are logged and
    /// recorded in the report, never returned.
    #[instrument(level = "debug", skip_all, fields(provider = %connector.provider))]
    pub async fn sync_inventory(
        &self,
        connector: &Connector,
        sink: &dyn MetadataSink,
    ) -> Result<InventoryReport, DispatchError> {
        let provider = connector.provider;
        let client = self.factory.build(connector, &self.config)?;
        let mut report = InventoryReport::default();

        for model_type in self.registry.inventory_types_for(provider) {
            match client.extract_inventory(&model_type).await {
                Ok(items) => {
                    report.extracted.insert(model_type.clone(), items.len());
                    if !publish(sink, provider, &model_type, items).await {
                        report.failed.push(model_type);
                    }
                }
                Err(failure) => {
                    warn!(%model_type, error = %failure, "inventory extraction failed");
                    report.failed.push(model_type);
                }
            }
        }

        Ok(report)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("tasks", &self.registry.len())
            .field("factory", &self.factory)
            .field("config", &self.config)
            .finish()
    }
}

/// Offsets are only meaningful for timeseries tasks, must be positive and
/// must keep the shifted window representable.
fn check_offsets(
    task_type: &TaskType,
    result_kind: ResultKind,
    time_range: TimeRange,
    offsets: &[i64],
) -> Result<(), ValidationError> {
    if offsets.is_empty() {
        return Ok(());
    }
    if result_kind != ResultKind::Timeseries {
        return Err(ValidationError::OffsetsNotSupported {
            task_type: task_type.to_string(),
            result_kind: result_kind.to_string(),
        });
    }
    for &offset in offsets {
        if offset <= 0 {
            return Err(ValidationError::InvalidOffset { offset });
        }
        time_range.shifted_back(offset)?;
    }
    Ok(())
}

fn log_failure(err: &DispatchError) {
    match err.kind() {
        ErrorKind::Provider => error!(
            provider = ?err.provider(),
            task_type = ?err.task_type().map(TaskType::as_str),
            code = err.code(),
            "{}",
            err.message()
        ),
        ErrorKind::NoData => info!(code = err.code(), "{}", err.message()),
        _ => warn!(code = err.code(), retryable = err.retryable(), "{}", err.message()),
    }
}
