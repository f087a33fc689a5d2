use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::client::ProviderClient;
use crate::deadline::ExecutionMode;
use crate::domain::{ParamSchema, ResultKind, ResultPayload, TaskParams, TimeRange};
use crate::inventory::ModelType;
use crate::{DispatchError, ProviderId, TaskFailure, ValidationError};

/// Provider-scoped task name such as `query_logs`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct TaskType(Cow<'static, str>);

impl TaskType {
    pub const fn new(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn parse(name: &str) -> Result<Self, ValidationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyTaskType);
        }
        Ok(Self(Cow::Owned(name.to_ascii_lowercase())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TaskType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything an executor receives for one call.
#[derive(Clone)]
pub struct TaskInvocation {
    pub client: Arc<dyn ProviderClient>,
    pub params: TaskParams,
    pub time_range: TimeRange,
    /// Extra windows, in seconds before `time_range`, for timeseries tasks.
    pub offsets: Vec<i64>,
    /// Triggered when the dispatch stops waiting for this invocation.
    pub cancel: CancellationToken,
}

pub type ExecutorFuture = Pin<Box<dyn Future<Output = Result<ResultPayload, TaskFailure>> + Send>>;

/// Task implementation: turns an invocation into a canonical payload.
pub type Executor = Arc<dyn Fn(TaskInvocation) -> ExecutorFuture + Send + Sync>;

/// Wraps an async function as an [`Executor`].
pub fn executor<F, Fut>(f: F) -> Executor
where
    F: Fn(TaskInvocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ResultPayload, TaskFailure>> + Send + 'static,
{
    Arc::new(move |invocation| Box::pin(f(invocation)))
}

/// Registered binding of `(provider, task_type)` to an executor and its contract.
#[derive(Clone)]
pub struct TaskDefinition {
    pub provider: ProviderId,
    pub task_type: TaskType,
    pub executor: Executor,
    pub result_kind: ResultKind,
    pub required_inventory_types: Vec<ModelType>,
    pub params: ParamSchema,
    pub mode: ExecutionMode,
    pub display_name: &'static str,
}

impl TaskDefinition {
    pub fn new(
        provider: ProviderId,
        task_type: TaskType,
        result_kind: ResultKind,
        executor: Executor,
    ) -> Self {
        Self {
            provider,
            task_type,
            executor,
            result_kind,
            required_inventory_types: Vec::new(),
            params: ParamSchema::default(),
            mode: ExecutionMode::DataFetch,
            display_name: "",
        }
    }

    pub fn with_params(mut self, params: ParamSchema) -> Self {
        self.params = params;
        self
    }

    pub fn with_inventory(mut self, model_types: impl IntoIterator<Item = ModelType>) -> Self {
        self.required_inventory_types = model_types.into_iter().collect();
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_display_name(mut self, display_name: &'static str) -> Self {
        self.display_name = display_name;
        self
    }

    pub fn key(&self) -> (ProviderId, TaskType) {
        (self.provider, self.task_type.clone())
    }
}

impl std::fmt::Debug for TaskDefinition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDefinition")
            .field("provider", &self.provider)
            .field("task_type", &self.task_type)
            .field("result_kind", &self.result_kind)
            .field("required_inventory_types", &self.required_inventory_types)
            .field("params", &self.params)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

/// Collects task definitions at start-up.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    definitions: HashMap<(ProviderId, TaskType), TaskDefinition>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, definition: TaskDefinition) -> Result<&mut Self, DispatchError> {
        let key = definition.key();
        if self.definitions.contains_key(&key) {
            return Err(DispatchError::duplicate_registration(key.0, &key.1));
        }
        self.definitions.insert(key, definition);
        Ok(self)
    }

    pub fn build(self) -> TaskRegistry {
        TaskRegistry {
            definitions: self.definitions,
        }
    }
}

/// Immutable `(provider, task_type) -> definition` table.
///
/// Nothing mutates it after [`RegistryBuilder::build`], so one instance is
/// shared across concurrent dispatches without locking.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    definitions: HashMap<(ProviderId, TaskType), TaskDefinition>,
}

impl TaskRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn resolve(
        &self,
        provider: ProviderId,
        task_type: &TaskType,
    ) -> Result<&TaskDefinition, DispatchError> {
        self.definitions
            .get(&(provider, task_type.clone()))
            .ok_or_else(|| DispatchError::not_registered(provider, task_type))
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// All definitions ordered by provider, then task type.
    pub fn definitions(&self) -> Vec<&TaskDefinition> {
        let mut definitions = self.definitions.values().collect::<Vec<_>>();
        definitions.sort_by(|left, right| left.key().cmp(&right.key()));
        definitions
    }

    pub fn tasks_for(&self, provider: ProviderId) -> Vec<&TaskDefinition> {
        self.definitions()
            .into_iter()
            .filter(|definition| definition.provider == provider)
            .collect()
    }

    /// Distinct inventory model types required by any task of `provider`.
    pub fn inventory_types_for(&self, provider: ProviderId) -> Vec<ModelType> {
        let mut model_types = self
            .tasks_for(provider)
            .into_iter()
            .flat_map(|definition| definition.required_inventory_types.iter().cloned())
            .collect::<Vec<_>>();
        model_types.sort();
        model_types.dedup();
        model_types
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TextResult;
    use crate::ErrorKind;

    fn echo_definition(provider: ProviderId, task: &'static str) -> TaskDefinition {
        TaskDefinition::new(
            provider,
            TaskType::new(task),
            ResultKind::Text,
            executor(|_| async {
                Ok(ResultPayload::Text(TextResult {
                    output: String::from("ok"),
                }))
            }),
        )
    }

    #[test]
    fn rejects_duplicate_registration() {
        let mut builder = TaskRegistry::builder();
        builder
            .register(echo_definition(ProviderId::Jenkins, "run_job"))
            .expect("first registration");

        let err = builder
            .register(echo_definition(ProviderId::Jenkins, "run_job"))
            .expect_err("duplicate must fail");
        assert_eq!(err.kind(), ErrorKind::DuplicateRegistration);
        assert_eq!(builder.build().len(), 1);
    }

    #[test]
    fn builder_debug_lists_pending_definitions() {
        let mut builder = RegistryBuilder::new();
        builder
            .register(echo_definition(ProviderId::Grafana, "list_datasources"))
            .expect("registered");

        let rendered = format!("{builder:?}");
        assert!(rendered.starts_with("RegistryBuilder"), "{rendered}");
        assert!(rendered.contains("list_datasources"), "{rendered}");
    }

    #[test]
    fn same_task_name_may_exist_for_different_providers() {
        let mut builder = TaskRegistry::builder();
        builder
            .register(echo_definition(ProviderId::Elasticsearch, "query_logs"))
            .and_then(|b| b.register(echo_definition(ProviderId::OpenSearch, "query_logs")))
            .expect("distinct keys");
        assert_eq!(builder.build().len(), 2);
    }

    #[test]
    fn resolve_reports_unregistered_pairs() {
        let registry = TaskRegistry::builder().build();
        let err = registry
            .resolve(ProviderId::Grafana, &TaskType::new("prometheus_query"))
            .expect_err("nothing registered");

        assert_eq!(err.kind(), ErrorKind::NotRegistered);
        assert_eq!(err.provider(), Some(ProviderId::Grafana));
    }

    #[test]
    fn collects_inventory_types_per_provider() {
        let index = ModelType::new("elasticsearch_index");
        let mut builder = TaskRegistry::builder();
        builder
            .register(
                echo_definition(ProviderId::Elasticsearch, "query_logs").with_inventory([index.clone()]),
            )
            .and_then(|b| {
                b.register(
                    echo_definition(ProviderId::Elasticsearch, "list_indices")
                        .with_inventory([index.clone()]),
                )
            })
            .expect("registered");

        let registry = builder.build();
        assert_eq!(registry.inventory_types_for(ProviderId::Elasticsearch), vec![index]);
        assert!(registry.inventory_types_for(ProviderId::Jenkins).is_empty());
    }

    #[test]
    fn task_type_parse_normalizes_and_rejects_blank() {
        assert_eq!(TaskType::parse(" Query_Logs ").expect("valid"), TaskType::new("query_logs"));
        assert!(matches!(TaskType::parse("  "), Err(ValidationError::EmptyTaskType)));
    }
}
