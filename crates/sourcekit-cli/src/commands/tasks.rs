use serde::Serialize;
use sourcekit_core::{
    Dispatcher, ExecutionMode, ModelType, ParamSpec, ProviderId, ResultKind, TaskDefinition, TaskType,
};

use super::CommandOutcome;
use crate::cli::TasksArgs;
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct TaskSummary<'a> {
    provider: ProviderId,
    task_type: &'a TaskType,
    display_name: &'static str,
    result_kind: ResultKind,
    mode: ExecutionMode,
    params: &'a [ParamSpec],
    required_inventory_types: &'a [ModelType],
}

impl<'a> From<&'a TaskDefinition> for TaskSummary<'a> {
    fn from(definition: &'a TaskDefinition) -> Self {
        Self {
            provider: definition.provider,
            task_type: &definition.task_type,
            display_name: definition.display_name,
            result_kind: definition.result_kind,
            mode: definition.mode,
            params: definition.params.specs(),
            required_inventory_types: &definition.required_inventory_types,
        }
    }
}

pub fn run(args: &TasksArgs, dispatcher: &Dispatcher) -> Result<CommandOutcome, CliError> {
    let registry = dispatcher.registry();
    let definitions = match args.provider {
        Some(provider) => registry.tasks_for(provider),
        None => registry.definitions(),
    };

    let summaries = definitions
        .into_iter()
        .map(TaskSummary::from)
        .collect::<Vec<_>>();
    Ok(CommandOutcome::ok(serde_json::to_value(summaries)?))
}
