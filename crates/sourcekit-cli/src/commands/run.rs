use std::time::Duration;

use serde_json::Value;
use sourcekit_core::{DispatchRequest, Dispatcher, TaskType, TimeRange};

use super::{connector, CommandOutcome};
use crate::cli::RunArgs;
use crate::error::CliError;

pub async fn run(args: &RunArgs, dispatcher: &Dispatcher) -> Result<CommandOutcome, CliError> {
    let connector = connector(&args.connector)?;
    let time_range = match (&args.from, &args.to) {
        (Some(from), Some(to)) => TimeRange::parse_rfc3339(from, to)?,
        _ => TimeRange::last(Duration::from_secs(args.since_secs))?,
    };

    let mut request = DispatchRequest::new(
        args.connector.provider,
        TaskType::parse(&args.task_type)?,
        time_range,
    );
    for (name, raw) in &args.params {
        request = request.with_param(name.clone(), param_value(raw));
    }
    for (name, value) in &args.variables {
        let value = (!value.is_empty()).then(|| value.clone());
        request = request.with_variable(name.clone(), value);
    }
    if let Some(seconds) = args.deadline_secs {
        request = request.with_deadline(Duration::from_secs(seconds));
    }
    request = request.with_offsets(args.offsets.iter().copied());

    let result = dispatcher.dispatch(request, &connector).await?;
    Ok(CommandOutcome::ok(serde_json::to_value(result)?))
}

/// JSON when it parses, the raw text otherwise.
fn param_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_owned()))
}
