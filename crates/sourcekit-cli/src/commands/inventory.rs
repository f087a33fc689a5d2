use sourcekit_core::{Dispatcher, LoggingMetadataSink};

use super::{connector, CommandOutcome};
use crate::cli::ConnectorArgs;
use crate::error::CliError;

pub async fn run(args: &ConnectorArgs, dispatcher: &Dispatcher) -> Result<CommandOutcome, CliError> {
    let connector = connector(args)?;
    let report = dispatcher
        .sync_inventory(&connector, &LoggingMetadataSink)
        .await?;

    let success = report.failed.is_empty();
    let data = serde_json::to_value(&report)?;
    Ok(if success {
        CommandOutcome::ok(data)
    } else {
        CommandOutcome::failed(data)
    })
}
