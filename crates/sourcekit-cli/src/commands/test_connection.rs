use serde_json::json;
use sourcekit_core::Dispatcher;

use super::{connector, CommandOutcome};
use crate::cli::ConnectorArgs;
use crate::error::CliError;

pub async fn run(args: &ConnectorArgs, dispatcher: &Dispatcher) -> Result<CommandOutcome, CliError> {
    let connector = connector(args)?;
    let reachable = dispatcher.test_connection(&connector).await?;

    let data = json!({ "provider": connector.provider, "reachable": reachable });
    Ok(if reachable {
        CommandOutcome::ok(data)
    } else {
        CommandOutcome::failed(data)
    })
}
