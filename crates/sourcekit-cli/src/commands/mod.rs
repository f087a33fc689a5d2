mod inventory;
mod run;
mod tasks;
mod test_connection;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use sourcekit_core::{
    adapters, Connector, Credentials, DispatchConfig, Dispatcher, TaskRegistry,
};

use crate::cli::{Cli, Command, ConnectorArgs};
use crate::error::CliError;

/// JSON document to print plus whether the command achieved its goal.
pub struct CommandOutcome {
    pub data: Value,
    pub success: bool,
}

impl CommandOutcome {
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            success: true,
        }
    }

    pub fn failed(data: Value) -> Self {
        Self {
            data,
            success: false,
        }
    }
}

pub async fn run(cli: &Cli) -> Result<CommandOutcome, CliError> {
    let dispatcher = dispatcher()?;

    match &cli.command {
        Command::Run(args) => run::run(args, &dispatcher).await,
        Command::TestConnection(args) => test_connection::run(args, &dispatcher).await,
        Command::Tasks(args) => tasks::run(args, &dispatcher),
        Command::Inventory(args) => inventory::run(args, &dispatcher).await,
    }
}

/// Registry and factory are built once here and shared by every command.
fn dispatcher() -> Result<Dispatcher, CliError> {
    let mut builder = TaskRegistry::builder();
    adapters::register_all(&mut builder)?;
    Ok(Dispatcher::new(
        Arc::new(builder.build()),
        adapters::connector_factory(None),
        DispatchConfig::from_env(),
    ))
}

fn connector(args: &ConnectorArgs) -> Result<Connector, CliError> {
    let mut entries = match &args.credentials_file {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            serde_json::from_str::<BTreeMap<String, String>>(&raw)?
        }
        None => BTreeMap::new(),
    };
    entries.extend(args.credentials.iter().cloned());

    let connector = Connector::new(args.provider, entries.into_iter().collect::<Credentials>());
    Ok(match &args.name {
        Some(name) => connector.with_name(name.clone()),
        None => connector,
    })
}
