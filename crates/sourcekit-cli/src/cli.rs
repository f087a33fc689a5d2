//! CLI argument definitions for sourcekit.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `run` | Dispatch one task against a connector |
//! | `test-connection` | Probe a connector's reachability |
//! | `tasks` | List registered tasks and their parameters |
//! | `inventory` | Extract and log the inventory a provider's tasks depend on |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--log-level` | `warn` | `EnvFilter` directive for diagnostics on stderr |
//! | `--log-format` | `text` | `text` or `json` |
//! | `--pretty` | `false` | Pretty-print JSON output |
//!
//! # Examples
//!
//! ```bash
//! sourcekit run elasticsearch query_logs \
//!     -c host=http://localhost:9200 \
//!     --param index='"logs-*"' --param lucene_query='"level:error"' \
//!     --since-secs 900 --pretty
//!
//! sourcekit test-connection grafana -c host=grafana.internal -c api_key=$TOKEN
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use sourcekit_core::ProviderId;

use crate::logger::LoggerFormat;

#[derive(Debug, Parser)]
#[command(
    name = "sourcekit",
    author,
    version,
    about = "Run connector tasks and print canonical results"
)]
pub struct Cli {
    /// Log filter directive, e.g. `info` or `sourcekit_core=debug`.
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    /// Log output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub log_format: LoggerFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Dispatch one task and print its canonical result.
    Run(RunArgs),
    /// Check that a connector's credentials reach the provider.
    TestConnection(ConnectorArgs),
    /// List registered tasks.
    Tasks(TasksArgs),
    /// Extract every inventory model a provider's tasks depend on.
    Inventory(ConnectorArgs),
}

/// Connector identity and credentials.
#[derive(Debug, Clone, Args)]
pub struct ConnectorArgs {
    /// Provider identifier, e.g. `elasticsearch`.
    pub provider: ProviderId,

    /// Credential entry `key=value`; repeatable, overrides the credentials file.
    #[arg(short = 'c', long = "credential", value_parser = parse_key_value)]
    pub credentials: Vec<(String, String)>,

    /// JSON object of credentials.
    #[arg(long)]
    pub credentials_file: Option<PathBuf>,

    /// Connector name used in logs.
    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub connector: ConnectorArgs,

    /// Task type registered for the provider, e.g. `query_logs`.
    pub task_type: String,

    /// Task parameter `name=value`; the value is parsed as JSON and falls
    /// back to a plain string.
    #[arg(short = 'p', long = "param", value_parser = parse_key_value)]
    pub params: Vec<(String, String)>,

    /// Global variable `name=value`; an empty value declares it unset.
    #[arg(long = "var", value_parser = parse_key_value)]
    pub variables: Vec<(String, String)>,

    /// Query the trailing window of this many seconds.
    #[arg(long, default_value_t = 3_600, conflicts_with_all = ["from", "to"])]
    pub since_secs: u64,

    /// Inclusive RFC3339 start of the time range.
    #[arg(long, requires = "to")]
    pub from: Option<String>,

    /// Exclusive RFC3339 end of the time range.
    #[arg(long, requires = "from")]
    pub to: Option<String>,

    /// Overrides the task's default deadline.
    #[arg(long)]
    pub deadline_secs: Option<u64>,

    /// Also query the window this many seconds earlier (timeseries tasks
    /// only); repeatable.
    #[arg(long = "offset-secs", value_name = "SECONDS")]
    pub offsets: Vec<i64>,
}

#[derive(Debug, Clone, Args)]
pub struct TasksArgs {
    /// Only list tasks of this provider.
    pub provider: Option<ProviderId>,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    Ok((key.to_owned(), value.to_owned()))
}
