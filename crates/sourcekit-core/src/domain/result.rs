use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::{ProviderId, ValidationError};

/// Closed set of result shapes a task may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    Table,
    Timeseries,
    Text,
    Logs,
}

impl ResultKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::Timeseries => "timeseries",
            Self::Text => "text",
            Self::Logs => "logs",
        }
    }
}

impl Display for ResultKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResultKind {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "timeseries" => Ok(Self::Timeseries),
            "text" => Ok(Self::Text),
            "logs" => Ok(Self::Logs),
            _ => Err(ValidationError::InvalidResultKind {
                value: value.to_owned(),
            }),
        }
    }
}

/// One table row: ordered `(column, value)` cells. Serializes as a JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    cells: Vec<(String, String)>,
}

impl Row {
    pub fn new(cells: Vec<(String, String)>) -> Self {
        Self { cells }
    }

    pub fn cells(&self) -> &[(String, String)] {
        &self.cells
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(column, _)| column.as_str())
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    pub fn values(&self) -> Vec<&str> {
        self.cells.iter().map(|(_, value)| value.as_str()).collect()
    }
}

impl Serialize for Row {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (column, value) in &self.cells {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// Flat string table. Every row carries the first row's columns in the same order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableResult {
    pub raw_query: String,
    pub total_count: u64,
    pub rows: Vec<Row>,
}

impl TableResult {
    pub fn columns(&self) -> Vec<&str> {
        self.rows
            .first()
            .map(|row| row.columns().collect())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Datapoint {
    pub timestamp_ms: i64,
    pub value: f64,
}

impl Datapoint {
    pub const fn new(timestamp_ms: i64, value: f64) -> Self {
        Self {
            timestamp_ms,
            value,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LabeledSeries {
    pub labels: BTreeMap<String, String>,
    pub datapoints: Vec<Datapoint>,
}

impl LabeledSeries {
    pub fn is_ordered(&self) -> bool {
        self.datapoints
            .windows(2)
            .all(|pair| pair[0].timestamp_ms <= pair[1].timestamp_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimeseriesResult {
    pub metric_name: String,
    pub series: Vec<LabeledSeries>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TextResult {
    pub output: String,
}

/// Shape produced by an executor, before the dispatcher stamps provenance on it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum ResultPayload {
    Table(TableResult),
    Timeseries(TimeseriesResult),
    Text(TextResult),
    Logs(TableResult),
}

impl ResultPayload {
    pub const fn kind(&self) -> ResultKind {
        match self {
            Self::Table(_) => ResultKind::Table,
            Self::Timeseries(_) => ResultKind::Timeseries,
            Self::Text(_) => ResultKind::Text,
            Self::Logs(_) => ResultKind::Logs,
        }
    }
}

/// Normalized task result returned to dispatch callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalResult {
    pub source: ProviderId,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub task_local_variables: BTreeMap<String, String>,
    #[serde(flatten)]
    pub payload: ResultPayload,
}

impl CanonicalResult {
    pub fn new(source: ProviderId, payload: ResultPayload) -> Self {
        Self {
            source,
            task_local_variables: BTreeMap::new(),
            payload,
        }
    }

    pub fn with_variables(mut self, variables: BTreeMap<String, String>) -> Self {
        self.task_local_variables = variables;
        self
    }

    pub const fn kind(&self) -> ResultKind {
        self.payload.kind()
    }

    pub fn as_table(&self) -> Option<&TableResult> {
        match &self.payload {
            ResultPayload::Table(table) | ResultPayload::Logs(table) => Some(table),
            _ => None,
        }
    }

    pub fn as_timeseries(&self) -> Option<&TimeseriesResult> {
        match &self.payload {
            ResultPayload::Timeseries(series) => Some(series),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&TextResult> {
        match &self.payload {
            ResultPayload::Text(text) => Some(text),
            _ => None,
        }
    }
}
