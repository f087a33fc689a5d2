//! Provider payload to canonical result shaping.
//!
//! Tables are flattened one level: an object-valued field `meta` becomes
//! `meta.<child>` columns, everything else is stringified in place. Column
//! order is fixed by the first row; later rows are projected onto it, with
//! `""` for absent columns and extra columns dropped.
//!
//! Timeseries keep bucket alignment: every requested metric yields one
//! datapoint per bucket, `0.0` where the provider reported nothing.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};

use crate::domain::{
    json_type_name, Datapoint, LabeledSeries, Row, TableResult, TextResult, TimeseriesResult,
};
use crate::TaskFailure;

/// Renders any JSON value as a table cell.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::from("null"),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// A later cell with an already-seen column name overwrites the earlier
/// value in place, so `{"a.b": 1, "a": {"b": 2}}` yields one `a.b` of `2`.
fn flatten(object: &Map<String, Value>) -> Vec<(String, String)> {
    let mut cells = Vec::with_capacity(object.len());
    for (field, value) in object {
        match value {
            Value::Object(children) => {
                for (child, child_value) in children {
                    put_cell(&mut cells, format!("{field}.{child}"), stringify(child_value));
                }
            }
            other => put_cell(&mut cells, field.clone(), stringify(other)),
        }
    }
    cells
}

fn put_cell(cells: &mut Vec<(String, String)>, column: String, value: String) {
    match cells.iter_mut().find(|(name, _)| *name == column) {
        Some(cell) => cell.1 = value,
        None => cells.push((column, value)),
    }
}

/// Builds a table whose `total_count` is the number of rows returned.
pub fn to_table(raw_rows: &[Value], raw_query: impl Into<String>) -> Result<TableResult, TaskFailure> {
    let total = u64::try_from(raw_rows.len()).unwrap_or(u64::MAX);
    to_table_with_total(raw_rows, raw_query, total)
}

/// Builds a table for a page of a larger result set of `total_count` rows.
pub fn to_table_with_total(
    raw_rows: &[Value],
    raw_query: impl Into<String>,
    total_count: u64,
) -> Result<TableResult, TaskFailure> {
    let mut flattened = Vec::with_capacity(raw_rows.len());
    for (position, raw) in raw_rows.iter().enumerate() {
        let Value::Object(object) = raw else {
            return Err(TaskFailure::unexpected(format!(
                "row {position} is {}, expected object",
                json_type_name(raw)
            )));
        };
        flattened.push(flatten(object));
    }

    let columns = flattened
        .first()
        .map(|first| first.iter().map(|(column, _)| column.clone()).collect::<Vec<_>>())
        .unwrap_or_default();

    let rows = flattened
        .into_iter()
        .map(|mut cells| {
            Row::new(
                columns
                    .iter()
                    .map(|column| {
                        let value = cells
                            .iter()
                            .position(|(name, _)| name == column)
                            .map(|index| cells.swap_remove(index).1)
                            .unwrap_or_default();
                        (column.clone(), value)
                    })
                    .collect(),
            )
        })
        .collect();

    Ok(TableResult {
        raw_query: raw_query.into(),
        total_count,
        rows,
    })
}

pub fn to_text(output: impl Into<String>) -> TextResult {
    TextResult {
        output: output.into(),
    }
}

fn bucket_timestamp(bucket: &Value) -> Option<i64> {
    ["timestamp", "key"]
        .iter()
        .filter_map(|field| bucket.get(field))
        .find_map(|value| value.as_i64().or_else(|| value.as_f64().map(|ts| ts as i64)))
}

fn bucket_value(bucket: &Value, metric: &str) -> f64 {
    match bucket.get(metric) {
        Some(Value::Number(number)) => number.as_f64().unwrap_or(0.0),
        Some(Value::Object(inner)) => inner.get("value").and_then(Value::as_f64).unwrap_or(0.0),
        Some(Value::String(text)) => text.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Builds one series per metric from histogram-style buckets.
///
/// Each bucket needs a millisecond `timestamp` (or `key`) and may carry each
/// metric either as a number or as `{"value": n}`; `label_extractor` maps a
/// metric name to the labels of its series.
pub fn to_timeseries<L>(
    raw_buckets: &[Value],
    metric_name: impl Into<String>,
    metrics: &[&str],
    label_extractor: L,
) -> Result<TimeseriesResult, TaskFailure>
where
    L: Fn(&str) -> BTreeMap<String, String>,
{
    let mut buckets = Vec::with_capacity(raw_buckets.len());
    for (position, bucket) in raw_buckets.iter().enumerate() {
        let timestamp = bucket_timestamp(bucket).ok_or_else(|| {
            TaskFailure::unexpected(format!("bucket {position} has no timestamp"))
        })?;
        buckets.push((timestamp, bucket));
    }
    buckets.sort_by_key(|(timestamp, _)| *timestamp);

    let series = metrics
        .iter()
        .map(|metric| LabeledSeries {
            labels: label_extractor(metric),
            datapoints: buckets
                .iter()
                .map(|(timestamp, bucket)| Datapoint::new(*timestamp, bucket_value(bucket, metric)))
                .collect(),
        })
        .collect();

    Ok(TimeseriesResult {
        metric_name: metric_name.into(),
        series,
    })
}

/// Label distinguishing the requested window (`0`) from shifted comparison windows.
pub const OFFSET_LABEL: &str = "offset_seconds";

/// Stamps every series with how many seconds before the requested window it was sampled.
pub fn tag_offset(result: &mut TimeseriesResult, offset_seconds: i64) {
    for series in &mut result.series {
        series
            .labels
            .insert(OFFSET_LABEL.to_owned(), offset_seconds.to_string());
    }
}

/// Aligns independently sampled series onto the union of their timestamps.
///
/// Duplicate timestamps within one series keep the last value.
pub fn align_series(
    metric_name: impl Into<String>,
    raw: Vec<(BTreeMap<String, String>, Vec<(i64, f64)>)>,
) -> TimeseriesResult {
    let timeline = raw
        .iter()
        .flat_map(|(_, points)| points.iter().map(|(timestamp, _)| *timestamp))
        .collect::<BTreeSet<_>>();

    let series = raw
        .into_iter()
        .map(|(labels, points)| {
            let by_timestamp = points.into_iter().collect::<BTreeMap<_, _>>();
            LabeledSeries {
                labels,
                datapoints: timeline
                    .iter()
                    .map(|timestamp| {
                        Datapoint::new(
                            *timestamp,
                            by_timestamp.get(timestamp).copied().unwrap_or(0.0),
                        )
                    })
                    .collect(),
            }
        })
        .collect();

    TimeseriesResult {
        metric_name: metric_name.into(),
        series,
    }
}
