use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::warn;

use super::{base_url, fetch_cancellable, send_json, with_offsets};
use crate::client::{ClientFuture, FetchRequest, ProviderClient};
use crate::config::DispatchConfig;
use crate::connector::Connector;
use crate::domain::{
    ParamSchema, ParamSpec, ParamType, ResultKind, ResultPayload, TimeRange, TimeseriesResult,
};
use crate::http_client::{HttpAuth, HttpClient, HttpRequest};
use crate::interval::{bucket_width, estimated_buckets, MAX_RECOMMENDED_BUCKETS};
use crate::inventory::ModelType;
use crate::normalize::{to_table, to_table_with_total, to_timeseries};
use crate::registry::{executor, RegistryBuilder, TaskDefinition, TaskInvocation, TaskType};
use crate::{DispatchError, ProviderId, TaskFailure};

pub const INDEX_MODEL: ModelType = ModelType::new("elasticsearch_index");

pub const QUERY_LOGS: TaskType = TaskType::new("query_logs");
pub const LIST_INDICES: TaskType = TaskType::new("list_indices");
pub const SEARCH_RATE: TaskType = TaskType::new("search_rate");

const OP_SEARCH: &str = "search";
const OP_CAT_INDICES: &str = "cat_indices";

/// Elasticsearch REST client.
#[derive(Clone)]
pub struct ElasticsearchClient {
    http: Arc<dyn HttpClient>,
    base_url: String,
    auth: HttpAuth,
    timeout: Duration,
}

impl ElasticsearchClient {
    pub fn new(http: Arc<dyn HttpClient>, base_url: impl Into<String>, auth: HttpAuth) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            auth,
            timeout: DispatchConfig::default().http_timeout,
        }
    }

    /// Reads `host` plus optional `protocol`, `port` and an `api_key_id`/`api_key` pair.
    pub fn from_connector(
        connector: &Connector,
        config: &DispatchConfig,
        http: Arc<dyn HttpClient>,
    ) -> Result<Self, TaskFailure> {
        let credentials = &connector.credentials;
        let auth = match (credentials.get("api_key_id"), credentials.get("api_key")) {
            (Some(id), Some(key)) => HttpAuth::Header {
                name: String::from("authorization"),
                value: format!("ApiKey {}", STANDARD.encode(format!("{id}:{key}"))),
            },
            (None, Some(key)) => HttpAuth::Header {
                name: String::from("authorization"),
                value: format!("ApiKey {key}"),
            },
            _ => HttpAuth::None,
        };

        Ok(Self {
            http,
            base_url: base_url(credentials, "host")?,
            auth,
            timeout: config.http_timeout,
        })
    }

    fn request(&self, request: HttpRequest) -> HttpRequest {
        request.with_auth(&self.auth).with_timeout(self.timeout)
    }

    async fn search(&self, index: &str, body: &Value) -> Result<Value, TaskFailure> {
        let url = format!("{}/{}/_search", self.base_url, urlencoding::encode(index));
        send_json(
            self.http.as_ref(),
            self.request(HttpRequest::post(url).with_json_body(body)),
        )
        .await
    }

    async fn cat_indices(&self) -> Result<Value, TaskFailure> {
        let url = format!("{}/_cat/indices", self.base_url);
        send_json(
            self.http.as_ref(),
            self.request(HttpRequest::get(url).with_query([("format", "json")])),
        )
        .await
    }
}

impl ProviderClient for ElasticsearchClient {
    fn provider(&self) -> ProviderId {
        ProviderId::Elasticsearch
    }

    fn test_connection(&self) -> ClientFuture<'_, bool> {
        Box::pin(async move {
            let url = format!("{}/_alias", self.base_url);
            let aliases = send_json(self.http.as_ref(), self.request(HttpRequest::get(url))).await?;
            match aliases.as_object() {
                Some(indices) if !indices.is_empty() => Ok(true),
                _ => Err(TaskFailure::no_data("no indices found in elasticsearch")),
            }
        })
    }

    fn fetch(&self, request: FetchRequest) -> ClientFuture<'_, Value> {
        Box::pin(async move {
            match request.operation {
                OP_SEARCH => {
                    let index = request.require_str("index")?;
                    let body = request.args.get("body").cloned().unwrap_or_else(|| json!({}));
                    self.search(index, &body).await
                }
                OP_CAT_INDICES => self.cat_indices().await,
                other => Err(TaskFailure::unexpected(format!(
                    "elasticsearch does not support operation '{other}'"
                ))),
            }
        })
    }

    fn extract_inventory<'a>(
        &'a self,
        model_type: &'a ModelType,
    ) -> ClientFuture<'a, BTreeMap<String, Value>> {
        Box::pin(async move {
            if *model_type != INDEX_MODEL {
                return Ok(BTreeMap::new());
            }
            let indices = self.cat_indices().await?;
            Ok(indices
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(|entry| {
                    let name = entry.get("index")?.as_str()?;
                    Some((name.to_owned(), entry.clone()))
                })
                .collect())
        })
    }
}

pub fn register(builder: &mut RegistryBuilder) -> Result<(), DispatchError> {
    builder
        .register(
            TaskDefinition::new(
                ProviderId::Elasticsearch,
                QUERY_LOGS,
                ResultKind::Logs,
                executor(query_logs),
            )
            .with_display_name("Query logs with a Lucene query")
            .with_inventory([INDEX_MODEL])
            .with_params(ParamSchema::new(vec![
                ParamSpec::required("index", ParamType::String),
                ParamSpec::required("lucene_query", ParamType::String),
                ParamSpec::optional("limit", ParamType::Long).with_default(2000),
                ParamSpec::optional("offset", ParamType::Long).with_default(0),
                ParamSpec::optional("timestamp_field", ParamType::String),
                ParamSpec::optional("sort_desc", ParamType::String),
            ])),
        )?
        .register(
            TaskDefinition::new(
                ProviderId::Elasticsearch,
                LIST_INDICES,
                ResultKind::Table,
                executor(list_indices),
            )
            .with_display_name("List indices")
            .with_inventory([INDEX_MODEL]),
        )?
        .register(
            TaskDefinition::new(
                ProviderId::Elasticsearch,
                SEARCH_RATE,
                ResultKind::Timeseries,
                executor(search_rate),
            )
            .with_display_name("Document rate over time")
            .with_inventory([INDEX_MODEL])
            .with_params(ParamSchema::new(vec![
                ParamSpec::required("index", ParamType::String),
                ParamSpec::optional("lucene_query", ParamType::String).with_default("*"),
                ParamSpec::optional("timestamp_field", ParamType::String)
                    .with_default("@timestamp"),
            ])),
        )?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct QueryLogsParams {
    index: String,
    lucene_query: String,
    limit: i64,
    offset: i64,
    #[serde(default)]
    timestamp_field: Option<String>,
    #[serde(default)]
    sort_desc: Option<String>,
}

fn log_query_body(params: &QueryLogsParams, time_range: TimeRange) -> Value {
    let lucene = params.lucene_query.trim();
    let timestamp_field = params.timestamp_field.as_deref().filter(|f| !f.is_empty());

    let mut sort = Vec::new();
    if let Some(field) = timestamp_field {
        sort.push(json!({ field: "desc" }));
    }
    if let Some(field) = params.sort_desc.as_deref().filter(|f| !f.is_empty()) {
        sort.push(json!({ field: "desc" }));
    }
    sort.push(json!({ "_score": "desc" }));

    let query = match timestamp_field {
        Some(field) => json!({
            "bool": {
                "must": [
                    { "query_string": { "query": lucene } },
                    { "range": { field: {
                        "gte": time_range.geq_millis(),
                        "lt": time_range.lt_millis(),
                    } } }
                ]
            }
        }),
        None => json!({ "query_string": { "query": lucene } }),
    };

    json!({
        "query": query,
        "size": params.limit,
        "from": params.offset,
        "sort": sort,
    })
}

/// Hit metadata plus `_source` fields lifted to the top level.
fn hit_row(hit: &Value) -> Value {
    let mut row = Map::new();
    if let Some(fields) = hit.as_object() {
        for (key, value) in fields {
            match (key.as_str(), value) {
                ("_source", Value::Object(source)) => {
                    row.extend(source.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
                _ => {
                    row.insert(key.clone(), value.clone());
                }
            }
        }
    }
    Value::Object(row)
}

async fn query_logs(invocation: TaskInvocation) -> Result<ResultPayload, TaskFailure> {
    let params = invocation.params.decode::<QueryLogsParams>()?;
    let body = log_query_body(&params, invocation.time_range);
    let lucene = params.lucene_query.trim();

    let raw = fetch_cancellable(
        &invocation,
        FetchRequest::new(OP_SEARCH, json!({ "index": params.index, "body": body })),
    )
    .await?;

    let hits = raw
        .pointer("/hits/hits")
        .and_then(Value::as_array)
        .filter(|hits| !hits.is_empty())
        .ok_or_else(|| TaskFailure::no_data(format!("no data found for the query: {lucene}")))?;

    let rows = hits.iter().map(hit_row).collect::<Vec<_>>();
    let total = u64::try_from(rows.len()).unwrap_or(u64::MAX);
    let table = to_table_with_total(
        &rows,
        format!("Execute `{lucene}` on index {}", params.index),
        total,
    )?;
    Ok(ResultPayload::Logs(table))
}

async fn list_indices(invocation: TaskInvocation) -> Result<ResultPayload, TaskFailure> {
    let raw = fetch_cancellable(&invocation, FetchRequest::new(OP_CAT_INDICES, Value::Null)).await?;
    let indices = raw
        .as_array()
        .ok_or_else(|| TaskFailure::unexpected("_cat/indices did not return an array"))?;
    if indices.is_empty() {
        return Err(TaskFailure::no_data("no indices found in elasticsearch"));
    }
    Ok(ResultPayload::Table(to_table(indices, "GET /_cat/indices")?))
}

#[derive(Debug, Deserialize)]
struct SearchRateParams {
    index: String,
    lucene_query: String,
    timestamp_field: String,
}

fn rate_body(params: &SearchRateParams, range: TimeRange) -> Value {
    json!({
        "size": 0,
        "query": { "bool": { "must": [
            { "query_string": { "query": params.lucene_query } },
            { "range": { params.timestamp_field.as_str(): {
                "gte": range.geq_millis(),
                "lt": range.lt_millis(),
            } } }
        ] } },
        "aggs": { "rate": { "date_histogram": {
            "field": params.timestamp_field,
            "fixed_interval": bucket_width(range.span_seconds()),
            "min_doc_count": 0,
            "extended_bounds": {
                "min": range.geq_millis(),
                "max": range.lt_millis().saturating_sub(1),
            },
        } } },
    })
}

async fn rate_window(
    invocation: &TaskInvocation,
    params: &SearchRateParams,
    range: TimeRange,
) -> Result<TimeseriesResult, TaskFailure> {
    let raw = fetch_cancellable(
        invocation,
        FetchRequest::new(
            OP_SEARCH,
            json!({ "index": params.index, "body": rate_body(params, range) }),
        ),
    )
    .await?;
    let buckets = raw
        .pointer("/aggregations/rate/buckets")
        .and_then(Value::as_array)
        .ok_or_else(|| TaskFailure::unexpected("response has no rate aggregation"))?;

    to_timeseries(buckets, "search_rate", &["doc_count"], |_| {
        BTreeMap::from([(String::from("index"), params.index.clone())])
    })
}

async fn search_rate(invocation: TaskInvocation) -> Result<ResultPayload, TaskFailure> {
    let params = invocation.params.decode::<SearchRateParams>()?;
    let span = invocation.time_range.span_seconds();

    let buckets = estimated_buckets(span);
    if buckets > MAX_RECOMMENDED_BUCKETS {
        warn!(span, buckets, "search_rate query exceeds recommended bucket count");
    }

    let (invocation, params) = (&invocation, &params);
    let series = with_offsets(invocation, move |range| rate_window(invocation, params, range)).await?;
    Ok(ResultPayload::Timeseries(series))
}
