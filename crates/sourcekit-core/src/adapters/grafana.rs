use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{base_url, fetch_cancellable, send_json, with_offsets};
use crate::client::{ClientFuture, FetchRequest, ProviderClient};
use crate::config::DispatchConfig;
use crate::connector::Connector;
use crate::domain::{
    ParamSchema, ParamSpec, ParamType, ResultKind, ResultPayload, TimeRange, TimeseriesResult,
};
use crate::http_client::{HttpAuth, HttpClient, HttpRequest};
use crate::inventory::ModelType;
use crate::normalize::{align_series, stringify, to_table};
use crate::registry::{executor, RegistryBuilder, TaskDefinition, TaskInvocation, TaskType};
use crate::{DispatchError, ProviderId, TaskFailure};

pub const DATASOURCE_MODEL: ModelType = ModelType::new("grafana_datasource");

pub const PROMETHEUS_QUERY: TaskType = TaskType::new("prometheus_query");
pub const LIST_DATASOURCES: TaskType = TaskType::new("list_datasources");

const OP_DATASOURCES: &str = "datasources";
const OP_QUERY_RANGE: &str = "query_range";

/// Target number of points per Grafana series.
pub const MAX_DATA_POINTS: i64 = 70;
pub const MIN_STEP_SECONDS: i64 = 60;

/// `(span_cutoff, minimum_step)` in seconds, descending.
const STEP_FLOORS: [(i64, i64); 7] = [
    (2_592_001, 43_200),
    (604_801, 21_600),
    (86_401, 10_800),
    (43_201, 3_600),
    (21_601, 1_800),
    (3_601, 120),
    (1_801, 60),
];

const STANDARD_STEPS: [i64; 12] = [
    30, 60, 120, 300, 600, 900, 1_800, 3_600, 10_800, 21_600, 43_200, 86_400,
];

/// Query step for Grafana, layered over the shared interval table.
///
/// Aims at no more than [`MAX_DATA_POINTS`] points, never goes below the floor
/// for the span, and rounds up to the next standard step (capped at one day).
pub fn step_seconds(span_seconds: i64) -> i64 {
    if span_seconds <= 0 {
        return MIN_STEP_SECONDS;
    }

    let ideal = span_seconds / MAX_DATA_POINTS + i64::from(span_seconds % MAX_DATA_POINTS != 0);
    let floor = STEP_FLOORS
        .iter()
        .find(|(cutoff, _)| span_seconds >= *cutoff)
        .map_or(MIN_STEP_SECONDS, |(_, floor)| *floor);
    let step = MIN_STEP_SECONDS.max(ideal).max(floor);

    STANDARD_STEPS
        .iter()
        .copied()
        .find(|standard| step <= *standard)
        .unwrap_or(STANDARD_STEPS[STANDARD_STEPS.len() - 1])
}

/// Grafana HTTP API client authenticated with a service-account token.
#[derive(Clone)]
pub struct GrafanaClient {
    http: Arc<dyn HttpClient>,
    base_url: String,
    auth: HttpAuth,
    timeout: Duration,
}

impl GrafanaClient {
    pub fn new(http: Arc<dyn HttpClient>, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            auth: HttpAuth::BearerToken(api_key.into()),
            timeout: DispatchConfig::default().http_timeout,
        }
    }

    pub fn from_connector(
        connector: &Connector,
        config: &DispatchConfig,
        http: Arc<dyn HttpClient>,
    ) -> Result<Self, TaskFailure> {
        let credentials = &connector.credentials;
        Ok(Self {
            http,
            base_url: base_url(credentials, "host")?,
            auth: HttpAuth::BearerToken(credentials.require("api_key")?.to_owned()),
            timeout: config.http_timeout,
        })
    }

    async fn get(&self, request: HttpRequest) -> Result<Value, TaskFailure> {
        send_json(
            self.http.as_ref(),
            request.with_auth(&self.auth).with_timeout(self.timeout),
        )
        .await
    }

    async fn datasources(&self) -> Result<Value, TaskFailure> {
        self.get(HttpRequest::get(format!("{}/api/datasources", self.base_url)))
            .await
    }

    async fn query_range(&self, request: &FetchRequest) -> Result<Value, TaskFailure> {
        let uid = request.require_str("datasource_uid")?;
        let query = request.require_str("query")?;
        let bound = |name: &str| request.arg_i64(name).unwrap_or_default().to_string();

        let url = format!(
            "{}/api/datasources/proxy/uid/{}/api/v1/query_range",
            self.base_url,
            urlencoding::encode(uid)
        );
        self.get(HttpRequest::get(url).with_query([
            ("query", query.to_owned()),
            ("start", bound("start")),
            ("end", bound("end")),
            ("step", bound("step")),
        ]))
        .await
    }
}

impl ProviderClient for GrafanaClient {
    fn provider(&self) -> ProviderId {
        ProviderId::Grafana
    }

    fn test_connection(&self) -> ClientFuture<'_, bool> {
        Box::pin(async move {
            self.datasources().await?;
            Ok(true)
        })
    }

    fn fetch(&self, request: FetchRequest) -> ClientFuture<'_, Value> {
        Box::pin(async move {
            match request.operation {
                OP_DATASOURCES => self.datasources().await,
                OP_QUERY_RANGE => self.query_range(&request).await,
                other => Err(TaskFailure::unexpected(format!(
                    "grafana does not support operation '{other}'"
                ))),
            }
        })
    }

    fn extract_inventory<'a>(
        &'a self,
        model_type: &'a ModelType,
    ) -> ClientFuture<'a, BTreeMap<String, Value>> {
        Box::pin(async move {
            if *model_type != DATASOURCE_MODEL {
                return Ok(BTreeMap::new());
            }
            let datasources = self.datasources().await?;
            Ok(datasources
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(|source| {
                    let uid = source.get("uid")?.as_str()?;
                    Some((uid.to_owned(), source.clone()))
                })
                .collect())
        })
    }
}

pub fn register(builder: &mut RegistryBuilder) -> Result<(), DispatchError> {
    builder
        .register(
            TaskDefinition::new(
                ProviderId::Grafana,
                PROMETHEUS_QUERY,
                ResultKind::Timeseries,
                executor(prometheus_query),
            )
            .with_display_name("Query a Prometheus datasource through Grafana")
            .with_inventory([DATASOURCE_MODEL])
            .with_params(ParamSchema::new(vec![
                ParamSpec::required("datasource_uid", ParamType::String),
                ParamSpec::required("promql", ParamType::String),
                ParamSpec::optional("interval", ParamType::Long),
            ])),
        )?
        .register(
            TaskDefinition::new(
                ProviderId::Grafana,
                LIST_DATASOURCES,
                ResultKind::Table,
                executor(list_datasources),
            )
            .with_display_name("List datasources")
            .with_inventory([DATASOURCE_MODEL]),
        )?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct PrometheusQueryParams {
    datasource_uid: String,
    promql: String,
    #[serde(default)]
    interval: Option<i64>,
}

fn sample(point: &Value) -> Option<(i64, f64)> {
    let pair = point.as_array()?;
    let seconds = pair.first()?.as_f64()?;
    let value = match pair.get(1)? {
        Value::String(text) => text.parse::<f64>().ok()?,
        other => other.as_f64()?,
    };
    let value = if value.is_finite() { value } else { 0.0 };
    Some(((seconds * 1000.0) as i64, value))
}

async fn query_window(
    invocation: &TaskInvocation,
    params: &PrometheusQueryParams,
    step: i64,
    range: TimeRange,
) -> Result<TimeseriesResult, TaskFailure> {
    let raw = fetch_cancellable(
        invocation,
        FetchRequest::new(
            OP_QUERY_RANGE,
            json!({
                "datasource_uid": params.datasource_uid,
                "query": params.promql,
                "start": range.geq(),
                "end": range.lt(),
                "step": step,
            }),
        ),
    )
    .await?;

    let results = raw
        .pointer("/data/result")
        .and_then(Value::as_array)
        .ok_or_else(|| TaskFailure::unexpected("prometheus response has no data.result"))?;
    if results.is_empty() {
        return Err(TaskFailure::no_data(format!(
            "no data returned from grafana for query: {}",
            params.promql
        )));
    }

    let series = results
        .iter()
        .map(|result| {
            let labels = result
                .get("metric")
                .and_then(Value::as_object)
                .map(|metric| {
                    metric
                        .iter()
                        .map(|(name, value)| (name.clone(), stringify(value)))
                        .collect::<BTreeMap<_, _>>()
                })
                .unwrap_or_default();
            let points = result
                .get("values")
                .and_then(Value::as_array)
                .map(|values| values.iter().filter_map(sample).collect::<Vec<_>>())
                .unwrap_or_default();
            (labels, points)
        })
        .collect();

    Ok(align_series(params.promql.clone(), series))
}

async fn prometheus_query(invocation: TaskInvocation) -> Result<ResultPayload, TaskFailure> {
    let params = invocation.params.decode::<PrometheusQueryParams>()?;
    let step = params
        .interval
        .filter(|interval| *interval > 0)
        .unwrap_or_else(|| step_seconds(invocation.time_range.span_seconds()));
    debug!(step, offsets = ?invocation.offsets, "prometheus query step");

    let (invocation, params) = (&invocation, &params);
    let series =
        with_offsets(invocation, move |range| query_window(invocation, params, step, range)).await?;
    Ok(ResultPayload::Timeseries(series))
}

async fn list_datasources(invocation: TaskInvocation) -> Result<ResultPayload, TaskFailure> {
    let raw = fetch_cancellable(&invocation, FetchRequest::new(OP_DATASOURCES, Value::Null)).await?;
    let datasources = raw
        .as_array()
        .ok_or_else(|| TaskFailure::unexpected("/api/datasources did not return an array"))?;
    if datasources.is_empty() {
        return Err(TaskFailure::no_data("no datasources configured in grafana"));
    }
    Ok(ResultPayload::Table(to_table(datasources, "GET /api/datasources")?))
}
