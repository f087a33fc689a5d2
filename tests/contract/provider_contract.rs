//! Contract tests for the bundled provider adapters.
//!
//! Every adapter is exercised through the dispatcher over a canned transport,
//! so these tests pin both the wire requests and the canonical results.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use sourcekit_core::adapters;
use sourcekit_core::{
    CannedHttpClient, Connector, Credentials, DispatchConfig, DispatchRequest, Dispatcher,
    ErrorKind, HttpClient, HttpMethod, HttpResponse, LoggingMetadataSink, ModelType, ProviderId,
    ResultKind, TaskRegistry, TaskType, TimeRange,
};

const ES_HITS: &str = r#"{"hits":{"total":{"value":2},"hits":[
    {"_index":"logs-1","_id":"a","_source":{"message":"boom","level":"error"}},
    {"_index":"logs-1","_id":"b","_source":{"message":"bang","level":"error"}}
]}}"#;

const ES_RATE: &str = r#"{"aggregations":{"rate":{"buckets":[
    {"key":1700000120000,"doc_count":0},
    {"key":1700000000000,"doc_count":4}
]}}}"#;

const ES_INDICES: &str = r#"[
    {"index":"logs-1","health":"green","docs.count":"10"},
    {"index":"logs-2","health":"yellow","docs.count":"3"}
]"#;

const GRAFANA_MATRIX: &str = r#"{"status":"success","data":{"resultType":"matrix","result":[
    {"metric":{"instance":"a"},"values":[[1700000000,"1"],[1700000060,"2"]]},
    {"metric":{"instance":"b"},"values":[[1700000060,"3"]]}
]}}"#;

const GRAFANA_DATASOURCES: &str = r#"[
    {"uid":"prom","name":"Prometheus","type":"prometheus","jsonData":{"httpMethod":"POST"}}
]"#;

const JENKINS_BUILD: &str = r#"{"number":42,"result":"SUCCESS","building":false,
    "timestamp":1700000000000,"duration":5300,"url":"https://ci.test/job/deploy/42/",
    "actions":[]}"#;

fn canned() -> Arc<CannedHttpClient> {
    Arc::new(
        CannedHttpClient::new()
            .route("/denied/_search", HttpResponse::with_status(401, "unauthorized"))
            .route("/bad/_search", HttpResponse::with_status(400, "parse_exception"))
            .route("/metrics/_search", HttpResponse::ok_json(ES_RATE))
            .route("/_search", HttpResponse::ok_json(ES_HITS))
            .route("/_cat/indices", HttpResponse::ok_json(ES_INDICES))
            .route("/_alias", HttpResponse::ok_json("{}"))
            .route("/api/v1/query_range", HttpResponse::ok_json(GRAFANA_MATRIX))
            .route("/api/datasources", HttpResponse::ok_json(GRAFANA_DATASOURCES))
            .route("/job/deploy/build", HttpResponse::with_status(201, ""))
            .route("/job/deploy/lastBuild", HttpResponse::ok_json(JENKINS_BUILD))
            .route("/job/fresh/lastBuild", HttpResponse::with_status(404, "Not Found"))
            .route("/job/idle/lastBuild", HttpResponse::ok_json("null")),
    )
}

fn dispatcher(http: &Arc<CannedHttpClient>) -> Dispatcher {
    let mut builder = TaskRegistry::builder();
    adapters::register_all(&mut builder).expect("bundled tasks register");
    let shared: Arc<dyn HttpClient> = http.clone();
    Dispatcher::new(
        Arc::new(builder.build()),
        adapters::connector_factory(Some(shared)),
        DispatchConfig::default(),
    )
}

fn elasticsearch() -> Connector {
    Connector::new(
        ProviderId::Elasticsearch,
        Credentials::new().with("host", "http://es.test:9200"),
    )
}

fn grafana() -> Connector {
    Connector::new(
        ProviderId::Grafana,
        Credentials::new()
            .with("host", "grafana.test")
            .with("api_key", "glsa_token"),
    )
}

fn jenkins() -> Connector {
    Connector::new(
        ProviderId::Jenkins,
        Credentials::new()
            .with("url", "https://ci.test/")
            .with("username", "ops")
            .with("api_token", "secret"),
    )
}

fn hour() -> TimeRange {
    TimeRange::new(1_700_000_000, 1_700_003_600).expect("valid range")
}

fn request(provider: ProviderId, task: &'static str) -> DispatchRequest {
    DispatchRequest::new(provider, TaskType::new(task), hour())
}

// =============================================================================
// Registry Contract
// =============================================================================

#[test]
fn every_bundled_task_declares_its_contract() {
    let mut builder = TaskRegistry::builder();
    adapters::register_all(&mut builder).expect("bundled tasks register");
    let registry = builder.build();

    assert_eq!(registry.len(), 7);
    for definition in registry.definitions() {
        assert!(!definition.display_name.is_empty(), "{:?}", definition.key());
        assert!(
            !definition.required_inventory_types.is_empty(),
            "{:?}",
            definition.key()
        );
    }
    assert_eq!(
        registry
            .resolve(ProviderId::Elasticsearch, &TaskType::new("query_logs"))
            .expect("registered")
            .result_kind,
        ResultKind::Logs
    );
}

// =============================================================================
// Elasticsearch
// =============================================================================

#[tokio::test]
async fn elasticsearch_query_logs_returns_hits_as_log_rows() {
    // Given: An index with two matching documents
    let http = canned();
    let dispatcher = dispatcher(&http);

    // When: query_logs runs with a timestamp field
    let result = dispatcher
        .dispatch(
            request(ProviderId::Elasticsearch, "query_logs")
                .with_param("index", "logs-*")
                .with_param("lucene_query", "level:error")
                .with_param("timestamp_field", "@timestamp"),
            &elasticsearch(),
        )
        .await
        .expect("query succeeds");

    // Then: Hits become LOGS rows with `_source` lifted to the top level
    assert_eq!(result.kind(), ResultKind::Logs);
    let table = result.as_table().expect("logs table");
    assert_eq!(table.columns(), vec!["_index", "_id", "message", "level"]);
    assert_eq!(table.rows[1].get("message"), Some("bang"));
    assert_eq!(table.raw_query, "Execute `level:error` on index logs-*");

    // And: The search body carries the defaults and the time filter
    let sent = http.requests();
    let search = sent
        .iter()
        .find(|request| request.url.ends_with("/_search"))
        .expect("search request sent");
    assert_eq!(search.method, HttpMethod::Post);
    let body: Value = serde_json::from_str(search.body.as_deref().unwrap_or("{}")).expect("json body");
    assert_eq!(body["size"], 2000);
    assert_eq!(body["from"], 0);
    assert_eq!(
        body["query"]["bool"]["must"][1]["range"]["@timestamp"]["lt"],
        1_700_003_600_000_i64
    );
}

#[tokio::test]
async fn elasticsearch_search_rate_uses_the_shared_bucket_width() {
    let http = canned();
    let dispatcher = dispatcher(&http);

    let result = dispatcher
        .dispatch(
            request(ProviderId::Elasticsearch, "search_rate").with_param("index", "metrics"),
            &elasticsearch(),
        )
        .await
        .expect("rate query succeeds");

    let series = result.as_timeseries().expect("timeseries");
    assert_eq!(series.series.len(), 1);
    let points = &series.series[0].datapoints;
    assert_eq!(points[0].timestamp_ms, 1_700_000_000_000);
    assert_eq!(points[0].value, 4.0);
    assert_eq!(points[1].value, 0.0);

    let sent = http.requests();
    let body: Value = sent
        .iter()
        .find(|request| request.url.contains("/metrics/_search"))
        .and_then(|request| request.body.as_deref())
        .map(|body| serde_json::from_str(body).expect("json body"))
        .expect("rate request sent");
    assert_eq!(body["aggs"]["rate"]["date_histogram"]["fixed_interval"], "2m");
}

#[tokio::test]
async fn elasticsearch_list_indices_returns_a_table() {
    let http = canned();
    let dispatcher = dispatcher(&http);

    let result = dispatcher
        .dispatch(request(ProviderId::Elasticsearch, "list_indices"), &elasticsearch())
        .await
        .expect("listing succeeds");

    let table = result.as_table().expect("table");
    assert_eq!(result.kind(), ResultKind::Table);
    assert_eq!(table.columns(), vec!["index", "health", "docs.count"]);
    assert_eq!(table.rows.len(), 2);
}

#[tokio::test]
async fn elasticsearch_status_codes_map_to_error_kinds() {
    let http = canned();
    let dispatcher = dispatcher(&http);
    let search = |index: &'static str| {
        request(ProviderId::Elasticsearch, "query_logs")
            .with_param("index", index)
            .with_param("lucene_query", "*")
    };

    let denied = dispatcher
        .dispatch(search("denied"), &elasticsearch())
        .await
        .expect_err("401");
    assert_eq!(denied.kind(), ErrorKind::Connection);

    let rejected = dispatcher
        .dispatch(search("bad"), &elasticsearch())
        .await
        .expect_err("400");
    assert_eq!(rejected.kind(), ErrorKind::Provider);
    assert!(rejected.message().contains("parse_exception"), "{rejected}");
}

#[tokio::test]
async fn elasticsearch_connection_test_requires_at_least_one_index() {
    let http = canned();
    let dispatcher = dispatcher(&http);

    let err = dispatcher
        .test_connection(&elasticsearch())
        .await
        .expect_err("no aliases");

    assert_eq!(err.kind(), ErrorKind::NoData);
}

#[tokio::test]
async fn elasticsearch_inventory_lists_indices() {
    let http = canned();
    let dispatcher = dispatcher(&http);

    let report = dispatcher
        .sync_inventory(&elasticsearch(), &LoggingMetadataSink)
        .await
        .expect("sync runs");

    assert_eq!(
        report.extracted,
        BTreeMap::from([(ModelType::new("elasticsearch_index"), 2)])
    );
}

// =============================================================================
// Grafana
// =============================================================================

#[tokio::test]
async fn grafana_prometheus_query_aligns_series_and_sends_the_step() {
    let http = canned();
    let dispatcher = dispatcher(&http);

    let result = dispatcher
        .dispatch(
            request(ProviderId::Grafana, "prometheus_query")
                .with_param("datasource_uid", "prom")
                .with_param("promql", "up"),
            &grafana(),
        )
        .await
        .expect("query succeeds");

    let series = result.as_timeseries().expect("timeseries");
    assert_eq!(series.metric_name, "up");
    assert_eq!(series.series.len(), 2);
    let missing = &series.series[1];
    assert_eq!(missing.labels.get("instance").map(String::as_str), Some("b"));
    assert_eq!(missing.datapoints.len(), 2);
    assert_eq!(missing.datapoints[0].value, 0.0);
    assert_eq!(missing.datapoints[1].value, 3.0);

    let sent = http.requests();
    let query = sent
        .iter()
        .find(|request| request.url.contains("query_range"))
        .expect("query sent");
    assert!(query.url.starts_with("https://grafana.test/"), "{}", query.url);
    assert!(query.url.ends_with("&step=60"), "{}", query.url);
}

#[tokio::test]
async fn grafana_list_datasources_flattens_json_data() {
    let http = canned();
    let dispatcher = dispatcher(&http);

    let result = dispatcher
        .dispatch(request(ProviderId::Grafana, "list_datasources"), &grafana())
        .await
        .expect("listing succeeds");

    let table = result.as_table().expect("table");
    assert_eq!(
        table.columns(),
        vec!["uid", "name", "type", "jsonData.httpMethod"]
    );
}

// =============================================================================
// Jenkins
// =============================================================================

#[tokio::test]
async fn jenkins_run_job_triggers_a_build_with_basic_auth() {
    let http = canned();
    let dispatcher = dispatcher(&http);

    let result = dispatcher
        .dispatch(
            request(ProviderId::Jenkins, "run_job").with_param("job_name", "deploy"),
            &jenkins(),
        )
        .await
        .expect("trigger succeeds");

    assert_eq!(
        result.as_text().expect("text").output,
        "Job deploy triggered successfully"
    );
    let sent = http.requests();
    assert_eq!(sent[0].url, "https://ci.test/job/deploy/build?delay=0sec");
    assert_eq!(
        sent[0].headers.get("authorization").map(String::as_str),
        Some("Basic b3BzOnNlY3JldA==")
    );
}

#[tokio::test]
async fn jenkins_last_build_returns_selected_fields() {
    let http = canned();
    let dispatcher = dispatcher(&http);

    let result = dispatcher
        .dispatch(
            request(ProviderId::Jenkins, "last_build").with_param("job_name", "deploy"),
            &jenkins(),
        )
        .await
        .expect("lookup succeeds");

    let table = result.as_table().expect("table");
    assert_eq!(
        table.columns(),
        vec!["number", "result", "building", "timestamp", "duration", "url"]
    );
    assert_eq!(table.rows[0].get("result"), Some("SUCCESS"));
    assert_eq!(table.rows[0].get("building"), Some("false"));
}

#[tokio::test]
async fn jenkins_job_without_builds_is_no_data() {
    let http = canned();
    let dispatcher = dispatcher(&http);

    // Given: Jenkins answers 404 for lastBuild of a job that never ran
    let err = dispatcher
        .dispatch(
            request(ProviderId::Jenkins, "last_build").with_param("job_name", "fresh"),
            &jenkins(),
        )
        .await
        .expect_err("no builds yet");

    // Then: The caller sees NoData, not a provider failure
    assert_eq!(err.kind(), ErrorKind::NoData);
    assert!(err.message().contains("job fresh has no builds"), "{err}");
}

#[tokio::test]
async fn jenkins_empty_last_build_body_is_no_data() {
    let http = canned();
    let dispatcher = dispatcher(&http);

    let err = dispatcher
        .dispatch(
            request(ProviderId::Jenkins, "last_build").with_param("job_name", "idle"),
            &jenkins(),
        )
        .await
        .expect_err("null body");

    assert_eq!(err.kind(), ErrorKind::NoData);
}

#[tokio::test]
async fn jenkins_other_failures_on_last_build_stay_provider_errors() {
    let http = Arc::new(CannedHttpClient::new().route(
        "/lastBuild",
        HttpResponse::with_status(400, "bad request"),
    ));
    let dispatcher = dispatcher(&http);

    let err = dispatcher
        .dispatch(
            request(ProviderId::Jenkins, "last_build").with_param("job_name", "deploy"),
            &jenkins(),
        )
        .await
        .expect_err("400");

    assert_eq!(err.kind(), ErrorKind::Provider);
}

#[tokio::test]
async fn jenkins_connector_without_api_token_is_rejected() {
    let http = canned();
    let dispatcher = dispatcher(&http);
    let connector = Connector::new(
        ProviderId::Jenkins,
        Credentials::new()
            .with("url", "https://ci.test")
            .with("username", "ops"),
    );

    let err = dispatcher
        .test_connection(&connector)
        .await
        .expect_err("incomplete credentials");

    assert_eq!(err.kind(), ErrorKind::Credential);
    assert!(err.message().contains("api_token"), "{err}");
    assert!(http.requests().is_empty());
}

// =============================================================================
// Timeseries Offsets
// =============================================================================

fn offset_label(series: &sourcekit_core::LabeledSeries) -> &str {
    series
        .labels
        .get("offset_seconds")
        .map(String::as_str)
        .unwrap_or("")
}

#[tokio::test]
async fn grafana_offsets_add_shifted_series() {
    let http = canned();
    let dispatcher = dispatcher(&http);

    // Given: A Prometheus query compared with the same hour one day earlier
    let result = dispatcher
        .dispatch(
            request(ProviderId::Grafana, "prometheus_query")
                .with_param("datasource_uid", "prom")
                .with_param("promql", "up")
                .with_offsets([86_400]),
            &grafana(),
        )
        .await
        .expect("query succeeds");

    // Then: The base series come first, followed by the shifted ones
    let series = result.as_timeseries().expect("timeseries");
    let labels = series.series.iter().map(offset_label).collect::<Vec<_>>();
    assert_eq!(labels, vec!["0", "0", "86400", "86400"]);
    assert_eq!(
        series.series[2].labels.get("instance").map(String::as_str),
        Some("a")
    );

    // And: The second query covers the shifted window with the same step
    let queries = http
        .requests()
        .into_iter()
        .filter(|request| request.url.contains("query_range"))
        .map(|request| request.url)
        .collect::<Vec<_>>();
    assert_eq!(queries.len(), 2);
    assert!(queries[0].contains("start=1700000000&end=1700003600"), "{}", queries[0]);
    assert!(queries[1].contains("start=1699913600&end=1699917200"), "{}", queries[1]);
    assert!(queries[1].ends_with("&step=60"), "{}", queries[1]);
}

#[tokio::test]
async fn elasticsearch_offsets_requery_the_shifted_window() {
    let http = canned();
    let dispatcher = dispatcher(&http);

    let result = dispatcher
        .dispatch(
            request(ProviderId::Elasticsearch, "search_rate")
                .with_param("index", "metrics")
                .with_offsets([3_600]),
            &elasticsearch(),
        )
        .await
        .expect("rate query succeeds");

    let series = result.as_timeseries().expect("timeseries");
    let labels = series.series.iter().map(offset_label).collect::<Vec<_>>();
    assert_eq!(labels, vec!["0", "3600"]);
    assert_eq!(series.series[1].labels.get("index").map(String::as_str), Some("metrics"));

    let bodies = http
        .requests()
        .into_iter()
        .filter(|request| request.url.contains("/metrics/_search"))
        .filter_map(|request| request.body)
        .map(|body| serde_json::from_str::<Value>(&body).expect("json body"))
        .collect::<Vec<_>>();
    assert_eq!(bodies.len(), 2);
    let bounds = &bodies[1]["aggs"]["rate"]["date_histogram"]["extended_bounds"];
    assert_eq!(bounds["min"], 1_699_996_400_000_i64);
    assert_eq!(bounds["max"], 1_699_999_999_999_i64);
}

#[tokio::test]
async fn offsets_on_a_non_timeseries_task_are_rejected() {
    let http = canned();
    let dispatcher = dispatcher(&http);

    let err = dispatcher
        .dispatch(
            request(ProviderId::Elasticsearch, "list_indices").with_offsets([3_600]),
            &elasticsearch(),
        )
        .await
        .expect_err("table task");

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.message().contains("only apply to timeseries tasks"), "{err}");
    assert!(http.requests().is_empty());
}

#[tokio::test]
async fn non_positive_offsets_are_rejected() {
    let http = canned();
    let dispatcher = dispatcher(&http);

    for offset in [0, -60] {
        let err = dispatcher
            .dispatch(
                request(ProviderId::Grafana, "prometheus_query")
                    .with_param("datasource_uid", "prom")
                    .with_param("promql", "up")
                    .with_offsets([offset]),
                &grafana(),
            )
            .await
            .expect_err("invalid offset");
        assert_eq!(err.kind(), ErrorKind::Validation, "offset {offset}");
    }
    assert!(http.requests().is_empty());
}
