//! Provider clients and the tasks they serve.
//!
//! Each adapter exposes a [`ProviderClient`] over the shared [`HttpClient`]
//! transport, a constructor for the [`ConnectorFactory`], and a `register`
//! function adding its task definitions to a [`RegistryBuilder`].

pub mod elasticsearch;
pub mod grafana;
pub mod jenkins;

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::client::{FetchRequest, ProviderClient};
use crate::connector::{ConnectorFactory, Credentials};
use crate::domain::{TimeRange, TimeseriesResult};
use crate::http_client::{HttpClient, HttpRequest, ReqwestHttpClient};
use crate::normalize::tag_offset;
use crate::registry::{RegistryBuilder, TaskInvocation};
use crate::{DispatchError, ProviderId, TaskFailure};

pub use elasticsearch::ElasticsearchClient;
pub use grafana::GrafanaClient;
pub use jenkins::JenkinsClient;

const MAX_ERROR_BODY: usize = 512;

/// Registers every task of every bundled adapter.
pub fn register_all(builder: &mut RegistryBuilder) -> Result<(), DispatchError> {
    elasticsearch::register(builder)?;
    grafana::register(builder)?;
    jenkins::register(builder)?;
    Ok(())
}

/// Factory for the bundled adapters.
///
/// With `shared` every client uses that transport; otherwise each connector
/// gets its own reqwest client honoring its `ssl_verify` flag.
pub fn connector_factory(shared: Option<Arc<dyn HttpClient>>) -> ConnectorFactory {
    let es_transport = shared.clone();
    let grafana_transport = shared.clone();
    let jenkins_transport = shared;

    ConnectorFactory::new()
        .with_constructor(ProviderId::Elasticsearch, move |connector, config| {
            let http = transport(es_transport.as_ref(), &connector.credentials)?;
            let client = ElasticsearchClient::from_connector(connector, config, http)?;
            Ok(Arc::new(client) as Arc<dyn ProviderClient>)
        })
        .with_constructor(ProviderId::Grafana, move |connector, config| {
            let http = transport(grafana_transport.as_ref(), &connector.credentials)?;
            let client = GrafanaClient::from_connector(connector, config, http)?;
            Ok(Arc::new(client) as Arc<dyn ProviderClient>)
        })
        .with_constructor(ProviderId::Jenkins, move |connector, config| {
            let http = transport(jenkins_transport.as_ref(), &connector.credentials)?;
            let client = JenkinsClient::from_connector(connector, config, http)?;
            Ok(Arc::new(client) as Arc<dyn ProviderClient>)
        })
}

fn transport(
    shared: Option<&Arc<dyn HttpClient>>,
    credentials: &Credentials,
) -> Result<Arc<dyn HttpClient>, TaskFailure> {
    if let Some(shared) = shared {
        return Ok(Arc::clone(shared));
    }
    let client = ReqwestHttpClient::configured(credentials.flag("ssl_verify")?)
        .map_err(|err| TaskFailure::Other(err.message().to_owned()))?;
    Ok(Arc::new(client))
}

/// Sends `request` and decodes a successful body as JSON; an empty body is `null`.
pub(crate) async fn send_json(http: &dyn HttpClient, request: HttpRequest) -> Result<Value, TaskFailure> {
    let response = http.execute(request).await?;
    if !response.is_success() {
        let mut body = response.body;
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        return Err(TaskFailure::UpstreamStatus {
            status: response.status,
            body,
        });
    }
    if response.body.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&response.body)?)
}

/// `scheme://host[:port]` from connector credentials, without a trailing slash.
///
/// A `port` credential is only applied when `host` does not already name one.
pub(crate) fn base_url(credentials: &Credentials, host_key: &str) -> Result<String, TaskFailure> {
    let host = credentials.require(host_key)?.trim_end_matches('/');
    let (scheme, rest) = match host.split_once("://") {
        Some((scheme, rest)) if scheme == "http" || scheme == "https" => (scheme, rest),
        _ => (credentials.get("protocol").unwrap_or("https"), host),
    };
    let (authority, path) = rest.find('/').map_or((rest, ""), |at| rest.split_at(at));

    match credentials.get("port") {
        Some(port) if !has_port(authority) => Ok(format!("{scheme}://{authority}:{port}{path}")),
        _ => Ok(format!("{scheme}://{authority}{path}")),
    }
}

/// `host:9200` and `[::1]:9200` carry a port; `[::1]` does not.
fn has_port(authority: &str) -> bool {
    authority
        .rsplit_once(':')
        .is_some_and(|(_, port)| !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()))
}

/// Runs `query` over the invocation window, then once per requested offset
/// over the window shifted that many seconds back.
///
/// Every series is labelled `offset_seconds` (`0` for the requested window).
/// An offset window without data is skipped; any other failure aborts.
pub(crate) async fn with_offsets<F, Fut>(
    invocation: &TaskInvocation,
    query: F,
) -> Result<TimeseriesResult, TaskFailure>
where
    F: Fn(TimeRange) -> Fut,
    Fut: Future<Output = Result<TimeseriesResult, TaskFailure>>,
{
    let mut result = query(invocation.time_range).await?;
    tag_offset(&mut result, 0);

    for &offset in &invocation.offsets {
        let window = invocation.time_range.shifted_back(offset)?;
        match query(window).await {
            Ok(mut shifted) => {
                tag_offset(&mut shifted, offset);
                result.series.append(&mut shifted.series);
            }
            Err(TaskFailure::NoData(reason)) => debug!(offset, %reason, "offset window has no data"),
            Err(other) => return Err(other),
        }
    }
    Ok(result)
}

/// Fetches through the invocation's client, giving up once the dispatch
/// stops waiting.
pub(crate) async fn fetch_cancellable(
    invocation: &TaskInvocation,
    request: FetchRequest,
) -> Result<Value, TaskFailure> {
    let operation = request.operation;
    tokio::select! {
        biased;
        () = invocation.cancel.cancelled() => Err(TaskFailure::Other(format!(
            "{operation} abandoned after cancellation"
        ))),
        outcome = invocation.client.fetch(request) => outcome,
    }
}
