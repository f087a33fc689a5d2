use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{fetch_cancellable, send_json};
use crate::client::{ClientFuture, FetchRequest, ProviderClient};
use crate::config::DispatchConfig;
use crate::connector::Connector;
use crate::deadline::ExecutionMode;
use crate::domain::{ParamSchema, ParamSpec, ParamType, ResultKind, ResultPayload};
use crate::http_client::{HttpAuth, HttpClient, HttpRequest};
use crate::inventory::ModelType;
use crate::normalize::{stringify, to_table, to_text};
use crate::registry::{executor, RegistryBuilder, TaskDefinition, TaskInvocation, TaskType};
use crate::{DispatchError, ProviderId, TaskFailure};

pub const JOB_MODEL: ModelType = ModelType::new("jenkins_job");

pub const RUN_JOB: TaskType = TaskType::new("run_job");
pub const LAST_BUILD: TaskType = TaskType::new("last_build");

const OP_BUILD: &str = "build";
const OP_LAST_BUILD: &str = "last_build";

const BUILD_FIELDS: [&str; 6] = ["number", "result", "building", "timestamp", "duration", "url"];

/// Jenkins REST client using username + API token basic auth.
#[derive(Clone)]
pub struct JenkinsClient {
    http: Arc<dyn HttpClient>,
    base_url: String,
    auth: HttpAuth,
    timeout: Duration,
}

/// `folder/sub/job` -> `/job/folder/job/sub/job/job`.
fn job_path(job_name: &str) -> String {
    job_name
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| format!("/job/{}", urlencoding::encode(segment)))
        .collect()
}

impl JenkinsClient {
    pub fn new(
        http: Arc<dyn HttpClient>,
        base_url: impl Into<String>,
        username: impl Into<String>,
        api_token: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            auth: HttpAuth::Basic {
                username: username.into(),
                password: api_token.into(),
            },
            timeout: DispatchConfig::default().http_timeout,
        }
    }

    pub fn from_connector(
        connector: &Connector,
        config: &DispatchConfig,
        http: Arc<dyn HttpClient>,
    ) -> Result<Self, TaskFailure> {
        let credentials = &connector.credentials;
        let mut client = Self::new(
            http,
            credentials.require("url")?.trim_end_matches('/'),
            credentials.require("username")?,
            credentials.require("api_token")?,
        );
        client.timeout = config.http_timeout;
        Ok(client)
    }

    async fn send(&self, request: HttpRequest) -> Result<Value, TaskFailure> {
        send_json(
            self.http.as_ref(),
            request.with_auth(&self.auth).with_timeout(self.timeout),
        )
        .await
    }

    async fn trigger(
        &self,
        job_name: &str,
        parameters: Option<&Map<String, Value>>,
    ) -> Result<Value, TaskFailure> {
        let job = format!("{}{}", self.base_url, job_path(job_name));
        let request = match parameters.filter(|parameters| !parameters.is_empty()) {
            Some(parameters) => HttpRequest::post(format!("{job}/buildWithParameters"))
                .with_form_body(
                    parameters
                        .iter()
                        .map(|(key, value)| (key.as_str(), stringify(value))),
                ),
            None => HttpRequest::post(format!("{job}/build")).with_query([("delay", "0sec")]),
        };
        self.send(request).await?;
        Ok(json!({ "job_name": job_name, "queued": true }))
    }
}

impl ProviderClient for JenkinsClient {
    fn provider(&self) -> ProviderId {
        ProviderId::Jenkins
    }

    fn test_connection(&self) -> ClientFuture<'_, bool> {
        Box::pin(async move {
            self.send(HttpRequest::get(format!("{}/api/json", self.base_url)))
                .await?;
            Ok(true)
        })
    }

    fn fetch(&self, request: FetchRequest) -> ClientFuture<'_, Value> {
        Box::pin(async move {
            match request.operation {
                OP_BUILD => {
                    let job_name = request.require_str("job_name")?;
                    self.trigger(job_name, request.args.get("parameters").and_then(Value::as_object))
                        .await
                }
                OP_LAST_BUILD => {
                    let job_name = request.require_str("job_name")?;
                    let url = format!("{}{}/lastBuild/api/json", self.base_url, job_path(job_name));
                    self.send(HttpRequest::get(url)).await
                }
                other => Err(TaskFailure::unexpected(format!(
                    "jenkins does not support operation '{other}'"
                ))),
            }
        })
    }

    fn extract_inventory<'a>(
        &'a self,
        model_type: &'a ModelType,
    ) -> ClientFuture<'a, BTreeMap<String, Value>> {
        Box::pin(async move {
            if *model_type != JOB_MODEL {
                return Ok(BTreeMap::new());
            }
            let url = format!("{}/api/json", self.base_url);
            let root = self
                .send(HttpRequest::get(url).with_query([("tree", "jobs[name,url,_class]")]))
                .await?;
            Ok(root
                .get("jobs")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(|job| {
                    let name = job.get("name")?.as_str()?;
                    Some((name.to_owned(), job.clone()))
                })
                .collect())
        })
    }
}

pub fn register(builder: &mut RegistryBuilder) -> Result<(), DispatchError> {
    builder
        .register(
            TaskDefinition::new(ProviderId::Jenkins, RUN_JOB, ResultKind::Text, executor(run_job))
                .with_display_name("Trigger a job build")
                .with_mode(ExecutionMode::Trigger)
                .with_inventory([JOB_MODEL])
                .with_params(ParamSchema::new(vec![
                    ParamSpec::required("job_name", ParamType::String),
                    ParamSpec::optional("parameters", ParamType::Json),
                ])),
        )?
        .register(
            TaskDefinition::new(
                ProviderId::Jenkins,
                LAST_BUILD,
                ResultKind::Table,
                executor(last_build),
            )
            .with_display_name("Fetch the last build of a job")
            .with_inventory([JOB_MODEL])
            .with_params(ParamSchema::new(vec![ParamSpec::required(
                "job_name",
                ParamType::String,
            )])),
        )?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct JobParams {
    job_name: String,
    #[serde(default)]
    parameters: Option<Map<String, Value>>,
}

async fn run_job(invocation: TaskInvocation) -> Result<ResultPayload, TaskFailure> {
    let params = invocation.params.decode::<JobParams>()?;
    fetch_cancellable(
        &invocation,
        FetchRequest::new(
            OP_BUILD,
            json!({ "job_name": params.job_name, "parameters": params.parameters }),
        ),
    )
    .await?;

    Ok(ResultPayload::Text(to_text(format!(
        "Job {} triggered successfully",
        params.job_name
    ))))
}

async fn last_build(invocation: TaskInvocation) -> Result<ResultPayload, TaskFailure> {
    let params = invocation.params.decode::<JobParams>()?;
    // Jenkins answers 404 for the lastBuild of a job that has never run.
    let raw = match fetch_cancellable(
        &invocation,
        FetchRequest::new(OP_LAST_BUILD, json!({ "job_name": params.job_name })),
    )
    .await
    {
        Err(TaskFailure::UpstreamStatus { status: 404, .. }) => Value::Null,
        outcome => outcome?,
    };

    let build = raw
        .as_object()
        .ok_or_else(|| TaskFailure::no_data(format!("job {} has no builds", params.job_name)))?;
    let row = BUILD_FIELDS
        .iter()
        .map(|field| ((*field).to_owned(), build.get(*field).cloned().unwrap_or(Value::Null)))
        .collect::<Map<_, _>>();

    Ok(ResultPayload::Table(to_table(
        &[Value::Object(row)],
        format!("GET {}/lastBuild", job_path(&params.job_name)),
    )?))
}
