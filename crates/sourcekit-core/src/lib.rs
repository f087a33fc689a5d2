//! # Sourcekit Core
//!
//! Task registry, dispatch and result normalization for external data-source
//! connectors.
//!
//! ## Overview
//!
//! This crate provides the pieces a workflow engine needs to run a named task
//! against a configured connector and get back a uniform result:
//!
//! - **Task registry** keyed by `(provider, task type)`, frozen after startup
//! - **Connector factory** validating credentials and building provider clients
//! - **Deadline wrapper** bounding data-fetch tasks with cooperative cancellation
//! - **Normalizer** turning raw provider payloads into canonical tables,
//!   timeseries and text
//! - **Error classifier** mapping failures onto a small, stable set of kinds
//! - **Adaptive interval** choosing time-bucket widths from a query span
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Bundled provider clients (Elasticsearch, Grafana, Jenkins) |
//! | [`classify`] | Failure to [`ErrorKind`] mapping |
//! | [`client`] | Provider client contract |
//! | [`config`] | Dispatch defaults and environment overrides |
//! | [`connector`] | Connector records, credential validation and client factory |
//! | [`deadline`] | Execution modes and the deadline wrapper |
//! | [`dispatch`] | Task dispatcher |
//! | [`domain`] | Canonical results, time ranges and parameter schemas |
//! | [`error`] | Validation, task and dispatch error types |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`interval`] | Adaptive bucket width table |
//! | [`inventory`] | Metadata inventory sinks |
//! | [`normalize`] | Raw payload to canonical result conversion |
//! | [`registry`] | Task definitions and the registry |
//! | [`source`] | Provider identifiers |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use sourcekit_core::{
//!     adapters, Connector, Credentials, DispatchConfig, DispatchRequest, Dispatcher, ProviderId,
//!     TaskRegistry, TaskType, TimeRange,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut builder = TaskRegistry::builder();
//!     adapters::register_all(&mut builder)?;
//!     let dispatcher = Dispatcher::new(
//!         Arc::new(builder.build()),
//!         adapters::connector_factory(None),
//!         DispatchConfig::from_env(),
//!     );
//!
//!     let connector = Connector::new(
//!         ProviderId::Elasticsearch,
//!         Credentials::new().with("host", "http://localhost:9200"),
//!     );
//!     let request = DispatchRequest::new(
//!         ProviderId::Elasticsearch,
//!         TaskType::parse("query_logs")?,
//!         TimeRange::last(Duration::from_secs(3_600))?,
//!     )
//!     .with_param("index", "logs-*")
//!     .with_param("lucene_query", "level:error");
//!
//!     let result = dispatcher.dispatch(request, &connector).await?;
//!     println!("{}", serde_json::to_string_pretty(&result)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  CLI / Engine   │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │   Dispatcher    │────▶│  Task Registry   │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Connector       │────▶│ Provider Client  │
//! │ Factory         │     │ (HTTP transport) │
//! └─────────────────┘     └────────┬─────────┘
//!                                  │
//!                                  ▼
//!                         ┌──────────────────┐
//!                         │   Normalizer     │
//!                         └──────────────────┘
//! ```

pub mod adapters;
pub mod classify;
pub mod client;
pub mod config;
pub mod connector;
pub mod deadline;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod interval;
pub mod inventory;
pub mod normalize;
pub mod registry;
pub mod source;

pub use classify::{classify, classify_status};
pub use client::{ClientFuture, FetchRequest, ProviderClient};
pub use config::DispatchConfig;
pub use connector::{Connector, ConnectorFactory, Credentials};
pub use deadline::{run_with_deadline, ExecutionMode};
pub use dispatch::{DispatchRequest, Dispatcher, InventoryReport};
pub use domain::{
    CanonicalResult, Datapoint, LabeledSeries, ParamSchema, ParamSpec, ParamType, ResultKind,
    ResultPayload, Row, TableResult, TaskParams, TextResult, TimeRange, TimeseriesResult,
};
pub use error::{DispatchError, ErrorKind, FieldIssue, TaskFailure, ValidationError};
pub use http_client::{
    CannedHttpClient, HttpAuth, HttpClient, HttpError, HttpMethod, HttpRequest, HttpResponse,
    ReqwestHttpClient,
};
pub use interval::{bucket_width, BucketWidth};
pub use inventory::{LoggingMetadataSink, MetadataSink, ModelType};
pub use registry::{executor, RegistryBuilder, TaskDefinition, TaskInvocation, TaskRegistry, TaskType};
pub use source::ProviderId;
