use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::ProviderId;

/// Inventory model a task depends on, e.g. `elasticsearch_index`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ModelType(Cow<'static, str>);

impl ModelType {
    pub const fn new(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ModelType {
    fn from(name: String) -> Self {
        Self(Cow::Owned(name))
    }
}

impl Display for ModelType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Error reported by a metadata sink. Never propagated past [`publish`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("metadata sink rejected {model_type}: {message}")]
pub struct SinkError {
    pub model_type: ModelType,
    pub message: String,
}

/// Receiver of extracted inventory, typically a central metadata service.
pub trait MetadataSink: Send + Sync {
    fn register_metadata<'a>(
        &'a self,
        provider: ProviderId,
        model_type: &'a ModelType,
        items: BTreeMap<String, Value>,
    ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + 'a>>;
}

/// Sink that only logs what it receives.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingMetadataSink;

impl MetadataSink for LoggingMetadataSink {
    fn register_metadata<'a>(
        &'a self,
        provider: ProviderId,
        model_type: &'a ModelType,
        items: BTreeMap<String, Value>,
    ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + 'a>> {
        Box::pin(async move {
            info!(%provider, %model_type, items = items.len(), "inventory extracted");
            Ok(())
        })
    }
}

/// Hands `items` to `sink`, logging instead of returning any failure.
///
/// Returns whether the sink accepted the items.
pub async fn publish(
    sink: &dyn MetadataSink,
    provider: ProviderId,
    model_type: &ModelType,
    items: BTreeMap<String, Value>,
) -> bool {
    if items.is_empty() {
        return true;
    }
    match sink.register_metadata(provider, model_type, items).await {
        Ok(()) => true,
        Err(err) => {
            warn!(%provider, %model_type, error = %err, "failed to publish inventory");
            false
        }
    }
}
