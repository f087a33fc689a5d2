use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use crate::inventory::ModelType;
use crate::{ProviderId, TaskFailure};

/// Boxed future returned by provider client calls.
pub type ClientFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, TaskFailure>> + Send + 'a>>;

/// One provider-native call: an operation name plus its primitive arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub operation: &'static str,
    pub args: Value,
}

impl FetchRequest {
    pub fn new(operation: &'static str, args: Value) -> Self {
        Self { operation, args }
    }

    pub fn arg_str(&self, name: &str) -> Option<&str> {
        self.args.get(name).and_then(Value::as_str)
    }

    pub fn arg_i64(&self, name: &str) -> Option<i64> {
        self.args.get(name).and_then(Value::as_i64)
    }

    /// Required string argument, or an `UnexpectedPayload` failure naming it.
    pub fn require_str(&self, name: &str) -> Result<&str, TaskFailure> {
        self.arg_str(name).ok_or_else(|| {
            TaskFailure::unexpected(format!(
                "operation '{}' requires string argument '{name}'",
                self.operation
            ))
        })
    }
}

/// Live handle on one external system, built by the connector factory.
///
/// `test_connection` fails rather than returning `false` when the provider is
/// unreachable or rejects the credentials. `fetch` returns the provider-native
/// payload untouched; shaping it is the executor's job.
pub trait ProviderClient: Send + Sync {
    fn provider(&self) -> ProviderId;

    fn test_connection(&self) -> ClientFuture<'_, bool>;

    fn fetch(&self, request: FetchRequest) -> ClientFuture<'_, Value>;

    /// Inventory items of `model_type` keyed by uid. Providers without
    /// inventory support return an empty map.
    fn extract_inventory<'a>(
        &'a self,
        model_type: &'a ModelType,
    ) -> ClientFuture<'a, BTreeMap<String, Value>> {
        let _ = model_type;
        Box::pin(async { Ok(BTreeMap::new()) })
    }
}
