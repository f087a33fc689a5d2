use std::collections::{BTreeMap, HashMap};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use tracing::debug;

use crate::client::ProviderClient;
use crate::config::DispatchConfig;
use crate::{DispatchError, ProviderId, TaskFailure};

/// Opaque credential bundle. `Debug` prints key names only.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Credentials(BTreeMap<String, String>);

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    /// Present, non-blank value or a credential failure naming the key.
    pub fn require(&self, key: &str) -> Result<&str, TaskFailure> {
        self.get(key)
            .ok_or_else(|| TaskFailure::Credential(format!("missing credential '{key}'")))
    }

    /// `ssl_verify` style flag; absent means `true`.
    pub fn flag(&self, key: &str) -> Result<bool, TaskFailure> {
        match self.get(key).map(str::to_ascii_lowercase).as_deref() {
            None | Some("true") => Ok(true),
            Some("false") => Ok(false),
            Some(_) => Err(TaskFailure::Credential(format!(
                "credential '{key}' must be 'true' or 'false'"
            ))),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0
            .iter()
            .filter(|(_, value)| !value.trim().is_empty())
            .map(|(key, _)| key.as_str())
    }
}

impl FromIterator<(String, String)> for Credentials {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}

/// Provider identifier plus the credentials used to reach it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Connector {
    pub provider: ProviderId,
    #[serde(default)]
    pub name: Option<String>,
    pub credentials: Credentials,
}

impl Connector {
    pub fn new(provider: ProviderId, credentials: Credentials) -> Self {
        Self {
            provider,
            name: None,
            credentials,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Alternative required-key sets per provider; a connector must contain one
/// set in full.
pub fn credential_key_sets(provider: ProviderId) -> &'static [&'static [&'static str]] {
    match provider {
        ProviderId::Elasticsearch => &[&["host"]],
        ProviderId::OpenSearch => &[&["host", "username", "password"]],
        ProviderId::Grafana => &[&["host", "api_key"]],
        ProviderId::GrafanaLoki => &[&["host", "port"]],
        ProviderId::Datadog => &[
            &["api_key", "app_key", "api_domain"],
            &["auth_token", "api_key", "api_domain"],
        ],
        ProviderId::NewRelic => &[&["api_key", "app_id", "api_domain"]],
        ProviderId::Cloudwatch => &[
            &["access_key", "secret_key", "region"],
            &["assumed_role_arn", "region"],
        ],
        ProviderId::Azure => &[&["client_id", "client_secret", "tenant_id", "subscription_id"]],
        ProviderId::Gcm => &[
            &["project_id", "private_key"],
            &["project_id", "service_account_json"],
        ],
        ProviderId::Signoz => &[&["host", "api_key"]],
        ProviderId::Jenkins => &[&["url", "username", "api_token"]],
        ProviderId::Github => &[&["token", "org"]],
        ProviderId::ArgoCd => &[&["server", "token"]],
        ProviderId::Jira => &[&["url", "username", "api_key"]],
        ProviderId::Sentry => &[&["api_key", "org_slug"]],
        ProviderId::Posthog => &[&["host", "api_key", "project_id"]],
        ProviderId::MongoDb => &[&["connection_string"]],
        ProviderId::Postgres => &[&["host", "user", "password", "port", "database"]],
        ProviderId::Clickhouse => &[&["interface", "host", "port", "user", "password"]],
        ProviderId::Bash => &[&["host"]],
    }
}

/// Checks that `connector` carries a full key set and well-formed values.
pub fn validate_credentials(connector: &Connector) -> Result<(), TaskFailure> {
    let present = connector.credentials.keys().collect::<Vec<_>>();
    let sets = credential_key_sets(connector.provider);

    let closest_missing = sets
        .iter()
        .map(|set| {
            set.iter()
                .copied()
                .filter(|key| !present.contains(key))
                .collect::<Vec<_>>()
        })
        .min_by_key(Vec::len)
        .unwrap_or_default();

    if !closest_missing.is_empty() {
        return Err(TaskFailure::Credential(format!(
            "{} connector is missing required keys: {}",
            connector.provider,
            closest_missing.join(", ")
        )));
    }

    if let Some(pem) = connector.credentials.get("pem") {
        check_pem(pem)?;
    }
    if connector.credentials.get("ssl_verify").is_some() {
        connector.credentials.flag("ssl_verify")?;
    }
    Ok(())
}

const PEM_LABELS: [&str; 5] = [
    "RSA PRIVATE KEY",
    "EC PRIVATE KEY",
    "DSA PRIVATE KEY",
    "OPENSSH PRIVATE KEY",
    "PRIVATE KEY",
];

/// Structural check of a private key: a supported PEM label around a base64 body.
pub fn check_pem(pem: &str) -> Result<(), TaskFailure> {
    let pem = pem.trim();
    let unsupported =
        || TaskFailure::Credential(String::from("pem key parses under none of the supported key algorithms"));

    let label = PEM_LABELS
        .iter()
        .find(|label| pem.starts_with(&format!("-----BEGIN {label}-----")))
        .ok_or_else(unsupported)?;

    let header = format!("-----BEGIN {label}-----");
    let footer = format!("-----END {label}-----");
    let body = pem
        .strip_prefix(header.as_str())
        .and_then(|rest| rest.strip_suffix(footer.as_str()))
        .ok_or_else(unsupported)?;

    let body = body
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.contains(':'))
        .collect::<String>();
    if body.is_empty() || STANDARD.decode(body).is_err() {
        return Err(unsupported());
    }
    Ok(())
}

/// Builds a live client for one provider.
pub type ClientConstructor = Arc<
    dyn Fn(&Connector, &DispatchConfig) -> Result<Arc<dyn ProviderClient>, TaskFailure>
        + Send
        + Sync,
>;

/// Maps providers to client constructors.
#[derive(Clone, Default)]
pub struct ConnectorFactory {
    constructors: HashMap<ProviderId, ClientConstructor>,
}

impl ConnectorFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_constructor<F>(mut self, provider: ProviderId, constructor: F) -> Self
    where
        F: Fn(&Connector, &DispatchConfig) -> Result<Arc<dyn ProviderClient>, TaskFailure>
            + Send
            + Sync
            + 'static,
    {
        self.constructors.insert(provider, Arc::new(constructor));
        self
    }

    pub fn supports(&self, provider: ProviderId) -> bool {
        self.constructors.contains_key(&provider)
    }

    /// Validates the connector's credential shape, then constructs its client.
    pub fn build(
        &self,
        connector: &Connector,
        config: &DispatchConfig,
    ) -> Result<Arc<dyn ProviderClient>, DispatchError> {
        let provider = connector.provider;
        let constructor = self
            .constructors
            .get(&provider)
            .ok_or_else(|| DispatchError::no_client_constructor(provider))?;

        validate_credentials(connector)
            .and_then(|()| constructor(connector, config))
            .map_err(|failure| DispatchError::from(failure).with_provider(provider))
            .inspect(|_| debug!(%provider, connector = ?connector.name, "provider client built"))
    }
}

impl Debug for ConnectorFactory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut providers = self.constructors.keys().collect::<Vec<_>>();
        providers.sort();
        f.debug_struct("ConnectorFactory")
            .field("providers", &providers)
            .finish()
    }
}
