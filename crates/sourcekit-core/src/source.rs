use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Canonical provider identifiers used as registry keys and result source tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    Elasticsearch,
    OpenSearch,
    Grafana,
    GrafanaLoki,
    Datadog,
    NewRelic,
    Cloudwatch,
    Azure,
    Gcm,
    Signoz,
    Jenkins,
    Github,
    #[serde(rename = "argocd")]
    ArgoCd,
    Jira,
    Sentry,
    Posthog,
    #[serde(rename = "mongodb")]
    MongoDb,
    Postgres,
    Clickhouse,
    Bash,
}

impl ProviderId {
    pub const ALL: [Self; 20] = [
        Self::Elasticsearch,
        Self::OpenSearch,
        Self::Grafana,
        Self::GrafanaLoki,
        Self::Datadog,
        Self::NewRelic,
        Self::Cloudwatch,
        Self::Azure,
        Self::Gcm,
        Self::Signoz,
        Self::Jenkins,
        Self::Github,
        Self::ArgoCd,
        Self::Jira,
        Self::Sentry,
        Self::Posthog,
        Self::MongoDb,
        Self::Postgres,
        Self::Clickhouse,
        Self::Bash,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Elasticsearch => "elasticsearch",
            Self::OpenSearch => "open_search",
            Self::Grafana => "grafana",
            Self::GrafanaLoki => "grafana_loki",
            Self::Datadog => "datadog",
            Self::NewRelic => "new_relic",
            Self::Cloudwatch => "cloudwatch",
            Self::Azure => "azure",
            Self::Gcm => "gcm",
            Self::Signoz => "signoz",
            Self::Jenkins => "jenkins",
            Self::Github => "github",
            Self::ArgoCd => "argocd",
            Self::Jira => "jira",
            Self::Sentry => "sentry",
            Self::Posthog => "posthog",
            Self::MongoDb => "mongodb",
            Self::Postgres => "postgres",
            Self::Clickhouse => "clickhouse",
            Self::Bash => "bash",
        }
    }
}

impl Display for ProviderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|provider| provider.as_str() == normalized)
            .ok_or(ValidationError::InvalidProvider {
                value: value.trim().to_owned(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_provider_ignoring_case_and_dashes() {
        assert_eq!(
            ProviderId::from_str("Grafana-Loki").expect("must parse"),
            ProviderId::GrafanaLoki
        );
        assert_eq!(
            ProviderId::from_str(" elasticsearch ").expect("must parse"),
            ProviderId::Elasticsearch
        );
    }

    #[test]
    fn rejects_unknown_provider() {
        let err = ProviderId::from_str("splunk").expect_err("must fail");
        assert!(matches!(err, ValidationError::InvalidProvider { .. }));
    }

    #[test]
    fn every_provider_round_trips_through_its_name() {
        for provider in ProviderId::ALL {
            assert_eq!(ProviderId::from_str(provider.as_str()), Ok(provider));
        }
    }

    #[test]
    fn serialized_name_matches_as_str() {
        for provider in ProviderId::ALL {
            let encoded = serde_json::to_value(provider).expect("serializes");
            assert_eq!(encoded, serde_json::Value::from(provider.as_str()));
        }
    }
}
