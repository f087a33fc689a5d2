use std::time::Duration;

use tracing::warn;

pub const DEADLINE_ENV: &str = "SOURCEKIT_DEADLINE_SECS";
pub const HTTP_TIMEOUT_ENV: &str = "SOURCEKIT_HTTP_TIMEOUT_SECS";

/// Process-wide dispatch settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Deadline applied to data-fetch tasks when the caller passes none.
    pub data_fetch_deadline: Duration,
    /// Per-request timeout handed to provider HTTP clients.
    pub http_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            data_fetch_deadline: Duration::from_secs(120),
            http_timeout: Duration::from_secs(30),
        }
    }
}

impl DispatchConfig {
    /// Defaults overridden by `SOURCEKIT_DEADLINE_SECS` and `SOURCEKIT_HTTP_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            data_fetch_deadline: seconds(&lookup, DEADLINE_ENV)
                .unwrap_or(defaults.data_fetch_deadline),
            http_timeout: seconds(&lookup, HTTP_TIMEOUT_ENV).unwrap_or(defaults.http_timeout),
        }
    }

    pub fn with_data_fetch_deadline(mut self, deadline: Duration) -> Self {
        self.data_fetch_deadline = deadline;
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }
}

fn seconds(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<Duration> {
    let raw = lookup(name)?;
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Some(Duration::from_secs(secs)),
        _ => {
            warn!(variable = name, value = %raw, "ignoring invalid duration override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = DispatchConfig::default();
        assert_eq!(config.data_fetch_deadline, Duration::from_secs(120));
        assert_eq!(config.http_timeout, Duration::from_secs(30));
    }

    #[test]
    fn reads_overrides_and_ignores_garbage() {
        let config = DispatchConfig::from_lookup(|name| match name {
            DEADLINE_ENV => Some(String::from("45")),
            HTTP_TIMEOUT_ENV => Some(String::from("soon")),
            _ => None,
        });

        assert_eq!(config.data_fetch_deadline, Duration::from_secs(45));
        assert_eq!(config.http_timeout, Duration::from_secs(30));
    }

    #[test]
    fn zero_is_not_a_valid_override() {
        let config = DispatchConfig::from_lookup(|name| (name == DEADLINE_ENV).then(|| String::from("0")));
        assert_eq!(config.data_fetch_deadline, Duration::from_secs(120));
    }
}
