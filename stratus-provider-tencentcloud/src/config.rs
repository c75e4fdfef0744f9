//! Provider configuration

use std::time::Duration;

use serde::{Deserialize, Deserializer};
use thiserror::Error;

pub const ENV_SECRET_ID: &str = "TENCENTCLOUD_SECRET_ID";
pub const ENV_SECRET_KEY: &str = "TENCENTCLOUD_SECRET_KEY";
pub const ENV_SECURITY_TOKEN: &str = "TENCENTCLOUD_SECURITY_TOKEN";
pub const ENV_REGION: &str = "TENCENTCLOUD_REGION";

pub const DEFAULT_REGION: &str = "ap-guangzhou";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    MissingEnvVar(String),

    #[error("invalid provider configuration: {field}: {message}")]
    Invalid { field: String, message: String },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Credentials, region and timing for a provider instance.
///
/// Durations are given in (fractional) seconds when deserialized.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    pub secret_id: String,
    pub secret_key: String,
    #[serde(default)]
    pub security_token: Option<String>,
    #[serde(default = "default_region")]
    pub region: String,
    /// Base URL used for every product instead of `https://{service}.tencentcloudapi.com`
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_poll_interval", deserialize_with = "seconds")]
    pub poll_interval: Duration,
    /// Retry budget for describe calls
    #[serde(default = "default_read_timeout", deserialize_with = "seconds")]
    pub read_timeout: Duration,
    /// Retry budget for mutating calls
    #[serde(default = "default_write_timeout", deserialize_with = "seconds")]
    pub write_timeout: Duration,
    #[serde(default = "default_wait_timeout", deserialize_with = "seconds")]
    pub create_timeout: Duration,
    #[serde(default = "default_wait_timeout", deserialize_with = "seconds")]
    pub update_timeout: Duration,
    #[serde(default = "default_wait_timeout", deserialize_with = "seconds")]
    pub delete_timeout: Duration,
    /// Timeout of a single HTTP request
    #[serde(default = "default_request_timeout", deserialize_with = "seconds")]
    pub request_timeout: Duration,
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_read_timeout() -> Duration {
    Duration::from_secs(3 * 60)
}

fn default_write_timeout() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_wait_timeout() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

fn seconds<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}

impl ProviderConfig {
    pub fn new(
        secret_id: impl Into<String>,
        secret_key: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            secret_id: secret_id.into(),
            secret_key: secret_key.into(),
            security_token: None,
            region: region.into(),
            endpoint: None,
            poll_interval: default_poll_interval(),
            read_timeout: default_read_timeout(),
            write_timeout: default_write_timeout(),
            create_timeout: default_wait_timeout(),
            update_timeout: default_wait_timeout(),
            delete_timeout: default_wait_timeout(),
            request_timeout: default_request_timeout(),
        }
    }

    /// Load credentials and region from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load credentials and region through `lookup`, which maps a variable name to its value
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let secret_id =
            get(ENV_SECRET_ID).ok_or_else(|| ConfigError::MissingEnvVar(ENV_SECRET_ID.into()))?;
        let secret_key =
            get(ENV_SECRET_KEY).ok_or_else(|| ConfigError::MissingEnvVar(ENV_SECRET_KEY.into()))?;
        let region = get(ENV_REGION).unwrap_or_else(default_region);

        let mut config = Self::new(secret_id, secret_key, region);
        config.security_token = get(ENV_SECURITY_TOKEN);
        Ok(config)
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_security_token(mut self, token: impl Into<String>) -> Self {
        self.security_token = Some(token.into());
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Use the same wait timeout for create, update and delete
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.create_timeout = timeout;
        self.update_timeout = timeout;
        self.delete_timeout = timeout;
        self
    }

    pub fn with_retry_timeouts(mut self, read: Duration, write: Duration) -> Self {
        self.read_timeout = read;
        self.write_timeout = write;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &str, message: &str| {
            Err(ConfigError::Invalid {
                field: field.to_string(),
                message: message.to_string(),
            })
        };

        if self.secret_id.is_empty() {
            return invalid("secret_id", "must not be empty");
        }
        if self.secret_key.is_empty() {
            return invalid("secret_key", "must not be empty");
        }
        if self.region.is_empty() {
            return invalid("region", "must not be empty");
        }
        if self.poll_interval.is_zero() {
            return invalid("poll_interval", "must be positive");
        }
        if let Some(endpoint) = &self.endpoint
            && !(endpoint.starts_with("http://") || endpoint.starts_with("https://"))
        {
            return invalid("endpoint", "must start with http:// or https://");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn from_lookup_reads_credentials() {
        let config = ProviderConfig::from_lookup(lookup(&[
            (ENV_SECRET_ID, "AKIDexample"),
            (ENV_SECRET_KEY, "secret"),
            (ENV_SECURITY_TOKEN, "token"),
            (ENV_REGION, "ap-shanghai"),
        ]))
        .unwrap();

        assert_eq!(config.secret_id, "AKIDexample");
        assert_eq!(config.region, "ap-shanghai");
        assert_eq!(config.security_token.as_deref(), Some("token"));
        assert_eq!(config.poll_interval, Duration::from_secs(5));
    }

    #[test]
    fn from_lookup_defaults_region() {
        let config = ProviderConfig::from_lookup(lookup(&[
            (ENV_SECRET_ID, "AKIDexample"),
            (ENV_SECRET_KEY, "secret"),
        ]))
        .unwrap();
        assert_eq!(config.region, DEFAULT_REGION);
        assert_eq!(config.security_token, None);
    }

    #[test]
    fn from_lookup_requires_secret_key() {
        let err = ProviderConfig::from_lookup(lookup(&[(ENV_SECRET_ID, "AKIDexample")]))
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingEnvVar(ENV_SECRET_KEY.to_string()));
    }

    #[test]
    fn deserialize_with_fractional_seconds() {
        let config: ProviderConfig = serde_json::from_str(
            r#"{"secret_id": "id", "secret_key": "key", "poll_interval": 0.5, "create_timeout": 30}"#,
        )
        .unwrap();
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.create_timeout, Duration::from_secs(30));
        assert_eq!(config.delete_timeout, Duration::from_secs(600));
        assert_eq!(config.region, DEFAULT_REGION);
    }

    #[test]
    fn deserialize_rejects_unknown_fields() {
        let result: Result<ProviderConfig, _> =
            serde_json::from_str(r#"{"secret_id": "id", "secret_key": "key", "zone": "x"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn validate_rejects_bad_endpoint() {
        let config = ProviderConfig::new("id", "key", "ap-guangzhou").with_endpoint("localhost:8080");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field, .. }) if field == "endpoint"
        ));
        assert!(ProviderConfig::new("id", "key", "ap-guangzhou").validate().is_ok());
    }
}
