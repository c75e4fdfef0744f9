//! TencentCloud API 3.0 client
//!
//! One signed JSON `POST` per action. Responses are wrapped in a
//! `{"Response": {...}}` envelope which carries either the payload or an
//! `Error` object.

use chrono::Utc;
use log::debug;
use reqwest::Url;
use serde::Serialize;
use serde::de::DeserializeOwned;
use stratus_core::retry::{RetryPolicy, retry_with_backoff};

use crate::config::{ConfigError, ProviderConfig};
use crate::error::{ApiError, ErrorCode, default_retry_table, write_retry_table};
use crate::logid::LogId;
use crate::sign::{self, Credential};

/// A product endpoint with its API version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Cvm,
    Cbs,
    Monitor,
    Tag,
}

impl Service {
    pub fn name(self) -> &'static str {
        match self {
            Service::Cvm => "cvm",
            Service::Cbs => "cbs",
            Service::Monitor => "monitor",
            Service::Tag => "tag",
        }
    }

    pub fn version(self) -> &'static str {
        match self {
            Service::Cvm | Service::Cbs => "2017-03-12",
            Service::Monitor => "2018-07-24",
            Service::Tag => "2018-08-13",
        }
    }
}

/// HTTP client shared by every service façade
#[derive(Debug)]
pub struct Client {
    http: reqwest::Client,
    credential: Credential,
    region: String,
    endpoint: Option<Url>,
    read_policy: RetryPolicy,
    write_policy: RetryPolicy,
}

impl Client {
    pub fn new(config: &ProviderConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let endpoint = config
            .endpoint
            .as_deref()
            .map(Url::parse)
            .transpose()
            .map_err(|e| ConfigError::Invalid {
                field: "endpoint".to_string(),
                message: e.to_string(),
            })?;

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            http,
            credential: Credential {
                secret_id: config.secret_id.clone(),
                secret_key: config.secret_key.clone(),
                token: config.security_token.clone(),
            },
            region: config.region.clone(),
            endpoint,
            read_policy: RetryPolicy::with_timeout(config.read_timeout),
            write_policy: RetryPolicy::with_timeout(config.write_timeout),
        })
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// URL to post to and the host to sign for `service`
    fn target(&self, service: Service) -> (String, String) {
        match &self.endpoint {
            Some(url) => {
                let host = match (url.host_str(), url.port()) {
                    (Some(host), Some(port)) => format!("{}:{}", host, port),
                    (Some(host), None) => host.to_string(),
                    _ => String::new(),
                };
                (url.to_string(), host)
            }
            None => {
                let host = format!("{}.tencentcloudapi.com", service.name());
                (format!("https://{}/", host), host)
            }
        }
    }

    /// Perform a single signed call without retrying
    pub async fn call<Req, Resp>(
        &self,
        log_id: &LogId,
        service: Service,
        action: &str,
        request: &Req,
    ) -> Result<Resp, ApiError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let payload = serde_json::to_string(request).map_err(|e| ApiError::Decode {
            action: action.to_string(),
            message: format!("failed to encode request: {}", e),
        })?;

        let now = Utc::now();
        let (url, host) = self.target(service);
        let authorization = sign::authorization(&self.credential, service.name(), &host, &payload, now);

        debug!("[{}] {}.{} -> {}", log_id, service.name(), action, url);

        let mut builder = self
            .http
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, sign::CONTENT_TYPE)
            .header(reqwest::header::AUTHORIZATION, authorization)
            .header("X-TC-Action", action)
            .header("X-TC-Version", service.version())
            .header("X-TC-Timestamp", now.timestamp().to_string())
            .header("X-TC-Region", &self.region);
        if let Some(token) = &self.credential.token {
            builder = builder.header("X-TC-Token", token);
        }

        let network = |source| ApiError::Network {
            action: action.to_string(),
            source,
        };
        let response = builder.body(payload).send().await.map_err(network)?;
        let status = response.status();
        let body = response.text().await.map_err(network)?;

        if !status.is_success() {
            if let Err(e @ ApiError::Service { .. }) = parse_response::<serde_json::Value>(action, &body)
            {
                return Err(e);
            }
            return Err(ApiError::HttpStatus {
                action: action.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let result = parse_response(action, &body);
        match &result {
            Ok(_) => debug!("[{}] {}.{} succeeded", log_id, service.name(), action),
            Err(e) => debug!("[{}] {}.{} failed: {}", log_id, service.name(), action, e),
        }
        result
    }

    /// Call a describe action, retrying transient failures within the read budget
    pub async fn read<Req, Resp>(
        &self,
        log_id: &LogId,
        service: Service,
        action: &str,
        request: &Req,
    ) -> Result<Resp, ApiError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        retry_with_backoff(&self.read_policy, &default_retry_table(), action, || {
            self.call(log_id, service, action, request)
        })
        .await
    }

    /// Call a mutating action, retrying transient failures within the write budget
    pub async fn write<Req, Resp>(
        &self,
        log_id: &LogId,
        service: Service,
        action: &str,
        request: &Req,
    ) -> Result<Resp, ApiError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        retry_with_backoff(&self.write_policy, &write_retry_table(), action, || {
            self.call(log_id, service, action, request)
        })
        .await
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Envelope {
    response: serde_json::Value,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ServiceError {
    code: String,
    #[serde(default)]
    message: String,
}

/// Unwrap a response envelope into `T` or a typed service error
pub(crate) fn parse_response<T: DeserializeOwned>(action: &str, body: &str) -> Result<T, ApiError> {
    let decode = |e: serde_json::Error| ApiError::Decode {
        action: action.to_string(),
        message: e.to_string(),
    };

    let envelope: Envelope = serde_json::from_str(body).map_err(decode)?;

    if let Some(error) = envelope.response.get("Error") {
        let error: ServiceError = serde_json::from_value(error.clone()).map_err(decode)?;
        let request_id = envelope
            .response
            .get("RequestId")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        return Err(ApiError::Service {
            code: ErrorCode::parse(&error.code),
            raw_code: error.code,
            message: error.message,
            request_id,
        });
    }

    serde_json::from_value(envelope.response).map_err(decode)
}
