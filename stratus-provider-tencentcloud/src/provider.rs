//! TencentCloudProvider - Shared state and helpers for the resource handlers

use std::sync::Arc;
use std::time::Duration;

use log::info;
use stratus_core::provider::{ProviderError, ProviderResult};
use stratus_core::resource::{Resource, ResourceId, State};
use stratus_core::waiter::{StateWaiter, WaitError};
use tokio_util::sync::CancellationToken;

use crate::client::Client;
use crate::config::{ConfigError, ProviderConfig};
use crate::error::ApiError;
use crate::logid::LogId;
use crate::resources::{
    ValidationError, cbs_storage, data_sources, instance, monitor_grafana_instance,
    monitor_tmp_instance,
};
use crate::services::{CbsService, CvmService, MonitorService, TagService};

pub struct TencentCloudProvider {
    client: Arc<Client>,
    config: ProviderConfig,
    cancel: CancellationToken,
}

impl TencentCloudProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ConfigError> {
        let client = Client::new(&config)?;
        Ok(Self {
            client: Arc::new(client),
            config,
            cancel: CancellationToken::new(),
        })
    }

    /// Load the configuration from `TENCENTCLOUD_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::new(ProviderConfig::from_env()?)
    }

    /// Cancelling `token` stops every wait this provider is running
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn region(&self) -> &str {
        self.client.region()
    }

    pub(crate) fn cvm(&self, log_id: &LogId) -> CvmService {
        CvmService::new(self.client.clone(), log_id.clone())
    }

    pub(crate) fn cbs(&self, log_id: &LogId) -> CbsService {
        CbsService::new(self.client.clone(), log_id.clone())
    }

    pub(crate) fn monitor(&self, log_id: &LogId) -> MonitorService {
        MonitorService::new(self.client.clone(), log_id.clone())
    }

    pub(crate) fn tag(&self, log_id: &LogId) -> TagService {
        TagService::new(self.client.clone(), log_id.clone())
    }

    /// A waiter using the configured poll interval and this provider's cancellation token
    pub(crate) fn waiter(&self, target: &[&str], timeout: Duration) -> StateWaiter {
        StateWaiter::new(target.iter().copied(), timeout, self.config.poll_interval)
            .with_cancellation(self.cancel.clone())
    }

    /// Read a resource by its cloud-side identifier
    pub async fn read_resource(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> ProviderResult<State> {
        let Some(identifier) = identifier else {
            return Ok(State::not_found(id.clone()));
        };
        let log_id = LogId::new();

        match id.resource_type.as_str() {
            instance::RESOURCE_TYPE => self.read_instance(&log_id, id, identifier).await,
            cbs_storage::RESOURCE_TYPE => self.read_cbs_storage(&log_id, id, identifier).await,
            monitor_grafana_instance::RESOURCE_TYPE => {
                self.read_grafana_instance(&log_id, id, identifier).await
            }
            monitor_tmp_instance::RESOURCE_TYPE => {
                self.read_tmp_instance(&log_id, id, identifier).await
            }
            _ => Err(unknown_type(id)),
        }
    }

    pub async fn create_resource(&self, resource: &Resource) -> ProviderResult<State> {
        let log_id = LogId::new();
        info!("[{}] Creating {}", log_id, resource.id);

        match resource.id.resource_type.as_str() {
            instance::RESOURCE_TYPE => self.create_instance(&log_id, resource).await,
            cbs_storage::RESOURCE_TYPE => self.create_cbs_storage(&log_id, resource).await,
            monitor_grafana_instance::RESOURCE_TYPE => {
                self.create_grafana_instance(&log_id, resource).await
            }
            monitor_tmp_instance::RESOURCE_TYPE => {
                self.create_tmp_instance(&log_id, resource).await
            }
            _ => Err(unknown_type(&resource.id)),
        }
    }

    pub async fn update_resource(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        let log_id = LogId::new();
        info!("[{}] Updating {} ({})", log_id, id, identifier);

        match id.resource_type.as_str() {
            instance::RESOURCE_TYPE => {
                self.update_instance(&log_id, id, identifier, from, to).await
            }
            cbs_storage::RESOURCE_TYPE => {
                self.update_cbs_storage(&log_id, id, identifier, from, to)
                    .await
            }
            monitor_grafana_instance::RESOURCE_TYPE => {
                self.update_grafana_instance(&log_id, id, identifier, from, to)
                    .await
            }
            monitor_tmp_instance::RESOURCE_TYPE => {
                self.update_tmp_instance(&log_id, id, identifier, from, to)
                    .await
            }
            _ => Err(unknown_type(id)),
        }
    }

    pub async fn delete_resource(&self, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let log_id = LogId::new();
        info!("[{}] Deleting {} ({})", log_id, id, identifier);

        match id.resource_type.as_str() {
            instance::RESOURCE_TYPE => self.delete_instance(&log_id, id, identifier).await,
            cbs_storage::RESOURCE_TYPE => self.delete_cbs_storage(&log_id, id, identifier).await,
            monitor_grafana_instance::RESOURCE_TYPE => {
                self.delete_grafana_instance(&log_id, id, identifier).await
            }
            monitor_tmp_instance::RESOURCE_TYPE => {
                self.delete_tmp_instance(&log_id, id, identifier).await
            }
            _ => Err(unknown_type(id)),
        }
    }

    pub async fn query_data_source(&self, resource: &Resource) -> ProviderResult<State> {
        let log_id = LogId::new();

        match resource.id.resource_type.as_str() {
            data_sources::INSTANCES => self.read_instances(&log_id, resource).await,
            data_sources::MONITOR_TMP_INSTANCES => {
                self.read_tmp_instances(&log_id, resource).await
            }
            _ => Err(ProviderError::new(format!(
                "Data source not supported: {}",
                resource.id.resource_type
            ))
            .for_resource(resource.id.clone())),
        }
    }
}

fn unknown_type(id: &ResourceId) -> ProviderError {
    ProviderError::new(format!("Unknown resource type: {}", id.resource_type))
        .for_resource(id.clone())
}

/// Wrap an API failure for the resource `id`
pub(crate) fn api_error(id: &ResourceId, context: &str, e: ApiError) -> ProviderError {
    ProviderError::new(format!("{}: {}", context, e))
        .for_resource(id.clone())
        .with_cause(e)
}

/// Wrap a failed wait. Timeouts leave the operation running on the vendor side.
pub(crate) fn wait_error(id: &ResourceId, e: WaitError<ApiError>) -> ProviderError {
    let message = match &e {
        WaitError::Timeout {
            description,
            timeout,
            last_status,
        } => format!(
            "{} is still in progress after {:?} (last status: {})",
            description,
            timeout,
            last_status.as_deref().unwrap_or("unknown")
        ),
        WaitError::Fatal {
            description,
            failure,
        } => format!("operation failed while waiting for {}: {}", description, failure),
        WaitError::Config(config) => format!("invalid wait configuration: {}", config),
    };
    ProviderError::new(message).for_resource(id.clone()).with_cause(e)
}

/// Report every configuration violation at once
pub(crate) fn validation_error(id: &ResourceId, errors: Vec<ValidationError>) -> ProviderError {
    let details: Vec<String> = errors.iter().map(ToString::to_string).collect();
    ProviderError::new(format!("Invalid configuration: {}", details.join("; ")))
        .for_resource(id.clone())
}

/// The configuration does not decode into the typed struct
pub(crate) fn decode_error(id: &ResourceId, e: serde_json::Error) -> ProviderError {
    ProviderError::new(format!("Invalid configuration: {}", e))
        .for_resource(id.clone())
        .with_cause(e)
}

/// Reject changes to attributes that require replacing the resource
pub(crate) fn reject_force_new(
    id: &ResourceId,
    changed: &[String],
    force_new: &[&str],
) -> Result<(), ProviderError> {
    let blocked = stratus_core::differ::changed_among(changed, force_new);
    if blocked.is_empty() {
        Ok(())
    } else {
        Err(ProviderError::new(format!(
            "Cannot update {} in place; the resource must be replaced",
            blocked.join(", ")
        ))
        .for_resource(id.clone()))
    }
}
