//! Stratus TencentCloud Provider
//!
//! Manages TencentCloud compute instances, CBS disks, and managed Grafana and
//! Prometheus instances through the vendor's signed JSON API.
//!
//! ## Module Structure
//!
//! - `config` - Credentials, region and timeouts
//! - `client` - Signed HTTP client with retrying read/write calls
//! - `sign` - TC3-HMAC-SHA256 request signing
//! - `error` - API error classification
//! - `services` - Per-product API façades and poller refresh functions
//! - `resources` - Resource and data source handlers
//! - `provider` - TencentCloudProvider and dispatch

pub mod client;
pub mod config;
pub mod error;
pub mod logid;
pub mod provider;
pub mod resources;
pub mod services;
pub mod sign;

// Re-export main types
pub use config::{ConfigError, ProviderConfig};
pub use error::{ApiError, ErrorCode};
pub use logid::LogId;
pub use provider::TencentCloudProvider;

use stratus_core::provider::{BoxFuture, Provider, ProviderResult, ResourceType};
use stratus_core::resource::{Resource, ResourceId, State};

use resources::resource_types;

// =============================================================================
// Provider Trait Implementation
// =============================================================================

impl Provider for TencentCloudProvider {
    fn name(&self) -> &'static str {
        "tencentcloud"
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        resource_types()
    }

    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.map(|s| s.to_string());
        Box::pin(async move { self.read_resource(&id, identifier.as_deref()).await })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move { self.create_resource(&resource).await })
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let from = from.clone();
        let to = to.clone();
        Box::pin(async move { self.update_resource(&id, &identifier, &from, &to).await })
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move { self.delete_resource(&id, &identifier).await })
    }

    fn read_data_source(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move { self.query_data_source(&resource).await })
    }
}
