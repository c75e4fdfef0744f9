//! monitor_tmp_instance - Managed Prometheus (TMP) instance

use std::collections::HashMap;

use log::info;
use serde::Deserialize;
use stratus_core::differ::changed_attributes;
use stratus_core::provider::ProviderResult;
use stratus_core::resource::{Resource, ResourceId, State, Value};
use stratus_core::sets::diff_tags;

use super::{
    ValidationError, ValidationResult, finish, require_non_empty, string_value,
    tags_from_attributes, tags_value,
};
use crate::logid::LogId;
use crate::provider::{
    TencentCloudProvider, api_error, decode_error, reject_force_new, validation_error, wait_error,
};
use crate::services::monitor::{
    CreatePrometheusInstanceRequest, PrometheusInstance, STATUS_CREATING, STATUS_DELETED,
    STATUS_DESTROYING, STATUS_ISOLATED, STATUS_RUNNING, status_label,
};
use crate::services::tag::build_resource_name;

pub const RESOURCE_TYPE: &str = "monitor_tmp_instance";

const TAG_SERVICE: &str = "monitor";
const TAG_RESOURCE_PREFIX: &str = "prom-instance";

/// Days
const RETENTION_PERIODS: &[i64] = &[15, 30, 45, 90, 180, 360, 720];

const FORCE_NEW: &[&str] = &["vpc_id", "subnet_id", "zone", "grafana_instance_id"];

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TmpInstanceConfig {
    pub instance_name: String,
    pub vpc_id: String,
    pub subnet_id: String,
    pub zone: String,
    /// Days
    pub data_retention_time: i64,
    #[serde(default)]
    pub grafana_instance_id: Option<String>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl TmpInstanceConfig {
    pub fn validate(&self) -> ValidationResult {
        let mut errors = Vec::new();

        require_non_empty(&mut errors, "instance_name", &self.instance_name);
        require_non_empty(&mut errors, "vpc_id", &self.vpc_id);
        require_non_empty(&mut errors, "subnet_id", &self.subnet_id);
        require_non_empty(&mut errors, "zone", &self.zone);

        if !RETENTION_PERIODS.contains(&self.data_retention_time) {
            let allowed: Vec<String> = RETENTION_PERIODS.iter().map(ToString::to_string).collect();
            errors.push(ValidationError::new(
                "data_retention_time",
                format!(
                    "must be one of {}, got {}",
                    allowed.join(", "),
                    self.data_retention_time
                ),
            ));
        }

        finish(errors)
    }

    pub fn to_request(&self) -> CreatePrometheusInstanceRequest {
        CreatePrometheusInstanceRequest {
            instance_name: self.instance_name.clone(),
            vpc_id: self.vpc_id.clone(),
            subnet_id: self.subnet_id.clone(),
            data_retention_time: self.data_retention_time,
            zone: self.zone.clone(),
            grafana_instance_id: self.grafana_instance_id.clone(),
        }
    }
}

pub(crate) fn tmp_attributes(
    instance: &PrometheusInstance,
    tags: &HashMap<String, String>,
) -> HashMap<String, Value> {
    let mut attributes = HashMap::new();

    attributes.insert("instance_id".to_string(), string_value(&instance.instance_id));
    attributes.insert("instance_name".to_string(), string_value(&instance.instance_name));
    attributes.insert("vpc_id".to_string(), string_value(&instance.vpc_id));
    attributes.insert("subnet_id".to_string(), string_value(&instance.subnet_id));
    attributes.insert("zone".to_string(), string_value(&instance.zone));
    attributes.insert(
        "data_retention_time".to_string(),
        Value::Int(instance.data_retention_time),
    );
    attributes.insert(
        "instance_status".to_string(),
        Value::Int(instance.instance_status),
    );
    for (key, value) in [
        ("grafana_instance_id", &instance.grafana_instance_id),
        ("grafana_url", &instance.grafana_url),
        ("ipv4_address", &instance.ipv4_address),
        ("remote_write", &instance.remote_write),
        ("api_root_path", &instance.api_root_path),
        ("proxy_address", &instance.proxy_address),
        ("created_at", &instance.created_at),
    ] {
        if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
            attributes.insert(key.to_string(), string_value(value));
        }
    }
    attributes.insert("tags".to_string(), tags_value(tags));

    attributes
}

impl TencentCloudProvider {
    fn tmp_resource_name(&self, instance_id: &str) -> String {
        build_resource_name(TAG_SERVICE, TAG_RESOURCE_PREFIX, self.region(), instance_id)
    }

    pub(crate) async fn read_tmp_instance(
        &self,
        log_id: &LogId,
        id: &ResourceId,
        instance_id: &str,
    ) -> ProviderResult<State> {
        let instance = match self
            .monitor(log_id)
            .describe_tmp_instance_by_id(instance_id)
            .await
            .map_err(|e| api_error(id, "Failed to describe Prometheus instance", e))?
        {
            Some(instance) if instance.instance_status != STATUS_DELETED => instance,
            _ => return Ok(State::not_found(id.clone())),
        };

        let tags = self
            .tag(log_id)
            .describe_resource_tags(TAG_SERVICE, TAG_RESOURCE_PREFIX, self.region(), instance_id)
            .await
            .map_err(|e| api_error(id, "Failed to read Prometheus instance tags", e))?;

        Ok(State::existing(id.clone(), tmp_attributes(&instance, &tags)).with_identifier(instance_id))
    }

    pub(crate) async fn create_tmp_instance(
        &self,
        log_id: &LogId,
        resource: &Resource,
    ) -> ProviderResult<State> {
        let id = &resource.id;
        let config: TmpInstanceConfig = resource.decode().map_err(|e| decode_error(id, e))?;
        config
            .validate()
            .map_err(|errors| validation_error(id, errors))?;

        let monitor = self.monitor(log_id);
        let instance_id = monitor
            .create_tmp_instance(&config.to_request())
            .await
            .map_err(|e| api_error(id, "Failed to create Prometheus instance", e))?;
        info!(
            "[{}] Created Prometheus instance {} for {}",
            log_id, instance_id, id
        );

        let running = status_label(STATUS_RUNNING);
        self.waiter(&[running.as_str()], self.config().create_timeout)
            .with_pending([status_label(STATUS_CREATING)])
            .strict_statuses()
            .with_description(format!("Prometheus instance {} to start", instance_id))
            .wait_for(|| monitor.tmp_state_refresh(&instance_id))
            .await
            .map_err(|e| wait_error(id, e))?;

        if !config.tags.is_empty() {
            self.tag(log_id)
                .modify_tags(
                    &self.tmp_resource_name(&instance_id),
                    &diff_tags(&HashMap::new(), &config.tags),
                )
                .await
                .map_err(|e| api_error(id, "Failed to tag Prometheus instance", e))?;
        }

        self.read_tmp_instance(log_id, id, &instance_id).await
    }

    pub(crate) async fn update_tmp_instance(
        &self,
        log_id: &LogId,
        id: &ResourceId,
        instance_id: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        let config: TmpInstanceConfig = to.decode().map_err(|e| decode_error(id, e))?;
        config
            .validate()
            .map_err(|errors| validation_error(id, errors))?;

        let changed = changed_attributes(&to.attributes, &from.attributes);
        reject_force_new(id, &changed, FORCE_NEW)?;
        let has_change = |key: &str| changed.iter().any(|c| c == key);

        let name = has_change("instance_name").then_some(config.instance_name.as_str());
        let retention = has_change("data_retention_time").then_some(config.data_retention_time);
        if name.is_some() || retention.is_some() {
            self.monitor(log_id)
                .modify_tmp_instance(instance_id, name, retention)
                .await
                .map_err(|e| api_error(id, "Failed to modify Prometheus instance", e))?;
        }

        if has_change("tags") {
            let diff = diff_tags(&tags_from_attributes(&from.attributes), &config.tags);
            self.tag(log_id)
                .modify_tags(&self.tmp_resource_name(instance_id), &diff)
                .await
                .map_err(|e| api_error(id, "Failed to update Prometheus instance tags", e))?;
        }

        self.read_tmp_instance(log_id, id, instance_id).await
    }

    /// Terminating isolates the instance; destroying removes it.
    pub(crate) async fn delete_tmp_instance(
        &self,
        log_id: &LogId,
        id: &ResourceId,
        instance_id: &str,
    ) -> ProviderResult<()> {
        let monitor = self.monitor(log_id);

        match monitor.terminate_tmp_instance(instance_id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(api_error(id, "Failed to terminate Prometheus instance", e)),
        }

        let isolated = status_label(STATUS_ISOLATED);
        let deleted = status_label(STATUS_DELETED);
        let instance = self
            .waiter(&[isolated.as_str(), deleted.as_str()], self.config().delete_timeout)
            .with_pending([status_label(STATUS_RUNNING), status_label(STATUS_DESTROYING)])
            .accept_gone()
            .with_description(format!("Prometheus instance {} to be isolated", instance_id))
            .wait_for(|| monitor.tmp_state_refresh(instance_id))
            .await
            .map_err(|e| wait_error(id, e))?;

        if instance.is_some_and(|i| i.instance_status == STATUS_ISOLATED) {
            match monitor.destroy_tmp_instance(instance_id).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => return Ok(()),
                Err(e) => return Err(api_error(id, "Failed to destroy Prometheus instance", e)),
            }

            self.waiter(&[deleted.as_str()], self.config().delete_timeout)
                .with_pending([isolated, status_label(STATUS_DESTROYING)])
                .accept_gone()
                .with_description(format!("Prometheus instance {} to be destroyed", instance_id))
                .wait_for(|| monitor.tmp_state_refresh(instance_id))
                .await
                .map_err(|e| wait_error(id, e))?;
        }

        info!("[{}] Deleted Prometheus instance {}", log_id, instance_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TmpInstanceConfig {
        TmpInstanceConfig {
            instance_name: "metrics".to_string(),
            vpc_id: "vpc-1".to_string(),
            subnet_id: "subnet-1".to_string(),
            zone: "ap-guangzhou-3".to_string(),
            data_retention_time: 30,
            grafana_instance_id: None,
            tags: HashMap::new(),
        }
    }

    #[test]
    fn retention_must_be_a_supported_period() {
        assert!(config().validate().is_ok());

        let mut config = config();
        config.data_retention_time = 60;
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].to_string(),
            "data_retention_time: must be one of 15, 30, 45, 90, 180, 360, 720, got 60"
        );
    }

    #[test]
    fn request_links_grafana() {
        let mut config = config();
        config.grafana_instance_id = Some("grafana-1".to_string());
        let request = config.to_request();
        assert_eq!(request.grafana_instance_id.as_deref(), Some("grafana-1"));
        assert_eq!(request.data_retention_time, 30);
    }

    #[test]
    fn attributes_skip_empty_endpoints() {
        let instance = PrometheusInstance {
            instance_id: "prom-1".to_string(),
            instance_name: "metrics".to_string(),
            data_retention_time: 30,
            instance_status: STATUS_RUNNING,
            ipv4_address: Some("10.0.0.9".to_string()),
            grafana_url: Some(String::new()),
            ..Default::default()
        };
        let attributes = tmp_attributes(&instance, &HashMap::new());
        assert_eq!(attributes["ipv4_address"], string_value("10.0.0.9"));
        assert!(!attributes.contains_key("grafana_url"));
        assert_eq!(attributes["data_retention_time"], Value::Int(30));
    }
}
