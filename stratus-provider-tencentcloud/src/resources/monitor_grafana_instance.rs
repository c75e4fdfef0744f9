//! monitor_grafana_instance - Managed Grafana instance

use std::collections::HashMap;

use log::info;
use serde::Deserialize;
use stratus_core::differ::changed_attributes;
use stratus_core::provider::ProviderResult;
use stratus_core::resource::{Resource, ResourceId, State, Value};
use stratus_core::sets::diff_tags;

use super::{
    ValidationError, ValidationResult, finish, require_non_empty, string_list, string_value,
    tags_from_attributes, tags_value, without_keys,
};
use crate::logid::LogId;
use crate::provider::{
    TencentCloudProvider, api_error, decode_error, reject_force_new, validation_error, wait_error,
};
use crate::services::monitor::{
    CreateGrafanaInstanceRequest, GrafanaInstance, STATUS_CREATING, STATUS_DELETED,
    STATUS_DESTROYING, STATUS_ISOLATED, STATUS_RUNNING, status_label,
};
use crate::services::tag::build_resource_name;

pub const RESOURCE_TYPE: &str = "monitor_grafana_instance";

const TAG_SERVICE: &str = "monitor";
const TAG_RESOURCE_PREFIX: &str = "grafana-instance";

const FORCE_NEW: &[&str] = &["vpc_id", "subnet_ids", "enable_internet"];
const WRITE_ONLY: &[&str] = &["grafana_init_password"];

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GrafanaInstanceConfig {
    pub instance_name: String,
    pub vpc_id: String,
    pub subnet_ids: Vec<String>,
    pub grafana_init_password: String,
    #[serde(default)]
    pub enable_internet: bool,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl GrafanaInstanceConfig {
    pub fn validate(&self) -> ValidationResult {
        let mut errors = Vec::new();

        require_non_empty(&mut errors, "instance_name", &self.instance_name);
        require_non_empty(&mut errors, "vpc_id", &self.vpc_id);
        if self.subnet_ids.is_empty() {
            errors.push(ValidationError::new(
                "subnet_ids",
                "at least one subnet is required",
            ));
        }
        if self.grafana_init_password.chars().count() < 8 {
            errors.push(ValidationError::new(
                "grafana_init_password",
                "must be at least 8 characters",
            ));
        }

        finish(errors)
    }

    pub fn to_request(&self) -> CreateGrafanaInstanceRequest {
        CreateGrafanaInstanceRequest {
            instance_name: self.instance_name.clone(),
            vpc_id: self.vpc_id.clone(),
            subnet_ids: self.subnet_ids.clone(),
            grafana_init_password: self.grafana_init_password.clone(),
            enable_internet: self.enable_internet,
        }
    }
}

fn grafana_attributes(
    instance: &GrafanaInstance,
    tags: &HashMap<String, String>,
) -> HashMap<String, Value> {
    let mut attributes = HashMap::new();

    attributes.insert("instance_name".to_string(), string_value(&instance.instance_name));
    attributes.insert("vpc_id".to_string(), string_value(&instance.vpc_id));
    if let Some(subnet_ids) = &instance.subnet_ids {
        attributes.insert("subnet_ids".to_string(), string_list(subnet_ids));
    }
    if let Some(enable_internet) = instance.enable_internet {
        attributes.insert("enable_internet".to_string(), Value::Bool(enable_internet));
    }
    for (key, url) in [
        ("internet_url", &instance.internet_url),
        ("internal_url", &instance.internal_url),
        ("root_url", &instance.root_url),
    ] {
        if let Some(url) = url {
            attributes.insert(key.to_string(), string_value(url));
        }
    }
    attributes.insert(
        "instance_status".to_string(),
        Value::Int(instance.instance_status),
    );
    attributes.insert("tags".to_string(), tags_value(tags));

    attributes
}

impl TencentCloudProvider {
    fn grafana_resource_name(&self, instance_id: &str) -> String {
        build_resource_name(TAG_SERVICE, TAG_RESOURCE_PREFIX, self.region(), instance_id)
    }

    pub(crate) async fn read_grafana_instance(
        &self,
        log_id: &LogId,
        id: &ResourceId,
        instance_id: &str,
    ) -> ProviderResult<State> {
        let instance = match self
            .monitor(log_id)
            .describe_grafana_instance_by_id(instance_id)
            .await
            .map_err(|e| api_error(id, "Failed to describe Grafana instance", e))?
        {
            // Deleted instances stay listed for a while
            Some(instance) if instance.instance_status != STATUS_DELETED => instance,
            _ => return Ok(State::not_found(id.clone())),
        };

        let tags = self
            .tag(log_id)
            .describe_resource_tags(TAG_SERVICE, TAG_RESOURCE_PREFIX, self.region(), instance_id)
            .await
            .map_err(|e| api_error(id, "Failed to read Grafana instance tags", e))?;

        Ok(
            State::existing(id.clone(), grafana_attributes(&instance, &tags))
                .with_identifier(instance_id),
        )
    }

    pub(crate) async fn create_grafana_instance(
        &self,
        log_id: &LogId,
        resource: &Resource,
    ) -> ProviderResult<State> {
        let id = &resource.id;
        let config: GrafanaInstanceConfig = resource.decode().map_err(|e| decode_error(id, e))?;
        config
            .validate()
            .map_err(|errors| validation_error(id, errors))?;

        let monitor = self.monitor(log_id);
        let instance_id = monitor
            .create_grafana_instance(&config.to_request())
            .await
            .map_err(|e| api_error(id, "Failed to create Grafana instance", e))?;
        info!(
            "[{}] Created Grafana instance {} for {}",
            log_id, instance_id, id
        );

        let running = status_label(STATUS_RUNNING);
        let creating = status_label(STATUS_CREATING);
        self.waiter(&[running.as_str()], self.config().create_timeout)
            .with_pending([creating])
            .strict_statuses()
            .with_description(format!("Grafana instance {} to start", instance_id))
            .wait_for(|| monitor.grafana_state_refresh(&instance_id))
            .await
            .map_err(|e| wait_error(id, e))?;

        if !config.tags.is_empty() {
            self.tag(log_id)
                .modify_tags(
                    &self.grafana_resource_name(&instance_id),
                    &diff_tags(&HashMap::new(), &config.tags),
                )
                .await
                .map_err(|e| api_error(id, "Failed to tag Grafana instance", e))?;
        }

        self.read_grafana_instance(log_id, id, &instance_id).await
    }

    pub(crate) async fn update_grafana_instance(
        &self,
        log_id: &LogId,
        id: &ResourceId,
        instance_id: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        let config: GrafanaInstanceConfig = to.decode().map_err(|e| decode_error(id, e))?;
        config
            .validate()
            .map_err(|errors| validation_error(id, errors))?;

        let changed = without_keys(
            changed_attributes(&to.attributes, &from.attributes),
            WRITE_ONLY,
        );
        reject_force_new(id, &changed, FORCE_NEW)?;

        if changed.iter().any(|c| c == "instance_name") {
            self.monitor(log_id)
                .modify_grafana_instance_name(instance_id, &config.instance_name)
                .await
                .map_err(|e| api_error(id, "Failed to rename Grafana instance", e))?;
        }

        if changed.iter().any(|c| c == "tags") {
            let diff = diff_tags(&tags_from_attributes(&from.attributes), &config.tags);
            self.tag(log_id)
                .modify_tags(&self.grafana_resource_name(instance_id), &diff)
                .await
                .map_err(|e| api_error(id, "Failed to update Grafana instance tags", e))?;
        }

        self.read_grafana_instance(log_id, id, instance_id).await
    }

    /// Deleting isolates the instance first; cleaning removes it.
    pub(crate) async fn delete_grafana_instance(
        &self,
        log_id: &LogId,
        id: &ResourceId,
        instance_id: &str,
    ) -> ProviderResult<()> {
        let monitor = self.monitor(log_id);

        match monitor.delete_grafana_instance(instance_id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(api_error(id, "Failed to delete Grafana instance", e)),
        }

        let isolated = status_label(STATUS_ISOLATED);
        let deleted = status_label(STATUS_DELETED);
        let instance = self
            .waiter(&[isolated.as_str(), deleted.as_str()], self.config().delete_timeout)
            .with_pending([status_label(STATUS_RUNNING), status_label(STATUS_DESTROYING)])
            .accept_gone()
            .with_description(format!("Grafana instance {} to be isolated", instance_id))
            .wait_for(|| monitor.grafana_state_refresh(instance_id))
            .await
            .map_err(|e| wait_error(id, e))?;

        if instance.is_some_and(|i| i.instance_status == STATUS_ISOLATED) {
            match monitor.clean_grafana_instance(instance_id).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => return Ok(()),
                Err(e) => return Err(api_error(id, "Failed to clean Grafana instance", e)),
            }

            self.waiter(&[deleted.as_str()], self.config().delete_timeout)
                .with_pending([isolated, status_label(STATUS_DESTROYING)])
                .accept_gone()
                .with_description(format!("Grafana instance {} to be cleaned", instance_id))
                .wait_for(|| monitor.grafana_state_refresh(instance_id))
                .await
                .map_err(|e| wait_error(id, e))?;
        }

        info!("[{}] Deleted Grafana instance {}", log_id, instance_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GrafanaInstanceConfig {
        GrafanaInstanceConfig {
            instance_name: "dashboards".to_string(),
            vpc_id: "vpc-1".to_string(),
            subnet_ids: vec!["subnet-1".to_string()],
            grafana_init_password: "Passw0rd!".to_string(),
            enable_internet: false,
            tags: HashMap::new(),
        }
    }

    #[test]
    fn valid_config() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn missing_subnets_and_short_password() {
        let mut config = config();
        config.subnet_ids.clear();
        config.grafana_init_password = "short".to_string();
        let paths: Vec<String> = config
            .validate()
            .unwrap_err()
            .into_iter()
            .map(|e| e.path)
            .collect();
        assert_eq!(paths, vec!["subnet_ids", "grafana_init_password"]);
    }

    #[test]
    fn password_never_reaches_state() {
        let instance = GrafanaInstance {
            instance_id: "grafana-1".to_string(),
            instance_name: "dashboards".to_string(),
            vpc_id: "vpc-1".to_string(),
            internal_url: Some("http://10.0.0.5".to_string()),
            instance_status: STATUS_RUNNING,
            ..Default::default()
        };
        let attributes = grafana_attributes(&instance, &HashMap::new());
        assert!(!attributes.contains_key("grafana_init_password"));
        assert_eq!(attributes["internal_url"], string_value("http://10.0.0.5"));
        assert_eq!(attributes["instance_status"], Value::Int(2));
        assert!(!attributes.contains_key("internet_url"));
    }
}
