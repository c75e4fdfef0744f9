//! instance - CVM compute instance

use std::collections::HashMap;

use log::info;
use serde::Deserialize;
use stratus_core::differ::changed_attributes;
use stratus_core::provider::ProviderResult;
use stratus_core::resource::{Resource, ResourceId, State, Value};
use stratus_core::sets::{diff_sets, diff_tags};

use super::{
    ValidationError, ValidationResult, finish, require_non_empty, string_list, string_value,
    strings_from, tags_from_attributes, tags_value, without_keys,
};
use crate::logid::LogId;
use crate::provider::{
    TencentCloudProvider, api_error, decode_error, reject_force_new, validation_error, wait_error,
};
use crate::services::Placement;
use crate::services::cvm::{
    Instance, InternetAccessible, LoginSettings, RunInstancesRequest, STATUS_PENDING,
    STATUS_RUNNING, STATUS_SHUTDOWN, STATUS_STARTING, STATUS_STOPPED, STATUS_STOPPING,
    STATUS_TERMINATING, SystemDisk, VirtualPrivateCloud,
};
use crate::services::tag::build_resource_name;

pub const RESOURCE_TYPE: &str = "instance";

const TAG_SERVICE: &str = "cvm";
const TAG_RESOURCE_PREFIX: &str = "instance";

const CHARGE_TYPES: &[&str] = &["POSTPAID_BY_HOUR", "SPOTPAID"];

/// Reads after RunInstances can miss the new instance for a short while
const NOT_FOUND_CHECKS: u32 = 3;

const FORCE_NEW: &[&str] = &[
    "image_id",
    "instance_type",
    "availability_zone",
    "instance_charge_type",
    "vpc_id",
    "subnet_id",
    "system_disk_type",
    "system_disk_size",
    "internet_max_bandwidth_out",
    "allocate_public_ip",
    "key_ids",
];

/// Sent on create, never returned by DescribeInstances
const WRITE_ONLY: &[&str] = &["password", "user_data"];

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstanceConfig {
    pub image_id: String,
    pub instance_type: String,
    pub availability_zone: String,
    #[serde(default)]
    pub instance_name: Option<String>,
    #[serde(default)]
    pub project_id: i64,
    #[serde(default = "default_charge_type")]
    pub instance_charge_type: String,
    #[serde(default)]
    pub vpc_id: Option<String>,
    #[serde(default)]
    pub subnet_id: Option<String>,
    #[serde(default)]
    pub security_groups: Vec<String>,
    #[serde(default = "default_system_disk_type")]
    pub system_disk_type: String,
    #[serde(default = "default_system_disk_size")]
    pub system_disk_size: i64,
    #[serde(default)]
    pub internet_max_bandwidth_out: i64,
    #[serde(default)]
    pub allocate_public_ip: bool,
    #[serde(default)]
    pub key_ids: Vec<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Base64 encoded
    #[serde(default)]
    pub user_data: Option<String>,
    #[serde(default = "default_running_flag")]
    pub running_flag: bool,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

fn default_charge_type() -> String {
    "POSTPAID_BY_HOUR".to_string()
}

fn default_system_disk_type() -> String {
    "CLOUD_PREMIUM".to_string()
}

fn default_system_disk_size() -> i64 {
    50
}

fn default_running_flag() -> bool {
    true
}

impl InstanceConfig {
    pub fn validate(&self) -> ValidationResult {
        let mut errors = Vec::new();

        require_non_empty(&mut errors, "image_id", &self.image_id);
        require_non_empty(&mut errors, "instance_type", &self.instance_type);
        require_non_empty(&mut errors, "availability_zone", &self.availability_zone);

        if let Some(name) = &self.instance_name
            && !(1..=60).contains(&name.chars().count())
        {
            errors.push(ValidationError::new(
                "instance_name",
                "must be between 1 and 60 characters",
            ));
        }

        if !CHARGE_TYPES.contains(&self.instance_charge_type.as_str()) {
            errors.push(ValidationError::new(
                "instance_charge_type",
                format!(
                    "must be one of {}, got {}",
                    CHARGE_TYPES.join(", "),
                    self.instance_charge_type
                ),
            ));
        }

        if self.vpc_id.is_some() != self.subnet_id.is_some() {
            errors.push(ValidationError::new(
                "subnet_id",
                "vpc_id and subnet_id must be set together",
            ));
        }

        if !(20..=1024).contains(&self.system_disk_size) {
            errors.push(ValidationError::new(
                "system_disk_size",
                format!("must be between 20 and 1024, got {}", self.system_disk_size),
            ));
        }

        if self.internet_max_bandwidth_out < 0 {
            errors.push(ValidationError::new(
                "internet_max_bandwidth_out",
                "must not be negative",
            ));
        }

        if self.allocate_public_ip && self.internet_max_bandwidth_out == 0 {
            errors.push(ValidationError::new(
                "allocate_public_ip",
                "requires internet_max_bandwidth_out greater than 0",
            ));
        }

        if self.password.is_some() && !self.key_ids.is_empty() {
            errors.push(ValidationError::new(
                "password",
                "password and key_ids cannot be used together",
            ));
        }

        finish(errors)
    }

    pub fn to_request(&self) -> RunInstancesRequest {
        let login_settings = if self.password.is_some() || !self.key_ids.is_empty() {
            Some(LoginSettings {
                password: self.password.clone(),
                key_ids: (!self.key_ids.is_empty()).then(|| self.key_ids.clone()),
            })
        } else {
            None
        };

        RunInstancesRequest {
            placement: Placement {
                zone: self.availability_zone.clone(),
                project_id: Some(self.project_id),
            },
            image_id: self.image_id.clone(),
            instance_type: self.instance_type.clone(),
            instance_charge_type: self.instance_charge_type.clone(),
            instance_name: self.instance_name.clone(),
            instance_count: 1,
            virtual_private_cloud: match (&self.vpc_id, &self.subnet_id) {
                (Some(vpc_id), Some(subnet_id)) => Some(VirtualPrivateCloud {
                    vpc_id: vpc_id.clone(),
                    subnet_id: subnet_id.clone(),
                }),
                _ => None,
            },
            system_disk: SystemDisk {
                disk_type: Some(self.system_disk_type.clone()),
                disk_size: Some(self.system_disk_size),
            },
            internet_accessible: InternetAccessible {
                internet_max_bandwidth_out: Some(self.internet_max_bandwidth_out),
                public_ip_assigned: Some(self.allocate_public_ip),
            },
            security_group_ids: self.security_groups.clone(),
            login_settings,
            user_data: self.user_data.clone(),
        }
    }
}

/// Map a described instance and its tags onto state attributes
pub(crate) fn instance_attributes(
    instance: &Instance,
    tags: &HashMap<String, String>,
) -> HashMap<String, Value> {
    let mut attributes = HashMap::new();

    attributes.insert("image_id".to_string(), string_value(&instance.image_id));
    attributes.insert("instance_type".to_string(), string_value(&instance.instance_type));
    attributes.insert(
        "availability_zone".to_string(),
        string_value(&instance.placement.zone),
    );
    attributes.insert("instance_name".to_string(), string_value(&instance.instance_name));
    attributes.insert(
        "project_id".to_string(),
        Value::Int(instance.placement.project_id.unwrap_or(0)),
    );
    attributes.insert(
        "instance_charge_type".to_string(),
        string_value(&instance.instance_charge_type),
    );

    let vpc = &instance.virtual_private_cloud;
    if !vpc.vpc_id.is_empty() {
        attributes.insert("vpc_id".to_string(), string_value(&vpc.vpc_id));
        attributes.insert("subnet_id".to_string(), string_value(&vpc.subnet_id));
    }

    let mut security_groups = instance.security_group_ids.clone().unwrap_or_default();
    security_groups.sort();
    attributes.insert("security_groups".to_string(), string_list(&security_groups));

    if let Some(disk_type) = &instance.system_disk.disk_type {
        attributes.insert("system_disk_type".to_string(), string_value(disk_type));
    }
    if let Some(disk_size) = instance.system_disk.disk_size {
        attributes.insert("system_disk_size".to_string(), Value::Int(disk_size));
    }
    attributes.insert(
        "internet_max_bandwidth_out".to_string(),
        Value::Int(
            instance
                .internet_accessible
                .internet_max_bandwidth_out
                .unwrap_or(0),
        ),
    );

    let public_ips = instance.public_ip_addresses.clone().unwrap_or_default();
    attributes.insert(
        "allocate_public_ip".to_string(),
        Value::Bool(!public_ips.is_empty()),
    );
    if let Some(public_ip) = public_ips.first() {
        attributes.insert("public_ip".to_string(), string_value(public_ip));
    }
    if let Some(private_ip) = instance
        .private_ip_addresses
        .as_ref()
        .and_then(|ips| ips.first())
    {
        attributes.insert("private_ip".to_string(), string_value(private_ip));
    }

    if let Some(key_ids) = &instance.login_settings.key_ids {
        attributes.insert("key_ids".to_string(), string_list(key_ids));
    }

    attributes.insert(
        "running_flag".to_string(),
        Value::Bool(instance.instance_state == STATUS_RUNNING),
    );
    attributes.insert(
        "instance_status".to_string(),
        string_value(&instance.instance_state),
    );
    if let Some(created) = &instance.created_time {
        attributes.insert("create_time".to_string(), string_value(created));
    }
    attributes.insert("tags".to_string(), tags_value(tags));

    attributes
}

impl TencentCloudProvider {
    fn instance_resource_name(&self, instance_id: &str) -> String {
        build_resource_name(TAG_SERVICE, TAG_RESOURCE_PREFIX, self.region(), instance_id)
    }

    pub(crate) async fn read_instance(
        &self,
        log_id: &LogId,
        id: &ResourceId,
        instance_id: &str,
    ) -> ProviderResult<State> {
        let instance = match self
            .cvm(log_id)
            .describe_instance_by_id(instance_id)
            .await
            .map_err(|e| api_error(id, "Failed to describe instance", e))?
        {
            Some(instance) => instance,
            None => return Ok(State::not_found(id.clone())),
        };

        let tags = self
            .tag(log_id)
            .describe_resource_tags(TAG_SERVICE, TAG_RESOURCE_PREFIX, self.region(), instance_id)
            .await
            .map_err(|e| api_error(id, "Failed to read instance tags", e))?;

        Ok(State::existing(id.clone(), instance_attributes(&instance, &tags))
            .with_identifier(instance_id))
    }

    pub(crate) async fn create_instance(
        &self,
        log_id: &LogId,
        resource: &Resource,
    ) -> ProviderResult<State> {
        let id = &resource.id;
        let config: InstanceConfig = resource.decode().map_err(|e| decode_error(id, e))?;
        config
            .validate()
            .map_err(|errors| validation_error(id, errors))?;

        let cvm = self.cvm(log_id);
        let instance_id = cvm
            .run_instance(&config.to_request())
            .await
            .map_err(|e| api_error(id, "Failed to launch instance", e))?;
        info!("[{}] Launched instance {} for {}", log_id, instance_id, id);

        // LAUNCH_FAILED and any other undocumented status is fatal here
        self.waiter(&[STATUS_RUNNING], self.config().create_timeout)
            .with_pending([STATUS_PENDING, STATUS_STARTING])
            .with_not_found_checks(NOT_FOUND_CHECKS)
            .strict_statuses()
            .with_description(format!("instance {} to start", instance_id))
            .wait_for(|| cvm.instance_state_refresh(&instance_id))
            .await
            .map_err(|e| wait_error(id, e))?;

        if !config.running_flag {
            self.set_instance_running(log_id, id, &instance_id, false)
                .await?;
        }

        if !config.tags.is_empty() {
            self.tag(log_id)
                .modify_tags(
                    &self.instance_resource_name(&instance_id),
                    &diff_tags(&HashMap::new(), &config.tags),
                )
                .await
                .map_err(|e| api_error(id, "Failed to tag instance", e))?;
        }

        self.read_instance(log_id, id, &instance_id).await
    }

    /// Start or stop an instance and wait for it to settle
    async fn set_instance_running(
        &self,
        log_id: &LogId,
        id: &ResourceId,
        instance_id: &str,
        running: bool,
    ) -> ProviderResult<()> {
        let cvm = self.cvm(log_id);

        let (target, pending) = if running {
            cvm.start_instance(instance_id)
                .await
                .map_err(|e| api_error(id, "Failed to start instance", e))?;
            (STATUS_RUNNING, [STATUS_STOPPED, STATUS_STARTING])
        } else {
            cvm.stop_instance(instance_id)
                .await
                .map_err(|e| api_error(id, "Failed to stop instance", e))?;
            (STATUS_STOPPED, [STATUS_RUNNING, STATUS_STOPPING])
        };

        self.waiter(&[target], self.config().update_timeout)
            .with_pending(pending)
            .with_description(format!("instance {} to become {}", instance_id, target))
            .wait_for(|| cvm.instance_state_refresh(instance_id))
            .await
            .map_err(|e| wait_error(id, e))?;
        Ok(())
    }

    pub(crate) async fn update_instance(
        &self,
        log_id: &LogId,
        id: &ResourceId,
        instance_id: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        let config: InstanceConfig = to.decode().map_err(|e| decode_error(id, e))?;
        config
            .validate()
            .map_err(|errors| validation_error(id, errors))?;

        let changed = without_keys(
            changed_attributes(&to.attributes, &from.attributes),
            WRITE_ONLY,
        );
        reject_force_new(id, &changed, FORCE_NEW)?;
        let has_change = |key: &str| changed.iter().any(|c| c == key);

        let cvm = self.cvm(log_id);

        if has_change("instance_name")
            && let Some(name) = &config.instance_name
        {
            cvm.modify_instance_name(instance_id, name)
                .await
                .map_err(|e| api_error(id, "Failed to rename instance", e))?;
        }

        if has_change("security_groups") {
            let current = strings_from(from.attribute("security_groups"));
            if !diff_sets(current, config.security_groups.clone()).is_empty() {
                cvm.modify_security_groups(instance_id, &config.security_groups)
                    .await
                    .map_err(|e| api_error(id, "Failed to update security groups", e))?;
            }
        }

        if has_change("project_id") {
            cvm.modify_project(instance_id, config.project_id)
                .await
                .map_err(|e| api_error(id, "Failed to move instance to project", e))?;
        }

        if has_change("running_flag") {
            self.set_instance_running(log_id, id, instance_id, config.running_flag)
                .await?;
        }

        if has_change("tags") {
            let diff = diff_tags(&tags_from_attributes(&from.attributes), &config.tags);
            self.tag(log_id)
                .modify_tags(&self.instance_resource_name(instance_id), &diff)
                .await
                .map_err(|e| api_error(id, "Failed to update instance tags", e))?;
        }

        self.read_instance(log_id, id, instance_id).await
    }

    pub(crate) async fn delete_instance(
        &self,
        log_id: &LogId,
        id: &ResourceId,
        instance_id: &str,
    ) -> ProviderResult<()> {
        let cvm = self.cvm(log_id);

        match cvm.terminate_instance(instance_id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(api_error(id, "Failed to terminate instance", e)),
        }

        self.waiter(&[STATUS_SHUTDOWN], self.config().delete_timeout)
            .with_pending([
                STATUS_TERMINATING,
                STATUS_RUNNING,
                STATUS_STOPPED,
                STATUS_STOPPING,
            ])
            .accept_gone()
            .with_description(format!("instance {} to terminate", instance_id))
            .wait_for(|| cvm.instance_state_refresh(instance_id))
            .await
            .map_err(|e| wait_error(id, e))?;

        info!("[{}] Terminated instance {}", log_id, instance_id);
        Ok(())
    }
}
