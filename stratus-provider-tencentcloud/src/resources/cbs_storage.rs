//! cbs_storage - CBS cloud block storage disk

use std::collections::HashMap;

use log::info;
use serde::Deserialize;
use stratus_core::differ::changed_attributes;
use stratus_core::provider::{ProviderError, ProviderResult};
use stratus_core::resource::{Resource, ResourceId, State, Value};
use stratus_core::sets::diff_tags;

use super::{
    ValidationError, ValidationResult, finish, string_value, tags_from_attributes, tags_value,
    without_keys,
};
use crate::logid::LogId;
use crate::provider::{
    TencentCloudProvider, api_error, decode_error, reject_force_new, validation_error, wait_error,
};
use crate::services::Placement;
use crate::services::cbs::{
    CHARGE_POSTPAID, CHARGE_PREPAID, CreateDisksRequest, Disk, DiskChargePrepaid,
    STATUS_ATTACHED, STATUS_EXPANDING, STATUS_TORECYCLE, STATUS_UNATTACHED,
};
use crate::services::tag::build_resource_name;

pub const RESOURCE_TYPE: &str = "cbs_storage";

const TAG_SERVICE: &str = "cvm";
const TAG_RESOURCE_PREFIX: &str = "volume";

const STORAGE_TYPES: &[&str] = &[
    "CLOUD_BASIC",
    "CLOUD_PREMIUM",
    "CLOUD_SSD",
    "CLOUD_HSSD",
    "CLOUD_TSSD",
];
const PREPAID_PERIODS: &[u32] = &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 24, 36];
const RENEW_FLAGS: &[&str] = &[
    "NOTIFY_AND_AUTO_RENEW",
    "NOTIFY_AND_MANUAL_RENEW",
    "DISABLE_NOTIFY_AND_MANUAL_RENEW",
];

const NOT_FOUND_CHECKS: u32 = 3;

const FORCE_NEW: &[&str] = &["storage_type", "availability_zone", "encrypt", "snapshot_id"];

/// Create-time inputs that DescribeDisks does not echo back
const WRITE_ONLY: &[&str] = &["snapshot_id", "prepaid_period"];

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CbsStorageConfig {
    pub storage_type: String,
    /// GB
    pub storage_size: i64,
    pub availability_zone: String,
    pub storage_name: String,
    #[serde(default)]
    pub project_id: i64,
    #[serde(default)]
    pub encrypt: bool,
    #[serde(default)]
    pub snapshot_id: Option<String>,
    #[serde(default)]
    pub throughput_performance: Option<i64>,
    #[serde(default = "default_charge_type")]
    pub charge_type: String,
    /// Months, required for PREPAID
    #[serde(default)]
    pub prepaid_period: Option<u32>,
    #[serde(default)]
    pub prepaid_renew_flag: Option<String>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

fn default_charge_type() -> String {
    CHARGE_POSTPAID.to_string()
}

impl CbsStorageConfig {
    pub fn validate(&self) -> ValidationResult {
        let mut errors = Vec::new();

        if !STORAGE_TYPES.contains(&self.storage_type.as_str()) {
            errors.push(ValidationError::new(
                "storage_type",
                format!(
                    "must be one of {}, got {}",
                    STORAGE_TYPES.join(", "),
                    self.storage_type
                ),
            ));
        }

        if !(10..=32000).contains(&self.storage_size) {
            errors.push(ValidationError::new(
                "storage_size",
                format!("must be between 10 and 32000, got {}", self.storage_size),
            ));
        }

        if self.availability_zone.trim().is_empty() {
            errors.push(ValidationError::new("availability_zone", "must not be empty"));
        }

        let name_len = self.storage_name.chars().count();
        if !(2..=60).contains(&name_len) {
            errors.push(ValidationError::new(
                "storage_name",
                format!("must be between 2 and 60 characters, got {}", name_len),
            ));
        }

        match self.charge_type.as_str() {
            CHARGE_POSTPAID => {}
            CHARGE_PREPAID => match self.prepaid_period {
                None => errors.push(ValidationError::new(
                    "prepaid_period",
                    "is required when charge_type is PREPAID",
                )),
                Some(period) if !PREPAID_PERIODS.contains(&period) => {
                    errors.push(ValidationError::new(
                        "prepaid_period",
                        format!("must be 1-12, 24 or 36, got {}", period),
                    ))
                }
                Some(_) => {}
            },
            other => errors.push(ValidationError::new(
                "charge_type",
                format!(
                    "must be {} or {}, got {}",
                    CHARGE_POSTPAID, CHARGE_PREPAID, other
                ),
            )),
        }

        if let Some(flag) = &self.prepaid_renew_flag
            && !RENEW_FLAGS.contains(&flag.as_str())
        {
            errors.push(ValidationError::new(
                "prepaid_renew_flag",
                format!("must be one of {}, got {}", RENEW_FLAGS.join(", "), flag),
            ));
        }

        if let Some(throughput) = self.throughput_performance
            && throughput < 0
        {
            errors.push(ValidationError::new(
                "throughput_performance",
                "must not be negative",
            ));
        }

        finish(errors)
    }

    fn prepaid(&self) -> Option<DiskChargePrepaid> {
        (self.charge_type == CHARGE_PREPAID).then(|| DiskChargePrepaid {
            period: self.prepaid_period.unwrap_or(1),
            renew_flag: self.prepaid_renew_flag.clone(),
        })
    }

    pub fn to_request(&self) -> CreateDisksRequest {
        CreateDisksRequest {
            placement: Placement {
                zone: self.availability_zone.clone(),
                project_id: Some(self.project_id),
            },
            disk_charge_type: self.charge_type.clone(),
            disk_type: self.storage_type.clone(),
            disk_name: Some(self.storage_name.clone()),
            disk_size: self.storage_size,
            disk_count: 1,
            snapshot_id: self.snapshot_id.clone(),
            encrypt: self.encrypt.then(|| "ENCRYPT".to_string()),
            throughput_performance: self.throughput_performance,
            disk_charge_prepaid: self.prepaid(),
        }
    }
}

fn disk_attributes(disk: &Disk, tags: &HashMap<String, String>) -> HashMap<String, Value> {
    let mut attributes = HashMap::new();

    attributes.insert("storage_type".to_string(), string_value(&disk.disk_type));
    attributes.insert("storage_size".to_string(), Value::Int(disk.disk_size));
    attributes.insert(
        "availability_zone".to_string(),
        string_value(&disk.placement.zone),
    );
    attributes.insert("storage_name".to_string(), string_value(&disk.disk_name));
    attributes.insert(
        "project_id".to_string(),
        Value::Int(disk.placement.project_id.unwrap_or(0)),
    );
    attributes.insert("encrypt".to_string(), Value::Bool(disk.encrypt));
    attributes.insert("charge_type".to_string(), string_value(&disk.disk_charge_type));
    if let Some(flag) = &disk.renew_flag {
        attributes.insert("prepaid_renew_flag".to_string(), string_value(flag));
    }
    if let Some(throughput) = disk.throughput_performance {
        attributes.insert("throughput_performance".to_string(), Value::Int(throughput));
    }
    attributes.insert("attached".to_string(), Value::Bool(disk.attached));
    attributes.insert("storage_status".to_string(), string_value(&disk.disk_state));
    attributes.insert("tags".to_string(), tags_value(tags));

    attributes
}

/// Changes the API cannot apply, checked before anything is sent
fn check_update(from: &State, to: &CbsStorageConfig) -> ValidationResult {
    let mut errors = Vec::new();

    if let Some(current) = from.attribute("storage_size").and_then(Value::as_int)
        && to.storage_size < current
    {
        errors.push(ValidationError::new(
            "storage_size",
            format!(
                "cannot shrink a disk from {} to {} GB",
                current, to.storage_size
            ),
        ));
    }

    if from.attribute("charge_type").and_then(Value::as_str) == Some(CHARGE_PREPAID)
        && to.charge_type == CHARGE_POSTPAID
    {
        errors.push(ValidationError::new(
            "charge_type",
            "cannot switch a PREPAID disk back to POSTPAID_BY_HOUR",
        ));
    }

    finish(errors)
}

impl TencentCloudProvider {
    fn disk_resource_name(&self, disk_id: &str) -> String {
        build_resource_name(TAG_SERVICE, TAG_RESOURCE_PREFIX, self.region(), disk_id)
    }

    pub(crate) async fn read_cbs_storage(
        &self,
        log_id: &LogId,
        id: &ResourceId,
        disk_id: &str,
    ) -> ProviderResult<State> {
        let disk = match self
            .cbs(log_id)
            .describe_disk_by_id(disk_id)
            .await
            .map_err(|e| api_error(id, "Failed to describe disk", e))?
        {
            Some(disk) => disk,
            None => return Ok(State::not_found(id.clone())),
        };

        let tags = self
            .tag(log_id)
            .describe_resource_tags(TAG_SERVICE, TAG_RESOURCE_PREFIX, self.region(), disk_id)
            .await
            .map_err(|e| api_error(id, "Failed to read disk tags", e))?;

        Ok(State::existing(id.clone(), disk_attributes(&disk, &tags)).with_identifier(disk_id))
    }

    pub(crate) async fn create_cbs_storage(
        &self,
        log_id: &LogId,
        resource: &Resource,
    ) -> ProviderResult<State> {
        let id = &resource.id;
        let config: CbsStorageConfig = resource.decode().map_err(|e| decode_error(id, e))?;
        config
            .validate()
            .map_err(|errors| validation_error(id, errors))?;

        let cbs = self.cbs(log_id);
        let disk_id = cbs
            .create_disk(&config.to_request())
            .await
            .map_err(|e| api_error(id, "Failed to create disk", e))?;
        info!("[{}] Created disk {} for {}", log_id, disk_id, id);

        self.waiter(&[STATUS_UNATTACHED], self.config().create_timeout)
            .with_not_found_checks(NOT_FOUND_CHECKS)
            .with_description(format!("disk {} to become available", disk_id))
            .wait_for(|| cbs.disk_state_refresh(&disk_id))
            .await
            .map_err(|e| wait_error(id, e))?;

        if !config.tags.is_empty() {
            self.tag(log_id)
                .modify_tags(
                    &self.disk_resource_name(&disk_id),
                    &diff_tags(&HashMap::new(), &config.tags),
                )
                .await
                .map_err(|e| api_error(id, "Failed to tag disk", e))?;
        }

        self.read_cbs_storage(log_id, id, &disk_id).await
    }

    pub(crate) async fn update_cbs_storage(
        &self,
        log_id: &LogId,
        id: &ResourceId,
        disk_id: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        let config: CbsStorageConfig = to.decode().map_err(|e| decode_error(id, e))?;
        config
            .validate()
            .map_err(|errors| validation_error(id, errors))?;
        check_update(from, &config).map_err(|errors| validation_error(id, errors))?;

        let changed = without_keys(
            changed_attributes(&to.attributes, &from.attributes),
            WRITE_ONLY,
        );
        reject_force_new(id, &changed, FORCE_NEW)?;
        let has_change = |key: &str| changed.iter().any(|c| c == key);

        let cbs = self.cbs(log_id);

        let rename = has_change("storage_name").then_some(config.storage_name.as_str());
        let project = has_change("project_id").then_some(config.project_id);
        if rename.is_some() || project.is_some() {
            cbs.modify_disk_attributes(disk_id, rename, project)
                .await
                .map_err(|e| api_error(id, "Failed to modify disk attributes", e))?;
        }

        if has_change("storage_size") {
            cbs.resize_disk(disk_id, config.storage_size)
                .await
                .map_err(|e| api_error(id, "Failed to resize disk", e))?;

            let size = config.storage_size;
            self.waiter(&[STATUS_UNATTACHED, STATUS_ATTACHED], self.config().update_timeout)
                .with_pending([STATUS_EXPANDING])
                .with_description(format!("disk {} to expand to {} GB", disk_id, size))
                .wait_for(|| cbs.disk_resize_refresh(disk_id, size))
                .await
                .map_err(|e| wait_error(id, e))?;
        }

        if has_change("throughput_performance") {
            let throughput = config.throughput_performance.unwrap_or(0);
            cbs.modify_throughput_performance(disk_id, throughput)
                .await
                .map_err(|e| api_error(id, "Failed to modify disk throughput", e))?;
        }

        if has_change("charge_type") && config.charge_type == CHARGE_PREPAID {
            let prepaid = config.prepaid().ok_or_else(|| {
                ProviderError::new("PREPAID settings are missing").for_resource(id.clone())
            })?;
            cbs.modify_charge_type_prepaid(disk_id, &prepaid)
                .await
                .map_err(|e| api_error(id, "Failed to switch disk to PREPAID", e))?;
        } else if has_change("prepaid_renew_flag")
            && let Some(flag) = &config.prepaid_renew_flag
        {
            cbs.modify_renew_flag(disk_id, flag)
                .await
                .map_err(|e| api_error(id, "Failed to modify renew flag", e))?;
        }

        if has_change("tags") {
            let diff = diff_tags(&tags_from_attributes(&from.attributes), &config.tags);
            self.tag(log_id)
                .modify_tags(&self.disk_resource_name(disk_id), &diff)
                .await
                .map_err(|e| api_error(id, "Failed to update disk tags", e))?;
        }

        self.read_cbs_storage(log_id, id, disk_id).await
    }

    /// Terminating a disk moves it to the recycle bin; a second terminate
    /// destroys it for good.
    pub(crate) async fn delete_cbs_storage(
        &self,
        log_id: &LogId,
        id: &ResourceId,
        disk_id: &str,
    ) -> ProviderResult<()> {
        let cbs = self.cbs(log_id);

        match cbs.terminate_disk(disk_id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(api_error(id, "Failed to terminate disk", e)),
        }

        let recycled = self
            .waiter(&[STATUS_TORECYCLE], self.config().delete_timeout)
            .accept_gone()
            .with_description(format!("disk {} to be recycled", disk_id))
            .wait_for(|| cbs.disk_state_refresh(disk_id))
            .await
            .map_err(|e| wait_error(id, e))?;

        if recycled.is_some() {
            match cbs.terminate_disk(disk_id).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => return Ok(()),
                Err(e) => return Err(api_error(id, "Failed to destroy recycled disk", e)),
            }

            self.waiter(&[], self.config().delete_timeout)
                .with_pending([STATUS_TORECYCLE])
                .accept_gone()
                .with_description(format!("disk {} to be destroyed", disk_id))
                .wait_for(|| cbs.disk_state_refresh(disk_id))
                .await
                .map_err(|e| wait_error(id, e))?;
        }

        info!("[{}] Deleted disk {}", log_id, disk_id);
        Ok(())
    }
}
