//! CBS service: cloud block storage disks

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use stratus_core::waiter::Observation;

use super::{Empty, Placement, absent_if_not_found, single_id};
use crate::client::{Client, Service};
use crate::error::ApiError;
use crate::logid::LogId;

pub const STATUS_UNATTACHED: &str = "UNATTACHED";
pub const STATUS_ATTACHED: &str = "ATTACHED";
pub const STATUS_EXPANDING: &str = "EXPANDING";
pub const STATUS_TORECYCLE: &str = "TORECYCLE";

pub const CHARGE_POSTPAID: &str = "POSTPAID_BY_HOUR";
pub const CHARGE_PREPAID: &str = "PREPAID";

/// One entry of `DescribeDisks.DiskSet`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Disk {
    pub disk_id: String,
    pub disk_name: String,
    pub disk_type: String,
    pub disk_size: i64,
    pub disk_state: String,
    pub attached: bool,
    pub placement: Placement,
    pub encrypt: bool,
    pub disk_charge_type: String,
    pub renew_flag: Option<String>,
    pub throughput_performance: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DiskChargePrepaid {
    pub period: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renew_flag: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateDisksRequest {
    pub placement: Placement,
    pub disk_charge_type: String,
    pub disk_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_name: Option<String>,
    pub disk_size: i64,
    pub disk_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,
    /// `Some("ENCRYPT")` to create an encrypted disk
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throughput_performance: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_charge_prepaid: Option<DiskChargePrepaid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateDisksResponse {
    #[serde(default)]
    disk_id_set: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct DiskIdsRequest<'a> {
    disk_ids: [&'a str; 1],
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct DescribeDisksResponse {
    disk_set: Option<Vec<Disk>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ModifyDiskAttributesRequest<'a> {
    disk_ids: [&'a str; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    disk_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    project_id: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ResizeDiskRequest<'a> {
    disk_id: &'a str,
    disk_size: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ModifyDiskExtraPerformanceRequest<'a> {
    disk_id: &'a str,
    throughput_performance: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ModifyDisksChargeTypeRequest<'a> {
    disk_ids: [&'a str; 1],
    disk_charge_prepaid: &'a DiskChargePrepaid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ModifyDisksRenewFlagRequest<'a> {
    disk_ids: [&'a str; 1],
    renew_flag: &'a str,
}

pub struct CbsService {
    client: Arc<Client>,
    log_id: LogId,
}

impl CbsService {
    pub fn new(client: Arc<Client>, log_id: LogId) -> Self {
        Self { client, log_id }
    }

    /// Create one disk and return its id
    pub async fn create_disk(&self, request: &CreateDisksRequest) -> Result<String, ApiError> {
        let response: CreateDisksResponse = self
            .client
            .write(&self.log_id, Service::Cbs, "CreateDisks", request)
            .await?;
        single_id("CreateDisks", response.disk_id_set)
    }

    pub async fn describe_disk_by_id(&self, id: &str) -> Result<Option<Disk>, ApiError> {
        let request = DiskIdsRequest { disk_ids: [id] };
        let response: Option<DescribeDisksResponse> = absent_if_not_found(
            self.client
                .read(&self.log_id, Service::Cbs, "DescribeDisks", &request)
                .await,
        )?;

        Ok(response
            .and_then(|r| r.disk_set)
            .and_then(|set| set.into_iter().find(|d| d.disk_id == id)))
    }

    pub async fn modify_disk_attributes(
        &self,
        id: &str,
        name: Option<&str>,
        project_id: Option<i64>,
    ) -> Result<(), ApiError> {
        let request = ModifyDiskAttributesRequest {
            disk_ids: [id],
            disk_name: name,
            project_id,
        };
        let _: Empty = self
            .client
            .write(&self.log_id, Service::Cbs, "ModifyDiskAttributes", &request)
            .await?;
        Ok(())
    }

    pub async fn resize_disk(&self, id: &str, size: i64) -> Result<(), ApiError> {
        let request = ResizeDiskRequest {
            disk_id: id,
            disk_size: size,
        };
        let _: Empty = self
            .client
            .write(&self.log_id, Service::Cbs, "ResizeDisk", &request)
            .await?;
        Ok(())
    }

    /// Extra throughput on top of the disk type's baseline, in MB/s
    pub async fn modify_throughput_performance(
        &self,
        id: &str,
        throughput: i64,
    ) -> Result<(), ApiError> {
        let request = ModifyDiskExtraPerformanceRequest {
            disk_id: id,
            throughput_performance: throughput,
        };
        let _: Empty = self
            .client
            .write(&self.log_id, Service::Cbs, "ModifyDiskExtraPerformance", &request)
            .await?;
        Ok(())
    }

    /// Switch a pay-as-you-go disk to prepaid
    pub async fn modify_charge_type_prepaid(
        &self,
        id: &str,
        prepaid: &DiskChargePrepaid,
    ) -> Result<(), ApiError> {
        let request = ModifyDisksChargeTypeRequest {
            disk_ids: [id],
            disk_charge_prepaid: prepaid,
        };
        let _: Empty = self
            .client
            .write(&self.log_id, Service::Cbs, "ModifyDisksChargeType", &request)
            .await?;
        Ok(())
    }

    pub async fn modify_renew_flag(&self, id: &str, renew_flag: &str) -> Result<(), ApiError> {
        let request = ModifyDisksRenewFlagRequest {
            disk_ids: [id],
            renew_flag,
        };
        let _: Empty = self
            .client
            .write(&self.log_id, Service::Cbs, "ModifyDisksRenewFlag", &request)
            .await?;
        Ok(())
    }

    pub async fn terminate_disk(&self, id: &str) -> Result<(), ApiError> {
        let request = DiskIdsRequest { disk_ids: [id] };
        let _: Empty = self
            .client
            .write(&self.log_id, Service::Cbs, "TerminateDisks", &request)
            .await?;
        Ok(())
    }

    /// Poller refresh: `DiskState` of `id`, or `None` when absent
    pub async fn disk_state_refresh(&self, id: &str) -> Result<Option<Observation<Disk>>, ApiError> {
        Ok(self
            .describe_disk_by_id(id)
            .await?
            .map(|disk| Observation::new(disk.disk_state.clone(), disk)))
    }

    /// Poller refresh for a resize: reports `EXPANDING` until the disk has
    /// reached `size` and left the expanding state.
    pub async fn disk_resize_refresh(
        &self,
        id: &str,
        size: i64,
    ) -> Result<Option<Observation<Disk>>, ApiError> {
        Ok(self.describe_disk_by_id(id).await?.map(|disk| {
            let status = if disk.disk_size < size {
                STATUS_EXPANDING.to_string()
            } else {
                disk.disk_state.clone()
            };
            Observation::new(status, disk)
        }))
    }
}
