//! CVM service: compute instances

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use stratus_core::waiter::Observation;

use super::{Empty, Filter, Placement, absent_if_not_found, is_empty_slice, single_id};
use crate::client::{Client, Service};
use crate::error::ApiError;
use crate::logid::LogId;

pub const STATUS_PENDING: &str = "PENDING";
pub const STATUS_LAUNCH_FAILED: &str = "LAUNCH_FAILED";
pub const STATUS_RUNNING: &str = "RUNNING";
pub const STATUS_STOPPED: &str = "STOPPED";
pub const STATUS_STARTING: &str = "STARTING";
pub const STATUS_STOPPING: &str = "STOPPING";
pub const STATUS_SHUTDOWN: &str = "SHUTDOWN";
pub const STATUS_TERMINATING: &str = "TERMINATING";

/// Largest page DescribeInstances accepts
pub const PAGE_LIMIT: u64 = 100;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VirtualPrivateCloud {
    #[serde(default)]
    pub vpc_id: String,
    #[serde(default)]
    pub subnet_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SystemDisk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_size: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InternetAccessible {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internet_max_bandwidth_out: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_ip_assigned: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LoginSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InstanceTag {
    pub key: String,
    pub value: String,
}

/// One entry of `DescribeInstances.InstanceSet`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Instance {
    pub instance_id: String,
    pub instance_name: String,
    pub instance_type: String,
    pub instance_state: String,
    pub image_id: String,
    pub instance_charge_type: String,
    pub placement: Placement,
    pub virtual_private_cloud: VirtualPrivateCloud,
    pub system_disk: SystemDisk,
    pub internet_accessible: InternetAccessible,
    pub security_group_ids: Option<Vec<String>>,
    pub private_ip_addresses: Option<Vec<String>>,
    pub public_ip_addresses: Option<Vec<String>>,
    pub login_settings: LoginSettings,
    pub created_time: Option<String>,
    pub tags: Option<Vec<InstanceTag>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RunInstancesRequest {
    pub placement: Placement,
    pub image_id: String,
    pub instance_type: String,
    pub instance_charge_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_name: Option<String>,
    pub instance_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub virtual_private_cloud: Option<VirtualPrivateCloud>,
    pub system_disk: SystemDisk,
    pub internet_accessible: InternetAccessible,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub security_group_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login_settings: Option<LoginSettings>,
    /// Base64 encoded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RunInstancesResponse {
    #[serde(default)]
    instance_id_set: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeInstancesRequest<'a> {
    #[serde(skip_serializing_if = "is_empty_slice")]
    instance_ids: &'a [&'a str],
    #[serde(skip_serializing_if = "is_empty_slice")]
    filters: &'a [Filter],
    offset: u64,
    limit: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct DescribeInstancesResponse {
    total_count: u64,
    instance_set: Option<Vec<Instance>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct InstanceIdsRequest<'a> {
    instance_ids: [&'a str; 1],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ModifyInstancesAttributeRequest<'a> {
    instance_ids: [&'a str; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    instance_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    security_groups: Option<&'a [String]>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ModifyInstancesProjectRequest<'a> {
    instance_ids: [&'a str; 1],
    project_id: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct StopInstancesRequest<'a> {
    instance_ids: [&'a str; 1],
    stop_type: &'a str,
}

pub struct CvmService {
    client: Arc<Client>,
    log_id: LogId,
}

impl CvmService {
    pub fn new(client: Arc<Client>, log_id: LogId) -> Self {
        Self { client, log_id }
    }

    /// Launch one instance and return its id
    pub async fn run_instance(&self, request: &RunInstancesRequest) -> Result<String, ApiError> {
        let response: RunInstancesResponse = self
            .client
            .write(&self.log_id, Service::Cvm, "RunInstances", request)
            .await?;
        single_id("RunInstances", response.instance_id_set)
    }

    pub async fn describe_instance_by_id(&self, id: &str) -> Result<Option<Instance>, ApiError> {
        let request = DescribeInstancesRequest {
            instance_ids: &[id],
            filters: &[],
            offset: 0,
            limit: 1,
        };
        let response: Option<DescribeInstancesResponse> = absent_if_not_found(
            self.client
                .read(&self.log_id, Service::Cvm, "DescribeInstances", &request)
                .await,
        )?;

        Ok(response
            .and_then(|r| r.instance_set)
            .and_then(|set| set.into_iter().find(|i| i.instance_id == id)))
    }

    /// Every instance matching `filters`, fetched page by page
    pub async fn describe_instances_by_filter(
        &self,
        filters: &[Filter],
    ) -> Result<Vec<Instance>, ApiError> {
        let mut instances = Vec::new();
        let mut offset = 0;

        loop {
            let request = DescribeInstancesRequest {
                instance_ids: &[],
                filters,
                offset,
                limit: PAGE_LIMIT,
            };
            let response: DescribeInstancesResponse = self
                .client
                .read(&self.log_id, Service::Cvm, "DescribeInstances", &request)
                .await?;

            let page = response.instance_set.unwrap_or_default();
            let count = page.len() as u64;
            instances.extend(page);

            offset += count;
            if count < PAGE_LIMIT || offset >= response.total_count {
                break;
            }
        }

        Ok(instances)
    }

    pub async fn modify_instance_name(&self, id: &str, name: &str) -> Result<(), ApiError> {
        let request = ModifyInstancesAttributeRequest {
            instance_ids: [id],
            instance_name: Some(name),
            security_groups: None,
        };
        let _: Empty = self
            .client
            .write(&self.log_id, Service::Cvm, "ModifyInstancesAttribute", &request)
            .await?;
        Ok(())
    }

    pub async fn modify_security_groups(
        &self,
        id: &str,
        security_groups: &[String],
    ) -> Result<(), ApiError> {
        let request = ModifyInstancesAttributeRequest {
            instance_ids: [id],
            instance_name: None,
            security_groups: Some(security_groups),
        };
        let _: Empty = self
            .client
            .write(&self.log_id, Service::Cvm, "ModifyInstancesAttribute", &request)
            .await?;
        Ok(())
    }

    pub async fn modify_project(&self, id: &str, project_id: i64) -> Result<(), ApiError> {
        let request = ModifyInstancesProjectRequest {
            instance_ids: [id],
            project_id,
        };
        let _: Empty = self
            .client
            .write(&self.log_id, Service::Cvm, "ModifyInstancesProject", &request)
            .await?;
        Ok(())
    }

    pub async fn start_instance(&self, id: &str) -> Result<(), ApiError> {
        let request = InstanceIdsRequest { instance_ids: [id] };
        let _: Empty = self
            .client
            .write(&self.log_id, Service::Cvm, "StartInstances", &request)
            .await?;
        Ok(())
    }

    pub async fn stop_instance(&self, id: &str) -> Result<(), ApiError> {
        let request = StopInstancesRequest {
            instance_ids: [id],
            stop_type: "SOFT_FIRST",
        };
        let _: Empty = self
            .client
            .write(&self.log_id, Service::Cvm, "StopInstances", &request)
            .await?;
        Ok(())
    }

    pub async fn terminate_instance(&self, id: &str) -> Result<(), ApiError> {
        let request = InstanceIdsRequest { instance_ids: [id] };
        let _: Empty = self
            .client
            .write(&self.log_id, Service::Cvm, "TerminateInstances", &request)
            .await?;
        Ok(())
    }

    /// Poller refresh: `InstanceState` of `id`, or `None` once it is gone
    pub async fn instance_state_refresh(
        &self,
        id: &str,
    ) -> Result<Option<Observation<Instance>>, ApiError> {
        Ok(self
            .describe_instance_by_id(id)
            .await?
            .map(|instance| Observation::new(instance.instance_state.clone(), instance)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn run_instances_request_shape() {
        let request = RunInstancesRequest {
            placement: Placement {
                zone: "ap-guangzhou-3".to_string(),
                project_id: Some(0),
            },
            image_id: "img-9qabwvbn".to_string(),
            instance_type: "S5.MEDIUM2".to_string(),
            instance_charge_type: "POSTPAID_BY_HOUR".to_string(),
            instance_name: Some("web".to_string()),
            instance_count: 1,
            virtual_private_cloud: None,
            system_disk: SystemDisk {
                disk_type: Some("CLOUD_PREMIUM".to_string()),
                disk_size: Some(50),
            },
            internet_accessible: InternetAccessible::default(),
            security_group_ids: vec![],
            login_settings: None,
            user_data: None,
        };

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "Placement": {"Zone": "ap-guangzhou-3", "ProjectId": 0},
                "ImageId": "img-9qabwvbn",
                "InstanceType": "S5.MEDIUM2",
                "InstanceChargeType": "POSTPAID_BY_HOUR",
                "InstanceName": "web",
                "InstanceCount": 1,
                "SystemDisk": {"DiskType": "CLOUD_PREMIUM", "DiskSize": 50},
                "InternetAccessible": {}
            })
        );
    }

    #[test]
    fn instance_tolerates_nulls() {
        let instance: Instance = serde_json::from_value(json!({
            "InstanceId": "ins-1",
            "InstanceState": "RUNNING",
            "PublicIpAddresses": null,
            "Placement": {"Zone": "ap-guangzhou-3", "ProjectId": 0},
            "CreatedTime": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(instance.instance_state, "RUNNING");
        assert_eq!(instance.public_ip_addresses, None);
        assert_eq!(instance.placement.zone, "ap-guangzhou-3");
    }

    #[test]
    fn describe_request_skips_empty_lists() {
        let request = DescribeInstancesRequest {
            instance_ids: &["ins-1"],
            filters: &[],
            offset: 0,
            limit: 1,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"InstanceIds": ["ins-1"], "Offset": 0, "Limit": 1})
        );
    }
}
