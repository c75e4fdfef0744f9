//! Monitor service: managed Grafana and Prometheus (TMP) instances
//!
//! Both products report `InstanceStatus` as an integer code.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use stratus_core::waiter::Observation;

use super::{Empty, absent_if_not_found, is_empty_slice};
use crate::client::{Client, Service};
use crate::error::ApiError;
use crate::logid::LogId;

pub const STATUS_CREATING: i64 = 1;
pub const STATUS_RUNNING: i64 = 2;
pub const STATUS_DESTROYING: i64 = 5;
/// Stopped or isolated
pub const STATUS_ISOLATED: i64 = 6;
pub const STATUS_DELETED: i64 = 7;

/// Largest page DescribePrometheusInstances is asked for
pub const TMP_PAGE_LIMIT: u64 = 20;

/// Status code as a poller status string
pub fn status_label(code: i64) -> String {
    code.to_string()
}

/// One entry of `DescribeGrafanaInstances.Instances`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct GrafanaInstance {
    pub instance_id: String,
    pub instance_name: String,
    pub vpc_id: String,
    pub subnet_ids: Option<Vec<String>>,
    pub internet_url: Option<String>,
    pub internal_url: Option<String>,
    pub root_url: Option<String>,
    pub enable_internet: Option<bool>,
    pub instance_status: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateGrafanaInstanceRequest {
    pub instance_name: String,
    pub vpc_id: String,
    pub subnet_ids: Vec<String>,
    pub grafana_init_password: String,
    pub enable_internet: bool,
}

/// One entry of `DescribePrometheusInstances.InstanceSet`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PrometheusInstance {
    pub instance_id: String,
    pub instance_name: String,
    pub instance_charge_type: i64,
    pub region_id: i64,
    pub zone: String,
    pub vpc_id: String,
    pub subnet_id: String,
    pub data_retention_time: i64,
    pub instance_status: i64,
    #[serde(rename = "GrafanaURL")]
    pub grafana_url: Option<String>,
    pub created_at: Option<String>,
    pub enable_grafana: Option<i64>,
    #[serde(rename = "IPv4Address")]
    pub ipv4_address: Option<String>,
    pub remote_write: Option<String>,
    pub api_root_path: Option<String>,
    pub proxy_address: Option<String>,
    pub grafana_instance_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreatePrometheusInstanceRequest {
    pub instance_name: String,
    pub vpc_id: String,
    pub subnet_id: String,
    pub data_retention_time: i64,
    pub zone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grafana_instance_id: Option<String>,
}

/// Filters accepted by DescribePrometheusInstances
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PrometheusInstanceFilter {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub instance_ids: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub instance_status: Vec<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_name: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub zones: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstanceIdResponse {
    instance_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeGrafanaInstancesRequest<'a> {
    #[serde(skip_serializing_if = "is_empty_slice")]
    instance_ids: &'a [&'a str],
    offset: u64,
    limit: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct DescribeGrafanaInstancesResponse {
    instances: Option<Vec<GrafanaInstance>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ModifyGrafanaInstanceRequest<'a> {
    instance_id: &'a str,
    instance_name: &'a str,
}

#[derive(Debug, Serialize)]
struct DeleteGrafanaInstanceRequest<'a> {
    #[serde(rename = "InstanceIDs")]
    instance_ids: [&'a str; 1],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct InstanceIdRequest<'a> {
    instance_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct DescribePrometheusInstancesRequest<'a> {
    #[serde(flatten)]
    filter: &'a PrometheusInstanceFilter,
    offset: u64,
    limit: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct DescribePrometheusInstancesResponse {
    total_count: u64,
    instance_set: Option<Vec<PrometheusInstance>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ModifyPrometheusInstanceAttributesRequest<'a> {
    instance_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    instance_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data_retention_time: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct TerminatePrometheusInstancesRequest<'a> {
    instance_ids: [&'a str; 1],
}

pub struct MonitorService {
    client: Arc<Client>,
    log_id: LogId,
}

impl MonitorService {
    pub fn new(client: Arc<Client>, log_id: LogId) -> Self {
        Self { client, log_id }
    }

    // Grafana

    pub async fn create_grafana_instance(
        &self,
        request: &CreateGrafanaInstanceRequest,
    ) -> Result<String, ApiError> {
        let response: InstanceIdResponse = self
            .client
            .write(&self.log_id, Service::Monitor, "CreateGrafanaInstance", request)
            .await?;
        Ok(response.instance_id)
    }

    pub async fn describe_grafana_instance_by_id(
        &self,
        id: &str,
    ) -> Result<Option<GrafanaInstance>, ApiError> {
        let request = DescribeGrafanaInstancesRequest {
            instance_ids: &[id],
            offset: 0,
            limit: 1,
        };
        let response: Option<DescribeGrafanaInstancesResponse> = absent_if_not_found(
            self.client
                .read(&self.log_id, Service::Monitor, "DescribeGrafanaInstances", &request)
                .await,
        )?;

        Ok(response
            .and_then(|r| r.instances)
            .and_then(|set| set.into_iter().find(|i| i.instance_id == id)))
    }

    pub async fn modify_grafana_instance_name(&self, id: &str, name: &str) -> Result<(), ApiError> {
        let request = ModifyGrafanaInstanceRequest {
            instance_id: id,
            instance_name: name,
        };
        let _: Empty = self
            .client
            .write(&self.log_id, Service::Monitor, "ModifyGrafanaInstance", &request)
            .await?;
        Ok(())
    }

    /// Isolate a Grafana instance
    pub async fn delete_grafana_instance(&self, id: &str) -> Result<(), ApiError> {
        let request = DeleteGrafanaInstanceRequest { instance_ids: [id] };
        let _: Empty = self
            .client
            .write(&self.log_id, Service::Monitor, "DeleteGrafanaInstance", &request)
            .await?;
        Ok(())
    }

    /// Remove an isolated Grafana instance for good
    pub async fn clean_grafana_instance(&self, id: &str) -> Result<(), ApiError> {
        let request = InstanceIdRequest { instance_id: id };
        let _: Empty = self
            .client
            .write(&self.log_id, Service::Monitor, "CleanGrafanaInstance", &request)
            .await?;
        Ok(())
    }

    pub async fn grafana_state_refresh(
        &self,
        id: &str,
    ) -> Result<Option<Observation<GrafanaInstance>>, ApiError> {
        Ok(self
            .describe_grafana_instance_by_id(id)
            .await?
            .map(|instance| Observation::new(status_label(instance.instance_status), instance)))
    }

    // Prometheus

    pub async fn create_tmp_instance(
        &self,
        request: &CreatePrometheusInstanceRequest,
    ) -> Result<String, ApiError> {
        let response: InstanceIdResponse = self
            .client
            .write(
                &self.log_id,
                Service::Monitor,
                "CreatePrometheusMultiTenantInstancePostPayMode",
                request,
            )
            .await?;
        Ok(response.instance_id)
    }

    pub async fn describe_tmp_instance_by_id(
        &self,
        id: &str,
    ) -> Result<Option<PrometheusInstance>, ApiError> {
        let filter = PrometheusInstanceFilter {
            instance_ids: vec![id.to_string()],
            ..Default::default()
        };
        let instances = match absent_if_not_found(self.describe_tmp_instances(&filter).await)? {
            Some(instances) => instances,
            None => return Ok(None),
        };
        Ok(instances.into_iter().find(|i| i.instance_id == id))
    }

    /// Every Prometheus instance matching `filter`, fetched page by page
    pub async fn describe_tmp_instances(
        &self,
        filter: &PrometheusInstanceFilter,
    ) -> Result<Vec<PrometheusInstance>, ApiError> {
        let mut instances = Vec::new();
        let mut offset = 0;

        loop {
            let request = DescribePrometheusInstancesRequest {
                filter,
                offset,
                limit: TMP_PAGE_LIMIT,
            };
            let response: DescribePrometheusInstancesResponse = self
                .client
                .read(&self.log_id, Service::Monitor, "DescribePrometheusInstances", &request)
                .await?;

            let page = response.instance_set.unwrap_or_default();
            let count = page.len() as u64;
            instances.extend(page);

            offset += count;
            if count < TMP_PAGE_LIMIT || offset >= response.total_count {
                break;
            }
        }

        Ok(instances)
    }

    pub async fn modify_tmp_instance(
        &self,
        id: &str,
        name: Option<&str>,
        data_retention_time: Option<i64>,
    ) -> Result<(), ApiError> {
        let request = ModifyPrometheusInstanceAttributesRequest {
            instance_id: id,
            instance_name: name,
            data_retention_time,
        };
        let _: Empty = self
            .client
            .write(
                &self.log_id,
                Service::Monitor,
                "ModifyPrometheusInstanceAttributes",
                &request,
            )
            .await?;
        Ok(())
    }

    /// Isolate a Prometheus instance
    pub async fn terminate_tmp_instance(&self, id: &str) -> Result<(), ApiError> {
        let request = TerminatePrometheusInstancesRequest { instance_ids: [id] };
        let _: Empty = self
            .client
            .write(&self.log_id, Service::Monitor, "TerminatePrometheusInstances", &request)
            .await?;
        Ok(())
    }

    /// Destroy an isolated Prometheus instance
    pub async fn destroy_tmp_instance(&self, id: &str) -> Result<(), ApiError> {
        let request = InstanceIdRequest { instance_id: id };
        let _: Empty = self
            .client
            .write(&self.log_id, Service::Monitor, "DestroyPrometheusInstance", &request)
            .await?;
        Ok(())
    }

    pub async fn tmp_state_refresh(
        &self,
        id: &str,
    ) -> Result<Option<Observation<PrometheusInstance>>, ApiError> {
        Ok(self
            .describe_tmp_instance_by_id(id)
            .await?
            .map(|instance| Observation::new(status_label(instance.instance_status), instance)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn delete_grafana_uses_upper_case_ids_key() {
        let request = DeleteGrafanaInstanceRequest {
            instance_ids: ["grafana-1"],
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"InstanceIDs": ["grafana-1"]})
        );
    }

    #[test]
    fn describe_prometheus_flattens_filter() {
        let filter = PrometheusInstanceFilter {
            instance_status: vec![STATUS_RUNNING],
            zones: vec!["ap-guangzhou-3".to_string()],
            ..Default::default()
        };
        let request = DescribePrometheusInstancesRequest {
            filter: &filter,
            offset: 20,
            limit: TMP_PAGE_LIMIT,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"InstanceStatus": [2], "Zones": ["ap-guangzhou-3"], "Offset": 20, "Limit": 20})
        );
    }

    #[test]
    fn prometheus_instance_special_names() {
        let instance: PrometheusInstance = serde_json::from_value(json!({
            "InstanceId": "prom-1",
            "InstanceStatus": 2,
            "IPv4Address": "10.0.0.8",
            "GrafanaURL": "https://grafana.example",
            "DataRetentionTime": 15
        }))
        .unwrap();
        assert_eq!(instance.ipv4_address.as_deref(), Some("10.0.0.8"));
        assert_eq!(instance.grafana_url.as_deref(), Some("https://grafana.example"));
        assert_eq!(status_label(instance.instance_status), "2");
    }
}
