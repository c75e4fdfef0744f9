//! Data sources: read-only listings of existing infrastructure

use std::collections::HashMap;

use log::debug;
use serde::Deserialize;
use stratus_core::provider::ProviderResult;
use stratus_core::resource::{Resource, State, Value};

use super::instance::instance_attributes;
use super::monitor_tmp_instance::tmp_attributes;
use crate::logid::LogId;
use crate::provider::{TencentCloudProvider, api_error, decode_error};
use crate::services::Filter;
use crate::services::monitor::PrometheusInstanceFilter;

pub const INSTANCES: &str = "instances";
pub const MONITOR_TMP_INSTANCES: &str = "monitor_tmp_instances";

/// Filters of the `instances` data source. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct InstancesFilter {
    pub instance_id: Option<String>,
    pub instance_name: Option<String>,
    pub availability_zone: Option<String>,
    pub project_id: Option<i64>,
    pub vpc_id: Option<String>,
    pub subnet_id: Option<String>,
}

impl InstancesFilter {
    pub fn to_filters(&self) -> Vec<Filter> {
        let mut filters = Vec::new();
        for (name, value) in [
            ("instance-id", &self.instance_id),
            ("instance-name", &self.instance_name),
            ("zone", &self.availability_zone),
            ("vpc-id", &self.vpc_id),
            ("subnet-id", &self.subnet_id),
        ] {
            if let Some(value) = value {
                filters.push(Filter::new(name, vec![value.clone()]));
            }
        }
        if let Some(project_id) = self.project_id {
            filters.push(Filter::new("project-id", vec![project_id.to_string()]));
        }
        filters
    }
}

/// Filters of the `monitor_tmp_instances` data source
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TmpInstancesFilter {
    pub instance_ids: Vec<String>,
    pub instance_status: Vec<i64>,
    pub instance_name: Option<String>,
    pub zones: Vec<String>,
}

impl From<TmpInstancesFilter> for PrometheusInstanceFilter {
    fn from(filter: TmpInstancesFilter) -> Self {
        PrometheusInstanceFilter {
            instance_ids: filter.instance_ids,
            instance_status: filter.instance_status,
            instance_name: filter.instance_name,
            zones: filter.zones,
        }
    }
}

/// The declared filter attributes plus the result list under `key`
fn listing(resource: &Resource, key: &str, items: Vec<HashMap<String, Value>>) -> State {
    let mut attributes = resource.attributes.clone();
    attributes.insert(
        key.to_string(),
        Value::List(items.into_iter().map(Value::Map).collect()),
    );
    State::existing(resource.id.clone(), attributes)
}

impl TencentCloudProvider {
    pub(crate) async fn read_instances(
        &self,
        log_id: &LogId,
        resource: &Resource,
    ) -> ProviderResult<State> {
        let id = &resource.id;
        let filter: InstancesFilter = resource.decode().map_err(|e| decode_error(id, e))?;

        let instances = self
            .cvm(log_id)
            .describe_instances_by_filter(&filter.to_filters())
            .await
            .map_err(|e| api_error(id, "Failed to list instances", e))?;
        debug!("[{}] {} instance(s) matched {}", log_id, instances.len(), id);

        let items = instances
            .iter()
            .map(|instance| {
                let tags: HashMap<String, String> = instance
                    .tags
                    .iter()
                    .flatten()
                    .map(|t| (t.key.clone(), t.value.clone()))
                    .collect();
                let mut item = instance_attributes(instance, &tags);
                item.insert(
                    "instance_id".to_string(),
                    Value::String(instance.instance_id.clone()),
                );
                item
            })
            .collect();

        Ok(listing(resource, "instance_list", items))
    }

    pub(crate) async fn read_tmp_instances(
        &self,
        log_id: &LogId,
        resource: &Resource,
    ) -> ProviderResult<State> {
        let id = &resource.id;
        let filter: TmpInstancesFilter = resource.decode().map_err(|e| decode_error(id, e))?;

        let instances = self
            .monitor(log_id)
            .describe_tmp_instances(&filter.into())
            .await
            .map_err(|e| api_error(id, "Failed to list Prometheus instances", e))?;
        debug!(
            "[{}] {} Prometheus instance(s) matched {}",
            log_id,
            instances.len(),
            id
        );

        let items = instances
            .iter()
            .map(|instance| tmp_attributes(instance, &HashMap::new()))
            .collect();

        Ok(listing(resource, "instance_set", items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_filters_from_attributes() {
        let resource = Resource::new(INSTANCES, "web")
            .with_read_only(true)
            .with_attribute("availability_zone", Value::String("ap-guangzhou-3".to_string()))
            .with_attribute("project_id", Value::Int(0));
        let filter: InstancesFilter = resource.decode().unwrap();

        assert_eq!(
            filter.to_filters(),
            vec![
                Filter::new("zone", vec!["ap-guangzhou-3".to_string()]),
                Filter::new("project-id", vec!["0".to_string()]),
            ]
        );
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(InstancesFilter::default().to_filters().is_empty());
    }

    #[test]
    fn unknown_filter_is_rejected() {
        let resource = Resource::new(MONITOR_TMP_INSTANCES, "all")
            .with_attribute("region", Value::String("ap-guangzhou".to_string()));
        assert!(resource.decode::<TmpInstancesFilter>().is_err());
    }

    #[test]
    fn listing_keeps_filter_attributes() {
        let resource = Resource::new(INSTANCES, "web")
            .with_attribute("instance_name", Value::String("web".to_string()));
        let mut item = HashMap::new();
        item.insert("instance_id".to_string(), Value::String("ins-1".to_string()));

        let state = listing(&resource, "instance_list", vec![item.clone()]);
        assert!(state.exists);
        assert_eq!(
            state.attribute("instance_list"),
            Some(&Value::List(vec![Value::Map(item)]))
        );
        assert_eq!(
            state.attribute("instance_name"),
            Some(&Value::String("web".to_string()))
        );
    }
}
