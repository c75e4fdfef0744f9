//! Resource and data source handlers
//!
//! Each module owns one resource type: a typed configuration struct with
//! validation, request building, response mapping, and the CRUD methods
//! on [`TencentCloudProvider`](crate::provider::TencentCloudProvider).

pub mod cbs_storage;
pub mod data_sources;
pub mod instance;
pub mod monitor_grafana_instance;
pub mod monitor_tmp_instance;

use std::collections::HashMap;

use stratus_core::provider::ResourceType;
use stratus_core::resource::Value;

/// Validation error
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Result type for validation
pub type ValidationResult = Result<(), Vec<ValidationError>>;

pub(crate) fn finish(errors: Vec<ValidationError>) -> ValidationResult {
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

pub(crate) fn require_non_empty(errors: &mut Vec<ValidationError>, path: &str, value: &str) {
    if value.trim().is_empty() {
        errors.push(ValidationError::new(path, "must not be empty"));
    }
}

pub(crate) fn string_value(s: impl Into<String>) -> Value {
    Value::String(s.into())
}

pub(crate) fn string_list(items: &[String]) -> Value {
    Value::List(items.iter().cloned().map(Value::String).collect())
}

pub(crate) fn tags_value(tags: &HashMap<String, String>) -> Value {
    Value::Map(
        tags.iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}

/// String items of a list attribute, empty when absent
pub(crate) fn strings_from(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::List(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

/// Tags recorded in a state, empty when absent
pub(crate) fn tags_from_attributes(attributes: &HashMap<String, Value>) -> HashMap<String, String> {
    match attributes.get("tags") {
        Some(Value::Map(map)) => map
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect(),
        _ => HashMap::new(),
    }
}

/// Drop attributes the API never returns so they do not show up as changes
pub(crate) fn without_keys(mut changed: Vec<String>, keys: &[&str]) -> Vec<String> {
    changed.retain(|c| !keys.contains(&c.as_str()));
    changed
}

pub struct InstanceType;

impl ResourceType for InstanceType {
    fn name(&self) -> &'static str {
        instance::RESOURCE_TYPE
    }
}

pub struct CbsStorageType;

impl ResourceType for CbsStorageType {
    fn name(&self) -> &'static str {
        cbs_storage::RESOURCE_TYPE
    }
}

pub struct MonitorGrafanaInstanceType;

impl ResourceType for MonitorGrafanaInstanceType {
    fn name(&self) -> &'static str {
        monitor_grafana_instance::RESOURCE_TYPE
    }
}

pub struct MonitorTmpInstanceType;

impl ResourceType for MonitorTmpInstanceType {
    fn name(&self) -> &'static str {
        monitor_tmp_instance::RESOURCE_TYPE
    }
}

pub struct InstancesDataSource;

impl ResourceType for InstancesDataSource {
    fn name(&self) -> &'static str {
        data_sources::INSTANCES
    }

    fn is_data_source(&self) -> bool {
        true
    }
}

pub struct MonitorTmpInstancesDataSource;

impl ResourceType for MonitorTmpInstancesDataSource {
    fn name(&self) -> &'static str {
        data_sources::MONITOR_TMP_INSTANCES
    }

    fn is_data_source(&self) -> bool {
        true
    }
}

/// Every resource type and data source this provider handles
pub fn resource_types() -> Vec<Box<dyn ResourceType>> {
    vec![
        Box::new(InstanceType),
        Box::new(CbsStorageType),
        Box::new(MonitorGrafanaInstanceType),
        Box::new(MonitorTmpInstanceType),
        Box::new(InstancesDataSource),
        Box::new(MonitorTmpInstancesDataSource),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_type_names() {
        let names: Vec<&str> = resource_types().iter().map(|t| t.name()).collect();
        assert_eq!(
            names,
            vec![
                "instance",
                "cbs_storage",
                "monitor_grafana_instance",
                "monitor_tmp_instance",
                "instances",
                "monitor_tmp_instances"
            ]
        );
        let data_sources = resource_types().iter().filter(|t| t.is_data_source()).count();
        assert_eq!(data_sources, 2);
    }

    #[test]
    fn tags_roundtrip_through_attributes() {
        let mut tags = HashMap::new();
        tags.insert("env".to_string(), "prod".to_string());
        let mut attributes = HashMap::new();
        attributes.insert("tags".to_string(), tags_value(&tags));
        assert_eq!(tags_from_attributes(&attributes), tags);
        assert!(tags_from_attributes(&HashMap::new()).is_empty());
    }

    #[test]
    fn without_keys_filters() {
        let changed = vec!["password".to_string(), "instance_name".to_string()];
        assert_eq!(without_keys(changed, &["password"]), vec!["instance_name"]);
    }
}
