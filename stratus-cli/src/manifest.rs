//! Manifest - JSON file listing the resources to apply or query
//!
//! ```json
//! {"resources": [{"type": "cbs_storage", "name": "data", "attributes": {...}}]}
//! ```

use std::fs;
use std::path::Path;

use serde::Deserialize;
use stratus_core::resource::{Resource, Value};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Manifest {
    resources: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Entry {
    #[serde(rename = "type")]
    resource_type: String,
    name: String,
    #[serde(default)]
    attributes: serde_json::Map<String, serde_json::Value>,
}

/// Parse manifest text. `is_data_source` decides which entries are read-only.
pub fn parse(text: &str, is_data_source: impl Fn(&str) -> bool) -> Result<Vec<Resource>, String> {
    let manifest: Manifest =
        serde_json::from_str(text).map_err(|e| format!("Invalid manifest: {}", e))?;

    let mut resources = Vec::with_capacity(manifest.resources.len());
    for entry in manifest.resources {
        if entry.name.is_empty() {
            return Err(format!("{}: resource name must not be empty", entry.resource_type));
        }
        if resources
            .iter()
            .any(|r: &Resource| r.id.resource_type == entry.resource_type && r.id.name == entry.name)
        {
            return Err(format!(
                "Duplicate resource {}.{}",
                entry.resource_type, entry.name
            ));
        }

        let read_only = is_data_source(&entry.resource_type);
        let mut resource = Resource::new(entry.resource_type, entry.name).with_read_only(read_only);
        for (key, value) in &entry.attributes {
            if let Some(value) = Value::from_json(value) {
                resource = resource.with_attribute(key.clone(), value);
            }
        }
        resources.push(resource);
    }

    Ok(resources)
}

pub fn load(path: &Path, is_data_source: impl Fn(&str) -> bool) -> Result<Vec<Resource>, String> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    parse(&text, is_data_source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn data_sources(t: &str) -> bool {
        t == "instances"
    }

    #[test]
    fn parse_resources_and_data_sources() {
        let text = r#"{
            "resources": [
                {"type": "cbs_storage", "name": "data", "attributes": {"storage_size": 100, "snapshot_id": null}},
                {"type": "instances", "name": "all"}
            ]
        }"#;
        let resources = parse(text, data_sources).unwrap();

        assert_eq!(resources.len(), 2);
        assert!(!resources[0].is_data_source());
        assert_eq!(
            resources[0].attributes.get("storage_size"),
            Some(&Value::Int(100))
        );
        assert!(!resources[0].attributes.contains_key("snapshot_id"));
        assert!(resources[1].is_data_source());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let text = r#"{"resources": [
            {"type": "cbs_storage", "name": "data"},
            {"type": "cbs_storage", "name": "data"}
        ]}"#;
        let err = parse(text, data_sources).unwrap_err();
        assert_eq!(err, "Duplicate resource cbs_storage.data");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = parse(r#"{"resources": [], "provider": "aws"}"#, data_sources).unwrap_err();
        assert!(err.starts_with("Invalid manifest"));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"resources": [{{"type": "instance", "name": "web", "attributes": {{"running_flag": false}}}}]}}"#
        )
        .unwrap();

        let resources = load(file.path(), data_sources).unwrap();
        assert_eq!(resources[0].id.to_string(), "instance.web");
        assert_eq!(
            resources[0].attributes.get("running_flag"),
            Some(&Value::Bool(false))
        );
    }

    #[test]
    fn missing_file_is_reported() {
        let err = load(Path::new("/nonexistent/stratus.json"), data_sources).unwrap_err();
        assert!(err.starts_with("Failed to read /nonexistent/stratus.json"));
    }
}
