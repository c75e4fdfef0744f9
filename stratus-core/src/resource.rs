//! Resource - Representing resources and their state

use std::collections::HashMap;

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Unique identifier for a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId {
    /// Resource type (e.g., "instance", "cbs_storage")
    pub resource_type: String,
    /// Resource name (the key the user declared it under)
    pub name: String,
}

impl ResourceId {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.resource_type, self.name)
    }
}

/// Attribute value of a resource
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Bool(bool),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
}

impl Value {
    /// Convert a JSON value into an attribute value.
    ///
    /// Returns `None` for `null`. Floating point numbers are truncated.
    pub fn from_json(value: &serde_json::Value) -> Option<Value> {
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(Value::String(s.clone())),
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Value::Int(i))
                } else {
                    n.as_f64().map(|f| Value::Int(f as i64))
                }
            }
            serde_json::Value::Array(arr) => {
                Some(Value::List(arr.iter().filter_map(Value::from_json).collect()))
            }
            serde_json::Value::Object(obj) => Some(Value::Map(
                obj.iter()
                    .filter_map(|(k, v)| Value::from_json(v).map(|v| (k.clone(), v)))
                    .collect(),
            )),
        }
    }

    /// Convert this attribute value into JSON
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

/// Convert an attribute map into a JSON object
pub fn attributes_to_json(attributes: &HashMap<String, Value>) -> serde_json::Value {
    serde_json::Value::Object(
        attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}

/// Serialize a typed struct into an attribute map, dropping `null` fields
pub fn to_attributes<T: Serialize>(value: &T) -> serde_json::Result<HashMap<String, Value>> {
    match serde_json::to_value(value)? {
        serde_json::Value::Object(obj) => Ok(obj
            .iter()
            .filter_map(|(k, v)| Value::from_json(v).map(|v| (k.clone(), v)))
            .collect()),
        other => Err(serde::ser::Error::custom(format!(
            "expected a struct, got {}",
            other
        ))),
    }
}

/// Desired state declared by the user
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: ResourceId,
    pub attributes: HashMap<String, Value>,
    /// If true, this is a data source (read-only) that won't be modified
    pub read_only: bool,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ResourceId::new(resource_type, name),
            attributes: HashMap::new(),
            read_only: false,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Returns true if this resource is a data source (read-only)
    pub fn is_data_source(&self) -> bool {
        self.read_only
    }

    /// Decode the attributes into a typed configuration struct
    pub fn decode<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(attributes_to_json(&self.attributes))
    }
}

/// Current state fetched from actual infrastructure
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub id: ResourceId,
    /// Cloud-side identifier (e.g., ins-xxx, disk-xxx)
    pub identifier: Option<String>,
    pub attributes: HashMap<String, Value>,
    /// Whether this state exists
    pub exists: bool,
}

impl State {
    pub fn not_found(id: ResourceId) -> Self {
        Self {
            id,
            identifier: None,
            attributes: HashMap::new(),
            exists: false,
        }
    }

    pub fn existing(id: ResourceId, attributes: HashMap<String, Value>) -> Self {
        Self {
            id,
            identifier: None,
            attributes,
            exists: true,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Render this state as a JSON document
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "type": self.id.resource_type,
            "name": self.id.name,
            "identifier": self.identifier,
            "exists": self.exists,
            "attributes": attributes_to_json(&self.attributes),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, Serialize, PartialEq)]
    #[serde(deny_unknown_fields)]
    struct DiskConfig {
        storage_name: String,
        storage_size: u64,
        #[serde(default)]
        encrypt: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        snapshot_id: Option<String>,
    }

    #[test]
    fn json_roundtrip_keeps_nested_values() {
        let value = json!({"name": "web", "tags": {"env": "prod"}, "ports": [80, 443]});
        let converted = Value::from_json(&value).unwrap();
        assert_eq!(converted.to_json(), value);
    }

    #[test]
    fn from_json_drops_nulls() {
        let value = json!({"a": null, "b": 1});
        match Value::from_json(&value).unwrap() {
            Value::Map(map) => {
                assert!(!map.contains_key("a"));
                assert_eq!(map.get("b"), Some(&Value::Int(1)));
            }
            other => panic!("Expected Map, got {:?}", other),
        }
    }

    #[test]
    fn decode_typed_config() {
        let resource = Resource::new("cbs_storage", "data")
            .with_attribute("storage_name", Value::String("data-disk".to_string()))
            .with_attribute("storage_size", Value::Int(100));

        let config: DiskConfig = resource.decode().unwrap();
        assert_eq!(config.storage_name, "data-disk");
        assert_eq!(config.storage_size, 100);
        assert!(!config.encrypt);
    }

    #[test]
    fn decode_rejects_unknown_attributes() {
        let resource = Resource::new("cbs_storage", "data")
            .with_attribute("storage_name", Value::String("data-disk".to_string()))
            .with_attribute("storage_size", Value::Int(100))
            .with_attribute("colour", Value::String("blue".to_string()));

        let err = resource.decode::<DiskConfig>().unwrap_err();
        assert!(err.to_string().contains("colour"));
    }

    #[test]
    fn to_attributes_skips_missing_fields() {
        let config = DiskConfig {
            storage_name: "data-disk".to_string(),
            storage_size: 50,
            encrypt: true,
            snapshot_id: None,
        };
        let attrs = to_attributes(&config).unwrap();
        assert_eq!(attrs.get("storage_size"), Some(&Value::Int(50)));
        assert_eq!(attrs.get("encrypt"), Some(&Value::Bool(true)));
        assert!(!attrs.contains_key("snapshot_id"));
    }

    #[test]
    fn state_builders() {
        let id = ResourceId::new("instance", "web");
        let state = State::not_found(id.clone());
        assert!(!state.exists);

        let state = State::existing(id, HashMap::new()).with_identifier("ins-123");
        assert!(state.exists);
        assert_eq!(state.identifier.as_deref(), Some("ins-123"));
        assert_eq!(state.to_json()["identifier"], json!("ins-123"));
    }
}
