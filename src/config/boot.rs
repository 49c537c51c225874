//! Boot configuration accumulator
//!
//! The boot configuration is a JSON object threaded through every hook's
//! `before_start` stage in priority order, then handed once to the
//! application's `start` call.

use crate::error::{Result, SuiteError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// JSON-shaped configuration handed to the application at boot
///
/// Merges are deep: nested objects are merged key by key, every other value
/// (including arrays) replaces what was there. The last writer per leaf key
/// wins.
///
/// # Example
///
/// ```
/// use suitekit::BootConfig;
/// use serde_json::json;
///
/// let mut config = BootConfig::new();
/// config.merge(json!({ "a": 1 })).unwrap();
/// config.merge(json!({ "b": 2 })).unwrap();
/// config.merge(json!({ "a": 3 })).unwrap();
///
/// assert_eq!(config.into_value(), json!({ "a": 3, "b": 2 }));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BootConfig(Map<String, Value>);

impl BootConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON value; anything but an object is rejected
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(SuiteError::InvalidConfig(format!(
                "expected a JSON object, got {}",
                kind_of(&other)
            ))),
        }
    }

    /// Deep-merge a JSON object into this configuration
    pub fn merge(&mut self, patch: Value) -> Result<()> {
        match patch {
            Value::Object(map) => {
                merge_maps(&mut self.0, map);
                Ok(())
            }
            other => Err(SuiteError::InvalidConfig(format!(
                "only JSON objects can be merged, got {}",
                kind_of(&other)
            ))),
        }
    }

    /// Consuming variant of [`BootConfig::merge`], handy inside `before_start` stages
    pub fn with(mut self, patch: Value) -> Result<Self> {
        self.merge(patch)?;
        Ok(self)
    }

    /// Merge another accumulator into this one
    pub fn absorb(&mut self, other: BootConfig) {
        merge_maps(&mut self.0, other.0);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Look up a nested value with a JSON pointer such as `/db/port`
    pub fn pointer(&self, pointer: &str) -> Option<&Value> {
        if pointer.is_empty() {
            return None;
        }
        let head = pointer.trim_start_matches('/');
        let (first, rest) = match head.split_once('/') {
            Some((first, rest)) => (first, Some(rest)),
            None => (head, None),
        };
        let first = first.replace("~1", "/").replace("~0", "~");
        let value = self.0.get(&first)?;
        match rest {
            Some(rest) => value.pointer(&format!("/{rest}")),
            None => Some(value),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Deserialize the whole configuration into a typed settings struct
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(Value::Object(self.0.clone()))?)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn merge_maps(target: &mut Map<String, Value>, patch: Map<String, Value>) {
    for (key, value) in patch {
        match (target.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_maps(existing, incoming);
            }
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_last_writer_wins_per_leaf() {
        let mut config = BootConfig::new();
        config.merge(json!({ "a": 1 })).unwrap();
        config.merge(json!({ "b": 2 })).unwrap();
        config.merge(json!({ "a": 3 })).unwrap();

        assert_eq!(config.into_value(), json!({ "a": 3, "b": 2 }));
    }

    #[test]
    fn test_nested_objects_merge_key_by_key() {
        let config = BootConfig::new()
            .with(json!({ "db": { "host": "localhost", "port": 5432 } }))
            .unwrap()
            .with(json!({ "db": { "port": 6543 }, "tags": [1, 2] }))
            .unwrap()
            .with(json!({ "tags": [3] }))
            .unwrap();

        assert_eq!(config.pointer("/db/host"), Some(&json!("localhost")));
        assert_eq!(config.pointer("/db/port"), Some(&json!(6543)));
        assert_eq!(config.get("tags"), Some(&json!([3])));
    }

    #[test]
    fn test_pointer_unescapes_top_level_keys() {
        let config = BootConfig::from_value(json!({
            "a/b": { "c/d": 1 },
            "m~n": 2,
        }))
        .unwrap();

        assert_eq!(config.pointer("/a~1b/c~1d"), Some(&json!(1)));
        assert_eq!(config.pointer("/m~0n"), Some(&json!(2)));
        assert_eq!(config.pointer("/a/b"), None);
    }

    #[test]
    fn test_non_object_is_rejected() {
        let mut config = BootConfig::new();
        let err = config.merge(json!([1, 2, 3])).unwrap_err();
        assert!(matches!(err, SuiteError::InvalidConfig(_)));
        assert!(BootConfig::from_value(json!("port")).is_err());
    }

    #[test]
    fn test_deserialize_into_struct() {
        #[derive(Deserialize)]
        struct Server {
            port: u16,
            timeout: u64,
        }

        let config = BootConfig::from_value(json!({ "port": 3000, "timeout": 10 })).unwrap();
        let server: Server = config.deserialize().unwrap();
        assert_eq!(server.port, 3000);
        assert_eq!(server.timeout, 10);
    }
}
