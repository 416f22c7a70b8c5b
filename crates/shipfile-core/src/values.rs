//! Value trees with override merge and typed path lookup
//!
//! Every configuration value that reaches a template is a `serde_json::Value`.
//! YAML input may carry non-string mapping keys (`1: a`, `true: b`), so all
//! documents enter through [`normalize_keys`], which casts every key at every
//! nesting level to a string.

use serde_json::Value as JsonValue;
use std::fmt;

use crate::error::{CoreError, Result};

/// A string-keyed mapping of values
pub type ValueMap = serde_json::Map<String, JsonValue>;

/// Values container with override merge capability
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Values(pub JsonValue);

impl Values {
    /// Create empty values
    pub fn new() -> Self {
        Self(JsonValue::Object(ValueMap::new()))
    }

    /// Parse values from a YAML string, normalizing mapping keys
    pub fn from_yaml(yaml: &str) -> std::result::Result<Self, serde_yaml::Error> {
        let raw: serde_yaml::Value = serde_yaml::from_str(yaml)?;
        Ok(Self(normalize_keys(raw)))
    }

    /// Merge another Values into this one (overlay wins, explicit empty wins)
    pub fn merge(&mut self, overlay: &Values) {
        override_merge(&mut self.0, &overlay.0);
    }

    /// Set a value by dotted path (e.g., "image.tag")
    pub fn set(&mut self, path: &str, value: JsonValue) {
        let parts: Vec<&str> = path.split('.').collect();
        set_nested(&mut self.0, &parts, value);
    }

    /// Get a value by dotted path
    pub fn get(&self, path: &str) -> Option<&JsonValue> {
        lookup_path(&self.0, path).ok()
    }

    /// Get the inner JSON value
    pub fn inner(&self) -> &JsonValue {
        &self.0
    }

    /// Convert into a mapping; non-mapping documents become empty
    pub fn into_map(self) -> ValueMap {
        match self.0 {
            JsonValue::Object(map) => map,
            _ => ValueMap::new(),
        }
    }

    /// Check if values are empty
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            JsonValue::Object(map) => map.is_empty(),
            JsonValue::Null => true,
            _ => false,
        }
    }
}

impl From<ValueMap> for Values {
    fn from(map: ValueMap) -> Self {
        Self(JsonValue::Object(map))
    }
}

/// Convert a loosely typed YAML tree into a string-keyed value tree
pub fn normalize_keys(value: serde_yaml::Value) -> JsonValue {
    match value {
        serde_yaml::Value::Null => JsonValue::Null,
        serde_yaml::Value::Bool(b) => JsonValue::Bool(b),
        serde_yaml::Value::Number(n) => yaml_number(&n),
        serde_yaml::Value::String(s) => JsonValue::String(s),
        serde_yaml::Value::Sequence(seq) => {
            JsonValue::Array(seq.into_iter().map(normalize_keys).collect())
        }
        serde_yaml::Value::Mapping(mapping) => {
            let mut map = ValueMap::with_capacity(mapping.len());
            for (k, v) in mapping {
                map.insert(key_to_string(k), normalize_keys(v));
            }
            JsonValue::Object(map)
        }
        serde_yaml::Value::Tagged(tagged) => normalize_keys(tagged.value),
    }
}

fn yaml_number(n: &serde_yaml::Number) -> JsonValue {
    if let Some(i) = n.as_i64() {
        JsonValue::from(i)
    } else if let Some(u) = n.as_u64() {
        JsonValue::from(u)
    } else {
        n.as_f64()
            .and_then(serde_json::Number::from_f64)
            .map(JsonValue::Number)
            .unwrap_or_else(|| JsonValue::String(n.to_string()))
    }
}

fn key_to_string(key: serde_yaml::Value) -> String {
    match key {
        serde_yaml::Value::String(s) => s,
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Null => "null".to_string(),
        other => serde_json::to_string(&normalize_keys(other)).unwrap_or_default(),
    }
}

/// Override-merge `overlay` into `base`
///
/// Rules:
/// - Non-empty mapping over mapping: merged key by key
/// - Anything else, including `""`, `null`, `[]` and `{}`: overlay replaces base
pub fn override_merge(base: &mut JsonValue, overlay: &JsonValue) {
    match (base, overlay) {
        (JsonValue::Object(base_map), JsonValue::Object(overlay_map))
            if !overlay_map.is_empty() =>
        {
            merge_maps(base_map, overlay_map);
        }
        (base, overlay) => {
            *base = overlay.clone();
        }
    }
}

/// Override-merge two mappings in place (see [`override_merge`])
pub fn merge_maps(base: &mut ValueMap, overlay: &ValueMap) {
    for (key, overlay_value) in overlay {
        match base.get_mut(key) {
            Some(base_value) => override_merge(base_value, overlay_value),
            None => {
                base.insert(key.clone(), overlay_value.clone());
            }
        }
    }
}

/// Failure of a dotted path lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// A segment of the path is not present in its parent mapping
    NoSuchKey { path: String, key: String },
    /// A segment had to be looked up in something that is not a mapping
    NotAMap {
        path: String,
        key: String,
        found: &'static str,
    },
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSuchKey { path, key } => {
                write!(f, "no value exists for key \"{}\" in path \"{}\"", key, path)
            }
            Self::NotAMap { path, key, found } => write!(
                f,
                "cannot look up key \"{}\" in path \"{}\": value is a {}, not a mapping",
                key, path, found
            ),
        }
    }
}

impl std::error::Error for LookupError {}

impl LookupError {
    /// Whether this is the recoverable missing-key case
    pub fn is_no_such_key(&self) -> bool {
        matches!(self, Self::NoSuchKey { .. })
    }
}

/// Walk a dot-separated path through nested mappings
///
/// An empty path returns the value itself.
pub fn lookup_path<'a>(value: &'a JsonValue, path: &str) -> std::result::Result<&'a JsonValue, LookupError> {
    if path.is_empty() {
        return Ok(value);
    }

    let mut current = value;
    for key in path.split('.') {
        current = match current {
            JsonValue::Object(map) => map.get(key).ok_or_else(|| LookupError::NoSuchKey {
                path: path.to_string(),
                key: key.to_string(),
            })?,
            other => {
                return Err(LookupError::NotAMap {
                    path: path.to_string(),
                    key: key.to_string(),
                    found: kind_name(other),
                });
            }
        };
    }
    Ok(current)
}

/// Human readable name of a value's kind
pub fn kind_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "sequence",
        JsonValue::Object(_) => "mapping",
    }
}

fn set_nested(value: &mut JsonValue, path: &[&str], new_value: JsonValue) {
    let Some((key, remaining)) = path.split_first() else {
        *value = new_value;
        return;
    };

    if !value.is_object() {
        *value = JsonValue::Object(ValueMap::new());
    }

    if let JsonValue::Object(map) = value {
        if remaining.is_empty() {
            map.insert((*key).to_string(), new_value);
        } else {
            let entry = map
                .entry((*key).to_string())
                .or_insert_with(|| JsonValue::Object(ValueMap::new()));
            set_nested(entry, remaining, new_value);
        }
    }
}

/// Parse `--state-values-set` arguments (key=value format)
pub fn parse_set_values(set_args: &[String]) -> Result<Values> {
    let mut values = Values::new();

    for arg in set_args {
        let (key, val) = arg
            .split_once('=')
            .filter(|(key, _)| !key.is_empty())
            .ok_or_else(|| CoreError::InvalidSetValue { entry: arg.clone() })?;

        let json_value = if val == "true" {
            JsonValue::Bool(true)
        } else if val == "false" {
            JsonValue::Bool(false)
        } else if val == "null" {
            JsonValue::Null
        } else if let Ok(num) = val.parse::<i64>() {
            JsonValue::Number(num.into())
        } else if let Some(num) = val.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
            JsonValue::Number(num)
        } else {
            JsonValue::String(val.to_string())
        };

        values.set(key, json_value);
    }

    Ok(values)
}
