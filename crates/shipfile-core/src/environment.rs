//! Named environments with values and defaults
//!
//! An [`Environment`] is never mutated by a merge: [`Environment::merge`]
//! always returns a fresh copy, so a parent scope can hand its environment to
//! any number of children without them observing each other's overrides.

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::values::{ValueMap, merge_maps, normalize_keys};

/// Name of the environment used when none is requested
pub const DEFAULT_ENVIRONMENT: &str = "default";

/// A named bag of configuration values
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Environment {
    /// Environment name (e.g. "default", "prod")
    pub name: String,

    /// Values, highest precedence
    pub values: ValueMap,

    /// Defaults, overridden by `values`
    pub defaults: ValueMap,
}

impl Environment {
    /// Create an empty environment
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: ValueMap::new(),
            defaults: ValueMap::new(),
        }
    }

    /// Create an environment from already normalized values
    pub fn with_values(name: impl Into<String>, values: ValueMap) -> Self {
        Self {
            name: name.into(),
            values,
            defaults: ValueMap::new(),
        }
    }

    /// Create an environment from loosely typed YAML trees
    ///
    /// Mapping keys are cast to strings at every level; non-mapping inputs
    /// are treated as empty.
    pub fn from_yaml(
        name: impl Into<String>,
        values: serde_yaml::Value,
        defaults: serde_yaml::Value,
    ) -> Self {
        Self {
            name: name.into(),
            values: into_map(normalize_keys(values)),
            defaults: into_map(normalize_keys(defaults)),
        }
    }

    /// Produce a value-independent copy
    pub fn deep_copy(&self) -> Self {
        self.clone()
    }

    /// Merge `overlay` on top of `base`, returning a new environment
    ///
    /// Every field of the overlay wins, explicitly empty ones included. The
    /// name is taken from the overlay when it has one.
    pub fn merge(base: Option<&Environment>, overlay: Option<&Environment>) -> Option<Environment> {
        match (base, overlay) {
            (None, None) => None,
            (Some(base), None) => Some(base.deep_copy()),
            (None, Some(overlay)) => Some(overlay.deep_copy()),
            (Some(base), Some(overlay)) => {
                let mut merged = base.deep_copy();
                if !overlay.name.is_empty() {
                    merged.name = overlay.name.clone();
                }
                merge_maps(&mut merged.values, &overlay.values);
                merge_maps(&mut merged.defaults, &overlay.defaults);
                Some(merged)
            }
        }
    }

    /// Defaults overlaid by values, as one flattened mapping
    ///
    /// This is what templates see as `values`.
    pub fn merged_values(&self) -> ValueMap {
        let mut merged = self.defaults.clone();
        merge_maps(&mut merged, &self.values);
        merged
    }

    /// Template-facing view: `{ name, values }`
    pub fn to_template_value(&self) -> JsonValue {
        serde_json::json!({
            "name": self.name,
            "values": JsonValue::Object(self.merged_values()),
        })
    }
}

fn into_map(value: JsonValue) -> ValueMap {
    match value {
        JsonValue::Object(map) => map,
        _ => ValueMap::new(),
    }
}
