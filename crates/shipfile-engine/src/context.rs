//! Data exposed to templates

use serde::Serialize;
use serde_json::Value as JsonValue;
use shipfile_core::{Environment, HookEvent, ReleaseSpec, ValueMap};

use crate::error::{EngineError, Result};

/// Template context
///
/// Available in templates as:
/// - `environment.name`, `environment.values`
/// - `values`: the flattened environment values
/// - `namespace`: the run's namespace, empty when unset
/// - `release`: the release being expanded (post-render and hooks only)
/// - `event`: the hook event (`event.name`), hooks only
#[derive(Debug, Clone, Serialize)]
pub struct TemplateContext {
    pub environment: JsonValue,
    pub values: ValueMap,
    pub namespace: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub release: Option<JsonValue>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<JsonValue>,
}

impl TemplateContext {
    /// Context for the pre-render pass of a manifest
    pub fn new(environment: &Environment, namespace: &str) -> Self {
        Self {
            environment: environment.to_template_value(),
            values: environment.merged_values(),
            namespace: namespace.to_string(),
            release: None,
            event: None,
        }
    }

    /// Add the release being expanded
    pub fn with_release(mut self, release: &ReleaseSpec) -> Result<Self> {
        let value = serde_json::to_value(release).map_err(|e| EngineError::Conversion {
            what: format!("release \"{}\"", release.name),
            message: e.to_string(),
        })?;
        self.release = Some(value);
        Ok(self)
    }

    /// Add the hook event being fired
    pub fn with_event(mut self, event: HookEvent) -> Self {
        self.event = Some(serde_json::json!({ "name": event.as_str() }));
        self
    }
}
