//! Release declarations

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

use crate::values::ValueMap;

/// A release as declared in a manifest
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseSpec {
    /// Release name
    pub name: String,

    /// Chart reference: local path or `repo/chart`
    #[serde(default)]
    pub chart: String,

    /// Target namespace; falls back to the run's namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Chart version constraint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Labels used by selectors
    #[serde(default, deserialize_with = "deserialize_labels")]
    pub labels: BTreeMap<String, String>,

    /// Values files (relative to the manifest) or inline value maps
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<ValuesEntry>,

    /// Encrypted values files
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<String>,

    /// Individual `--set` style overrides
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub set: Vec<SetValue>,

    /// Whether the release should exist; `false` means it is deleted on sync
    #[serde(default = "default_true")]
    pub installed: bool,

    /// Lifecycle hooks
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub hooks: Vec<HookSpec>,

    /// Any other release field, kept in declaration order
    #[serde(flatten)]
    pub extra: IndexMap<String, JsonValue>,
}

fn default_true() -> bool {
    true
}

impl ReleaseSpec {
    /// Create a release with just a name and chart
    pub fn new(name: impl Into<String>, chart: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            chart: chart.into(),
            namespace: None,
            version: None,
            labels: BTreeMap::new(),
            values: Vec::new(),
            secrets: Vec::new(),
            set: Vec::new(),
            installed: true,
            hooks: Vec::new(),
            extra: IndexMap::new(),
        }
    }

    /// Labels used for selection
    ///
    /// The release's `name`, `namespace` and `chart` are always selectable;
    /// explicitly declared labels take precedence.
    pub fn selector_labels(&self) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        labels.insert("name".to_string(), self.name.clone());
        labels.insert("chart".to_string(), self.chart.clone());
        if let Some(ns) = &self.namespace {
            labels.insert("namespace".to_string(), ns.clone());
        }
        labels.extend(self.labels.iter().map(|(k, v)| (k.clone(), v.clone())));
        labels
    }

    /// Namespace of the release, or the fallback
    pub fn namespace_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.namespace
            .as_deref()
            .filter(|ns| !ns.is_empty())
            .unwrap_or(fallback)
    }
}

/// A `set` entry of a release
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SetValue {
    pub name: String,
    #[serde(default)]
    pub value: JsonValue,
}

/// One element of a `values:` list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ValuesEntry {
    /// Path to a values file, relative to the owning manifest
    Path(String),
    /// Inline values
    Inline(ValueMap),
}

/// Release lifecycle events a hook can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookEvent {
    Prepare,
    Presync,
    Postsync,
    Preuninstall,
    Postuninstall,
    Cleanup,
}

impl HookEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prepare => "prepare",
            Self::Presync => "presync",
            Self::Postsync => "postsync",
            Self::Preuninstall => "preuninstall",
            Self::Postuninstall => "postuninstall",
            Self::Cleanup => "cleanup",
        }
    }
}

impl std::fmt::Display for HookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A command run on release lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HookSpec {
    #[serde(default)]
    pub name: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub events: Vec<HookEvent>,

    pub command: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub args: Vec<String>,

    /// Print the hook's output
    #[serde(default, rename = "showlogs")]
    pub show_logs: bool,
}

impl HookSpec {
    pub fn triggers_on(&self, event: HookEvent) -> bool {
        self.events.contains(&event)
    }
}

/// A key written with no body (`hooks:`) reads as its empty default
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Label values may be written as any YAML scalar; they are compared as strings
fn deserialize_labels<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let raw = Option::<BTreeMap<String, JsonValue>>::deserialize(deserializer)?.unwrap_or_default();
    raw.into_iter()
        .map(|(k, v)| {
            let value = match v {
                JsonValue::String(s) => s,
                JsonValue::Bool(b) => b.to_string(),
                JsonValue::Number(n) => n.to_string(),
                JsonValue::Null => String::new(),
                other => {
                    return Err(D::Error::custom(format!(
                        "label \"{}\" must be a scalar, got {}",
                        k, other
                    )));
                }
            };
            Ok((k, value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_deserialize_keeps_extra_fields() {
        let release: ReleaseSpec = serde_json::from_value(serde_json::json!({
            "name": "prometheus",
            "chart": "stable/prometheus",
            "labels": { "tier": "monitoring", "enabled": true, "shard": 2 },
            "values": ["values.yaml", { "replicas": 2 }],
            "atomic": true
        }))
        .unwrap();

        assert_eq!(release.labels["enabled"], "true");
        assert_eq!(release.labels["shard"], "2");
        assert!(release.installed);
        assert_eq!(release.values.len(), 2);
        assert!(matches!(&release.values[0], ValuesEntry::Path(p) if p == "values.yaml"));
        assert_eq!(release.extra["atomic"], serde_json::json!(true));
    }

    #[test]
    fn test_selector_labels_include_name() {
        let mut release = ReleaseSpec::new("grafana", "stable/grafana");
        release.labels.insert("name".into(), "override".into());
        release.namespace = Some("monitoring".into());

        let labels = release.selector_labels();
        assert_eq!(labels["name"], "override");
        assert_eq!(labels["namespace"], "monitoring");
        assert_eq!(labels["chart"], "stable/grafana");
    }

    #[test]
    fn test_hook_events() {
        let hook: HookSpec = serde_json::from_value(serde_json::json!({
            "name": "notify",
            "events": ["presync", "postsync"],
            "command": "echo",
            "args": ["{{ release.name }}"],
            "showlogs": true
        }))
        .unwrap();

        assert!(hook.triggers_on(HookEvent::Presync));
        assert!(!hook.triggers_on(HookEvent::Cleanup));
        assert!(hook.show_logs);
    }
}
