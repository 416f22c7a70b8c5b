//! Manifest document model
//!
//! A manifest is the structured form of one (rendered) manifest file:
//!
//! ```yaml
//! environments:
//!   prod:
//!     values:
//!       - env/prod.yaml
//!       - replicas: 3
//! helmfiles:
//!   - apps/*.yaml
//!   - path: infra/shipfile.yaml
//!     selectors: [tier=infra]
//! releases:
//!   - name: prometheus
//!     chart: prometheus-community/prometheus
//!     labels:
//!       tier: monitoring
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{CoreError, Result};
use crate::release::{HookSpec, ReleaseSpec, ValuesEntry, null_as_default};
use crate::values::normalize_keys;

/// One parsed manifest document
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManifestDocument {
    /// Nested manifests, in declaration order
    #[serde(
        default,
        alias = "imports",
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub helmfiles: Vec<SubManifestSpec>,

    /// Environment declarations; `None` when the document has no block at all
    #[serde(
        default,
        deserialize_with = "deserialize_environments",
        skip_serializing_if = "Option::is_none"
    )]
    pub environments: Option<IndexMap<String, EnvironmentSpec>>,

    /// Releases, in declaration order
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub releases: Vec<ReleaseSpec>,

    /// Hooks applied to every release of this manifest
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub hooks: Vec<HookSpec>,

    /// Chart repositories to register before syncing
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub repositories: Vec<RepositorySpec>,

    /// Defaults passed to every helm invocation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helm_defaults: Option<HelmDefaults>,

    /// What to do when a referenced values file is missing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_file_handler: Option<MissingFileHandler>,
}

impl ManifestDocument {
    /// Parse a rendered document; mapping keys are normalized to strings first
    pub fn from_yaml(path: &str, content: &str) -> Result<Self> {
        let raw: serde_yaml::Value =
            serde_yaml::from_str(content).map_err(|e| CoreError::yaml(path, &e))?;

        // An empty document (or a comment-only part) is an empty manifest
        if raw.is_null() {
            return Ok(Self::default());
        }

        serde_json::from_value(normalize_keys(raw)).map_err(|e| CoreError::Parse {
            path: path.to_string(),
            message: e.to_string(),
        })
    }

    /// Append a later part of a multi-part document to this one
    ///
    /// Lists are appended, environment declarations are combined per name,
    /// scalar settings of the later part win.
    pub fn merge_part(&mut self, part: ManifestDocument) {
        self.helmfiles.extend(part.helmfiles);
        self.releases.extend(part.releases);
        self.hooks.extend(part.hooks);
        self.repositories.extend(part.repositories);

        if let Some(environments) = part.environments {
            let existing = self.environments.get_or_insert_with(IndexMap::new);
            for (name, spec) in environments {
                match existing.get_mut(&name) {
                    Some(current) => current.extend(spec),
                    None => {
                        existing.insert(name, spec);
                    }
                }
            }
        }

        if part.helm_defaults.is_some() {
            self.helm_defaults = part.helm_defaults;
        }
        if part.missing_file_handler.is_some() {
            self.missing_file_handler = part.missing_file_handler;
        }
    }

    /// Whether the document declares an `environments:` block
    pub fn declares_environments(&self) -> bool {
        self.environments.is_some()
    }

    /// Look up a declared environment
    pub fn environment(&self, name: &str) -> Option<&EnvironmentSpec> {
        self.environments.as_ref().and_then(|envs| envs.get(name))
    }
}

/// An environment declaration inside a manifest
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentSpec {
    /// Values layered in order; later entries win
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<ValuesEntry>,

    /// Defaults, overridden by `values`
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub defaults: Vec<ValuesEntry>,

    /// Encrypted values files, layered over `values`
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<String>,

    /// Overrides the manifest-level missing file handling for this environment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_file_handler: Option<MissingFileHandler>,
}

impl EnvironmentSpec {
    fn extend(&mut self, other: EnvironmentSpec) {
        self.values.extend(other.values);
        self.defaults.extend(other.defaults);
        self.secrets.extend(other.secrets);
        if other.missing_file_handler.is_some() {
            self.missing_file_handler = other.missing_file_handler;
        }
    }
}

/// `prod:` with no body declares an empty environment
fn deserialize_environments<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<IndexMap<String, EnvironmentSpec>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<IndexMap<String, Option<EnvironmentSpec>>>::deserialize(deserializer)?;
    Ok(raw.map(|envs| {
        envs.into_iter()
            .map(|(name, spec)| (name, spec.unwrap_or_default()))
            .collect()
    }))
}

/// `values: {..}` and `values: [..]` are both accepted
fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<ValuesEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        Many(Vec<ValuesEntry>),
        One(ValuesEntry),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::Many(entries)) => entries,
        Some(OneOrMany::One(entry)) => vec![entry],
    })
}

/// Reference to a nested manifest
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(from = "RawSubManifest", rename_all = "camelCase")]
pub struct SubManifestSpec {
    /// Path or glob, relative to the declaring manifest
    pub path: String,

    /// Selector sets for the nested manifest; replaces the parent's
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selectors: Option<Vec<String>>,

    /// Pass the parent's selector sets through
    pub selectors_inherited: bool,

    /// Values layered over the inherited environment values
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<ValuesEntry>,
}

impl SubManifestSpec {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            selectors: None,
            selectors_inherited: false,
            values: Vec::new(),
        }
    }

    /// Whether the path holds glob metacharacters
    pub fn is_glob(&self) -> bool {
        self.path.contains(['*', '?', '['])
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSubManifest {
    Path(String),
    Detailed(DetailedSubManifest),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetailedSubManifest {
    path: String,
    #[serde(default)]
    selectors: Option<Vec<String>>,
    #[serde(default)]
    selectors_inherited: bool,
    #[serde(default, deserialize_with = "one_or_many")]
    values: Vec<ValuesEntry>,
}

impl From<RawSubManifest> for SubManifestSpec {
    fn from(raw: RawSubManifest) -> Self {
        match raw {
            RawSubManifest::Path(path) => SubManifestSpec::new(path),
            RawSubManifest::Detailed(d) => SubManifestSpec {
                path: d.path,
                selectors: d.selectors,
                selectors_inherited: d.selectors_inherited,
                values: d.values,
            },
        }
    }
}

/// A chart repository
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RepositorySpec {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub oci: bool,
}

/// Flags applied to every helm invocation
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HelmDefaults {
    #[serde(default)]
    pub kube_context: Option<String>,

    /// Extra arguments appended to every command
    #[serde(default, deserialize_with = "null_as_default")]
    pub args: Vec<String>,

    #[serde(default)]
    pub wait: bool,

    /// Timeout in seconds
    #[serde(default)]
    pub timeout: Option<u64>,

    #[serde(default)]
    pub create_namespace: bool,
}

/// How a missing values file is reported
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissingFileHandler {
    #[default]
    Error,
    Warn,
    Info,
    Debug,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_document() {
        let doc = ManifestDocument::from_yaml(
            "shipfile.yaml",
            r#"
environments:
  default:
    values:
      replicas: 1
  prod:
    values:
      - env/prod.yaml
      - replicas: 3
    secrets:
      - env/prod.secrets.yaml
helmfiles:
  - apps/*.yaml
  - path: infra/shipfile.yaml
    selectors: [tier=infra]
releases:
  - name: prometheus
    chart: prometheus-community/prometheus
    labels:
      tier: monitoring
"#,
        )
        .unwrap();

        let envs = doc.environments.as_ref().unwrap();
        assert_eq!(envs.len(), 2);
        assert_eq!(envs["default"].values.len(), 1);
        assert_eq!(envs["prod"].values.len(), 2);
        assert_eq!(envs["prod"].secrets, vec!["env/prod.secrets.yaml"]);

        assert_eq!(doc.helmfiles.len(), 2);
        assert!(doc.helmfiles[0].is_glob());
        assert_eq!(doc.helmfiles[1].selectors, Some(vec!["tier=infra".to_string()]));
        assert_eq!(doc.releases[0].labels["tier"], "monitoring");
    }

    #[test]
    fn test_imports_alias() {
        let doc = ManifestDocument::from_yaml("a.yaml", "imports:\n  - b.yaml\n").unwrap();
        assert_eq!(doc.helmfiles, vec![SubManifestSpec::new("b.yaml")]);
    }

    #[test]
    fn test_empty_document() {
        let doc = ManifestDocument::from_yaml("a.yaml", "# nothing here\n").unwrap();
        assert_eq!(doc, ManifestDocument::default());
        assert!(!doc.declares_environments());
    }

    #[test]
    fn test_merge_part() {
        let mut first = ManifestDocument::from_yaml(
            "a.yaml",
            "environments:\n  prod:\n    values:\n      - a: 1\nreleases:\n  - name: one\n",
        )
        .unwrap();
        let second = ManifestDocument::from_yaml(
            "a.yaml",
            "environments:\n  prod:\n    values:\n      - b: 2\n  dev: {}\nreleases:\n  - name: two\n",
        )
        .unwrap();

        first.merge_part(second);

        let envs = first.environments.unwrap();
        assert_eq!(envs["prod"].values.len(), 2);
        assert!(envs.contains_key("dev"));
        let names: Vec<_> = first.releases.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["one", "two"]);
    }

    #[test]
    fn test_environment_without_body() {
        let doc = ManifestDocument::from_yaml("a.yaml", "environments:\n  prod:\n").unwrap();
        assert_eq!(doc.environment("prod"), Some(&EnvironmentSpec::default()));
        assert!(doc.environment("staging").is_none());
    }

    #[test]
    fn test_keys_without_body() {
        let doc = ManifestDocument::from_yaml("a.yaml", "releases:\n# none yet\n").unwrap();
        assert!(doc.releases.is_empty());

        let doc = ManifestDocument::from_yaml(
            "a.yaml",
            "helmfiles:\nhooks:\nrepositories:\nhelmDefaults:\n  args:\nreleases:\n  - name: web\n    hooks:\n    secrets:\n    set:\n",
        )
        .unwrap();
        assert!(doc.helmfiles.is_empty());
        assert!(doc.hooks.is_empty());
        assert!(doc.repositories.is_empty());
        assert_eq!(doc.helm_defaults, Some(HelmDefaults::default()));

        let release = &doc.releases[0];
        assert!(release.hooks.is_empty());
        assert!(release.secrets.is_empty());
        assert!(release.set.is_empty());
    }

    #[test]
    fn test_imports_without_body() {
        let doc = ManifestDocument::from_yaml("a.yaml", "imports:\n").unwrap();
        assert!(doc.helmfiles.is_empty());
    }

    #[test]
    fn test_malformed_releases_block() {
        let err = ManifestDocument::from_yaml("a.yaml", "releases: {}\n").unwrap_err();
        assert!(matches!(err, CoreError::Parse { .. }));
    }
}
