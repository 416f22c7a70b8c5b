//! Resolved desired state of one manifest file

use serde::Serialize;
use shipfile_core::{Environment, HelmDefaults, HookSpec, ReleaseSpec, RepositorySpec, ValueMap};
use std::path::PathBuf;

/// One manifest's merged, filtered and template-expanded release set
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedState {
    /// Absolute path of the manifest
    pub file_path: PathBuf,

    /// Directory every relative reference of the manifest resolves against
    pub base_dir: PathBuf,

    /// Environment in effect for this manifest
    pub environment: Environment,

    /// Namespace requested for the run, empty when unset
    pub namespace: String,

    /// Selected releases, in declaration order
    pub releases: Vec<ReleaseSpec>,

    /// Manifest-level hooks
    pub hooks: Vec<HookSpec>,

    pub repositories: Vec<RepositorySpec>,

    pub helm_defaults: HelmDefaults,

    /// Raw selector sets the releases were filtered with
    pub selectors: Vec<String>,
}

impl ResolvedState {
    /// Flattened environment values, as templates see them
    pub fn values(&self) -> ValueMap {
        self.environment.merged_values()
    }

    /// Display form of the manifest path
    pub fn file_name(&self) -> String {
        self.file_path.display().to_string()
    }

    pub fn release_names(&self) -> Vec<&str> {
        self.releases.iter().map(|r| r.name.as_str()).collect()
    }

    /// Whether nothing was selected from this manifest
    pub fn is_empty(&self) -> bool {
        self.releases.is_empty()
    }
}
