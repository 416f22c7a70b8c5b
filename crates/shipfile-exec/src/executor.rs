//! The release executor boundary
//!
//! Everything that touches the outside world (helm, hook commands, secret
//! decryption) goes through [`ReleaseExecutor`]. Implementations:
//! - [`HelmExecutor`](crate::HelmExecutor): runs the helm binary
//! - [`MockExecutor`](crate::MockExecutor): records calls in memory

use async_trait::async_trait;
use shipfile_core::{Environment, HelmDefaults, HookSpec, ReleaseSpec, RepositorySpec, ValueMap};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Release operation verbs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Sync,
    Diff,
    Delete,
    Test,
    Status,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Diff => "diff",
            Self::Delete => "delete",
            Self::Test => "test",
            Self::Status => "status",
        }
    }

    /// Whether releases are processed in teardown order
    pub fn is_teardown(&self) -> bool {
        matches!(self, Self::Delete)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything an executor needs to operate on one release
#[derive(Debug, Clone)]
pub struct ReleaseContext {
    /// Rendered release
    pub release: ReleaseSpec,

    /// Environment the release was resolved in
    pub environment: Environment,

    /// Target namespace; empty means the tool's default
    pub namespace: String,

    /// Directory relative values files resolve against
    pub base_dir: PathBuf,

    pub helm_defaults: HelmDefaults,

    /// Manifest-level hooks followed by the release's own
    pub hooks: Vec<HookSpec>,
}

impl ReleaseContext {
    pub fn new(
        release: ReleaseSpec,
        environment: Environment,
        base_dir: impl Into<PathBuf>,
        helm_defaults: HelmDefaults,
    ) -> Self {
        let namespace = release.namespace.clone().unwrap_or_default();
        let hooks = release.hooks.clone();
        Self {
            release,
            environment,
            namespace,
            base_dir: base_dir.into(),
            helm_defaults,
            hooks,
        }
    }

    /// Fire the manifest's hooks too, ahead of the release's own
    pub fn with_manifest_hooks(mut self, hooks: &[HookSpec]) -> Self {
        let mut all = hooks.to_vec();
        all.append(&mut self.hooks);
        self.hooks = all;
        self
    }

    pub fn name(&self) -> &str {
        &self.release.name
    }

    /// Flattened environment values
    pub fn values(&self) -> ValueMap {
        self.environment.merged_values()
    }
}

/// Executes release operations against the outside world
///
/// Implementations must be Send + Sync for use across async tasks.
#[async_trait]
pub trait ReleaseExecutor: Send + Sync {
    /// Register a chart repository
    async fn add_repository(&self, repository: &RepositorySpec) -> Result<()>;

    /// Install or upgrade a release
    async fn sync(&self, ctx: &ReleaseContext) -> Result<String>;

    /// Show what a sync would change
    async fn diff(&self, ctx: &ReleaseContext) -> Result<String>;

    /// Uninstall a release
    async fn delete(&self, ctx: &ReleaseContext) -> Result<String>;

    /// Run the release's tests
    async fn test(&self, ctx: &ReleaseContext) -> Result<String>;

    /// Report the release's status
    async fn status(&self, ctx: &ReleaseContext) -> Result<String>;

    /// Decrypt a secrets file into plain YAML
    async fn decrypt_secret(&self, path: &Path) -> Result<Vec<u8>>;

    /// Run an arbitrary command (hooks)
    async fn exec(&self, command: &str, args: &[String], dir: &Path) -> Result<String>;

    /// Dispatch one operation verb
    async fn run(&self, operation: Operation, ctx: &ReleaseContext) -> Result<String> {
        match operation {
            Operation::Sync => self.sync(ctx).await,
            Operation::Diff => self.diff(ctx).await,
            Operation::Delete => self.delete(ctx).await,
            Operation::Test => self.test(ctx).await,
            Operation::Status => self.status(ctx).await,
        }
    }
}
