//! CLI commands

use clap::Args;
use shipfile_core::{DecryptCache, OsFileSystem};
use shipfile_exec::HelmExecutor;
use shipfile_state::{ResolveOptions, StateResolver, VisitOptions};
use std::path::PathBuf;
use std::sync::Arc;

pub mod build;
pub mod list;
pub mod release;

/// Which manifests to load and which releases to select
#[derive(Args, Debug, Clone, Default)]
pub struct StateArgs {
    /// Manifest file, directory or glob (default: shipfile.yaml or shipfile.d/)
    #[arg(short = 'f', long, env = "SHIPFILE_FILE", global = true)]
    pub file: Option<PathBuf>,

    /// Environment to resolve
    #[arg(short = 'e', long, env = "SHIPFILE_ENVIRONMENT", default_value = "default", global = true)]
    pub environment: String,

    /// Namespace for releases that do not declare one
    #[arg(short = 'n', long, env = "SHIPFILE_NAMESPACE", global = true)]
    pub namespace: Option<String>,

    /// Release selector (k=v or k!=v, comma-separated within one flag); repeat to OR
    #[arg(short = 'l', long = "selector", global = true)]
    pub selectors: Vec<String>,

    /// State values files layered over every environment
    #[arg(long = "state-values-file", global = true)]
    pub state_values_files: Vec<PathBuf>,

    /// State values overrides (key.path=value)
    #[arg(long = "state-values-set", global = true)]
    pub state_values_set: Vec<String>,

    /// Helm binary used for release operations and secrets
    #[arg(long, env = "SHIPFILE_HELM_BINARY", default_value = "helm", global = true)]
    pub helm_binary: String,
}

impl StateArgs {
    pub fn resolve_options(&self, reverse: bool) -> ResolveOptions {
        ResolveOptions {
            file: self.file.clone(),
            environment: self.environment.clone(),
            namespace: self.namespace.clone().unwrap_or_default(),
            selectors: self.selectors.clone(),
            state_values_files: self.state_values_files.clone(),
            state_values_set: self.state_values_set.clone(),
            reverse,
        }
    }

    pub fn visit_options(&self, reverse: bool) -> VisitOptions {
        VisitOptions {
            resolve: self.resolve_options(reverse),
            include_empty: false,
        }
    }
}

/// Options shared by the release operation commands
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Maximum releases processed at once (0 = unbounded)
    #[arg(long, default_value_t = 0)]
    pub concurrency: usize,

    /// Do not add chart repositories before syncing or diffing
    #[arg(long)]
    pub skip_repos: bool,
}

/// Resolver over the real filesystem, decrypting secrets with helm
pub fn state_resolver(args: &StateArgs, cache: DecryptCache) -> StateResolver {
    let helm = Arc::new(HelmExecutor::new(&args.helm_binary).with_cache(cache.clone()));
    StateResolver::new(Arc::new(OsFileSystem))
        .with_decryptor(helm)
        .with_cache(cache)
}
