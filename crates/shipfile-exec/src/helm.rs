//! Helm process adapter

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use shipfile_core::{CoreError, DecryptCache, RepositorySpec, SecretDecryptor, ValuesEntry};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tempfile::NamedTempFile;
use tokio::process::Command;

use crate::error::{ExecError, Result};
use crate::executor::{ReleaseContext, ReleaseExecutor};

/// Default helm binary
pub const DEFAULT_HELM_BINARY: &str = "helm";

/// Runs release operations by shelling out to helm
#[derive(Debug, Clone)]
pub struct HelmExecutor {
    binary: String,
    cache: DecryptCache,
}

impl Default for HelmExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_HELM_BINARY)
    }
}

impl HelmExecutor {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            cache: DecryptCache::new(),
        }
    }

    /// Share a decryption cache with other consumers of the run
    pub fn with_cache(mut self, cache: DecryptCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    async fn helm(&self, args: &[String], dir: &Path) -> Result<String> {
        let stdout = run_command(&self.binary, args, dir).await?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }

    /// Values files for a release, materializing inline maps and secrets
    ///
    /// The returned temporary files must outlive the helm invocation.
    async fn values_files(&self, ctx: &ReleaseContext) -> Result<(Vec<PathBuf>, Vec<NamedTempFile>)> {
        let mut paths = Vec::new();
        let mut temps = Vec::new();

        for entry in &ctx.release.values {
            match entry {
                ValuesEntry::Path(path) => paths.push(ctx.base_dir.join(path)),
                ValuesEntry::Inline(map) => {
                    let file = write_temp(&serde_yaml::to_string(map)?)?;
                    paths.push(file.path().to_path_buf());
                    temps.push(file);
                }
            }
        }

        for secret in &ctx.release.secrets {
            let decrypted = self.decrypt_secret(&ctx.base_dir.join(secret)).await?;
            let file = write_temp(&String::from_utf8_lossy(&decrypted))?;
            paths.push(file.path().to_path_buf());
            temps.push(file);
        }

        Ok((paths, temps))
    }
}

impl SecretDecryptor for HelmExecutor {
    fn decrypt(&self, path: &Path) -> shipfile_core::Result<Vec<u8>> {
        decrypt_with(&self.binary, path)
    }
}

#[async_trait]
impl ReleaseExecutor for HelmExecutor {
    async fn add_repository(&self, repository: &RepositorySpec) -> Result<()> {
        if repository.oci {
            tracing::debug!(repository = %repository.name, "OCI repository needs no registration");
            return Ok(());
        }

        let args = vec![
            "repo".to_string(),
            "add".to_string(),
            repository.name.clone(),
            repository.url.clone(),
            "--force-update".to_string(),
        ];
        self.helm(&args, Path::new(".")).await.map(|_| ())
    }

    async fn sync(&self, ctx: &ReleaseContext) -> Result<String> {
        let (files, _temps) = self.values_files(ctx).await?;
        self.helm(&sync_args(ctx, &files), &ctx.base_dir).await
    }

    async fn diff(&self, ctx: &ReleaseContext) -> Result<String> {
        let (files, _temps) = self.values_files(ctx).await?;
        self.helm(&diff_args(ctx, &files), &ctx.base_dir).await
    }

    async fn delete(&self, ctx: &ReleaseContext) -> Result<String> {
        self.helm(&release_args("uninstall", ctx), &ctx.base_dir).await
    }

    async fn test(&self, ctx: &ReleaseContext) -> Result<String> {
        self.helm(&release_args("test", ctx), &ctx.base_dir).await
    }

    async fn status(&self, ctx: &ReleaseContext) -> Result<String> {
        self.helm(&release_args("status", ctx), &ctx.base_dir).await
    }

    async fn decrypt_secret(&self, path: &Path) -> Result<Vec<u8>> {
        let cache = self.cache.clone();
        let binary = self.binary.clone();
        let shown = path.display().to_string();
        let path = path.to_path_buf();

        // Concurrent requests for the same file block on the cache slot, so
        // keep them off the async workers.
        let decrypted = tokio::task::spawn_blocking(move || {
            cache.get_or_decrypt(&path, |p| decrypt_with(&binary, p))
        })
        .await
        .map_err(|e| ExecError::Decrypt {
            path: shown.clone(),
            message: e.to_string(),
        })?;

        decrypted
            .map(|bytes| bytes.to_vec())
            .map_err(|e| match e {
                CoreError::Decrypt { path, message } => ExecError::Decrypt { path, message },
                other => ExecError::Decrypt {
                    path: shown,
                    message: other.to_string(),
                },
            })
    }

    async fn exec(&self, command: &str, args: &[String], dir: &Path) -> Result<String> {
        let stdout = run_command(command, args, dir).await?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }
}

/// `helm upgrade --install` arguments
pub fn sync_args(ctx: &ReleaseContext, values_files: &[PathBuf]) -> Vec<String> {
    let release = &ctx.release;
    let mut args = vec![
        "upgrade".to_string(),
        "--install".to_string(),
        release.name.clone(),
        release.chart.clone(),
    ];
    args.extend(target_flags(ctx));
    args.extend(values_flags(ctx, values_files));

    let defaults = &ctx.helm_defaults;
    if defaults.wait {
        args.push("--wait".to_string());
    }
    if let Some(timeout) = defaults.timeout {
        args.push("--timeout".to_string());
        args.push(format!("{}s", timeout));
    }
    if defaults.create_namespace {
        args.push("--create-namespace".to_string());
    }
    args.extend(defaults.args.iter().cloned());
    args
}

/// `helm diff upgrade` arguments (helm-diff plugin)
pub fn diff_args(ctx: &ReleaseContext, values_files: &[PathBuf]) -> Vec<String> {
    let release = &ctx.release;
    let mut args = vec![
        "diff".to_string(),
        "upgrade".to_string(),
        release.name.clone(),
        release.chart.clone(),
        "--allow-unreleased".to_string(),
    ];
    args.extend(target_flags(ctx));
    args.extend(values_flags(ctx, values_files));
    args
}

/// Arguments for verbs that only need the release name
pub fn release_args(verb: &str, ctx: &ReleaseContext) -> Vec<String> {
    let mut args = vec![verb.to_string(), ctx.release.name.clone()];
    args.extend(target_flags(ctx));
    args
}

fn target_flags(ctx: &ReleaseContext) -> Vec<String> {
    let mut flags = Vec::new();
    if !ctx.namespace.is_empty() {
        flags.push("--namespace".to_string());
        flags.push(ctx.namespace.clone());
    }
    if let Some(context) = &ctx.helm_defaults.kube_context {
        flags.push("--kube-context".to_string());
        flags.push(context.clone());
    }
    flags
}

fn values_flags(ctx: &ReleaseContext, values_files: &[PathBuf]) -> Vec<String> {
    let mut flags = Vec::new();
    if let Some(version) = &ctx.release.version {
        flags.push("--version".to_string());
        flags.push(version.clone());
    }
    for file in values_files {
        flags.push("--values".to_string());
        flags.push(file.display().to_string());
    }
    for set in &ctx.release.set {
        let value = match &set.value {
            JsonValue::String(s) => s.clone(),
            JsonValue::Null => "null".to_string(),
            other => other.to_string(),
        };
        flags.push("--set".to_string());
        flags.push(format!("{}={}", set.name, value));
    }
    flags
}

fn write_temp(content: &str) -> Result<NamedTempFile> {
    use std::io::Write;

    let mut file = tempfile::Builder::new()
        .prefix("shipfile-values-")
        .suffix(".yaml")
        .tempfile()?;
    file.write_all(content.as_bytes())?;
    file.flush()?;
    Ok(file)
}

/// Run a command to completion, returning its stdout
pub async fn run_command(program: &str, args: &[String], dir: &Path) -> Result<Vec<u8>> {
    let command_line = std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ");
    tracing::debug!(command = %command_line, dir = %dir.display(), "running command");

    let output = Command::new(program)
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|source| ExecError::Spawn {
            command: command_line.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(ExecError::CommandFailed {
            command: command_line,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(output.stdout)
}

/// `helm secrets decrypt <file>`, blocking
fn decrypt_with(binary: &str, path: &Path) -> shipfile_core::Result<Vec<u8>> {
    let output = std::process::Command::new(binary)
        .arg("secrets")
        .arg("decrypt")
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| CoreError::Decrypt {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(CoreError::Decrypt {
            path: path.display().to_string(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(output.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipfile_core::{Environment, HelmDefaults, ReleaseSpec, SetValue};

    fn context() -> ReleaseContext {
        let mut release = ReleaseSpec::new("grafana", "stable/grafana");
        release.namespace = Some("monitoring".into());
        release.version = Some("6.1.0".into());
        release.set = vec![
            SetValue {
                name: "replicas".into(),
                value: 2.into(),
            },
            SetValue {
                name: "image.tag".into(),
                value: "10.0".into(),
            },
        ];

        let defaults = HelmDefaults {
            kube_context: Some("prod-cluster".into()),
            args: vec!["--atomic".into()],
            wait: true,
            timeout: Some(300),
            create_namespace: true,
        };

        ReleaseContext::new(release, Environment::new("prod"), "/manifests", defaults)
    }

    #[test]
    fn test_sync_args() {
        let args = sync_args(&context(), &[PathBuf::from("/manifests/values.yaml")]);

        insta::assert_snapshot!(args.join("\n"), @r"
        upgrade
        --install
        grafana
        stable/grafana
        --namespace
        monitoring
        --kube-context
        prod-cluster
        --version
        6.1.0
        --values
        /manifests/values.yaml
        --set
        replicas=2
        --set
        image.tag=10.0
        --wait
        --timeout
        300s
        --create-namespace
        --atomic
        ");
    }

    #[test]
    fn test_release_args() {
        assert_eq!(
            release_args("uninstall", &context()),
            vec!["uninstall", "grafana", "--namespace", "monitoring", "--kube-context", "prod-cluster"]
        );
    }

    #[test]
    fn test_diff_args() {
        let args = diff_args(&context(), &[]);
        assert_eq!(&args[..5], ["diff", "upgrade", "grafana", "stable/grafana", "--allow-unreleased"]);
        assert!(!args.contains(&"--wait".to_string()));
    }

    #[tokio::test]
    async fn test_inline_values_are_materialized() {
        let mut ctx = context();
        ctx.release.values = vec![
            ValuesEntry::Path("values/common.yaml".into()),
            ValuesEntry::Inline(
                serde_json::from_value(serde_json::json!({ "replicas": 3 })).unwrap(),
            ),
        ];

        let executor = HelmExecutor::default();
        let (paths, temps) = executor.values_files(&ctx).await.unwrap();

        assert_eq!(paths[0], PathBuf::from("/manifests/values/common.yaml"));
        assert_eq!(temps.len(), 1);
        assert_eq!(std::fs::read_to_string(&paths[1]).unwrap(), "replicas: 3\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_command_failure() {
        let err = run_command("sh", &["-c".into(), "echo broken >&2; exit 3".into()], Path::new("."))
            .await
            .unwrap_err();

        match err {
            ExecError::CommandFailed { stderr, .. } => assert_eq!(stderr, "broken"),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_command_missing_binary() {
        let err = run_command("definitely-not-a-real-binary", &[], Path::new("."))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Spawn { .. }));
    }
}
