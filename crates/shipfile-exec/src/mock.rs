//! Mock executor for testing
//!
//! Records every call in memory and never touches the outside world, useful
//! for exercising the runner and the CLI without helm installed.

use async_trait::async_trait;
use shipfile_core::RepositorySpec;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{ExecError, Result};
use crate::executor::{Operation, ReleaseContext, ReleaseExecutor};

/// One recorded executor call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// `sync`, `diff`, `delete`, `test`, `status`, `repo`, `decrypt` or `exec`
    pub kind: String,
    /// Release name, repository name, secret path or command line
    pub target: String,
    pub namespace: String,
}

/// Counts of operations performed, for assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperationCounts {
    pub syncs: usize,
    pub diffs: usize,
    pub deletes: usize,
    pub tests: usize,
    pub statuses: usize,
    pub repositories: usize,
    pub decrypts: usize,
    pub execs: usize,
}

/// In-memory executor
#[derive(Debug, Clone, Default)]
pub struct MockExecutor {
    calls: Arc<RwLock<Vec<RecordedCall>>>,
    operations: Arc<RwLock<OperationCounts>>,
    /// (release, operation) -> failure message
    failures: Arc<RwLock<HashMap<(String, Operation), String>>>,
    /// Commands whose execution fails
    failing_commands: Arc<RwLock<Vec<String>>>,
    secrets: Arc<RwLock<HashMap<PathBuf, Vec<u8>>>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `operation` on `release` fail with `message`
    pub fn fail_on(self, release: &str, operation: Operation, message: &str) -> Self {
        write(&self.failures).insert((release.to_string(), operation), message.to_string());
        self
    }

    /// Make every execution of `command` fail
    pub fn fail_command(self, command: &str) -> Self {
        write(&self.failing_commands).push(command.to_string());
        self
    }

    /// Provide the plaintext for an encrypted file
    pub fn with_secret(self, path: impl Into<PathBuf>, plaintext: &str) -> Self {
        write(&self.secrets).insert(path.into(), plaintext.as_bytes().to_vec());
        self
    }

    /// All calls so far, in the order they were made
    pub fn calls(&self) -> Vec<RecordedCall> {
        read(&self.calls).clone()
    }

    /// Targets of the calls of one kind
    pub fn targets(&self, kind: &str) -> Vec<String> {
        read(&self.calls)
            .iter()
            .filter(|call| call.kind == kind)
            .map(|call| call.target.clone())
            .collect()
    }

    pub fn operation_counts(&self) -> OperationCounts {
        read(&self.operations).clone()
    }

    pub fn reset(&self) {
        write(&self.calls).clear();
        *write(&self.operations) = OperationCounts::default();
    }

    fn record(&self, kind: &str, target: &str, namespace: &str) {
        write(&self.calls).push(RecordedCall {
            kind: kind.to_string(),
            target: target.to_string(),
            namespace: namespace.to_string(),
        });

        let mut ops = write(&self.operations);
        match kind {
            "sync" => ops.syncs += 1,
            "diff" => ops.diffs += 1,
            "delete" => ops.deletes += 1,
            "test" => ops.tests += 1,
            "status" => ops.statuses += 1,
            "repo" => ops.repositories += 1,
            "decrypt" => ops.decrypts += 1,
            _ => ops.execs += 1,
        }
    }

    fn release_op(&self, operation: Operation, ctx: &ReleaseContext) -> Result<String> {
        self.record(operation.as_str(), ctx.name(), &ctx.namespace);

        let failure = read(&self.failures)
            .get(&(ctx.name().to_string(), operation))
            .cloned();
        match failure {
            Some(message) => Err(ExecError::CommandFailed {
                command: format!("{} {}", operation, ctx.name()),
                status: "exit status: 1".to_string(),
                stderr: message,
            }),
            None => Ok(format!("{} {}\n", operation, ctx.name())),
        }
    }
}

#[async_trait]
impl ReleaseExecutor for MockExecutor {
    async fn add_repository(&self, repository: &RepositorySpec) -> Result<()> {
        self.record("repo", &repository.name, "");
        Ok(())
    }

    async fn sync(&self, ctx: &ReleaseContext) -> Result<String> {
        self.release_op(Operation::Sync, ctx)
    }

    async fn diff(&self, ctx: &ReleaseContext) -> Result<String> {
        self.release_op(Operation::Diff, ctx)
    }

    async fn delete(&self, ctx: &ReleaseContext) -> Result<String> {
        self.release_op(Operation::Delete, ctx)
    }

    async fn test(&self, ctx: &ReleaseContext) -> Result<String> {
        self.release_op(Operation::Test, ctx)
    }

    async fn status(&self, ctx: &ReleaseContext) -> Result<String> {
        self.release_op(Operation::Status, ctx)
    }

    async fn decrypt_secret(&self, path: &Path) -> Result<Vec<u8>> {
        self.record("decrypt", &path.display().to_string(), "");

        read(&self.secrets)
            .get(path)
            .cloned()
            .ok_or_else(|| ExecError::Decrypt {
                path: path.display().to_string(),
                message: "no such secret".to_string(),
            })
    }

    async fn exec(&self, command: &str, args: &[String], _dir: &Path) -> Result<String> {
        let line = std::iter::once(command)
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        self.record("exec", &line, "");

        if read(&self.failing_commands).iter().any(|c| c == command) {
            return Err(ExecError::CommandFailed {
                command: line,
                status: "exit status: 1".to_string(),
                stderr: "command failed".to_string(),
            });
        }
        Ok(format!("{}\n", line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipfile_core::{Environment, HelmDefaults, ReleaseSpec};

    fn ctx(name: &str) -> ReleaseContext {
        let mut release = ReleaseSpec::new(name, "charts/app");
        release.namespace = Some("apps".into());
        ReleaseContext::new(release, Environment::new("default"), "/work", HelmDefaults::default())
    }

    #[tokio::test]
    async fn test_records_calls() {
        let mock = MockExecutor::new();
        mock.sync(&ctx("web")).await.unwrap();
        mock.delete(&ctx("db")).await.unwrap();

        assert_eq!(
            mock.calls(),
            vec![
                RecordedCall {
                    kind: "sync".into(),
                    target: "web".into(),
                    namespace: "apps".into()
                },
                RecordedCall {
                    kind: "delete".into(),
                    target: "db".into(),
                    namespace: "apps".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let mock = MockExecutor::new().fail_on("web", Operation::Sync, "boom");

        let err = mock.run(Operation::Sync, &ctx("web")).await.unwrap_err();
        assert!(err.to_string().contains("boom"));

        // other operations on the same release still succeed
        assert!(mock.run(Operation::Diff, &ctx("web")).await.is_ok());
    }

    #[tokio::test]
    async fn test_secrets() {
        let mock = MockExecutor::new().with_secret("/work/secrets.yaml", "password: hunter2\n");

        let plain = mock.decrypt_secret(Path::new("/work/secrets.yaml")).await.unwrap();
        assert_eq!(plain, b"password: hunter2\n");

        let err = mock.decrypt_secret(Path::new("/work/other.yaml")).await.unwrap_err();
        assert!(matches!(err, ExecError::Decrypt { .. }));
    }

    #[tokio::test]
    async fn test_operation_counts() {
        let mock = MockExecutor::new();
        mock.sync(&ctx("a")).await.unwrap();
        mock.sync(&ctx("b")).await.unwrap();
        mock.exec("echo", &["hi".into()], Path::new("/work")).await.unwrap();

        let counts = mock.operation_counts();
        assert_eq!(counts.syncs, 2);
        assert_eq!(counts.execs, 1);

        mock.reset();
        assert_eq!(mock.operation_counts(), OperationCounts::default());
        assert!(mock.calls().is_empty());
    }
}
