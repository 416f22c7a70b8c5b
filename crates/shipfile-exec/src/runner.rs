//! Concurrent release runner
//!
//! Drives one operation over the releases of a resolved state, with bounded
//! concurrency and lifecycle hooks around each release.

use futures::stream::{self, StreamExt};
use shipfile_core::{FileSystem, HookEvent, RepositorySpec};
use shipfile_engine::Engine;
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::Result;
use crate::executor::{Operation, ReleaseContext, ReleaseExecutor};
use crate::hooks;

/// Outcome of one operation on one release
#[derive(Debug)]
pub struct ReleaseOutcome {
    pub release: String,
    pub namespace: String,
    pub operation: Operation,
    /// Tool output on success
    pub result: Result<String>,
}

impl ReleaseOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Runs release operations through an executor
#[derive(Clone)]
pub struct Runner {
    executor: Arc<dyn ReleaseExecutor>,
    fs: Arc<dyn FileSystem>,
    /// Maximum releases processed at once; 0 means unbounded
    concurrency: usize,
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

impl Runner {
    pub fn new(executor: Arc<dyn ReleaseExecutor>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            executor,
            fs,
            concurrency: 0,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Register chart repositories, each name at most once
    pub async fn prepare_repositories(&self, repositories: &[RepositorySpec]) -> Result<usize> {
        let mut seen = HashSet::new();
        for repository in repositories {
            if !seen.insert(repository.name.as_str()) {
                continue;
            }
            tracing::info!(repository = %repository.name, url = %repository.url, "adding repository");
            self.executor.add_repository(repository).await?;
        }
        Ok(seen.len())
    }

    /// Run `operation` on every release
    ///
    /// Every release is attempted; outcomes come back in input order.
    pub async fn run(&self, operation: Operation, releases: Vec<ReleaseContext>) -> Vec<ReleaseOutcome> {
        let limit = match self.concurrency {
            0 => releases.len().max(1),
            n => n,
        };

        stream::iter(releases)
            .map(|ctx| async move {
                let result = self
                    .run_one(operation, &ctx)
                    .await
                    .map_err(|e| e.for_release(ctx.name(), operation));
                ReleaseOutcome {
                    release: ctx.release.name.clone(),
                    namespace: ctx.namespace.clone(),
                    operation,
                    result,
                }
            })
            .buffered(limit)
            .collect()
            .await
    }

    async fn run_one(&self, operation: Operation, ctx: &ReleaseContext) -> Result<String> {
        let engine = Engine::new(Arc::clone(&self.fs), ctx.base_dir.clone());
        let executor = self.executor.as_ref();

        tracing::debug!(release = %ctx.name(), %operation, "processing release");

        match operation {
            Operation::Sync => {
                hooks::fire(executor, &engine, HookEvent::Prepare, ctx).await?;
                let result = self.sync(&engine, ctx).await;
                finish(result, hooks::fire(executor, &engine, HookEvent::Cleanup, ctx).await)
            }
            Operation::Diff => {
                hooks::fire(executor, &engine, HookEvent::Prepare, ctx).await?;
                let result = executor.diff(ctx).await;
                finish(result, hooks::fire(executor, &engine, HookEvent::Cleanup, ctx).await)
            }
            Operation::Delete => {
                let result = self.delete(&engine, ctx).await;
                finish(result, hooks::fire(executor, &engine, HookEvent::Cleanup, ctx).await)
            }
            Operation::Test | Operation::Status => executor.run(operation, ctx).await,
        }
    }

    async fn sync(&self, engine: &Engine, ctx: &ReleaseContext) -> Result<String> {
        let executor = self.executor.as_ref();

        hooks::fire(executor, engine, HookEvent::Presync, ctx).await?;
        let output = if ctx.release.installed {
            executor.sync(ctx).await?
        } else {
            self.delete(engine, ctx).await?
        };
        hooks::fire(executor, engine, HookEvent::Postsync, ctx).await?;

        Ok(output)
    }

    async fn delete(&self, engine: &Engine, ctx: &ReleaseContext) -> Result<String> {
        let executor = self.executor.as_ref();

        hooks::fire(executor, engine, HookEvent::Preuninstall, ctx).await?;
        let output = executor.delete(ctx).await?;
        hooks::fire(executor, engine, HookEvent::Postuninstall, ctx).await?;

        Ok(output)
    }
}

/// Cleanup hooks run even when the operation failed; the operation's error wins
fn finish(result: Result<String>, cleanup: Result<usize>) -> Result<String> {
    let output = result?;
    cleanup?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExecError;
    use crate::mock::MockExecutor;
    use shipfile_core::{Environment, HelmDefaults, HookSpec, MemoryFileSystem, ReleaseSpec};

    fn runner(mock: &MockExecutor) -> Runner {
        Runner::new(Arc::new(mock.clone()), Arc::new(MemoryFileSystem::new("/work")))
    }

    fn release(name: &str) -> ReleaseContext {
        ReleaseContext::new(
            ReleaseSpec::new(name, format!("charts/{}", name)),
            Environment::new("default"),
            "/work",
            HelmDefaults::default(),
        )
    }

    fn with_hooks(mut ctx: ReleaseContext) -> ReleaseContext {
        let events = [
            HookEvent::Prepare,
            HookEvent::Presync,
            HookEvent::Postsync,
            HookEvent::Preuninstall,
            HookEvent::Postuninstall,
            HookEvent::Cleanup,
        ];
        ctx.hooks = events
            .iter()
            .map(|event| HookSpec {
                name: event.to_string(),
                events: vec![*event],
                command: "echo".into(),
                args: vec!["{{ event.name }}".into()],
                show_logs: false,
            })
            .collect();
        ctx
    }

    #[tokio::test]
    async fn test_outcomes_keep_input_order() {
        let mock = MockExecutor::new();
        let outcomes = runner(&mock)
            .with_concurrency(2)
            .run(Operation::Sync, vec![release("a"), release("b"), release("c")])
            .await;

        let names: Vec<_> = outcomes.iter().map(|o| o.release.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert!(outcomes.iter().all(ReleaseOutcome::is_success));
        assert_eq!(mock.operation_counts().syncs, 3);
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_other_releases() {
        let mock = MockExecutor::new().fail_on("b", Operation::Sync, "chart not found");
        let outcomes = runner(&mock)
            .with_concurrency(1)
            .run(Operation::Sync, vec![release("a"), release("b"), release("c")])
            .await;

        assert!(outcomes[0].is_success());
        assert!(outcomes[2].is_success());
        match &outcomes[1].result {
            Err(ExecError::ReleaseFailed { release, operation, message }) => {
                assert_eq!(release, "b");
                assert_eq!(operation, "sync");
                assert!(message.contains("chart not found"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sync_hook_order() {
        let mock = MockExecutor::new();
        runner(&mock).run(Operation::Sync, vec![with_hooks(release("web"))]).await;

        let kinds: Vec<_> = mock
            .calls()
            .into_iter()
            .map(|c| if c.kind == "exec" { c.target } else { c.kind })
            .collect();
        assert_eq!(kinds, vec!["echo prepare", "echo presync", "sync", "echo postsync", "echo cleanup"]);
    }

    #[tokio::test]
    async fn test_uninstalled_release_is_deleted_on_sync() {
        let mock = MockExecutor::new();
        let mut ctx = with_hooks(release("legacy"));
        ctx.release.installed = false;

        runner(&mock).run(Operation::Sync, vec![ctx]).await;

        assert_eq!(
            mock.targets("exec"),
            vec![
                "echo prepare",
                "echo presync",
                "echo preuninstall",
                "echo postuninstall",
                "echo postsync",
                "echo cleanup"
            ]
        );
        assert_eq!(mock.operation_counts().deletes, 1);
        assert_eq!(mock.operation_counts().syncs, 0);
    }

    #[tokio::test]
    async fn test_cleanup_runs_after_failure() {
        let mock = MockExecutor::new().fail_on("web", Operation::Diff, "boom");
        let outcomes = runner(&mock).run(Operation::Diff, vec![with_hooks(release("web"))]).await;

        assert!(!outcomes[0].is_success());
        assert_eq!(mock.targets("exec"), vec!["echo prepare", "echo cleanup"]);
    }

    #[tokio::test]
    async fn test_repositories_are_added_once() {
        let mock = MockExecutor::new();
        let repo = |name: &str| RepositorySpec {
            name: name.into(),
            url: format!("https://charts.example.com/{}", name),
            oci: false,
        };

        let added = runner(&mock)
            .prepare_repositories(&[repo("stable"), repo("bitnami"), repo("stable")])
            .await
            .unwrap();

        assert_eq!(added, 2);
        assert_eq!(mock.targets("repo"), vec!["stable", "bitnami"]);
    }
}
