//! Release lifecycle hooks
//!
//! A hook is a command bound to one or more [`HookEvent`]s. Its command and
//! arguments are templates rendered when the event fires, with `release`
//! and `event.name` in scope.

use shipfile_core::{HookEvent, HookSpec};
use shipfile_engine::{Engine, TemplateContext, is_template};

use crate::error::{ExecError, Result};
use crate::executor::{ReleaseContext, ReleaseExecutor};

/// A hook with its command line rendered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedHook {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub show_logs: bool,
}

fn hook_name(hook: &HookSpec) -> &str {
    if hook.name.is_empty() {
        &hook.command
    } else {
        &hook.name
    }
}

/// Render the command line of `hook` for `event`
pub fn render_hook(
    engine: &Engine,
    hook: &HookSpec,
    event: HookEvent,
    ctx: &ReleaseContext,
) -> Result<RenderedHook> {
    let name = hook_name(hook).to_string();
    let template_ctx = TemplateContext::new(&ctx.environment, &ctx.namespace)
        .with_release(&ctx.release)?
        .with_event(event);
    let template_name = format!("hook \"{}\" of release \"{}\"", name, ctx.name());

    let render = |s: &str| -> Result<String> {
        if is_template(s) {
            Ok(engine.render_string(s, &template_ctx, &template_name)?)
        } else {
            Ok(s.to_string())
        }
    };

    Ok(RenderedHook {
        command: render(&hook.command)?,
        args: hook.args.iter().map(|a| render(a)).collect::<Result<_>>()?,
        show_logs: hook.show_logs,
        name,
    })
}

/// Fire every hook of `ctx` subscribed to `event`, in declaration order
///
/// Stops at the first failing hook. Returns the number of hooks run.
pub async fn fire(
    executor: &dyn ReleaseExecutor,
    engine: &Engine,
    event: HookEvent,
    ctx: &ReleaseContext,
) -> Result<usize> {
    let mut fired = 0;

    for hook in ctx.hooks.iter().filter(|h| h.triggers_on(event)) {
        let rendered = render_hook(engine, hook, event, ctx).map_err(|e| ExecError::HookFailed {
            hook_name: hook_name(hook).to_string(),
            event: event.to_string(),
            message: e.to_string(),
        })?;

        tracing::debug!(
            release = %ctx.name(),
            hook = %rendered.name,
            %event,
            "firing hook"
        );

        let output = executor
            .exec(&rendered.command, &rendered.args, &ctx.base_dir)
            .await
            .map_err(|e| ExecError::HookFailed {
                hook_name: rendered.name.clone(),
                event: event.to_string(),
                message: e.to_string(),
            })?;

        if rendered.show_logs {
            for line in output.lines() {
                tracing::info!(release = %ctx.name(), hook = %rendered.name, "{}", line);
            }
        }
        fired += 1;
    }

    Ok(fired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockExecutor;
    use shipfile_core::{Environment, HelmDefaults, MemoryFileSystem, ReleaseSpec};
    use std::sync::Arc;

    fn hook(name: &str, events: &[HookEvent], command: &str, args: &[&str]) -> HookSpec {
        HookSpec {
            name: name.to_string(),
            events: events.to_vec(),
            command: command.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            show_logs: false,
        }
    }

    fn engine() -> Engine {
        Engine::new(Arc::new(MemoryFileSystem::new("/work")), "/work")
    }

    fn context(hooks: Vec<HookSpec>) -> ReleaseContext {
        let mut release = ReleaseSpec::new("web", "charts/web");
        release.namespace = Some("apps".into());
        release.hooks = hooks;
        ReleaseContext::new(release, Environment::new("staging"), "/work", HelmDefaults::default())
    }

    #[test]
    fn test_render_hook_sees_release_and_event() {
        let spec = hook(
            "notify",
            &[HookEvent::Presync],
            "echo",
            &["{{ event.name }} {{ release.name }} in {{ release.namespace }} ({{ environment.name }})"],
        );
        let ctx = context(vec![spec.clone()]);

        let rendered = render_hook(&engine(), &spec, HookEvent::Presync, &ctx).unwrap();
        assert_eq!(rendered.command, "echo");
        assert_eq!(rendered.args, vec!["presync web in apps (staging)"]);
    }

    #[tokio::test]
    async fn test_fire_only_matching_events() {
        let ctx = context(vec![
            hook("a", &[HookEvent::Presync], "echo", &["a"]),
            hook("b", &[HookEvent::Postsync], "echo", &["b"]),
            hook("c", &[HookEvent::Presync, HookEvent::Postsync], "echo", &["c"]),
        ]);
        let mock = MockExecutor::new();

        let fired = fire(&mock, &engine(), HookEvent::Presync, &ctx).await.unwrap();

        assert_eq!(fired, 2);
        assert_eq!(mock.targets("exec"), vec!["echo a", "echo c"]);
    }

    #[tokio::test]
    async fn test_manifest_hooks_fire_first() {
        let ctx = context(vec![hook("own", &[HookEvent::Prepare], "own", &[])])
            .with_manifest_hooks(&[hook("global", &[HookEvent::Prepare], "global", &[])]);
        let mock = MockExecutor::new();

        fire(&mock, &engine(), HookEvent::Prepare, &ctx).await.unwrap();
        assert_eq!(mock.targets("exec"), vec!["global", "own"]);
    }

    #[tokio::test]
    async fn test_failing_hook() {
        let ctx = context(vec![
            hook("check", &[HookEvent::Presync], "false", &[]),
            hook("after", &[HookEvent::Presync], "echo", &[]),
        ]);
        let mock = MockExecutor::new().fail_command("false");

        let err = fire(&mock, &engine(), HookEvent::Presync, &ctx).await.unwrap_err();

        assert!(matches!(err, ExecError::HookFailed { ref hook_name, .. } if hook_name == "check"));
        assert_eq!(mock.targets("exec"), vec!["false"]);
    }
}
