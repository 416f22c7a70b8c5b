//! Release commands - sync, diff, delete, test and status

use shipfile_core::{DecryptCache, OsFileSystem};
use shipfile_exec::{HelmExecutor, Operation, ReleaseContext, ReleaseOutcome, Runner};
use shipfile_state::{ResolvedState, StateResolver, visit};
use std::sync::Arc;
use tokio::runtime::Runtime;

use super::{RunArgs, StateArgs};
use crate::display;
use crate::error::{CliError, Result};

/// Run a release operation over every selected release
pub fn run(args: &StateArgs, operation: Operation, run_args: &RunArgs) -> Result<()> {
    let runtime = Runtime::new().map_err(|e| CliError::internal(format!("failed to start runtime: {}", e)))?;

    let cache = DecryptCache::new();
    let helm = Arc::new(HelmExecutor::new(&args.helm_binary).with_cache(cache.clone()));
    let fs = Arc::new(OsFileSystem);

    let resolver = StateResolver::new(fs.clone())
        .with_decryptor(helm.clone())
        .with_cache(cache);
    let runner = Runner::new(helm, fs).with_concurrency(run_args.concurrency);

    execute(&runtime, &resolver, &runner, args, operation, run_args, |file, outcomes| {
        display::print_outcomes(file, outcomes)
    })
}

/// Visit the selected states and run `operation` on their releases
///
/// States are processed one after another; releases within a state run
/// concurrently. Teardown visits states and releases in reverse order.
pub fn execute(
    runtime: &Runtime,
    resolver: &StateResolver,
    runner: &Runner,
    args: &StateArgs,
    operation: Operation,
    run_args: &RunArgs,
    mut report: impl FnMut(&str, &[ReleaseOutcome]),
) -> Result<()> {
    let teardown = operation.is_teardown();

    let errors = visit::<CliError, _>(resolver, &args.visit_options(teardown), |state| {
        if matches!(operation, Operation::Sync | Operation::Diff) && !run_args.skip_repos {
            runtime
                .block_on(runner.prepare_repositories(&state.repositories))
                .map_err(|e| vec![CliError::from(e)])?;
        }

        let outcomes = runtime.block_on(runner.run(operation, release_contexts(state, teardown)));
        report(&state.file_name(), &outcomes);

        let failures: Vec<CliError> = outcomes
            .into_iter()
            .filter_map(|outcome| outcome.result.err().map(CliError::from))
            .collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(failures)
        }
    });

    CliError::aggregate(errors)
}

fn release_contexts(state: &ResolvedState, reverse: bool) -> Vec<ReleaseContext> {
    let mut contexts: Vec<_> = state
        .releases
        .iter()
        .map(|release| {
            ReleaseContext::new(
                release.clone(),
                state.environment.clone(),
                &state.base_dir,
                state.helm_defaults.clone(),
            )
            .with_manifest_hooks(&state.hooks)
        })
        .collect();

    if reverse {
        contexts.reverse();
    }
    contexts
}
