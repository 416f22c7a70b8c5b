//! Build command - print the resolved state of every manifest

use serde::Serialize;
use shipfile_core::{DecryptCache, HelmDefaults, HookSpec, ReleaseSpec, RepositorySpec, ValueMap};
use shipfile_state::{ResolvedState, StateResolver, VisitOptions, visit};

use super::{StateArgs, state_resolver};
use crate::error::{CliError, Result};

/// Serialized form of one resolved manifest
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BuiltState<'a> {
    file: String,
    environment: &'a str,
    values: ValueMap,
    releases: &'a [ReleaseSpec],
    #[serde(skip_serializing_if = "is_empty")]
    hooks: &'a [HookSpec],
    #[serde(skip_serializing_if = "is_empty")]
    repositories: &'a [RepositorySpec],
    #[serde(skip_serializing_if = "is_default")]
    helm_defaults: &'a HelmDefaults,
}

fn is_empty<T>(items: &&[T]) -> bool {
    items.is_empty()
}

fn is_default(defaults: &&HelmDefaults) -> bool {
    **defaults == HelmDefaults::default()
}

impl<'a> BuiltState<'a> {
    fn new(state: &'a ResolvedState) -> Self {
        Self {
            file: state.file_name(),
            environment: &state.environment.name,
            values: state.values(),
            releases: &state.releases,
            hooks: &state.hooks,
            repositories: &state.repositories,
            helm_defaults: &state.helm_defaults,
        }
    }
}

/// Run the build command
pub fn run(args: &StateArgs) -> Result<()> {
    print!("{}", build(&state_resolver(args, DecryptCache::new()), args)?);
    Ok(())
}

/// One YAML document per manifest, in visitation order
pub fn build(resolver: &StateResolver, args: &StateArgs) -> Result<String> {
    let options = VisitOptions {
        include_empty: true,
        ..args.visit_options(false)
    };

    let mut output = String::new();
    let errors = visit::<CliError, _>(resolver, &options, |state| {
        let yaml = serde_yaml::to_string(&BuiltState::new(state))
            .map_err(|e| vec![CliError::internal(e.to_string())])?;
        output.push_str("---\n");
        output.push_str(&yaml);
        Ok(())
    });
    CliError::aggregate(errors)?;

    Ok(output)
}
