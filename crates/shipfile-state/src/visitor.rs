//! Visiting resolved states
//!
//! The resolver runs once; the callback then sees every state in order. A
//! failing callback does not stop the walk: errors are collected and
//! returned together.

use crate::error::StateError;
use crate::resolver::{ResolveOptions, StateResolver};
use crate::state::ResolvedState;

/// Options for [`visit`]
#[derive(Debug, Clone, Default)]
pub struct VisitOptions {
    /// Entry manifest, environment, namespace, selectors and ordering
    pub resolve: ResolveOptions,

    /// Also visit manifests none of whose releases were selected
    pub include_empty: bool,
}

/// Resolve states and invoke `callback` on each, aggregating errors
///
/// A resolution failure is returned as the only error.
pub fn visit<E, F>(resolver: &StateResolver, options: &VisitOptions, mut callback: F) -> Vec<E>
where
    E: From<StateError>,
    F: FnMut(&ResolvedState) -> Result<(), Vec<E>>,
{
    let states = match resolver.resolve(&options.resolve) {
        Ok(states) => states,
        Err(err) => return vec![E::from(err)],
    };

    let mut errors = Vec::new();
    for state in &states {
        if state.is_empty() && !options.include_empty {
            tracing::debug!(file = %state.file_name(), "no releases selected, skipping");
            continue;
        }

        if let Err(state_errors) = callback(state) {
            tracing::debug!(
                file = %state.file_name(),
                errors = state_errors.len(),
                "visit callback failed"
            );
            errors.extend(state_errors);
        }
    }

    errors
}
