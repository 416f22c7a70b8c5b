//! Shipfile Exec - release operations for resolved states
//!
//! This crate provides:
//! - `ReleaseExecutor`: the boundary to helm and hook commands
//! - `HelmExecutor`: runs the helm binary via `tokio::process`
//! - `MockExecutor`: in-memory executor for tests
//! - `Runner`: bounded-concurrency processing with lifecycle hooks

pub mod error;
pub mod executor;
pub mod helm;
pub mod hooks;
pub mod mock;
pub mod runner;

pub use error::{ExecError, Result};
pub use executor::{Operation, ReleaseContext, ReleaseExecutor};
pub use helm::{DEFAULT_HELM_BINARY, HelmExecutor};
pub use hooks::RenderedHook;
pub use mock::{MockExecutor, OperationCounts, RecordedCall};
pub use runner::{ReleaseOutcome, Runner};
