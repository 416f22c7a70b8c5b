//! Shipfile Engine - MiniJinja templating for manifests
//!
//! This crate provides the two template passes of manifest resolution:
//! - pre-render of raw manifest text before it is parsed
//! - post-render of release fields once environment values are merged
//!
//! Templates get `environment`, `values` and `namespace`, plus `release`
//! when expanding a release and `event` when firing a hook.

pub mod context;
pub mod engine;
pub mod error;
pub mod filters;
pub mod functions;

pub use context::TemplateContext;
pub use engine::{Engine, EngineBuilder, is_template};
pub use error::{EngineError, Result, TemplateError, TemplateErrorKind};
