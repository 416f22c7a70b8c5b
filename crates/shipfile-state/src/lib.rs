//! Shipfile State - from manifest files to an ordered list of release sets
//!
//! - [`ManifestLoader`]: renders and parses one manifest, loads its environment
//! - [`StateResolver`]: expands imports recursively into [`ResolvedState`]s
//! - [`visit`]: runs a callback per resolved state, aggregating errors

pub mod error;
pub mod loader;
pub mod resolver;
pub mod state;
pub mod visitor;

pub use error::{Result, StateError};
pub use loader::{LoadRequest, LoadedManifest, ManifestLoader, parse};
pub use resolver::{DEFAULT_MANIFEST, DEFAULT_MANIFEST_DIR, ResolveOptions, StateResolver};
pub use state::ResolvedState;
pub use visitor::{VisitOptions, visit};
