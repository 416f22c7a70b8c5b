//! Shipfile Core - data model for declarative release orchestration
//!
//! This crate provides the foundational types used throughout shipfile:
//! - `Environment`: named values and defaults with override merge
//! - `Values`: string-keyed value trees and typed path lookup
//! - `LabelFilter`: the `k=v` / `k!=v` selector language
//! - `ManifestDocument` / `ReleaseSpec`: the manifest document model
//! - `FileSystem`: injectable filesystem access
//! - `DecryptCache`: per-run cache of decrypted secret files

pub mod environment;
pub mod error;
pub mod files;
pub mod manifest;
pub mod release;
pub mod secrets;
pub mod selector;
pub mod values;

pub use environment::{DEFAULT_ENVIRONMENT, Environment};
pub use error::{CoreError, Result};
pub use files::{FileSystem, MemoryFileSystem, OsFileSystem, normalize_path};
pub use manifest::{
    EnvironmentSpec, HelmDefaults, ManifestDocument, MissingFileHandler, RepositorySpec,
    SubManifestSpec,
};
pub use release::{HookEvent, HookSpec, ReleaseSpec, SetValue, ValuesEntry};
pub use secrets::{DecryptCache, SecretDecryptor};
pub use selector::{LabelExpr, LabelFilter, LabelOp, any_matches, parse_selector_sets};
pub use values::{LookupError, ValueMap, Values, lookup_path, normalize_keys, parse_set_values};
