//! Error types for shipfile-state

use miette::Diagnostic;
use shipfile_core::CoreError;
use shipfile_engine::EngineError;
use thiserror::Error;

/// Result type for state resolution
pub type Result<T> = std::result::Result<T, StateError>;

/// Errors that abort state resolution
#[derive(Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum StateError {
    /// A selector expression could not be parsed
    #[error("failed to filter releases in {file}: {source}")]
    #[diagnostic(code(shipfile::state::selector))]
    Selector { file: String, source: CoreError },

    /// Two or more releases share a name under the active selector
    #[error(
        "duplicate release \"{name}\" found in {file}: there were {count} releases named \"{name}\" matching specified selector"
    )]
    #[diagnostic(code(shipfile::state::duplicate_release))]
    DuplicateRelease {
        name: String,
        file: String,
        count: usize,
    },

    /// The requested environment is not declared by the manifest
    #[error("environment \"{name}\" is not defined in {file}")]
    #[diagnostic(
        code(shipfile::state::undefined_environment),
        help("declare it under `environments:` or pick one with --environment")
    )]
    UndefinedEnvironment { name: String, file: String },

    /// An import matched no files
    #[error("no manifests match \"{pattern}\" imported from {file}")]
    #[diagnostic(code(shipfile::state::unresolved_import))]
    UnresolvedImport { pattern: String, file: String },

    /// A manifest imports itself through its descendants
    #[error("import cycle detected: {chain}")]
    #[diagnostic(code(shipfile::state::import_cycle))]
    ImportCycle { chain: String },

    /// No manifest was given and none was found in the working directory
    #[error("no shipfile.yaml or shipfile.d/*.yaml found in {dir}")]
    #[diagnostic(help("pass a manifest with --file"))]
    NoManifest { dir: String },

    /// The manifest given on the command line does not exist
    #[error("manifest {path} does not exist")]
    ManifestNotFound { path: String },

    /// A values file referenced by an environment is missing
    #[error("values file {path} referenced in {file} does not exist")]
    #[diagnostic(help("set `missingFileHandler: Warn` to skip missing files"))]
    MissingValuesFile { path: String, file: String },

    /// A secrets file was referenced but nothing can decrypt it
    #[error("cannot read secrets file {path}: no decryptor configured")]
    NoDecryptor { path: String },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Template(#[from] EngineError),
}
