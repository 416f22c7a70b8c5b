//! Error types for shipfile-exec

use thiserror::Error;

/// Result type for release operations
pub type Result<T> = std::result::Result<T, ExecError>;

/// Errors from running release operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExecError {
    /// A command could not be started
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    /// A command exited unsuccessfully
    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    /// An operation on one release failed
    #[error("{operation} of release \"{release}\" failed: {message}")]
    ReleaseFailed {
        release: String,
        operation: String,
        message: String,
    },

    /// A lifecycle hook failed
    #[error("hook '{hook_name}' failed during {event}: {message}")]
    HookFailed {
        hook_name: String,
        event: String,
        message: String,
    },

    /// A secrets file could not be decrypted
    #[error("failed to decrypt {path}: {message}")]
    Decrypt { path: String, message: String },

    /// Template rendering error
    #[error("template error: {0}")]
    Template(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_yaml::Error> for ExecError {
    fn from(e: serde_yaml::Error) -> Self {
        ExecError::Serialization(e.to_string())
    }
}

impl From<shipfile_engine::EngineError> for ExecError {
    fn from(e: shipfile_engine::EngineError) -> Self {
        ExecError::Template(e.to_string())
    }
}

impl ExecError {
    /// Attach the failing release and operation
    pub fn for_release(self, release: &str, operation: impl std::fmt::Display) -> Self {
        match self {
            ExecError::ReleaseFailed { .. } | ExecError::HookFailed { .. } => self,
            other => ExecError::ReleaseFailed {
                release: release.to_string(),
                operation: operation.to_string(),
                message: other.to_string(),
            },
        }
    }
}
