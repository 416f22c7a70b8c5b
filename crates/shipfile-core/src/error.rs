//! Core error types

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum CoreError {
    #[error("Malformed label: {token}. Expected label in form k=v or k!=v")]
    MalformedLabel { token: String },

    #[error("failed to read {path}: {message}")]
    FileAccess { path: String, message: String },

    #[error("invalid glob pattern '{pattern}': {message}")]
    GlobPattern { pattern: String, message: String },

    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("failed to decrypt {path}: {message}")]
    Decrypt { path: String, message: String },

    #[error("invalid --state-values-set entry '{entry}': expected key=value")]
    InvalidSetValue { entry: String },
}

impl CoreError {
    /// Build a parse error from a YAML failure
    pub fn yaml(path: impl Into<String>, err: &serde_yaml::Error) -> Self {
        Self::Parse {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Build a file access error from an IO failure
    pub fn io(path: impl Into<String>, err: &std::io::Error) -> Self {
        Self::FileAccess {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
