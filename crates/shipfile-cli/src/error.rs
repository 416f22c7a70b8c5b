//! CLI error types with exit code handling
//!
//! This module provides a unified error type for CLI operations that
//! maps errors to appropriate exit codes.

use miette::Diagnostic;
use shipfile_core::CoreError;
use shipfile_exec::ExecError;
use shipfile_state::StateError;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// Resolving the desired state failed
    #[error(transparent)]
    #[diagnostic(transparent)]
    State(#[from] StateError),

    /// A release operation or hook failed
    #[error("{message}")]
    #[diagnostic(code(shipfile::cli::release))]
    Release { message: String },

    /// Several callbacks failed
    #[error("{} operations failed", related.len())]
    #[diagnostic(code(shipfile::cli::multiple))]
    Multiple {
        #[related]
        related: Vec<CliError>,
    },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(shipfile::cli::io))]
    Io { message: String },

    /// Internal error (runtime, unexpected failure)
    #[error("Internal error: {message}")]
    #[diagnostic(code(shipfile::cli::internal))]
    Internal { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::State(err) => match err {
                StateError::Selector { .. } => exit_codes::VALIDATION_ERROR,
                StateError::Core(CoreError::MalformedLabel { .. } | CoreError::InvalidSetValue { .. }) => {
                    exit_codes::VALIDATION_ERROR
                }
                StateError::Core(CoreError::FileAccess { .. }) => exit_codes::IO_ERROR,
                StateError::Template(_) => exit_codes::TEMPLATE_ERROR,
                _ => exit_codes::STATE_ERROR,
            },
            CliError::Release { .. } => exit_codes::RELEASE_ERROR,
            CliError::Multiple { related } => related
                .first()
                .map(CliError::exit_code)
                .unwrap_or(exit_codes::ERROR),
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Internal { .. } => exit_codes::ERROR,
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Fold the errors of a visit into one result
    pub fn aggregate(mut errors: Vec<CliError>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(CliError::Multiple { related: errors }),
        }
    }
}

impl From<ExecError> for CliError {
    fn from(err: ExecError) -> Self {
        CliError::Release {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let selector = CliError::State(StateError::Core(CoreError::MalformedLabel {
            token: "foo".into(),
        }));
        assert_eq!(selector.exit_code(), exit_codes::VALIDATION_ERROR);

        let env = CliError::State(StateError::UndefinedEnvironment {
            name: "prod".into(),
            file: "shipfile.yaml".into(),
        });
        assert_eq!(env.exit_code(), exit_codes::STATE_ERROR);

        let release = CliError::from(ExecError::ReleaseFailed {
            release: "web".into(),
            operation: "sync".into(),
            message: "boom".into(),
        });
        assert_eq!(release.exit_code(), exit_codes::RELEASE_ERROR);
        assert_eq!(release.to_string(), "sync of release \"web\" failed: boom");
    }

    #[test]
    fn test_aggregate() {
        assert!(CliError::aggregate(Vec::new()).is_ok());

        let err = CliError::aggregate(vec![
            CliError::Release { message: "a".into() },
            CliError::Release { message: "b".into() },
        ])
        .unwrap_err();
        assert_eq!(err.to_string(), "2 operations failed");
        assert_eq!(err.exit_code(), exit_codes::RELEASE_ERROR);
    }
}
