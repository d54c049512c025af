//! Error types for devhost.

use std::path::PathBuf;

/// Result type alias using the devhost [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised when an operation cannot be attempted at all.
///
/// Recoverable outcomes (a non-zero exit code, metadata that is not
/// available yet) are returned as values and never show up here.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The external tool could not be located or launched.
    #[error("failed to launch '{program}': {source}")]
    ExecutionFailure {
        /// Program that was being launched.
        program: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The extension/provisioner pair is not present in the document.
    #[error(
        "provisioner '{provisioner}' of extension '{extension}' not found in {}",
        path.display()
    )]
    EntryNotFound {
        /// Extension group name.
        extension: String,
        /// Provisioner name within the group.
        provisioner: String,
        /// Document that was searched.
        path: PathBuf,
    },

    /// The configuration document is not in the expected shape.
    #[error("malformed document {}: {reason}", path.display())]
    MalformedDocument {
        /// Offending document.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// The configuration document could not be read or written.
    #[error("cannot access {}: {source}", path.display())]
    Document {
        /// Document path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// An external step ran to completion but exited non-zero.
    #[error("{step} failed with exit code {exit_code}")]
    StepFailed {
        /// Step that failed (`halt`, `start`).
        step: String,
        /// Exit code of the step.
        exit_code: i32,
    },

    /// Failed to load the devhost configuration.
    #[error("failed to load config: {0}")]
    ConfigLoad(String),

    /// Failed to save the devhost configuration.
    #[error("failed to save config: {0}")]
    ConfigSave(String),

    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create an execution failure for `program`.
    pub fn execution(program: impl Into<String>, source: std::io::Error) -> Self {
        Self::ExecutionFailure {
            program: program.into(),
            source,
        }
    }

    /// Create a malformed document error.
    pub fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::MalformedDocument {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a document access error.
    pub fn document(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Document {
            path: path.into(),
            source,
        }
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the error is something the user can fix by editing input.
    pub fn is_user_actionable(&self) -> bool {
        matches!(
            self,
            Error::EntryNotFound { .. }
                | Error::MalformedDocument { .. }
                | Error::Document { .. }
                | Error::Config(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_not_found_names_pair_and_file() {
        let err = Error::EntryNotFound {
            extension: "core".into(),
            provisioner: "tls-ca".into(),
            path: PathBuf::from("/srv/env/config/config.yml"),
        };
        let msg = err.to_string();
        assert!(msg.contains("'tls-ca'"));
        assert!(msg.contains("'core'"));
        assert!(msg.contains("/srv/env/config/config.yml"));
        assert!(err.is_user_actionable());
    }

    #[test]
    fn test_execution_failure_is_not_user_actionable() {
        let err = Error::execution(
            "vagrant",
            std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        );
        assert!(err.to_string().starts_with("failed to launch 'vagrant'"));
        assert!(!err.is_user_actionable());
    }

    #[test]
    fn test_step_failed_message() {
        let err = Error::StepFailed {
            step: "halt".into(),
            exit_code: 2,
        };
        assert_eq!(err.to_string(), "halt failed with exit code 2");
        assert!(!err.is_user_actionable());
    }
}
