//! CLI error types with exit code handling
//!
//! Engine errors are folded into a few user-facing categories, each with
//! its own exit code and, where useful, a hint on what to run next.

use apkhub_repo::RepoError;
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Bucket configuration problem
    #[error("{message}")]
    #[diagnostic(code(apkhub::cli::config))]
    Config {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Buckets could not be reached
    #[error("{message}")]
    #[diagnostic(code(apkhub::cli::network))]
    Network {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Downloaded or fetched data failed verification
    #[error("{message}")]
    #[diagnostic(code(apkhub::cli::integrity))]
    Integrity { message: String },

    #[error("{message}")]
    #[diagnostic(code(apkhub::cli::not_found))]
    NotFound {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(apkhub::cli::io))]
    Io { message: String },

    #[error("Interrupted")]
    #[diagnostic(code(apkhub::cli::interrupted))]
    Interrupted,

    /// Internal error (runtime, unexpected failure)
    #[error("Internal error: {message}")]
    #[diagnostic(code(apkhub::cli::internal))]
    Internal { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config { .. } => exit_codes::CONFIG_ERROR,
            CliError::Network { .. } => exit_codes::NETWORK_ERROR,
            CliError::Integrity { .. } => exit_codes::INTEGRITY_ERROR,
            CliError::NotFound { .. } => exit_codes::NOT_FOUND,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Interrupted => exit_codes::INTERRUPTED,
            CliError::Internal { .. } => exit_codes::ERROR,
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    fn config(message: String, help: Option<&str>) -> Self {
        Self::Config {
            message,
            help: help.map(str::to_string),
        }
    }

    pub fn network(message: String, help: Option<&str>) -> Self {
        Self::Network {
            message,
            help: help.map(str::to_string),
        }
    }
}

impl From<RepoError> for CliError {
    fn from(err: RepoError) -> Self {
        let message = err.to_string();
        match err {
            RepoError::BucketNotFound { .. } => CliError::config(
                message,
                Some("Run 'apkhub bucket list' to see configured buckets"),
            ),
            RepoError::BucketDisabled { name } => CliError::config(
                message,
                Some(&format!("Enable it with: apkhub bucket enable {}", name)),
            ),
            RepoError::NoEnabledBuckets => CliError::config(
                message,
                Some("Add one with: apkhub bucket add <name> <url>"),
            ),
            RepoError::BucketAlreadyExists { .. }
            | RepoError::InvalidBucketUrl { .. }
            | RepoError::InvalidConfig { .. } => CliError::config(message, None),

            RepoError::NoCachedData => CliError::network(
                message,
                Some("Connect to the network and run 'apkhub update'"),
            ),
            RepoError::HttpError { .. }
            | RepoError::NetworkError { .. }
            | RepoError::Timeout { .. }
            | RepoError::ManifestNotFound { .. }
            | RepoError::BucketFetchFailed { .. }
            | RepoError::AllBucketsFailed { .. } => CliError::network(
                message,
                Some("Run 'apkhub health' to see which buckets are failing"),
            ),

            RepoError::PackageNotFound { .. } | RepoError::VersionNotFound { .. } => {
                CliError::NotFound {
                    message,
                    help: Some("Run 'apkhub search' or 'apkhub info <package>'".to_string()),
                }
            }
            RepoError::NoDownloadUrl { .. } => CliError::NotFound {
                message,
                help: None,
            },

            RepoError::IntegrityCheckFailed { .. }
            | RepoError::SizeMismatch { .. }
            | RepoError::InvalidManifest { .. }
            | RepoError::SignatureRejected { .. } => CliError::Integrity { message },

            RepoError::Io(_) | RepoError::CacheError { .. } => CliError::Io { message },

            RepoError::Cancelled => CliError::Interrupted,

            RepoError::Serialization(_) => CliError::Internal { message },
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

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::internal(err.to_string())
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let err: CliError = RepoError::BucketNotFound {
            name: "main".to_string(),
        }
        .into();
        assert_eq!(err.exit_code(), exit_codes::CONFIG_ERROR);

        let err: CliError = RepoError::NoCachedData.into();
        assert_eq!(err.exit_code(), exit_codes::NETWORK_ERROR);

        let err: CliError = RepoError::IntegrityCheckFailed {
            name: "a.apk".to_string(),
            expected: "aa".to_string(),
            actual: "bb".to_string(),
        }
        .into();
        assert_eq!(err.exit_code(), exit_codes::INTEGRITY_ERROR);

        let err: CliError = RepoError::PackageNotFound {
            package_id: "com.app".to_string(),
        }
        .into();
        assert_eq!(err.exit_code(), exit_codes::NOT_FOUND);

        let err: CliError = RepoError::Cancelled.into();
        assert_eq!(err.exit_code(), exit_codes::INTERRUPTED);
    }

    #[test]
    fn test_disabled_bucket_help() {
        let err: CliError = RepoError::BucketDisabled {
            name: "main".to_string(),
        }
        .into();
        match err {
            CliError::Config { help, .. } => {
                assert_eq!(help.as_deref(), Some("Enable it with: apkhub bucket enable main"))
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
