//! Error types for bucket operations

use thiserror::Error;

use crate::trust::TrustError;

/// Bucket, cache and download errors
#[derive(Debug, Error)]
pub enum RepoError {
    // ============ Configuration Errors ============
    #[error("Bucket not found: {name}")]
    BucketNotFound { name: String },

    #[error("Bucket already exists: {name}")]
    BucketAlreadyExists { name: String },

    #[error("Bucket is disabled: {name}")]
    BucketDisabled { name: String },

    #[error("Invalid bucket URL: {url} - {reason}")]
    InvalidBucketUrl { url: String, reason: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("No enabled buckets configured")]
    NoEnabledBuckets,

    // ============ Network Errors ============
    #[error("HTTP error: {status} from {url}")]
    HttpError { status: u16, url: String },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Request timeout: {message}")]
    Timeout { message: String },

    // ============ Manifest Errors ============
    #[error("Manifest not found at {location}")]
    ManifestNotFound { location: String },

    #[error("Invalid manifest from {bucket}: {message}")]
    InvalidManifest { bucket: String, message: String },

    #[error("Signature rejected for bucket {bucket}: {reason}")]
    SignatureRejected {
        bucket: String,
        #[source]
        reason: TrustError,
    },

    #[error("Failed to fetch bucket {bucket}: {source}")]
    BucketFetchFailed {
        bucket: String,
        #[source]
        source: Box<RepoError>,
    },

    #[error("All buckets failed:\n{failures}")]
    AllBucketsFailed { failures: String },

    #[error("No cached data available for any enabled bucket")]
    NoCachedData,

    // ============ Package Errors ============
    #[error("Package not found: {package_id}")]
    PackageNotFound { package_id: String },

    #[error("Version not found: {package_id}@{version}")]
    VersionNotFound { package_id: String, version: String },

    #[error("No download URL for {package_id}@{version}")]
    NoDownloadUrl { package_id: String, version: String },

    // ============ Integrity Errors ============
    #[error("Integrity check failed for {name}: expected {expected}, got {actual}")]
    IntegrityCheckFailed {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("Size mismatch for {name}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        name: String,
        expected: u64,
        actual: u64,
    },

    // ============ Cache Errors ============
    #[error("Cache error: {message}")]
    CacheError { message: String },

    // ============ IO Errors ============
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // ============ Other ============
    #[error("Operation cancelled")]
    Cancelled,
}

/// Result type for bucket operations
pub type Result<T> = std::result::Result<T, RepoError>;

impl RepoError {
    /// Transient failures worth another attempt: connection problems,
    /// timeouts, 5xx responses and truncated transfers. 4xx and data
    /// integrity failures are permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            RepoError::NetworkError { .. } | RepoError::Timeout { .. } => true,
            RepoError::HttpError { status, .. } => *status >= 500,
            RepoError::SizeMismatch { .. } => true,
            RepoError::BucketFetchFailed { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for RepoError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RepoError::Timeout {
                message: e.to_string(),
            }
        } else if e.is_connect() {
            RepoError::NetworkError {
                message: format!("Connection failed: {}", e),
            }
        } else if let Some(status) = e.status() {
            RepoError::HttpError {
                status: status.as_u16(),
                url: e.url().map(|u| u.to_string()).unwrap_or_default(),
            }
        } else {
            RepoError::NetworkError {
                message: e.to_string(),
            }
        }
    }
}

impl From<serde_yaml::Error> for RepoError {
    fn from(e: serde_yaml::Error) -> Self {
        RepoError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(e: serde_json::Error) -> Self {
        RepoError::Serialization(e.to_string())
    }
}

impl From<url::ParseError> for RepoError {
    fn from(e: url::ParseError) -> Self {
        RepoError::InvalidBucketUrl {
            url: String::new(),
            reason: e.to_string(),
        }
    }
}

impl From<tempfile::PersistError> for RepoError {
    fn from(e: tempfile::PersistError) -> Self {
        RepoError::Io(e.error)
    }
}
