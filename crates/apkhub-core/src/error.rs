//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Failed to parse manifest: {0}")]
    ManifestParse(#[from] serde_json::Error),

    #[error("Package {package_id}: latest version '{latest}' is not one of its versions")]
    DanglingLatest { package_id: String, latest: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;
