//! apkhub Core - manifest types shared by the apkhub client
//!
//! This crate provides the data model a bucket publishes and the client
//! consumes:
//! - `ManifestIndex`: the signed JSON index of one bucket
//! - `AppPackage`: one application and all of its published versions
//! - `AppVersion`: a single downloadable build
//! - `ManifestSignature`: publisher signature metadata
//! - `LocalizedText`: locale-keyed strings with a `"default"` entry

pub mod error;
pub mod manifest;

pub use error::{CoreError, Result};
pub use manifest::{
    AppPackage, AppVersion, DEFAULT_LOCALE, LocalizedText, MANIFEST_FILE, ManifestIndex,
    ManifestSignature, is_absolute_url,
};
