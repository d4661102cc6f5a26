//! Bucket manifest types
//!
//! A bucket publishes a single `apkhub_manifest.json` describing every
//! package it offers. Field names are camelCase. Unknown fields are ignored
//! and missing fields fall back to zero values, so older clients keep
//! reading newer manifests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use crate::error::{CoreError, Result};

/// File name of the manifest inside a bucket
pub const MANIFEST_FILE: &str = "apkhub_manifest.json";

/// Locale key every localized text is expected to carry
pub const DEFAULT_LOCALE: &str = "default";

/// Returns true when `url` carries one of the schemes the client fetches
/// directly (`http://`, `https://`, `file://`).
pub fn is_absolute_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://") || url.starts_with("file://")
}

/// Read an explicit `null` as the field's zero value. Publishers written in
/// Go emit `null` for empty lists and maps.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// The index published by one bucket
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ManifestIndex {
    /// Manifest format version
    pub version: String,

    /// Human readable bucket title
    pub name: String,

    pub description: String,

    /// When the publisher last regenerated the manifest
    pub updated_at: Option<DateTime<Utc>>,

    pub total_packages: u64,

    /// Sum of all artifact sizes in bytes
    pub total_size: u64,

    /// Packages keyed by package id
    #[serde(deserialize_with = "null_as_default")]
    pub packages: BTreeMap<String, AppPackage>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<ManifestSignature>,
}

impl ManifestIndex {
    /// Parse a manifest from raw JSON bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// True when the manifest carries a usable signature block
    pub fn is_signed(&self) -> bool {
        self.signature.as_ref().is_some_and(ManifestSignature::is_signed)
    }

    /// Get a package by id
    pub fn get(&self, package_id: &str) -> Option<&AppPackage> {
        self.packages.get(package_id)
    }

    /// Number of versions across all packages
    pub fn version_count(&self) -> usize {
        self.packages.values().map(|p| p.versions.len()).sum()
    }
}

/// One application and its published versions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppPackage {
    pub package_id: String,

    #[serde(deserialize_with = "null_as_default")]
    pub name: LocalizedText,

    #[serde(deserialize_with = "null_as_default")]
    pub description: LocalizedText,

    pub category: String,

    /// Versions keyed by version key
    #[serde(deserialize_with = "null_as_default")]
    pub versions: BTreeMap<String, AppVersion>,

    /// Key into `versions`, empty when the publisher did not pick one
    pub latest: String,
}

impl AppPackage {
    /// Display name for a locale, falling back to the package id
    pub fn display_name(&self, locale: &str) -> &str {
        self.name.get(locale).unwrap_or(self.package_id.as_str())
    }

    /// The version `latest` points at, or the highest `versionCode` when
    /// `latest` is unset or dangling.
    pub fn latest_version(&self) -> Option<(&str, &AppVersion)> {
        if let Some((key, version)) = self.versions.get_key_value(&self.latest) {
            return Some((key.as_str(), version));
        }
        self.versions
            .iter()
            .max_by(|(ka, a), (kb, b)| a.version_code.cmp(&b.version_code).then(kb.cmp(ka)))
            .map(|(k, v)| (k.as_str(), v))
    }

    /// Versions sorted by `versionCode`, newest first
    pub fn versions_by_code(&self) -> Vec<(&str, &AppVersion)> {
        let mut versions: Vec<_> = self.versions.iter().map(|(k, v)| (k.as_str(), v)).collect();
        versions.sort_by(|(ka, a), (kb, b)| b.version_code.cmp(&a.version_code).then(ka.cmp(kb)));
        versions
    }

    /// A non-empty `latest` must name one of `versions`
    pub fn validate(&self) -> Result<()> {
        if !self.latest.is_empty() && !self.versions.contains_key(&self.latest) {
            return Err(CoreError::DanglingLatest {
                package_id: self.package_id.clone(),
                latest: self.latest.clone(),
            });
        }
        Ok(())
    }
}

/// A single downloadable build of a package
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppVersion {
    /// Display version (versionName)
    pub version: String,

    /// Monotonic build number
    pub version_code: i64,

    pub min_sdk: u32,

    pub target_sdk: u32,

    /// Artifact size in bytes, 0 when unknown
    pub size: u64,

    /// Hex encoded SHA-256 of the artifact, empty when unknown
    pub sha256: String,

    /// Absolute URL or a path relative to the bucket base
    pub download_url: String,

    pub release_date: Option<DateTime<Utc>>,

    #[serde(deserialize_with = "null_as_default")]
    pub permissions: Vec<String>,

    #[serde(deserialize_with = "null_as_default")]
    pub features: Vec<String>,

    #[serde(deserialize_with = "null_as_default")]
    pub abis: Vec<String>,
}

impl AppVersion {
    /// Whether a device at `sdk` can install this build (0 means unspecified)
    pub fn supports_sdk(&self, sdk: u32) -> bool {
        self.min_sdk == 0 || self.min_sdk <= sdk
    }
}

/// Publisher signature metadata attached to a manifest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ManifestSignature {
    pub public_key_fingerprint: String,

    pub signed_at: Option<DateTime<Utc>>,

    pub signer: String,
}

impl ManifestSignature {
    /// A missing timestamp, or one at or before the Unix epoch (including
    /// `0001-01-01T00:00:00Z`), counts as zero.
    pub fn has_timestamp(&self) -> bool {
        self.signed_at.is_some_and(|t| t.timestamp() > 0)
    }

    pub fn is_signed(&self) -> bool {
        !self.public_key_fingerprint.trim().is_empty() && self.has_timestamp()
    }
}

/// Locale-keyed text. Accepts either a JSON object or a plain string, which
/// is stored under the `"default"` locale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "LocalizedRepr")]
pub struct LocalizedText(BTreeMap<String, String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum LocalizedRepr {
    Plain(String),
    Map(BTreeMap<String, String>),
}

impl From<LocalizedRepr> for LocalizedText {
    fn from(repr: LocalizedRepr) -> Self {
        match repr {
            LocalizedRepr::Plain(text) => Self::new(text),
            LocalizedRepr::Map(map) => Self(map),
        }
    }
}

impl LocalizedText {
    /// Create a text with only the default locale
    pub fn new(default: impl Into<String>) -> Self {
        let mut map = BTreeMap::new();
        map.insert(DEFAULT_LOCALE.to_string(), default.into());
        Self(map)
    }

    /// Text for `locale`, then the default locale, then any locale
    pub fn get(&self, locale: &str) -> Option<&str> {
        self.0
            .get(locale)
            .or_else(|| self.0.get(DEFAULT_LOCALE))
            .or_else(|| self.0.values().next())
            .map(String::as_str)
    }

    pub fn default_text(&self) -> Option<&str> {
        self.get(DEFAULT_LOCALE)
    }

    /// All translations, ordered by locale
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.0.values().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy translations from `other` for locales missing here
    pub fn fill_missing(&mut self, other: &LocalizedText) {
        for (locale, text) in &other.0 {
            self.0
                .entry(locale.clone())
                .or_insert_with(|| text.clone());
        }
    }
}
