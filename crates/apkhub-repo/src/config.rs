//! Client configuration management
//!
//! Stores buckets and client settings in `~/.config/apkhub/config.yaml`

use apkhub_core::MANIFEST_FILE;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{RepoError, Result};
use crate::retry::RetryPolicy;
use crate::trust::SignaturePolicy;

/// Default manifest time-to-live: 24 hours
pub const DEFAULT_CACHE_TTL_SECS: u64 = 24 * 60 * 60;

/// Client configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Configured buckets, keyed by name
    pub buckets: BTreeMap<String, Bucket>,

    pub client: ClientSettings,

    pub network: NetworkSettings,

    pub security: SecuritySettings,
}

impl ClientConfig {
    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = serde_yaml::from_str(&content)?;

        // The map key is authoritative for the bucket name
        for (name, bucket) in config.buckets.iter_mut() {
            if bucket.name != *name {
                bucket.name = name.clone();
            }
            bucket.validate().map_err(|e| RepoError::InvalidConfig {
                message: format!("{}: bucket '{}': {}", path.display(), name, e),
            })?;
        }
        Ok(config)
    }

    /// Load from `path` when it exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a specific path, replacing the file atomically
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent)?;

        let content = serde_yaml::to_string(self)?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(content.as_bytes())?;
        tmp.persist(path)?;
        Ok(())
    }

    /// Get default configuration path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| RepoError::InvalidConfig {
            message: "Could not determine config directory".to_string(),
        })?;
        Ok(config_dir.join("apkhub").join("config.yaml"))
    }

    /// Get a bucket by name
    pub fn get(&self, name: &str) -> Option<&Bucket> {
        self.buckets.get(name)
    }

    /// Get a mutable bucket by name
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Bucket> {
        self.buckets.get_mut(name)
    }

    /// Add a bucket
    pub fn add(&mut self, bucket: Bucket) -> Result<()> {
        if self.buckets.contains_key(&bucket.name) {
            return Err(RepoError::BucketAlreadyExists {
                name: bucket.name.clone(),
            });
        }
        self.buckets.insert(bucket.name.clone(), bucket);
        Ok(())
    }

    /// Remove a bucket by name
    pub fn remove(&mut self, name: &str) -> Result<Bucket> {
        self.buckets
            .remove(name)
            .ok_or_else(|| RepoError::BucketNotFound {
                name: name.to_string(),
            })
    }

    /// Enable or disable a bucket
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<()> {
        let bucket = self.get_mut(name).ok_or_else(|| RepoError::BucketNotFound {
            name: name.to_string(),
        })?;
        bucket.enabled = enabled;
        Ok(())
    }

    /// Record a successful refresh of a bucket
    pub fn touch_updated(&mut self, name: &str, at: DateTime<Utc>) -> Result<()> {
        let bucket = self.get_mut(name).ok_or_else(|| RepoError::BucketNotFound {
            name: name.to_string(),
        })?;
        bucket.last_updated = Some(at);
        Ok(())
    }

    /// Enabled buckets, ordered by name
    pub fn enabled_buckets(&self) -> Vec<Bucket> {
        self.buckets.values().filter(|b| b.enabled).cloned().collect()
    }

    /// Cache directory, falling back to the platform cache dir
    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.client.cache_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir().ok_or_else(|| RepoError::InvalidConfig {
            message: "Could not determine cache directory".to_string(),
        })?;
        Ok(cache_dir.join("apkhub"))
    }

    /// Download directory, falling back to `<cache dir>/downloads`
    pub fn download_dir(&self) -> Result<PathBuf> {
        match &self.client.download_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(self.cache_dir()?.join("downloads")),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.client.cache_ttl)
    }

    /// Retry policy for manifest fetches
    pub fn retry_policy(&self) -> RetryPolicy {
        self.network
            .retry_policy(Duration::from_secs(self.client.timeout.max(1)))
    }

    /// Retry policy for artifact downloads (longer per-attempt timeout)
    pub fn download_retry_policy(&self) -> RetryPolicy {
        self.network
            .retry_policy(Duration::from_secs(self.client.download_timeout.max(1)))
    }
}

/// General client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Where cache entries live (platform cache dir when unset)
    pub cache_dir: Option<PathBuf>,

    /// Manifest cache TTL in seconds
    pub cache_ttl: u64,

    /// Where downloaded artifacts are written
    pub download_dir: Option<PathBuf>,

    /// Per-attempt timeout for manifest requests, in seconds
    pub timeout: u64,

    /// Per-attempt timeout for artifact transfers, in seconds
    pub download_timeout: u64,

    /// Override for the User-Agent header
    pub user_agent: Option<String>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            cache_dir: None,
            cache_ttl: DEFAULT_CACHE_TTL_SECS,
            download_dir: None,
            timeout: 30,
            download_timeout: 600,
            user_agent: None,
        }
    }
}

/// Retry and connectivity settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    /// Additional attempts after the first one
    pub max_retries: u32,

    pub initial_delay_ms: u64,

    pub max_delay_ms: u64,

    pub backoff_factor: f64,

    /// `host:port` pairs probed to detect connectivity. Empty disables
    /// offline detection.
    pub offline_check_hosts: Vec<String>,

    /// How long a connectivity verdict is reused, in seconds
    pub offline_check_interval: u64,

    /// TCP connect timeout per probe, in milliseconds
    pub offline_probe_timeout_ms: u64,
}

impl NetworkSettings {
    fn retry_policy(&self, attempt_timeout: Duration) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_factor: self.backoff_factor,
            attempt_timeout,
        }
    }
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_factor: 2.0,
            offline_check_hosts: vec![
                "8.8.8.8:53".to_string(),
                "1.1.1.1:53".to_string(),
                "208.67.222.222:53".to_string(),
            ],
            offline_check_interval: 30,
            offline_probe_timeout_ms: 1500,
        }
    }
}

/// Manifest signature settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecuritySettings {
    pub verify_signature: bool,

    pub signature_policy: SignaturePolicy,

    /// Accepted public key fingerprints (any when empty)
    pub trusted_keys: Vec<String>,
}

/// Bucket definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    /// Unique name for this bucket
    pub name: String,

    /// Bucket URL (HTTP(S) or file://)
    pub url: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Last successful refresh
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

impl Bucket {
    /// Create a new bucket, validating its name and URL
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Result<Self> {
        let bucket = Self {
            name: name.into(),
            url: url.into(),
            enabled: true,
            last_updated: None,
        };
        bucket.validate()?;
        Ok(bucket)
    }

    /// Check the name and URL.
    ///
    /// Names may not contain `_`: merged version keys are
    /// `{bucket}_{key}`, so the first `_` must always end the bucket name.
    pub fn validate(&self) -> Result<()> {
        let name = &self.name;
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.'))
        {
            return Err(RepoError::InvalidConfig {
                message: format!(
                    "Invalid bucket name '{}': use letters, digits, '-' or '.'",
                    name
                ),
            });
        }

        let url = &self.url;
        match BucketKind::detect(url)? {
            BucketKind::Http => {
                let parsed = url::Url::parse(url).map_err(|e| RepoError::InvalidBucketUrl {
                    url: url.clone(),
                    reason: e.to_string(),
                })?;
                if parsed.host_str().is_none() {
                    return Err(RepoError::InvalidBucketUrl {
                        url: url.clone(),
                        reason: "URL has no host".to_string(),
                    });
                }
            }
            BucketKind::File => {
                if url.trim_start_matches("file://").is_empty() {
                    return Err(RepoError::InvalidBucketUrl {
                        url: url.clone(),
                        reason: "file:// URL has no path".to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Bucket kind derived from the URL scheme
    pub fn kind(&self) -> Result<BucketKind> {
        BucketKind::detect(&self.url)
    }

    /// Base URL without trailing slashes
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    /// Local root directory for `file://` buckets
    pub fn local_root(&self) -> Option<PathBuf> {
        self.url
            .strip_prefix("file://")
            .map(|path| PathBuf::from(path.trim_end_matches('/')))
    }

    /// Location of the bucket's manifest
    pub fn manifest_url(&self) -> String {
        match self.local_root() {
            Some(root) => root.join(MANIFEST_FILE).display().to_string(),
            None => format!("{}/{}", self.base_url(), MANIFEST_FILE),
        }
    }

    /// Cache key of the bucket's manifest
    pub fn cache_key(&self) -> String {
        format!("bucket_{}", self.name)
    }
}

/// Bucket type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketKind {
    /// Manifest served over HTTP(S)
    Http,

    /// Manifest read from a local directory
    File,
}

impl BucketKind {
    /// Detect bucket kind from URL
    pub fn detect(url: &str) -> Result<Self> {
        if url.starts_with("file://") {
            Ok(BucketKind::File)
        } else if url.starts_with("http://") || url.starts_with("https://") {
            Ok(BucketKind::Http)
        } else {
            Err(RepoError::InvalidBucketUrl {
                url: url.to_string(),
                reason: "URL must start with http://, https:// or file://".to_string(),
            })
        }
    }
}

impl std::fmt::Display for BucketKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BucketKind::Http => write!(f, "HTTP"),
            BucketKind::File => write!(f, "File"),
        }
    }
}
