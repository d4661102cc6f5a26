//! Disk-backed TTL cache
//!
//! One JSON file per key under the cache directory. Entries past their
//! expiry are dropped by [`CacheStore::get`] but can still be read with
//! [`CacheStore::get_allow_stale`], which is what offline mode and the
//! synchronizer's fallback rely on.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::config::DEFAULT_CACHE_TTL_SECS;
use crate::error::{RepoError, Result};

const ENTRY_EXTENSION: &str = "cache";

/// Envelope stored on disk for every key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub access_count: u64,
    #[serde(default)]
    pub last_access: Option<DateTime<Utc>>,
}

impl CacheEntry {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Result of a read that tolerates expired entries
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup<T> {
    Fresh(T),
    Stale(T),
    Absent,
}

impl<T> CacheLookup<T> {
    pub fn into_value(self) -> Option<T> {
        match self {
            CacheLookup::Fresh(v) | CacheLookup::Stale(v) => Some(v),
            CacheLookup::Absent => None,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, CacheLookup::Stale(_))
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    /// Total bytes on disk
    pub total_size: u64,
    /// Hit rate of this process's reads, 0.0 when nothing was read
    pub hit_rate: f64,
    pub expired_count: usize,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

/// File-per-key cache directory
#[derive(Debug)]
pub struct CacheStore {
    dir: PathBuf,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStore {
    /// Open (and create) a cache directory
    pub fn open(dir: impl Into<PathBuf>, default_ttl: Duration) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let default_ttl = if default_ttl.is_zero() {
            Duration::from_secs(DEFAULT_CACHE_TTL_SECS)
        } else {
            default_ttl
        };
        Ok(Self {
            dir,
            default_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Path of the file backing `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", sanitize_key(key), ENTRY_EXTENSION))
    }

    /// Read a fresh entry. Expired entries are deleted and reported absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let path = self.path_for(key);
        let Some(mut entry) = self.read_entry(&path)? else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        };

        if entry.is_expired() {
            tracing::debug!(key, "cache entry expired");
            remove_if_exists(&path)?;
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        }

        let value = match serde_json::from_value::<T>(entry.data.clone()) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, error = %e, "dropping undecodable cache entry");
                remove_if_exists(&path)?;
                self.misses.fetch_add(1, Ordering::Relaxed);
                return Ok(None);
            }
        };

        self.record_hit(&path, &mut entry);
        Ok(Some(value))
    }

    /// Read an entry regardless of expiry. Never deletes expired entries.
    /// A fresh result counts as a hit; stale or absent ones as misses.
    pub fn get_allow_stale<T: DeserializeOwned>(&self, key: &str) -> Result<CacheLookup<T>> {
        let path = self.path_for(key);
        let Some(mut entry) = self.read_entry(&path)? else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(CacheLookup::Absent);
        };

        let value = match serde_json::from_value::<T>(entry.data.clone()) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, error = %e, "dropping undecodable cache entry");
                remove_if_exists(&path)?;
                self.misses.fetch_add(1, Ordering::Relaxed);
                return Ok(CacheLookup::Absent);
            }
        };

        if entry.is_expired() {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(CacheLookup::Stale(value));
        }

        self.record_hit(&path, &mut entry);
        Ok(CacheLookup::Fresh(value))
    }

    /// Envelope of an entry without touching access counters
    pub fn peek(&self, key: &str) -> Result<Option<CacheEntry>> {
        self.read_entry(&self.path_for(key))
    }

    /// Store `value` under `key`. A zero `ttl` uses the default TTL.
    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let ttl = if ttl.is_zero() { self.default_ttl } else { ttl };
        let ttl = chrono::Duration::from_std(ttl).map_err(|e| RepoError::CacheError {
            message: format!("invalid TTL for {}: {}", key, e),
        })?;

        let now = Utc::now();
        let entry = CacheEntry {
            key: key.to_string(),
            data: serde_json::to_value(value)?,
            created_at: now,
            expires_at: now + ttl,
            access_count: 0,
            last_access: None,
        };
        self.write_entry(&self.path_for(key), &entry)
    }

    /// Delete one entry, returning whether it existed
    pub fn delete(&self, key: &str) -> Result<bool> {
        remove_if_exists(&self.path_for(key))
    }

    /// Delete every entry, returning how many were removed
    pub fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for path in self.entry_paths()? {
            if remove_if_exists(&path)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Delete expired and unreadable entries, returning how many were removed
    pub fn clean_expired(&self) -> Result<usize> {
        let mut removed = 0;
        for path in self.entry_paths()? {
            let expired = match self.read_entry(&path)? {
                Some(entry) => entry.is_expired(),
                // read_entry already removed it
                None => continue,
            };
            if expired && remove_if_exists(&path)? {
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::info!(removed, "cleaned expired cache entries");
        }
        Ok(removed)
    }

    pub fn stats(&self) -> Result<CacheStats> {
        let mut stats = CacheStats::default();

        for path in self.entry_paths()? {
            let Some(entry) = self.read_entry(&path)? else {
                continue;
            };
            stats.entries += 1;
            stats.total_size += std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            if entry.is_expired() {
                stats.expired_count += 1;
            }
            stats.oldest = Some(match stats.oldest {
                Some(t) => t.min(entry.created_at),
                None => entry.created_at,
            });
            stats.newest = Some(match stats.newest {
                Some(t) => t.max(entry.created_at),
                None => entry.created_at,
            });
        }

        let hits = self.hits.load(Ordering::Relaxed);
        let total = hits + self.misses.load(Ordering::Relaxed);
        if total > 0 {
            stats.hit_rate = hits as f64 / total as f64;
        }

        Ok(stats)
    }

    /// Read an envelope, removing the file if it cannot be decoded
    fn read_entry(&self, path: &Path) -> Result<Option<CacheEntry>> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<CacheEntry>(&bytes) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "removing corrupted cache entry");
                remove_if_exists(path)?;
                Ok(None)
            }
        }
    }

    fn record_hit(&self, path: &Path, entry: &mut CacheEntry) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        entry.access_count = entry.access_count.saturating_add(1);
        entry.last_access = Some(Utc::now());
        // Access counters are best effort; a failed write-back is not a miss.
        if let Err(e) = self.write_entry(path, entry) {
            tracing::debug!(key = %entry.key, error = %e, "failed to update cache access time");
        }
    }

    fn write_entry(&self, path: &Path, entry: &CacheEntry) -> Result<()> {
        let content = serde_json::to_vec(entry)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&content)?;
        tmp.persist(path)?;
        Ok(())
    }

    fn entry_paths(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        let read_dir = match std::fs::read_dir(&self.dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(paths),
            Err(e) => return Err(e.into()),
        };
        for entry in read_dir {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == ENTRY_EXTENSION) {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }
}

/// Map a cache key onto a file name
pub fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c => c,
        })
        .collect()
}

fn remove_if_exists(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
