//! The engine context
//!
//! [`Engine`] owns the configuration, cache, health tracker, HTTP client and
//! every component built on them. The CLI creates one per invocation and
//! passes it around by reference.

use apkhub_core::AppPackage;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::RwLock;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::cache::CacheStore;
use crate::config::{Bucket, ClientConfig};
use crate::download::{DownloadOptions, DownloadResult, DownloadVerifier, ResolvedArtifact, resolve};
use crate::error::{RepoError, Result};
use crate::health::{BucketHealth, HealthTracker};
use crate::http::HttpClient;
use crate::merge::{ManifestMerger, MergedManifest};
use crate::offline::OfflineCoordinator;
use crate::search::{SearchHit, SearchOptions, search};
use crate::sync::{BucketSynchronizer, FetchMode, FetchSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateStatus {
    Updated,
    Stale,
    Failed,
}

/// Result of refreshing one bucket
#[derive(Debug, Clone, Serialize)]
pub struct UpdateReport {
    pub bucket: String,
    pub status: UpdateStatus,
    pub packages: usize,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
    pub error: Option<String>,
}

fn as_millis<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis().min(u128::from(u64::MAX)) as u64)
}

/// A configured bucket with its health and cache state
#[derive(Debug, Clone, Serialize)]
pub struct BucketStatus {
    pub bucket: Bucket,
    pub health: BucketHealth,
    pub cached_at: Option<DateTime<Utc>>,
    pub cache_fresh: bool,
}

pub struct Engine {
    config: RwLock<ClientConfig>,
    config_path: Option<PathBuf>,
    cache: Arc<CacheStore>,
    health: Arc<HealthTracker>,
    sync: Arc<BucketSynchronizer>,
    merger: ManifestMerger,
    offline: OfflineCoordinator,
    downloader: DownloadVerifier,
}

impl Engine {
    /// Build an engine around an in-memory configuration. Bucket changes
    /// are not persisted.
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::build(config, None)
    }

    /// Load the configuration at `path` (defaults when missing) and persist
    /// bucket changes back to it
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let config = ClientConfig::load_or_default(&path)?;
        Self::build(config, Some(path))
    }

    fn build(config: ClientConfig, config_path: Option<PathBuf>) -> Result<Self> {
        let cache = Arc::new(CacheStore::open(config.cache_dir()?, config.cache_ttl())?);
        let health = Arc::new(HealthTracker::new());
        let client = HttpClient::new(config.client.user_agent.as_deref())?;

        let sync = Arc::new(BucketSynchronizer::new(
            cache.clone(),
            health.clone(),
            client.clone(),
            config.retry_policy(),
            config.security.clone(),
            config.cache_ttl(),
        ));
        let merger = ManifestMerger::new(sync.clone());
        let offline = OfflineCoordinator::new(
            cache.clone(),
            config.network.offline_check_hosts.clone(),
            Duration::from_millis(config.network.offline_probe_timeout_ms),
            Duration::from_secs(config.network.offline_check_interval),
        );
        let downloader =
            DownloadVerifier::new(client, config.download_retry_policy(), config.download_dir()?);

        Ok(Self {
            config: RwLock::new(config),
            config_path,
            cache,
            health,
            sync,
            merger,
            offline,
            downloader,
        })
    }

    /// Snapshot of the current configuration
    pub fn config(&self) -> ClientConfig {
        self.config.read().clone()
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn download_dir(&self) -> &Path {
        self.downloader.download_dir()
    }

    // ============ Bucket management ============

    /// All configured buckets, ordered by name
    pub fn buckets(&self) -> Vec<Bucket> {
        self.config.read().buckets.values().cloned().collect()
    }

    pub fn enabled_buckets(&self) -> Vec<Bucket> {
        self.config.read().enabled_buckets()
    }

    pub fn add_bucket(&self, name: &str, url: &str) -> Result<Bucket> {
        let bucket = Bucket::new(name, url)?;
        self.mutate(|config| config.add(bucket.clone()))?;
        tracing::info!(bucket = %bucket.name, url = %bucket.url, "bucket added");
        Ok(bucket)
    }

    /// Remove a bucket along with its cached manifest and health record
    pub fn remove_bucket(&self, name: &str) -> Result<Bucket> {
        let bucket = self.mutate(|config| config.remove(name))?;
        self.cache.delete(&bucket.cache_key())?;
        self.health.remove(&bucket.name);
        tracing::info!(bucket = %bucket.name, "bucket removed");
        Ok(bucket)
    }

    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        self.mutate(|config| config.set_enabled(name, enabled))
    }

    /// Apply a change to a copy of the config, persist it, then publish it
    fn mutate<T>(&self, f: impl FnOnce(&mut ClientConfig) -> Result<T>) -> Result<T> {
        let mut config = self.config.write();
        let mut next = config.clone();
        let out = f(&mut next)?;
        if let Some(path) = &self.config_path {
            next.save_to(path)?;
        }
        *config = next;
        Ok(out)
    }

    /// An enabled bucket by name
    fn enabled_bucket(&self, name: &str) -> Result<Bucket> {
        let config = self.config.read();
        let bucket = config.get(name).ok_or_else(|| RepoError::BucketNotFound {
            name: name.to_string(),
        })?;
        if !bucket.enabled {
            return Err(RepoError::BucketDisabled {
                name: name.to_string(),
            });
        }
        Ok(bucket.clone())
    }

    // ============ Fetching ============

    /// Force-refresh one bucket
    pub async fn update_bucket(&self, name: &str, cancel: &CancellationToken) -> Result<UpdateReport> {
        let bucket = self.enabled_bucket(name)?;
        let report = self.refresh(&bucket, cancel).await?;
        self.stamp_updated(std::slice::from_ref(&report))?;
        Ok(report)
    }

    /// Force-refresh every enabled bucket concurrently. Fails only when
    /// every bucket failed.
    pub async fn update_all(&self, cancel: &CancellationToken) -> Result<Vec<UpdateReport>> {
        let buckets = self.enabled_buckets();
        if buckets.is_empty() {
            return Err(RepoError::NoEnabledBuckets);
        }

        let results = join_all(buckets.iter().map(|b| self.refresh(b, cancel))).await;
        let reports = results.into_iter().collect::<Result<Vec<_>>>()?;

        self.stamp_updated(&reports)?;

        if reports.iter().all(|r| r.status == UpdateStatus::Failed) {
            let failures = reports
                .iter()
                .map(|r| format!("  {}: {}", r.bucket, r.error.as_deref().unwrap_or("unknown error")))
                .collect::<Vec<_>>()
                .join("\n");
            return Err(RepoError::AllBucketsFailed { failures });
        }

        Ok(reports)
    }

    /// Refresh one bucket into a report. Only cancellation is an error.
    async fn refresh(&self, bucket: &Bucket, cancel: &CancellationToken) -> Result<UpdateReport> {
        let started = Instant::now();
        let result = self.sync.fetch(bucket, FetchMode::Refresh, cancel).await;
        let elapsed = started.elapsed();

        let report = match result {
            Ok(outcome) => UpdateReport {
                bucket: bucket.name.clone(),
                status: if outcome.source == FetchSource::Stale {
                    UpdateStatus::Stale
                } else {
                    UpdateStatus::Updated
                },
                packages: outcome.manifest.packages.len(),
                elapsed,
                error: outcome.error,
            },
            Err(RepoError::Cancelled) => return Err(RepoError::Cancelled),
            Err(e) => UpdateReport {
                bucket: bucket.name.clone(),
                status: UpdateStatus::Failed,
                packages: 0,
                elapsed,
                error: Some(e.to_string()),
            },
        };
        Ok(report)
    }

    fn stamp_updated(&self, reports: &[UpdateReport]) -> Result<()> {
        let updated: Vec<&str> = reports
            .iter()
            .filter(|r| r.status == UpdateStatus::Updated)
            .map(|r| r.bucket.as_str())
            .collect();
        if updated.is_empty() {
            return Ok(());
        }

        let now = Utc::now();
        self.mutate(|config| {
            for name in &updated {
                // A bucket removed concurrently is not an error here
                if config.get(name).is_some() {
                    config.touch_updated(name, now)?;
                }
            }
            Ok(())
        })
    }

    // ============ Queries ============

    pub async fn is_offline(&self) -> bool {
        self.offline.is_offline().await
    }

    /// Merged view of all enabled buckets; built from cache alone when
    /// offline
    pub async fn merged(&self, cancel: &CancellationToken) -> Result<MergedManifest> {
        let buckets = self.enabled_buckets();
        if buckets.is_empty() {
            return Err(RepoError::NoEnabledBuckets);
        }

        if self.offline.is_offline().await {
            tracing::info!("offline, using cached manifests");
            return self.offline.merged_offline_view(&buckets);
        }

        self.merger.merge(&buckets, FetchMode::CacheFirst, cancel).await
    }

    pub async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchHit>> {
        let merged = self.merged(cancel).await?;
        Ok(search(&merged.index, query, options))
    }

    /// Offline search over cached manifests only
    pub fn search_offline(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchHit>> {
        self.offline.search(&self.enabled_buckets(), query, options)
    }

    /// A merged package
    pub async fn package(&self, package_id: &str, cancel: &CancellationToken) -> Result<AppPackage> {
        let merged = self.merged(cancel).await?;
        merged
            .index
            .packages
            .get(package_id)
            .cloned()
            .ok_or_else(|| RepoError::PackageNotFound {
                package_id: package_id.to_string(),
            })
    }

    pub async fn resolve(
        &self,
        package_id: &str,
        version: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ResolvedArtifact> {
        let merged = self.merged(cancel).await?;
        resolve(&merged.index, package_id, version)
    }

    /// Resolve and download a package version
    pub async fn download(
        &self,
        package_id: &str,
        version: Option<&str>,
        options: &DownloadOptions,
        cancel: &CancellationToken,
    ) -> Result<DownloadResult> {
        let artifact = self.resolve(package_id, version, cancel).await?;
        self.downloader.download(&artifact, options, cancel).await
    }

    /// Health of every configured bucket, ordered by name
    pub fn health(&self) -> Vec<(String, BucketHealth)> {
        self.buckets()
            .into_iter()
            .map(|b| {
                let health = self.health.get(&b.name).unwrap_or_default();
                (b.name, health)
            })
            .collect()
    }

    /// Configured buckets with health and cache freshness
    pub fn bucket_statuses(&self) -> Result<Vec<BucketStatus>> {
        self.buckets()
            .into_iter()
            .map(|bucket| {
                let entry = self.cache.peek(&bucket.cache_key())?;
                Ok(BucketStatus {
                    health: self.health.get(&bucket.name).unwrap_or_default(),
                    cached_at: entry.as_ref().map(|e| e.created_at),
                    cache_fresh: entry.as_ref().is_some_and(|e| !e.is_expired()),
                    bucket,
                })
            })
            .collect()
    }
}
