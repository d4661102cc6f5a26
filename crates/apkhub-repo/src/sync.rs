//! Bucket synchronization
//!
//! Fetches one bucket's manifest with read-through caching, retry and
//! backoff, signature checks and stale-cache fallback. Every outcome is
//! reported to the shared [`HealthTracker`].

use apkhub_core::ManifestIndex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::cache::{CacheLookup, CacheStore};
use crate::config::{Bucket, SecuritySettings};
use crate::error::{RepoError, Result};
use crate::health::HealthTracker;
use crate::http::HttpClient;
use crate::retry::RetryPolicy;
use crate::source::create_source;
use crate::trust;

/// Whether a fresh cache entry may answer the fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    /// Serve a fresh cache entry without network I/O
    #[default]
    CacheFirst,
    /// Always go to the bucket (used by update)
    Refresh,
}

/// Where a fetched manifest came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSource {
    /// Fetched from the bucket just now
    Fresh,
    /// Fresh cache entry
    Cache,
    /// Expired cache entry served after the bucket failed
    Stale,
}

#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub manifest: ManifestIndex,
    pub source: FetchSource,
    /// Duration of the successful network attempt, if any
    pub response_time: Option<Duration>,
    /// The failure that forced a stale fallback
    pub error: Option<String>,
}

/// Fetches bucket manifests
pub struct BucketSynchronizer {
    cache: Arc<CacheStore>,
    health: Arc<HealthTracker>,
    client: HttpClient,
    policy: RetryPolicy,
    security: SecuritySettings,
    cache_ttl: Duration,
}

impl BucketSynchronizer {
    pub fn new(
        cache: Arc<CacheStore>,
        health: Arc<HealthTracker>,
        client: HttpClient,
        policy: RetryPolicy,
        security: SecuritySettings,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            cache,
            health,
            client,
            policy,
            security,
            cache_ttl,
        }
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn health(&self) -> &Arc<HealthTracker> {
        &self.health
    }

    /// Fetch a bucket's manifest
    pub async fn fetch(
        &self,
        bucket: &Bucket,
        mode: FetchMode,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome> {
        let key = bucket.cache_key();

        // Expired entries must survive the lookup so they can serve as the
        // fallback below.
        if mode == FetchMode::CacheFirst {
            match self.cache.get_allow_stale::<ManifestIndex>(&key) {
                Ok(CacheLookup::Fresh(manifest)) => {
                    tracing::debug!(bucket = %bucket.name, "manifest served from cache");
                    self.health.record_cache_hit(&bucket.name);
                    return Ok(FetchOutcome {
                        manifest,
                        source: FetchSource::Cache,
                        response_time: None,
                        error: None,
                    });
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(bucket = %bucket.name, error = %e, "cache read failed"),
            }
        }

        let err = match self.fetch_remote(bucket, cancel).await {
            Ok((manifest, response_time)) => {
                if cancel.is_cancelled() {
                    return Err(RepoError::Cancelled);
                }
                if let Err(e) = self.cache.set(&key, &manifest, self.cache_ttl) {
                    tracing::warn!(bucket = %bucket.name, error = %e, "failed to cache manifest");
                }
                self.health.record_success(&bucket.name, response_time);
                tracing::info!(
                    bucket = %bucket.name,
                    packages = manifest.packages.len(),
                    elapsed_ms = response_time.as_millis() as u64,
                    "manifest fetched"
                );
                return Ok(FetchOutcome {
                    manifest,
                    source: FetchSource::Fresh,
                    response_time: Some(response_time),
                    error: None,
                });
            }
            Err(RepoError::Cancelled) => return Err(RepoError::Cancelled),
            Err(e) => e,
        };

        self.health.record_failure(&bucket.name, &err.to_string());

        match self.cache.get_allow_stale::<ManifestIndex>(&key) {
            Ok(lookup) => {
                if let Some(manifest) = lookup.into_value() {
                    tracing::warn!(
                        bucket = %bucket.name,
                        error = %err,
                        "bucket unreachable, using cached manifest"
                    );
                    return Ok(FetchOutcome {
                        manifest,
                        source: FetchSource::Stale,
                        response_time: None,
                        error: Some(err.to_string()),
                    });
                }
            }
            Err(e) => tracing::warn!(bucket = %bucket.name, error = %e, "stale cache read failed"),
        }

        Err(RepoError::BucketFetchFailed {
            bucket: bucket.name.clone(),
            source: Box::new(err),
        })
    }

    /// Network part of a fetch: retried read, parse and trust check
    async fn fetch_remote(
        &self,
        bucket: &Bucket,
        cancel: &CancellationToken,
    ) -> Result<(ManifestIndex, Duration)> {
        let source = create_source(bucket, &self.client)?;
        let label = source.manifest_location();

        let source = &source;
        let outcome = self
            .policy
            .run(cancel, &label, |_| async move {
                let started = Instant::now();
                let bytes = source.fetch_raw().await?;
                Ok::<_, RepoError>((bytes, started.elapsed()))
            })
            .await?;
        let (bytes, response_time) = outcome.value;

        let manifest =
            ManifestIndex::from_slice(&bytes).map_err(|e| RepoError::InvalidManifest {
                bucket: bucket.name.clone(),
                message: e.to_string(),
            })?;

        self.check_trust(bucket, &manifest)?;

        Ok((manifest, response_time))
    }

    fn check_trust(&self, bucket: &Bucket, manifest: &ManifestIndex) -> Result<()> {
        if !self.security.verify_signature {
            return Ok(());
        }

        match trust::verify(manifest, &self.security.trusted_keys) {
            Ok(()) => Ok(()),
            Err(reason) if self.security.signature_policy.is_strict() => {
                Err(RepoError::SignatureRejected {
                    bucket: bucket.name.clone(),
                    reason,
                })
            }
            Err(reason) => {
                tracing::warn!(
                    bucket = %bucket.name,
                    reason = %reason,
                    "manifest signature not trusted, accepting under lenient policy"
                );
                Ok(())
            }
        }
    }
}
