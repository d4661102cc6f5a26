//! Offline detection and cache-only views
//!
//! Connectivity is probed by opening short TCP connections to well-known
//! hosts; the verdict is reused for `check_interval`. When offline, the
//! merged view is assembled from whatever the cache still holds, fresh or
//! expired.

use apkhub_core::ManifestIndex;
use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;

use crate::cache::{CacheLookup, CacheStore};
use crate::config::Bucket;
use crate::error::{RepoError, Result};
use crate::merge::{MergedManifest, SkippedBucket, assemble};
use crate::search::{SearchHit, SearchOptions, search};

pub struct OfflineCoordinator {
    cache: Arc<CacheStore>,
    hosts: Vec<String>,
    probe_timeout: Duration,
    check_interval: Duration,
    last_check: Mutex<Option<(Instant, bool)>>,
}

impl OfflineCoordinator {
    pub fn new(
        cache: Arc<CacheStore>,
        hosts: Vec<String>,
        probe_timeout: Duration,
        check_interval: Duration,
    ) -> Self {
        Self {
            cache,
            hosts,
            probe_timeout,
            check_interval,
            last_check: Mutex::new(None),
        }
    }

    /// Whether every probe host is unreachable. The answer is cached for
    /// the check interval; an empty host list is always online.
    pub async fn is_offline(&self) -> bool {
        if let Some((checked_at, offline)) = *self.last_check.lock()
            && checked_at.elapsed() < self.check_interval
        {
            return offline;
        }
        self.refresh().await
    }

    /// Probe now, ignoring any cached verdict
    pub async fn refresh(&self) -> bool {
        let offline = if self.hosts.is_empty() {
            false
        } else {
            let probes = self.hosts.iter().map(|host| self.probe(host));
            !join_all(probes).await.into_iter().any(|reachable| reachable)
        };

        if offline {
            tracing::info!(hosts = ?self.hosts, "no probe host reachable, assuming offline");
        }
        *self.last_check.lock() = Some((Instant::now(), offline));
        offline
    }

    async fn probe(&self, host: &str) -> bool {
        match tokio::time::timeout(self.probe_timeout, TcpStream::connect(host)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                tracing::debug!(host, error = %e, "connectivity probe failed");
                false
            }
            Err(_) => {
                tracing::debug!(host, "connectivity probe timed out");
                false
            }
        }
    }

    /// Merge whatever the cache holds for `buckets`. Buckets with no cache
    /// entry are skipped; fails only when none has one.
    pub fn merged_offline_view(&self, buckets: &[Bucket]) -> Result<MergedManifest> {
        let mut sources = Vec::new();
        let mut stale = Vec::new();
        let mut skipped = Vec::new();

        for bucket in buckets {
            match self.cache.get_allow_stale::<ManifestIndex>(&bucket.cache_key()) {
                Ok(CacheLookup::Fresh(manifest)) => sources.push((bucket.clone(), manifest)),
                Ok(CacheLookup::Stale(manifest)) => {
                    stale.push(bucket.name.clone());
                    sources.push((bucket.clone(), manifest));
                }
                Ok(CacheLookup::Absent) => skipped.push(SkippedBucket {
                    name: bucket.name.clone(),
                    reason: "no cached manifest".to_string(),
                }),
                Err(e) => {
                    tracing::warn!(bucket = %bucket.name, error = %e, "cache read failed");
                    skipped.push(SkippedBucket {
                        name: bucket.name.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if sources.is_empty() {
            return Err(RepoError::NoCachedData);
        }

        Ok(assemble(sources, stale, skipped))
    }

    /// Search the offline view
    pub fn search(
        &self,
        buckets: &[Bucket],
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchHit>> {
        let view = self.merged_offline_view(buckets)?;
        Ok(search(&view.index, query, options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apkhub_core::{AppPackage, AppVersion, LocalizedText};
    use tokio::net::TcpListener;

    fn coordinator(cache: Arc<CacheStore>, hosts: Vec<String>) -> OfflineCoordinator {
        OfflineCoordinator::new(
            cache,
            hosts,
            Duration::from_millis(300),
            Duration::from_secs(30),
        )
    }

    fn cache(dir: &tempfile::TempDir) -> Arc<CacheStore> {
        Arc::new(CacheStore::open(dir.path(), Duration::from_secs(60)).unwrap())
    }

    fn manifest(id: &str) -> ManifestIndex {
        let mut package = AppPackage {
            package_id: id.to_string(),
            name: LocalizedText::new("Notes"),
            latest: "1".to_string(),
            ..Default::default()
        };
        package.versions.insert("1".to_string(), AppVersion::default());
        let mut index = ManifestIndex::default();
        index.packages.insert(id.to_string(), package);
        index
    }

    #[tokio::test]
    async fn test_empty_hosts_always_online() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(cache(&dir), vec![]);
        assert!(!coordinator.is_offline().await);
    }

    #[tokio::test]
    async fn test_reachable_host_is_online() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(
            cache(&dir),
            vec!["127.0.0.1:1".to_string(), addr.to_string()],
        );
        assert!(!coordinator.is_offline().await);
    }

    #[tokio::test]
    async fn test_unreachable_hosts_offline_and_cached() {
        // Bind then drop to get a port nothing listens on
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };

        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(cache(&dir), vec![addr.to_string()]);
        assert!(coordinator.is_offline().await);

        // Verdict is reused within the interval even once the host is back
        let _listener = TcpListener::bind(addr).await.unwrap();
        assert!(coordinator.is_offline().await);
        assert!(!coordinator.refresh().await);
    }

    #[test]
    fn test_offline_view_uses_stale_entries() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir);
        let main = Bucket::new("main", "http://x/").unwrap();
        let extra = Bucket::new("extra", "http://y/").unwrap();
        let empty = Bucket::new("empty", "http://z/").unwrap();

        cache
            .set(&main.cache_key(), &manifest("com.notes"), Duration::from_secs(60))
            .unwrap();
        cache
            .set(&extra.cache_key(), &manifest("com.notes"), Duration::from_millis(1))
            .unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let coordinator = coordinator(cache.clone(), vec![]);
        let view = coordinator
            .merged_offline_view(&[main.clone(), extra.clone(), empty.clone()])
            .unwrap();

        assert_eq!(view.buckets, vec!["extra", "main"]);
        assert_eq!(view.stale, vec!["extra"]);
        assert_eq!(view.skipped.len(), 1);
        let notes = view.index.get("com.notes").unwrap();
        assert_eq!(notes.versions.len(), 2);

        // The stale entry is still on disk
        assert!(cache.path_for(&extra.cache_key()).exists());

        let hits = coordinator
            .search(&[main, extra], "notes", &SearchOptions::default())
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].package_id, "com.notes");

        assert!(matches!(
            coordinator.merged_offline_view(&[empty]),
            Err(RepoError::NoCachedData)
        ));
    }
}
