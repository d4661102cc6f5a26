//! Multi-bucket manifest merging
//!
//! Every version key is prefixed with its bucket name so two buckets can
//! publish the same package without colliding. Relative download URLs are
//! resolved against the owning bucket while merging, so the merged view is
//! self-contained.

use apkhub_core::{AppPackage, AppVersion, ManifestIndex, is_absolute_url};
use futures::future::join_all;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::Bucket;
use crate::error::{RepoError, Result};
use crate::sync::{BucketSynchronizer, FetchMode, FetchSource};

/// A bucket left out of a merge
#[derive(Debug, Clone, Serialize)]
pub struct SkippedBucket {
    pub name: String,
    pub reason: String,
}

/// Result of merging the enabled buckets
#[derive(Debug, Clone, Serialize)]
pub struct MergedManifest {
    pub index: ManifestIndex,
    /// Buckets that contributed, in merge order
    pub buckets: Vec<String>,
    /// Contributing buckets served from expired cache
    pub stale: Vec<String>,
    pub skipped: Vec<SkippedBucket>,
}

impl MergedManifest {
    pub fn is_partial(&self) -> bool {
        !self.skipped.is_empty() || !self.stale.is_empty()
    }
}

/// Prefixed key of a bucket's version
pub fn version_key(bucket: &str, key: &str) -> String {
    format!("{}_{}", bucket, key)
}

/// Resolve a download URL against the bucket that published it
pub fn resolve_download_url(bucket: &Bucket, url: &str) -> String {
    if url.is_empty() || is_absolute_url(url) {
        return url.to_string();
    }

    let relative = url.trim_start_matches("./").trim_start_matches('/');
    match bucket.local_root() {
        Some(root) => format!("file://{}", root.join(relative).display()),
        None => format!("{}/{}", bucket.base_url(), relative),
    }
}

/// Merge bucket manifests into one index.
///
/// Buckets are processed in name order. When two buckets publish the same
/// package, `latest` follows the greater of the two publishers' own
/// `latest` labels, compared as strings; ties keep the earlier bucket.
// TODO: compare versionCode instead of labels once publishers agree on it;
// with string order "2" beats "10".
pub fn merge_manifests(mut sources: Vec<(Bucket, ManifestIndex)>) -> ManifestIndex {
    sources.sort_by(|a, b| a.0.name.cmp(&b.0.name));

    let mut merged = ManifestIndex::default();
    // Publisher-side latest label of each merged package
    let mut source_latest: HashMap<String, String> = HashMap::new();

    for (bucket, manifest) in sources {
        if merged.version.is_empty() {
            merged.version = manifest.version.clone();
        }
        merged.updated_at = merged.updated_at.max(manifest.updated_at);
        merged.total_packages += if manifest.total_packages > 0 {
            manifest.total_packages
        } else {
            manifest.packages.len() as u64
        };
        merged.total_size += if manifest.total_size > 0 {
            manifest.total_size
        } else {
            manifest
                .packages
                .values()
                .flat_map(|p| p.versions.values())
                .map(|v| v.size)
                .sum()
        };

        for (package_id, package) in manifest.packages {
            let incoming_latest = match package.validate() {
                Ok(()) => package.latest.clone(),
                Err(e) => {
                    tracing::debug!(
                        bucket = %bucket.name,
                        package = %package_id,
                        error = %e,
                        "ignoring latest pointer"
                    );
                    String::new()
                }
            };
            let incoming = namespace_package(&bucket, &package_id, package, &incoming_latest);

            match merged.packages.get_mut(&package_id) {
                None => {
                    source_latest.insert(package_id.clone(), incoming_latest);
                    merged.packages.insert(package_id, incoming);
                }
                Some(existing) => {
                    let mut latest_collided = false;
                    for (key, version) in incoming.versions {
                        if existing.versions.contains_key(&key) {
                            // Only reachable with bucket names that bypassed validation
                            tracing::warn!(
                                bucket = %bucket.name,
                                package = %package_id,
                                key = %key,
                                "version key already taken by another bucket, skipping"
                            );
                            latest_collided |= key == incoming.latest;
                            continue;
                        }
                        existing.versions.insert(key, version);
                    }

                    let current = source_latest.entry(package_id).or_default();
                    if !latest_collided && incoming_latest > *current {
                        existing.latest = incoming.latest;
                        *current = incoming_latest;
                    }

                    if existing.category.is_empty() {
                        existing.category = incoming.category;
                    }
                    existing.name.fill_missing(&incoming.name);
                    existing.description.fill_missing(&incoming.description);
                }
            }
        }
    }

    merged
}

/// Deep copy of a bucket's package with prefixed version keys and resolved URLs
fn namespace_package(
    bucket: &Bucket,
    package_id: &str,
    package: AppPackage,
    latest: &str,
) -> AppPackage {
    let versions: BTreeMap<String, AppVersion> = package
        .versions
        .into_iter()
        .map(|(key, mut version)| {
            version.download_url = resolve_download_url(bucket, &version.download_url);
            (version_key(&bucket.name, &key), version)
        })
        .collect();

    AppPackage {
        package_id: if package.package_id.is_empty() {
            package_id.to_string()
        } else {
            package.package_id
        },
        latest: if latest.is_empty() {
            String::new()
        } else {
            version_key(&bucket.name, latest)
        },
        versions,
        ..package
    }
}

/// Fetches every enabled bucket and merges the results
pub struct ManifestMerger {
    sync: Arc<BucketSynchronizer>,
}

impl ManifestMerger {
    pub fn new(sync: Arc<BucketSynchronizer>) -> Self {
        Self { sync }
    }

    /// Fetch all `buckets` concurrently and merge them. Failing buckets are
    /// skipped; the merge fails only when none can be read.
    pub async fn merge(
        &self,
        buckets: &[Bucket],
        mode: FetchMode,
        cancel: &CancellationToken,
    ) -> Result<MergedManifest> {
        if buckets.is_empty() {
            return Err(RepoError::NoEnabledBuckets);
        }

        let results = join_all(
            buckets
                .iter()
                .map(|bucket| self.sync.fetch(bucket, mode, cancel)),
        )
        .await;

        let mut sources = Vec::new();
        let mut stale = Vec::new();
        let mut skipped = Vec::new();

        for (bucket, result) in buckets.iter().zip(results) {
            match result {
                Ok(outcome) => {
                    if outcome.source == FetchSource::Stale {
                        stale.push(bucket.name.clone());
                    }
                    sources.push((bucket.clone(), outcome.manifest));
                }
                Err(RepoError::Cancelled) => return Err(RepoError::Cancelled),
                Err(e) => {
                    tracing::warn!(bucket = %bucket.name, error = %e, "skipping bucket");
                    skipped.push(SkippedBucket {
                        name: bucket.name.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if sources.is_empty() {
            let failures = skipped
                .iter()
                .map(|s| format!("  {}: {}", s.name, s.reason))
                .collect::<Vec<_>>()
                .join("\n");
            return Err(RepoError::AllBucketsFailed { failures });
        }

        Ok(assemble(sources, stale, skipped))
    }
}

/// Wrap merged sources with their bookkeeping
pub(crate) fn assemble(
    sources: Vec<(Bucket, ManifestIndex)>,
    mut stale: Vec<String>,
    mut skipped: Vec<SkippedBucket>,
) -> MergedManifest {
    let mut names: Vec<String> = sources.iter().map(|(b, _)| b.name.clone()).collect();
    names.sort();
    stale.sort();
    skipped.sort_by(|a, b| a.name.cmp(&b.name));

    MergedManifest {
        index: merge_manifests(sources),
        buckets: names,
        stale,
        skipped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStore;
    use crate::config::SecuritySettings;
    use crate::health::HealthTracker;
    use crate::http::HttpClient;
    use crate::retry::RetryPolicy;
    use apkhub_core::LocalizedText;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn package(id: &str, versions: &[(&str, i64)], latest: &str) -> AppPackage {
        AppPackage {
            package_id: id.to_string(),
            name: LocalizedText::new(id),
            versions: versions
                .iter()
                .map(|(key, code)| {
                    (
                        key.to_string(),
                        AppVersion {
                            version: key.to_string(),
                            version_code: *code,
                            download_url: format!("apks/{}-{}.apk", id, key),
                            size: 10,
                            ..Default::default()
                        },
                    )
                })
                .collect(),
            latest: latest.to_string(),
            ..Default::default()
        }
    }

    fn manifest(packages: Vec<AppPackage>) -> ManifestIndex {
        ManifestIndex {
            packages: packages
                .into_iter()
                .map(|p| (p.package_id.clone(), p))
                .collect(),
            ..Default::default()
        }
    }

    fn bucket(name: &str, url: &str) -> Bucket {
        Bucket::new(name, url).unwrap()
    }

    #[test]
    fn test_resolve_download_url() {
        let http = bucket("main", "https://apps.example.com/repo/");
        assert_eq!(
            resolve_download_url(&http, "apks/a.apk"),
            "https://apps.example.com/repo/apks/a.apk"
        );
        assert_eq!(
            resolve_download_url(&http, "/apks/a.apk"),
            "https://apps.example.com/repo/apks/a.apk"
        );
        assert_eq!(
            resolve_download_url(&http, "https://cdn.example.com/a.apk"),
            "https://cdn.example.com/a.apk"
        );

        let local = bucket("local", "file:///srv/apkhub");
        assert_eq!(
            resolve_download_url(&local, "./apks/a.apk"),
            "file:///srv/apkhub/apks/a.apk"
        );
        assert_eq!(resolve_download_url(&local, ""), "");
    }

    #[test]
    fn test_single_bucket_namespacing() {
        let merged = merge_manifests(vec![(
            bucket("main", "http://x/"),
            manifest(vec![package("com.app", &[("1", 1)], "1")]),
        )]);

        let app = merged.get("com.app").unwrap();
        assert_eq!(app.versions.keys().collect::<Vec<_>>(), vec!["main_1"]);
        assert_eq!(app.latest, "main_1");
        assert_eq!(app.versions["main_1"].download_url, "http://x/apks/com.app-1.apk");
        assert_eq!(merged.total_packages, 1);
        assert_eq!(merged.total_size, 10);
    }

    #[test]
    fn test_namespace_safety() {
        let merged = merge_manifests(vec![
            (
                bucket("main", "http://x/"),
                manifest(vec![package("com.app", &[("1", 1), ("2", 2)], "2")]),
            ),
            (
                bucket("extra", "http://y/"),
                manifest(vec![package("com.app", &[("1", 1), ("2", 2), ("3", 3)], "3")]),
            ),
        ]);

        let app = merged.get("com.app").unwrap();
        assert_eq!(app.versions.len(), 5);
        assert_eq!(app.latest, "extra_3");
        assert_eq!(merged.total_packages, 2);
    }

    #[test]
    fn test_version_keys_never_overwrite() {
        // "a" + "b_1" and "a.b" + "1" stay distinct
        let merged = merge_manifests(vec![
            (bucket("a", "http://x/"), manifest(vec![package("com.app", &[("b_1", 1)], "b_1")])),
            (bucket("a.b", "http://y/"), manifest(vec![package("com.app", &[("1", 2)], "1")])),
        ]);
        let app = merged.get("com.app").unwrap();
        assert_eq!(app.versions.keys().collect::<Vec<_>>(), vec!["a.b_1", "a_b_1"]);

        // Names that skipped validation still cannot clobber an earlier bucket
        let unchecked = |name: &str, url: &str| Bucket {
            name: name.to_string(),
            url: url.to_string(),
            enabled: true,
            last_updated: None,
        };
        let merged = merge_manifests(vec![
            (unchecked("a", "http://x/"), manifest(vec![package("com.app", &[("b_1", 1)], "b_1")])),
            (unchecked("a_b", "http://y/"), manifest(vec![package("com.app", &[("1", 2)], "1")])),
        ]);
        let app = merged.get("com.app").unwrap();
        assert_eq!(app.versions.len(), 1);
        assert_eq!(app.versions["a_b_1"].version_code, 1);
        assert_eq!(app.versions["a_b_1"].download_url, "http://x/apks/com.app-b_1.apk");
        assert_eq!(app.latest, "a_b_1");
    }

    #[test]
    fn test_latest_label_comparison() {
        // String order: "2" > "10"
        let merged = merge_manifests(vec![
            (
                bucket("a", "http://a/"),
                manifest(vec![package("com.app", &[("2", 2)], "2")]),
            ),
            (
                bucket("b", "http://b/"),
                manifest(vec![package("com.app", &[("10", 10)], "10")]),
            ),
        ]);
        assert_eq!(merged.get("com.app").unwrap().latest, "a_2");
    }

    #[test]
    fn test_latest_tie_keeps_first_bucket() {
        let merged = merge_manifests(vec![
            (
                bucket("zeta", "http://z/"),
                manifest(vec![package("com.app", &[("1", 1)], "1")]),
            ),
            (
                bucket("alpha", "http://a/"),
                manifest(vec![package("com.app", &[("1", 1)], "1")]),
            ),
        ]);
        assert_eq!(merged.get("com.app").unwrap().latest, "alpha_1");
    }

    #[test]
    fn test_merge_is_order_independent() {
        let a = (
            bucket("a", "http://a/"),
            manifest(vec![package("com.one", &[("1", 1)], "1")]),
        );
        let b = (
            bucket("b", "http://b/"),
            manifest(vec![
                package("com.one", &[("5", 5)], "5"),
                package("com.two", &[("1", 1)], "1"),
            ]),
        );

        let forward = merge_manifests(vec![a.clone(), b.clone()]);
        let backward = merge_manifests(vec![b, a]);
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_merge_idempotent() {
        let sources = vec![
            (
                bucket("main", "http://x/"),
                manifest(vec![package("com.app", &[("1", 1)], "1")]),
            ),
            (
                bucket("extra", "file:///srv/extra"),
                manifest(vec![package("com.app", &[("2", 2)], "2")]),
            ),
        ];
        assert_eq!(merge_manifests(sources.clone()), merge_manifests(sources));
    }

    #[test]
    fn test_dangling_latest_dropped() {
        let merged = merge_manifests(vec![(
            bucket("main", "http://x/"),
            manifest(vec![package("com.app", &[("1", 1)], "missing")]),
        )]);
        let app = merged.get("com.app").unwrap();
        assert_eq!(app.latest, "");
        // falls back to the highest versionCode
        assert_eq!(app.latest_version().unwrap().0, "main_1");
    }

    #[test]
    fn test_package_id_filled_from_key() {
        let mut index = ManifestIndex::default();
        index
            .packages
            .insert("com.app".to_string(), package("", &[("1", 1)], "1"));
        let merged = merge_manifests(vec![(bucket("main", "http://x/"), index)]);
        assert_eq!(merged.get("com.app").unwrap().package_id, "com.app");
    }

    fn synchronizer(dir: &std::path::Path) -> Arc<BucketSynchronizer> {
        Arc::new(BucketSynchronizer::new(
            Arc::new(CacheStore::open(dir, Duration::from_secs(60)).unwrap()),
            Arc::new(HealthTracker::new()),
            HttpClient::new(None).unwrap(),
            RetryPolicy {
                max_retries: 1,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
                backoff_factor: 2.0,
                attempt_timeout: Duration::from_secs(5),
            },
            SecuritySettings::default(),
            Duration::from_secs(60),
        ))
    }

    async fn serve_manifest(server: &MockServer, prefix: &str, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path(format!("/{}/apkhub_manifest.json", prefix)))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_end_to_end_main_and_extra() {
        let server = MockServer::start().await;
        serve_manifest(
            &server,
            "main",
            serde_json::json!({
                "packages": {"com.app": {
                    "packageId": "com.app",
                    "versions": {"1": {"versionCode": 1, "downloadUrl": "com.app-1.apk"}},
                    "latest": "1"
                }}
            }),
        )
        .await;
        serve_manifest(
            &server,
            "extra",
            serde_json::json!({
                "packages": {"com.app": {
                    "packageId": "com.app",
                    "versions": {"2": {"versionCode": 2, "downloadUrl": "com.app-2.apk"}},
                    "latest": "2"
                }}
            }),
        )
        .await;

        let dir = tempfile::tempdir().unwrap();
        let merger = ManifestMerger::new(synchronizer(dir.path()));
        let main = bucket("main", &format!("{}/main/", server.uri()));
        let extra = bucket("extra", &format!("{}/extra", server.uri()));

        let cancel = CancellationToken::new();
        let only_main = merger
            .merge(std::slice::from_ref(&main), FetchMode::Refresh, &cancel)
            .await
            .unwrap();
        let app = only_main.index.get("com.app").unwrap();
        assert_eq!(app.versions.keys().collect::<Vec<_>>(), vec!["main_1"]);
        assert_eq!(app.latest, "main_1");

        let both = merger
            .merge(&[main, extra], FetchMode::Refresh, &cancel)
            .await
            .unwrap();
        let app = both.index.get("com.app").unwrap();
        assert_eq!(
            app.versions.keys().collect::<Vec<_>>(),
            vec!["extra_2", "main_1"]
        );
        assert_eq!(
            app.versions["main_1"].download_url,
            format!("{}/main/com.app-1.apk", server.uri())
        );
        assert_eq!(both.buckets, vec!["extra", "main"]);
        assert!(!both.is_partial());
    }

    #[tokio::test]
    async fn test_partial_and_total_failure() {
        let server = MockServer::start().await;
        serve_manifest(
            &server,
            "good",
            serde_json::json!({"packages": {"com.app": {"versions": {"1": {}}}}}),
        )
        .await;

        let dir = tempfile::tempdir().unwrap();
        let merger = ManifestMerger::new(synchronizer(dir.path()));
        let good = bucket("good", &format!("{}/good", server.uri()));
        let bad = bucket("bad", &format!("{}/bad", server.uri()));
        let cancel = CancellationToken::new();

        let merged = merger
            .merge(&[good, bad.clone()], FetchMode::Refresh, &cancel)
            .await
            .unwrap();
        assert_eq!(merged.buckets, vec!["good"]);
        assert_eq!(merged.skipped.len(), 1);
        assert_eq!(merged.skipped[0].name, "bad");
        assert!(merged.is_partial());

        let err = merger
            .merge(&[bad], FetchMode::Refresh, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::AllBucketsFailed { .. }));

        let err = merger
            .merge(&[], FetchMode::Refresh, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::NoEnabledBuckets));
    }
}
