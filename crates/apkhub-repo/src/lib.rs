//! apkhub bucket synchronization and caching
//!
//! This crate is the engine behind the `apkhub` client:
//!
//! - **Buckets**: independent HTTP(S) or `file://` sources, each publishing
//!   one `apkhub_manifest.json`
//! - **Cache**: disk-backed TTL cache with stale reads for offline use
//! - **Synchronization**: retry with exponential backoff, per-bucket health
//!   tracking and stale-cache fallback
//! - **Trust**: optional signature checks against trusted key fingerprints
//! - **Merging**: one view over all enabled buckets with bucket-prefixed
//!   version keys
//! - **Downloads**: tmp-file-then-rename transfers verified by size and
//!   SHA-256
//!
//! ## Example
//!
//! ```rust,no_run
//! use apkhub_repo::{ClientConfig, DownloadOptions, Engine};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Engine::open(ClientConfig::default_path()?)?;
//! engine.add_bucket("main", "https://apps.example.com/main")?;
//!
//! let cancel = CancellationToken::new();
//! engine.update_all(&cancel).await?;
//!
//! let result = engine
//!     .download("org.example.notes", None, &DownloadOptions::default(), &cancel)
//!     .await?;
//! println!("saved to {}", result.path.display());
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod download;
pub mod engine;
pub mod error;
pub mod health;
pub mod http;
pub mod merge;
pub mod offline;
pub mod retry;
pub mod search;
pub mod source;
pub mod sync;
pub mod trust;

pub use cache::{CacheEntry, CacheLookup, CacheStats, CacheStore};
pub use config::{
    Bucket, BucketKind, ClientConfig, ClientSettings, NetworkSettings, SecuritySettings,
};
pub use download::{
    DownloadOptions, DownloadResult, DownloadVerifier, ResolvedArtifact, digest_matches,
    sha256_file,
};
pub use engine::{BucketStatus, Engine, UpdateReport, UpdateStatus};
pub use error::{RepoError, Result};
pub use health::{BucketHealth, HealthStatus, HealthTracker};
pub use http::HttpClient;
pub use merge::{ManifestMerger, MergedManifest, SkippedBucket, merge_manifests};
pub use offline::OfflineCoordinator;
pub use retry::{RetryOutcome, RetryPolicy};
pub use search::{SearchHit, SearchOptions};
pub use source::{ManifestSource, create_source};
pub use sync::{BucketSynchronizer, FetchMode, FetchOutcome, FetchSource};
pub use trust::{SignaturePolicy, TrustError};
