//! Manifest sources
//!
//! A bucket's manifest is either served over HTTP(S) or read from a local
//! directory. Both are exposed through [`ManifestSource`] so the
//! synchronizer does not care where the bytes come from.

use async_trait::async_trait;
use std::path::PathBuf;

use crate::config::{Bucket, BucketKind};
use crate::error::{RepoError, Result};
use crate::http::HttpClient;

/// Raw manifest retrieval for one bucket
#[async_trait]
pub trait ManifestSource: Send + Sync {
    /// Bucket this source reads from
    fn bucket(&self) -> &Bucket;

    fn kind(&self) -> BucketKind;

    /// URL or path of the manifest, for logs and errors
    fn manifest_location(&self) -> String;

    /// Read the manifest bytes (one attempt, no retry)
    async fn fetch_raw(&self) -> Result<Vec<u8>>;
}

/// Create the source matching a bucket's URL scheme
pub fn create_source(bucket: &Bucket, client: &HttpClient) -> Result<Box<dyn ManifestSource>> {
    match bucket.kind()? {
        BucketKind::Http => Ok(Box::new(HttpSource {
            bucket: bucket.clone(),
            client: client.clone(),
        })),
        BucketKind::File => Ok(Box::new(FileSource::new(bucket.clone())?)),
    }
}

// ============ HTTP Source ============

pub struct HttpSource {
    bucket: Bucket,
    client: HttpClient,
}

#[async_trait]
impl ManifestSource for HttpSource {
    fn bucket(&self) -> &Bucket {
        &self.bucket
    }

    fn kind(&self) -> BucketKind {
        BucketKind::Http
    }

    fn manifest_location(&self) -> String {
        self.bucket.manifest_url()
    }

    async fn fetch_raw(&self) -> Result<Vec<u8>> {
        let url = self.manifest_location();
        match self.client.get_bytes(&url).await {
            Err(RepoError::HttpError { status: 404, .. }) => {
                Err(RepoError::ManifestNotFound { location: url })
            }
            other => other,
        }
    }
}

// ============ File Source ============

pub struct FileSource {
    bucket: Bucket,
    manifest_path: PathBuf,
}

impl FileSource {
    pub fn new(bucket: Bucket) -> Result<Self> {
        let root = bucket
            .local_root()
            .ok_or_else(|| RepoError::InvalidBucketUrl {
                url: bucket.url.clone(),
                reason: "not a file:// URL".to_string(),
            })?;
        let manifest_path = root.join(apkhub_core::MANIFEST_FILE);
        Ok(Self {
            bucket,
            manifest_path,
        })
    }
}

#[async_trait]
impl ManifestSource for FileSource {
    fn bucket(&self) -> &Bucket {
        &self.bucket
    }

    fn kind(&self) -> BucketKind {
        BucketKind::File
    }

    fn manifest_location(&self) -> String {
        self.manifest_path.display().to_string()
    }

    async fn fetch_raw(&self) -> Result<Vec<u8>> {
        match tokio::fs::read(&self.manifest_path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(RepoError::ManifestNotFound {
                    location: self.manifest_location(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}
