//! Verified artifact downloads
//!
//! Artifacts are written to `<target>.tmp`, checked against the declared
//! size and SHA-256, and only then renamed onto the target. A file at the
//! target path is therefore always complete and verified.

use apkhub_core::{AppVersion, ManifestIndex};
use futures::StreamExt;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::error::{RepoError, Result};
use crate::http::HttpClient;
use crate::retry::RetryPolicy;

/// Per-download switches
#[derive(Debug, Clone, Default)]
pub struct DownloadOptions {
    /// Download even if a verified file already exists
    pub force: bool,
    /// Write here instead of the download directory
    pub output: Option<PathBuf>,
}

/// A package version picked from the merged index
#[derive(Debug, Clone)]
pub struct ResolvedArtifact {
    pub package_id: String,
    /// Merged (bucket-prefixed) version key
    pub version_key: String,
    pub version: AppVersion,
}

impl ResolvedArtifact {
    /// Default file name: `{packageId}_{version}.apk`
    pub fn file_name(&self) -> String {
        let label = if self.version.version.is_empty() {
            self.version_key.as_str()
        } else {
            self.version.version.as_str()
        };
        let label: String = label
            .chars()
            .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
            .collect();
        format!("{}_{}.apk", self.package_id, label)
    }
}

/// Outcome of a download
#[derive(Debug, Clone, Serialize)]
pub struct DownloadResult {
    pub path: PathBuf,
    pub size: u64,
    /// Hex SHA-256 of the file on disk
    pub sha256: String,
    /// True when an existing verified file was reused
    pub reused: bool,
}

/// Pick a version of `package_id` from a merged index.
///
/// `version` may be a merged key (`main_12`), the publisher's own key
/// (`12`) or a display version (`1.2.0`). `None` selects the latest
/// version. When several buckets match, the highest `versionCode` wins.
pub fn resolve(
    index: &ManifestIndex,
    package_id: &str,
    version: Option<&str>,
) -> Result<ResolvedArtifact> {
    let package = index
        .get(package_id)
        .ok_or_else(|| RepoError::PackageNotFound {
            package_id: package_id.to_string(),
        })?;

    let found = match version {
        None => package.latest_version(),
        Some(wanted) => package
            .versions
            .get_key_value(wanted)
            .map(|(k, v)| (k.as_str(), v))
            .or_else(|| {
                let suffix = format!("_{}", wanted);
                package
                    .versions_by_code()
                    .into_iter()
                    .find(|(key, _)| key.ends_with(&suffix))
            })
            .or_else(|| {
                package
                    .versions_by_code()
                    .into_iter()
                    .find(|(_, v)| v.version == wanted)
            }),
    };

    let (key, found) = found.ok_or_else(|| RepoError::VersionNotFound {
        package_id: package_id.to_string(),
        version: version.unwrap_or("latest").to_string(),
    })?;

    Ok(ResolvedArtifact {
        package_id: package_id.to_string(),
        version_key: key.to_string(),
        version: found.clone(),
    })
}

/// Downloads artifacts with retry and integrity checks
pub struct DownloadVerifier {
    client: HttpClient,
    policy: RetryPolicy,
    download_dir: PathBuf,
}

impl DownloadVerifier {
    pub fn new(client: HttpClient, policy: RetryPolicy, download_dir: PathBuf) -> Self {
        Self {
            client,
            policy,
            download_dir,
        }
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Where `artifact` is written for the given options
    pub fn target_path(&self, artifact: &ResolvedArtifact, options: &DownloadOptions) -> PathBuf {
        options
            .output
            .clone()
            .unwrap_or_else(|| self.download_dir.join(artifact.file_name()))
    }

    /// Download and verify an artifact
    pub async fn download(
        &self,
        artifact: &ResolvedArtifact,
        options: &DownloadOptions,
        cancel: &CancellationToken,
    ) -> Result<DownloadResult> {
        let url = artifact.version.download_url.as_str();
        if url.is_empty() {
            return Err(RepoError::NoDownloadUrl {
                package_id: artifact.package_id.clone(),
                version: artifact.version_key.clone(),
            });
        }

        let target = self.target_path(artifact, options);
        if let Some(parent) = target.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let expected = artifact.version.sha256.trim();

        if !options.force && tokio::fs::try_exists(&target).await? {
            let actual = hash_file(target.clone()).await?;
            if expected.is_empty() || digest_matches(expected, &actual) {
                tracing::info!(path = %target.display(), "reusing existing download");
                let size = tokio::fs::metadata(&target).await?.len();
                return Ok(DownloadResult {
                    path: target,
                    size,
                    sha256: actual,
                    reused: true,
                });
            }
            tracing::warn!(
                path = %target.display(),
                "existing file does not match the published checksum, downloading again"
            );
            tokio::fs::remove_file(&target).await?;
        }

        let tmp = tmp_path(&target);
        let declared_size = artifact.version.size;
        let name = artifact.file_name();

        let transferred = self
            .policy
            .run(cancel, url, |attempt| {
                let tmp = tmp.clone();
                let name = name.clone();
                async move {
                    remove_if_exists(&tmp).await?;
                    if attempt > 1 {
                        tracing::debug!(url, attempt, "retrying download");
                    }

                    let written = self.transfer(url, &tmp).await?;
                    if declared_size > 0 && written != declared_size {
                        return Err(RepoError::SizeMismatch {
                            name,
                            expected: declared_size,
                            actual: written,
                        });
                    }
                    Ok(written)
                }
            })
            .await;

        let size = match transferred {
            Ok(outcome) => outcome.value,
            Err(e) => {
                remove_if_exists(&tmp).await?;
                return Err(e);
            }
        };

        let actual = match hash_file(tmp.clone()).await {
            Ok(actual) => actual,
            Err(e) => {
                remove_if_exists(&tmp).await?;
                return Err(e);
            }
        };
        if !expected.is_empty() && !digest_matches(expected, &actual) {
            remove_if_exists(&tmp).await?;
            return Err(RepoError::IntegrityCheckFailed {
                name,
                expected: expected.to_string(),
                actual,
            });
        }

        tokio::fs::rename(&tmp, &target).await?;
        tracing::info!(path = %target.display(), size, "download complete");

        Ok(DownloadResult {
            path: target,
            size,
            sha256: actual,
            reused: false,
        })
    }

    /// Copy one artifact into `dest`, returning the number of bytes written
    async fn transfer(&self, url: &str, dest: &Path) -> Result<u64> {
        if let Some(path) = url.strip_prefix("file://") {
            return Ok(tokio::fs::copy(path, dest).await?);
        }

        let response = self.client.get(url).await?;
        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        file.flush().await?;
        file.sync_all().await?;
        Ok(written)
    }
}

fn tmp_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

async fn hash_file(path: PathBuf) -> Result<String> {
    tokio::task::spawn_blocking(move || sha256_file(&path))
        .await
        .map_err(|e| RepoError::Io(std::io::Error::other(e)))?
}

/// Hex SHA-256 of a file
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Compare two SHA-256 digests, ignoring case and a `sha256:` prefix
pub fn digest_matches(expected: &str, actual: &str) -> bool {
    let normalize = |d: &str| {
        d.trim()
            .to_lowercase()
            .trim_start_matches("sha256:")
            .trim_start_matches("sha256-")
            .to_string()
    };
    normalize(expected) == normalize(actual)
}
