//! §4.5 File Downloader: fetches bytes for a `FileEntity`, stages them to a
//! per-sync temp directory, and fills in `local_path`/`size`/`mime_type` —
//! or reports a skip (not an error) when the file is oversized or
//! unsupported.

use crate::retry::call_with_backoff;
use reqwest::Client;
use std::path::{Path, PathBuf};
use tapestry_core::entity::FileFields;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("http error: {0}")]
    Http(#[from] anyhow::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Not an error: the driver treats this the same as choosing to skip the
/// entity itself.
#[derive(Debug, Clone)]
pub struct FileSkipped {
    pub reason: String,
}

pub enum DownloadOutcome {
    Saved(FileFields),
    Skipped(FileSkipped),
}

pub struct FileDownloader {
    http_client: Client,
    temp_dir: PathBuf,
    max_file_size_bytes: u64,
}

impl FileDownloader {
    pub fn new(http_client: Client, temp_dir: PathBuf, max_file_size_bytes: u64) -> Self {
        Self {
            http_client,
            temp_dir,
            max_file_size_bytes,
        }
    }

    /// Creates a fresh subdirectory scoped to one Sync Job so concurrent
    /// syncs never collide on filenames.
    pub fn sync_scoped(&self, sync_job_id: uuid::Uuid) -> std::io::Result<PathBuf> {
        let dir = self.temp_dir.join(sync_job_id.to_string());
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Downloads `url` with an `Authorization: Bearer <token>` header when
    /// `bearer_token` is present, retrying transient faults.
    pub async fn download(
        &self,
        source: &str,
        url: &str,
        bearer_token: Option<&str>,
        sync_job_id: uuid::Uuid,
        fallback_filename: &str,
    ) -> Result<DownloadOutcome, DownloadError> {
        let response = call_with_backoff(source, || {
            let mut builder = self.http_client.get(url);
            if let Some(token) = bearer_token {
                builder = builder.header("Authorization", format!("Bearer {token}"));
            }
            builder
        })
        .await?;

        if let Some(size_hint) = response.content_length() {
            if size_hint > self.max_file_size_bytes {
                return Ok(DownloadOutcome::Skipped(FileSkipped {
                    reason: format!(
                        "content-length {size_hint} exceeds max {max}",
                        max = self.max_file_size_bytes
                    ),
                }));
            }
        }

        let filename = content_disposition_filename(&response)
            .or_else(|| url_filename(url))
            .unwrap_or_else(|| fallback_filename.to_string());

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .or_else(|| mime_guess::from_path(&filename).first().map(|m| m.to_string()));

        let bytes = response
            .bytes()
            .await
            .map_err(|e| DownloadError::Http(anyhow::anyhow!(e)))?;

        if bytes.len() as u64 > self.max_file_size_bytes {
            return Ok(DownloadOutcome::Skipped(FileSkipped {
                reason: format!(
                    "downloaded size {} exceeds max {}",
                    bytes.len(),
                    self.max_file_size_bytes
                ),
            }));
        }

        let dir = self.sync_scoped(sync_job_id)?;
        let path = unique_path(&dir, &filename);
        std::fs::write(&path, &bytes)?;

        Ok(DownloadOutcome::Saved(FileFields {
            url: Some(url.to_string()),
            size: Some(bytes.len() as u64),
            file_type: mime_type.as_ref().map(|m| m.split('/').next().unwrap_or("application").to_string()),
            mime_type,
            local_path: Some(path.to_string_lossy().to_string()),
            checksum: Some(sha256_hex(&bytes)),
        }))
    }

    /// Writes already-fetched bytes directly, for sources that hand back
    /// inline content rather than a fetchable URL.
    pub fn save_bytes(
        &self,
        content: &[u8],
        filename: &str,
        sync_job_id: uuid::Uuid,
    ) -> Result<DownloadOutcome, DownloadError> {
        if content.len() as u64 > self.max_file_size_bytes {
            return Ok(DownloadOutcome::Skipped(FileSkipped {
                reason: format!(
                    "content size {} exceeds max {}",
                    content.len(),
                    self.max_file_size_bytes
                ),
            }));
        }
        let dir = self.sync_scoped(sync_job_id)?;
        let path = unique_path(&dir, filename);
        std::fs::write(&path, content)?;

        Ok(DownloadOutcome::Saved(FileFields {
            url: None,
            size: Some(content.len() as u64),
            file_type: mime_guess::from_path(&path)
                .first()
                .map(|m| m.type_().to_string()),
            mime_type: mime_guess::from_path(&path).first().map(|m| m.to_string()),
            local_path: Some(path.to_string_lossy().to_string()),
            checksum: Some(sha256_hex(content)),
        }))
    }
}

fn content_disposition_filename(response: &reqwest::Response) -> Option<String> {
    let header = response
        .headers()
        .get(reqwest::header::CONTENT_DISPOSITION)?
        .to_str()
        .ok()?;
    header.split(';').find_map(|part| {
        let part = part.trim();
        part.strip_prefix("filename=")
            .map(|f| f.trim_matches('"').to_string())
    })
}

fn url_filename(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    if last.is_empty() {
        None
    } else {
        Some(last.to_string())
    }
}

fn unique_path(dir: &Path, filename: &str) -> PathBuf {
    let candidate = dir.join(filename);
    if !candidate.exists() {
        return candidate;
    }
    let unique = format!("{}-{}", uuid::Uuid::new_v4(), filename);
    dir.join(unique)
}

fn sha256_hex(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
