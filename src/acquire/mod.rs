//! Resolve a row's source location to a local file
//!
//! Three kinds of source are handled:
//! - local paths, used in place and never deleted
//! - plain `http(s)` URLs, downloaded with bounded retries and a web-archive
//!   fallback once the direct attempts are exhausted
//! - video-platform URLs, handed to a [`VideoExtractor`] with credential and
//!   format fallback
//!
//! Downloads land in a per-row scratch directory owned by the returned
//! [`AcquiredFile`]; dropping it removes everything the row downloaded.

pub mod archive;
pub mod http;
pub mod video;

pub use archive::{ArchiveIndex, WaybackArchive};
pub use video::{VideoExtractor, YtDlpExtractor};

use crate::config::AcquireConfig;
use crate::control::RunControl;
use crate::error::{DownloadError, Error, Result};
use crate::retry::RetryPolicy;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// How a source location will be fetched
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceKind {
    /// File on this machine
    Local(PathBuf),
    /// Plain download
    Url(String),
    /// Video platform page
    Video(String),
}

impl SourceKind {
    /// Decide from the text of a source location
    pub fn detect(source: &str, config: &AcquireConfig) -> Self {
        let trimmed = source.trim();
        if let Ok(url) = url::Url::parse(trimmed) {
            match url.scheme() {
                "http" | "https" => {
                    if url.host_str().is_some_and(|host| config.is_video_host(host)) {
                        return SourceKind::Video(trimmed.to_string());
                    }
                    return SourceKind::Url(trimmed.to_string());
                }
                "file" => {
                    if let Ok(path) = url.to_file_path() {
                        return SourceKind::Local(path);
                    }
                }
                _ => {}
            }
        }
        SourceKind::Local(PathBuf::from(trimmed))
    }
}

/// A local file ready for classification
///
/// Downloaded files live in a scratch directory that is removed on drop.
#[derive(Debug)]
pub struct AcquiredFile {
    path: PathBuf,
    scratch: Option<TempDir>,
}

impl AcquiredFile {
    /// Wrap a caller-owned local file
    pub fn borrowed(path: PathBuf) -> Self {
        Self {
            path,
            scratch: None,
        }
    }

    /// Wrap a file that lives inside `scratch`
    pub fn owned(path: PathBuf, scratch: TempDir) -> Self {
        Self {
            path,
            scratch: Some(scratch),
        }
    }

    /// Path of the file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether this value deletes the file when dropped
    pub fn is_owned(&self) -> bool {
        self.scratch.is_some()
    }

    /// Scratch directory for derived files (conversions), if owned
    pub fn scratch_dir(&self) -> Option<&Path> {
        self.scratch.as_ref().map(TempDir::path)
    }
}

/// Fetches sources for the pipeline
pub struct Acquirer {
    config: Arc<AcquireConfig>,
    client: reqwest::Client,
    archive: Arc<dyn ArchiveIndex>,
    extractor: Option<Arc<dyn VideoExtractor>>,
}

impl Acquirer {
    /// Create an acquirer; without an extractor, video URLs fail with an extraction error
    pub fn new(
        config: Arc<AcquireConfig>,
        client: reqwest::Client,
        archive: Arc<dyn ArchiveIndex>,
        extractor: Option<Arc<dyn VideoExtractor>>,
    ) -> Self {
        Self {
            config,
            client,
            archive,
            extractor,
        }
    }

    /// HTTP client shared by downloads and archive lookups
    pub fn build_client(config: &AcquireConfig) -> Result<reqwest::Client> {
        Ok(reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()?)
    }

    /// Resolve `source` to a local file
    pub async fn acquire(&self, source: &str, control: &RunControl) -> Result<AcquiredFile> {
        match SourceKind::detect(source, &self.config) {
            SourceKind::Local(path) => {
                if tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_file()) {
                    Ok(AcquiredFile::borrowed(path))
                } else {
                    Err(Error::NotFound(path))
                }
            }
            SourceKind::Url(url) => {
                let scratch = self.scratch_dir().await?;
                let path = self.download(&url, scratch.path(), control).await?;
                Ok(AcquiredFile::owned(path, scratch))
            }
            SourceKind::Video(url) => {
                let Some(extractor) = &self.extractor else {
                    return Err(Error::ExternalTool(
                        "no video extractor available (is yt-dlp installed?)".to_string(),
                    ));
                };
                let scratch = self.scratch_dir().await?;
                let path = video::extract_with_fallback(
                    extractor.as_ref(),
                    &self.config,
                    &url,
                    scratch.path(),
                    control,
                )
                .await?;
                Ok(AcquiredFile::owned(path, scratch))
            }
        }
    }

    async fn scratch_dir(&self) -> Result<TempDir> {
        tokio::fs::create_dir_all(&self.config.temp_dir).await?;
        Ok(tempfile::Builder::new()
            .prefix("row-")
            .tempdir_in(&self.config.temp_dir)?)
    }

    async fn download(&self, url: &str, dir: &Path, control: &RunControl) -> Result<PathBuf> {
        let policy = RetryPolicy::fixed(self.config.download_attempts, self.config.download_pause);
        let (direct_error, attempts) = match self.download_direct(url, dir, &policy, control).await {
            Ok(path) => return Ok(path),
            Err((Error::Cancelled, _)) => return Err(Error::Cancelled),
            Err(failure) => failure,
        };

        tracing::warn!(url, attempts, error = %direct_error, "Direct download failed");

        let archive_outcome = if self.config.use_archive {
            match self.download_from_archive(url, dir, attempts, control).await {
                Ok(path) => return Ok(path),
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => e.to_string(),
            }
        } else {
            "disabled".to_string()
        };

        Err(DownloadError::Exhausted {
            url: url.to_string(),
            attempts,
            last_error: direct_error.to_string(),
            archive: archive_outcome,
        }
        .into())
    }

    /// Direct download; any failure, client errors included, uses up one attempt
    ///
    /// On failure returns the last error with the number of attempts made.
    async fn download_direct(
        &self,
        url: &str,
        dir: &Path,
        policy: &RetryPolicy,
        control: &RunControl,
    ) -> std::result::Result<PathBuf, (Error, u32)> {
        let mut attempt = 0;

        loop {
            if let Err(e) = control.checkpoint().await {
                return Err((e, attempt));
            }
            attempt += 1;
            tracing::debug!(url, attempt, "Downloading");

            match http::fetch_to_dir(&self.client, url, dir, attempt, control).await {
                Ok(path) => return Ok(path),
                Err(Error::Cancelled) => return Err((Error::Cancelled, attempt)),
                Err(e) if attempt < policy.max_attempts => {
                    let delay = policy.delay();
                    tracing::debug!(
                        url,
                        error = %e,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Download attempt failed"
                    );
                    if let Err(e) = control.sleep(delay).await {
                        return Err((e, attempt));
                    }
                }
                Err(e) => return Err((e, attempt)),
            }
        }
    }

    async fn download_from_archive(
        &self,
        url: &str,
        dir: &Path,
        direct_attempts: u32,
        control: &RunControl,
    ) -> Result<PathBuf> {
        control.checkpoint().await?;
        let timestamp = self
            .archive
            .find_earliest_snapshot(url)
            .await?
            .ok_or_else(|| Error::Other("no archived snapshot".to_string()))?;

        let snapshot = self.archive.snapshot_url(url, &timestamp);
        tracing::info!(url, snapshot = %snapshot, "Trying archived copy");

        control.checkpoint().await?;
        http::fetch_to_dir(&self.client, &snapshot, dir, direct_attempts + 1, control).await
    }
}
