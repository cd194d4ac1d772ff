//! Video-platform extraction with credential and format fallback
//!
//! Each credential strategy gets `attempts_per_strategy` tries; every failed
//! try advances to the next format selector. A bot-check answer ends the
//! current strategy at once because repeating it with the same credentials
//! only repeats the challenge.

use crate::config::{AcquireConfig, CredentialStrategy};
use crate::control::RunControl;
use crate::error::{Error, ExtractionError, Result};
use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;
use tokio::process::Command;

#[allow(clippy::expect_used)] // literal pattern
static BOT_CHECK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)sign in to confirm|not a bot|captcha|HTTP Error 429|too many requests")
        .expect("bot-check pattern is valid")
});

/// Whether extractor diagnostics indicate a bot challenge
pub fn is_bot_check(message: &str) -> bool {
    BOT_CHECK.is_match(message)
}

/// Downloads media from video platforms
#[async_trait]
pub trait VideoExtractor: Send + Sync {
    /// Download `url` into `dest_dir` using one format selector and credential strategy
    async fn extract(
        &self,
        url: &str,
        format_selector: &str,
        strategy: &CredentialStrategy,
        dest_dir: &Path,
    ) -> std::result::Result<PathBuf, ExtractionError>;

    /// Short extractor name for logs
    fn name(&self) -> &'static str;
}

/// `yt-dlp` command-line extractor
pub struct YtDlpExtractor {
    binary_path: PathBuf,
}

impl YtDlpExtractor {
    /// Use an explicit binary
    pub fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }

    /// Find `yt-dlp` in PATH
    pub fn from_path() -> Option<Self> {
        which::which("yt-dlp").ok().map(Self::new)
    }

    /// Explicit path from configuration, else PATH lookup
    pub fn from_config(config: &AcquireConfig) -> Option<Self> {
        match &config.yt_dlp_path {
            Some(path) => Some(Self::new(path.clone())),
            None => Self::from_path(),
        }
    }

    fn args(
        url: &str,
        format_selector: &str,
        strategy: &CredentialStrategy,
        dest_dir: &Path,
    ) -> Vec<String> {
        let mut args = vec![
            "--no-playlist".to_string(),
            "--no-progress".to_string(),
            "--restrict-filenames".to_string(),
            "-f".to_string(),
            format_selector.to_string(),
            "-o".to_string(),
            dest_dir.join("video.%(ext)s").to_string_lossy().into_owned(),
        ];
        if let CredentialStrategy::BrowserCookies(browser) = strategy {
            args.push("--cookies-from-browser".to_string());
            args.push(browser.clone());
        }
        args.push("--".to_string());
        args.push(url.to_string());
        args
    }
}

#[async_trait]
impl VideoExtractor for YtDlpExtractor {
    async fn extract(
        &self,
        url: &str,
        format_selector: &str,
        strategy: &CredentialStrategy,
        dest_dir: &Path,
    ) -> std::result::Result<PathBuf, ExtractionError> {
        let output = Command::new(&self.binary_path)
            .args(Self::args(url, format_selector, strategy, dest_dir))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ExtractionError::Attempt {
                message: format!("failed to execute yt-dlp: {}", e),
                bot_check: false,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::debug!(url, stderr = %stderr, "yt-dlp failed");
            let message = stderr
                .lines()
                .rev()
                .find(|line| !line.trim().is_empty())
                .unwrap_or("yt-dlp exited with an error")
                .to_string();
            return Err(ExtractionError::Attempt {
                bot_check: is_bot_check(&stderr),
                message,
            });
        }

        find_output(dest_dir).await.ok_or(ExtractionError::NoOutput)
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}

/// First complete, non-empty file in `dir`
async fn find_output(dir: &Path) -> Option<PathBuf> {
    let mut entries = tokio::fs::read_dir(dir).await.ok()?;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let partial = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| matches!(e, "part" | "ytdl" | "temp"));
        if partial {
            continue;
        }
        if let Ok(meta) = entry.metadata().await
            && meta.is_file()
            && meta.len() > 0
        {
            return Some(path);
        }
    }
    None
}

/// Walk strategies and selectors until one attempt yields a file
pub(crate) async fn extract_with_fallback(
    extractor: &dyn VideoExtractor,
    config: &AcquireConfig,
    url: &str,
    dest_dir: &Path,
    control: &RunControl,
) -> Result<PathBuf> {
    let selectors = &config.format_selectors;
    let mut total_attempts = 0u32;
    let mut last_error = String::from("no extraction attempted");

    for strategy in &config.credential_strategies {
        for attempt in 0..config.attempts_per_strategy.max(1) {
            control.checkpoint().await?;
            total_attempts += 1;

            let selector_index = (attempt as usize).min(selectors.len().saturating_sub(1));
            let Some(selector) = selectors.get(selector_index) else {
                break;
            };

            // Fresh directory so leftovers of a failed attempt are never picked up
            let attempt_dir = dest_dir.join(format!("attempt-{}", total_attempts));
            tokio::fs::create_dir_all(&attempt_dir).await?;

            tracing::debug!(
                url,
                extractor = extractor.name(),
                strategy = %strategy,
                selector = %selector,
                attempt = attempt + 1,
                "Extracting video"
            );

            match extractor
                .extract(url, selector, strategy, &attempt_dir)
                .await
            {
                Ok(path) => {
                    tracing::info!(url, strategy = %strategy, selector = %selector, "Video extracted");
                    return Ok(path);
                }
                Err(e) => {
                    let _ = tokio::fs::remove_dir_all(&attempt_dir).await;
                    last_error = e.to_string();
                    if e.is_bot_check() {
                        tracing::warn!(url, strategy = %strategy, "Bot check requested, trying next strategy");
                        break;
                    }
                    tracing::debug!(url, strategy = %strategy, error = %e, "Extraction attempt failed");
                }
            }
        }
    }

    Err(Error::Extraction(ExtractionError::Exhausted {
        url: url.to_string(),
        attempts: total_attempts,
        last_error,
    }))
}
