//! Configuration types for batch-uploader
//!
//! One immutable [`Config`] value is built by the embedder and handed to
//! [`crate::BatchUploader`], which shares it (`Arc`) with every component.

use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, time::Duration};

/// Main configuration for BatchUploader
///
/// Fields are organized into sub-configs:
/// - [`upload`](UploadConfig): concurrency, publish retries, naming policy
/// - [`acquire`](AcquireConfig): downloads, archive fallback, video extraction
/// - [`transcode`](TranscodeConfig): encoder invocation
/// - [`network`](NetworkConfig): reachability probing
/// - [`api`](ApiConfig): HTTP control surface
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Repository account used for the run
    #[serde(default)]
    pub credentials: Credentials,

    /// Worker pool and publish behavior
    #[serde(default)]
    pub upload: UploadConfig,

    /// Source acquisition
    #[serde(default)]
    pub acquire: AcquireConfig,

    /// Video conversion
    #[serde(default)]
    pub transcode: TranscodeConfig,

    /// Reachability probing
    #[serde(default)]
    pub network: NetworkConfig,

    /// HTTP control API
    #[serde(default)]
    pub api: ApiConfig,
}

impl Config {
    /// Reject settings that would make a run meaningless
    pub fn validate(&self) -> crate::Result<()> {
        if self.upload.parallelism == 0 {
            return Err(crate::Error::config(
                "upload.parallelism",
                "must be at least 1",
            ));
        }
        if self.upload.max_attempts == 0 {
            return Err(crate::Error::config(
                "upload.max_attempts",
                "must be at least 1",
            ));
        }
        if self.upload.allowed_extensions.is_empty() {
            return Err(crate::Error::config(
                "upload.allowed_extensions",
                "allow-list is empty",
            ));
        }
        if self.acquire.download_attempts == 0 {
            return Err(crate::Error::config(
                "acquire.download_attempts",
                "must be at least 1",
            ));
        }
        if self.acquire.format_selectors.is_empty() {
            return Err(crate::Error::config(
                "acquire.format_selectors",
                "at least one selector is required",
            ));
        }
        if self.acquire.credential_strategies.is_empty() {
            return Err(crate::Error::config(
                "acquire.credential_strategies",
                "at least one strategy is required",
            ));
        }
        if self.transcode.attempts == 0 {
            return Err(crate::Error::config(
                "transcode.attempts",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Repository credentials
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    /// Account name
    #[serde(default)]
    pub username: String,

    /// Account password (never logged)
    #[serde(default)]
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Worker pool and publish configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Number of rows processed concurrently (default: 1)
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,

    /// Publish attempts per row (default: 10)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Pause between publish attempts (default: 10 seconds)
    #[serde(default = "default_retry_pause", with = "duration_serde")]
    pub retry_pause: Duration,

    /// Stretch each publish pause by a random 0-100% (default: false)
    #[serde(default)]
    pub retry_jitter: bool,

    /// Ask the repository to accept the file despite warnings (default: true)
    #[serde(default = "default_true")]
    pub ignore_warnings: bool,

    /// Edit summary sent with each publish
    #[serde(default = "default_comment")]
    pub comment: String,

    /// Marker appended to every description; stripped again during verification
    #[serde(default = "default_category_marker")]
    pub category_marker: String,

    /// Extensions the repository accepts (lowercase, no dot)
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,

    /// How long in-flight rows may keep running after stop (default: 10 seconds)
    #[serde(default = "default_shutdown_grace", with = "duration_serde")]
    pub shutdown_grace: Duration,
}

impl UploadConfig {
    /// Attempt bound and pause for publishing
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.max_attempts, self.retry_pause).with_jitter(self.retry_jitter)
    }

    /// Whether `ext` (with or without a leading dot, any case) is on the allow-list
    pub fn is_allowed(&self, ext: &str) -> bool {
        let ext = ext.trim_start_matches('.');
        self.allowed_extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(ext))
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            max_attempts: default_max_attempts(),
            retry_pause: default_retry_pause(),
            retry_jitter: false,
            ignore_warnings: true,
            comment: default_comment(),
            category_marker: default_category_marker(),
            allowed_extensions: default_allowed_extensions(),
            shutdown_grace: default_shutdown_grace(),
        }
    }
}

/// Credential source handed to the video extractor
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStrategy {
    /// No cookies
    Anonymous,
    /// Cookies read from a locally installed browser profile
    BrowserCookies(String),
}

impl std::fmt::Display for CredentialStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialStrategy::Anonymous => write!(f, "anonymous"),
            CredentialStrategy::BrowserCookies(browser) => write!(f, "cookies from {}", browser),
        }
    }
}

/// Source acquisition configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AcquireConfig {
    /// Scratch directory for downloads and conversions
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Direct download attempts before the archive fallback (default: 3)
    #[serde(default = "default_download_attempts")]
    pub download_attempts: u32,

    /// Pause between direct download attempts (default: 5 seconds)
    #[serde(default = "default_download_pause", with = "duration_serde")]
    pub download_pause: Duration,

    /// Per-request timeout for downloads (default: 120 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// User-Agent sent with downloads and archive queries
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Query the web archive when direct downloads are exhausted (default: true)
    #[serde(default = "default_true")]
    pub use_archive: bool,

    /// Base URL of the archive (default: "https://web.archive.org")
    #[serde(default = "default_archive_base_url")]
    pub archive_base_url: String,

    /// Hosts routed to the video extractor instead of a plain download
    #[serde(default = "default_video_hosts")]
    pub video_hosts: Vec<String>,

    /// Format selectors tried in order within each credential strategy
    #[serde(default = "default_format_selectors")]
    pub format_selectors: Vec<String>,

    /// Credential strategies tried in order
    #[serde(default = "default_credential_strategies")]
    pub credential_strategies: Vec<CredentialStrategy>,

    /// Attempts per credential strategy; the selector advances on each failure (default: 5)
    #[serde(default = "default_attempts_per_strategy")]
    pub attempts_per_strategy: u32,

    /// Path to yt-dlp executable (auto-detected if None)
    #[serde(default)]
    pub yt_dlp_path: Option<PathBuf>,
}

impl AcquireConfig {
    /// Whether `host` (or one of its parents) is a configured video platform
    pub fn is_video_host(&self, host: &str) -> bool {
        let host = host.trim_start_matches("www.").to_ascii_lowercase();
        self.video_hosts.iter().any(|known| {
            let known = known.to_ascii_lowercase();
            host == known || host.ends_with(&format!(".{}", known))
        })
    }
}

impl Default for AcquireConfig {
    fn default() -> Self {
        Self {
            temp_dir: default_temp_dir(),
            download_attempts: default_download_attempts(),
            download_pause: default_download_pause(),
            request_timeout: default_request_timeout(),
            user_agent: default_user_agent(),
            use_archive: true,
            archive_base_url: default_archive_base_url(),
            video_hosts: default_video_hosts(),
            format_selectors: default_format_selectors(),
            credential_strategies: default_credential_strategies(),
            attempts_per_strategy: default_attempts_per_strategy(),
            yt_dlp_path: None,
        }
    }
}

/// Video conversion configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TranscodeConfig {
    /// Path to ffmpeg executable (auto-detected if None)
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Video codec for the accepted container (default: "libvpx-vp9")
    #[serde(default = "default_video_codec")]
    pub video_codec: String,

    /// Preferred audio codec (default: "libopus")
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    /// Audio codec used when the preferred one is unavailable (default: "libvorbis")
    #[serde(default = "default_fallback_audio_codec")]
    pub fallback_audio_codec: String,

    /// Whole-conversion attempts (default: 3)
    #[serde(default = "default_transcode_attempts")]
    pub attempts: u32,

    /// Pause between conversion attempts (default: 2 seconds)
    #[serde(default = "default_transcode_pause", with = "duration_serde")]
    pub pause: Duration,

    /// Source extensions converted instead of rejected
    #[serde(default = "default_transcodable_extensions")]
    pub transcodable_extensions: Vec<String>,
}

impl TranscodeConfig {
    /// Whether files with this extension are converted rather than skipped
    pub fn is_transcodable(&self, ext: &str) -> bool {
        let ext = ext.trim_start_matches('.');
        self.transcodable_extensions
            .iter()
            .any(|known| known.eq_ignore_ascii_case(ext))
    }
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            video_codec: default_video_codec(),
            audio_codec: default_audio_codec(),
            fallback_audio_codec: default_fallback_audio_codec(),
            attempts: default_transcode_attempts(),
            pause: default_transcode_pause(),
            transcodable_extensions: default_transcodable_extensions(),
        }
    }
}

/// Reachability probing configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Endpoints probed with GET; any 2xx means reachable
    #[serde(default = "default_probe_endpoints")]
    pub probe_endpoints: Vec<String>,

    /// Timeout for each probe request (default: 5 seconds)
    #[serde(default = "default_probe_timeout", with = "duration_serde")]
    pub probe_timeout: Duration,

    /// Host resolved when every endpoint fails (default: "google.com")
    #[serde(default = "default_dns_host")]
    pub dns_host: String,

    /// Wait between probes while the network is down (default: 10 seconds)
    #[serde(default = "default_poll_interval", with = "duration_serde")]
    pub poll_interval: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            probe_endpoints: default_probe_endpoints(),
            probe_timeout: default_probe_timeout(),
            dns_host: default_dns_host(),
            poll_interval: default_poll_interval(),
        }
    }
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:6790)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Optional API key for authentication
    #[serde(default)]
    pub api_key: Option<String>,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            api_key: None,
            cors_enabled: true,
            cors_origins: default_cors_origins(),
        }
    }
}

fn default_parallelism() -> usize {
    1
}

fn default_max_attempts() -> u32 {
    10
}

fn default_retry_pause() -> Duration {
    Duration::from_secs(10)
}

fn default_true() -> bool {
    true
}

fn default_comment() -> String {
    "Uploaded with batch-uploader".to_string()
}

fn default_category_marker() -> String {
    "[[Category:Uploaded with batch-uploader]]".to_string()
}

fn default_allowed_extensions() -> Vec<String> {
    [
        "png", "gif", "jpg", "jpeg", "webp", "tif", "tiff", "xcf", "svg", "djvu", "pdf", "mid",
        "midi", "ogg", "ogv", "oga", "opus", "flac", "wav", "mp3", "webm", "stl",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_shutdown_grace() -> Duration {
    Duration::from_secs(10)
}

fn default_temp_dir() -> PathBuf {
    std::env::temp_dir().join("batch-uploader")
}

fn default_download_attempts() -> u32 {
    3
}

fn default_download_pause() -> Duration {
    Duration::from_secs(5)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_user_agent() -> String {
    concat!("batch-uploader/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_archive_base_url() -> String {
    "https://web.archive.org".to_string()
}

fn default_video_hosts() -> Vec<String> {
    [
        "youtube.com",
        "youtu.be",
        "vimeo.com",
        "dailymotion.com",
        "tiktok.com",
        "twitter.com",
        "x.com",
        "facebook.com",
        "instagram.com",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

// Progressive (muxed) formats first so no external muxer is needed
fn default_format_selectors() -> Vec<String> {
    [
        "best[ext=mp4][vcodec!=none][acodec!=none][protocol=https]",
        "best[ext=mp4][vcodec!=none][acodec!=none][protocol=http]",
        "best[protocol=https]",
        "best[protocol=http]",
        "best",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_credential_strategies() -> Vec<CredentialStrategy> {
    vec![
        CredentialStrategy::Anonymous,
        CredentialStrategy::BrowserCookies("chrome".to_string()),
        CredentialStrategy::BrowserCookies("firefox".to_string()),
        CredentialStrategy::BrowserCookies("edge".to_string()),
        CredentialStrategy::BrowserCookies("brave".to_string()),
    ]
}

fn default_attempts_per_strategy() -> u32 {
    5
}

fn default_video_codec() -> String {
    "libvpx-vp9".to_string()
}

fn default_audio_codec() -> String {
    "libopus".to_string()
}

fn default_fallback_audio_codec() -> String {
    "libvorbis".to_string()
}

fn default_transcode_attempts() -> u32 {
    3
}

fn default_transcode_pause() -> Duration {
    Duration::from_secs(2)
}

fn default_transcodable_extensions() -> Vec<String> {
    ["mp4", "m4v", "mov", "mkv", "avi", "flv", "wmv", "mpg", "mpeg", "3gp"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_probe_endpoints() -> Vec<String> {
    [
        "https://www.google.com",
        "https://commons.wikimedia.org",
        "https://www.cloudflare.com",
        "https://8.8.8.8",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_dns_host() -> String {
    "google.com".to_string()
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 6790))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

// Durations are written as (fractional) seconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(serde::de::Error::custom(
                "duration must be a non-negative number of seconds",
            ));
        }
        Ok(Duration::from_secs_f64(secs))
    }
}
