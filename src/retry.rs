//! Bounded retry with cooperative pause/stop checkpoints
//!
//! Every attempt is preceded by [`RunControl::checkpoint`], so a paused run
//! holds before the next attempt (without consuming it) and a stopped run
//! returns [`Error::Cancelled`] immediately. Pauses between attempts are
//! cancellable sleeps.
//!
//! # Example
//!
//! ```no_run
//! use batch_uploader::control::RunControl;
//! use batch_uploader::retry::{RetryPolicy, with_retry};
//! use std::time::Duration;
//!
//! # async fn example() -> batch_uploader::Result<()> {
//! let control = RunControl::new();
//! let policy = RetryPolicy::fixed(3, Duration::from_secs(2));
//! let value = with_retry(&policy, &control, "fetch", |attempt| async move {
//!     // Your operation here
//!     Ok::<_, batch_uploader::Error>(attempt)
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::control::RunControl;
use crate::error::{DownloadError, Error, ExtractionError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (network timeouts, server busy, encoder hiccups) return `true`.
/// Permanent failures (missing file, client error, user stop) return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            // Anything except a malformed request can succeed on a later try
            Error::Network(e) => !e.is_builder(),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::UnexpectedEof
            ),
            Error::Download(DownloadError::Status { status, .. }) => {
                *status >= 500 || *status == 408 || *status == 429
            }
            Error::Download(DownloadError::Empty { .. }) => true,
            Error::Download(DownloadError::Exhausted { .. }) => false,
            Error::Extraction(e) => match e {
                ExtractionError::Attempt { bot_check, .. } => !bot_check,
                ExtractionError::NoOutput => true,
                ExtractionError::Exhausted { .. } => false,
            },
            Error::Transcode(_) => true,
            Error::NetworkUnavailable => true,
            Error::Publish(_) | Error::PublishRejected(_) => true,
            Error::ExternalTool(msg) => {
                msg.contains("timeout") || msg.contains("busy") || msg.contains("temporary")
            }
            Error::Cancelled => false,
            Error::Config { .. }
            | Error::NotFound(_)
            | Error::UnsupportedFormat(_)
            | Error::InvalidName(_)
            | Error::Auth(_)
            | Error::InvalidInput(_)
            | Error::NoValidRows
            | Error::InvalidState { .. }
            | Error::Serialization(_)
            | Error::Csv(_)
            | Error::Spreadsheet(_)
            | Error::SpreadsheetWrite(_)
            | Error::ApiServerError(_)
            | Error::Other(_) => false,
        }
    }
}

/// Attempt bound and pause for one retry loop
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first (at least 1)
    pub max_attempts: u32,
    /// Pause between attempts
    pub pause: Duration,
    /// Stretch each pause by a random 0–100%
    pub jitter: bool,
}

impl RetryPolicy {
    /// Fixed pause, no jitter
    pub fn fixed(max_attempts: u32, pause: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            pause,
            jitter: false,
        }
    }

    /// Same policy with jitter switched on or off
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Pause to wait before the next attempt
    pub fn delay(&self) -> Duration {
        if self.jitter {
            add_jitter(self.pause)
        } else {
            self.pause
        }
    }
}

/// Run `operation` until it succeeds, fails permanently, or attempts run out
///
/// `operation` receives the 1-based attempt number. Returns the last error
/// when attempts are exhausted, or [`Error::Cancelled`] when the run stops.
pub async fn with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    control: &RunControl,
    label: &str,
    mut operation: F,
) -> Result<T, Error>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        control.checkpoint().await?;
        attempt += 1;

        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(label, attempts = attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = policy.delay();
                tracing::warn!(
                    label,
                    error = %e,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Operation failed, retrying"
                );
                control.sleep(delay).await?;
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::warn!(
                        label,
                        error = %e,
                        attempts = attempt,
                        "Operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::debug!(label, error = %e, "Operation failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// The actual delay will be between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
