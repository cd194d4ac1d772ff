//! # batch-uploader
//!
//! Batch ingestion of media into a remote content repository.
//!
//! Each row of an input table (CSV, TSV, spreadsheet or JSON) names a source
//! (local path, direct URL or video page), a target name and a description.
//! A run takes every row through the same pipeline:
//!
//! 1. **Acquire** the file (local copy, HTTP download with archive fallback,
//!    or video extraction)
//! 2. **Classify** it by content signature, falling back to the extension
//! 3. **Transcode** video containers the repository does not accept into WebM
//! 4. **Resolve** a free name in the repository (`Name (1).png`, ...)
//! 5. **Publish** it, waiting out network outages and retrying failures
//! 6. **Verify** the stored file against the local one
//!
//! Rows run on a bounded worker pool that can be paused, resumed and stopped.
//! Results are written next to the input when the run ends, and progress is
//! published as [`Event`]s and through the optional [`api`] server.
//!
//! ## Quick Start
//!
//! ```no_run
//! use batch_uploader::{BatchUploader, Config, InMemoryRepository};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.credentials.username = "uploader-bot".to_string();
//!
//!     let uploader = BatchUploader::new(config, Arc::new(InMemoryRepository::new()))?;
//!
//!     let mut events = uploader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     uploader.start("rows.csv", None).await?;
//!     if let Some(summary) = uploader.wait().await {
//!         println!("{} of {} uploaded", summary.succeeded, summary.total);
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Fetching sources into local scratch files
pub mod acquire;
/// REST control API
pub mod api;
/// Content-based file type detection
pub mod classify;
/// Configuration types
pub mod config;
/// Pause, resume and cancellation shared by a run's workers
pub mod control;
/// Error types
pub mod error;
/// Collision-free target names
pub mod naming;
/// Reachability probing and the outage gate
pub mod network;
/// Publishing with retries
pub mod publish;
/// Remote repository collaborator
pub mod repository;
/// Retry logic
pub mod retry;
/// Input tables and result output
pub mod rows;
/// Video transcoding to WebM
pub mod transcode;
/// Core types and events
pub mod types;
/// The run orchestrator
pub mod uploader;
/// Utility functions
pub mod utils;
/// Post-publish verification
pub mod verify;

pub use config::{
    AcquireConfig, ApiConfig, Config, Credentials, NetworkConfig, TranscodeConfig, UploadConfig,
};
pub use error::{
    ApiError, DownloadError, Error, ErrorDetail, ExtractionError, Result, ToHttpStatus,
};
pub use network::{ConnectionReport, ReachabilityProbe};
pub use repository::{InMemoryRepository, PublishRequest, RemoteFileHandle, Repository, Session};
pub use types::{Event, Progress, Row, RunState, RunSummary, TaskResult, TaskStatus, Verification};
pub use uploader::BatchUploader;

/// Run until a termination signal arrives, then stop the current run and
/// wait for it to wind down.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// Returns the summary of the run that was active, if any.
///
/// # Example
///
/// ```no_run
/// use batch_uploader::{BatchUploader, Config, InMemoryRepository, run_until_signal};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let uploader = BatchUploader::new(Config::default(), Arc::new(InMemoryRepository::new()))?;
///     uploader.start("rows.csv", None).await?;
///
///     run_until_signal(&uploader).await?;
///     Ok(())
/// }
/// ```
pub async fn run_until_signal(uploader: &BatchUploader) -> Result<Option<RunSummary>> {
    wait_for_signal().await;
    match uploader.stop().await {
        Ok(()) | Err(Error::InvalidState { .. }) => {}
        Err(e) => return Err(e),
    }
    Ok(uploader.wait().await)
}

/// Resolves on SIGTERM or SIGINT; degrades to whichever handler could be
/// registered, and to `ctrl_c` when neither could.
#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())
        .inspect_err(|e| tracing::warn!(error = %e, "SIGTERM handler unavailable"))
        .ok();
    let mut interrupt = signal(SignalKind::interrupt())
        .inspect_err(|e| tracing::warn!(error = %e, "SIGINT handler unavailable"))
        .ok();

    match (terminate.as_mut(), interrupt.as_mut()) {
        (Some(term), Some(int)) => {
            tokio::select! {
                _ = term.recv() => tracing::info!(signal = "SIGTERM", "Stop signal received"),
                _ = int.recv() => tracing::info!(signal = "SIGINT", "Stop signal received"),
            }
        }
        (Some(term), None) => {
            term.recv().await;
            tracing::info!(signal = "SIGTERM", "Stop signal received");
        }
        (None, Some(int)) => {
            int.recv().await;
            tracing::info!(signal = "SIGINT", "Stop signal received");
        }
        (None, None) => {
            tracing::error!("No signal handler could be registered, falling back to ctrl_c");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!(signal = "ctrl_c", "Stop signal received"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C"),
    }
}
