//! Batch orchestrator split into focused submodules.
//!
//! The `BatchUploader` struct and its methods are organized by concern:
//! - [`run`] - Starting a run, dispatching rows and draining results
//! - [`control`] - Pause, resume, stop, reset and snapshots
//! - [`pipeline`] - The per-row acquire/classify/transcode/name/publish/verify chain
//! - [`progress`] - Counters and ETA

mod control;
mod pipeline;
mod progress;
mod run;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

use crate::acquire::{ArchiveIndex, VideoExtractor, WaybackArchive, YtDlpExtractor};
use crate::config::Config;
use crate::control::RunControl;
use crate::error::Result;
use crate::network::{HttpReachability, ReachabilityProbe};
use crate::repository::Repository;
use crate::transcode::{FfmpegEncoder, VideoEncoder};
use crate::types::{Event, Progress, RunSummary, TaskResult};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock, broadcast, watch};

/// External services a run talks to
#[derive(Clone)]
pub(crate) struct Collaborators {
    pub(crate) repository: Arc<dyn Repository>,
    pub(crate) probe: Arc<dyn ReachabilityProbe>,
    pub(crate) archive: Arc<dyn ArchiveIndex>,
    pub(crate) extractor: Option<Arc<dyn VideoExtractor>>,
    pub(crate) encoder: Option<Arc<dyn VideoEncoder>>,
}

/// Handle on the run in progress (or the last finished one)
pub(crate) struct ActiveRun {
    pub(crate) control: RunControl,
    pub(crate) started: Instant,
    pub(crate) finished: watch::Receiver<Option<RunSummary>>,
}

/// Main uploader instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct BatchUploader {
    /// Configuration, fixed for the lifetime of the uploader
    pub(crate) config: Arc<Config>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    pub(crate) services: Collaborators,
    /// Progress snapshot; counters written by the supervisor, state by control commands
    pub(crate) progress_tx: Arc<watch::Sender<Progress>>,
    /// Results of the current or last run, in completion order
    pub(crate) results: Arc<RwLock<Vec<TaskResult>>>,
    pub(crate) run: Arc<Mutex<Option<ActiveRun>>>,
}

impl BatchUploader {
    /// Create an uploader publishing to `repository`
    ///
    /// Reachability is probed over HTTP, missing files are looked up in the
    /// Wayback Machine, and `yt-dlp` / `ffmpeg` are used when found (configured
    /// path first, then `PATH`). Swap any of these with the `with_*` methods.
    ///
    /// # Errors
    ///
    /// Invalid configuration, or an HTTP client that cannot be built.
    pub fn new(config: Config, repository: Arc<dyn Repository>) -> Result<Self> {
        config.validate()?;

        let client = crate::acquire::Acquirer::build_client(&config.acquire)?;
        let probe: Arc<dyn ReachabilityProbe> = Arc::new(HttpReachability::new(&config.network)?);
        let archive: Arc<dyn ArchiveIndex> = Arc::new(WaybackArchive::new(
            client,
            config.acquire.archive_base_url.clone(),
        ));

        let extractor = YtDlpExtractor::from_config(&config.acquire)
            .map(|e| Arc::new(e) as Arc<dyn VideoExtractor>);
        if extractor.is_none() {
            tracing::warn!("yt-dlp not found, video platform sources will fail");
        }
        let encoder = FfmpegEncoder::from_config(&config.transcode)
            .map(|e| Arc::new(e) as Arc<dyn VideoEncoder>);
        if encoder.is_none() {
            tracing::warn!("ffmpeg not found, videos needing conversion will fail");
        }

        // Buffer of 1000 events so slow subscribers rarely lag
        let (event_tx, _rx) = broadcast::channel(1000);
        let (progress_tx, _rx) = watch::channel(Progress::default());

        Ok(Self {
            config: Arc::new(config),
            event_tx,
            services: Collaborators {
                repository,
                probe,
                archive,
                extractor,
                encoder,
            },
            progress_tx: Arc::new(progress_tx),
            results: Arc::new(RwLock::new(Vec::new())),
            run: Arc::new(Mutex::new(None)),
        })
    }

    /// Replace the reachability probe
    pub fn with_probe(mut self, probe: Arc<dyn ReachabilityProbe>) -> Self {
        self.services.probe = probe;
        self
    }

    /// Replace the web archive index
    pub fn with_archive(mut self, archive: Arc<dyn ArchiveIndex>) -> Self {
        self.services.archive = archive;
        self
    }

    /// Replace (or remove) the video extractor
    pub fn with_extractor(mut self, extractor: Option<Arc<dyn VideoExtractor>>) -> Self {
        self.services.extractor = extractor;
        self
    }

    /// Replace (or remove) the video encoder
    pub fn with_encoder(mut self, encoder: Option<Arc<dyn VideoEncoder>>) -> Self {
        self.services.encoder = encoder;
        self
    }

    /// The configuration this uploader was built with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Subscribe to run events
    ///
    /// Every subscriber receives every event sent after it subscribed.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    pub(crate) fn emit(&self, event: Event) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }
}
