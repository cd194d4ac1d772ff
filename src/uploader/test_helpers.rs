//! Shared helpers for building a BatchUploader against in-process collaborators.

use crate::acquire::ArchiveIndex;
use crate::config::Config;
use crate::error::Result;
use crate::network::{ConnectionReport, ReachabilityProbe};
use crate::repository::InMemoryRepository;
use crate::transcode::{EncodeFailure, EncodeJob, VideoEncoder};
use crate::uploader::BatchUploader;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

/// Probe whose answer tests can flip
pub(crate) struct SwitchProbe {
    up: AtomicBool,
    calls: AtomicUsize,
}

impl SwitchProbe {
    pub(crate) fn new(up: bool) -> Self {
        Self {
            up: AtomicBool::new(up),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn set(&self, up: bool) {
        self.up.store(up, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReachabilityProbe for SwitchProbe {
    async fn probe(&self) -> ConnectionReport {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reachable = self.up.load(Ordering::SeqCst);
        ConnectionReport {
            reachable,
            via: reachable.then(|| "switch".to_string()),
        }
    }
}

/// Archive with no captures
pub(crate) struct EmptyArchive;

#[async_trait]
impl ArchiveIndex for EmptyArchive {
    async fn find_earliest_snapshot(&self, _url: &str) -> Result<Option<String>> {
        Ok(None)
    }

    fn snapshot_url(&self, url: &str, timestamp: &str) -> String {
        format!("archive://{}/{}", timestamp, url)
    }
}

/// Encoder that writes a small WebM file and records its jobs
#[derive(Default)]
pub(crate) struct FakeEncoder {
    pub(crate) jobs: std::sync::Mutex<Vec<EncodeJob>>,
}

#[async_trait]
impl VideoEncoder for FakeEncoder {
    async fn encode(&self, job: &EncodeJob) -> std::result::Result<(), EncodeFailure> {
        self.jobs.lock().unwrap().push(job.clone());
        tokio::fs::write(&job.output, b"\x1a\x45\xdf\xa3\x9f\x42\x86\x81\x01webm")
            .await
            .map_err(|e| EncodeFailure {
                message: e.to_string(),
                audio_codec_unsupported: false,
            })
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Config with short pauses and scratch space under `dir`
pub(crate) fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.credentials.username = "bot".to_string();
    config.upload.parallelism = 2;
    config.upload.max_attempts = 3;
    config.upload.retry_pause = Duration::from_millis(10);
    config.upload.shutdown_grace = Duration::from_millis(200);
    config.acquire.temp_dir = dir.join("temp");
    config.acquire.download_attempts = 1;
    config.acquire.download_pause = Duration::from_millis(5);
    config.acquire.use_archive = false;
    config.network.poll_interval = Duration::from_millis(10);
    config
}

/// Everything a scenario needs; keep `dir` alive for the test's duration
pub(crate) struct Harness {
    pub(crate) dir: TempDir,
    pub(crate) uploader: BatchUploader,
    pub(crate) repo: Arc<InMemoryRepository>,
    pub(crate) probe: Arc<SwitchProbe>,
    pub(crate) encoder: Arc<FakeEncoder>,
}

impl Harness {
    pub(crate) fn new(repo: InMemoryRepository) -> Self {
        Self::with_config(repo, test_config)
    }

    pub(crate) fn with_config(repo: InMemoryRepository, configure: impl FnOnce(&Path) -> Config) -> Self {
        let dir = TempDir::new().unwrap();
        let config = configure(dir.path());
        let repo = Arc::new(repo);
        let probe = Arc::new(SwitchProbe::new(true));
        let encoder = Arc::new(FakeEncoder::default());

        let uploader = BatchUploader::new(config, repo.clone())
            .unwrap()
            .with_probe(probe.clone())
            .with_archive(Arc::new(EmptyArchive))
            .with_extractor(None)
            .with_encoder(Some(encoder.clone()));

        Self {
            dir,
            uploader,
            repo,
            probe,
            encoder,
        }
    }

    /// Write a file into the scratch dir
    pub(crate) fn file(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    /// Write a headerless CSV of (source, target, description) rows
    pub(crate) fn input(&self, rows: &[(&str, &str, &str)]) -> PathBuf {
        let path = self.dir.path().join("rows.csv");
        let mut writer = csv::Writer::from_path(&path).unwrap();
        for (source, target, description) in rows {
            writer.write_record([source, target, description]).unwrap();
        }
        writer.flush().unwrap();
        path
    }

    pub(crate) fn output(&self) -> PathBuf {
        self.dir.path().join("results.csv")
    }
}

/// Smallest PNG the classifier recognises
pub(crate) const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x01\0\0\0\x01\x08\x02\0\0\0";

/// An ISO base media header, classified as mp4
pub(crate) const MP4: &[u8] = b"\0\0\0\x20ftypisom\0\0\x02\0isomiso2avc1mp41";
