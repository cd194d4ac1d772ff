//! Per-row pipeline: acquire → classify → transcode if needed → name → publish → verify.

use crate::acquire::Acquirer;
use crate::classify::FormatClassifier;
use crate::config::{AcquireConfig, TranscodeConfig, UploadConfig};
use crate::control::RunControl;
use crate::error::{Error, Result};
use crate::naming::NameResolver;
use crate::publish::Publisher;
use crate::repository::{PublishRequest, Repository, Session};
use crate::transcode::{OUTPUT_EXTENSION, Transcoder};
use crate::types::{Event, Row, TaskResult, TaskStatus, Verification};
use crate::verify::Verifier;
use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::broadcast;

/// Error text for a row whose worker died without producing a result
pub(crate) const ABORTED: &str = "pipeline aborted unexpectedly";

/// Everything one row needs, shared by all workers of a run
pub(crate) struct Pipeline {
    pub(crate) acquirer: Acquirer,
    pub(crate) classifier: FormatClassifier,
    pub(crate) transcoder: Option<Transcoder>,
    pub(crate) resolver: NameResolver,
    pub(crate) publisher: Publisher,
    pub(crate) verifier: Verifier,
    pub(crate) repository: Arc<dyn Repository>,
    pub(crate) session: Session,
    pub(crate) upload: Arc<UploadConfig>,
    pub(crate) acquire: Arc<AcquireConfig>,
    pub(crate) transcode: Arc<TranscodeConfig>,
    pub(crate) control: RunControl,
    pub(crate) events: broadcast::Sender<Event>,
}

/// Fields filled in as the row advances, reported even when a later stage fails
#[derive(Default)]
struct Trace {
    resolved_path: Option<PathBuf>,
    target: Option<String>,
}

impl Pipeline {
    /// Run one row to a result; never fails
    pub(crate) async fn run(&self, row: &Row) -> TaskResult {
        let _ = self.events.send(Event::RowStarted {
            row: row.number(),
            target: row.target.clone(),
        });

        let mut trace = Trace::default();
        let outcome = self.process(row, &mut trace).await;

        let mut result = TaskResult {
            row: row.number(),
            source: row.source.clone(),
            resolved_path: trace.resolved_path,
            target: trace.target.unwrap_or_else(|| row.target.clone()),
            status: TaskStatus::Success,
            error: None,
            verification: None,
            timestamp: Local::now(),
        };

        match outcome {
            Ok(verification) => {
                result.verification = Some(verification);
            }
            Err(e) => {
                let row_number = row.number();
                if e.is_skip() {
                    tracing::warn!(row = row_number, source = %row.source, error = %e, "Row skipped");
                    result.status = TaskStatus::Skipped;
                } else if matches!(e, Error::Cancelled) {
                    tracing::info!(row = row_number, "Row stopped");
                    result.status = TaskStatus::Failed;
                } else {
                    tracing::error!(row = row_number, source = %row.source, error = %e, "Row failed");
                    result.status = TaskStatus::Failed;
                }
                result.error = Some(e.to_string());
            }
        }
        result
    }

    async fn process(&self, row: &Row, trace: &mut Trace) -> Result<Verification> {
        let control = &self.control;
        control.checkpoint().await?;

        let acquired = self.acquirer.acquire(row.source.trim(), control).await?;
        trace.resolved_path = Some(acquired.path().to_path_buf());

        let classification = self
            .classifier
            .classify(acquired.path())
            .await?
            .ok_or_else(|| Error::UnsupportedFormat("unrecognized file format".to_string()))?;
        let converted = if self.transcode.is_transcodable(&classification.extension) {
            Some(self.convert(acquired.path()).await?)
        } else {
            None
        };
        // The scratch dir in `converted` lives until publish and verification are done
        let (upload_path, extension) = match &converted {
            Some((_, path)) => (path.clone(), OUTPUT_EXTENSION.to_string()),
            None => (acquired.path().to_path_buf(), classification.extension),
        };
        trace.resolved_path = Some(upload_path.clone());

        if !self.upload.is_allowed(&extension) {
            return Err(Error::UnsupportedFormat(extension));
        }

        control.checkpoint().await?;
        let name = self
            .resolver
            .resolve(&row.target, &extension, self.repository.as_ref())
            .await?;
        trace.target = Some(name.clone());

        let request = PublishRequest {
            name: name.clone(),
            file: upload_path.clone(),
            text: self.publisher.text_for(&row.description),
            comment: self.upload.comment.clone(),
            ignore_warnings: self.upload.ignore_warnings,
        };
        let journaled = TaskResult {
            row: row.number(),
            source: row.source.clone(),
            resolved_path: Some(upload_path.clone()),
            target: name.clone(),
            status: TaskStatus::Success,
            error: None,
            verification: None,
            timestamp: Local::now(),
        };

        let attempts = self
            .publisher
            .publish(&self.session, &request, &journaled, control)
            .await?;

        let verification = self
            .verifier
            .verify(self.repository.as_ref(), &name, &upload_path, &row.description)
            .await;

        tracing::info!(
            row = row.number(),
            name = %name,
            attempts,
            verification = %verification,
            "Row uploaded"
        );
        Ok(verification)
    }

    async fn convert(&self, input: &Path) -> Result<(TempDir, PathBuf)> {
        let transcoder = self.transcoder.as_ref().ok_or_else(|| {
            Error::ExternalTool("no video encoder available (is ffmpeg installed?)".to_string())
        })?;
        let scratch = tempfile::Builder::new()
            .prefix("transcode-")
            .tempdir_in(&self.acquire.temp_dir)?;
        let output = transcoder
            .transcode(input, scratch.path(), &self.control)
            .await?;
        Ok((scratch, output))
    }
}

/// Result for a row whose worker panicked or was aborted
pub(crate) fn aborted(row: &Row) -> TaskResult {
    let mut result = TaskResult::stopped(row);
    result.error = Some(ABORTED.to_string());
    result
}
