//! Starting a run and driving it to completion.
//!
//! A run is one supervisor task plus a dispatcher. The dispatcher waits at the
//! pause gate, takes a slot from a semaphore sized to `parallelism` and spawns
//! one worker per row into a `JoinSet`. Workers send their result over an mpsc
//! channel; the supervisor is its only consumer and the only writer of the
//! counters. Once every sender is gone the supervisor fills in rows that never
//! reported, writes the result file and closes the session.

use super::pipeline::{Pipeline, aborted};
use super::progress::Tally;
use super::{ActiveRun, BatchUploader};
use crate::acquire::Acquirer;
use crate::classify::FormatClassifier;
use crate::config::AcquireConfig;
use crate::control::RunControl;
use crate::error::{Error, Result};
use crate::naming::NameResolver;
use crate::network::NetworkGate;
use crate::publish::Publisher;
use crate::repository::Session;
use crate::rows::{Journal, Table, default_output_path, read_table, write_results};
use crate::transcode::Transcoder;
use crate::types::{Event, Progress, Row, RunState, RunSummary, TaskResult};
use crate::utils::unique_path;
use crate::verify::Verifier;
use futures::FutureExt;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::JoinSet;

impl BatchUploader {
    /// Start uploading the rows of `input`
    ///
    /// Reads the table, logs in and launches the worker pool, then returns;
    /// use [`BatchUploader::wait`] or the event stream to follow the run.
    /// Results go to `output`, or `<input stem>_results.<ext>` next to the
    /// input when `None` (with ` (n)` added if that file exists).
    ///
    /// # Errors
    ///
    /// Nothing is submitted when the uploader is already running, the input
    /// cannot be read, it has no row with both a source and a target, or the
    /// repository refuses the credentials.
    pub async fn start(&self, input: impl AsRef<Path>, output: Option<PathBuf>) -> Result<()> {
        let input = input.as_ref().to_path_buf();
        let mut slot = self.run.lock().await;

        let state = self.state();
        if state.is_active() {
            return Err(Error::InvalidState {
                operation: "start".to_string(),
                state: state.to_string(),
            });
        }

        let table = {
            let input = input.clone();
            tokio::task::spawn_blocking(move || read_table(&input))
                .await
                .map_err(|e| Error::Other(format!("input reader failed: {}", e)))??
        };
        let (rows, dropped) = table.valid_rows();
        for number in &dropped {
            tracing::warn!(row = number, "Dropping row without source or target");
        }
        if rows.is_empty() {
            return Err(Error::NoValidRows);
        }

        let output = match output {
            Some(path) => path,
            None => default_output_path(&input)?,
        };
        let output = unique_path(&output)?;

        tokio::fs::create_dir_all(&self.config.acquire.temp_dir).await?;
        let scratch = tempfile::Builder::new()
            .prefix("run-")
            .tempdir_in(&self.config.acquire.temp_dir)?;
        let journal = Arc::new(Journal::create(Journal::path_for(&output)).await?);

        let session = match self.services.repository.login(&self.config.credentials).await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(error = %e, "Login failed");
                let _ = journal.remove().await;
                return Err(e);
            }
        };

        let control = RunControl::new();
        let pipeline = match self.build_pipeline(&session, scratch.path(), &journal, &control) {
            Ok(pipeline) => Arc::new(pipeline),
            Err(e) => {
                let _ = self.services.repository.logout(&session).await;
                let _ = journal.remove().await;
                return Err(e);
            }
        };

        tracing::info!(
            input = %input.display(),
            output = %output.display(),
            total = rows.len(),
            dropped = dropped.len(),
            parallelism = self.config.upload.parallelism,
            repository = self.services.repository.name(),
            "Run started"
        );

        self.results.write().await.clear();
        let started = Instant::now();
        self.progress_tx.send_replace(Progress {
            state: RunState::Running,
            total: rows.len(),
            ..Default::default()
        });

        let (finished_tx, finished_rx) = watch::channel(None);
        *slot = Some(ActiveRun {
            control: control.clone(),
            started,
            finished: finished_rx,
        });
        self.emit(Event::RunStarted {
            total: rows.len(),
            dropped: dropped.len(),
        });

        let run = Run {
            uploader: self.clone(),
            table,
            rows,
            pipeline,
            session,
            journal,
            scratch,
            output,
            control,
            started,
            finished: finished_tx,
        };
        tokio::spawn(run.execute());
        Ok(())
    }

    fn build_pipeline(
        &self,
        session: &Session,
        scratch: &Path,
        journal: &Arc<Journal>,
        control: &RunControl,
    ) -> Result<Pipeline> {
        let config = &self.config;
        let acquire = Arc::new(AcquireConfig {
            temp_dir: scratch.to_path_buf(),
            ..config.acquire.clone()
        });
        let upload = Arc::new(config.upload.clone());
        let transcode = Arc::new(config.transcode.clone());
        let repository = self.services.repository.clone();

        let gate = Arc::new(NetworkGate::new(
            self.services.probe.clone(),
            config.network.poll_interval,
            self.event_tx.clone(),
        ));
        let strip: Vec<String> = config
            .upload
            .allowed_extensions
            .iter()
            .chain(config.transcode.transcodable_extensions.iter())
            .cloned()
            .collect();

        Ok(Pipeline {
            acquirer: Acquirer::new(
                acquire.clone(),
                Acquirer::build_client(&acquire)?,
                self.services.archive.clone(),
                self.services.extractor.clone(),
            ),
            classifier: FormatClassifier::new(config.upload.allowed_extensions.clone()),
            transcoder: self
                .services
                .encoder
                .clone()
                .map(|encoder| Transcoder::new(transcode.clone(), encoder)),
            resolver: NameResolver::new(strip),
            publisher: Publisher::new(repository.clone(), gate, upload.clone(), Some(journal.clone())),
            verifier: Verifier::new(config.upload.category_marker.clone()),
            repository,
            session: session.clone(),
            upload,
            acquire,
            transcode,
            control: control.clone(),
            events: self.event_tx.clone(),
        })
    }

    pub(crate) fn state(&self) -> RunState {
        self.progress_tx.borrow().state
    }
}

/// Everything the supervisor owns for the lifetime of one run
struct Run {
    uploader: BatchUploader,
    table: Table,
    rows: Vec<Row>,
    pipeline: Arc<Pipeline>,
    session: Session,
    journal: Arc<Journal>,
    scratch: TempDir,
    output: PathBuf,
    control: RunControl,
    started: Instant,
    finished: watch::Sender<Option<RunSummary>>,
}

impl Run {
    async fn execute(self) {
        let upload = &self.uploader.config.upload;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = tokio::spawn(dispatch(
            self.rows.clone(),
            self.pipeline.clone(),
            self.control.clone(),
            tx,
            upload.parallelism,
            upload.shutdown_grace,
        ));

        let mut tally = Tally::new(self.rows.len(), self.started);
        let mut seen = HashSet::new();
        while let Some(result) = rx.recv().await {
            self.record(result, &mut tally, &mut seen).await;
        }
        if let Err(e) = dispatcher.await {
            tracing::error!(error = %e, "Dispatcher task failed");
        }

        // Exactly one result per row: whatever never reported is resolved here
        let stopped = self.control.is_cancelled();
        for row in &self.rows {
            if !seen.contains(&row.number()) {
                let result = if stopped {
                    TaskResult::stopped(row)
                } else {
                    aborted(row)
                };
                self.record(result, &mut tally, &mut seen).await;
            }
        }

        self.finish(tally, stopped).await;
    }

    async fn record(&self, result: TaskResult, tally: &mut Tally, seen: &mut HashSet<usize>) {
        if !seen.insert(result.row) {
            tracing::warn!(row = result.row, "Ignoring second result for row");
            return;
        }

        tally.record(&result);
        self.uploader.results.write().await.push(result.clone());
        self.uploader
            .progress_tx
            .send_modify(|progress| *progress = tally.snapshot(progress.state));
        let progress = self.uploader.progress_tx.borrow().clone();

        tracing::debug!(
            row = result.row,
            status = %result.status,
            processed = progress.processed,
            total = progress.total,
            "Row finished"
        );
        self.uploader.emit(Event::RowFinished { result, progress });
    }

    async fn finish(self, tally: Tally, stopped: bool) {
        let state = if stopped {
            RunState::Stopped
        } else {
            RunState::Completed
        };

        let results = self.uploader.results.read().await.clone();
        let written = {
            let table = self.table;
            let output = self.output.clone();
            tokio::task::spawn_blocking(move || write_results(&table, &results, &output)).await
        };
        let output = match written {
            Ok(Ok(path)) => Some(path),
            Ok(Err(e)) => {
                tracing::error!(output = %self.output.display(), error = %e, "Failed to write results");
                None
            }
            Err(e) => {
                tracing::error!(output = %self.output.display(), error = %e, "Result writer failed");
                None
            }
        };

        if let Err(e) = self.uploader.services.repository.logout(&self.session).await {
            tracing::warn!(error = %e, "Logout failed");
        }

        // Without a result file the journal is the only record of what was published
        if output.is_some()
            && let Err(e) = self.journal.remove().await
        {
            tracing::warn!(path = %self.journal.path().display(), error = %e, "Failed to remove journal");
        }

        // Workers are gone; release what they shared before removing the scratch dir
        drop(self.pipeline);
        if let Err(e) = self.scratch.close() {
            tracing::warn!(error = %e, "Failed to remove scratch directory");
        }

        let summary = RunSummary {
            state,
            total: self.rows.len(),
            succeeded: tally.succeeded(),
            failed: tally.failed(),
            output,
            elapsed: tally.elapsed(),
        };

        {
            // Held so a concurrent pause/resume cannot overwrite the terminal state
            let _slot = self.uploader.run.lock().await;
            self.uploader
                .progress_tx
                .send_modify(|progress| *progress = tally.snapshot(state));
        }

        tracing::info!(
            state = %state,
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            elapsed_secs = summary.elapsed.as_secs_f64(),
            "Run finished"
        );
        self.uploader.emit(Event::RunFinished {
            summary: summary.clone(),
        });
        self.finished.send_replace(Some(summary));
    }
}

/// Spawn one worker per row, bounded by `parallelism`, then wait for them
async fn dispatch(
    rows: Vec<Row>,
    pipeline: Arc<Pipeline>,
    control: RunControl,
    results: mpsc::UnboundedSender<TaskResult>,
    parallelism: usize,
    grace: Duration,
) {
    let limit = Arc::new(Semaphore::new(parallelism.max(1)));
    let mut workers = JoinSet::new();

    for row in rows {
        if control.checkpoint().await.is_err() {
            break;
        }
        let permit = tokio::select! {
            _ = control.token().cancelled() => break,
            permit = limit.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };
        // A pause may have started while waiting for a slot
        if control.checkpoint().await.is_err() {
            break;
        }

        let pipeline = pipeline.clone();
        let results = results.clone();
        workers.spawn(async move {
            let _permit = permit;
            let result = AssertUnwindSafe(pipeline.run(&row))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    tracing::error!(row = row.number(), "Row pipeline panicked");
                    aborted(&row)
                });
            // The supervisor outlives every worker
            let _ = results.send(result);
        });
    }
    drop(results);

    drain(&mut workers, &control, grace).await;
}

/// Wait for every worker; after a stop, give them `grace` before aborting
async fn drain(workers: &mut JoinSet<()>, control: &RunControl, grace: Duration) {
    loop {
        tokio::select! {
            next = workers.join_next() => {
                if next.is_none() {
                    return;
                }
            }
            _ = control.token().cancelled() => break,
        }
    }

    tracing::info!(
        in_flight = workers.len(),
        grace_secs = grace.as_secs_f64(),
        "Stopping, waiting for in-flight rows"
    );
    let settled = tokio::time::timeout(grace, async {
        while workers.join_next().await.is_some() {}
    })
    .await;

    if settled.is_err() {
        tracing::warn!(aborted = workers.len(), "Grace period elapsed, aborting rows");
        workers.shutdown().await;
    }
}
