//! Run control: pause, resume, stop, reset and read-only snapshots.

use super::BatchUploader;
use crate::error::{Error, Result};
use crate::network::ConnectionReport;
use crate::types::{Event, Progress, RunState, RunSummary, TaskResult};

fn invalid(operation: &str, state: RunState) -> Error {
    Error::InvalidState {
        operation: operation.to_string(),
        state: state.to_string(),
    }
}

impl BatchUploader {
    /// Hold workers at their next checkpoint
    ///
    /// Work already past its checkpoint (a publish in flight, a running
    /// encoder) finishes; no new attempt starts until [`BatchUploader::resume`].
    /// Pausing a paused run does nothing.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] when no run is in progress.
    pub async fn pause(&self) -> Result<()> {
        let run = self.run.lock().await;
        match (self.state(), run.as_ref()) {
            (RunState::Paused, _) => Ok(()),
            (RunState::Running, Some(active)) => {
                active.control.pause();
                self.progress_tx
                    .send_modify(|progress| progress.state = RunState::Paused);
                tracing::info!("Run paused");
                self.emit(Event::Paused);
                Ok(())
            }
            (state, _) => Err(invalid("pause", state)),
        }
    }

    /// Let paused workers continue; resuming a running run does nothing
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] when no run is in progress.
    pub async fn resume(&self) -> Result<()> {
        let run = self.run.lock().await;
        match (self.state(), run.as_ref()) {
            (RunState::Running, _) => Ok(()),
            (RunState::Paused, Some(active)) => {
                active.control.resume();
                self.progress_tx
                    .send_modify(|progress| progress.state = RunState::Running);
                tracing::info!("Run resumed");
                self.emit(Event::Resumed);
                Ok(())
            }
            (state, _) => Err(invalid("resume", state)),
        }
    }

    /// Stop the run
    ///
    /// No further rows are dispatched. In-flight rows get
    /// `upload.shutdown_grace` to reach a checkpoint before they are aborted;
    /// every row without a result is reported as Failed, "stopped by user".
    /// Returns once the stop is signalled; [`BatchUploader::wait`] returns
    /// when the run has wound down.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] when no run is in progress.
    pub async fn stop(&self) -> Result<()> {
        let run = self.run.lock().await;
        match (self.state(), run.as_ref()) {
            (state, Some(active)) if state.is_active() => {
                if !active.control.is_cancelled() {
                    active.control.cancel();
                    tracing::info!(
                        grace_secs = self.config.upload.shutdown_grace.as_secs_f64(),
                        "Stop requested"
                    );
                    self.emit(Event::Stopping);
                }
                Ok(())
            }
            (state, _) => Err(invalid("stop", state)),
        }
    }

    /// Clear the results and counters of a finished run; a no-op when idle
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] while a run is in progress.
    pub async fn reset(&self) -> Result<()> {
        let mut run = self.run.lock().await;
        match self.state() {
            RunState::Idle => Ok(()),
            RunState::Completed | RunState::Stopped => {
                *run = None;
                self.results.write().await.clear();
                self.progress_tx.send_replace(Progress::default());
                tracing::debug!("Run state reset");
                Ok(())
            }
            state => Err(invalid("reset", state)),
        }
    }

    /// Current progress; elapsed time is live while a run is active
    pub async fn progress(&self) -> Progress {
        let mut progress = self.progress_tx.borrow().clone();
        if progress.state.is_active()
            && let Some(active) = self.run.lock().await.as_ref()
        {
            progress.elapsed = active.started.elapsed();
        }
        progress
    }

    /// Results recorded so far, in completion order
    pub async fn results(&self) -> Vec<TaskResult> {
        self.results.read().await.clone()
    }

    /// Wait for the current run to finish; `None` if no run was started
    pub async fn wait(&self) -> Option<RunSummary> {
        let mut finished = {
            let run = self.run.lock().await;
            run.as_ref()?.finished.clone()
        };
        let summary = finished.wait_for(Option::is_some).await.ok()?;
        summary.clone()
    }

    /// Probe the network once, as the publisher would before an attempt
    pub async fn test_connection(&self) -> ConnectionReport {
        let report = self.services.probe.probe().await;
        if report.reachable {
            tracing::info!(via = ?report.via, "Connection test succeeded");
        } else {
            tracing::warn!("Connection test failed, no endpoint reachable");
        }
        report
    }
}
