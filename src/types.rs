//! Core types for batch-uploader

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// One unit of work read from the input table
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    /// 0-based position in the input
    pub index: usize,
    /// Local path or URL of the content
    pub source: String,
    /// Proposed name in the repository
    pub target: String,
    /// Description text published with the file
    pub description: String,
}

impl Row {
    /// Rows missing either a source or a target are never submitted
    pub fn is_valid(&self) -> bool {
        !self.source.trim().is_empty() && !self.target.trim().is_empty()
    }

    /// 1-based row number as reported in results
    pub fn number(&self) -> usize {
        self.index + 1
    }
}

/// Final outcome of a row
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Published
    Success,
    /// Not attempted (missing file, unsupported format, unusable name)
    Skipped,
    /// Attempted and failed, or stopped
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Success => write!(f, "Success"),
            TaskStatus::Skipped => write!(f, "Skipped"),
            TaskStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// Outcome of the post-publish comparison
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verification {
    /// Remote size and text match the source
    Verified,
    /// Mismatch or lookup failure
    NotOk(String),
}

impl std::fmt::Display for Verification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verification::Verified => write!(f, "Verified"),
            Verification::NotOk(reason) => write!(f, "Not OK: {}", reason),
        }
    }
}

/// Per-row result, created once by the row's pipeline
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// 1-based row number
    pub row: usize,
    /// Source location as given in the input
    pub source: String,
    /// Local file that was (or would have been) published
    pub resolved_path: Option<PathBuf>,
    /// Name used in the repository (proposed name if never resolved)
    pub target: String,
    /// Outcome
    pub status: TaskStatus,
    /// Error text for Skipped/Failed rows
    pub error: Option<String>,
    /// Verification outcome for Success rows
    pub verification: Option<Verification>,
    /// When the result was produced
    pub timestamp: DateTime<Local>,
}

impl TaskResult {
    /// Result for a row that was stopped or never produced a result of its own
    pub fn stopped(row: &Row) -> Self {
        Self {
            row: row.number(),
            source: row.source.clone(),
            resolved_path: None,
            target: row.target.clone(),
            status: TaskStatus::Failed,
            error: Some(crate::Error::Cancelled.to_string()),
            verification: None,
            timestamp: Local::now(),
        }
    }

    /// Text written to the `Upload_Status` column
    pub fn status_text(&self) -> String {
        match (&self.status, &self.error) {
            (TaskStatus::Success, _) => "Success".to_string(),
            (status, Some(error)) => format!("{}: {}", status, error),
            (status, None) => status.to_string(),
        }
    }

    /// Whether this result counts as a success in the run counters
    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Success
    }
}

/// Run lifecycle state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    /// No run started, or reset after one
    #[default]
    Idle,
    /// Rows are being processed
    Running,
    /// Workers hold at their next checkpoint
    Paused,
    /// All rows finished
    Completed,
    /// Operator stopped the run
    Stopped,
}

impl RunState {
    /// Whether a run is in progress (running or paused)
    pub fn is_active(&self) -> bool {
        matches!(self, RunState::Running | RunState::Paused)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Paused => "paused",
            RunState::Completed => "completed",
            RunState::Stopped => "stopped",
        };
        write!(f, "{}", s)
    }
}

/// Read-only snapshot of run progress
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// Current lifecycle state
    pub state: RunState,
    /// Rows with a result
    pub processed: usize,
    /// Valid rows submitted in this run
    pub total: usize,
    /// Rows published
    pub succeeded: usize,
    /// Rows skipped or failed
    pub failed: usize,
    /// Time since the run started
    #[serde(with = "secs")]
    pub elapsed: Duration,
    /// Estimated time to finish (None until the first row completes)
    #[serde(with = "opt_secs")]
    pub eta: Option<Duration>,
}

impl Progress {
    /// Completion percentage (0.0 to 100.0)
    pub fn percent(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            (self.processed as f32 / self.total as f32) * 100.0
        }
    }
}

/// Final totals of a run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Terminal state (Completed or Stopped)
    pub state: RunState,
    /// Valid rows submitted
    pub total: usize,
    /// Rows published
    pub succeeded: usize,
    /// Rows skipped or failed
    pub failed: usize,
    /// Where results were written (None if writing failed)
    pub output: Option<PathBuf>,
    /// Wall-clock duration of the run
    #[serde(with = "secs")]
    pub elapsed: Duration,
}

/// Events emitted while a run progresses
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Run started with this many valid rows
    RunStarted {
        /// Valid rows submitted
        total: usize,
        /// Rows dropped for missing source or target
        dropped: usize,
    },

    /// A worker picked up a row
    RowStarted {
        /// 1-based row number
        row: usize,
        /// Proposed target name
        target: String,
    },

    /// A row produced its result
    RowFinished {
        /// The result
        result: TaskResult,
        /// Progress after recording it
        progress: Progress,
    },

    /// Workers will hold at their next checkpoint
    Paused,

    /// Workers continue
    Resumed,

    /// Reachability probe failed; publishing waits
    NetworkLost,

    /// Reachability probe succeeded again
    NetworkRestored,

    /// Stop requested; in-flight rows are winding down
    Stopping,

    /// Run reached a terminal state and results were written
    RunFinished {
        /// Final totals
        summary: RunSummary,
    },
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs_f64(f64::deserialize(d)?.max(0.0)))
    }
}

mod opt_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<f64>::deserialize(d)?.map(|secs| Duration::from_secs_f64(secs.max(0.0))))
    }
}
