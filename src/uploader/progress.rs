//! Run counters and ETA

use crate::types::{Progress, RunState, TaskResult};
use std::time::{Duration, Instant};

/// Counters owned by the supervisor
#[derive(Debug)]
pub(crate) struct Tally {
    started: Instant,
    total: usize,
    processed: usize,
    succeeded: usize,
    failed: usize,
}

impl Tally {
    pub(crate) fn new(total: usize, started: Instant) -> Self {
        Self {
            started,
            total,
            processed: 0,
            succeeded: 0,
            failed: 0,
        }
    }

    /// Count one result; Skipped counts as failed
    pub(crate) fn record(&mut self, result: &TaskResult) {
        self.processed += 1;
        if result.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }

    pub(crate) fn succeeded(&self) -> usize {
        self.succeeded
    }

    pub(crate) fn failed(&self) -> usize {
        self.failed
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Snapshot with the average time per row extrapolated over what is left
    pub(crate) fn snapshot(&self, state: RunState) -> Progress {
        let elapsed = self.elapsed();
        let eta = if self.processed == 0 {
            None
        } else {
            let remaining = self.total.saturating_sub(self.processed) as u32;
            Some(elapsed / self.processed as u32 * remaining)
        };

        Progress {
            state,
            processed: self.processed,
            total: self.total,
            succeeded: self.succeeded,
            failed: self.failed,
            elapsed,
            eta,
        }
    }
}
