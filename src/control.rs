//! Cooperative pause/stop signalling shared by every worker of a run.
//!
//! Workers call [`RunControl::checkpoint`] before each attempt. While paused the
//! checkpoint parks on a `watch` channel and wakes as soon as the run is resumed
//! or stopped; nothing is polled. Stopping is a [`CancellationToken`], so
//! cancellable sleeps end immediately too.

use crate::error::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Pause gate plus cancellation token for one run
#[derive(Clone, Debug)]
pub struct RunControl {
    paused: Arc<watch::Sender<bool>>,
    cancel: CancellationToken,
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new()
    }
}

impl RunControl {
    /// A control that is neither paused nor stopped
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            paused: Arc::new(paused),
            cancel: CancellationToken::new(),
        }
    }

    /// Close the gate. Returns false if it was already closed.
    pub fn pause(&self) -> bool {
        !self.paused.send_replace(true)
    }

    /// Open the gate. Returns false if it was already open.
    pub fn resume(&self) -> bool {
        self.paused.send_replace(false)
    }

    /// Whether the gate is closed
    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Request stop; waiters at the gate and in sleeps return [`Error::Cancelled`]
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether stop was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The underlying token, for `select!` against long operations
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Wait at the pause gate, then fail if the run was stopped
    pub async fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        if self.is_paused() {
            let mut rx = self.paused.subscribe();
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                res = rx.wait_for(|paused| !*paused) => {
                    // The sender lives as long as `self`
                    if res.is_err() {
                        return Err(Error::Cancelled);
                    }
                }
            }
        }

        if self.cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleep that ends early with [`Error::Cancelled`] when the run is stopped
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}
