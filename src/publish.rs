//! Authenticated publish with bounded retries
//!
//! Before every attempt the publisher waits at the pause gate, gives up if the
//! run was stopped, and waits for the network to be reachable. None of that
//! consumes an attempt. A success is journaled before `publish` returns so it
//! survives a crash of the rest of the run.

use crate::config::UploadConfig;
use crate::control::RunControl;
use crate::error::{Error, Result};
use crate::network::NetworkGate;
use crate::repository::{PublishRequest, Repository, Session};
use crate::rows::sink::Journal;
use crate::types::TaskResult;
use std::sync::Arc;

/// Sends files to the repository
pub struct Publisher {
    repository: Arc<dyn Repository>,
    gate: Arc<NetworkGate>,
    config: Arc<UploadConfig>,
    journal: Option<Arc<Journal>>,
}

impl Publisher {
    /// Create a publisher; `journal` receives every success
    pub fn new(
        repository: Arc<dyn Repository>,
        gate: Arc<NetworkGate>,
        config: Arc<UploadConfig>,
        journal: Option<Arc<Journal>>,
    ) -> Self {
        Self {
            repository,
            gate,
            config,
            journal,
        }
    }

    /// Description text as sent: the row's description plus the category marker
    pub fn text_for(&self, description: &str) -> String {
        let marker = self.config.category_marker.trim();
        let description = description.trim_end();
        match (description.is_empty(), marker.is_empty()) {
            (_, true) => description.to_string(),
            (true, false) => marker.to_string(),
            (false, false) => format!("{}\n\n{}", description, marker),
        }
    }

    /// Publish `request`, retrying up to `max_attempts`
    ///
    /// `success` is the result to journal once the repository accepts the file.
    /// Returns the number of attempts used.
    pub async fn publish(
        &self,
        session: &Session,
        request: &PublishRequest,
        success: &TaskResult,
        control: &RunControl,
    ) -> Result<u32> {
        let policy = self.config.retry_policy();
        let max_attempts = policy.max_attempts;
        let name = &request.name;
        let mut attempt = 0;

        loop {
            control.checkpoint().await?;
            self.gate.wait_until_reachable(control).await?;
            attempt += 1;

            tracing::debug!(name = %name, attempt, max_attempts, "Publishing");

            let outcome = match self.repository.publish(session, request).await {
                Ok(true) => Ok(()),
                Ok(false) => Err(Error::Publish("repository reported failure".to_string())),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(()) => {
                    tracing::info!(name = %name, attempt, "Uploaded");
                    self.record(success).await;
                    return Ok(attempt);
                }
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) if attempt < max_attempts => {
                    let pause = policy.delay();
                    tracing::warn!(
                        name = %name,
                        error = %e,
                        attempt,
                        max_attempts,
                        pause_secs = pause.as_secs_f64(),
                        "Publish failed, retrying"
                    );
                    control.sleep(pause).await?;
                }
                Err(e) => {
                    tracing::error!(name = %name, error = %e, attempts = attempt, "Publish failed");
                    return Err(e);
                }
            }
        }
    }

    async fn record(&self, result: &TaskResult) {
        if let Some(journal) = &self.journal
            && let Err(e) = journal.append(result).await
        {
            tracing::warn!(row = result.row, error = %e, "Failed to journal upload");
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;
    use crate::network::{ConnectionReport, ReachabilityProbe};
    use crate::repository::memory::{InMemoryRepository, PublishFailure};
    use crate::types::{Row, TaskStatus};
    use async_trait::async_trait;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::broadcast;

    struct AlwaysUp;

    #[async_trait]
    impl ReachabilityProbe for AlwaysUp {
        async fn probe(&self) -> ConnectionReport {
            ConnectionReport {
                reachable: true,
                via: None,
            }
        }
    }

    struct Fixture {
        _dir: TempDir,
        repo: Arc<InMemoryRepository>,
        publisher: Publisher,
        journal: Arc<Journal>,
        request: PublishRequest,
        success: TaskResult,
    }

    async fn fixture(repo: InMemoryRepository, max_attempts: u32) -> Fixture {
        fixture_with(
            repo,
            UploadConfig {
                max_attempts,
                retry_pause: Duration::from_millis(5),
                ..Default::default()
            },
        )
        .await
    }

    async fn fixture_with(repo: InMemoryRepository, config: UploadConfig) -> Fixture {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.png");
        tokio::fs::write(&file, b"\x89PNG\r\n\x1a\n").await.unwrap();

        let repo = Arc::new(repo);
        let (events, _) = broadcast::channel(8);
        let gate = Arc::new(NetworkGate::new(
            Arc::new(AlwaysUp),
            Duration::from_millis(5),
            events,
        ));
        let journal = Arc::new(Journal::create(dir.path().join("out.csv.journal.jsonl")).await.unwrap());
        let publisher = Publisher::new(repo.clone(), gate, Arc::new(config), Some(journal.clone()));

        let row = Row {
            index: 0,
            source: file.to_string_lossy().into_owned(),
            target: "A".into(),
            description: "desc".into(),
        };
        let mut success = TaskResult::stopped(&row);
        success.status = TaskStatus::Success;
        success.error = None;

        Fixture {
            request: PublishRequest {
                name: "A.png".to_string(),
                file,
                text: publisher.text_for("desc"),
                comment: "test".into(),
                ignore_warnings: true,
            },
            _dir: dir,
            repo,
            publisher,
            journal,
            success,
        }
    }

    #[tokio::test]
    async fn test_retries_then_journals_success() {
        let f = fixture(
            InMemoryRepository::new().with_failures([
                PublishFailure::Error("timeout".into()),
                PublishFailure::Rejected("busy".into()),
            ]),
            5,
        )
        .await;
        let session = f.repo.login(&Credentials::default()).await.unwrap();

        let attempts = f
            .publisher
            .publish(&session, &f.request, &f.success, &RunControl::new())
            .await
            .unwrap();
        assert_eq!(attempts, 3);
        assert_eq!(f.repo.publish_calls(), 3);

        let journaled = f.journal.read_all().await.unwrap();
        assert_eq!(journaled.len(), 1);
        assert_eq!(journaled[0].status, TaskStatus::Success);
    }

    #[tokio::test]
    async fn test_jittered_pauses_never_shorter_than_configured() {
        let f = fixture_with(
            InMemoryRepository::new().with_failures([
                PublishFailure::Error("timeout".into()),
                PublishFailure::Error("timeout".into()),
            ]),
            UploadConfig {
                max_attempts: 3,
                retry_pause: Duration::from_millis(20),
                retry_jitter: true,
                ..Default::default()
            },
        )
        .await;
        let session = f.repo.login(&Credentials::default()).await.unwrap();

        let started = std::time::Instant::now();
        let attempts = f
            .publisher
            .publish(&session, &f.request, &f.success, &RunControl::new())
            .await
            .unwrap();
        assert_eq!(attempts, 3);
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_last_error_after_exhaustion() {
        let f = fixture(
            InMemoryRepository::new().with_failures([
                PublishFailure::Declined,
                PublishFailure::Rejected("duplicate of File:B.png".into()),
            ]),
            2,
        )
        .await;
        let session = f.repo.login(&Credentials::default()).await.unwrap();

        let err = f
            .publisher
            .publish(&session, &f.request, &f.success, &RunControl::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "upload warning: duplicate of File:B.png");
        assert!(f.journal.read_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stopped_before_attempt() {
        let f = fixture(InMemoryRepository::new(), 3).await;
        let session = f.repo.login(&Credentials::default()).await.unwrap();
        let control = RunControl::new();
        control.cancel();

        let err = f
            .publisher
            .publish(&session, &f.request, &f.success, &control)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(f.repo.publish_calls(), 0);
    }

    #[tokio::test]
    async fn test_text_carries_marker() {
        let f = fixture(InMemoryRepository::new(), 1).await;
        assert_eq!(
            f.publisher.text_for("A sunset.  "),
            "A sunset.\n\n[[Category:Uploaded with batch-uploader]]"
        );
        assert_eq!(
            f.publisher.text_for(""),
            "[[Category:Uploaded with batch-uploader]]"
        );
    }
}
