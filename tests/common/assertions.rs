//! Event collection and result assertions

use batch_uploader::{BatchUploader, Event, RunSummary, TaskResult, TaskStatus};
use std::time::Duration;
use tokio::sync::broadcast;

/// Collect events until `RunFinished` (inclusive) or the timeout expires
pub async fn collect_until_finished(
    events: &mut broadcast::Receiver<Event>,
    timeout: Duration,
) -> Vec<Event> {
    let mut seen = Vec::new();
    let _ = tokio::time::timeout(timeout, async {
        while let Ok(event) = events.recv().await {
            let done = matches!(event, Event::RunFinished { .. });
            seen.push(event);
            if done {
                break;
            }
        }
    })
    .await;
    seen
}

/// Wait for the run with a deadline
pub async fn finish(uploader: &BatchUploader, timeout: Duration) -> RunSummary {
    tokio::time::timeout(timeout, uploader.wait())
        .await
        .expect("run did not finish in time")
        .expect("no run was started")
}

/// Results ordered by row number
pub async fn sorted_results(uploader: &BatchUploader) -> Vec<TaskResult> {
    let mut results = uploader.results().await;
    results.sort_by_key(|r| r.row);
    results
}

/// Assert a row's status, showing its error on mismatch
pub fn assert_status(result: &TaskResult, expected: TaskStatus) {
    assert_eq!(
        result.status, expected,
        "row {} ({}): error {:?}",
        result.row, result.source, result.error
    );
}
