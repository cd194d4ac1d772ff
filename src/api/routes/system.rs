//! System handlers: health, network probe and events.

use crate::api::AppState;
use crate::network::ConnectionReport;
use crate::types::Event;
use axum::{
    Json,
    extract::State,
    response::{
        IntoResponse,
        sse::{Event as SseEvent, KeepAlive, Sse},
    },
};
use serde_json::json;
use std::convert::Infallible;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};

/// GET /health
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// GET /network - Probe reachability once
pub async fn test_network(State(state): State<AppState>) -> Json<ConnectionReport> {
    Json(state.uploader.test_connection().await)
}

/// SSE event name for each event
fn event_name(event: &Event) -> &'static str {
    match event {
        Event::RunStarted { .. } => "run_started",
        Event::RowStarted { .. } => "row_started",
        Event::RowFinished { .. } => "row_finished",
        Event::Paused => "paused",
        Event::Resumed => "resumed",
        Event::NetworkLost => "network_lost",
        Event::NetworkRestored => "network_restored",
        Event::Stopping => "stopping",
        Event::RunFinished { .. } => "run_finished",
    }
}

/// GET /events - Server-sent events stream
///
/// Each event is sent with its `type` as the SSE event name and the JSON
/// encoding as data. A client that falls behind gets a `lagged` event with
/// the number of events it missed.
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let stream = BroadcastStream::new(state.uploader.subscribe()).filter_map(|received| {
        match received {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(data) => Some(Ok(SseEvent::default().event(event_name(&event)).data(data))),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to encode event");
                    None
                }
            },
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "SSE client lagged");
                Some(Ok(SseEvent::default()
                    .event("lagged")
                    .data(json!({ "skipped": skipped }).to_string())))
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
