//! Run control handlers.

use super::StartRunRequest;
use crate::api::AppState;
use crate::error::Result;
use crate::types::{Progress, TaskResult};
use axum::{Json, extract::State, http::StatusCode};

/// POST /run/start - Start a run; answers 202 once rows are queued
pub async fn start_run(
    State(state): State<AppState>,
    Json(request): Json<StartRunRequest>,
) -> Result<(StatusCode, Json<Progress>)> {
    state.uploader.start(&request.input, request.output).await?;
    Ok((StatusCode::ACCEPTED, Json(state.uploader.progress().await)))
}

/// POST /run/pause
pub async fn pause_run(State(state): State<AppState>) -> Result<Json<Progress>> {
    state.uploader.pause().await?;
    Ok(Json(state.uploader.progress().await))
}

/// POST /run/resume
pub async fn resume_run(State(state): State<AppState>) -> Result<Json<Progress>> {
    state.uploader.resume().await?;
    Ok(Json(state.uploader.progress().await))
}

/// POST /run/stop - Signal a stop; the run winds down in the background
pub async fn stop_run(State(state): State<AppState>) -> Result<(StatusCode, Json<Progress>)> {
    state.uploader.stop().await?;
    Ok((StatusCode::ACCEPTED, Json(state.uploader.progress().await)))
}

/// POST /run/reset
pub async fn reset_run(State(state): State<AppState>) -> Result<Json<Progress>> {
    state.uploader.reset().await?;
    Ok(Json(state.uploader.progress().await))
}

/// GET /run/progress
pub async fn get_progress(State(state): State<AppState>) -> Json<Progress> {
    Json(state.uploader.progress().await)
}

/// GET /run/results
pub async fn get_results(State(state): State<AppState>) -> Json<Vec<TaskResult>> {
    Json(state.uploader.results().await)
}
