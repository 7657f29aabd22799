use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;
use validator::Validate;

use crate::error::ApiError;
use crate::models::requests::{EditTimerRequest, TimerActionRequest};
use crate::models::TimerSnapshot;
use crate::services::AppState;

type TimerPath = Path<(String, String)>;

/// GET /api/v1/sessions/{code}/questions/{question_id}/timer
pub async fn get_timer(
    State(state): State<Arc<AppState>>,
    Path((code, question_id)): TimerPath,
) -> Result<Json<TimerSnapshot>, ApiError> {
    Ok(Json(state.timers.get_state(&code, &question_id).await?))
}

/// POST /api/v1/sessions/{code}/questions/{question_id}/timer/start
pub async fn start_timer(
    State(state): State<Arc<AppState>>,
    Path((code, question_id)): TimerPath,
    Json(req): Json<TimerActionRequest>,
) -> Result<Json<TimerSnapshot>, ApiError> {
    req.validate()?;
    tracing::info!("Timer start requested: {}/{} by {}", code, question_id, req.requested_by);
    let snapshot = state
        .timers
        .start(&code, &question_id, &req.requested_by, req.expected_version)
        .await?;
    Ok(Json(snapshot))
}

/// POST /api/v1/sessions/{code}/questions/{question_id}/timer/pause
pub async fn pause_timer(
    State(state): State<Arc<AppState>>,
    Path((code, question_id)): TimerPath,
    Json(req): Json<TimerActionRequest>,
) -> Result<Json<TimerSnapshot>, ApiError> {
    req.validate()?;
    tracing::info!("Timer pause requested: {}/{} by {}", code, question_id, req.requested_by);
    Ok(Json(
        state
            .timers
            .pause(&code, &question_id, &req.requested_by)
            .await?,
    ))
}

/// POST /api/v1/sessions/{code}/questions/{question_id}/timer/stop
pub async fn stop_timer(
    State(state): State<Arc<AppState>>,
    Path((code, question_id)): TimerPath,
    Json(req): Json<TimerActionRequest>,
) -> Result<Json<TimerSnapshot>, ApiError> {
    req.validate()?;
    tracing::info!("Timer stop requested: {}/{} by {}", code, question_id, req.requested_by);
    Ok(Json(
        state
            .timers
            .stop(&code, &question_id, &req.requested_by)
            .await?,
    ))
}

/// POST /api/v1/sessions/{code}/questions/{question_id}/timer/edit
pub async fn edit_timer(
    State(state): State<Arc<AppState>>,
    Path((code, question_id)): TimerPath,
    Json(req): Json<EditTimerRequest>,
) -> Result<Json<TimerSnapshot>, ApiError> {
    req.validate()?;
    tracing::info!(
        "Timer edit requested: {}/{} to {}ms by {}",
        code,
        question_id,
        req.duration_ms,
        req.requested_by
    );
    Ok(Json(
        state
            .timers
            .edit(&code, &question_id, req.duration_ms, &req.requested_by)
            .await?,
    ))
}
