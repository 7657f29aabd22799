use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use validator::Validate;

use crate::error::ApiError;
use crate::models::requests::{JoinSessionRequest, SubmitAnswerRequest};
use crate::models::{Participant, QuestionStart, ScoreResult};
use crate::services::AppState;

/// POST /api/v1/sessions/{code}/join
pub async fn join_session(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Json(req): Json<JoinSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;
    let participant = state
        .registry
        .join(&req.user_id, &code, req.username.as_deref())
        .await?;
    Ok((StatusCode::OK, Json(participant)))
}

/// GET /api/v1/sessions/{session_id}/participants/{participant_id}
pub async fn get_participant(
    State(state): State<Arc<AppState>>,
    Path((session_id, participant_id)): Path<(String, String)>,
) -> Result<Json<Participant>, ApiError> {
    Ok(Json(
        state
            .registry
            .get_participant(&session_id, &participant_id)
            .await?,
    ))
}

/// POST /api/v1/sessions/{session_id}/participants/{participant_id}/questions/{question_id}/open
pub async fn open_question(
    State(state): State<Arc<AppState>>,
    Path((session_id, participant_id, question_id)): Path<(String, String, String)>,
) -> Result<Json<QuestionStart>, ApiError> {
    Ok(Json(
        state
            .scoring
            .open_question(&session_id, &participant_id, &question_id)
            .await?,
    ))
}

/// POST /api/v1/sessions/{session_id}/participants/{participant_id}/answers
pub async fn submit_answer(
    State(state): State<Arc<AppState>>,
    Path((session_id, participant_id)): Path<(String, String)>,
    Json(req): Json<SubmitAnswerRequest>,
) -> Result<(StatusCode, Json<ScoreResult>), ApiError> {
    req.validate()?;
    tracing::info!(
        "Answer for {} from participant {} in session {}",
        req.question_id,
        participant_id,
        session_id
    );
    let result = state
        .scoring
        .submit_answer(
            &session_id,
            &participant_id,
            &req.question_id,
            req.value,
            req.client_timestamp,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(result)))
}

/// GET /api/v1/sessions/{session_id}/leaderboard
pub async fn leaderboard(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<Vec<Participant>>, ApiError> {
    Ok(Json(state.scoring.rank(&session_id).await?))
}
