use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use validator::Validate;

use crate::error::ApiError;
use crate::models::requests::{AccessCodeRequest, AccessCodeResponse, CompleteSessionResponse};
use crate::services::session_lifecycle::PurgeReport;
use crate::services::AppState;

/// POST /api/v1/access-codes
pub async fn generate_access_code(
    State(state): State<Arc<AppState>>,
    req: Option<Json<AccessCodeRequest>>,
) -> Result<(StatusCode, Json<AccessCodeResponse>), ApiError> {
    let req = req.map(|Json(req)| req).unwrap_or_default();
    req.validate()?;
    let length = req.length.unwrap_or(state.config.access_code_length);
    let access_code = state.access_codes.generate(length).await?;
    Ok((StatusCode::CREATED, Json(AccessCodeResponse { access_code })))
}

/// POST /api/v1/sessions/{session_id}/complete
pub async fn complete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<CompleteSessionResponse>, ApiError> {
    let completed_participants = state.lifecycle.complete_session(&session_id).await?;
    Ok(Json(CompleteSessionResponse {
        session_id,
        completed_participants,
    }))
}

/// DELETE /api/v1/sessions/{session_id}
pub async fn purge_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<PurgeReport>, ApiError> {
    Ok(Json(state.lifecycle.purge_session(&session_id).await?))
}
