use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::answer::AnswerValue;

/// Body shared by start/pause/stop.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TimerActionRequest {
    #[validate(length(min = 1, max = 128, message = "requestedBy must not be empty"))]
    pub requested_by: String,
    /// Only honoured by `start`.
    pub expected_version: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EditTimerRequest {
    #[validate(length(min = 1, max = 128, message = "requestedBy must not be empty"))]
    pub requested_by: String,
    pub duration_ms: i64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JoinSessionRequest {
    #[validate(length(min = 1, max = 128, message = "userId must not be empty"))]
    pub user_id: String,
    #[validate(length(min = 1, max = 64, message = "Username must be between 1 and 64 characters"))]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAnswerRequest {
    #[validate(length(min = 1, max = 128, message = "questionId must not be empty"))]
    pub question_id: String,
    pub value: AnswerValue,
    pub client_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct AccessCodeRequest {
    #[validate(range(min = 4, max = 12, message = "length must be between 4 and 12"))]
    pub length: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessCodeResponse {
    pub access_code: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteSessionResponse {
    pub session_id: String,
    pub completed_participants: usize,
}
