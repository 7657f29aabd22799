use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use thiserror::Error;

use crate::models::timer::{TimerAction, TimerStatus};

pub type CoreResult<T> = Result<T, CoreError>;

/// Failures raised by a [`crate::store::KvStore`] backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store operation '{operation}' timed out")]
    Timeout { operation: &'static str },
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("failed to encode or decode stored record: {0}")]
    Codec(#[from] serde_json::Error),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Why a timer action, or an answer against a timer, was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionRejection {
    EditWhilePlaying,
    NonPositiveDuration,
    SessionClosed,
    /// The question timer is stopped, paused or past its deadline.
    AnswerWindowClosed,
}

/// Typed failures of the timer, join and scoring core.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("no session for access code '{0}'")]
    SessionNotFound(String),
    #[error("session '{session_id}' is not accepting participants")]
    SessionNotJoinable { session_id: String },
    #[error("cannot {action:?} a timer in status {status:?}: {reason:?}")]
    InvalidTimerTransition {
        status: TimerStatus,
        action: TimerAction,
        reason: TransitionRejection,
    },
    #[error("store unavailable for key '{key}'")]
    TimerStoreUnavailable {
        key: String,
        #[source]
        source: StoreError,
    },
    #[error("participant '{participant_id}' not found in session '{session_id}'")]
    ParticipantNotFound {
        session_id: String,
        participant_id: String,
    },
    #[error("participant '{participant_id}' already answered question '{question_id}'")]
    DuplicateAnswer {
        participant_id: String,
        question_id: String,
    },
    #[error("concurrent update conflict on key '{key}'")]
    ConcurrentUpdateConflict { key: String },
    #[error("no unique access code found after {attempts} attempts")]
    AccessCodeExhausted { attempts: usize },
}

impl CoreError {
    pub fn store_unavailable(key: impl Into<String>, source: StoreError) -> Self {
        CoreError::TimerStoreUnavailable {
            key: key.into(),
            source,
        }
    }

    /// Stable machine-readable code handed to clients.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            CoreError::SessionNotJoinable { .. } => "SESSION_NOT_JOINABLE",
            CoreError::InvalidTimerTransition { .. } => "INVALID_TIMER_TRANSITION",
            CoreError::TimerStoreUnavailable { .. } => "TIMER_STORE_UNAVAILABLE",
            CoreError::ParticipantNotFound { .. } => "PARTICIPANT_NOT_FOUND",
            CoreError::DuplicateAnswer { .. } => "DUPLICATE_ANSWER",
            CoreError::ConcurrentUpdateConflict { .. } => "CONCURRENT_UPDATE_CONFLICT",
            CoreError::AccessCodeExhausted { .. } => "ACCESS_CODE_EXHAUSTED",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            CoreError::SessionNotFound(_) | CoreError::ParticipantNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            CoreError::SessionNotJoinable { .. } => StatusCode::FORBIDDEN,
            CoreError::InvalidTimerTransition { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            CoreError::DuplicateAnswer { .. } | CoreError::ConcurrentUpdateConflict { .. } => {
                StatusCode::CONFLICT
            }
            CoreError::TimerStoreUnavailable { .. } | CoreError::AccessCodeExhausted { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<TransitionRejection>,
}

/// HTTP-facing error: either a core failure or a rejected request body.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("invalid request: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ApiError::Core(err) => {
                if matches!(err, CoreError::TimerStoreUnavailable { .. }) {
                    tracing::error!("Store unavailable while serving request: {:?}", err);
                }
                let reason = match &err {
                    CoreError::InvalidTimerTransition { reason, .. } => Some(*reason),
                    _ => None,
                };
                let body = ErrorBody {
                    code: err.code(),
                    reason,
                };
                (err.status_code(), Json(body)).into_response()
            }
            ApiError::Validation(errors) => {
                tracing::debug!("Rejected request body: {}", errors);
                let body = ErrorBody {
                    code: "INVALID_REQUEST",
                    reason: None,
                };
                (StatusCode::BAD_REQUEST, Json(body)).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_has_a_distinct_code() {
        let errors = [
            CoreError::SessionNotFound("X".into()),
            CoreError::SessionNotJoinable {
                session_id: "s".into(),
            },
            CoreError::InvalidTimerTransition {
                status: TimerStatus::Play,
                action: TimerAction::Edit,
                reason: TransitionRejection::EditWhilePlaying,
            },
            CoreError::store_unavailable("k", StoreError::Timeout { operation: "get" }),
            CoreError::ParticipantNotFound {
                session_id: "s".into(),
                participant_id: "p".into(),
            },
            CoreError::DuplicateAnswer {
                participant_id: "p".into(),
                question_id: "q".into(),
            },
            CoreError::ConcurrentUpdateConflict { key: "k".into() },
            CoreError::AccessCodeExhausted { attempts: 10 },
        ];

        let mut codes: Vec<_> = errors.iter().map(CoreError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn duplicate_answer_maps_to_conflict() {
        let err = CoreError::DuplicateAnswer {
            participant_id: "p".into(),
            question_id: "q".into(),
        };
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn closed_answer_window_is_unprocessable() {
        let err = CoreError::InvalidTimerTransition {
            status: TimerStatus::Stop,
            action: TimerAction::Answer,
            reason: TransitionRejection::AnswerWindowClosed,
        };
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            serde_json::to_value(TransitionRejection::AnswerWindowClosed).unwrap(),
            "answer_window_closed"
        );
    }
}
