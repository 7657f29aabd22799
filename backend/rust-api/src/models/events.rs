use serde::{Deserialize, Serialize};

use super::{answer::ScoreResult, participant::Participant, session::Session, timer::TimerSnapshot};

/// Notifications handed to the broadcaster after the core mutates state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    #[serde(rename = "timer.changed", rename_all = "camelCase")]
    TimerChanged {
        session_code: String,
        question_id: String,
        state: TimerSnapshot,
    },
    #[serde(rename = "participant.joined", rename_all = "camelCase")]
    ParticipantJoined {
        session_id: String,
        participant: Participant,
    },
    #[serde(rename = "participant.answered", rename_all = "camelCase")]
    ParticipantAnswered {
        session_id: String,
        participant_id: String,
        score_result: ScoreResult,
    },
    #[serde(rename = "leaderboard.updated", rename_all = "camelCase")]
    LeaderboardUpdated {
        session_id: String,
        ranking: Vec<Participant>,
    },
}

impl SessionEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            SessionEvent::TimerChanged { .. } => "timer.changed",
            SessionEvent::ParticipantJoined { .. } => "participant.joined",
            SessionEvent::ParticipantAnswered { .. } => "participant.answered",
            SessionEvent::LeaderboardUpdated { .. } => "leaderboard.updated",
        }
    }

    /// Timer events are keyed by access code, the rest by session id.
    pub fn concerns(&self, session: &Session) -> bool {
        match self {
            SessionEvent::TimerChanged { session_code, .. } => {
                *session_code == session.access_code
            }
            SessionEvent::ParticipantJoined { session_id, .. }
            | SessionEvent::ParticipantAnswered { session_id, .. }
            | SessionEvent::LeaderboardUpdated { session_id, .. } => *session_id == session.id,
        }
    }

    pub fn to_sse_data(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
