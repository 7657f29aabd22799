use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::answer::AnswerRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipationKind {
    Live,
    Deferred,
}

impl ParticipationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipationKind::Live => "live",
            ParticipationKind::Deferred => "deferred",
        }
    }
}

/// A user's enrollment and running state within one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    pub session_id: String,
    pub user_id: String,
    pub username: String,
    pub kind: ParticipationKind,
    pub score: u64,
    #[serde(default)]
    pub answers: Vec<AnswerRecord>,
    pub joined_at: DateTime<Utc>,
    /// When each question was first served to this participant. Latency
    /// without a live timer is measured from here.
    #[serde(default)]
    pub question_started_at: BTreeMap<String, DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub rank: Option<u32>,
}

impl Participant {
    pub fn question_started_at(&self, question_id: &str) -> Option<DateTime<Utc>> {
        self.question_started_at.get(question_id).copied()
    }

    pub fn answer_for(&self, question_id: &str) -> Option<&AnswerRecord> {
        self.answers.iter().find(|a| a.question_id == question_id)
    }

    pub fn has_answered(&self, question_id: &str) -> bool {
        self.answer_for(question_id).is_some()
    }
}

/// Start of a participant's own answer window on one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionStart {
    pub participant_id: String,
    pub question_id: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Minimal identity created for users without an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestIdentity {
    pub user_id: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

impl GuestIdentity {
    pub fn default_username(user_id: &str) -> String {
        format!("guest-{}", user_id.chars().take(8).collect::<String>())
    }
}

/// Maps a participant id back to the user that owns the row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantIndex {
    pub participant_id: String,
    pub user_id: String,
}
