use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A participant's submitted value for one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AnswerValue {
    Choice(u32),
    Choices(Vec<u32>),
    Numeric(f64),
    Text(String),
}

/// Canonical answer for a question, supplied by the question bank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnswerKey {
    Choices { correct: Vec<u32> },
    Numeric { value: f64, tolerance: f64 },
    Text { accepted: Vec<String> },
}

impl AnswerKey {
    pub fn is_correct(&self, submitted: &AnswerValue) -> bool {
        match (self, submitted) {
            (AnswerKey::Choices { correct }, AnswerValue::Choice(index)) => {
                correct.contains(index)
            }
            (AnswerKey::Choices { correct }, AnswerValue::Choices(indices)) => {
                let mut expected = correct.clone();
                expected.sort_unstable();
                expected.dedup();
                let mut given = indices.clone();
                given.sort_unstable();
                given.dedup();
                !given.is_empty() && expected == given
            }
            (AnswerKey::Numeric { value, tolerance }, AnswerValue::Numeric(given)) => {
                given.is_finite() && (given - value).abs() <= tolerance.abs()
            }
            (AnswerKey::Numeric { value, tolerance }, AnswerValue::Text(text)) => text
                .trim()
                .replace(',', ".")
                .parse::<f64>()
                .map(|given| given.is_finite() && (given - value).abs() <= tolerance.abs())
                .unwrap_or(false),
            (AnswerKey::Text { accepted }, AnswerValue::Text(text)) => {
                let given = text.trim().to_lowercase();
                accepted
                    .iter()
                    .any(|candidate| candidate.trim().to_lowercase() == given)
            }
            _ => false,
        }
    }
}

/// One scored answer, appended to a participant's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    pub question_id: String,
    pub submitted_value: AnswerValue,
    pub is_correct: bool,
    pub time_taken_ms: u64,
    pub awarded_score: u64,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreResult {
    pub participant_id: String,
    pub question_id: String,
    pub is_correct: bool,
    pub awarded_score: u64,
    pub total_score: u64,
    pub time_taken_ms: u64,
    pub completed: bool,
}
