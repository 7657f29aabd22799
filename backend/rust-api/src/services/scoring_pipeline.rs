use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::directory::{QuestionBank, QuestionInfo, SessionDirectory};
use crate::error::{CoreError, CoreResult, TransitionRejection};
use crate::metrics::ANSWERS_SUBMITTED_TOTAL;
use crate::models::{
    AnswerRecord, AnswerValue, Participant, ParticipationKind, QuestionStart, ScoreResult,
    Session, SessionEvent, TimerAction, TimerState, TimerStatus,
};
use crate::store::{keys, KvStore};
use crate::utils::retry::retry_async_with_config;
use crate::utils::time::{millis_between, Clock};

use super::broadcaster::SessionBroadcaster;
use super::participant_rows::{rank_participants, ParticipantRows};
use super::scoring_policy::ScoringPolicy;
use super::{read_record, session_by_id, EngineSettings};

/// Scores answers and keeps cumulative participant scores.
#[derive(Clone)]
pub struct ScoringPipeline {
    store: Arc<dyn KvStore>,
    sessions: Arc<dyn SessionDirectory>,
    questions: Arc<dyn QuestionBank>,
    broadcaster: Arc<dyn SessionBroadcaster>,
    clock: Arc<dyn Clock>,
    policy: Arc<dyn ScoringPolicy>,
    rows: ParticipantRows,
    settings: EngineSettings,
}

impl ScoringPipeline {
    pub fn new(
        store: Arc<dyn KvStore>,
        sessions: Arc<dyn SessionDirectory>,
        questions: Arc<dyn QuestionBank>,
        broadcaster: Arc<dyn SessionBroadcaster>,
        clock: Arc<dyn Clock>,
        policy: Arc<dyn ScoringPolicy>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            rows: ParticipantRows::new(store.clone(), settings.clone()),
            store,
            sessions,
            questions,
            broadcaster,
            clock,
            policy,
            settings,
        }
    }

    /// Marks a question as served to one participant. The first call wins;
    /// opening the same question again, or rejoining, keeps the original
    /// start so latency cannot be reset.
    pub async fn open_question(
        &self,
        session_id: &str,
        participant_id: &str,
        question_id: &str,
    ) -> CoreResult<QuestionStart> {
        let session =
            session_by_id(self.sessions.as_ref(), session_id, self.settings.read_retry()).await?;
        let now = self.clock.now();
        if session.admission(now).is_none() {
            return Err(CoreError::SessionNotJoinable {
                session_id: session_id.to_string(),
            });
        }

        let participant = self.rows.find_by_id(session_id, participant_id).await?.value;
        let duration_ms = self.question_duration(self.question(question_id).await?.as_ref());

        let updated = self
            .rows
            .update(session_id, participant_id, &participant.user_id, |row| {
                if row.question_started_at(question_id).is_some() {
                    return Ok(None);
                }
                let mut next = row.clone();
                next.question_started_at.insert(question_id.to_string(), now);
                Ok(Some(next))
            })
            .await?;

        let started_at = updated.question_started_at(question_id).unwrap_or(now);
        tracing::debug!(
            "Question {} opened for {} at {}",
            question_id,
            participant_id,
            started_at
        );

        Ok(QuestionStart {
            participant_id: participant_id.to_string(),
            question_id: question_id.to_string(),
            started_at,
            duration_ms,
        })
    }

    /// Scores one answer and appends it to the participant's history.
    ///
    /// The first answer per question wins; a second one is refused with
    /// `DuplicateAnswer` and leaves the score untouched. Latency always comes
    /// from server time; `client_timestamp` is only logged.
    pub async fn submit_answer(
        &self,
        session_id: &str,
        participant_id: &str,
        question_id: &str,
        value: AnswerValue,
        client_timestamp: Option<DateTime<Utc>>,
    ) -> CoreResult<ScoreResult> {
        let session =
            session_by_id(self.sessions.as_ref(), session_id, self.settings.read_retry()).await?;
        let received_at = self.clock.now();

        if session.admission(received_at).is_none() {
            tracing::warn!(
                "Answer from {} refused: session {} is {:?}",
                participant_id,
                session_id,
                session.status
            );
            return Err(CoreError::SessionNotJoinable {
                session_id: session_id.to_string(),
            });
        }

        let participant = self.rows.find_by_id(session_id, participant_id).await?.value;
        if participant.has_answered(question_id) {
            return Err(duplicate(participant_id, question_id));
        }

        if let Some(sent_at) = client_timestamp {
            tracing::debug!(
                "Answer from {} sent at {}, received at {}",
                participant_id,
                sent_at,
                received_at
            );
        }

        let question = self.question(question_id).await?;
        let duration_ms = self.question_duration(question.as_ref());
        let is_correct = match &question {
            Some(q) => q.answer_key.is_correct(&value),
            None => {
                tracing::warn!("No answer key for question {}, scoring as incorrect", question_id);
                false
            }
        };

        let time_taken_ms = self
            .latency(&session, &participant, question_id, duration_ms, received_at)
            .await?;
        let awarded_score = self
            .policy
            .award(is_correct, time_taken_ms, duration_ms)
            .min(self.policy.max_award());

        let record = AnswerRecord {
            question_id: question_id.to_string(),
            submitted_value: value,
            is_correct,
            time_taken_ms,
            awarded_score,
            submitted_at: received_at,
        };
        let question_count = session.question_count as usize;

        let updated = self
            .rows
            .update(session_id, participant_id, &participant.user_id, |row| {
                if row.has_answered(question_id) {
                    return Err(duplicate(participant_id, question_id));
                }
                let mut next = row.clone();
                next.answers.push(record.clone());
                next.score = next.score.saturating_add(awarded_score);
                if next.completed_at.is_none()
                    && question_count > 0
                    && next.answers.len() >= question_count
                {
                    next.completed_at = Some(received_at);
                }
                Ok(Some(next))
            })
            .await
            .inspect_err(|err| {
                if let CoreError::DuplicateAnswer { .. } = err {
                    tracing::warn!(
                        "Duplicate answer from {} for {} lost the race",
                        participant_id,
                        question_id
                    );
                }
            })?;

        ANSWERS_SUBMITTED_TOTAL
            .with_label_values(&[if is_correct { "true" } else { "false" }])
            .inc();

        let result = ScoreResult {
            participant_id: participant_id.to_string(),
            question_id: question_id.to_string(),
            is_correct,
            awarded_score,
            total_score: updated.score,
            time_taken_ms,
            completed: updated.completed_at.is_some(),
        };

        tracing::info!(
            "Participant {} answered {} in session {}: correct={} +{} total={}",
            participant_id,
            question_id,
            session_id,
            is_correct,
            awarded_score,
            updated.score
        );

        self.broadcaster
            .publish(SessionEvent::ParticipantAnswered {
                session_id: session_id.to_string(),
                participant_id: participant_id.to_string(),
                score_result: result.clone(),
            })
            .await;

        // The answer is already stored; a failed leaderboard read only
        // skips the broadcast.
        match self.rank(session_id).await {
            Ok(ranking) => {
                self.broadcaster
                    .publish(SessionEvent::LeaderboardUpdated {
                        session_id: session_id.to_string(),
                        ranking,
                    })
                    .await
            }
            Err(err) => tracing::warn!("Leaderboard refresh for {} skipped: {}", session_id, err),
        }

        Ok(result)
    }

    /// Participants ordered by score, earlier joiners first on ties.
    pub async fn rank(&self, session_id: &str) -> CoreResult<Vec<Participant>> {
        Ok(rank_participants(self.rows.list(session_id).await?))
    }

    async fn question(&self, question_id: &str) -> CoreResult<Option<QuestionInfo>> {
        retry_async_with_config(self.settings.read_retry(), || {
            self.questions.question(question_id)
        })
        .await
        .map_err(|err| CoreError::store_unavailable(format!("question:{}", question_id), err))
    }

    fn question_duration(&self, question: Option<&QuestionInfo>) -> u64 {
        question
            .map(|q| q.duration_ms)
            .unwrap_or(self.settings.default_question_duration_ms)
    }

    /// Time the participant took. Live participants are measured on the
    /// question timer and may only answer while it plays. Replays, and live
    /// questions without a timer, are measured from the participant's own
    /// question start; an unopened question earns no time bonus.
    async fn latency(
        &self,
        session: &Session,
        participant: &Participant,
        question_id: &str,
        duration_ms: u64,
        received_at: DateTime<Utc>,
    ) -> CoreResult<u64> {
        if participant.kind == ParticipationKind::Live {
            let key = keys::timer(&session.access_code, question_id);
            if let Some(timer) =
                read_record::<TimerState>(self.store.as_ref(), &key, self.settings.read_retry())
                    .await?
            {
                let timer = timer.value;
                if timer.status != TimerStatus::Play || timer.time_left_ms(received_at) == 0 {
                    tracing::warn!(
                        "Answer from {} for {} refused: timer is {} with {}ms left",
                        participant.id,
                        question_id,
                        timer.status.as_str(),
                        timer.time_left_ms(received_at)
                    );
                    return Err(CoreError::InvalidTimerTransition {
                        status: timer.status,
                        action: TimerAction::Answer,
                        reason: TransitionRejection::AnswerWindowClosed,
                    });
                }
                return Ok(timer.elapsed_ms(received_at).min(duration_ms));
            }
        }

        match participant.question_started_at(question_id) {
            Some(started_at) => Ok(millis_between(started_at, received_at).min(duration_ms)),
            None => {
                tracing::debug!(
                    "Question {} was never opened for {}, no time bonus",
                    question_id,
                    participant.id
                );
                Ok(duration_ms)
            }
        }
    }
}

fn duplicate(participant_id: &str, question_id: &str) -> CoreError {
    CoreError::DuplicateAnswer {
        participant_id: participant_id.to_string(),
        question_id: question_id.to_string(),
    }
}
