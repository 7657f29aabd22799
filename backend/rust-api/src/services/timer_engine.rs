//! Countdown state machine for each `(session code, question)` pair.
//!
//! Every operation is a read-modify-write on `timer:{code}:{question}`. The
//! write is conditional on the version that was read, so two operators
//! racing on the same timer serialize through the store instead of losing
//! an update. Different timers never contend with each other.

use std::sync::Arc;

use crate::directory::{QuestionBank, SessionDirectory};
use crate::error::{CoreError, CoreResult, StoreError, TransitionRejection};
use crate::metrics::{record_cas_conflict, TIMER_ACTIONS_TOTAL};
use crate::models::{SessionEvent, TimerCommand, TimerSnapshot, TimerState, Transition};
use crate::store::{self, keys, KvStore};
use crate::utils::retry::retry_async_if;
use crate::utils::time::Clock;

use super::broadcaster::SessionBroadcaster;
use super::{read_record, session_by_code, Attempt, EngineSettings};

#[derive(Clone)]
pub struct TimerEngine {
    store: Arc<dyn KvStore>,
    sessions: Arc<dyn SessionDirectory>,
    questions: Arc<dyn QuestionBank>,
    broadcaster: Arc<dyn SessionBroadcaster>,
    clock: Arc<dyn Clock>,
    settings: EngineSettings,
}

impl TimerEngine {
    pub fn new(
        store: Arc<dyn KvStore>,
        sessions: Arc<dyn SessionDirectory>,
        questions: Arc<dyn QuestionBank>,
        broadcaster: Arc<dyn SessionBroadcaster>,
        clock: Arc<dyn Clock>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            sessions,
            questions,
            broadcaster,
            clock,
            settings,
        }
    }

    /// Starts or resumes the countdown. Starting a running timer returns it
    /// unchanged. With `expected_version`, the write only happens if the
    /// stored record is still at that version.
    pub async fn start(
        &self,
        session_code: &str,
        question_id: &str,
        requested_by: &str,
        expected_version: Option<u64>,
    ) -> CoreResult<TimerSnapshot> {
        self.execute(
            session_code,
            question_id,
            TimerCommand::Start,
            requested_by,
            expected_version,
        )
        .await
    }

    pub async fn pause(
        &self,
        session_code: &str,
        question_id: &str,
        requested_by: &str,
    ) -> CoreResult<TimerSnapshot> {
        self.execute(session_code, question_id, TimerCommand::Pause, requested_by, None)
            .await
    }

    /// Changes the configured duration of a paused or stopped timer.
    pub async fn edit(
        &self,
        session_code: &str,
        question_id: &str,
        duration_ms: i64,
        requested_by: &str,
    ) -> CoreResult<TimerSnapshot> {
        self.execute(
            session_code,
            question_id,
            TimerCommand::Edit { duration_ms },
            requested_by,
            None,
        )
        .await
    }

    /// Resets the timer. Also used when moving to the next question.
    pub async fn stop(
        &self,
        session_code: &str,
        question_id: &str,
        requested_by: &str,
    ) -> CoreResult<TimerSnapshot> {
        self.execute(session_code, question_id, TimerCommand::Stop, requested_by, None)
            .await
    }

    /// Current timer with derived fields recomputed at the time of the call.
    pub async fn get_state(
        &self,
        session_code: &str,
        question_id: &str,
    ) -> CoreResult<TimerSnapshot> {
        let (state, version) = self.read_state(session_code, question_id).await?;
        Ok(state.snapshot(version, self.clock.now()))
    }

    /// Stored timer and its version. A timer that was never written reads as
    /// a stopped one with the question's duration at version 0.
    pub async fn read_state(
        &self,
        session_code: &str,
        question_id: &str,
    ) -> CoreResult<(TimerState, u64)> {
        let key = keys::timer(session_code, question_id);
        match read_record::<TimerState>(self.store.as_ref(), &key, self.settings.read_retry())
            .await?
        {
            Some(record) => Ok((record.value, record.version)),
            None => {
                let duration_ms = self
                    .question_duration(question_id)
                    .await
                    .map_err(|err| CoreError::store_unavailable(&key, err))?;
                Ok((
                    TimerState::stopped(session_code, question_id, duration_ms, self.clock.now()),
                    0,
                ))
            }
        }
    }

    /// Removes every timer of a session.
    pub async fn purge_session(&self, session_code: &str) -> CoreResult<u64> {
        let prefix = keys::timer_prefix(session_code);
        self.store
            .delete_prefix(&prefix)
            .await
            .map_err(|err| CoreError::store_unavailable(prefix, err))
    }

    async fn execute(
        &self,
        session_code: &str,
        question_id: &str,
        command: TimerCommand,
        requested_by: &str,
        expected_version: Option<u64>,
    ) -> CoreResult<TimerSnapshot> {
        let action = command.action().as_str();
        let session =
            session_by_code(self.sessions.as_ref(), session_code, self.settings.read_retry())
                .await
                .inspect_err(|_| {
                    TIMER_ACTIONS_TOTAL
                        .with_label_values(&[action, "rejected"])
                        .inc();
                })?;

        if session.is_closed() {
            let (state, _) = self.read_state(session_code, question_id).await?;
            TIMER_ACTIONS_TOTAL
                .with_label_values(&[action, "rejected"])
                .inc();
            tracing::warn!(
                "Rejected {} on timer {}/{}: session {} is {:?}",
                action,
                session_code,
                question_id,
                session.id,
                session.status
            );
            return Err(state.rejected(command, TransitionRejection::SessionClosed));
        }

        let key = keys::timer(session_code, question_id);
        let result = retry_async_if(
            self.settings.cas_retry(),
            || self.attempt(&key, session_code, question_id, command, requested_by, expected_version),
            Attempt::decision,
        )
        .await;

        match result {
            Ok((snapshot, changed)) => {
                let outcome = if changed { "changed" } else { "unchanged" };
                TIMER_ACTIONS_TOTAL
                    .with_label_values(&[action, outcome])
                    .inc();

                if changed {
                    tracing::info!(
                        "Timer {} {} by {}: status={} elapsed={}ms left={}ms v{}",
                        key,
                        action,
                        requested_by,
                        snapshot.status.as_str(),
                        snapshot.elapsed_ms,
                        snapshot.time_left_ms,
                        snapshot.version
                    );
                    self.broadcaster
                        .publish(SessionEvent::TimerChanged {
                            session_code: session_code.to_string(),
                            question_id: question_id.to_string(),
                            state: snapshot.clone(),
                        })
                        .await;
                } else {
                    tracing::debug!("Timer {} {} was a no-op", key, action);
                }

                Ok(snapshot)
            }
            Err(attempt) => {
                let outcome = match attempt {
                    Attempt::Conflict => "conflict",
                    Attempt::Store(_) => "unavailable",
                    Attempt::Fatal(_) => "rejected",
                };
                TIMER_ACTIONS_TOTAL
                    .with_label_values(&[action, outcome])
                    .inc();
                let err = attempt.into_core(&key);
                match err {
                    CoreError::InvalidTimerTransition { .. } => {
                        tracing::warn!("Timer {} {} refused: {}", key, action, err)
                    }
                    _ => tracing::error!("Timer {} {} failed: {}", key, action, err),
                }
                Err(err)
            }
        }
    }

    /// One read, transition and conditional write.
    async fn attempt(
        &self,
        key: &str,
        session_code: &str,
        question_id: &str,
        command: TimerCommand,
        requested_by: &str,
        expected_version: Option<u64>,
    ) -> Result<(TimerSnapshot, bool), Attempt> {
        let (state, version) = match store::load::<TimerState>(self.store.as_ref(), key).await? {
            Some(record) => (record.value, record.version),
            None => {
                let duration_ms = self.question_duration(question_id).await?;
                (
                    TimerState::stopped(session_code, question_id, duration_ms, self.clock.now()),
                    0,
                )
            }
        };

        if let Some(expected) = expected_version {
            if expected != version {
                tracing::warn!(
                    "Timer {} is at v{}, caller expected v{}",
                    key,
                    version,
                    expected
                );
                return Err(Attempt::Fatal(CoreError::ConcurrentUpdateConflict {
                    key: key.to_string(),
                }));
            }
        }

        let now = self.clock.now();
        match state.apply(command, now, requested_by)? {
            Transition::Unchanged => Ok((state.snapshot(version, now), false)),
            Transition::Changed(next) => {
                match store::put_if_version(self.store.as_ref(), key, version, &next).await? {
                    Some(new_version) => Ok((next.snapshot(new_version, now), true)),
                    None => {
                        record_cas_conflict("timer");
                        tracing::warn!("Version conflict on {} at v{}, retrying", key, version);
                        Err(Attempt::Conflict)
                    }
                }
            }
        }
    }

    async fn question_duration(&self, question_id: &str) -> Result<u64, StoreError> {
        Ok(self
            .questions
            .question(question_id)
            .await?
            .map(|q| q.duration_ms)
            .unwrap_or(self.settings.default_question_duration_ms))
    }
}
