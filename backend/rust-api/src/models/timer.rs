use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, TransitionRejection};
use crate::utils::time::millis_between;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerStatus {
    Stop,
    Pause,
    Play,
}

impl TimerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerStatus::Stop => "stop",
            TimerStatus::Pause => "pause",
            TimerStatus::Play => "play",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerAction {
    Start,
    Pause,
    Edit,
    Stop,
    /// A participant answering while the timer runs.
    Answer,
}

impl TimerAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerAction::Start => "start",
            TimerAction::Pause => "pause",
            TimerAction::Edit => "edit",
            TimerAction::Stop => "stop",
            TimerAction::Answer => "answer",
        }
    }
}

/// An operator request against one timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerCommand {
    Start,
    Pause,
    Edit { duration_ms: i64 },
    Stop,
}

impl TimerCommand {
    pub fn action(&self) -> TimerAction {
        match self {
            TimerCommand::Start => TimerAction::Start,
            TimerCommand::Pause => TimerAction::Pause,
            TimerCommand::Edit { .. } => TimerAction::Edit,
            TimerCommand::Stop => TimerAction::Stop,
        }
    }
}

/// Persisted primitives of a question countdown. Elapsed and remaining time
/// are always derived from these, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub session_code: String,
    pub question_id: String,
    pub status: TimerStatus,
    pub duration_ms: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub total_play_time_ms: u64,
    pub last_state_change: DateTime<Utc>,
    pub last_changed_by: Option<String>,
}

/// Result of applying a command to a timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Changed(TimerState),
    Unchanged,
}

impl TimerState {
    pub fn stopped(
        session_code: &str,
        question_id: &str,
        duration_ms: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            session_code: session_code.to_string(),
            question_id: question_id.to_string(),
            status: TimerStatus::Stop,
            duration_ms,
            started_at: None,
            total_play_time_ms: 0,
            last_state_change: now,
            last_changed_by: None,
        }
    }

    pub fn elapsed_ms(&self, now: DateTime<Utc>) -> u64 {
        let running = match (self.status, self.started_at) {
            (TimerStatus::Play, Some(started_at)) => millis_between(started_at, now),
            _ => 0,
        };
        self.total_play_time_ms.saturating_add(running)
    }

    pub fn time_left_ms(&self, now: DateTime<Utc>) -> u64 {
        self.duration_ms.saturating_sub(self.elapsed_ms(now))
    }

    /// Pure state machine step.
    ///
    /// `stop -> play`, `pause -> play`, `play -> pause`, `{play,pause} -> stop`,
    /// `{pause,stop} -> edit`. Starting a running timer and pausing a timer
    /// that is not running are no-ops; editing a running timer is refused.
    pub fn apply(
        &self,
        command: TimerCommand,
        now: DateTime<Utc>,
        requested_by: &str,
    ) -> Result<Transition, CoreError> {
        let mut next = self.clone();
        next.last_changed_by = Some(requested_by.to_string());
        next.last_state_change = now;

        match (self.status, command) {
            (TimerStatus::Play, TimerCommand::Start) => Ok(Transition::Unchanged),
            (TimerStatus::Stop | TimerStatus::Pause, TimerCommand::Start) => {
                next.status = TimerStatus::Play;
                next.started_at = Some(now);
                Ok(Transition::Changed(next))
            }
            (TimerStatus::Play, TimerCommand::Pause) => {
                next.total_play_time_ms = self.elapsed_ms(now);
                next.status = TimerStatus::Pause;
                Ok(Transition::Changed(next))
            }
            (TimerStatus::Pause | TimerStatus::Stop, TimerCommand::Pause) => {
                Ok(Transition::Unchanged)
            }
            (TimerStatus::Play, TimerCommand::Edit { .. }) => {
                Err(self.rejected(command, TransitionRejection::EditWhilePlaying))
            }
            (TimerStatus::Pause | TimerStatus::Stop, TimerCommand::Edit { duration_ms }) => {
                if duration_ms <= 0 {
                    return Err(self.rejected(command, TransitionRejection::NonPositiveDuration));
                }
                next.duration_ms = duration_ms as u64;
                Ok(Transition::Changed(next))
            }
            (_, TimerCommand::Stop) => {
                next.status = TimerStatus::Stop;
                next.total_play_time_ms = 0;
                next.started_at = None;
                Ok(Transition::Changed(next))
            }
        }
    }

    pub fn rejected(&self, command: TimerCommand, reason: TransitionRejection) -> CoreError {
        CoreError::InvalidTimerTransition {
            status: self.status,
            action: command.action(),
            reason,
        }
    }

    pub fn snapshot(&self, version: u64, now: DateTime<Utc>) -> TimerSnapshot {
        let elapsed_ms = self.elapsed_ms(now);
        let time_left_ms = self.duration_ms.saturating_sub(elapsed_ms);
        let timer_end_at = match self.status {
            TimerStatus::Play => Some(now + Duration::milliseconds(time_left_ms as i64)),
            _ => None,
        };

        TimerSnapshot {
            session_code: self.session_code.clone(),
            question_id: self.question_id.clone(),
            status: self.status,
            duration_ms: self.duration_ms,
            started_at: self.started_at,
            total_play_time_ms: self.total_play_time_ms,
            last_state_change: self.last_state_change,
            last_changed_by: self.last_changed_by.clone(),
            elapsed_ms,
            time_left_ms,
            timer_end_at,
            version,
            observed_at: now,
        }
    }
}

/// Timer state as handed to callers and broadcast to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    pub session_code: String,
    pub question_id: String,
    pub status: TimerStatus,
    pub duration_ms: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub total_play_time_ms: u64,
    pub last_state_change: DateTime<Utc>,
    pub last_changed_by: Option<String>,
    pub elapsed_ms: u64,
    pub time_left_ms: u64,
    pub timer_end_at: Option<DateTime<Utc>>,
    pub version: u64,
    pub observed_at: DateTime<Utc>,
}
