use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::participant::ParticipationKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Active,
    Paused,
    Completed,
    Archived,
}

/// Read-only view of a session, owned by the session persistence layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub access_code: String,
    pub status: SessionStatus,
    #[serde(default)]
    pub is_deferred: bool,
    pub deferred_available_from: Option<DateTime<Utc>>,
    pub deferred_available_to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub current_question_index: u32,
    #[serde(default)]
    pub question_count: u32,
}

impl Session {
    pub fn is_closed(&self) -> bool {
        matches!(
            self.status,
            SessionStatus::Completed | SessionStatus::Archived
        )
    }

    /// Whether `now` falls inside the replay window. Both bounds are
    /// inclusive; a missing bound leaves that side open.
    pub fn deferred_window_open(&self, now: DateTime<Utc>) -> bool {
        if !self.is_deferred {
            return false;
        }
        let after_start = self.deferred_available_from.map_or(true, |from| from <= now);
        let before_end = self.deferred_available_to.map_or(true, |to| now <= to);
        after_start && before_end
    }

    /// How a participant arriving at `now` takes part, if at all.
    pub fn admission(&self, now: DateTime<Utc>) -> Option<ParticipationKind> {
        if !self.is_closed() {
            Some(ParticipationKind::Live)
        } else if self.deferred_window_open(now) {
            Some(ParticipationKind::Deferred)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn session(status: SessionStatus, is_deferred: bool) -> Session {
        let from = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        Session {
            id: "s1".into(),
            access_code: "ABC123".into(),
            status,
            is_deferred,
            deferred_available_from: Some(from),
            deferred_available_to: Some(from + Duration::days(1)),
            current_question_index: 0,
            question_count: 3,
        }
    }

    #[test]
    fn open_sessions_admit_live_participants() {
        let s = session(SessionStatus::Pending, false);
        assert_eq!(s.admission(Utc::now()), Some(ParticipationKind::Live));
    }

    #[test]
    fn completed_session_without_replay_admits_nobody() {
        let s = session(SessionStatus::Completed, false);
        let inside = s.deferred_available_from.unwrap() + Duration::hours(1);
        assert_eq!(s.admission(inside), None);
    }

    #[test]
    fn missing_bounds_leave_window_open() {
        let mut s = session(SessionStatus::Archived, true);
        s.deferred_available_from = None;
        s.deferred_available_to = None;
        assert_eq!(s.admission(Utc::now()), Some(ParticipationKind::Deferred));
    }
}
