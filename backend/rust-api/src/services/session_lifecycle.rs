use serde::Serialize;
use std::sync::Arc;

use crate::directory::SessionDirectory;
use crate::error::CoreResult;
use crate::utils::retry::RetryConfig;

use super::participant_registry::ParticipantRegistry;
use super::session_by_id;
use super::timer_engine::TimerEngine;

/// End-of-session housekeeping driven by the session layer.
#[derive(Clone)]
pub struct SessionLifecycle {
    sessions: Arc<dyn SessionDirectory>,
    timers: TimerEngine,
    registry: ParticipantRegistry,
    read_retry: RetryConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeReport {
    pub timers: u64,
    pub participant_keys: u64,
}

impl SessionLifecycle {
    pub fn new(
        sessions: Arc<dyn SessionDirectory>,
        timers: TimerEngine,
        registry: ParticipantRegistry,
        read_retry: RetryConfig,
    ) -> Self {
        Self {
            sessions,
            timers,
            registry,
            read_retry,
        }
    }

    /// Marks every unfinished participant as completed.
    pub async fn complete_session(&self, session_id: &str) -> CoreResult<usize> {
        let session =
            session_by_id(self.sessions.as_ref(), session_id, self.read_retry.clone()).await?;
        self.registry.complete_session(&session).await
    }

    /// Drops the timers and participant rows of a session. Called once the
    /// session is archived.
    pub async fn purge_session(&self, session_id: &str) -> CoreResult<PurgeReport> {
        let session =
            session_by_id(self.sessions.as_ref(), session_id, self.read_retry.clone()).await?;
        if !session.is_closed() {
            tracing::warn!(
                "Purging session {} while it is still {:?}",
                session.id,
                session.status
            );
        }

        let report = PurgeReport {
            timers: self.timers.purge_session(&session.access_code).await?,
            participant_keys: self.registry.purge_session(&session.id).await?,
        };
        tracing::info!(
            "Purged session {}: {} timers, {} participant keys",
            session.id,
            report.timers,
            report.participant_keys
        );
        Ok(report)
    }
}
