use std::cmp::Ordering;
use std::sync::Arc;

use crate::error::{CoreError, CoreResult};
use crate::metrics::record_cas_conflict;
use crate::models::{Participant, ParticipantIndex};
use crate::store::{self, keys, KvStore, Versioned};
use crate::utils::retry::{retry_async_if, retry_async_with_config};

use super::{read_record, Attempt, EngineSettings};

/// Versioned access to participant rows, shared by the registry and the
/// scoring pipeline.
#[derive(Clone)]
pub(crate) struct ParticipantRows {
    store: Arc<dyn KvStore>,
    settings: EngineSettings,
}

impl ParticipantRows {
    pub(crate) fn new(store: Arc<dyn KvStore>, settings: EngineSettings) -> Self {
        Self { store, settings }
    }

    /// Resolves a participant id through its index record.
    pub(crate) async fn find_by_id(
        &self,
        session_id: &str,
        participant_id: &str,
    ) -> CoreResult<Versioned<Participant>> {
        let not_found = || CoreError::ParticipantNotFound {
            session_id: session_id.to_string(),
            participant_id: participant_id.to_string(),
        };

        let index_key = keys::participant_index(session_id, participant_id);
        let index = read_record::<ParticipantIndex>(
            self.store.as_ref(),
            &index_key,
            self.settings.read_retry(),
        )
        .await?
        .ok_or_else(not_found)?;

        let key = keys::participant(session_id, &index.value.user_id);
        read_record::<Participant>(self.store.as_ref(), &key, self.settings.read_retry())
            .await?
            .ok_or_else(not_found)
    }

    pub(crate) async fn list(&self, session_id: &str) -> CoreResult<Vec<Participant>> {
        let prefix = keys::participant_prefix(session_id);
        let rows = retry_async_with_config(self.settings.read_retry(), || {
            store::load_prefix::<Participant>(self.store.as_ref(), &prefix)
        })
        .await
        .map_err(|err| CoreError::store_unavailable(&prefix, err))?;

        Ok(rows.into_iter().map(|row| row.value).collect())
    }

    /// Optimistic read-modify-write of one row. `mutate` returns `None` when
    /// the row needs no change; it may run several times.
    pub(crate) async fn update<F>(
        &self,
        session_id: &str,
        participant_id: &str,
        user_id: &str,
        mutate: F,
    ) -> CoreResult<Participant>
    where
        F: Fn(&Participant) -> CoreResult<Option<Participant>>,
    {
        let key = keys::participant(session_id, user_id);
        retry_async_if(
            self.settings.cas_retry(),
            || async {
                let current = store::load::<Participant>(self.store.as_ref(), &key)
                    .await?
                    .ok_or_else(|| CoreError::ParticipantNotFound {
                        session_id: session_id.to_string(),
                        participant_id: participant_id.to_string(),
                    })?;

                let Some(next) = mutate(&current.value)? else {
                    return Ok(current.value);
                };

                match store::put_if_version(self.store.as_ref(), &key, current.version, &next)
                    .await?
                {
                    Some(_) => Ok(next),
                    None => {
                        record_cas_conflict("participant");
                        tracing::warn!(
                            "Version conflict on {} at v{}, retrying",
                            key,
                            current.version
                        );
                        Err(Attempt::Conflict)
                    }
                }
            },
            Attempt::decision,
        )
        .await
        .map_err(|attempt| attempt.into_core(&key))
    }

    pub(crate) async fn purge(&self, session_id: &str) -> CoreResult<u64> {
        let mut removed = 0;
        for prefix in [
            keys::participant_prefix(session_id),
            keys::participant_index_prefix(session_id),
        ] {
            removed += self
                .store
                .delete_prefix(&prefix)
                .await
                .map_err(|err| CoreError::store_unavailable(&prefix, err))?;
        }
        Ok(removed)
    }
}

/// Leaderboard order: score descending, then earlier joiners, then id so the
/// result never depends on store iteration order.
pub(crate) fn leaderboard_order(a: &Participant, b: &Participant) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| a.joined_at.cmp(&b.joined_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Sorts participants and stamps their 1-based rank.
pub(crate) fn rank_participants(mut participants: Vec<Participant>) -> Vec<Participant> {
    participants.sort_by(leaderboard_order);
    for (position, participant) in participants.iter_mut().enumerate() {
        participant.rank = Some(position as u32 + 1);
    }
    participants
}
