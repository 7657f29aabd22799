use std::collections::BTreeMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::directory::{SessionDirectory, UserDirectory};
use crate::error::{CoreError, CoreResult};
use crate::metrics::{record_cas_conflict, PARTICIPANTS_JOINED_TOTAL};
use crate::models::{GuestIdentity, Participant, ParticipantIndex, Session, SessionEvent};
use crate::store::{self, keys, CasOutcome, CasWrite, KvStore};
use crate::utils::retry::{retry_async_if, retry_async_with_config};
use crate::utils::time::Clock;

use super::broadcaster::SessionBroadcaster;
use super::participant_rows::ParticipantRows;
use super::{session_by_code, Attempt, EngineSettings};

/// Join and rejoin of participants, plus their lifecycle within a session.
#[derive(Clone)]
pub struct ParticipantRegistry {
    store: Arc<dyn KvStore>,
    sessions: Arc<dyn SessionDirectory>,
    users: Arc<dyn UserDirectory>,
    broadcaster: Arc<dyn SessionBroadcaster>,
    clock: Arc<dyn Clock>,
    rows: ParticipantRows,
    settings: EngineSettings,
}

struct Joined {
    participant: Participant,
    rejoined: bool,
}

impl ParticipantRegistry {
    pub fn new(
        store: Arc<dyn KvStore>,
        sessions: Arc<dyn SessionDirectory>,
        users: Arc<dyn UserDirectory>,
        broadcaster: Arc<dyn SessionBroadcaster>,
        clock: Arc<dyn Clock>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            rows: ParticipantRows::new(store.clone(), settings.clone()),
            store,
            sessions,
            users,
            broadcaster,
            clock,
            settings,
        }
    }

    /// Enrolls `user_id` in the session behind `access_code`.
    ///
    /// Joining twice returns the existing row with a fresh `joined_at` and
    /// its score and answers untouched. Users without an account get a guest
    /// identity written in the same atomic batch as their participant row.
    pub async fn join(
        &self,
        user_id: &str,
        access_code: &str,
        username: Option<&str>,
    ) -> CoreResult<Participant> {
        let session =
            session_by_code(self.sessions.as_ref(), access_code, self.settings.read_retry())
                .await?;

        let Some(kind) = session.admission(self.clock.now()) else {
            tracing::warn!(
                "User {} refused from session {} ({:?}, deferred={})",
                user_id,
                session.id,
                session.status,
                session.is_deferred
            );
            return Err(CoreError::SessionNotJoinable {
                session_id: session.id.clone(),
            });
        };

        let account = retry_async_with_config(self.settings.read_retry(), || {
            self.users.find_user(user_id)
        })
        .await
        .map_err(|err| CoreError::store_unavailable(keys::guest(user_id), err))?;
        let account_name = account.map(|a| a.username);

        let key = keys::participant(&session.id, user_id);
        let joined = retry_async_if(
            self.settings.cas_retry(),
            || async {
                let now = self.clock.now();

                if let Some(existing) =
                    store::load::<Participant>(self.store.as_ref(), &key).await?
                {
                    let mut participant = existing.value;
                    participant.joined_at = now;
                    return match store::put_if_version(
                        self.store.as_ref(),
                        &key,
                        existing.version,
                        &participant,
                    )
                    .await?
                    {
                        Some(_) => Ok(Joined {
                            participant,
                            rejoined: true,
                        }),
                        None => {
                            record_cas_conflict("participant");
                            Err(Attempt::Conflict)
                        }
                    };
                }

                let mut writes = Vec::with_capacity(3);
                let resolved_name = match &account_name {
                    Some(name) => name.clone(),
                    None => {
                        let guest_key = keys::guest(user_id);
                        match store::load::<GuestIdentity>(self.store.as_ref(), &guest_key).await? {
                            Some(guest) => guest.value.username,
                            None => {
                                let guest = GuestIdentity {
                                    user_id: user_id.to_string(),
                                    username: username
                                        .map(str::to_string)
                                        .unwrap_or_else(|| GuestIdentity::default_username(user_id)),
                                    created_at: now,
                                };
                                writes.push(CasWrite::create(guest_key, &guest)?);
                                guest.username
                            }
                        }
                    }
                };

                let participant = Participant {
                    id: Uuid::new_v4().to_string(),
                    session_id: session.id.clone(),
                    user_id: user_id.to_string(),
                    username: resolved_name,
                    kind,
                    score: 0,
                    answers: Vec::new(),
                    joined_at: now,
                    question_started_at: BTreeMap::new(),
                    completed_at: None,
                    rank: None,
                };
                let index = ParticipantIndex {
                    participant_id: participant.id.clone(),
                    user_id: user_id.to_string(),
                };
                writes.push(CasWrite::create(&key, &participant)?);
                writes.push(CasWrite::create(
                    keys::participant_index(&session.id, &participant.id),
                    &index,
                )?);

                match self.store.apply(writes).await? {
                    CasOutcome::Applied { .. } => Ok(Joined {
                        participant,
                        rejoined: false,
                    }),
                    CasOutcome::Conflict { key: conflicted } => {
                        record_cas_conflict("participant");
                        tracing::debug!("Join of {} lost the race on {}", user_id, conflicted);
                        Err(Attempt::Conflict)
                    }
                }
            },
            Attempt::decision,
        )
        .await
        .map_err(|attempt| attempt.into_core(&key))?;

        let label = if joined.rejoined { "rejoin" } else { kind.as_str() };
        PARTICIPANTS_JOINED_TOTAL.with_label_values(&[label]).inc();
        tracing::info!(
            "User {} {} session {} as participant {} ({})",
            user_id,
            if joined.rejoined { "rejoined" } else { "joined" },
            session.id,
            joined.participant.id,
            kind.as_str()
        );

        self.broadcaster
            .publish(SessionEvent::ParticipantJoined {
                session_id: session.id.clone(),
                participant: joined.participant.clone(),
            })
            .await;

        Ok(joined.participant)
    }

    pub async fn get_participant(
        &self,
        session_id: &str,
        participant_id: &str,
    ) -> CoreResult<Participant> {
        Ok(self.rows.find_by_id(session_id, participant_id).await?.value)
    }

    /// Participants of a session in store order.
    pub async fn participants(&self, session_id: &str) -> CoreResult<Vec<Participant>> {
        self.rows.list(session_id).await
    }

    /// Stamps `completed_at` on every participant that has not finished yet.
    /// Returns how many rows changed.
    pub async fn complete_session(&self, session: &Session) -> CoreResult<usize> {
        let now = self.clock.now();
        let mut completed = 0;

        for participant in self.rows.list(&session.id).await? {
            if participant.completed_at.is_some() {
                continue;
            }
            let updated = self
                .rows
                .update(&session.id, &participant.id, &participant.user_id, |row| {
                    if row.completed_at.is_some() {
                        return Ok(None);
                    }
                    let mut next = row.clone();
                    next.completed_at = Some(now);
                    Ok(Some(next))
                })
                .await?;
            if updated.completed_at == Some(now) {
                completed += 1;
            }
        }

        tracing::info!("Completed {} participants in session {}", completed, session.id);
        Ok(completed)
    }

    pub async fn purge_session(&self, session_id: &str) -> CoreResult<u64> {
        self.rows.purge(session_id).await
    }
}
