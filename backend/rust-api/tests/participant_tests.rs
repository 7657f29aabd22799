use chrono::Duration;
use std::sync::Arc;

use livequiz_api::{
    models::{AnswerValue, GuestIdentity, ParticipationKind, SessionEvent, SessionStatus},
    store::{self, keys, KvStore, MemoryStore},
    CoreError,
};

mod common;

use common::{session, t0, RacingStore, TestHarness, CODE, QUESTION, SESSION_ID};

#[tokio::test]
async fn join_twice_keeps_one_row_and_its_score() {
    let h = TestHarness::new();
    let first = h.state.registry.join("user-alice", CODE, None).await.unwrap();
    assert_eq!(first.username, "alice");
    assert_eq!(first.kind, ParticipationKind::Live);
    assert_eq!(first.score, 0);

    h.state
        .scoring
        .submit_answer(SESSION_ID, &first.id, QUESTION, AnswerValue::Choice(1), None)
        .await
        .unwrap();

    h.clock.advance_ms(5_000);
    let second = h.state.registry.join("user-alice", CODE, None).await.unwrap();

    assert_eq!(second.id, first.id);
    assert_eq!(second.joined_at, t0() + Duration::milliseconds(5_000));
    assert!(second.score > 0);
    assert_eq!(second.answers.len(), 1);

    let rows = h.state.registry.participants(SESSION_ID).await.unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn three_concurrent_joins_create_one_participant() {
    let store = Arc::new(RacingStore::new("participant:", 3));
    let h = TestHarness::with_store(store.clone());
    let registry = &h.state.registry;

    store.arm(3);
    let (a, b, c) = tokio::join!(
        registry.join("user-bob", CODE, None),
        registry.join("user-bob", CODE, None),
        registry.join("user-bob", CODE, None),
    );
    let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());
    assert_eq!(a.id, b.id);
    assert_eq!(b.id, c.id);

    let rows = registry.participants(SESSION_ID).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].joined_at, t0());

    let index = store
        .scan_prefix(&keys::participant_index_prefix(SESSION_ID))
        .await
        .unwrap();
    assert_eq!(index.len(), 1);
}

#[tokio::test]
async fn unknown_users_get_a_guest_identity() {
    let store = Arc::new(MemoryStore::new());
    let h = TestHarness::with_store(store.clone());

    let participant = h
        .state
        .registry
        .join("7c9e6679-7425-40de-944b-e07fc1f90ae7", CODE, None)
        .await
        .unwrap();
    assert_eq!(participant.username, "guest-7c9e6679");

    let guest = store::load::<GuestIdentity>(
        store.as_ref(),
        &keys::guest("7c9e6679-7425-40de-944b-e07fc1f90ae7"),
    )
    .await
    .unwrap()
    .expect("guest record written with the participant");
    assert_eq!(guest.value.username, participant.username);
}

#[tokio::test]
async fn guest_username_can_be_chosen_and_is_reused() {
    let h = TestHarness::new();
    h.directory.insert_session({
        let mut other = session("session-other", "XYZ789", SessionStatus::Active);
        other.question_count = 1;
        other
    });

    let first = h
        .state
        .registry
        .join("guest-user", CODE, Some("Speedy"))
        .await
        .unwrap();
    let second = h
        .state
        .registry
        .join("guest-user", "XYZ789", Some("Other name"))
        .await
        .unwrap();

    assert_eq!(first.username, "Speedy");
    assert_eq!(second.username, "Speedy");
    assert_ne!(first.id, second.id);
}

#[tokio::test]
async fn registered_users_do_not_get_guest_records() {
    let store = Arc::new(MemoryStore::new());
    let h = TestHarness::with_store(store.clone());
    h.state.registry.join("user-alice", CODE, None).await.unwrap();

    assert!(store.get(&keys::guest("user-alice")).await.unwrap().is_none());
}

#[tokio::test]
async fn unknown_access_code_is_not_found() {
    let h = TestHarness::new();
    let err = h.state.registry.join("user-alice", "NOPE42", None).await.unwrap_err();
    assert!(matches!(err, CoreError::SessionNotFound(_)));
}

#[tokio::test]
async fn completed_session_without_replay_refuses_joins() {
    let h = TestHarness::new();
    h.directory.set_session_status(SESSION_ID, SessionStatus::Completed);

    let err = h.state.registry.join("user-alice", CODE, None).await.unwrap_err();
    assert!(matches!(err, CoreError::SessionNotJoinable { session_id } if session_id == SESSION_ID));
}

#[tokio::test]
async fn deferred_window_bounds_are_inclusive() {
    let h = TestHarness::new();
    let from = t0() + Duration::hours(1);
    let to = t0() + Duration::hours(2);
    let mut replay = session("session-replay", "RPL234", SessionStatus::Completed);
    replay.is_deferred = true;
    replay.deferred_available_from = Some(from);
    replay.deferred_available_to = Some(to);
    h.directory.insert_session(replay);

    let one_us = Duration::microseconds(1);
    let cases = [
        (from - one_us, false),
        (from, true),
        (to, true),
        (to + one_us, false),
    ];

    for (i, (at, admitted)) in cases.into_iter().enumerate() {
        h.clock.set(at);
        let result = h
            .state
            .registry
            .join(&format!("user-{}", i), "RPL234", None)
            .await;
        match (admitted, result) {
            (true, Ok(p)) => assert_eq!(p.kind, ParticipationKind::Deferred),
            (false, Err(CoreError::SessionNotJoinable { .. })) => {}
            (expected, other) => panic!("at {}: expected admitted={}, got {:?}", at, expected, other),
        }
    }
}

#[tokio::test]
async fn archived_session_keeps_refusing_after_window() {
    let h = TestHarness::new();
    let mut replay = session("session-old", "OLD567", SessionStatus::Archived);
    replay.is_deferred = true;
    replay.deferred_available_to = Some(t0() - Duration::seconds(1));
    h.directory.insert_session(replay);

    assert!(matches!(
        h.state.registry.join("user-alice", "OLD567", None).await,
        Err(CoreError::SessionNotJoinable { .. })
    ));
}

#[tokio::test]
async fn participant_lookup_by_id() {
    let h = TestHarness::new();
    let joined = h.state.registry.join("user-alice", CODE, None).await.unwrap();

    let found = h
        .state
        .registry
        .get_participant(SESSION_ID, &joined.id)
        .await
        .unwrap();
    assert_eq!(found, joined);

    let err = h
        .state
        .registry
        .get_participant(SESSION_ID, "missing")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ParticipantNotFound { .. }));
}

#[tokio::test]
async fn joins_are_broadcast() {
    let h = TestHarness::new();
    let mut events = h.state.broadcaster.subscribe();

    let joined = h.state.registry.join("user-alice", CODE, None).await.unwrap();

    match events.recv().await.unwrap() {
        SessionEvent::ParticipantJoined {
            session_id,
            participant,
        } => {
            assert_eq!(session_id, SESSION_ID);
            assert_eq!(participant.id, joined.id);
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn complete_session_stamps_unfinished_participants() {
    let h = TestHarness::new();
    h.state.registry.join("user-alice", CODE, None).await.unwrap();
    h.state.registry.join("user-bob", CODE, None).await.unwrap();
    h.clock.advance_ms(60_000);

    let completed = h.state.lifecycle.complete_session(SESSION_ID).await.unwrap();
    assert_eq!(completed, 2);

    for participant in h.state.registry.participants(SESSION_ID).await.unwrap() {
        assert_eq!(
            participant.completed_at,
            Some(t0() + Duration::milliseconds(60_000))
        );
    }

    // Second pass has nothing left to do
    assert_eq!(h.state.lifecycle.complete_session(SESSION_ID).await.unwrap(), 0);
}

#[tokio::test]
async fn purge_removes_timers_and_participants() {
    let store = Arc::new(MemoryStore::new());
    let h = TestHarness::with_store(store.clone());
    h.state.registry.join("user-alice", CODE, None).await.unwrap();
    h.state
        .timers
        .start(CODE, QUESTION, common::OPERATOR, None)
        .await
        .unwrap();
    h.directory.set_session_status(SESSION_ID, SessionStatus::Archived);

    let report = h.state.lifecycle.purge_session(SESSION_ID).await.unwrap();
    assert_eq!(report.timers, 1);
    assert_eq!(report.participant_keys, 2);
    assert!(h.state.registry.participants(SESSION_ID).await.unwrap().is_empty());
    assert_eq!(store.len(), 0);
}
