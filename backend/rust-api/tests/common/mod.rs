#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Barrier;

use livequiz_api::{
    config::Config,
    create_router,
    directory::{InMemoryDirectory, QuestionInfo, UserAccount},
    models::{AnswerKey, Session, SessionStatus},
    services::{AppState, Collaborators},
    store::{CasOutcome, CasWrite, KvStore, MemoryStore, VersionedRaw},
    utils::time::ManualClock,
    StoreError,
};

pub const CODE: &str = "ABC123";
pub const SESSION_ID: &str = "session-abc";
pub const QUESTION: &str = "q1";
pub const QUESTION_2: &str = "q2";
pub const OPERATOR: &str = "host-1";

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

pub fn session(id: &str, code: &str, status: SessionStatus) -> Session {
    Session {
        id: id.to_string(),
        access_code: code.to_string(),
        status,
        is_deferred: false,
        deferred_available_from: None,
        deferred_available_to: None,
        current_question_index: 0,
        question_count: 2,
    }
}

pub struct TestHarness {
    pub state: Arc<AppState>,
    pub directory: Arc<InMemoryDirectory>,
    pub clock: Arc<ManualClock>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    /// Active session `ABC123` with two 30s questions. `q1` is single
    /// choice with answer 1, `q2` is numeric 42.
    pub fn with_store(store: Arc<dyn KvStore>) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();

        let directory = Arc::new(InMemoryDirectory::new());
        directory.insert_session(session(SESSION_ID, CODE, SessionStatus::Active));
        directory.insert_question(QuestionInfo {
            id: QUESTION.to_string(),
            answer_key: AnswerKey::Choices { correct: vec![1] },
            duration_ms: 30_000,
        });
        directory.insert_question(QuestionInfo {
            id: QUESTION_2.to_string(),
            answer_key: AnswerKey::Numeric {
                value: 42.0,
                tolerance: 0.0,
            },
            duration_ms: 30_000,
        });
        directory.insert_user(UserAccount {
            id: "user-alice".to_string(),
            username: "alice".to_string(),
        });
        directory.insert_user(UserAccount {
            id: "user-bob".to_string(),
            username: "bob".to_string(),
        });

        let clock = Arc::new(ManualClock::new(t0()));
        let collaborators = Collaborators {
            sessions: directory.clone(),
            questions: directory.clone(),
            users: directory.clone(),
        };
        let state = Arc::new(AppState::from_parts(
            Config::default(),
            store,
            collaborators,
            clock.clone(),
        ));

        Self {
            state,
            directory,
            clock,
        }
    }

    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }
}

/// Memory store whose next `armed` reads of keys under `prefix` wait for
/// each other, so racing writers all see the same version.
pub struct RacingStore {
    inner: MemoryStore,
    prefix: String,
    armed: AtomicUsize,
    barrier: Barrier,
}

impl RacingStore {
    pub fn new(prefix: &str, parties: usize) -> Self {
        Self {
            inner: MemoryStore::new(),
            prefix: prefix.to_string(),
            armed: AtomicUsize::new(0),
            barrier: Barrier::new(parties),
        }
    }

    /// Gates the next `reads` matching reads. Must be a multiple of the
    /// party count.
    pub fn arm(&self, reads: usize) {
        self.armed.store(reads, Ordering::SeqCst);
    }
}

#[async_trait]
impl KvStore for RacingStore {
    async fn get(&self, key: &str) -> Result<Option<VersionedRaw>, StoreError> {
        let raw = self.inner.get(key).await?;
        if key.starts_with(&self.prefix)
            && self
                .armed
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            self.barrier.wait().await;
        }
        Ok(raw)
    }

    async fn apply(&self, writes: Vec<CasWrite>) -> Result<CasOutcome, StoreError> {
        self.inner.apply(writes).await
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, VersionedRaw)>, StoreError> {
        self.inner.scan_prefix(prefix).await
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, StoreError> {
        self.inner.delete_prefix(prefix).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Store that is always down. Counts calls.
#[derive(Default)]
pub struct FailingStore {
    pub gets: AtomicUsize,
    pub applies: AtomicUsize,
}

#[async_trait]
impl KvStore for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<VersionedRaw>, StoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Timeout { operation: "get" })
    }

    async fn apply(&self, _writes: Vec<CasWrite>) -> Result<CasOutcome, StoreError> {
        self.applies.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Backend("connection refused".to_string()))
    }

    async fn scan_prefix(&self, _prefix: &str) -> Result<Vec<(String, VersionedRaw)>, StoreError> {
        Err(StoreError::Timeout { operation: "scan" })
    }

    async fn delete_prefix(&self, _prefix: &str) -> Result<u64, StoreError> {
        Err(StoreError::Timeout { operation: "delete" })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Err(StoreError::Backend("connection refused".to_string()))
    }
}

/// Reads work, but every conditional write loses to a phantom writer.
#[derive(Default)]
pub struct ContendedStore {
    inner: MemoryStore,
    pub applies: AtomicUsize,
}

#[async_trait]
impl KvStore for ContendedStore {
    async fn get(&self, key: &str) -> Result<Option<VersionedRaw>, StoreError> {
        self.inner.get(key).await
    }

    async fn apply(&self, writes: Vec<CasWrite>) -> Result<CasOutcome, StoreError> {
        self.applies.fetch_add(1, Ordering::SeqCst);
        Ok(CasOutcome::Conflict {
            key: writes
                .first()
                .map(|w| w.key.clone())
                .unwrap_or_default(),
        })
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, VersionedRaw)>, StoreError> {
        self.inner.scan_prefix(prefix).await
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, StoreError> {
        self.inner.delete_prefix(prefix).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
