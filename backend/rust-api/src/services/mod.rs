use std::sync::Arc;
use std::time::Duration;

use mongodb::Client as MongoClient;
use redis::aio::ConnectionManager;
use serde::de::DeserializeOwned;

use crate::config::Config;
use crate::directory::{MongoDirectory, QuestionBank, SessionDirectory, UserDirectory};
use crate::error::{CoreError, CoreResult, StoreError};
use crate::models::Session;
use crate::store::{self, KvStore, RedisStore, Versioned};
use crate::utils::retry::{retry_async_with_config, RetryConfig, RetryDecision};
use crate::utils::time::{Clock, SystemClock};

pub mod access_code;
pub mod broadcaster;
pub mod participant_registry;
pub mod participant_rows;
pub mod scoring_pipeline;
pub mod scoring_policy;
pub mod session_lifecycle;
pub mod timer_engine;

use self::access_code::AccessCodeAllocator;
use self::broadcaster::{ChannelBroadcaster, SessionBroadcaster};
use self::participant_registry::ParticipantRegistry;
use self::scoring_pipeline::ScoringPipeline;
use self::session_lifecycle::SessionLifecycle;
use self::timer_engine::TimerEngine;

/// Read-only collaborators owned by the session/question/user layer.
#[derive(Clone)]
pub struct Collaborators {
    pub sessions: Arc<dyn SessionDirectory>,
    pub questions: Arc<dyn QuestionBank>,
    pub users: Arc<dyn UserDirectory>,
}

/// Retry and fallback knobs shared by the core services.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub cas_max_attempts: usize,
    pub read_retry_backoff: Duration,
    pub default_question_duration_ms: u64,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            cas_max_attempts: config.store.cas_max_attempts,
            read_retry_backoff: config.store.read_retry_backoff(),
            default_question_duration_ms: config.default_question_duration_ms,
        }
    }

    pub(crate) fn cas_retry(&self) -> RetryConfig {
        RetryConfig::optimistic(self.cas_max_attempts)
    }

    pub fn read_retry(&self) -> RetryConfig {
        RetryConfig::single_retry(self.read_retry_backoff)
    }
}

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn KvStore>,
    pub sessions: Arc<dyn SessionDirectory>,
    pub broadcaster: Arc<ChannelBroadcaster>,
    pub timers: TimerEngine,
    pub registry: ParticipantRegistry,
    pub scoring: ScoringPipeline,
    pub access_codes: AccessCodeAllocator,
    pub lifecycle: SessionLifecycle,
}

impl AppState {
    pub async fn new(
        config: Config,
        mongo_client: MongoClient,
        redis_client: redis::Client,
    ) -> anyhow::Result<Self> {
        let mongo = mongo_client.database(&config.mongo_database);

        tracing::info!("Attempting to connect to Redis...");

        let redis = tokio::time::timeout(
            Duration::from_secs(30),
            ConnectionManager::new(redis_client),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

        tracing::info!("Redis ConnectionManager created, testing with PING...");

        let mut conn = redis.clone();
        tokio::time::timeout(
            Duration::from_secs(5),
            redis::cmd("PING").query_async::<String>(&mut conn),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis PING timeout after 5s"))??;

        tracing::info!("Redis connection established successfully");

        let store: Arc<dyn KvStore> = Arc::new(RedisStore::new(
            redis,
            config.store.op_timeout(),
            config.store.key_ttl_secs,
        ));
        let directory = Arc::new(MongoDirectory::new(mongo, config.store.op_timeout()));
        let collaborators = Collaborators {
            sessions: directory.clone(),
            questions: directory.clone(),
            users: directory,
        };

        Ok(Self::from_parts(
            config,
            store,
            collaborators,
            Arc::new(SystemClock),
        ))
    }

    /// Wires the core services over explicit dependencies.
    pub fn from_parts(
        config: Config,
        store: Arc<dyn KvStore>,
        collaborators: Collaborators,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let settings = EngineSettings::from_config(&config);
        let broadcaster = Arc::new(ChannelBroadcaster::new(config.event_buffer));
        let publisher: Arc<dyn SessionBroadcaster> = broadcaster.clone();

        let timers = TimerEngine::new(
            store.clone(),
            collaborators.sessions.clone(),
            collaborators.questions.clone(),
            publisher.clone(),
            clock.clone(),
            settings.clone(),
        );
        let registry = ParticipantRegistry::new(
            store.clone(),
            collaborators.sessions.clone(),
            collaborators.users.clone(),
            publisher.clone(),
            clock.clone(),
            settings.clone(),
        );
        let scoring = ScoringPipeline::new(
            store.clone(),
            collaborators.sessions.clone(),
            collaborators.questions.clone(),
            publisher,
            clock,
            Arc::from(config.scoring.build_policy()),
            settings.clone(),
        );
        let access_codes = AccessCodeAllocator::new(store.clone());
        let lifecycle = SessionLifecycle::new(
            collaborators.sessions.clone(),
            timers.clone(),
            registry.clone(),
            settings.read_retry(),
        );

        Self {
            config,
            store,
            sessions: collaborators.sessions,
            broadcaster,
            timers,
            registry,
            scoring,
            access_codes,
            lifecycle,
        }
    }
}

/// Why one optimistic read-modify-write attempt did not land.
#[derive(Debug)]
pub(crate) enum Attempt {
    /// Another writer bumped the version first.
    Conflict,
    Store(StoreError),
    /// Logical failure; never retried.
    Fatal(CoreError),
}

impl Attempt {
    pub(crate) fn decision(&self) -> RetryDecision {
        match self {
            Attempt::Conflict | Attempt::Store(_) => RetryDecision::Retry,
            Attempt::Fatal(_) => RetryDecision::Abort,
        }
    }

    /// Maps an exhausted attempt onto the caller-facing taxonomy.
    pub(crate) fn into_core(self, key: &str) -> CoreError {
        match self {
            Attempt::Conflict => CoreError::ConcurrentUpdateConflict {
                key: key.to_string(),
            },
            Attempt::Store(source) => CoreError::store_unavailable(key, source),
            Attempt::Fatal(err) => err,
        }
    }
}

impl From<StoreError> for Attempt {
    fn from(err: StoreError) -> Self {
        Attempt::Store(err)
    }
}

impl From<CoreError> for Attempt {
    fn from(err: CoreError) -> Self {
        Attempt::Fatal(err)
    }
}

/// Plain read with one retry, then `TimerStoreUnavailable`.
pub(crate) async fn read_record<T: DeserializeOwned>(
    store: &dyn KvStore,
    key: &str,
    retry: RetryConfig,
) -> CoreResult<Option<Versioned<T>>> {
    retry_async_with_config(retry, || store::load::<T>(store, key))
        .await
        .map_err(|err| {
            tracing::error!("Read of {} failed after retry: {}", key, err);
            CoreError::store_unavailable(key, err)
        })
}

pub(crate) async fn session_by_code(
    sessions: &dyn SessionDirectory,
    access_code: &str,
    retry: RetryConfig,
) -> CoreResult<Session> {
    retry_async_with_config(retry, || sessions.session_by_code(access_code))
        .await
        .map_err(|err| CoreError::store_unavailable(format!("session:{}", access_code), err))?
        .ok_or_else(|| CoreError::SessionNotFound(access_code.to_string()))
}

pub(crate) async fn session_by_id(
    sessions: &dyn SessionDirectory,
    session_id: &str,
    retry: RetryConfig,
) -> CoreResult<Session> {
    retry_async_with_config(retry, || sessions.session_by_id(session_id))
        .await
        .map_err(|err| CoreError::store_unavailable(format!("session:{}", session_id), err))?
        .ok_or_else(|| CoreError::SessionNotFound(session_id.to_string()))
}
