use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::services::scoring_policy::{
    LinearDecayPolicy, ScoringPolicy, ScoringPolicyKind, TimePenaltyPolicy,
};

#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
    pub op_timeout_ms: u64,
    pub key_ttl_secs: u64,
    pub cas_max_attempts: usize,
    pub read_retry_backoff_ms: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            op_timeout_ms: 2000,
            key_ttl_secs: 86400,
            cas_max_attempts: 5,
            read_retry_backoff_ms: 25,
        }
    }
}

impl StoreSettings {
    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }

    pub fn read_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.read_retry_backoff_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScoringSettings {
    pub policy: ScoringPolicyKind,
    pub base_points: u64,
    pub max_time_bonus: u64,
    pub penalty_per_second: u64,
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self {
            policy: ScoringPolicyKind::LinearDecay,
            base_points: 1000,
            max_time_bonus: 500,
            penalty_per_second: 10,
        }
    }
}

impl ScoringSettings {
    pub fn build_policy(&self) -> Box<dyn ScoringPolicy> {
        match self.policy {
            ScoringPolicyKind::LinearDecay => Box::new(LinearDecayPolicy {
                base_points: self.base_points,
                max_time_bonus: self.max_time_bonus,
            }),
            ScoringPolicyKind::TimePenalty => Box::new(TimePenaltyPolicy {
                base_points: self.base_points,
                penalty_per_second: self.penalty_per_second,
            }),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mongo_uri: String,
    pub redis_uri: String,
    pub mongo_database: String,
    pub bind_addr: String,
    pub store: StoreSettings,
    pub scoring: ScoringSettings,
    pub default_question_duration_ms: u64,
    pub access_code_length: usize,
    pub event_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mongo_uri: "mongodb://localhost:27017".to_string(),
            redis_uri: "redis://127.0.0.1:6379/0".to_string(),
            mongo_database: "livequiz".to_string(),
            bind_addr: "0.0.0.0:8081".to_string(),
            store: StoreSettings::default(),
            scoring: ScoringSettings::default(),
            default_question_duration_ms: 30_000,
            access_code_length: 6,
            event_buffer: 1024,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Root .env first, then a local one
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        // Determine environment (defaults to dev)
        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Build configuration from config/*.toml + ENV overrides
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let defaults = Config::default();

        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .unwrap_or(defaults.mongo_uri);

        let redis_uri = settings
            .get_string("redis.uri")
            .or_else(|_| env::var("REDIS_URI"))
            .unwrap_or_else(|_| {
                let host = env::var("REDIS_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
                let port = env::var("REDIS_PORT").unwrap_or_else(|_| "6379".to_string());
                match env::var("REDIS_PASSWORD") {
                    Ok(password) => format!("redis://:{}@{}:{}/0", password, host, port),
                    Err(_) => format!("redis://{}:{}/0", host, port),
                }
            });

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or(defaults.mongo_database);

        let bind_addr = settings
            .get_string("server.bind_addr")
            .or_else(|_| env::var("BIND_ADDR"))
            .unwrap_or(defaults.bind_addr);

        let store = StoreSettings {
            op_timeout_ms: get_u64(&settings, "store.op_timeout_ms", defaults.store.op_timeout_ms),
            key_ttl_secs: get_u64(&settings, "store.key_ttl_secs", defaults.store.key_ttl_secs),
            cas_max_attempts: get_u64(
                &settings,
                "store.cas_max_attempts",
                defaults.store.cas_max_attempts as u64,
            )
            .max(1) as usize,
            read_retry_backoff_ms: get_u64(
                &settings,
                "store.read_retry_backoff_ms",
                defaults.store.read_retry_backoff_ms,
            ),
        };

        let policy = match settings.get_string("scoring.policy") {
            Ok(raw) => raw.parse().map_err(config::ConfigError::Message)?,
            Err(_) => defaults.scoring.policy,
        };

        let scoring = ScoringSettings {
            policy,
            base_points: get_u64(&settings, "scoring.base_points", defaults.scoring.base_points),
            max_time_bonus: get_u64(
                &settings,
                "scoring.max_time_bonus",
                defaults.scoring.max_time_bonus,
            ),
            penalty_per_second: get_u64(
                &settings,
                "scoring.penalty_per_second",
                defaults.scoring.penalty_per_second,
            ),
        };

        Ok(Config {
            mongo_uri,
            redis_uri,
            mongo_database,
            bind_addr,
            store,
            scoring,
            default_question_duration_ms: get_u64(
                &settings,
                "timer.default_duration_ms",
                defaults.default_question_duration_ms,
            ),
            access_code_length: get_u64(
                &settings,
                "access_code.length",
                defaults.access_code_length as u64,
            ) as usize,
            event_buffer: get_u64(&settings, "events.buffer", defaults.event_buffer as u64)
                .max(1) as usize,
        })
    }
}

fn get_u64(settings: &config::Config, key: &str, default: u64) -> u64 {
    settings
        .get_int(key)
        .ok()
        .and_then(|v| u64::try_from(v).ok())
        .unwrap_or(default)
}
