//! Versioned key-value storage shared by every replica of the service.
//!
//! Every record carries a version counter. Version `0` means the key is
//! absent; each successful write bumps it by one. Writes are conditional on
//! the version the writer last read, which is what keeps read-modify-write
//! cycles on timers and participant rows linearizable without locks.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::StoreError;

pub mod keys;
pub mod memory;
pub mod redis_store;

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

/// Raw stored record with its version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedRaw {
    pub version: u64,
    pub data: String,
}

/// Decoded record with its version.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub version: u64,
    pub value: T,
}

/// One conditional write inside an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CasWrite {
    pub key: String,
    pub expected_version: u64,
    pub data: String,
}

impl CasWrite {
    pub fn json<T: Serialize>(
        key: impl Into<String>,
        expected_version: u64,
        value: &T,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            key: key.into(),
            expected_version,
            data: serde_json::to_string(value)?,
        })
    }

    pub fn create<T: Serialize>(key: impl Into<String>, value: &T) -> Result<Self, StoreError> {
        Self::json(key, 0, value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome {
    /// All writes landed; new versions in batch order.
    Applied { versions: Vec<u64> },
    /// Nothing was written because `key` no longer had the expected version.
    Conflict { key: String },
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<VersionedRaw>, StoreError>;

    /// Applies every write or none of them.
    async fn apply(&self, writes: Vec<CasWrite>) -> Result<CasOutcome, StoreError>;

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, VersionedRaw)>, StoreError>;

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

pub async fn load<T: DeserializeOwned>(
    store: &dyn KvStore,
    key: &str,
) -> Result<Option<Versioned<T>>, StoreError> {
    match store.get(key).await? {
        Some(raw) => Ok(Some(Versioned {
            version: raw.version,
            value: serde_json::from_str(&raw.data)?,
        })),
        None => Ok(None),
    }
}

pub async fn load_prefix<T: DeserializeOwned>(
    store: &dyn KvStore,
    prefix: &str,
) -> Result<Vec<Versioned<T>>, StoreError> {
    store
        .scan_prefix(prefix)
        .await?
        .into_iter()
        .map(|(_, raw)| {
            Ok(Versioned {
                version: raw.version,
                value: serde_json::from_str(&raw.data)?,
            })
        })
        .collect()
}

/// Single-key conditional write returning the new version, or `None` on conflict.
pub async fn put_if_version<T: Serialize>(
    store: &dyn KvStore,
    key: &str,
    expected_version: u64,
    value: &T,
) -> Result<Option<u64>, StoreError> {
    let write = CasWrite::json(key, expected_version, value)?;
    match store.apply(vec![write]).await? {
        CasOutcome::Applied { versions } => Ok(versions.first().copied()),
        CasOutcome::Conflict { .. } => Ok(None),
    }
}
