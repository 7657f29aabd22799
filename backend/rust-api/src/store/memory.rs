use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::{CasOutcome, CasWrite, KvStore, VersionedRaw};
use crate::error::StoreError;

#[derive(Debug, Clone)]
struct Entry {
    version: u64,
    data: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// In-process store for single-node deployments and tests. It is the
/// store of record for the process that owns it, not a cache.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    ttl: Option<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: Some(ttl),
        }
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock().values().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<VersionedRaw>, StoreError> {
        let now = Instant::now();
        Ok(self
            .lock()
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| VersionedRaw {
                version: e.version,
                data: e.data.clone(),
            }))
    }

    async fn apply(&self, writes: Vec<CasWrite>) -> Result<CasOutcome, StoreError> {
        let now = Instant::now();
        let mut entries = self.lock();

        for write in &writes {
            let current = entries
                .get(&write.key)
                .filter(|e| e.is_live(now))
                .map_or(0, |e| e.version);
            if current != write.expected_version {
                return Ok(CasOutcome::Conflict {
                    key: write.key.clone(),
                });
            }
        }

        let expires_at = self.ttl.map(|ttl| now + ttl);
        let mut versions = Vec::with_capacity(writes.len());
        for write in writes {
            let version = write.expected_version + 1;
            entries.insert(
                write.key,
                Entry {
                    version,
                    data: write.data,
                    expires_at,
                },
            );
            versions.push(version);
        }

        Ok(CasOutcome::Applied { versions })
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, VersionedRaw)>, StoreError> {
        let now = Instant::now();
        let mut found: Vec<_> = self
            .lock()
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && entry.is_live(now))
            .map(|(key, entry)| {
                (
                    key.clone(),
                    VersionedRaw {
                        version: entry.version,
                        data: entry.data.clone(),
                    },
                )
            })
            .collect();
        found.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(found)
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, StoreError> {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        Ok((before - entries.len()) as u64)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
