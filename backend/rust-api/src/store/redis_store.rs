use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::Duration;

use super::{CasOutcome, CasWrite, KvStore, VersionedRaw};
use crate::error::StoreError;
use crate::metrics::track_store_operation;

const SCAN_BATCH: usize = 200;

// Records are hashes {v, data}. ARGV[1] is the TTL in seconds, then one
// (expected_version, data) pair per key. Returns {1, v1, v2, ...} when every
// key matched its expected version, {0, i} when key i did not.
const CAS_SCRIPT: &str = r#"
    local ttl = tonumber(ARGV[1])
    for i = 1, #KEYS do
        local current = redis.call('HGET', KEYS[i], 'v')
        if current == false then
            current = 0
        else
            current = tonumber(current)
        end
        if current ~= tonumber(ARGV[2 * i]) then
            return {0, i}
        end
    end

    local result = {1}
    for i = 1, #KEYS do
        local next_version = tonumber(ARGV[2 * i]) + 1
        redis.call('HSET', KEYS[i], 'v', next_version, 'data', ARGV[2 * i + 1])
        if ttl > 0 then
            redis.call('EXPIRE', KEYS[i], ttl)
        end
        table.insert(result, next_version)
    end
    return result
"#;

/// Shared store backed by Redis. Conditional writes run as one Lua script so
/// that the version check and the write are atomic on the server.
#[derive(Clone)]
pub struct RedisStore {
    redis: ConnectionManager,
    cas_script: redis::Script,
    op_timeout: Duration,
    key_ttl_secs: u64,
}

impl RedisStore {
    pub fn new(redis: ConnectionManager, op_timeout: Duration, key_ttl_secs: u64) -> Self {
        Self {
            redis,
            cas_script: redis::Script::new(CAS_SCRIPT),
            op_timeout,
            key_ttl_secs,
        }
    }

    async fn timed<F, T>(&self, operation: &'static str, future: F) -> Result<T, StoreError>
    where
        F: std::future::Future<Output = Result<T, StoreError>>,
    {
        track_store_operation(operation, async {
            tokio::time::timeout(self.op_timeout, future)
                .await
                .map_err(|_| StoreError::Timeout { operation })?
        })
        .await
    }

    async fn scan_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.redis.clone();
        let pattern = format!("{}*", escape_glob(prefix));
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn read(&self, key: &str) -> Result<Option<VersionedRaw>, StoreError> {
        let mut conn = self.redis.clone();
        let (version, data): (Option<u64>, Option<String>) = redis::cmd("HMGET")
            .arg(key)
            .arg("v")
            .arg("data")
            .query_async(&mut conn)
            .await?;

        Ok(match (version, data) {
            (Some(version), Some(data)) => Some(VersionedRaw { version, data }),
            _ => None,
        })
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<VersionedRaw>, StoreError> {
        self.timed("get", self.read(key)).await
    }

    async fn apply(&self, writes: Vec<CasWrite>) -> Result<CasOutcome, StoreError> {
        if writes.is_empty() {
            return Ok(CasOutcome::Applied {
                versions: Vec::new(),
            });
        }

        self.timed("cas", async {
            let mut conn = self.redis.clone();
            let mut invocation = self.cas_script.prepare_invoke();
            invocation.arg(self.key_ttl_secs);
            for write in &writes {
                invocation
                    .key(&write.key)
                    .arg(write.expected_version)
                    .arg(&write.data);
            }

            let reply: Vec<i64> = invocation.invoke_async(&mut conn).await?;
            match reply.split_first() {
                Some((1, versions)) => Ok(CasOutcome::Applied {
                    versions: versions.iter().map(|v| *v as u64).collect(),
                }),
                Some((0, [index])) => {
                    let key = writes
                        .get((*index as usize).saturating_sub(1))
                        .map(|w| w.key.clone())
                        .unwrap_or_default();
                    Ok(CasOutcome::Conflict { key })
                }
                _ => Err(StoreError::Backend(format!(
                    "unexpected CAS script reply: {:?}",
                    reply
                ))),
            }
        })
        .await
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, VersionedRaw)>, StoreError> {
        self.timed("scan", async {
            let mut found = Vec::new();
            for key in self.scan_keys(prefix).await? {
                if let Some(raw) = self.read(&key).await? {
                    found.push((key, raw));
                }
            }
            Ok(found)
        })
        .await
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, StoreError> {
        self.timed("delete", async {
            let keys = self.scan_keys(prefix).await?;
            if keys.is_empty() {
                return Ok(0);
            }
            let mut conn = self.redis.clone();
            let mut deleted = 0u64;
            for chunk in keys.chunks(SCAN_BATCH) {
                let n: u64 = redis::cmd("DEL")
                    .arg(chunk.to_vec())
                    .query_async(&mut conn)
                    .await?;
                deleted += n;
            }
            Ok(deleted)
        })
        .await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.timed("ping", async {
            let mut conn = self.redis.clone();
            redis::cmd("PING").query_async::<String>(&mut conn).await?;
            Ok(())
        })
        .await
    }
}

/// Escapes Redis glob metacharacters so a key prefix matches literally.
fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_metacharacters_are_escaped() {
        assert_eq!(escape_glob("timer:A*B:"), "timer:A\\*B:");
        assert_eq!(escape_glob("participant:s1:"), "participant:s1:");
    }
}
