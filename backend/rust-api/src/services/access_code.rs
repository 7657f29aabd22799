use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::metrics::ACCESS_CODE_ATTEMPTS_TOTAL;
use crate::store::{keys, CasOutcome, CasWrite, KvStore};

/// Upper-case letters and digits without `0/O` and `1/I`.
pub const ACCESS_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

pub const MAX_ATTEMPTS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Reservation {
    code: String,
}

/// Hands out unique session access codes by reserving `access-code:{code}`.
#[derive(Clone)]
pub struct AccessCodeAllocator {
    store: Arc<dyn KvStore>,
}

impl AccessCodeAllocator {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Draws codes until one is reserved. Collisions and store failures
    /// both use up one of the [`MAX_ATTEMPTS`] tries.
    pub async fn generate(&self, length: usize) -> CoreResult<String> {
        let length = length.max(1);

        for attempt in 1..=MAX_ATTEMPTS {
            let code = random_code(length);
            let write = match CasWrite::create(keys::access_code(&code), &Reservation {
                code: code.clone(),
            }) {
                Ok(write) => write,
                Err(err) => {
                    tracing::error!("Failed to encode access code reservation: {}", err);
                    ACCESS_CODE_ATTEMPTS_TOTAL.with_label_values(&["error"]).inc();
                    continue;
                }
            };

            match self.store.apply(vec![write]).await {
                Ok(CasOutcome::Applied { .. }) => {
                    ACCESS_CODE_ATTEMPTS_TOTAL
                        .with_label_values(&["reserved"])
                        .inc();
                    tracing::debug!("Reserved access code {} on attempt {}", code, attempt);
                    return Ok(code);
                }
                Ok(CasOutcome::Conflict { .. }) => {
                    ACCESS_CODE_ATTEMPTS_TOTAL
                        .with_label_values(&["collision"])
                        .inc();
                    tracing::debug!("Access code {} already taken", code);
                }
                Err(err) => {
                    ACCESS_CODE_ATTEMPTS_TOTAL.with_label_values(&["error"]).inc();
                    tracing::warn!(
                        "Access code reservation failed (attempt {}/{}): {}",
                        attempt,
                        MAX_ATTEMPTS,
                        err
                    );
                }
            }
        }

        tracing::error!("No unique access code after {} attempts", MAX_ATTEMPTS);
        Err(CoreError::AccessCodeExhausted {
            attempts: MAX_ATTEMPTS,
        })
    }
}

fn random_code(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| ACCESS_CODE_ALPHABET[rng.random_range(0..ACCESS_CODE_ALPHABET.len())] as char)
        .collect()
}
