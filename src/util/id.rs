//! ID generation for issues.
//!
//! IDs have the form `<prefix>-<hash>` where hash is lowercase hex derived
//! from the issue content and creation time. Collisions are resolved by
//! nonce retry, growing the hash when the nonce space is exhausted.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

const DEFAULT_HASH_LENGTH: usize = 6;
const MAX_HASH_LENGTH: usize = 12;
const NONCES_PER_LENGTH: u32 = 10;

/// ID generator that produces unique issue IDs.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    prefix: String,
}

impl IdGenerator {
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Get the configured prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Generate a candidate ID with the given parameters.
    #[must_use]
    pub fn candidate(
        &self,
        title: &str,
        created_at: DateTime<Utc>,
        nonce: u32,
        hash_length: usize,
    ) -> String {
        let mut hasher = Sha256::new();
        hasher.update(title.as_bytes());
        hasher.update([0]);
        hasher.update(created_at.timestamp_millis().to_le_bytes());
        hasher.update(nonce.to_le_bytes());
        let digest = format!("{:x}", hasher.finalize());
        format!("{}-{}", self.prefix, &digest[..hash_length])
    }

    /// Generate an ID, checking for collisions with the provided checker.
    ///
    /// The checker returns `true` if the ID already exists.
    pub fn generate<F>(&self, title: &str, created_at: DateTime<Utc>, exists: F) -> String
    where
        F: Fn(&str) -> bool,
    {
        let mut length = DEFAULT_HASH_LENGTH;

        loop {
            for nonce in 0..NONCES_PER_LENGTH {
                let id = self.candidate(title, created_at, nonce, length);
                if !exists(&id) {
                    return id;
                }
            }

            if length < MAX_HASH_LENGTH {
                length += 1;
            } else {
                // Every nonce collided at full length. Fall back to an
                // unbounded nonce walk; the map is finite so this terminates.
                let mut nonce = NONCES_PER_LENGTH;
                loop {
                    let id = self.candidate(title, created_at, nonce, MAX_HASH_LENGTH);
                    if !exists(&id) {
                        return id;
                    }
                    nonce += 1;
                }
            }
        }
    }
}
