//! In-memory code store.

use super::{CodeStore, CodeStoreError, SeedOutcome};
use crate::types::CodePool;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;
use waitlist_core::environment::Clock;

#[derive(Debug, Clone, Copy)]
struct Claim {
    claimant: Uuid,
    claimed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    pool: CodePool,
    claim: Option<Claim>,
}

#[derive(Debug, Default)]
struct Codes {
    entries: HashMap<String, Entry>,
    seeded: HashSet<CodePool>,
}

/// Code store held in process memory.
///
/// Keyed by code string, so a code can only ever sit in one pool. All
/// operations take one lock, which makes claim and consume atomic.
pub struct InMemoryCodeStore {
    clock: Arc<dyn Clock>,
    claim_ttl: chrono::Duration,
    codes: Mutex<Codes>,
}

impl InMemoryCodeStore {
    /// Create an empty store whose claims lapse after `claim_ttl`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, claim_ttl: chrono::Duration) -> Self {
        Self {
            clock,
            claim_ttl,
            codes: Mutex::new(Codes::default()),
        }
    }

    fn is_available(&self, entry: &Entry, now: DateTime<Utc>) -> bool {
        entry
            .claim
            .is_none_or(|claim| claim.claimed_at + self.claim_ttl <= now)
    }
}

#[async_trait]
impl CodeStore for InMemoryCodeStore {
    async fn seed(&self, pool: CodePool, codes: &[String]) -> Result<SeedOutcome, CodeStoreError> {
        let mut store = self.codes.lock().await;

        if store.seeded.contains(&pool) {
            let remaining = store.entries.values().filter(|e| e.pool == pool).count() as u64;
            return Ok(SeedOutcome::AlreadySeeded(remaining));
        }

        let mut seeded = 0;
        for code in codes {
            let code = code.trim();
            if code.is_empty() {
                continue;
            }
            match store.entries.get(code) {
                Some(entry) if entry.pool != pool => {
                    tracing::warn!(code, %pool, "Skipping seed code already present in the other pool");
                },
                Some(_) => {},
                None => {
                    store.entries.insert(code.to_string(), Entry { pool, claim: None });
                    seeded += 1;
                },
            }
        }

        // An empty list leaves the pool open for a later seed
        if codes.iter().any(|c| !c.trim().is_empty()) {
            store.seeded.insert(pool);
        }

        Ok(SeedOutcome::Seeded(seeded))
    }

    async fn is_valid(&self, pool: CodePool, code: &str) -> Result<bool, CodeStoreError> {
        let now = self.clock.now();
        let store = self.codes.lock().await;
        Ok(store
            .entries
            .get(code)
            .is_some_and(|entry| entry.pool == pool && self.is_available(entry, now)))
    }

    async fn claim(&self, pool: CodePool, code: &str, claimant: Uuid) -> Result<bool, CodeStoreError> {
        let now = self.clock.now();
        let mut store = self.codes.lock().await;

        let Some(entry) = store.entries.get_mut(code) else {
            return Ok(false);
        };
        if entry.pool != pool || !self.is_available(entry, now) {
            return Ok(false);
        }

        entry.claim = Some(Claim {
            claimant,
            claimed_at: now,
        });
        Ok(true)
    }

    async fn release(&self, pool: CodePool, code: &str, claimant: Uuid) -> Result<(), CodeStoreError> {
        let mut store = self.codes.lock().await;
        if let Some(entry) = store.entries.get_mut(code) {
            if entry.pool == pool && entry.claim.is_some_and(|c| c.claimant == claimant) {
                entry.claim = None;
            }
        }
        Ok(())
    }

    async fn consume(&self, pool: CodePool, code: &str) -> Result<(), CodeStoreError> {
        let mut store = self.codes.lock().await;
        match store.entries.get(code) {
            Some(entry) if entry.pool == pool => {
                store.entries.remove(code);
                Ok(())
            },
            _ => Err(CodeStoreError::NotFound {
                pool,
                code: code.to_string(),
            }),
        }
    }

    async fn count(&self, pool: CodePool) -> Result<u64, CodeStoreError> {
        let store = self.codes.lock().await;
        Ok(store.entries.values().filter(|e| e.pool == pool).count() as u64)
    }
}
