//! In-memory registrant ledger.

use super::{LedgerError, RegistrantLedger};
use crate::types::{EventId, EventIdFormat, Registrant};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
struct Entries {
    registrants: Vec<Registrant>,
    by_email: HashMap<String, usize>,
    by_event_id: HashMap<EventId, usize>,
}

/// Ledger held in process memory; identifiers come from an atomic counter.
pub struct InMemoryRegistrantLedger {
    format: EventIdFormat,
    sequence: AtomicU64,
    entries: RwLock<Entries>,
}

impl InMemoryRegistrantLedger {
    /// Create an empty ledger minting identifiers in `format`.
    #[must_use]
    pub fn new(format: EventIdFormat) -> Self {
        Self::starting_after(format, 0)
    }

    /// Create an empty ledger whose first identifier is `last + 1`.
    #[must_use]
    pub fn starting_after(format: EventIdFormat, last: u64) -> Self {
        Self {
            format,
            sequence: AtomicU64::new(last),
            entries: RwLock::new(Entries::default()),
        }
    }
}

impl Default for InMemoryRegistrantLedger {
    fn default() -> Self {
        Self::new(EventIdFormat::default())
    }
}

#[async_trait]
impl RegistrantLedger for InMemoryRegistrantLedger {
    async fn next_event_id(&self) -> Result<EventId, LedgerError> {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(self.format.format(sequence))
    }

    async fn insert(&self, registrant: Registrant) -> Result<Registrant, LedgerError> {
        let mut entries = self.entries.write().await;

        if entries.by_email.contains_key(&registrant.email) {
            return Err(LedgerError::DuplicateEmail(registrant.email));
        }
        if entries.by_event_id.contains_key(&registrant.event_id) {
            return Err(LedgerError::DuplicateEventId(registrant.event_id));
        }

        let index = entries.registrants.len();
        entries.by_email.insert(registrant.email.clone(), index);
        entries.by_event_id.insert(registrant.event_id.clone(), index);
        entries.registrants.push(registrant.clone());
        Ok(registrant)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Registrant>, LedgerError> {
        let entries = self.entries.read().await;
        Ok(entries
            .by_email
            .get(email)
            .map(|&i| entries.registrants[i].clone()))
    }

    async fn find_by_event_id(&self, event_id: &EventId) -> Result<Option<Registrant>, LedgerError> {
        let entries = self.entries.read().await;
        Ok(entries
            .by_event_id
            .get(event_id)
            .map(|&i| entries.registrants[i].clone()))
    }

    async fn count(&self) -> Result<u64, LedgerError> {
        Ok(self.entries.read().await.registrants.len() as u64)
    }

    async fn all(&self) -> Result<Vec<Registrant>, LedgerError> {
        let mut all = self.entries.read().await.registrants.clone();
        all.sort_by_key(|r| (self.format.sequence_of(&r.event_id), r.event_id.clone()));
        Ok(all)
    }
}
