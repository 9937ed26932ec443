//! Registrant ledger.
//!
//! Durable registry of admitted registrants, unique by email and by event
//! identifier, plus the sequence that mints new identifiers. Allocation
//! never returns the same sequence number twice, even under concurrency;
//! numbers taken by admissions that later fail are not reused.

mod memory;
mod postgres;

pub use memory::InMemoryRegistrantLedger;
pub use postgres::PostgresRegistrantLedger;

use crate::types::{EventId, Registrant};
use async_trait::async_trait;
use thiserror::Error;

/// Errors from ledger operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// A registrant with this email already exists
    #[error("email {0} is already registered")]
    DuplicateEmail(String),
    /// A registrant with this event identifier already exists
    #[error("event id {0} is already assigned")]
    DuplicateEventId(EventId),
    /// The backing store could not be reached or failed
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

/// Storage for accepted registrants.
#[async_trait]
pub trait RegistrantLedger: Send + Sync {
    /// Reserve the next identifier in the sequence.
    async fn next_event_id(&self) -> Result<EventId, LedgerError>;

    /// Persist `registrant`, enforcing both uniqueness constraints.
    ///
    /// Nothing is written when either key is taken.
    async fn insert(&self, registrant: Registrant) -> Result<Registrant, LedgerError>;

    /// Look up by normalised email.
    async fn find_by_email(&self, email: &str) -> Result<Option<Registrant>, LedgerError>;

    /// Look up by event identifier (exact match).
    async fn find_by_event_id(&self, event_id: &EventId) -> Result<Option<Registrant>, LedgerError>;

    /// Number of persisted registrants.
    async fn count(&self) -> Result<u64, LedgerError>;

    /// Snapshot of every registrant, in identifier order.
    async fn all(&self) -> Result<Vec<Registrant>, LedgerError>;
}
