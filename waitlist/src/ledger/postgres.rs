//! PostgreSQL-backed registrant ledger.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE registrants (
//!     event_id TEXT NOT NULL, sequence BIGINT, email TEXT NOT NULL, ...,
//!     CONSTRAINT registrants_pkey PRIMARY KEY (event_id),
//!     CONSTRAINT registrants_email_key UNIQUE (email),
//!     CONSTRAINT registrants_sequence_key UNIQUE (sequence)
//! );
//!
//! CREATE TABLE event_id_counters (name TEXT PRIMARY KEY, value BIGINT NOT NULL);
//! ```
//!
//! The counter row is keyed by identifier prefix and advanced with a single
//! upsert, which makes allocation atomic across processes.

use super::{LedgerError, RegistrantLedger};
use crate::types::{EventId, EventIdFormat, Registrant};
use async_trait::async_trait;
use sqlx::{PgPool, Row};

const SELECT_REGISTRANT: &str = r"
    SELECT event_id, name, email, phone_number, state, photo_reference,
           submitted_code, late_code, created_at
    FROM registrants
";

/// Ledger persisted in the `registrants` table.
pub struct PostgresRegistrantLedger {
    pool: PgPool,
    format: EventIdFormat,
}

fn unavailable(e: sqlx::Error) -> LedgerError {
    LedgerError::Unavailable(e.to_string())
}

impl PostgresRegistrantLedger {
    /// Create a ledger over an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool, format: EventIdFormat) -> Self {
        Self { pool, format }
    }

    /// Bring the identifier counter up to the highest persisted sequence.
    ///
    /// Run once at startup so identifiers continue after a restart or a
    /// bulk import.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Unavailable`] if the statement fails.
    pub async fn initialize(&self) -> Result<u64, LedgerError> {
        let (value,): (i64,) = sqlx::query_as(
            r"
            INSERT INTO event_id_counters (name, value)
            SELECT $1, COALESCE(MAX(sequence), 0) FROM registrants
            ON CONFLICT (name) DO UPDATE
            SET value = GREATEST(event_id_counters.value, EXCLUDED.value)
            RETURNING value
            ",
        )
        .bind(self.format.prefix())
        .fetch_one(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(u64::try_from(value).unwrap_or_default())
    }

    fn row_to_registrant(row: &sqlx::postgres::PgRow) -> Registrant {
        Registrant {
            event_id: EventId::new(row.get::<String, _>("event_id")),
            name: row.get("name"),
            email: row.get("email"),
            phone_number: row.get("phone_number"),
            state: row.get("state"),
            photo_reference: row.get("photo_reference"),
            submitted_code: row.get("submitted_code"),
            late_code: row.get("late_code"),
            created_at: row.get("created_at"),
        }
    }

    fn insert_error(e: sqlx::Error, registrant: &Registrant) -> LedgerError {
        if let sqlx::Error::Database(db) = &e {
            if db.is_unique_violation() {
                return match db.constraint() {
                    Some("registrants_email_key") => {
                        LedgerError::DuplicateEmail(registrant.email.clone())
                    },
                    _ => LedgerError::DuplicateEventId(registrant.event_id.clone()),
                };
            }
        }
        unavailable(e)
    }
}

#[async_trait]
impl RegistrantLedger for PostgresRegistrantLedger {
    async fn next_event_id(&self) -> Result<EventId, LedgerError> {
        let (value,): (i64,) = sqlx::query_as(
            r"
            INSERT INTO event_id_counters (name, value) VALUES ($1, 1)
            ON CONFLICT (name) DO UPDATE SET value = event_id_counters.value + 1
            RETURNING value
            ",
        )
        .bind(self.format.prefix())
        .fetch_one(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(self.format.format(u64::try_from(value).unwrap_or_default()))
    }

    async fn insert(&self, registrant: Registrant) -> Result<Registrant, LedgerError> {
        let sequence = self
            .format
            .sequence_of(&registrant.event_id)
            .and_then(|s| i64::try_from(s).ok());

        sqlx::query(
            r"
            INSERT INTO registrants (
                event_id, sequence, name, email, phone_number, state,
                photo_reference, submitted_code, late_code, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ",
        )
        .bind(registrant.event_id.as_str())
        .bind(sequence)
        .bind(&registrant.name)
        .bind(&registrant.email)
        .bind(&registrant.phone_number)
        .bind(&registrant.state)
        .bind(&registrant.photo_reference)
        .bind(&registrant.submitted_code)
        .bind(&registrant.late_code)
        .bind(registrant.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::insert_error(e, &registrant))?;

        tracing::debug!(event_id = %registrant.event_id, "Registrant persisted");
        Ok(registrant)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Registrant>, LedgerError> {
        let row = sqlx::query(&format!("{SELECT_REGISTRANT} WHERE email = $1"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?;

        Ok(row.as_ref().map(Self::row_to_registrant))
    }

    async fn find_by_event_id(&self, event_id: &EventId) -> Result<Option<Registrant>, LedgerError> {
        let row = sqlx::query(&format!("{SELECT_REGISTRANT} WHERE event_id = $1"))
            .bind(event_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?;

        Ok(row.as_ref().map(Self::row_to_registrant))
    }

    async fn count(&self) -> Result<u64, LedgerError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM registrants")
            .fetch_one(&self.pool)
            .await
            .map_err(unavailable)?;

        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn all(&self) -> Result<Vec<Registrant>, LedgerError> {
        let rows = sqlx::query(&format!("{SELECT_REGISTRANT} ORDER BY sequence ASC, event_id ASC"))
            .fetch_all(&self.pool)
            .await
            .map_err(unavailable)?;

        Ok(rows.iter().map(Self::row_to_registrant).collect())
    }
}
