//! PostgreSQL-backed code store.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE registration_codes (
//!     code       TEXT PRIMARY KEY,
//!     pool       TEXT NOT NULL,
//!     claimed_by UUID,
//!     claimed_at TIMESTAMPTZ
//! );
//!
//! CREATE TABLE code_pool_seeds (
//!     pool      TEXT PRIMARY KEY,
//!     seeded_at TIMESTAMPTZ NOT NULL
//! );
//! ```
//!
//! Claim and consume are single conditional statements, so row locking in
//! Postgres decides the winner between concurrent admissions. Seeding writes
//! the pool's `code_pool_seeds` row and its codes in one transaction; once
//! that row exists the pool is never refilled.

use super::{CodeStore, CodeStoreError, SeedOutcome};
use crate::types::CodePool;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;
use waitlist_core::environment::Clock;

/// Code store persisted in the `registration_codes` table.
pub struct PostgresCodeStore {
    pool: PgPool,
    clock: Arc<dyn Clock>,
    claim_ttl: chrono::Duration,
}

impl PostgresCodeStore {
    /// Create a store over an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>, claim_ttl: chrono::Duration) -> Self {
        Self {
            pool,
            clock,
            claim_ttl,
        }
    }

    /// Claims made before this instant have lapsed.
    fn claim_cutoff(&self) -> DateTime<Utc> {
        self.clock.now() - self.claim_ttl
    }
}

fn unavailable(e: sqlx::Error) -> CodeStoreError {
    CodeStoreError::Unavailable(e.to_string())
}

#[async_trait]
impl CodeStore for PostgresCodeStore {
    async fn seed(&self, pool: CodePool, codes: &[String]) -> Result<SeedOutcome, CodeStoreError> {
        let codes: Vec<String> = codes
            .iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        if codes.is_empty() {
            return Ok(SeedOutcome::Seeded(0));
        }

        let mut tx = self.pool.begin().await.map_err(unavailable)?;

        // The marker's primary key serialises concurrent seeders
        let marked = sqlx::query(
            r"
            INSERT INTO code_pool_seeds (pool, seeded_at)
            VALUES ($1, $2)
            ON CONFLICT (pool) DO NOTHING
            ",
        )
        .bind(pool.as_str())
        .bind(self.clock.now())
        .execute(&mut *tx)
        .await
        .map_err(unavailable)?;

        if marked.rows_affected() == 0 {
            tx.rollback().await.map_err(unavailable)?;
            return Ok(SeedOutcome::AlreadySeeded(self.count(pool).await?));
        }

        // Codes already present (in either pool) are left where they are
        let inserted = sqlx::query(
            r"
            INSERT INTO registration_codes (code, pool)
            SELECT DISTINCT code, $2 FROM UNNEST($1::text[]) AS seed(code)
            ON CONFLICT (code) DO NOTHING
            ",
        )
        .bind(&codes)
        .bind(pool.as_str())
        .execute(&mut *tx)
        .await
        .map_err(unavailable)?;

        tx.commit().await.map_err(unavailable)?;
        Ok(SeedOutcome::Seeded(inserted.rows_affected()))
    }

    async fn is_valid(&self, pool: CodePool, code: &str) -> Result<bool, CodeStoreError> {
        let (valid,): (bool,) = sqlx::query_as(
            r"
            SELECT EXISTS(
                SELECT 1 FROM registration_codes
                WHERE pool = $1 AND code = $2
                  AND (claimed_by IS NULL OR claimed_at <= $3)
            )
            ",
        )
        .bind(pool.as_str())
        .bind(code)
        .bind(self.claim_cutoff())
        .fetch_one(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(valid)
    }

    async fn claim(&self, pool: CodePool, code: &str, claimant: Uuid) -> Result<bool, CodeStoreError> {
        let result = sqlx::query(
            r"
            UPDATE registration_codes
            SET claimed_by = $3, claimed_at = $4
            WHERE pool = $1 AND code = $2
              AND (claimed_by IS NULL OR claimed_at <= $5)
            ",
        )
        .bind(pool.as_str())
        .bind(code)
        .bind(claimant)
        .bind(self.clock.now())
        .bind(self.claim_cutoff())
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(result.rows_affected() == 1)
    }

    async fn release(&self, pool: CodePool, code: &str, claimant: Uuid) -> Result<(), CodeStoreError> {
        sqlx::query(
            r"
            UPDATE registration_codes
            SET claimed_by = NULL, claimed_at = NULL
            WHERE pool = $1 AND code = $2 AND claimed_by = $3
            ",
        )
        .bind(pool.as_str())
        .bind(code)
        .bind(claimant)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(())
    }

    async fn consume(&self, pool: CodePool, code: &str) -> Result<(), CodeStoreError> {
        let result = sqlx::query("DELETE FROM registration_codes WHERE pool = $1 AND code = $2")
            .bind(pool.as_str())
            .bind(code)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;

        if result.rows_affected() == 0 {
            return Err(CodeStoreError::NotFound {
                pool,
                code: code.to_string(),
            });
        }
        Ok(())
    }

    async fn count(&self, pool: CodePool) -> Result<u64, CodeStoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM registration_codes WHERE pool = $1")
            .bind(pool.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(unavailable)?;

        Ok(u64::try_from(count).unwrap_or_default())
    }
}
