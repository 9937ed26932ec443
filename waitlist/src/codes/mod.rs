//! Registration code store.
//!
//! Codes live in two pools (standard and late). A code string belongs to at
//! most one pool and is removed exactly once, when an admission that used it
//! has been persisted.
//!
//! Validation is an atomic **claim**: the first admission to claim a code
//! holds it until it either consumes it (after persisting the registrant) or
//! releases it (on rejection or failure). A second admission presenting the
//! same code meanwhile sees it as invalid. Claims older than a configured
//! lifetime lapse, so a crashed admission cannot pin a code forever.

mod memory;
mod postgres;

pub use memory::InMemoryCodeStore;
pub use postgres::PostgresCodeStore;

use crate::types::CodePool;
use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

/// Errors from code store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodeStoreError {
    /// The code is not (or no longer) in the pool
    #[error("code {code:?} not found in {pool} pool")]
    NotFound {
        /// Pool searched
        pool: CodePool,
        /// Code searched for
        code: String,
    },
    /// The backing store could not be reached or failed
    #[error("code store unavailable: {0}")]
    Unavailable(String),
}

/// What a call to [`CodeStore::seed`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    /// The pool had never been seeded and received this many codes
    Seeded(u64),
    /// The pool was seeded before; it currently holds this many codes
    AlreadySeeded(u64),
}

/// Storage for one-time registration codes.
#[async_trait]
pub trait CodeStore: Send + Sync {
    /// Populate `pool` with `codes` if, and only if, it has never been seeded.
    ///
    /// A pool counts as seeded once a non-empty list has been loaded into
    /// it, even after every code has been consumed. Duplicates within
    /// `codes` and codes already present in the other pool are skipped.
    async fn seed(&self, pool: CodePool, codes: &[String]) -> Result<SeedOutcome, CodeStoreError>;

    /// Whether `code` is in `pool` and not held by an in-flight admission.
    async fn is_valid(&self, pool: CodePool, code: &str) -> Result<bool, CodeStoreError>;

    /// Atomically reserve `code` for `claimant`.
    ///
    /// Returns `false` if the code is missing or held by a live claim.
    async fn claim(&self, pool: CodePool, code: &str, claimant: Uuid) -> Result<bool, CodeStoreError>;

    /// Drop `claimant`'s claim on `code`; no-op if it holds none.
    async fn release(&self, pool: CodePool, code: &str, claimant: Uuid) -> Result<(), CodeStoreError>;

    /// Remove `code` from `pool`. At most one caller succeeds per code.
    ///
    /// Fails with [`CodeStoreError::NotFound`] if the code is already gone.
    async fn consume(&self, pool: CodePool, code: &str) -> Result<(), CodeStoreError>;

    /// Number of codes currently in `pool`.
    async fn count(&self, pool: CodePool) -> Result<u64, CodeStoreError>;
}

/// Read a seed list: one code per line, blank lines and `#` comments
/// ignored, duplicates dropped (first occurrence wins).
///
/// # Errors
///
/// Returns the I/O error if the file cannot be read.
pub fn load_code_list(path: &Path) -> std::io::Result<Vec<String>> {
    let contents = std::fs::read_to_string(path)?;
    Ok(parse_code_list(&contents))
}

/// Parse the seed list format described on [`load_code_list`].
#[must_use]
pub fn parse_code_list(contents: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter(|code| seen.insert((*code).to_string()))
        .map(str::to_string)
        .collect()
}
