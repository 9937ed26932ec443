//! Read-side queries over the ledger.

use crate::artifacts::{Artifact, ArtifactRenderer, RenderError};
use crate::ledger::{LedgerError, RegistrantLedger};
use crate::types::{EventId, normalize_email};
use std::sync::Arc;
use thiserror::Error;

/// Errors from registrant queries.
#[derive(Error, Debug)]
pub enum QueryError {
    /// No registrant matches
    #[error("registrant not found")]
    NotFound,
    /// The ledger failed
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    /// The identity card could not be rendered
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Count, lookup and identity card re-fetch.
#[derive(Clone)]
pub struct RegistrantQueries {
    ledger: Arc<dyn RegistrantLedger>,
    renderer: Arc<dyn ArtifactRenderer>,
}

impl RegistrantQueries {
    /// Queries over `ledger`, rendering cards with `renderer`.
    #[must_use]
    pub fn new(ledger: Arc<dyn RegistrantLedger>, renderer: Arc<dyn ArtifactRenderer>) -> Self {
        Self { ledger, renderer }
    }

    /// Number of registrants on the waitlist.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Ledger`] if the ledger is unavailable.
    pub async fn count(&self) -> Result<u64, QueryError> {
        Ok(self.ledger.count().await?)
    }

    /// Event identifier registered for `email` (normalised before lookup).
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::NotFound`] for unknown emails.
    pub async fn event_id_for(&self, email: &str) -> Result<EventId, QueryError> {
        self.ledger
            .find_by_email(&normalize_email(email))
            .await?
            .map(|registrant| registrant.event_id)
            .ok_or(QueryError::NotFound)
    }

    /// Identity card for `event_id`, rendered fresh from the stored record.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::NotFound`] for unknown identifiers and
    /// [`QueryError::Render`] when rendering fails.
    #[tracing::instrument(skip(self))]
    pub async fn identity_card(&self, event_id: &str) -> Result<Artifact, QueryError> {
        let registrant = self
            .ledger
            .find_by_event_id(&EventId::new(event_id.trim()))
            .await?
            .ok_or(QueryError::NotFound)?;
        Ok(self.renderer.render_identity_card(&registrant).await?)
    }
}
