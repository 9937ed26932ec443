//! Attendance certificates: gated download and the admin email sweep.

use crate::artifacts::{Artifact, ArtifactRenderer, RenderError};
use crate::ledger::{LedgerError, RegistrantLedger};
use crate::notify::{MessageTemplates, Notifier};
use crate::types::normalize_email;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use waitlist_core::environment::Clock;

/// Errors from certificate requests.
#[derive(Error, Debug)]
pub enum CertificateError {
    /// No registrant with this email
    #[error("registrant not found")]
    NotFound,
    /// Downloads open at `release_at`
    #[error("Certificates available after {}", .release_at.format("%Y-%m-%d"))]
    NotYetReleased {
        /// Release instant
        release_at: DateTime<Utc>,
    },
    /// The ledger failed
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    /// The certificate could not be rendered
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Totals from one certificate sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepSummary {
    /// Registrants processed
    pub attempted: usize,
    /// Certificates delivered
    pub sent: usize,
    /// Registrants whose render or delivery failed
    pub failed: usize,
}

/// Certificate download and bulk delivery.
#[derive(Clone)]
pub struct CertificateService {
    clock: Arc<dyn Clock>,
    ledger: Arc<dyn RegistrantLedger>,
    renderer: Arc<dyn ArtifactRenderer>,
    notifier: Arc<dyn Notifier>,
    messages: MessageTemplates,
    release_at: DateTime<Utc>,
}

impl CertificateService {
    /// Create the service; downloads open at `release_at`.
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        ledger: Arc<dyn RegistrantLedger>,
        renderer: Arc<dyn ArtifactRenderer>,
        notifier: Arc<dyn Notifier>,
        messages: MessageTemplates,
        release_at: DateTime<Utc>,
    ) -> Self {
        Self {
            clock,
            ledger,
            renderer,
            notifier,
            messages,
            release_at,
        }
    }

    /// Whether downloads are open.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.clock.now() >= self.release_at
    }

    /// Certificate for the registrant with `email`.
    ///
    /// Unknown emails are reported before the release gate.
    ///
    /// # Errors
    ///
    /// Returns [`CertificateError::NotFound`] for unknown emails and
    /// [`CertificateError::NotYetReleased`] before the release instant.
    #[tracing::instrument(skip(self))]
    pub async fn certificate_for(&self, email: &str) -> Result<Artifact, CertificateError> {
        let registrant = self
            .ledger
            .find_by_email(&normalize_email(email))
            .await?
            .ok_or(CertificateError::NotFound)?;

        if !self.is_released() {
            return Err(CertificateError::NotYetReleased {
                release_at: self.release_at,
            });
        }

        Ok(self.renderer.render_certificate(&registrant).await?)
    }

    /// Email a certificate to every registrant, one at a time.
    ///
    /// Failures are logged and counted; the sweep always runs to the end.
    ///
    /// # Errors
    ///
    /// Returns [`CertificateError::Ledger`] only if the registrant list
    /// cannot be read.
    #[tracing::instrument(skip(self))]
    pub async fn send_all(&self) -> Result<SweepSummary, CertificateError> {
        let registrants = self.ledger.all().await?;
        let mut summary = SweepSummary::default();
        info!(registrants = registrants.len(), "Starting certificate sweep");

        for registrant in registrants {
            summary.attempted += 1;

            let certificate = match self.renderer.render_certificate(&registrant).await {
                Ok(certificate) => certificate,
                Err(e) => {
                    warn!(event_id = %registrant.event_id, error = %e, "Certificate not rendered");
                    metrics::counter!("waitlist_certificate_sweep_total", "status" => "failed").increment(1);
                    summary.failed += 1;
                    continue;
                },
            };

            let delivery = self.messages.certificate(&registrant, certificate);
            match self.notifier.send(&delivery).await {
                Ok(()) => {
                    metrics::counter!("waitlist_certificate_sweep_total", "status" => "sent").increment(1);
                    summary.sent += 1;
                },
                Err(e) => {
                    warn!(event_id = %registrant.event_id, email = %registrant.email, error = %e, "Certificate not delivered");
                    metrics::counter!("waitlist_certificate_sweep_total", "status" => "failed").increment(1);
                    summary.failed += 1;
                },
            }
        }

        info!(
            attempted = summary.attempted,
            sent = summary.sent,
            failed = summary.failed,
            "Certificate sweep finished"
        );
        Ok(summary)
    }
}
