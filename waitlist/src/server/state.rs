//! Application state for the waitlist HTTP server.

use crate::admission::{AdmissionEnvironment, AdmissionService};
use crate::certificates::CertificateService;
use crate::codes::CodeStore;
use crate::ledger::RegistrantLedger;
use crate::photos::PhotoStore;
use crate::queries::RegistrantQueries;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use waitlist_web::UploadLimits;

/// Request-handling settings taken from configuration.
#[derive(Debug, Clone)]
pub struct AppSettings {
    /// Upper bound on one admission
    pub admission_timeout: Duration,
    /// Certificates can be downloaded from this instant
    pub certificate_release: DateTime<Utc>,
    /// Photo upload limits
    pub uploads: UploadLimits,
    /// Reject registrations without a photo
    pub require_photo: bool,
    /// Bearer token for admin routes; `None` disables them
    pub admin_token: Option<String>,
    /// Allowed CORS origin (`*` for any)
    pub cors_origin: String,
}

/// Application state shared across all HTTP handlers.
///
/// Cloned per request; every field is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Admission workflow
    pub admissions: AdmissionService,
    /// Count, lookup and identity card re-fetch
    pub queries: RegistrantQueries,
    /// Certificate download and sweep
    pub certificates: CertificateService,
    /// Uploaded photos
    pub photos: PhotoStore,
    /// Code store, for readiness
    pub codes: Arc<dyn CodeStore>,
    /// Ledger, for readiness
    pub ledger: Arc<dyn RegistrantLedger>,
    /// Request-handling settings
    pub settings: Arc<AppSettings>,
}

impl AppState {
    /// Wire the services over one set of collaborators.
    #[must_use]
    pub fn new(env: AdmissionEnvironment, photos: PhotoStore, settings: AppSettings) -> Self {
        let queries = RegistrantQueries::new(Arc::clone(&env.ledger), Arc::clone(&env.renderer));
        let certificates = CertificateService::new(
            Arc::clone(&env.clock),
            Arc::clone(&env.ledger),
            Arc::clone(&env.renderer),
            Arc::clone(&env.notifier),
            env.policy.messages.clone(),
            settings.certificate_release,
        );

        Self {
            codes: Arc::clone(&env.codes),
            ledger: Arc::clone(&env.ledger),
            admissions: AdmissionService::new(env, settings.admission_timeout),
            queries,
            certificates,
            photos,
            settings: Arc::new(settings),
        }
    }
}
