//! Dependencies of the admission reducer.

use crate::artifacts::ArtifactRenderer;
use crate::codes::CodeStore;
use crate::ledger::RegistrantLedger;
use crate::notify::{MessageTemplates, Notifier};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use waitlist_core::environment::Clock;
use waitlist_runtime::RetryPolicy;

/// Tunable admission rules.
#[derive(Debug, Clone)]
pub struct AdmissionPolicy {
    /// From this instant on, a late code is required
    pub late_registration_start: DateTime<Utc>,
    /// Identifier allocations tried before giving up on collisions
    pub max_allocation_attempts: u32,
    /// Wait between allocation attempts
    pub allocation_backoff: RetryPolicy,
    /// Email wording
    pub messages: MessageTemplates,
}

impl AdmissionPolicy {
    /// Policy with the given cutoff and defaults elsewhere.
    #[must_use]
    pub fn new(late_registration_start: DateTime<Utc>) -> Self {
        Self {
            late_registration_start,
            max_allocation_attempts: 3,
            allocation_backoff: RetryPolicy::builder()
                .initial_delay(std::time::Duration::from_millis(10))
                .max_delay(std::time::Duration::from_millis(200))
                .build(),
            messages: MessageTemplates::default(),
        }
    }

    /// Whether `now` falls in the late period.
    #[must_use]
    pub fn is_late_period(&self, now: DateTime<Utc>) -> bool {
        now >= self.late_registration_start
    }
}

/// Injected collaborators for the admission workflow.
#[derive(Clone)]
pub struct AdmissionEnvironment {
    /// Time source for the late cutoff and timestamps
    pub clock: Arc<dyn Clock>,
    /// Registration codes
    pub codes: Arc<dyn CodeStore>,
    /// Registrant storage and identifier sequence
    pub ledger: Arc<dyn RegistrantLedger>,
    /// Identity card renderer
    pub renderer: Arc<dyn ArtifactRenderer>,
    /// Email delivery
    pub notifier: Arc<dyn Notifier>,
    /// Rules
    pub policy: AdmissionPolicy,
}
