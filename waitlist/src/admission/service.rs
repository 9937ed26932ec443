//! Runs one admission to completion under a time budget.

use super::actions::AdmissionAction;
use super::environment::AdmissionEnvironment;
use super::reducer::AdmissionReducer;
use super::types::{AdmissionFailure, AdmissionPhase, AdmissionState, DeliveryStatus, RejectionReason};
use crate::types::{AdmissionRequest, CodePool, EventId, Registrant, RegistrationForm};
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;
use waitlist_runtime::{Store, StoreError};

/// A registrant was admitted.
#[derive(Debug, Clone)]
pub struct AdmissionOutcome {
    /// The persisted registrant
    pub registrant: Registrant,
    /// What happened to the welcome email
    pub delivery: DeliveryStatus,
    /// `Completed`, or `Failed(RenderError)` when the card could not be rendered
    pub phase: AdmissionPhase,
    /// Codes that could not be consumed after persistence
    pub consumption_failures: Vec<String>,
}

impl AdmissionOutcome {
    /// Identifier assigned to the registrant.
    #[must_use]
    pub const fn event_id(&self) -> &EventId {
        &self.registrant.event_id
    }
}

/// Why no registrant was admitted.
#[derive(Error, Debug)]
pub enum AdmissionError {
    /// Validation failed; the client can fix the request
    #[error("{0}")]
    Rejected(RejectionReason),
    /// An infrastructure step failed
    #[error("admission failed: {0}")]
    Failed(AdmissionFailure),
    /// The workflow ran out of time
    #[error("admission timed out")]
    Timeout {
        /// Set when the registrant was persisted before the deadline
        event_id: Option<EventId>,
        /// The registrant insert was still in flight; its codes are settled
        /// in the background once the insert has had time to land
        in_doubt: bool,
    },
    /// The store aborted the workflow
    #[error(transparent)]
    Runtime(#[from] StoreError),
}

impl AdmissionError {
    const fn outcome_label(&self) -> &'static str {
        match self {
            Self::Rejected(_) => "rejected",
            Self::Failed(_) | Self::Runtime(_) => "failed",
            Self::Timeout { .. } => "timeout",
        }
    }
}

/// Entry point for admissions.
///
/// Each call gets its own store, so admissions run concurrently and share
/// only the injected collaborators.
#[derive(Clone)]
pub struct AdmissionService {
    env: AdmissionEnvironment,
    timeout: Duration,
}

impl AdmissionService {
    /// Service over `env` that abandons admissions after `timeout`.
    #[must_use]
    pub const fn new(env: AdmissionEnvironment, timeout: Duration) -> Self {
        Self { env, timeout }
    }

    /// The injected collaborators.
    #[must_use]
    pub const fn environment(&self) -> &AdmissionEnvironment {
        &self.env
    }

    /// Admit the registrant described by `form`.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::Rejected`] for validation failures,
    /// [`AdmissionError::Failed`] when a store is unavailable or identifier
    /// allocation is exhausted, and [`AdmissionError::Timeout`] when the
    /// workflow exceeds its budget.
    #[tracing::instrument(skip(self, form), fields(email = %form.email.trim()))]
    pub async fn admit(&self, form: RegistrationForm) -> Result<AdmissionOutcome, AdmissionError> {
        let request = AdmissionRequest::new(form, self.env.clock.now());
        let claimant = request.admission_id;
        let store = Store::new(AdmissionState::default(), AdmissionReducer::new(), self.env.clone());

        let started = Instant::now();
        let sent = tokio::time::timeout(self.timeout, store.send(AdmissionAction::Submit { request })).await;
        metrics::histogram!("waitlist_admission_duration_seconds").record(started.elapsed().as_secs_f64());

        let state = store.state(Clone::clone).await;
        if state.allocation_attempts > 1 {
            metrics::counter!("waitlist_allocation_retries_total")
                .increment(u64::from(state.allocation_attempts - 1));
        }

        let result = match sent {
            Ok(Ok(_)) => Self::conclude(state),
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Admission workflow aborted");
                self.compensate(&state, claimant).await;
                Err(AdmissionError::Runtime(e))
            },
            Err(_) => {
                tracing::error!(
                    phase = state.phase.name(),
                    timeout_secs = self.timeout.as_secs_f64(),
                    "Admission timed out"
                );
                let settled = self.compensate(&state, claimant).await;
                Err(AdmissionError::Timeout {
                    in_doubt: matches!(settled, Settlement::InDoubt),
                    event_id: settled.into_event_id(),
                })
            },
        };

        let label = match &result {
            Ok(_) => "completed",
            Err(e) => e.outcome_label(),
        };
        metrics::counter!("waitlist_admissions_total", "outcome" => label).increment(1);
        result
    }

    fn conclude(state: AdmissionState) -> Result<AdmissionOutcome, AdmissionError> {
        let AdmissionState {
            phase,
            registrant,
            delivery,
            consumption_failures,
            ..
        } = state;

        match (phase, registrant) {
            (phase @ AdmissionPhase::Completed, Some(registrant)) => Ok(AdmissionOutcome {
                registrant,
                delivery: delivery.unwrap_or(DeliveryStatus::NotAttempted {
                    reason: "no delivery recorded".to_string(),
                }),
                phase,
                consumption_failures,
            }),
            (phase @ AdmissionPhase::Failed(AdmissionFailure::RenderError(_)), Some(registrant)) => {
                Ok(AdmissionOutcome {
                    registrant,
                    delivery: delivery.unwrap_or(DeliveryStatus::NotAttempted {
                        reason: "identity card could not be rendered".to_string(),
                    }),
                    phase,
                    consumption_failures,
                })
            },
            (AdmissionPhase::Rejected(reason), _) => Err(AdmissionError::Rejected(reason)),
            (AdmissionPhase::Failed(failure), _) => Err(AdmissionError::Failed(failure)),
            (phase, _) => Err(AdmissionError::Failed(AdmissionFailure::Infrastructure {
                step: "workflow",
                message: format!("admission stopped in phase {}", phase.name()),
            })),
        }
    }

    /// Settle the codes of an admission that stopped early.
    ///
    /// A persisted registrant keeps its codes, so they are consumed. An
    /// admission that never reached the ledger releases its claims. When the
    /// insert was cancelled mid-flight it may still commit, so the claims stay
    /// held and a background task decides after another timeout budget.
    async fn compensate(&self, state: &AdmissionState, claimant: Uuid) -> Settlement {
        if let Some(registrant) = &state.registrant {
            self.consume_held(state, &registrant.event_id).await;
            return Settlement::Persisted(registrant.event_id.clone());
        }

        let Some(event_id) = state.event_id.clone() else {
            self.release_submitted(state, claimant).await;
            return Settlement::Released;
        };

        if self.was_persisted(state, &event_id).await {
            self.consume_held(state, &event_id).await;
            return Settlement::Persisted(event_id);
        }

        tracing::warn!(%event_id, "Registrant insert in doubt; settling codes later");
        let service = self.clone();
        let state = state.clone();
        tokio::spawn(async move {
            tokio::time::sleep(service.timeout).await;
            if service.was_persisted(&state, &event_id).await {
                tracing::info!(%event_id, "Late insert landed; consuming held codes");
                service.consume_held(&state, &event_id).await;
            } else {
                service.release_submitted(&state, claimant).await;
            }
        });
        Settlement::InDoubt
    }

    /// Whether the ledger holds `event_id` for this admission's email.
    async fn was_persisted(&self, state: &AdmissionState, event_id: &EventId) -> bool {
        match self.env.ledger.find_by_event_id(event_id).await {
            Ok(Some(found)) => Some(&found.email) == state.request.as_ref().map(|r| &r.form.email),
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(%event_id, error = %e, "Could not confirm persistence after timeout");
                false
            },
        }
    }

    async fn consume_held(&self, state: &AdmissionState, event_id: &EventId) {
        for held in &state.held_codes {
            if let Err(e) = self.env.codes.consume(held.pool, &held.code).await {
                tracing::debug!(%event_id, code = %held.code, error = %e, "Held code not consumed");
            }
        }
    }

    async fn release_submitted(&self, state: &AdmissionState, claimant: Uuid) {
        let Some(request) = &state.request else {
            return;
        };
        let submitted = [
            Some((CodePool::Standard, &request.form.code)),
            request.form.late_code.as_ref().map(|code| (CodePool::Late, code)),
        ];
        for (pool, code) in submitted.into_iter().flatten() {
            if let Err(e) = self.env.codes.release(pool, code, claimant).await {
                tracing::warn!(%pool, code = %code, error = %e, "Code claim not released");
            }
        }
    }
}

/// How compensation left an admission's codes.
enum Settlement {
    Persisted(EventId),
    Released,
    InDoubt,
}

impl Settlement {
    fn into_event_id(self) -> Option<EventId> {
        match self {
            Self::Persisted(event_id) => Some(event_id),
            Self::Released | Self::InDoubt => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::admission::environment::AdmissionPolicy;
    use crate::codes::{CodeStore, InMemoryCodeStore};
    use crate::ledger::{InMemoryRegistrantLedger, RegistrantLedger};
    use crate::mocks::{CollidingLedger, RecordingNotifier, SlowLedger, StaticRenderer};
    use std::sync::Arc;
    use waitlist_testing::{FixedClock, utc};

    struct Harness {
        service: AdmissionService,
        codes: Arc<InMemoryCodeStore>,
        ledger: Arc<dyn RegistrantLedger>,
        notifier: Arc<RecordingNotifier>,
    }

    async fn harness_with(
        ledger: Arc<dyn RegistrantLedger>,
        renderer: StaticRenderer,
        notifier: RecordingNotifier,
        timeout: Duration,
    ) -> Harness {
        let clock = Arc::new(FixedClock::new(utc(2025, 6, 1, 9)));
        let codes = Arc::new(InMemoryCodeStore::new(clock.clone(), chrono::Duration::minutes(10)));
        codes
            .seed(CodePool::Standard, &["A1".to_string(), "A2".to_string()])
            .await
            .unwrap();
        let notifier = Arc::new(notifier);
        let env = AdmissionEnvironment {
            clock,
            codes: codes.clone(),
            ledger: ledger.clone(),
            renderer: Arc::new(renderer),
            notifier: notifier.clone(),
            policy: AdmissionPolicy::new(utc(2025, 7, 1, 0)),
        };
        Harness {
            service: AdmissionService::new(env, timeout),
            codes,
            ledger,
            notifier,
        }
    }

    async fn harness() -> Harness {
        harness_with(
            Arc::new(InMemoryRegistrantLedger::default()),
            StaticRenderer::new(),
            RecordingNotifier::new(),
            Duration::from_secs(5),
        )
        .await
    }

    fn jane(code: &str) -> RegistrationForm {
        RegistrationForm {
            name: "Jane Doe".into(),
            email: "Jane@X.com".into(),
            phone_number: "08000000000".into(),
            state: "Edo".into(),
            code: code.into(),
            late_code: None,
            photo_reference: None,
        }
    }

    #[tokio::test]
    async fn admits_and_consumes_the_code() {
        let h = harness().await;

        let outcome = h.service.admit(jane("A1")).await.unwrap();

        assert_eq!(outcome.event_id().as_str(), "edo-ahapn-0001");
        assert_eq!(outcome.registrant.email, "jane@x.com");
        assert_eq!(outcome.delivery, DeliveryStatus::Sent);
        assert_eq!(outcome.phase, AdmissionPhase::Completed);
        assert!(!h.codes.is_valid(CodePool::Standard, "A1").await.unwrap());
        assert!(h.codes.is_valid(CodePool::Standard, "A2").await.unwrap());
        assert_eq!(h.notifier.sent_to("jane@x.com").len(), 1);
    }

    #[tokio::test]
    async fn reused_code_and_duplicate_email_are_rejected() {
        let h = harness().await;
        h.service.admit(jane("A1")).await.unwrap();

        let reused = RegistrationForm {
            email: "other@x.com".into(),
            ..jane("A1")
        };
        assert!(matches!(
            h.service.admit(reused).await,
            Err(AdmissionError::Rejected(RejectionReason::InvalidCode))
        ));

        assert!(matches!(
            h.service.admit(jane("A2")).await,
            Err(AdmissionError::Rejected(RejectionReason::DuplicateEmail))
        ));
        // The rejected admission released its claim
        assert!(h.codes.is_valid(CodePool::Standard, "A2").await.unwrap());
        assert_eq!(h.ledger.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delivery_failure_keeps_the_registrant() {
        let h = harness_with(
            Arc::new(InMemoryRegistrantLedger::default()),
            StaticRenderer::new(),
            RecordingNotifier::new().failing_for("jane@x.com"),
            Duration::from_secs(5),
        )
        .await;

        let outcome = h.service.admit(jane("A1")).await.unwrap();

        assert!(matches!(outcome.delivery, DeliveryStatus::Failed { .. }));
        assert_eq!(h.ledger.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn render_failure_reports_no_delivery() {
        let h = harness_with(
            Arc::new(InMemoryRegistrantLedger::default()),
            StaticRenderer::failing("no fonts"),
            RecordingNotifier::new(),
            Duration::from_secs(5),
        )
        .await;

        let outcome = h.service.admit(jane("A1")).await.unwrap();

        assert!(matches!(outcome.delivery, DeliveryStatus::NotAttempted { .. }));
        assert!(matches!(
            outcome.phase,
            AdmissionPhase::Failed(AdmissionFailure::RenderError(_))
        ));
        assert!(h.notifier.sent().is_empty());
        assert!(!h.codes.is_valid(CodePool::Standard, "A1").await.unwrap());
    }

    #[tokio::test]
    async fn identifier_collisions_are_retried() {
        let ledger = Arc::new(CollidingLedger::new(InMemoryRegistrantLedger::default(), 2));
        let h = harness_with(ledger, StaticRenderer::new(), RecordingNotifier::new(), Duration::from_secs(5)).await;

        let outcome = h.service.admit(jane("A1")).await.unwrap();

        assert_eq!(outcome.event_id().as_str(), "edo-ahapn-0003");
        assert_eq!(h.ledger.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn exhausted_allocation_fails_and_frees_the_code() {
        let ledger = Arc::new(CollidingLedger::new(InMemoryRegistrantLedger::default(), 10));
        let h = harness_with(ledger, StaticRenderer::new(), RecordingNotifier::new(), Duration::from_secs(5)).await;

        let result = h.service.admit(jane("A1")).await;

        assert!(matches!(
            result,
            Err(AdmissionError::Failed(AdmissionFailure::AllocationExhausted { attempts: 3 }))
        ));
        assert_eq!(h.ledger.count().await.unwrap(), 0);
        assert!(h.codes.is_valid(CodePool::Standard, "A1").await.unwrap());
    }

    #[tokio::test]
    async fn timeout_after_persistence_reports_the_identifier() {
        let h = harness_with(
            Arc::new(InMemoryRegistrantLedger::default()),
            StaticRenderer::new().with_delay(Duration::from_secs(2)),
            RecordingNotifier::new(),
            Duration::from_millis(200),
        )
        .await;

        let result = h.service.admit(jane("A1")).await;

        match result {
            Err(AdmissionError::Timeout { event_id, in_doubt }) => {
                assert_eq!(event_id, Some(EventId::new("edo-ahapn-0001")));
                assert!(!in_doubt);
            },
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(!h.codes.is_valid(CodePool::Standard, "A1").await.unwrap());
        assert!(h.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn timeout_before_persistence_frees_the_code() {
        let ledger = SlowLedger::new(InMemoryRegistrantLedger::default()).with_lookup_delay(Duration::from_secs(2));
        let h = harness_with(
            Arc::new(ledger),
            StaticRenderer::new(),
            RecordingNotifier::new(),
            Duration::from_millis(200),
        )
        .await;

        let result = h.service.admit(jane("A1")).await;

        assert!(matches!(
            result,
            Err(AdmissionError::Timeout {
                event_id: None,
                in_doubt: false
            })
        ));
        assert!(h.codes.is_valid(CodePool::Standard, "A1").await.unwrap());
        assert_eq!(h.ledger.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn insert_landing_after_timeout_keeps_its_code() {
        let ledger = SlowLedger::new(InMemoryRegistrantLedger::default()).with_insert_delay(Duration::from_millis(200));
        let h = harness_with(
            Arc::new(ledger),
            StaticRenderer::new(),
            RecordingNotifier::new(),
            Duration::from_millis(150),
        )
        .await;

        let result = h.service.admit(jane("A1")).await;

        assert!(matches!(
            result,
            Err(AdmissionError::Timeout {
                event_id: None,
                in_doubt: true
            })
        ));
        // Still claimed while the insert is in flight
        assert!(!h.codes.is_valid(CodePool::Standard, "A1").await.unwrap());

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(h.ledger.count().await.unwrap(), 1);
        assert_eq!(h.codes.count(CodePool::Standard).await.unwrap(), 1);
        assert!(!h.codes.is_valid(CodePool::Standard, "A1").await.unwrap());
    }
}
