//! Admission reducer.
//!
//! Drives one request through:
//! 1. Claim the standard code
//! 2. Late-period check (claim the late code when the cutoff has passed)
//! 3. Duplicate-email lookup, then allocate an event identifier
//! 4. Persist the registrant (identifier collisions go back to step 3)
//! 5. Consume the claimed codes
//! 6. Render the identity card
//! 7. Email it
//!
//! Codes are claimed during validation and consumed only once the registrant
//! is persisted. Any rejection or failure before persistence releases the
//! claims, so the codes stay usable.

use super::actions::AdmissionAction;
use super::environment::AdmissionEnvironment;
use super::types::{
    AdmissionFailure, AdmissionPhase, AdmissionState, DeliveryStatus, HeldCode, RejectionReason,
};
use crate::ledger::LedgerError;
use crate::notify::Delivery;
use crate::types::{AdmissionRequest, CodePool, EventId, Registrant};
use std::sync::Arc;
use uuid::Uuid;
use waitlist_core::{SmallVec, effect::Effect, reducer::Reducer, smallvec};

type Effects = SmallVec<[Effect<AdmissionAction>; 4]>;

/// Reducer for a single admission.
#[derive(Clone, Debug, Default)]
pub struct AdmissionReducer;

impl AdmissionReducer {
    /// Creates a new `AdmissionReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    // ========== Transitions ==========

    fn submit(state: &mut AdmissionState, request: AdmissionRequest, env: &AdmissionEnvironment) -> Effects {
        state.request = Some(request.clone());
        state.enter(AdmissionPhase::Received);

        if let Some(field) = request.form.first_missing_field() {
            return Self::reject(state, RejectionReason::MissingField(field), env);
        }
        if !is_plausible_email(&request.form.email) {
            return Self::reject(state, RejectionReason::InvalidEmail, env);
        }

        smallvec![Self::claim_code(
            env,
            CodePool::Standard,
            request.form.code,
            request.admission_id
        )]
    }

    fn standard_code_claimed(
        state: &mut AdmissionState,
        claimed: bool,
        env: &AdmissionEnvironment,
    ) -> Effects {
        let Some(request) = state.request.clone() else {
            return Self::missing_request(state, env);
        };
        if !claimed {
            return Self::reject(state, RejectionReason::InvalidCode, env);
        }

        state.held_codes.push(HeldCode {
            pool: CodePool::Standard,
            code: request.form.code.clone(),
        });
        state.enter(AdmissionPhase::CodeValidated);

        if !env.policy.is_late_period(env.clock.now()) {
            state.enter(AdmissionPhase::LatePeriodChecked);
            return smallvec![Self::check_email(env, request.form.email)];
        }

        state.late_code_required = true;
        match request.form.late_code {
            Some(late_code) => smallvec![Self::claim_code(
                env,
                CodePool::Late,
                late_code,
                request.admission_id
            )],
            None => Self::reject(state, RejectionReason::LateCodeRequired, env),
        }
    }

    fn late_code_claimed(state: &mut AdmissionState, claimed: bool, env: &AdmissionEnvironment) -> Effects {
        let Some(request) = state.request.clone() else {
            return Self::missing_request(state, env);
        };
        if !claimed {
            return Self::reject(state, RejectionReason::InvalidLateCode, env);
        }
        if let Some(late_code) = request.form.late_code {
            state.held_codes.push(HeldCode {
                pool: CodePool::Late,
                code: late_code,
            });
        }
        state.enter(AdmissionPhase::LatePeriodChecked);
        smallvec![Self::check_email(env, request.form.email)]
    }

    fn email_checked(state: &mut AdmissionState, taken: bool, env: &AdmissionEnvironment) -> Effects {
        if taken {
            return Self::reject(state, RejectionReason::DuplicateEmail, env);
        }
        state.allocation_attempts += 1;
        smallvec![Self::allocate(env)]
    }

    fn identifier_allocated(
        state: &mut AdmissionState,
        event_id: EventId,
        env: &AdmissionEnvironment,
    ) -> Effects {
        let Some(request) = state.request.clone() else {
            return Self::missing_request(state, env);
        };
        state.event_id = Some(event_id.clone());
        state.enter(AdmissionPhase::IdentifierAllocated);

        let form = request.form;
        let registrant = Registrant {
            name: form.name,
            email: form.email,
            phone_number: form.phone_number,
            state: form.state,
            photo_reference: form.photo_reference,
            event_id,
            submitted_code: form.code,
            late_code: if state.late_code_required { form.late_code } else { None },
            created_at: env.clock.now(),
        };
        smallvec![Self::persist(env, registrant)]
    }

    fn persistence_conflict(
        state: &mut AdmissionState,
        error: LedgerError,
        env: &AdmissionEnvironment,
    ) -> Effects {
        match error {
            LedgerError::DuplicateEmail(_) => Self::reject(state, RejectionReason::DuplicateEmail, env),
            LedgerError::DuplicateEventId(event_id) => {
                let attempts = state.allocation_attempts;
                if attempts >= env.policy.max_allocation_attempts {
                    tracing::error!(%event_id, attempts, "Event id allocation exhausted");
                    return Self::fail(state, AdmissionFailure::AllocationExhausted { attempts }, env);
                }

                tracing::warn!(%event_id, attempts, "Event id collision, allocating again");
                state.enter(AdmissionPhase::LatePeriodChecked);
                smallvec![Effect::Delay {
                    duration: env.policy.allocation_backoff.delay_for_attempt(attempts.saturating_sub(1)),
                    action: Box::new(AdmissionAction::RetryAllocation),
                }]
            },
            LedgerError::Unavailable(message) => Self::fail(
                state,
                AdmissionFailure::Infrastructure {
                    step: "persist_registrant",
                    message,
                },
                env,
            ),
        }
    }

    fn registrant_persisted(
        state: &mut AdmissionState,
        registrant: Registrant,
        env: &AdmissionEnvironment,
    ) -> Effects {
        tracing::info!(event_id = %registrant.event_id, email = %registrant.email, "Registrant persisted");
        let event_id = registrant.event_id.clone();
        state.registrant = Some(registrant);
        state.enter(AdmissionPhase::Persisted);
        smallvec![Self::consume_codes(env, state.held_codes.clone(), event_id)]
    }

    fn codes_consumed(state: &mut AdmissionState, failures: Vec<String>, env: &AdmissionEnvironment) -> Effects {
        state.held_codes.clear();
        state.consumption_failures = failures;
        state.enter(AdmissionPhase::CodeConsumed);

        match state.registrant.clone() {
            Some(registrant) => smallvec![Self::render(env, registrant)],
            None => Self::missing_request(state, env),
        }
    }

    fn artifact_rendered(
        state: &mut AdmissionState,
        artifact: crate::artifacts::Artifact,
        env: &AdmissionEnvironment,
    ) -> Effects {
        let Some(registrant) = state.registrant.clone() else {
            return Self::missing_request(state, env);
        };
        state.artifact = Some(artifact.clone());
        state.enter(AdmissionPhase::ArtifactRendered);

        let delivery = env.policy.messages.welcome(&registrant, artifact);
        smallvec![Self::notify(env, delivery)]
    }

    fn delivery_finished(state: &mut AdmissionState, status: DeliveryStatus) -> Effects {
        if let (DeliveryStatus::Failed { reason }, Some(registrant)) = (&status, &state.registrant) {
            tracing::warn!(event_id = %registrant.event_id, error = %reason, "Welcome email not delivered");
        }
        state.delivery = Some(status);
        state.enter(AdmissionPhase::Notified);
        state.enter(AdmissionPhase::Completed);
        SmallVec::new()
    }

    // ========== Terminal transitions ==========

    fn reject(state: &mut AdmissionState, reason: RejectionReason, env: &AdmissionEnvironment) -> Effects {
        tracing::info!(reason = %reason, "Admission rejected");
        state.enter(AdmissionPhase::Rejected(reason));
        Self::release_held(state, env).into_iter().collect()
    }

    fn fail(state: &mut AdmissionState, failure: AdmissionFailure, env: &AdmissionEnvironment) -> Effects {
        tracing::error!(failure = %failure, phase = state.phase.name(), "Admission failed");
        state.enter(AdmissionPhase::Failed(failure));
        if state.registrant.is_some() {
            return SmallVec::new();
        }
        Self::release_held(state, env).into_iter().collect()
    }

    fn missing_request(state: &mut AdmissionState, env: &AdmissionEnvironment) -> Effects {
        Self::fail(
            state,
            AdmissionFailure::Infrastructure {
                step: "workflow",
                message: "admission state is incomplete".to_string(),
            },
            env,
        )
    }

    // ========== Effects ==========

    fn release_held(state: &mut AdmissionState, env: &AdmissionEnvironment) -> Option<Effect<AdmissionAction>> {
        let claimant = state.request.as_ref()?.admission_id;
        if state.held_codes.is_empty() {
            return None;
        }
        let held = std::mem::take(&mut state.held_codes);
        let codes = Arc::clone(&env.codes);

        Some(Effect::fire_and_forget(async move {
            for HeldCode { pool, code } in held {
                if let Err(e) = codes.release(pool, &code, claimant).await {
                    tracing::warn!(%pool, code = %code, error = %e, "Code claim not released");
                }
            }
        }))
    }

    fn claim_code(env: &AdmissionEnvironment, pool: CodePool, code: String, claimant: Uuid) -> Effect<AdmissionAction> {
        let codes = Arc::clone(&env.codes);
        Effect::future(async move {
            Some(match codes.claim(pool, &code, claimant).await {
                Ok(claimed) => match pool {
                    CodePool::Standard => AdmissionAction::StandardCodeClaimed { claimed },
                    CodePool::Late => AdmissionAction::LateCodeClaimed { claimed },
                },
                Err(e) => AdmissionAction::InfrastructureFailed {
                    step: "claim_code",
                    message: e.to_string(),
                },
            })
        })
    }

    fn check_email(env: &AdmissionEnvironment, email: String) -> Effect<AdmissionAction> {
        let ledger = Arc::clone(&env.ledger);
        Effect::future(async move {
            Some(match ledger.find_by_email(&email).await {
                Ok(existing) => AdmissionAction::EmailChecked {
                    taken: existing.is_some(),
                },
                Err(e) => AdmissionAction::InfrastructureFailed {
                    step: "check_email",
                    message: e.to_string(),
                },
            })
        })
    }

    fn allocate(env: &AdmissionEnvironment) -> Effect<AdmissionAction> {
        let ledger = Arc::clone(&env.ledger);
        Effect::future(async move {
            Some(match ledger.next_event_id().await {
                Ok(event_id) => AdmissionAction::IdentifierAllocated { event_id },
                Err(e) => AdmissionAction::InfrastructureFailed {
                    step: "allocate_identifier",
                    message: e.to_string(),
                },
            })
        })
    }

    fn persist(env: &AdmissionEnvironment, registrant: Registrant) -> Effect<AdmissionAction> {
        let ledger = Arc::clone(&env.ledger);
        Effect::future(async move {
            Some(match ledger.insert(registrant).await {
                Ok(registrant) => AdmissionAction::RegistrantPersisted { registrant },
                Err(error @ (LedgerError::DuplicateEmail(_) | LedgerError::DuplicateEventId(_))) => {
                    AdmissionAction::PersistenceConflict { error }
                },
                Err(e) => AdmissionAction::InfrastructureFailed {
                    step: "persist_registrant",
                    message: e.to_string(),
                },
            })
        })
    }

    fn consume_codes(env: &AdmissionEnvironment, held: Vec<HeldCode>, event_id: EventId) -> Effect<AdmissionAction> {
        let codes = Arc::clone(&env.codes);
        Effect::future(async move {
            let mut failures = Vec::new();
            for HeldCode { pool, code } in held {
                if let Err(e) = codes.consume(pool, &code).await {
                    // The registrant stands; the code is logged for follow-up
                    tracing::warn!(%event_id, %pool, code = %code, error = %e, "Code not consumed after persistence");
                    metrics::counter!("waitlist_code_consumption_failures_total").increment(1);
                    failures.push(code);
                }
            }
            Some(AdmissionAction::CodesConsumed { failures })
        })
    }

    fn render(env: &AdmissionEnvironment, registrant: Registrant) -> Effect<AdmissionAction> {
        let renderer = Arc::clone(&env.renderer);
        Effect::future(async move {
            Some(match renderer.render_identity_card(&registrant).await {
                Ok(artifact) => AdmissionAction::ArtifactRendered { artifact },
                Err(e) => AdmissionAction::RenderingFailed { reason: e.to_string() },
            })
        })
    }

    fn notify(env: &AdmissionEnvironment, delivery: Delivery) -> Effect<AdmissionAction> {
        let notifier = Arc::clone(&env.notifier);
        Effect::future(async move {
            let result = notifier.send(&delivery).await;
            let status = if result.is_ok() { "sent" } else { "failed" };
            metrics::counter!("waitlist_deliveries_total", "kind" => "identity_card", "status" => status)
                .increment(1);
            Some(match result {
                Ok(()) => AdmissionAction::DeliverySucceeded,
                Err(e) => AdmissionAction::DeliveryFailed { reason: e.to_string() },
            })
        })
    }
}

impl Reducer for AdmissionReducer {
    type State = AdmissionState;
    type Action = AdmissionAction;
    type Environment = AdmissionEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        if state.is_terminal() {
            tracing::debug!(phase = state.phase.name(), ?action, "Ignoring action after admission ended");
            return SmallVec::new();
        }

        match (state.phase.clone(), action) {
            (AdmissionPhase::Idle, AdmissionAction::Submit { request }) => Self::submit(state, request, env),

            (AdmissionPhase::Received, AdmissionAction::StandardCodeClaimed { claimed }) => {
                Self::standard_code_claimed(state, claimed, env)
            },

            (AdmissionPhase::CodeValidated, AdmissionAction::LateCodeClaimed { claimed }) => {
                Self::late_code_claimed(state, claimed, env)
            },

            (AdmissionPhase::LatePeriodChecked, AdmissionAction::EmailChecked { taken }) => {
                Self::email_checked(state, taken, env)
            },

            (AdmissionPhase::LatePeriodChecked, AdmissionAction::RetryAllocation) => {
                state.allocation_attempts += 1;
                smallvec![Self::allocate(env)]
            },

            (AdmissionPhase::LatePeriodChecked, AdmissionAction::IdentifierAllocated { event_id }) => {
                Self::identifier_allocated(state, event_id, env)
            },

            (AdmissionPhase::IdentifierAllocated, AdmissionAction::PersistenceConflict { error }) => {
                Self::persistence_conflict(state, error, env)
            },

            (AdmissionPhase::IdentifierAllocated, AdmissionAction::RegistrantPersisted { registrant }) => {
                Self::registrant_persisted(state, registrant, env)
            },

            (AdmissionPhase::Persisted, AdmissionAction::CodesConsumed { failures }) => {
                Self::codes_consumed(state, failures, env)
            },

            (AdmissionPhase::CodeConsumed, AdmissionAction::ArtifactRendered { artifact }) => {
                Self::artifact_rendered(state, artifact, env)
            },

            (AdmissionPhase::CodeConsumed, AdmissionAction::RenderingFailed { reason }) => {
                state.delivery = Some(DeliveryStatus::NotAttempted {
                    reason: "identity card could not be rendered".to_string(),
                });
                Self::fail(state, AdmissionFailure::RenderError(reason), env)
            },

            (AdmissionPhase::ArtifactRendered, AdmissionAction::DeliverySucceeded) => {
                Self::delivery_finished(state, DeliveryStatus::Sent)
            },

            (AdmissionPhase::ArtifactRendered, AdmissionAction::DeliveryFailed { reason }) => {
                Self::delivery_finished(state, DeliveryStatus::Failed { reason })
            },

            (_, AdmissionAction::InfrastructureFailed { step, message }) => {
                Self::fail(state, AdmissionFailure::Infrastructure { step, message }, env)
            },

            (phase, action) => {
                tracing::warn!(phase = phase.name(), ?action, "Action not valid in current phase");
                SmallVec::new()
            },
        }
    }
}

/// `local@domain` with both parts non-empty and no whitespace.
fn is_plausible_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && !domain.is_empty() && !domain.contains('@'))
}
