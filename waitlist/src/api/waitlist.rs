//! Waitlist endpoints.
//!
//! - `POST /api/waitlist` - admit a registrant (multipart, optional `image`)
//! - `GET /api/waitlist/count` - number of registrants
//! - `GET /api/waitlist/:email` - event id for an email

use crate::admission::{AdmissionError, AdmissionFailure, AdmissionOutcome};
use crate::queries::QueryError;
use crate::server::state::AppState;
use crate::types::{EventId, RegistrationForm};
use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
};
use serde::Serialize;
use waitlist_web::{AppError, CorrelationId, FormData};

// ============================================================================
// Response Types
// ============================================================================

/// Body of a successful admission.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionResponse {
    /// Fixed confirmation text
    pub message: &'static str,
    /// Assigned identifier
    pub event_id: EventId,
    /// `sent`, `failed` or `notAttempted`
    pub delivery: &'static str,
    /// Why the identity card email did not go out
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_error: Option<String>,
}

impl From<&AdmissionOutcome> for AdmissionResponse {
    fn from(outcome: &AdmissionOutcome) -> Self {
        Self {
            message: "Waitlist entry created!",
            event_id: outcome.registrant.event_id.clone(),
            delivery: outcome.delivery.label(),
            delivery_error: outcome.delivery.reason().map(str::to_string),
        }
    }
}

/// Waitlist size.
#[derive(Debug, Serialize)]
pub struct CountResponse {
    /// Registrants on the waitlist
    pub count: u64,
}

/// Event id lookup result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupResponse {
    /// Identifier registered for the email
    pub event_id: EventId,
}

// ============================================================================
// Handlers
// ============================================================================

/// Admit a registrant.
///
/// Text fields `name`, `email`, `phoneNumber`, `state`, `regId` and optional
/// `lateRegId`; optional file field `image`.
///
/// # Errors
///
/// 400 for validation failures, 408 when the workflow times out, 500 for
/// infrastructure failures.
#[tracing::instrument(skip(state, multipart))]
pub async fn join_waitlist(
    State(state): State<AppState>,
    correlation_id: CorrelationId,
    multipart: Multipart,
) -> Result<(StatusCode, Json<AdmissionResponse>), AppError> {
    let mut form = FormData::read(multipart, &state.settings.uploads).await?;

    let photo = form.take_file("image");
    if photo.is_none() && state.settings.require_photo {
        return Err(AppError::bad_request("No image uploaded").with_code("MISSING_IMAGE"));
    }

    let photo_reference = match photo {
        Some(file) => {
            let now = state.admissions.environment().clock.now();
            let reference = state
                .photos
                .save(&file.file_name, &file.bytes, now)
                .await
                .map_err(|e| AppError::internal("Failed to store image").with_source(e))?;
            Some(reference)
        },
        None => None,
    };

    let text = |name: &str| form.text(name).unwrap_or_default().to_string();
    let registration = RegistrationForm {
        name: text("name"),
        email: text("email"),
        phone_number: text("phoneNumber"),
        state: text("state"),
        code: text("regId"),
        late_code: form.text("lateRegId").map(str::to_string),
        photo_reference: photo_reference.clone(),
    };

    match state.admissions.admit(registration).await {
        Ok(outcome) => {
            tracing::info!(
                event_id = %outcome.registrant.event_id,
                delivery = outcome.delivery.label(),
                "Waitlist entry created"
            );
            Ok((StatusCode::CREATED, Json(AdmissionResponse::from(&outcome))))
        },
        Err(error) => {
            // A registrant that was (or may yet be) recorded keeps its photo
            let persisted = matches!(
                error,
                AdmissionError::Timeout { event_id: Some(_), .. } | AdmissionError::Timeout { in_doubt: true, .. }
            );
            if let (Some(reference), false) = (&photo_reference, persisted) {
                if let Err(e) = state.photos.discard(reference).await {
                    tracing::warn!(photo = %reference, error = %e, "Photo of failed admission not removed");
                }
            }
            Err(admission_error(error))
        },
    }
}

/// Number of registrants on the waitlist.
///
/// # Errors
///
/// 500 if the ledger is unavailable.
pub async fn count(State(state): State<AppState>) -> Result<Json<CountResponse>, AppError> {
    let count = state.queries.count().await.map_err(query_error)?;
    Ok(Json(CountResponse { count }))
}

/// Event id registered for `email`.
///
/// # Errors
///
/// 404 for unknown emails.
#[tracing::instrument(skip(state))]
pub async fn lookup(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<LookupResponse>, AppError> {
    let event_id = state.queries.event_id_for(&email).await.map_err(query_error)?;
    Ok(Json(LookupResponse { event_id }))
}

// ============================================================================
// Error mapping
// ============================================================================

fn admission_error(error: AdmissionError) -> AppError {
    match error {
        AdmissionError::Rejected(reason) => AppError::bad_request(reason.to_string()).with_code(reason.code()),
        AdmissionError::Timeout { event_id, in_doubt } => {
            let message = match (&event_id, in_doubt) {
                (Some(event_id), _) => format!("Registration timed out after being recorded as {event_id}"),
                (None, true) => "Registration timed out; look up your email before trying again".to_string(),
                (None, false) => "Registration timed out; please try again".to_string(),
            };
            AppError::timeout(message)
        },
        AdmissionError::Failed(AdmissionFailure::AllocationExhausted { attempts }) => {
            AppError::internal("Failed to add to waitlist")
                .with_code("ALLOCATION_EXHAUSTED")
                .with_source(anyhow::anyhow!("event id allocation collided {attempts} times"))
        },
        other => AppError::internal("Failed to add to waitlist").with_source(other),
    }
}

/// Map a query failure to a response.
pub(crate) fn query_error(error: QueryError) -> AppError {
    match error {
        QueryError::NotFound => AppError::not_found("User not found"),
        other => AppError::internal("Server error").with_source(other),
    }
}
