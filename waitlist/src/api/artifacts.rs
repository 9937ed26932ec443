//! Document download endpoints.
//!
//! - `GET /api/event-id-pdf/:event_id` - identity card
//! - `GET /api/download-certificate/:email` - certificate, after the release date

use super::waitlist::query_error;
use crate::certificates::CertificateError;
use crate::server::state::AppState;
use axum::extract::{Path, State};
use waitlist_web::{AppError, PdfAttachment};

/// Identity card for `event_id`, re-rendered from the stored registrant.
///
/// # Errors
///
/// 404 for unknown identifiers, 500 when rendering fails.
#[tracing::instrument(skip(state))]
pub async fn identity_card(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> Result<PdfAttachment, AppError> {
    let card = state.queries.identity_card(&event_id).await.map_err(query_error)?;
    Ok(PdfAttachment::new(card.filename, card.bytes))
}

/// Certificate for `email`.
///
/// # Errors
///
/// 404 for unknown emails, 403 before the release date.
#[tracing::instrument(skip(state))]
pub async fn certificate(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<PdfAttachment, AppError> {
    let certificate = state
        .certificates
        .certificate_for(&email)
        .await
        .map_err(certificate_error)?;
    Ok(PdfAttachment::new(certificate.filename, certificate.bytes))
}

fn certificate_error(error: CertificateError) -> AppError {
    match error {
        CertificateError::NotFound => AppError::not_found("User not found"),
        gated @ CertificateError::NotYetReleased { .. } => {
            AppError::forbidden(gated.to_string()).with_code("NOT_YET_RELEASED")
        },
        other => AppError::internal("Error generating certificate").with_source(other),
    }
}
