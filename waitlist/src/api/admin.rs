//! Administrative endpoints, guarded by a bearer token.
//!
//! - `POST /api/admin/send-certificates` - email every registrant a certificate

use crate::certificates::SweepSummary;
use crate::server::state::AppState;
use axum::{
    Json,
    extract::State,
    http::{HeaderMap, header},
};
use waitlist_web::AppError;

/// Run the certificate sweep and report the totals.
///
/// # Errors
///
/// 401 without a matching `Authorization: Bearer` token (always, when no
/// token is configured); 500 if the registrant list cannot be read.
#[tracing::instrument(skip(state, headers))]
pub async fn send_certificates(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SweepSummary>, AppError> {
    authorize(&headers, state.settings.admin_token.as_deref())?;

    let summary = state
        .certificates
        .send_all()
        .await
        .map_err(|e| AppError::internal("Error sending certificates").with_source(e))?;
    Ok(Json(summary))
}

fn authorize(headers: &HeaderMap, expected: Option<&str>) -> Result<(), AppError> {
    let Some(expected) = expected else {
        tracing::warn!("Admin request refused: no admin token configured");
        return Err(AppError::unauthorized("Admin access is disabled"));
    };

    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .ok_or_else(|| AppError::unauthorized("Missing bearer token"))?;

    if constant_time_eq::constant_time_eq(presented.as_bytes(), expected.as_bytes()) {
        Ok(())
    } else {
        Err(AppError::unauthorized("Invalid bearer token"))
    }
}
