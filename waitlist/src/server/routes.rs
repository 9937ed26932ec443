//! Router configuration for the waitlist service.

use super::health::{health_check, readiness_check};
use super::state::AppState;
use crate::api::{admin, artifacts, waitlist};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use waitlist_web::correlation_id;

/// Room for the text fields around the image in a registration body.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// Build the complete Axum router.
///
/// - `/health`, `/ready`: liveness and readiness
/// - `/api/...`: waitlist, artifact and admin endpoints
/// - `/uploads/...`: stored photos
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Admission and queries
        .route("/waitlist", post(waitlist::join_waitlist))
        .route("/waitlist/count", get(waitlist::count))
        .route("/waitlist/:email", get(waitlist::lookup))
        // Documents
        .route("/event-id-pdf/:event_id", get(artifacts::identity_card))
        .route("/download-certificate/:email", get(artifacts::certificate))
        // Admin
        .route("/admin/send-certificates", post(admin::send_certificates));

    // The upload reader enforces the image limit itself and reports it as 400
    let body_limit = state
        .settings
        .uploads
        .max_file_bytes
        .saturating_add(FORM_OVERHEAD_BYTES);
    let cors = cors_layer(&state.settings.cors_origin);
    let uploads = ServeDir::new(state.photos.dir());

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .nest("/api", api_routes)
        .nest_service("/uploads", uploads)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(correlation_id))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origin: &str) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origin.trim() == "*" {
        return cors.allow_origin(Any);
    }
    match HeaderValue::from_str(origin.trim()) {
        Ok(origin) => cors.allow_origin(origin),
        Err(e) => {
            tracing::warn!(%origin, error = %e, "Invalid CORS origin, allowing any");
            cors.allow_origin(Any)
        },
    }
}
