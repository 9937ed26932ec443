//! Health check endpoints.

use super::state::AppState;
use crate::types::CodePool;
use axum::extract::State;
use waitlist_web::handlers::{ComponentCheck, ReadinessReport};

pub use waitlist_web::handlers::health_check;

/// Readiness check endpoint.
///
/// Returns 200 when the ledger and the code store answer, 503 otherwise.
pub async fn readiness_check(State(state): State<AppState>) -> ReadinessReport {
    let ledger = match state.ledger.count().await {
        Ok(_) => ComponentCheck::healthy("ledger"),
        Err(e) => ComponentCheck::unhealthy("ledger", e.to_string()),
    };
    let codes = match state.codes.count(CodePool::Standard).await {
        Ok(_) => ComponentCheck::healthy("codes"),
        Err(e) => ComponentCheck::unhealthy("codes", e.to_string()),
    };
    ReadinessReport::new(vec![ledger, codes])
}
