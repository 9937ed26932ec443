//! Health check endpoints.
//!
//! `GET /health` is a liveness check and touches no dependency. Readiness depends
//! on the application's backing stores, so applications build a
//! [`ReadinessReport`] from their own component checks and return it.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Simple health check endpoint (for basic liveness).
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Health status levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Component is working
    Healthy,
    /// Component cannot serve requests
    Unhealthy,
}

/// Result of checking one component
#[derive(Debug, Clone, Serialize)]
pub struct ComponentCheck {
    /// Component name, e.g. `ledger`
    pub component: String,
    /// Status of the component
    pub status: HealthStatus,
    /// Failure detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ComponentCheck {
    /// A passing check
    #[must_use]
    pub fn healthy(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status: HealthStatus::Healthy,
            message: None,
        }
    }

    /// A failing check
    #[must_use]
    pub fn unhealthy(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
        }
    }
}

/// Aggregate readiness; `503` if any component is unhealthy
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessReport {
    /// Overall status
    pub status: HealthStatus,
    /// Individual checks
    pub checks: Vec<ComponentCheck>,
}

impl ReadinessReport {
    /// Combine component checks
    #[must_use]
    pub fn new(checks: Vec<ComponentCheck>) -> Self {
        let status = if checks.iter().all(|c| c.status == HealthStatus::Healthy) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };
        Self { status, checks }
    }
}

impl IntoResponse for ReadinessReport {
    fn into_response(self) -> Response {
        let status = match self.status {
            HealthStatus::Healthy => StatusCode::OK,
            HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, Json(self)).into_response()
    }
}
