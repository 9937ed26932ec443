//! Axum middleware for request tracking and observability.
//!
//! Every request gets a correlation ID: taken from the `X-Correlation-ID`
//! header when it holds a UUID, generated otherwise. The ID is stored in the
//! request extensions, attached to a tracing span wrapping the handler, and
//! echoed back in the response header.
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, middleware};
//! use waitlist_web::middleware::correlation_id;
//!
//! let app = Router::new()
//!     .route("/api/waitlist/count", get(count))
//!     .layer(middleware::from_fn(correlation_id));
//! ```

use axum::{
    async_trait,
    extract::{FromRequestParts, Request},
    http::{HeaderMap, HeaderValue, request::Parts},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;
use uuid::Uuid;

/// Header name for correlation ID.
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

/// Correlation ID for request tracing.
///
/// As an extractor it returns the ID assigned by [`correlation_id`], or
/// reads the header directly when the middleware is not installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelationId(pub Uuid);

impl CorrelationId {
    /// Read a UUID from the correlation header, or generate a new one.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let id = headers
            .get(CORRELATION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s.trim()).ok())
            .unwrap_or_else(Uuid::new_v4);
        Self(id)
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<Self>()
            .copied()
            .unwrap_or_else(|| Self::from_headers(&parts.headers)))
    }
}

/// Middleware function assigning a correlation ID to each request.
///
/// Install with `axum::middleware::from_fn(correlation_id)`.
pub async fn correlation_id(mut request: Request, next: Next) -> Response {
    let id = CorrelationId::from_headers(request.headers());
    request.extensions_mut().insert(id);

    let span = tracing::info_span!(
        "http_request",
        correlation_id = %id,
        method = %request.method(),
        uri = %request.uri(),
    );

    let mut response = next.run(request).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(&id.to_string()) {
        response.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }

    response
}
