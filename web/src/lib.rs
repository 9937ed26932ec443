//! Axum integration for the waitlist admission service.
//!
//! This crate holds the HTTP plumbing that is independent of waitlist
//! rules, following the "Functional Core, Imperative Shell" split:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Imperative Shell (Axum)         │  ← multipart, PDFs, JSON errors
//! │  - Request parsing                      │  ← correlation IDs, tracing
//! │  - Response serialization               │
//! ├─────────────────────────────────────────┤
//! │         Functional Core                 │
//! │  - Admission reducer                    │  ← testable without I/O
//! │  - Effect descriptions (values)         │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Request Flow
//!
//! 1. **HTTP Request** arrives at an Axum handler
//! 2. **Extract data** ([`upload::FormData`], path parameters)
//! 3. **Build Action** and dispatch it through a `Store`
//! 4. **Map result** to a response or an [`AppError`]

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod pdf;
pub mod upload;

// Re-export key types for convenience
pub use error::AppError;
pub use middleware::{CORRELATION_ID_HEADER, CorrelationId, correlation_id};
pub use pdf::PdfAttachment;
pub use upload::{FormData, UploadLimits, UploadedFile};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
