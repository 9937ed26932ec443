//! Admission workflow.
//!
//! A request moves through
//! `Received → CodeValidated → LatePeriodChecked → IdentifierAllocated →
//! Persisted → CodeConsumed → ArtifactRendered → Notified → Completed`,
//! ending early in `Rejected` or `Failed`. The transitions live in
//! [`AdmissionReducer`]; [`AdmissionService`] runs them in a store with a
//! timeout.

pub mod actions;
pub mod environment;
pub mod reducer;
pub mod service;
pub mod types;

pub use actions::AdmissionAction;
pub use environment::{AdmissionEnvironment, AdmissionPolicy};
pub use reducer::AdmissionReducer;
pub use service::{AdmissionError, AdmissionOutcome, AdmissionService};
pub use types::{
    AdmissionFailure, AdmissionPhase, AdmissionState, DeliveryStatus, HeldCode, RejectionReason,
};
