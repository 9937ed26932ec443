//! Admission actions: the submit command and the result of each step.

use crate::artifacts::Artifact;
use crate::ledger::LedgerError;
use crate::types::{AdmissionRequest, EventId, Registrant};

/// Inputs to the admission reducer.
#[derive(Debug, Clone)]
pub enum AdmissionAction {
    // Command
    /// Start processing a request
    Submit {
        /// The normalised request
        request: AdmissionRequest,
    },

    // Step results
    /// The standard code claim finished
    StandardCodeClaimed {
        /// Whether the claim succeeded
        claimed: bool,
    },
    /// The late code claim finished
    LateCodeClaimed {
        /// Whether the claim succeeded
        claimed: bool,
    },
    /// The duplicate-email lookup finished
    EmailChecked {
        /// Whether the email is already registered
        taken: bool,
    },
    /// The ledger reserved an identifier
    IdentifierAllocated {
        /// Reserved identifier
        event_id: EventId,
    },
    /// The registrant was stored
    RegistrantPersisted {
        /// Stored record
        registrant: Registrant,
    },
    /// The ledger refused the insert on a uniqueness constraint
    PersistenceConflict {
        /// `DuplicateEmail` or `DuplicateEventId`
        error: LedgerError,
    },
    /// Backoff elapsed; allocate another identifier
    RetryAllocation,
    /// Held codes were consumed
    CodesConsumed {
        /// Codes that could not be consumed
        failures: Vec<String>,
    },
    /// The identity card was rendered
    ArtifactRendered {
        /// Rendered card
        artifact: Artifact,
    },
    /// The identity card could not be rendered
    RenderingFailed {
        /// Error text
        reason: String,
    },
    /// The welcome email was sent
    DeliverySucceeded,
    /// The welcome email could not be sent
    DeliveryFailed {
        /// Error text
        reason: String,
    },
    /// A store call failed
    InfrastructureFailed {
        /// Workflow step that failed
        step: &'static str,
        /// Error text
        message: String,
    },
}
