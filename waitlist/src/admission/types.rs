//! State of a single admission.

use crate::artifacts::Artifact;
use crate::types::{AdmissionRequest, CodePool, EventId, Registrant};
use std::fmt;

/// Where an admission is in the workflow.
///
/// The happy path visits every phase from `Received` to `Completed` in
/// order. `Rejected` ends validation failures, `Failed` infrastructure ones.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AdmissionPhase {
    /// Nothing submitted yet
    #[default]
    Idle,
    /// Request accepted for processing
    Received,
    /// Standard code claimed
    CodeValidated,
    /// Late-period rule satisfied (late code claimed, or before cutoff)
    LatePeriodChecked,
    /// Event identifier reserved
    IdentifierAllocated,
    /// Registrant stored in the ledger
    Persisted,
    /// Codes removed from their pools
    CodeConsumed,
    /// Identity card rendered
    ArtifactRendered,
    /// Delivery attempted
    Notified,
    /// Admission finished
    Completed,
    /// Validation failed; nothing was persisted
    Rejected(RejectionReason),
    /// An infrastructure step failed
    Failed(AdmissionFailure),
}

impl AdmissionPhase {
    /// `Completed`, `Rejected` or `Failed`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Rejected(_) | Self::Failed(_))
    }

    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Received => "received",
            Self::CodeValidated => "code_validated",
            Self::LatePeriodChecked => "late_period_checked",
            Self::IdentifierAllocated => "identifier_allocated",
            Self::Persisted => "persisted",
            Self::CodeConsumed => "code_consumed",
            Self::ArtifactRendered => "artifact_rendered",
            Self::Notified => "notified",
            Self::Completed => "completed",
            Self::Rejected(_) => "rejected",
            Self::Failed(_) => "failed",
        }
    }
}

/// Why a request was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    /// A required form field was blank (wire name)
    MissingField(&'static str),
    /// The email address is malformed
    InvalidEmail,
    /// Standard code unknown, used, or held by another admission
    InvalidCode,
    /// The late period is open and no late code was given
    LateCodeRequired,
    /// Late code unknown, used, or held by another admission
    InvalidLateCode,
    /// The email is already registered
    DuplicateEmail,
}

impl RejectionReason {
    /// Machine-readable code for API responses.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::MissingField(_) => "MISSING_FIELD",
            Self::InvalidEmail => "INVALID_EMAIL",
            Self::InvalidCode => "INVALID_CODE",
            Self::LateCodeRequired => "LATE_CODE_REQUIRED",
            Self::InvalidLateCode => "INVALID_LATE_CODE",
            Self::DuplicateEmail => "DUPLICATE_EMAIL",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "Missing required field: {field}"),
            Self::InvalidEmail => f.write_str("Invalid email address"),
            Self::InvalidCode => f.write_str("Invalid Registration Code"),
            Self::LateCodeRequired => f.write_str("Late Registration Code required"),
            Self::InvalidLateCode => f.write_str("Invalid Late Registration Code"),
            Self::DuplicateEmail => f.write_str("Email already registered on the waitlist."),
        }
    }
}

/// Why an admission failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionFailure {
    /// A store was unavailable during `step`
    Infrastructure {
        /// Workflow step that failed
        step: &'static str,
        /// Underlying error text
        message: String,
    },
    /// Every identifier tried collided with an existing one
    AllocationExhausted {
        /// Allocations attempted
        attempts: u32,
    },
    /// The identity card could not be rendered (registrant is persisted)
    RenderError(String),
    /// The workflow exceeded its time budget
    Timeout,
}

impl fmt::Display for AdmissionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Infrastructure { step, message } => write!(f, "{step} failed: {message}"),
            Self::AllocationExhausted { attempts } => {
                write!(f, "could not allocate a unique event id after {attempts} attempts")
            },
            Self::RenderError(reason) => write!(f, "rendering failed: {reason}"),
            Self::Timeout => f.write_str("admission timed out"),
        }
    }
}

/// Result of emailing the identity card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// The notifier accepted the message
    Sent,
    /// The notifier failed
    Failed {
        /// Error text
        reason: String,
    },
    /// No message was sent
    NotAttempted {
        /// Why sending was skipped
        reason: String,
    },
}

impl DeliveryStatus {
    /// Wire label: `sent`, `failed` or `notAttempted`.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Failed { .. } => "failed",
            Self::NotAttempted { .. } => "notAttempted",
        }
    }

    /// Error text, if any.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Sent => None,
            Self::Failed { reason } | Self::NotAttempted { reason } => Some(reason),
        }
    }
}

/// A code held by this admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeldCode {
    /// Pool the code was claimed in
    pub pool: CodePool,
    /// The code
    pub code: String,
}

/// Everything one admission has learned so far.
#[derive(Debug, Clone, Default)]
pub struct AdmissionState {
    /// Current phase
    pub phase: AdmissionPhase,
    /// Phases entered, in order (retries re-enter `LatePeriodChecked`)
    pub history: Vec<AdmissionPhase>,
    /// The request being processed
    pub request: Option<AdmissionRequest>,
    /// Codes claimed and not yet consumed or released
    pub held_codes: Vec<HeldCode>,
    /// Whether the late period applied
    pub late_code_required: bool,
    /// Identifier allocations attempted
    pub allocation_attempts: u32,
    /// Most recently allocated identifier
    pub event_id: Option<EventId>,
    /// Persisted registrant
    pub registrant: Option<Registrant>,
    /// Codes that could not be consumed after persistence
    pub consumption_failures: Vec<String>,
    /// Rendered identity card
    pub artifact: Option<Artifact>,
    /// Outcome of the welcome email
    pub delivery: Option<DeliveryStatus>,
}

impl AdmissionState {
    /// Move to `phase` and record it.
    pub fn enter(&mut self, phase: AdmissionPhase) {
        self.history.push(phase.clone());
        self.phase = phase;
    }

    /// Whether the workflow has stopped.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }
}
