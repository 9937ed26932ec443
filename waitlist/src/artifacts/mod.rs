//! Registrant artifacts: the identity card and the certificate.
//!
//! Rendering sits behind [`ArtifactRenderer`] so the admission workflow and
//! the HTTP handlers can be tested without producing real PDFs.

mod pdf;

pub use pdf::PdfArtifactRenderer;

use crate::types::Registrant;
use async_trait::async_trait;
use thiserror::Error;

/// MIME type of every rendered artifact.
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Which document an [`Artifact`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Badge with photo, event id and barcode
    IdentityCard,
    /// Attendance certificate
    Certificate,
}

impl ArtifactKind {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::IdentityCard => "identity_card",
            Self::Certificate => "certificate",
        }
    }
}

/// A rendered document.
#[derive(Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Document type
    pub kind: ArtifactKind,
    /// Suggested download / attachment file name
    pub filename: String,
    /// PDF bytes
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Artifact")
            .field("kind", &self.kind)
            .field("filename", &self.filename)
            .field("size", &self.bytes.len())
            .finish()
    }
}

impl Artifact {
    /// Identity card for `registrant`, named `event_id_<email>.pdf`.
    #[must_use]
    pub fn identity_card(registrant: &Registrant, bytes: Vec<u8>) -> Self {
        Self {
            kind: ArtifactKind::IdentityCard,
            filename: format!("event_id_{}.pdf", registrant.email),
            bytes,
        }
    }

    /// Certificate for `registrant`, named `certificate_<name>.pdf`.
    #[must_use]
    pub fn certificate(registrant: &Registrant, bytes: Vec<u8>) -> Self {
        Self {
            kind: ArtifactKind::Certificate,
            filename: format!("certificate_{}.pdf", registrant.name),
            bytes,
        }
    }
}

/// Errors from rendering.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// PDF construction failed
    #[error("PDF generation failed: {0}")]
    Pdf(String),
    /// The barcode could not be encoded
    #[error("barcode encoding failed: {0}")]
    Barcode(String),
    /// The blocking render task did not complete
    #[error("render task failed: {0}")]
    Task(String),
}

/// Produces PDF documents from registrant records.
#[async_trait]
pub trait ArtifactRenderer: Send + Sync {
    /// Render the identity card.
    async fn render_identity_card(&self, registrant: &Registrant) -> Result<Artifact, RenderError>;

    /// Render the certificate.
    async fn render_certificate(&self, registrant: &Registrant) -> Result<Artifact, RenderError>;
}
