//! Binary PDF download responses.

use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

/// A PDF sent as a file download.
///
/// Renders `200 OK` with `Content-Type: application/pdf` and
/// `Content-Disposition: attachment; filename=...`.
#[derive(Debug, Clone)]
pub struct PdfAttachment {
    filename: String,
    bytes: Vec<u8>,
}

impl PdfAttachment {
    /// Wrap rendered bytes under the given download name.
    #[must_use]
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }

    /// The `Content-Disposition` value, with characters that would break
    /// the header replaced.
    #[must_use]
    pub fn content_disposition(&self) -> String {
        let safe: String = self
            .filename
            .chars()
            .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '_' })
            .map(|c| if matches!(c, '"' | '\\' | ';') { '_' } else { c })
            .collect();
        format!("attachment; filename=\"{safe}\"")
    }
}

impl IntoResponse for PdfAttachment {
    fn into_response(self) -> Response {
        let disposition = HeaderValue::from_str(&self.content_disposition())
            .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

        (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, HeaderValue::from_static("application/pdf")),
                (header::CONTENT_DISPOSITION, disposition),
            ],
            self.bytes,
        )
            .into_response()
    }
}
