//! Multipart form reading with upload limits.
//!
//! [`FormData::read`] drains an axum `Multipart` body into text fields and
//! file parts, enforcing a per-file size limit and an allowed content-type
//! prefix while streaming, so an oversized file is rejected without being
//! buffered in full.

use crate::error::AppError;
use axum::extract::Multipart;
use axum::extract::multipart::{Field, MultipartError};
use http::StatusCode;
use std::collections::HashMap;

/// Limits applied to file parts.
#[derive(Debug, Clone)]
pub struct UploadLimits {
    /// Largest accepted file, in bytes
    pub max_file_bytes: usize,
    /// Required content-type prefix, e.g. `image/`
    pub content_type_prefix: String,
}

impl UploadLimits {
    /// Image uploads up to `max_file_bytes`.
    #[must_use]
    pub fn images(max_file_bytes: usize) -> Self {
        Self {
            max_file_bytes,
            content_type_prefix: "image/".to_string(),
        }
    }

    fn too_large(&self) -> AppError {
        AppError::bad_request(format!(
            "Image file too large. Maximum size is {}.",
            human_size(self.max_file_bytes)
        ))
        .with_code("FILE_TOO_LARGE")
    }
}

/// A file part read from a multipart body.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Client-supplied file name
    pub file_name: String,
    /// Declared content type
    pub content_type: String,
    /// File contents
    pub bytes: Vec<u8>,
}

/// Text fields and files of a multipart form.
#[derive(Debug, Default)]
pub struct FormData {
    fields: HashMap<String, String>,
    files: HashMap<String, UploadedFile>,
}

impl FormData {
    /// Read every part of `multipart`.
    ///
    /// Parts with a non-empty file name are files; everything else is text.
    /// A file part with an empty file name and no content (what browsers
    /// send for an untouched file input) is ignored.
    ///
    /// # Errors
    ///
    /// Returns a 400 [`AppError`] for malformed bodies, files of the wrong
    /// type, or files over the size limit.
    pub async fn read(mut multipart: Multipart, limits: &UploadLimits) -> Result<Self, AppError> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| multipart_error(&e, limits))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            match field.file_name().map(str::to_string) {
                Some(file_name) if !file_name.is_empty() => {
                    let file = read_file(field, file_name, limits).await?;
                    form.files.insert(name, file);
                },
                Some(_) => {
                    // Empty file input
                    field.bytes().await.map_err(|e| multipart_error(&e, limits))?;
                },
                None => {
                    let text = field.text().await.map_err(|e| multipart_error(&e, limits))?;
                    form.fields.insert(name, text);
                },
            }
        }

        Ok(form)
    }

    /// Trimmed value of a text field; `None` when missing or blank.
    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// A file part by field name.
    #[must_use]
    pub fn file(&self, name: &str) -> Option<&UploadedFile> {
        self.files.get(name)
    }

    /// Take ownership of a file part.
    pub fn take_file(&mut self, name: &str) -> Option<UploadedFile> {
        self.files.remove(name)
    }
}

async fn read_file(
    mut field: Field<'_>,
    file_name: String,
    limits: &UploadLimits,
) -> Result<UploadedFile, AppError> {
    let content_type = field.content_type().unwrap_or_default().to_string();
    if !content_type.starts_with(&limits.content_type_prefix) {
        return Err(AppError::bad_request("Only image files are allowed!").with_code("INVALID_FILE_TYPE"));
    }

    let mut bytes = Vec::new();
    while let Some(chunk) = field.chunk().await.map_err(|e| multipart_error(&e, limits))? {
        if bytes.len() + chunk.len() > limits.max_file_bytes {
            return Err(limits.too_large());
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(UploadedFile {
        file_name,
        content_type,
        bytes,
    })
}

fn multipart_error(err: &MultipartError, limits: &UploadLimits) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        limits.too_large()
    } else {
        AppError::bad_request(format!("Malformed form data: {}", err.body_text()))
    }
}

fn human_size(bytes: usize) -> String {
    const MB: usize = 1024 * 1024;
    if bytes >= MB && bytes % MB == 0 {
        format!("{} MB", bytes / MB)
    } else {
        format!("{bytes} bytes")
    }
}
