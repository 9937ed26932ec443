//! Registrant photo storage.
//!
//! Photos are written to the uploads directory as `<millis>-<name>` and
//! referenced publicly as `/uploads/<file>`, which the server also serves
//! statically.

use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

/// Public URL prefix for stored photos.
pub const PUBLIC_PREFIX: &str = "/uploads/";

/// Errors from photo storage.
#[derive(Error, Debug)]
pub enum PhotoError {
    /// Filesystem failure
    #[error("photo storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The reference does not point inside the uploads directory
    #[error("invalid photo reference: {0}")]
    InvalidReference(String),
}

/// Filesystem photo store rooted at the uploads directory.
#[derive(Debug, Clone)]
pub struct PhotoStore {
    dir: PathBuf,
}

impl PhotoStore {
    /// Store photos under `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The uploads directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the uploads directory if missing.
    ///
    /// # Errors
    ///
    /// Returns [`PhotoError::Io`] if the directory cannot be created.
    pub async fn ensure_dir(&self) -> Result<(), PhotoError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    /// Write `bytes` and return the public reference.
    ///
    /// # Errors
    ///
    /// Returns [`PhotoError::Io`] if the file cannot be written.
    pub async fn save(
        &self,
        original_name: &str,
        bytes: &[u8],
        now: DateTime<Utc>,
    ) -> Result<String, PhotoError> {
        self.ensure_dir().await?;
        let name = sanitize_file_name(original_name);
        let millis = now.timestamp_millis();

        let mut attempt = 0u32;
        loop {
            let file_name = if attempt == 0 {
                format!("{millis}-{name}")
            } else {
                format!("{millis}-{attempt}-{name}")
            };

            let opened = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(self.dir.join(&file_name))
                .await;

            match opened {
                Ok(mut file) => {
                    file.write_all(bytes).await?;
                    file.flush().await?;
                    tracing::debug!(file = %file_name, size = bytes.len(), "Photo stored");
                    return Ok(format!("{PUBLIC_PREFIX}{file_name}"));
                },
                Err(e) if e.kind() == ErrorKind::AlreadyExists && attempt < 16 => attempt += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Read a stored photo by public reference.
    ///
    /// # Errors
    ///
    /// Returns [`PhotoError::InvalidReference`] for references outside the
    /// uploads directory and [`PhotoError::Io`] if the file cannot be read.
    pub async fn load(&self, reference: &str) -> Result<Vec<u8>, PhotoError> {
        let path = self.resolve(reference)?;
        Ok(tokio::fs::read(path).await?)
    }

    /// Delete a stored photo; a missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`PhotoError`] for invalid references or I/O failures.
    pub async fn discard(&self, reference: &str) -> Result<(), PhotoError> {
        let path = self.resolve(reference)?;
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn resolve(&self, reference: &str) -> Result<PathBuf, PhotoError> {
        let file_name = reference
            .strip_prefix(PUBLIC_PREFIX)
            .filter(|name| !name.is_empty() && sanitize_file_name(name) == *name)
            .ok_or_else(|| PhotoError::InvalidReference(reference.to_string()))?;
        Ok(self.dir.join(file_name))
    }
}

/// Reduce a client file name to `[A-Za-z0-9._-]`, never empty and never
/// starting with a dot.
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "photo".to_string()
    } else {
        cleaned.to_string()
    }
}
