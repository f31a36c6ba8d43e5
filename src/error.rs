//! Error type for the docsmith library.
//!
//! A single enum, [`DocsmithError`], covers both halves of the service: the
//! gateway (upload validation, downloads) and the dispatcher (operation
//! decoding, library failures). Every variant maps to one HTTP status via
//! [`DocsmithError::status_code`], and the `IntoResponse` impl turns it into
//! the `{success: false, message}` JSON body the front-end expects.
//!
//! Nothing here is retried. A failed request is logged and reported; the
//! process keeps serving.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DocsmithError>;

/// All errors returned by the docsmith library.
#[derive(Debug, Error)]
pub enum DocsmithError {
    // ── Request errors ────────────────────────────────────────────────────
    /// A required file or form field was not supplied.
    #[error("Missing input: {0}")]
    MissingInput(String),

    /// The operation identifier is unknown, or the operation is not implemented.
    #[error("Unsupported operation '{operation}': {reason}")]
    UnsupportedOperation { operation: String, reason: String },

    /// A form field was present but could not be parsed.
    #[error("Invalid value for '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    /// Declared content type is not accepted (globally or by this operation).
    #[error("Invalid file type '{content_type}' for '{file_name}'")]
    InvalidFileType {
        file_name: String,
        content_type: String,
    },

    /// An uploaded file exceeded the configured size limit.
    #[error("File '{file_name}' exceeds the maximum size of {limit} bytes")]
    PayloadTooLarge { file_name: String, limit: u64 },

    // ── Processing errors ─────────────────────────────────────────────────
    /// The underlying document/image library failed.
    #[error("Processing failed: {0}")]
    Processing(String),

    // ── Store errors ──────────────────────────────────────────────────────
    /// The requested output file does not exist (never produced, or evicted).
    #[error("File not found: '{0}'")]
    NotFound(String),

    /// Could not read or write the staging/output stores.
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DocsmithError {
    /// Wrap an I/O failure together with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Shorthand for a library failure with some context prepended.
    pub fn processing(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Processing(format!("{context}: {err}"))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingInput(_)
            | Self::UnsupportedOperation { .. }
            | Self::InvalidParameter { .. } => StatusCode::BAD_REQUEST,
            Self::InvalidFileType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Processing(_) | Self::Io { .. } | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to show to a caller. Store paths stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            Self::Io { .. } | Self::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for DocsmithError {
    fn into_response(self) -> Response {
        match &self {
            Self::Io { .. } | Self::Internal(_) | Self::Processing(_) => {
                tracing::error!("Request failed: {:#}", self);
            }
            Self::PayloadTooLarge { .. } | Self::InvalidFileType { .. } => {
                tracing::info!("Upload rejected: {}", self);
            }
            _ => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();
        let body = match &self {
            Self::Processing(detail) => json!({
                "success": false,
                "message": "Processing failed",
                "error": detail,
            }),
            _ => json!({
                "success": false,
                "message": self.user_message(),
            }),
        };

        (status, Json(body)).into_response()
    }
}

impl From<lopdf::Error> for DocsmithError {
    fn from(e: lopdf::Error) -> Self {
        Self::processing("PDF", e)
    }
}

impl From<image::ImageError> for DocsmithError {
    fn from(e: image::ImageError) -> Self {
        Self::processing("image", e)
    }
}

impl From<zip::result::ZipError> for DocsmithError {
    fn from(e: zip::result::ZipError) -> Self {
        Self::processing("docx archive", e)
    }
}

impl From<quick_xml::Error> for DocsmithError {
    fn from(e: quick_xml::Error) -> Self {
        Self::processing("docx XML", e)
    }
}
