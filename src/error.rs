//! Error types for the resize server
//!
//! Every variant is terminal for the request that raised it. The `Display`
//! text of client-facing variants is exactly what the caller receives in
//! the `{"error": ...}` body.

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Result type for resize operations
pub type Result<T> = std::result::Result<T, ResizeError>;

/// Resize error type
#[derive(Error, Debug)]
pub enum ResizeError {
    #[error("missing file field named 'file'")]
    MissingFile,

    #[error("empty upload")]
    EmptyUpload,

    #[error("max_side must be an integer")]
    MaxSideNotInteger,

    #[error("max_side must be greater than zero")]
    MaxSideNotPositive,

    #[error("unsupported file type; use JPG, PNG, or PDF")]
    UnsupportedFormat,

    /// Corrupt or unrecognized raster payload
    #[error("unable to decode image")]
    Decode,

    /// The PDF backend is not compiled into this build
    #[error("PDF support requires {dependency}. Install it with {install}.")]
    PdfUnavailable {
        dependency: &'static str,
        install: &'static str,
    },

    /// PDF payload could not be loaded or rewritten; the detail is logged only
    #[error("unable to read PDF document")]
    InvalidPdf(String),

    /// Multipart stream failed (truncated body, size limit exceeded)
    #[error("failed to read upload: {0}")]
    Upload(#[from] MultipartError),

    #[error("unable to encode output: {0}")]
    Encode(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ResizeError {
    /// HTTP status for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ResizeError::Upload(e) => e.status(),
            ResizeError::Encode(_) | ResizeError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ResizeError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let message = match &self {
            ResizeError::Encode(detail) | ResizeError::Internal(detail) => {
                tracing::error!(error = %detail, "Resize failed");
                "internal error".to_string()
            }
            ResizeError::InvalidPdf(detail) => {
                tracing::warn!(error = %detail, "Rejected PDF upload");
                self.to_string()
            }
            ResizeError::PdfUnavailable { .. } => {
                tracing::warn!("PDF upload received but PDF support is not compiled in");
                self.to_string()
            }
            _ => {
                tracing::debug!(status = status.as_u16(), "Rejected upload: {}", self);
                self.to_string()
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
