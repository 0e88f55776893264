//! Error types for the md2docx-api service.
//!
//! One enum covers every failure the two pipelines can produce. Each variant
//! maps to exactly one HTTP status through [`ServiceError::status_code`], and
//! the router matches on the variants exhaustively instead of catching a
//! broad error class. Anything that escapes even that (a panic inside a
//! handler) is turned into a 500 at the event-mode boundary in
//! [`crate::adapter`].

use thiserror::Error;

/// All errors returned by the conversion and recognition pipelines.
#[derive(Debug, Error)]
pub enum ServiceError {
    // ── Caller errors ─────────────────────────────────────────────────────
    /// Malformed or missing caller input.
    #[error("{0}")]
    Validation(String),

    /// The request body is not in the expected media type.
    #[error("{0}")]
    UnsupportedMediaType(String),

    /// The request body exceeds the accepted size.
    #[error("{0}")]
    PayloadTooLarge(String),

    // ── Converter errors ──────────────────────────────────────────────────
    /// The external converter failed or produced no output artifact.
    ///
    /// `details` carries the converter's captured standard error, if any.
    #[error("{message}")]
    Conversion {
        message: String,
        details: Option<String>,
    },

    /// A bounded external operation exceeded its limit.
    #[error("{operation} timed out after {secs}s, please retry")]
    Timeout { operation: &'static str, secs: u64 },

    // ── Recognition errors ────────────────────────────────────────────────
    /// A required configuration value (the API credential) is absent.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The vision API did not answer within the configured bound.
    #[error("Vision API request timed out after {secs}s, retry or try a smaller image")]
    UpstreamTimeout { secs: u64 },

    /// The vision API returned a non-success status or could not be reached.
    #[error("{}", upstream_message(*.status, .detail))]
    Upstream { status: Option<u16>, detail: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn upstream_message(status: Option<u16>, detail: &str) -> String {
    match status {
        Some(code) => format!("Vision API returned HTTP {code}: {detail}"),
        None => format!("Vision API request failed: {detail}"),
    }
}

impl ServiceError {
    /// HTTP status code the router answers with for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::Validation(_) => 400,
            ServiceError::UnsupportedMediaType(_) => 415,
            ServiceError::PayloadTooLarge(_) => 413,
            ServiceError::Conversion { .. }
            | ServiceError::Timeout { .. }
            | ServiceError::Configuration(_)
            | ServiceError::UpstreamTimeout { .. }
            | ServiceError::Upstream { .. }
            | ServiceError::Internal(_) => 500,
        }
    }

    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServiceError::Timeout { .. } | ServiceError::UpstreamTimeout { .. }
        )
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(e: std::io::Error) -> Self {
        ServiceError::Internal(e.to_string())
    }
}
