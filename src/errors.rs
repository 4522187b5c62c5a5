//! Error types for quakewatch.
//!
//! Uses `thiserror` for library-style error definitions.

use thiserror::Error;

/// Errors that can occur in quakewatch operations.
#[derive(Error, Debug)]
pub enum QuakewatchError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed
    #[error("Failed to parse JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// API returned an error status
    #[error("Kandilli API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// API answered 200 but flagged the request as failed in-band
    #[error("Provider rejected request: {desc}")]
    Provider { desc: String },

    /// Invalid response structure
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Event validation failed
    #[error("Invalid event data: {0}")]
    Validation(String),

    /// File write failed (CSV export)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
