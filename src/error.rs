//! Error types for batch-uploader
//!
//! This module provides error handling for the library, including:
//! - The per-row failure taxonomy (not found, unsupported format, download,
//!   extraction, transcode, publish, cancellation)
//! - Batch-level errors returned before any row is submitted
//! - HTTP status code mapping for the control API

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for batch-uploader operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for batch-uploader
///
/// Row-level variants end up verbatim in a row's `TaskResult`; batch-level
/// variants are returned from [`crate::BatchUploader::start`].
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "upload.parallelism")
        key: Option<String>,
    },

    /// Local source file does not exist
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Source format could not be determined or is not accepted
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Target name is unusable after sanitizing
    #[error("invalid target name: {0}")]
    InvalidName(String),

    /// Plain URL download (and archive fallback) failed
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// Video platform extraction failed for every strategy
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Conversion into the accepted container failed
    #[error("transcode error: {0}")]
    Transcode(String),

    /// No reachable endpoint; callers block on this rather than fail
    #[error("network unavailable")]
    NetworkUnavailable,

    /// Repository refused the file (warning, duplicate, policy)
    #[error("upload warning: {0}")]
    PublishRejected(String),

    /// Publish call failed for any other reason
    #[error("upload failed: {0}")]
    Publish(String),

    /// Repository login failed
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Operator stopped the run
    #[error("stopped by user")]
    Cancelled,

    /// Input table could not be interpreted
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Input contained no row with both a source and a target
    #[error("no valid rows in input")]
    NoValidRows,

    /// Control command not allowed in the current run state
    #[error("cannot {operation} while {state}")]
    InvalidState {
        /// The operation that was attempted (e.g., "start", "reset")
        operation: String,
        /// The current run state
        state: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// CSV read/write error
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Spreadsheet read error
    #[error("spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    /// Spreadsheet write error
    #[error("spreadsheet write error: {0}")]
    SpreadsheetWrite(#[from] rust_xlsxwriter::XlsxError),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// External tool execution failed (yt-dlp, ffmpeg)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a configuration error tied to a key
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }

    /// Whether this error means the row should be reported as Skipped rather than Failed
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_) | Error::UnsupportedFormat(_) | Error::InvalidName(_)
        )
    }
}

/// Plain URL download errors
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Every direct attempt failed and the archive had nothing usable
    #[error("{url}: {attempts} attempts failed ({last_error}); archive fallback: {archive}")]
    Exhausted {
        /// The source URL
        url: String,
        /// Number of direct attempts made
        attempts: u32,
        /// Last direct-download error
        last_error: String,
        /// Outcome of the archive fallback
        archive: String,
    },

    /// Server answered with a non-success status
    #[error("HTTP {status} from {url}")]
    Status {
        /// The URL that was requested
        url: String,
        /// The HTTP status code
        status: u16,
    },

    /// Server answered with an empty body
    #[error("empty response body from {url}")]
    Empty {
        /// The URL that was requested
        url: String,
    },
}

/// Video platform extraction errors
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// A single extractor invocation failed
    #[error("{message}")]
    Attempt {
        /// Extractor's diagnostic output
        message: String,
        /// The platform asked for a bot check; retrying this strategy is pointless
        bot_check: bool,
    },

    /// Extractor ran but produced no file
    #[error("extractor produced no output file")]
    NoOutput,

    /// Every strategy and format selector failed
    #[error("all {attempts} extraction attempts failed for {url}: {last_error}")]
    Exhausted {
        /// The source URL
        url: String,
        /// Total attempts across strategies
        attempts: u32,
        /// Last extractor error
        last_error: String,
    },
}

impl ExtractionError {
    /// Whether the platform demanded a bot check
    pub fn is_bot_check(&self) -> bool {
        matches!(
            self,
            ExtractionError::Attempt {
                bot_check: true,
                ..
            }
        )
    }
}

/// API error response format
///
/// ```json
/// {
///   "error": {
///     "code": "invalid_state",
///     "message": "cannot start while running"
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "not_found", "invalid_state")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }

    /// Create an "unauthorized" error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("unauthorized", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - Client error (invalid input)
            Error::Config { .. } => 400,
            Error::InvalidInput(_) => 422,
            Error::NoValidRows => 422,
            Error::InvalidName(_) => 422,
            Error::UnsupportedFormat(_) => 422,

            // 404 Not Found
            Error::NotFound(_) => 404,

            // 409 Conflict - run is in the wrong state
            Error::InvalidState { .. } => 409,

            // 401 Unauthorized
            Error::Auth(_) => 401,

            // 500 Internal Server Error
            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::Csv(_) => 500,
            Error::Spreadsheet(_) | Error::SpreadsheetWrite(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Transcode(_) => 500,
            Error::Other(_) => 500,

            // 502 Bad Gateway - External service errors
            Error::Network(_) => 502,
            Error::Download(_) => 502,
            Error::Extraction(_) => 502,
            Error::Publish(_) => 502,
            Error::PublishRejected(_) => 502,

            // 503 Service Unavailable
            Error::NetworkUnavailable => 503,
            Error::ExternalTool(_) => 503,
            Error::Cancelled => 503,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::NotFound(_) => "not_found",
            Error::UnsupportedFormat(_) => "unsupported_format",
            Error::InvalidName(_) => "invalid_name",
            Error::Download(_) => "download_error",
            Error::Extraction(_) => "extraction_error",
            Error::Transcode(_) => "transcode_error",
            Error::NetworkUnavailable => "network_unavailable",
            Error::PublishRejected(_) => "publish_rejected",
            Error::Publish(_) => "publish_error",
            Error::Auth(_) => "auth_error",
            Error::Cancelled => "cancelled",
            Error::InvalidInput(_) => "invalid_input",
            Error::NoValidRows => "no_valid_rows",
            Error::InvalidState { .. } => "invalid_state",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::Csv(_) => "csv_error",
            Error::Spreadsheet(_) | Error::SpreadsheetWrite(_) => "spreadsheet_error",
            Error::ApiServerError(_) => "api_server_error",
            Error::ExternalTool(_) => "external_tool_error",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({ "key": key })),
            Error::InvalidState { operation, state } => Some(serde_json::json!({
                "operation": operation,
                "state": state,
            })),
            Error::NotFound(path) => Some(serde_json::json!({ "path": path })),
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_message_mentions_stopped() {
        assert_eq!(Error::Cancelled.to_string(), "stopped by user");
    }

    #[test]
    fn test_skip_classification() {
        assert!(Error::NotFound(PathBuf::from("/nope.png")).is_skip());
        assert!(Error::UnsupportedFormat("unknown".into()).is_skip());
        assert!(!Error::Publish("boom".into()).is_skip());
        assert!(!Error::Cancelled.is_skip());
    }

    #[test]
    fn test_invalid_state_maps_to_conflict() {
        let error = Error::InvalidState {
            operation: "start".into(),
            state: "running".into(),
        };
        assert_eq!(error.status_code(), 409);
        assert_eq!(error.error_code(), "invalid_state");

        let api: ApiError = error.into();
        assert_eq!(api.error.code, "invalid_state");
        assert_eq!(api.error.message, "cannot start while running");
        assert_eq!(api.error.details.unwrap()["operation"], "start");
    }

    #[test]
    fn test_bot_check_flag() {
        let err = ExtractionError::Attempt {
            message: "Sign in to confirm you're not a bot".into(),
            bot_check: true,
        };
        assert!(err.is_bot_check());
        assert!(!ExtractionError::NoOutput.is_bot_check());
    }

    #[test]
    fn test_config_error_details_carry_key() {
        let api: ApiError = Error::config("upload.parallelism", "must be at least 1").into();
        assert_eq!(api.error.code, "config_error");
        assert_eq!(api.error.details.unwrap()["key"], "upload.parallelism");
    }
}
