//! Error types for the CDP automation driver.
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use xhs_driver::{Result, Session};
//!
//! async fn example(session: &Session) -> Result<()> {
//!     session.page().navigate("https://www.xiaohongshu.com").await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Connectivity | [`Error::Connectivity`], [`Error::ConnectionClosed`] |
//! | Protocol | [`Error::Protocol`], [`Error::CommandTimeout`] |
//! | Page execution | [`Error::Evaluation`], [`Error::Timeout`] |
//! | Structure lookup | [`Error::ElementNotFound`] |
//! | Capture | [`Error::CaptureStatus`], [`Error::CapturePayload`] |
//! | Input validation | [`Error::Validation`], [`Error::InvalidArgument`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`], [`Error::Http`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::protocol::CommandId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Connectivity Errors
    // ========================================================================
    /// Debugging endpoint unreachable.
    ///
    /// Returned when target listing fails even after one restart-and-retry
    /// cycle against the browser launcher.
    #[error("Cannot reach debugging endpoint: {message}")]
    Connectivity {
        /// Description of the connectivity failure.
        message: String,
    },

    /// WebSocket connection closed unexpectedly.
    ///
    /// Returned when the connection is lost while commands are in flight.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// The remote end answered a command with an error frame.
    ///
    /// Carries the protocol error payload verbatim.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Error payload from the remote end.
        message: String,
    },

    /// No response frame arrived for an issued command.
    #[error("Command {command_id} timed out after {timeout_ms}ms")]
    CommandTimeout {
        /// The command id that timed out.
        command_id: CommandId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Page Execution Errors
    // ========================================================================
    /// A page-context expression threw.
    ///
    /// Carries the page-side error description string.
    #[error("Evaluation error: {description}")]
    Evaluation {
        /// Description reported by the page realm.
        description: String,
    },

    /// A readiness or capture deadline elapsed.
    ///
    /// The message states what was being awaited.
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Structure Lookup Errors
    // ========================================================================
    /// A structural lookup in the page found nothing.
    ///
    /// Names the missing structure so callers can tell a site redesign
    /// from a flaky timing issue.
    #[error("Element not found: {what}")]
    ElementNotFound {
        /// Name of the missing structure.
        what: String,
    },

    // ========================================================================
    // Capture Errors
    // ========================================================================
    /// The captured API call completed with a non-200 status.
    ///
    /// The server is actively refusing; retrying the capture will not help.
    #[error("Captured API responded with status {status}: {url}")]
    CaptureStatus {
        /// HTTP status of the captured response.
        status: u16,
        /// URL the response belongs to.
        url: String,
    },

    /// The captured response body could not be parsed.
    ///
    /// Includes a bounded preview of the raw body for diagnosis.
    #[error("Failed to decode captured payload: {message}; preview={preview}")]
    CapturePayload {
        /// Parse error description.
        message: String,
        /// First characters of the raw body.
        preview: String,
    },

    // ========================================================================
    // Validation Errors
    // ========================================================================
    /// A filter value lies outside its fixed enumeration.
    ///
    /// Raised before any UI interaction begins.
    #[error("Invalid value for {dimension}: {value}. Valid options: {valid}")]
    Validation {
        /// Filter dimension being validated.
        dimension: String,
        /// The rejected value.
        value: String,
        /// Comma-joined list of accepted values.
        valid: String,
    },

    /// Invalid caller-supplied argument.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// HTTP error from the discovery endpoint.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a connectivity error.
    #[inline]
    pub fn connectivity(message: impl Into<String>) -> Self {
        Self::Connectivity {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a command timeout error.
    #[inline]
    pub fn command_timeout(command_id: CommandId, timeout_ms: u64) -> Self {
        Self::CommandTimeout {
            command_id,
            timeout_ms,
        }
    }

    /// Creates an evaluation error.
    #[inline]
    pub fn evaluation(description: impl Into<String>) -> Self {
        Self::Evaluation {
            description: description.into(),
        }
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Creates an element not found error.
    #[inline]
    pub fn element_not_found(what: impl Into<String>) -> Self {
        Self::ElementNotFound { what: what.into() }
    }

    /// Creates a capture status error.
    #[inline]
    pub fn capture_status(status: u16, url: impl Into<String>) -> Self {
        Self::CaptureStatus {
            status,
            url: url.into(),
        }
    }

    /// Creates a capture payload error with a bounded body preview.
    pub fn capture_payload(message: impl Into<String>, body: &str) -> Self {
        let preview: String = body.chars().take(300).collect();
        Self::CapturePayload {
            message: message.into(),
            preview,
        }
    }

    /// Creates a validation error.
    pub fn validation(
        dimension: impl Into<String>,
        value: impl Into<String>,
        valid: &[&str],
    ) -> Self {
        Self::Validation {
            dimension: dimension.into(),
            value: value.into(),
            valid: valid.join(", "),
        }
    }

    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::CommandTimeout { .. })
    }

    /// Returns `true` if this is a connectivity error.
    #[inline]
    #[must_use]
    pub fn is_connectivity_error(&self) -> bool {
        matches!(
            self,
            Self::Connectivity { .. }
                | Self::ConnectionClosed
                | Self::WebSocket(_)
                | Self::Http(_)
        )
    }

    /// Returns `true` if this error may succeed when retried at a coarser
    /// grain (e.g. reopening the filter panel).
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::CommandTimeout { .. } | Self::ElementNotFound { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::connectivity("refused");
        assert_eq!(err.to_string(), "Cannot reach debugging endpoint: refused");
    }

    #[test]
    fn test_capture_status_display() {
        let err = Error::capture_status(404, "https://x/api/list");
        assert_eq!(
            err.to_string(),
            "Captured API responded with status 404: https://x/api/list"
        );
    }

    #[test]
    fn test_capture_payload_preview_is_bounded() {
        let body = "x".repeat(2000);
        let err = Error::capture_payload("bad json", &body);
        match err {
            Error::CapturePayload { preview, .. } => assert_eq!(preview.chars().count(), 300),
            _ => panic!("expected CapturePayload"),
        }
    }

    #[test]
    fn test_validation_lists_options() {
        let err = Error::validation("sort_by", "乱序", &["综合", "最新"]);
        let text = err.to_string();
        assert!(text.contains("sort_by"));
        assert!(text.contains("乱序"));
        assert!(text.contains("综合, 最新"));
    }

    #[test]
    fn test_is_timeout() {
        let timeout_err = Error::timeout("waiting for panel", 5000);
        let other_err = Error::connectivity("test");

        assert!(timeout_err.is_timeout());
        assert!(!other_err.is_timeout());
    }

    #[test]
    fn test_is_connectivity_error() {
        assert!(Error::connectivity("test").is_connectivity_error());
        assert!(Error::ConnectionClosed.is_connectivity_error());
        assert!(!Error::protocol("test").is_connectivity_error());
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::timeout("test", 1000).is_recoverable());
        assert!(Error::element_not_found("publish button").is_recoverable());
        assert!(!Error::validation("sort_by", "x", &["a"]).is_recoverable());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
