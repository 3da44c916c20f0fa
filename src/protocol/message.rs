//! Wire frame types and inbound classification.
//!
//! One JSON text message per frame. Outbound frames always carry a
//! correlation id; inbound frames with an id are command completions,
//! frames without one are events.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

use super::Command;

// ============================================================================
// CommandId
// ============================================================================

/// Correlation id pairing an outbound command with its response frame.
///
/// Ids are assigned by the connection from a monotonically increasing
/// counter; no two outstanding commands share an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(pub u64);

impl CommandId {
    /// Returns the raw id value.
    #[inline]
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// CommandFrame
// ============================================================================

/// A command request from local end to remote end.
///
/// # Format
///
/// ```json
/// { "id": 7, "method": "Page.navigate", "params": { "url": "..." } }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct CommandFrame {
    /// Correlation id assigned by the connection.
    pub id: CommandId,

    /// Command with method and params.
    #[serde(flatten)]
    pub command: Command,
}

impl CommandFrame {
    /// Creates a new command frame.
    #[inline]
    #[must_use]
    pub fn new(id: CommandId, command: Command) -> Self {
        Self { id, command }
    }
}

// ============================================================================
// ResponseFrame
// ============================================================================

/// A command completion from remote end to local end.
///
/// # Format
///
/// Success:
/// ```json
/// { "id": 7, "result": { ... } }
/// ```
///
/// Error:
/// ```json
/// { "id": 7, "error": { "code": -32000, "message": "..." } }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseFrame {
    /// Matches the command id it completes.
    pub id: CommandId,

    /// Result payload (if success).
    #[serde(default)]
    pub result: Option<Value>,

    /// Error payload (if error).
    #[serde(default)]
    pub error: Option<Value>,
}

impl ResponseFrame {
    /// Returns `true` if this is an error completion.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Extracts the result value, surfacing an error frame as a command
    /// failure carrying the protocol error payload verbatim.
    pub fn into_result(self) -> Result<Value> {
        if let Some(error) = self.error {
            return Err(Error::protocol(error.to_string()));
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

// ============================================================================
// EventFrame
// ============================================================================

/// An unsolicited event from remote end to local end.
///
/// # Format
///
/// ```json
/// { "method": "Network.responseReceived", "params": { ... } }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct EventFrame {
    /// Event name in `Domain.eventName` format.
    pub method: String,

    /// Event-specific data.
    #[serde(default)]
    pub params: Value,
}

impl EventFrame {
    /// Returns the domain name from the method.
    #[inline]
    #[must_use]
    pub fn domain(&self) -> &str {
        self.method.split('.').next().unwrap_or_default()
    }

    /// Gets a string from params.
    #[inline]
    #[must_use]
    pub fn get_string(&self, key: &str) -> String {
        self.params
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    }

    /// Gets a nested value from params by path.
    #[must_use]
    pub fn get_path<'a>(&'a self, path: &[&str]) -> Option<&'a Value> {
        let mut current = &self.params;
        for key in path {
            current = current.get(key)?;
        }
        Some(current)
    }
}

// ============================================================================
// IncomingFrame
// ============================================================================

/// Classification of an inbound text message.
///
/// A frame carrying an `id` is a command completion; one carrying a
/// `method` without an id is an event. Anything else is a protocol
/// violation.
#[derive(Debug, Clone)]
pub enum IncomingFrame {
    /// Completion of a previously issued command.
    Response(ResponseFrame),
    /// Unsolicited event notification.
    Event(EventFrame),
}

impl IncomingFrame {
    /// Parses and classifies a raw text frame.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;

        if value.get("id").is_some_and(Value::is_u64) {
            let response: ResponseFrame = serde_json::from_value(value)?;
            return Ok(Self::Response(response));
        }

        if value.get("method").is_some_and(Value::is_string) {
            let event: EventFrame = serde_json::from_value(value)?;
            return Ok(Self::Event(event));
        }

        Err(Error::protocol(format!(
            "frame is neither response nor event: {}",
            &text.chars().take(200).collect::<String>()
        )))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PageCommand;

    #[test]
    fn test_command_frame_serialization() {
        let command = Command::Page(PageCommand::Navigate {
            url: "https://example.com".to_string(),
        });
        let frame = CommandFrame::new(CommandId(3), command);
        let json = serde_json::to_string(&frame).expect("serialize");

        assert!(json.contains(r#""id":3"#));
        assert!(json.contains("Page.navigate"));
        assert!(json.contains("https://example.com"));
    }

    #[test]
    fn test_response_classification() {
        let frame = IncomingFrame::parse(r#"{"id": 7, "result": {"ok": true}}"#).expect("parse");
        match frame {
            IncomingFrame::Response(response) => {
                assert_eq!(response.id, CommandId(7));
                assert!(!response.is_error());
            }
            IncomingFrame::Event(_) => panic!("response classified as event"),
        }
    }

    #[test]
    fn test_event_classification() {
        let frame = IncomingFrame::parse(
            r#"{"method": "Network.requestWillBeSent", "params": {"requestId": "7"}}"#,
        )
        .expect("parse");
        match frame {
            IncomingFrame::Event(event) => {
                assert_eq!(event.domain(), "Network");
                assert_eq!(event.get_string("requestId"), "7");
            }
            IncomingFrame::Response(_) => panic!("event classified as response"),
        }
    }

    #[test]
    fn test_error_frame_surfaces_payload_verbatim() {
        let response: ResponseFrame =
            serde_json::from_str(r#"{"id": 1, "error": {"code": -32000, "message": "nope"}}"#)
                .expect("parse");
        let err = response.into_result().expect_err("must be error");
        let text = err.to_string();
        assert!(text.contains("-32000"));
        assert!(text.contains("nope"));
    }

    #[test]
    fn test_result_defaults_to_null() {
        let response: ResponseFrame = serde_json::from_str(r#"{"id": 2}"#).expect("parse");
        assert_eq!(response.into_result().expect("ok"), Value::Null);
    }

    #[test]
    fn test_garbage_frame_is_protocol_error() {
        let err = IncomingFrame::parse(r#"{"neither": true}"#).expect_err("must fail");
        assert!(matches!(err, Error::Protocol { .. }));
    }

    proptest::proptest! {
        /// A frame carrying a numeric id is never classified as an event,
        /// whatever its method or payload.
        #[test]
        fn prop_frames_with_ids_are_never_events(id in 0u64..u64::MAX / 2, method in "[A-Za-z]{1,12}\\.[A-Za-z]{1,16}") {
            let text = format!(r#"{{"id": {id}, "method": {method:?}, "result": {{}}}}"#);
            let frame = IncomingFrame::parse(&text).expect("parse");
            match frame {
                IncomingFrame::Response(response) => proptest::prop_assert_eq!(response.id, CommandId(id)),
                IncomingFrame::Event(_) => proptest::prop_assert!(false, "id'd frame classified as event"),
            }
        }
    }

    #[test]
    fn test_event_get_path() {
        let event = EventFrame {
            method: "Network.responseReceived".to_string(),
            params: serde_json::json!({"response": {"status": 200}}),
        };
        let status = event
            .get_path(&["response", "status"])
            .and_then(Value::as_u64);
        assert_eq!(status, Some(200));
    }
}
