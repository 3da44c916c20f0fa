//! Command definitions organized by CDP domain.
//!
//! Commands follow the `Domain.method` format.
//!
//! # Command Domains
//!
//! | Domain | Commands |
//! |--------|----------|
//! | `Page` | Lifecycle events, navigation |
//! | `Runtime` | Page-context evaluation |
//! | `Input` | Pointer event dispatch |
//! | `Network` | Traffic observation, response bodies, cookies |
//! | `Storage` | Origin storage reset |

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;

// ============================================================================
// Command Wrapper
// ============================================================================

/// All protocol commands organized by domain.
///
/// This enum wraps domain-specific command enums for unified serialization.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Command {
    /// Page domain commands.
    Page(PageCommand),
    /// Runtime domain commands.
    Runtime(RuntimeCommand),
    /// Input domain commands.
    Input(InputCommand),
    /// Network domain commands.
    Network(NetworkCommand),
    /// Storage domain commands.
    Storage(StorageCommand),
}

// ============================================================================
// Page Commands
// ============================================================================

/// Page domain commands.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "method", content = "params")]
pub enum PageCommand {
    /// Enable page lifecycle events.
    #[serde(rename = "Page.enable")]
    Enable,

    /// Navigate to URL.
    #[serde(rename = "Page.navigate")]
    Navigate {
        /// URL to navigate to.
        url: String,
    },
}

// ============================================================================
// Runtime Commands
// ============================================================================

/// Runtime domain commands for page-context evaluation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "method", content = "params")]
pub enum RuntimeCommand {
    /// Evaluate an expression in the page realm.
    ///
    /// Results cross the boundary by value, never by remote reference.
    #[serde(rename = "Runtime.evaluate")]
    Evaluate {
        /// Expression source.
        expression: String,
        /// Return plain-data values instead of remote object handles.
        #[serde(rename = "returnByValue")]
        return_by_value: bool,
        /// Await the expression when it evaluates to a Promise.
        #[serde(rename = "awaitPromise")]
        await_promise: bool,
    },
}

impl RuntimeCommand {
    /// Creates the standard by-value, promise-awaiting evaluation.
    #[inline]
    #[must_use]
    pub fn evaluate(expression: impl Into<String>) -> Self {
        Self::Evaluate {
            expression: expression.into(),
            return_by_value: true,
            await_promise: true,
        }
    }
}

// ============================================================================
// Input Commands
// ============================================================================

/// Input domain commands for pointer simulation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "method", content = "params")]
pub enum InputCommand {
    /// Dispatch one mouse event.
    #[serde(rename = "Input.dispatchMouseEvent")]
    DispatchMouseEvent {
        /// Event type: `mouseMoved`, `mousePressed` or `mouseReleased`.
        #[serde(rename = "type")]
        event_type: String,
        /// Viewport x coordinate.
        x: f64,
        /// Viewport y coordinate.
        y: f64,
        /// Mouse button, only for press/release.
        #[serde(skip_serializing_if = "Option::is_none")]
        button: Option<String>,
        /// Click count, only for press/release.
        #[serde(rename = "clickCount", skip_serializing_if = "Option::is_none")]
        click_count: Option<u32>,
    },
}

impl InputCommand {
    /// Creates a pointer move event.
    #[inline]
    #[must_use]
    pub fn mouse_moved(x: f64, y: f64) -> Self {
        Self::DispatchMouseEvent {
            event_type: "mouseMoved".to_string(),
            x,
            y,
            button: None,
            click_count: None,
        }
    }

    /// Creates a left-button press event.
    #[inline]
    #[must_use]
    pub fn mouse_pressed(x: f64, y: f64) -> Self {
        Self::button_event("mousePressed", x, y)
    }

    /// Creates a left-button release event.
    #[inline]
    #[must_use]
    pub fn mouse_released(x: f64, y: f64) -> Self {
        Self::button_event("mouseReleased", x, y)
    }

    fn button_event(event_type: &str, x: f64, y: f64) -> Self {
        Self::DispatchMouseEvent {
            event_type: event_type.to_string(),
            x,
            y,
            button: Some("left".to_string()),
            click_count: Some(1),
        }
    }
}

// ============================================================================
// Network Commands
// ============================================================================

/// Network domain commands for traffic observation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "method", content = "params")]
pub enum NetworkCommand {
    /// Enable network lifecycle events.
    #[serde(rename = "Network.enable")]
    Enable {
        /// Bound on buffered POST data per request.
        #[serde(rename = "maxPostDataSize")]
        max_post_data_size: u32,
    },

    /// Fetch a completed response body by request id.
    #[serde(rename = "Network.getResponseBody")]
    GetResponseBody {
        /// Transient request id from lifecycle events.
        #[serde(rename = "requestId")]
        request_id: String,
    },

    /// Clear all browser cookies.
    #[serde(rename = "Network.clearBrowserCookies")]
    ClearBrowserCookies,
}

// ============================================================================
// Storage Commands
// ============================================================================

/// Storage domain commands.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "method", content = "params")]
pub enum StorageCommand {
    /// Clear storage types for one origin.
    #[serde(rename = "Storage.clearDataForOrigin")]
    ClearDataForOrigin {
        /// Origin to clear.
        origin: String,
        /// Comma-joined storage type list.
        #[serde(rename = "storageTypes")]
        storage_types: String,
    },
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigate_serialization() {
        let command = Command::Page(PageCommand::Navigate {
            url: "https://www.xiaohongshu.com".to_string(),
        });
        let json = serde_json::to_string(&command).expect("serialize");

        assert!(json.contains(r#""method":"Page.navigate""#));
        assert!(json.contains(r#""url":"https://www.xiaohongshu.com""#));
    }

    #[test]
    fn test_unit_command_has_no_params() {
        let command = Command::Page(PageCommand::Enable);
        let json = serde_json::to_string(&command).expect("serialize");
        assert_eq!(json, r#"{"method":"Page.enable"}"#);
    }

    #[test]
    fn test_evaluate_is_by_value_and_awaits() {
        let command = Command::Runtime(RuntimeCommand::evaluate("1 + 1"));
        let json = serde_json::to_string(&command).expect("serialize");

        assert!(json.contains(r#""returnByValue":true"#));
        assert!(json.contains(r#""awaitPromise":true"#));
    }

    #[test]
    fn test_mouse_moved_omits_button() {
        let command = Command::Input(InputCommand::mouse_moved(10.0, 20.5));
        let json = serde_json::to_string(&command).expect("serialize");

        assert!(json.contains("mouseMoved"));
        assert!(!json.contains("button"));
        assert!(!json.contains("clickCount"));
    }

    #[test]
    fn test_mouse_press_release_pair() {
        let pressed =
            serde_json::to_string(&Command::Input(InputCommand::mouse_pressed(1.0, 2.0)))
                .expect("serialize");
        let released =
            serde_json::to_string(&Command::Input(InputCommand::mouse_released(1.0, 2.0)))
                .expect("serialize");

        assert!(pressed.contains("mousePressed"));
        assert!(released.contains("mouseReleased"));
        assert!(pressed.contains(r#""button":"left""#));
        assert!(released.contains(r#""clickCount":1"#));
    }

    #[test]
    fn test_get_response_body() {
        let command = Command::Network(NetworkCommand::GetResponseBody {
            request_id: "7".to_string(),
        });
        let json = serde_json::to_string(&command).expect("serialize");
        assert!(json.contains(r#""requestId":"7""#));
    }
}
