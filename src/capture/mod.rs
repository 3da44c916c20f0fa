//! Network traffic capture.
//!
//! Recovers a response body for an API call the automation cannot issue
//! directly: the server rejects direct calls lacking browser-only
//! anti-automation signals, so we observe the real call the page makes.
//!
//! Flow: enable traffic observation, subscribe to events, trigger the
//! navigation that causes the page to issue the call, then run
//! [`wait_for_hit`] against the event stream under a deadline. Request
//! starts build a transient `requestId -> url` map; a completion whose
//! recorded URL matches the target path ends the loop (non-200 is a hard
//! failure). The body is then fetched by request id and decoded.
//!
//! The captured call's own query parameters are authoritative for what was
//! actually served; a mismatch with the requested parameters is surfaced
//! as a warning, never an error.

// ============================================================================
// Imports
// ============================================================================

use std::time::{Duration, Instant};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::{Command, EventFrame, NetworkCommand};
use crate::transport::{Connection, EventStream};

// ============================================================================
// Constants
// ============================================================================

/// Default deadline for observing the target API call.
pub const DEFAULT_CAPTURE_DEADLINE: Duration = Duration::from_secs(18);

/// POST data buffering bound passed to traffic observation.
pub const MAX_POST_DATA_SIZE: u32 = 65_536;

// ============================================================================
// CaptureHit
// ============================================================================

/// A completed response matching the target path with status 200.
#[derive(Debug, Clone)]
pub struct CaptureHit {
    /// Transient request id used to fetch the body.
    pub request_id: String,
    /// Full URL of the captured call, query string included.
    pub url: String,
}

// ============================================================================
// CaptureState
// ============================================================================

/// Pure lifecycle-event state machine.
///
/// Fed one event at a time; yields a [`CaptureHit`] when the target call
/// completes with status 200, an error when it completes with anything
/// else, and nothing otherwise. Entries for irrelevant URLs are consulted
/// but never promoted.
#[derive(Debug)]
pub struct CaptureState {
    target_path: String,
    url_by_request: FxHashMap<String, String>,
}

impl CaptureState {
    /// Creates a state machine watching for the given API path.
    #[must_use]
    pub fn new(target_path: impl Into<String>) -> Self {
        Self {
            target_path: target_path.into(),
            url_by_request: FxHashMap::default(),
        }
    }

    /// Consumes one lifecycle event.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CaptureStatus`] when the target call completes
    /// with a non-200 status; the server is actively refusing and waiting
    /// longer will not help.
    pub fn on_event(&mut self, event: &EventFrame) -> Result<Option<CaptureHit>> {
        match event.method.as_str() {
            "Network.requestWillBeSent" => {
                let request_id = event.get_string("requestId");
                if !request_id.is_empty() {
                    let url = event
                        .get_path(&["request", "url"])
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    trace!(request_id = %request_id, url = %url, "Request started");
                    self.url_by_request.insert(request_id, url);
                }
                Ok(None)
            }

            "Network.responseReceived" => {
                let request_id = event.get_string("requestId");
                let Some(url) = self.url_by_request.get(&request_id) else {
                    return Ok(None);
                };
                if !url.contains(&self.target_path) {
                    // Noise; keep listening.
                    return Ok(None);
                }

                let status = event
                    .get_path(&["response", "status"])
                    .and_then(Value::as_u64)
                    .unwrap_or_default() as u16;

                if status != 200 {
                    return Err(Error::capture_status(status, url.clone()));
                }

                debug!(request_id = %request_id, url = %url, "Target call captured");
                Ok(Some(CaptureHit {
                    request_id,
                    url: url.clone(),
                }))
            }

            _ => Ok(None),
        }
    }
}

// ============================================================================
// Capture Loop
// ============================================================================

/// Runs the capture loop against an event stream under a deadline.
///
/// # Errors
///
/// - [`Error::CaptureStatus`] when the target call is refused
/// - [`Error::Timeout`] when the deadline elapses without a match; the
///   message instructs the caller to complete the interaction manually
pub async fn wait_for_hit(
    events: &mut EventStream,
    target_path: &str,
    deadline: Duration,
) -> Result<CaptureHit> {
    let mut state = CaptureState::new(target_path);
    let started = Instant::now();

    loop {
        let remaining = deadline.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            break;
        }

        let Ok(event) = tokio::time::timeout(remaining, events.recv()).await else {
            break;
        };
        let Some(event) = event else {
            return Err(Error::ConnectionClosed);
        };

        if let Some(hit) = state.on_event(&event)? {
            return Ok(hit);
        }
    }

    Err(Error::timeout(
        format!("capture of {target_path}; open the page manually and retry"),
        deadline.as_millis() as u64,
    ))
}

/// Enables traffic observation on the connection.
pub async fn enable_observation(conn: &Connection) -> Result<()> {
    conn.send(Command::Network(NetworkCommand::Enable {
        max_post_data_size: MAX_POST_DATA_SIZE,
    }))
    .await?;
    Ok(())
}

/// Fetches a completed response body, decoding its transport encoding.
pub async fn fetch_response_body(conn: &Connection, request_id: &str) -> Result<String> {
    let result = conn
        .send(Command::Network(NetworkCommand::GetResponseBody {
            request_id: request_id.to_string(),
        }))
        .await?;

    let body = result
        .get("body")
        .and_then(Value::as_str)
        .unwrap_or_default();

    decode_body(body, result.get("base64Encoded").and_then(Value::as_bool) == Some(true))
}

/// Decodes a binary-safe transport encoding when the frame declares one.
pub fn decode_body(body: &str, base64_encoded: bool) -> Result<String> {
    if !base64_encoded {
        return Ok(body.to_string());
    }
    let bytes = BASE64
        .decode(body)
        .map_err(|e| Error::capture_payload(format!("base64 decode failed: {e}"), body))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

// ============================================================================
// Content Payload
// ============================================================================

/// One note row from the creator analytics payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NoteInfo {
    /// Note id.
    #[serde(default)]
    pub id: String,
    /// Note title.
    #[serde(default)]
    pub title: Option<String>,
    /// Publish time in epoch milliseconds.
    #[serde(default)]
    pub post_time: Option<i64>,
    /// Impressions.
    #[serde(default)]
    pub imp_count: Option<i64>,
    /// Views.
    #[serde(default)]
    pub read_count: Option<i64>,
    /// Likes.
    #[serde(default)]
    pub like_count: Option<i64>,
    /// Comments.
    #[serde(default)]
    pub comment_count: Option<i64>,
    /// Favorites.
    #[serde(default)]
    pub fav_count: Option<i64>,
    /// Follower delta attributed to the note.
    #[serde(default)]
    pub increase_fans_count: Option<i64>,
    /// Shares.
    #[serde(default)]
    pub share_count: Option<i64>,
}

/// Parsed analytics payload.
#[derive(Debug, Clone, Default)]
pub struct ContentPayload {
    /// Note rows; an absent list in the payload yields an empty vec.
    pub notes: Vec<NoteInfo>,
    /// Total row count reported by the server.
    pub total: Option<i64>,
}

/// Parses the captured analytics body.
///
/// The payload shape is `{"data": {"note_infos": [...], "total": n}}`;
/// absence of the list is an empty result, not an error.
///
/// # Errors
///
/// Returns [`Error::CapturePayload`] with a bounded preview of the raw
/// body when it is not valid JSON.
pub fn parse_content_payload(body: &str) -> Result<ContentPayload> {
    let payload: Value = serde_json::from_str(body)
        .map_err(|e| Error::capture_payload(format!("invalid JSON: {e}"), body))?;

    let data = payload.get("data");
    let notes = data
        .and_then(|d| d.get("note_infos"))
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(|row| serde_json::from_value(row.clone()).ok())
                .collect()
        })
        .unwrap_or_default();

    let total = data.and_then(|d| d.get("total")).and_then(Value::as_i64);

    Ok(ContentPayload { notes, total })
}

// ============================================================================
// ContentQuery
// ============================================================================

/// Pagination/filter parameters of an analytics request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentQuery {
    /// 1-based page number.
    pub page_num: u32,
    /// Rows per page.
    pub page_size: u32,
    /// API type filter value.
    pub note_type: u32,
}

impl Default for ContentQuery {
    fn default() -> Self {
        Self {
            page_num: 1,
            page_size: 10,
            note_type: 0,
        }
    }
}

impl ContentQuery {
    /// Reads the served parameters off a captured request URL.
    ///
    /// Missing or malformed parameters fall back to their defaults.
    #[must_use]
    pub fn from_captured_url(url: &str) -> Self {
        let defaults = Self::default();
        let Ok(parsed) = Url::parse(url) else {
            return defaults;
        };

        let mut query = defaults;
        for (key, value) in parsed.query_pairs() {
            match key.as_ref() {
                "page_num" => query.page_num = value.parse().unwrap_or(defaults.page_num),
                "page_size" => query.page_size = value.parse().unwrap_or(defaults.page_size),
                "type" => query.note_type = value.parse().unwrap_or(defaults.note_type),
                _ => {}
            }
        }
        query
    }

    /// Warns when the served parameters differ from the requested ones.
    ///
    /// The served data is still returned; the discrepancy is not an error.
    pub fn warn_on_mismatch(&self, served: &Self, url: &str) {
        if self != served {
            warn!(
                requested = ?self,
                served = ?served,
                url = %url,
                "Requested pagination/filter differs from captured request; returning served data"
            );
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use tokio::sync::mpsc;

    fn request_started(id: &str, url: &str) -> EventFrame {
        EventFrame {
            method: "Network.requestWillBeSent".to_string(),
            params: json!({ "requestId": id, "request": { "url": url } }),
        }
    }

    fn response_received(id: &str, status: u16) -> EventFrame {
        EventFrame {
            method: "Network.responseReceived".to_string(),
            params: json!({ "requestId": id, "response": { "status": status } }),
        }
    }

    #[test]
    fn test_capture_hit_on_matching_200() {
        let mut state = CaptureState::new("/api/list");

        let none = state
            .on_event(&request_started("7", "https://site/api/list?x=1"))
            .expect("record");
        assert!(none.is_none());

        let hit = state
            .on_event(&response_received("7", 200))
            .expect("no error")
            .expect("hit");
        assert_eq!(hit.request_id, "7");
        assert_eq!(hit.url, "https://site/api/list?x=1");
    }

    #[test]
    fn test_non_200_is_hard_failure() {
        let mut state = CaptureState::new("/api/list");
        state
            .on_event(&request_started("7", "https://site/api/list"))
            .expect("record");

        let err = state
            .on_event(&response_received("7", 404))
            .expect_err("refused");
        match err {
            Error::CaptureStatus { status, url } => {
                assert_eq!(status, 404);
                assert_eq!(url, "https://site/api/list");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_irrelevant_urls_are_ignored() {
        let mut state = CaptureState::new("/api/list");
        state
            .on_event(&request_started("1", "https://site/static/app.js"))
            .expect("record");

        // Completion of an unrelated URL keeps the loop listening, even
        // with a failure status.
        let none = state
            .on_event(&response_received("1", 500))
            .expect("ignored");
        assert!(none.is_none());

        // Completion for an id that was never recorded is also noise.
        let none = state
            .on_event(&response_received("99", 200))
            .expect("ignored");
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_wait_for_hit_end_to_end() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(request_started("7", "https://site/api/list?x=1"))
            .expect("send");
        tx.send(response_received("7", 200)).expect("send");

        let hit = wait_for_hit(&mut rx, "/api/list", Duration::from_secs(1))
            .await
            .expect("hit");
        assert_eq!(hit.request_id, "7");
    }

    #[tokio::test]
    async fn test_wait_for_hit_status_error_beats_deadline() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(request_started("7", "https://site/api/list"))
            .expect("send");
        tx.send(response_received("7", 404)).expect("send");

        let started = Instant::now();
        let err = wait_for_hit(&mut rx, "/api/list", Duration::from_secs(30))
            .await
            .expect_err("status failure");
        assert!(matches!(err, Error::CaptureStatus { status: 404, .. }));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_wait_for_hit_deadline_is_timeout() {
        let (_tx, mut rx) = mpsc::unbounded_channel::<EventFrame>();

        let err = wait_for_hit(&mut rx, "/api/list", Duration::from_millis(30))
            .await
            .expect_err("deadline");
        assert!(err.is_timeout());
        assert!(err.to_string().contains("/api/list"));
    }

    #[test]
    fn test_decode_body_base64() {
        let encoded = BASE64.encode(r#"{"data":{}}"#);
        assert_eq!(decode_body(&encoded, true).expect("decode"), r#"{"data":{}}"#);
        assert_eq!(decode_body("plain", false).expect("plain"), "plain");
    }

    #[test]
    fn test_parse_content_payload() {
        let body = r#"{"data":{"note_infos":[{"id":"a1","title":"T"}],"total":1}}"#;
        let payload = parse_content_payload(body).expect("parse");

        assert_eq!(payload.notes.len(), 1);
        assert_eq!(payload.notes[0].id, "a1");
        assert_eq!(payload.notes[0].title.as_deref(), Some("T"));
        assert_eq!(payload.total, Some(1));
    }

    #[test]
    fn test_missing_note_list_is_empty_result() {
        let payload = parse_content_payload(r#"{"data":{"total":0}}"#).expect("parse");
        assert!(payload.notes.is_empty());
        assert_eq!(payload.total, Some(0));
    }

    #[test]
    fn test_invalid_json_reports_preview() {
        let err = parse_content_payload("<html>502 Bad Gateway</html>").expect_err("not json");
        match err {
            Error::CapturePayload { preview, .. } => {
                assert!(preview.contains("502"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_content_query_from_url() {
        let url = "https://c.site/api/galaxy/list?page_num=2&page_size=20&type=1&extra=x";
        let query = ContentQuery::from_captured_url(url);
        assert_eq!(
            query,
            ContentQuery {
                page_num: 2,
                page_size: 20,
                note_type: 1
            }
        );

        assert_eq!(
            ContentQuery::from_captured_url("not a url"),
            ContentQuery::default()
        );
    }
}
