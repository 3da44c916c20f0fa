//! Feed search and detail extraction.
//!
//! Search results and note details are read out of the page's
//! `window.__INITIAL_STATE__` store rather than scraped from the DOM.
//! The store hydrates asynchronously after navigation, so every
//! extraction waits on a readiness condition first.
//!
//! Payloads cross the page boundary as `JSON.stringify` strings; the
//! store holds reactive wrappers (`value`/`_value`) that do not survive
//! by-value serialization intact.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::filters::{FilterEngine, FilterSelection, UiConfig};
use crate::page::{PageDriver, wait_until};

// ============================================================================
// Constants
// ============================================================================

const SEARCH_BASE_URL: &str = "https://www.xiaohongshu.com/search_result";
const FEED_DETAIL_BASE_URL: &str = "https://www.xiaohongshu.com/explore";

/// Deadline for `__INITIAL_STATE__` hydration.
const STATE_READY_TIMEOUT: Duration = Duration::from_secs(25);

/// Poll interval while waiting for hydration.
const STATE_READY_POLL: Duration = Duration::from_millis(600);

const SEARCH_STATE_READY_JS: &str = r"
(() => {
    const state = window.__INITIAL_STATE__;
    return !!(state && state.search && state.search.feeds);
})()";

const DETAIL_STATE_READY_JS: &str = r"
(() => {
    const state = window.__INITIAL_STATE__;
    return !!(state && state.note && state.note.noteDetailMap);
})()";

// ============================================================================
// URL Builders
// ============================================================================

/// Builds a search results URL for a keyword.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] for a blank keyword.
pub fn make_search_url(keyword: &str) -> Result<String> {
    let keyword = keyword.trim();
    if keyword.is_empty() {
        return Err(Error::invalid_argument("keyword cannot be empty"));
    }
    Ok(format!(
        "{SEARCH_BASE_URL}?keyword={}&source=web_explore_feed",
        urlencoding::encode(keyword)
    ))
}

/// Builds a note detail URL from a feed id and its access token.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] when either part is blank.
pub fn make_feed_detail_url(feed_id: &str, xsec_token: &str) -> Result<String> {
    let feed_id = feed_id.trim();
    let xsec_token = xsec_token.trim();
    if feed_id.is_empty() {
        return Err(Error::invalid_argument("feed_id cannot be empty"));
    }
    if xsec_token.is_empty() {
        return Err(Error::invalid_argument("xsec_token cannot be empty"));
    }
    Ok(format!(
        "{FEED_DETAIL_BASE_URL}/{feed_id}?xsec_token={}&xsec_source=pc_feed",
        urlencoding::encode(xsec_token)
    ))
}

// ============================================================================
// FeedSummary
// ============================================================================

/// One entry of the search feed list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedSummary {
    /// Feed id.
    #[serde(default)]
    pub id: String,
    /// Access token needed to open the detail page.
    #[serde(default)]
    pub xsec_token: Option<String>,
    /// Entry kind as reported by the store.
    #[serde(default)]
    pub model_type: Option<String>,
    /// Remaining store fields, passed through untyped.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

// ============================================================================
// Readiness
// ============================================================================

/// Waits for the search feed store to hydrate.
pub async fn wait_for_search_state<D: PageDriver + ?Sized>(driver: &D) -> Result<()> {
    wait_until(
        driver,
        SEARCH_STATE_READY_JS,
        "search feed state",
        STATE_READY_TIMEOUT,
        STATE_READY_POLL,
    )
    .await
}

/// Waits for the note detail store to hydrate.
pub async fn wait_for_detail_state<D: PageDriver + ?Sized>(driver: &D) -> Result<()> {
    wait_until(
        driver,
        DETAIL_STATE_READY_JS,
        "note detail state",
        STATE_READY_TIMEOUT,
        STATE_READY_POLL,
    )
    .await
}

// ============================================================================
// Extraction
// ============================================================================

const EXTRACT_FEEDS_JS: &str = r#"
(() => {
    if (
        window.__INITIAL_STATE__ &&
        window.__INITIAL_STATE__.search &&
        window.__INITIAL_STATE__.search.feeds
    ) {
        const feeds = window.__INITIAL_STATE__.search.feeds;
        const data = feeds.value !== undefined ? feeds.value : feeds._value;
        if (data) {
            return JSON.stringify(data);
        }
    }
    return "";
})()"#;

fn extract_detail_js(feed_id: &str) -> String {
    let feed_literal = Value::String(feed_id.to_string()).to_string();
    format!(
        r#"(() => {{
    const feedId = {feed_literal};
    const state = window.__INITIAL_STATE__;
    if (!state || !state.note || !state.note.noteDetailMap) {{
        return "";
    }}
    const detailMap = state.note.noteDetailMap;
    if (detailMap[feedId]) {{
        return JSON.stringify(detailMap[feedId]);
    }}
    const keys = Object.keys(detailMap || {{}});
    if (keys.length === 1 && detailMap[keys[0]]) {{
        return JSON.stringify(detailMap[keys[0]]);
    }}
    return "";
}})()"#
    )
}

/// Reads the hydrated search feed list.
///
/// An empty store yields an empty list. A non-string or non-list payload
/// means the store shape changed and is an error.
pub async fn extract_search_feeds<D: PageDriver + ?Sized>(driver: &D) -> Result<Vec<FeedSummary>> {
    let raw = driver.evaluate(EXTRACT_FEEDS_JS).await?;
    if raw.is_null() {
        return Ok(Vec::new());
    }
    let Value::String(raw) = raw else {
        return Err(Error::evaluation("search feed payload is not a JSON string"));
    };
    if raw.is_empty() {
        return Ok(Vec::new());
    }

    let parsed: Value = serde_json::from_str(&raw)
        .map_err(|e| Error::evaluation(format!("search feed payload is not valid JSON: {e}")))?;
    let Value::Array(items) = parsed else {
        return Err(Error::evaluation("search feed payload is not a list"));
    };

    let feeds = items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect::<Vec<FeedSummary>>();
    debug!(count = feeds.len(), "Search feeds extracted");
    Ok(feeds)
}

/// Reads one note detail object from the hydrated detail store.
///
/// Falls back to the map's single entry when the requested id is keyed
/// differently than displayed.
pub async fn extract_feed_detail<D: PageDriver + ?Sized>(
    driver: &D,
    feed_id: &str,
) -> Result<Value> {
    let raw = driver.evaluate(&extract_detail_js(feed_id)).await?;
    let Value::String(raw) = raw else {
        return Err(Error::evaluation("feed detail payload is not a JSON string"));
    };
    if raw.is_empty() {
        return Err(Error::element_not_found(format!(
            "feed detail for id '{feed_id}'"
        )));
    }

    let parsed: Value = serde_json::from_str(&raw)
        .map_err(|e| Error::evaluation(format!("feed detail payload is not valid JSON: {e}")))?;
    if !parsed.is_object() {
        return Err(Error::evaluation("feed detail payload is not an object"));
    }
    Ok(parsed)
}

// ============================================================================
// Composed Flows
// ============================================================================

/// Applies filters on an already-open search page and extracts the feeds.
///
/// Values are validated before any pointer event. After a successful
/// application the store re-hydrates, so readiness is awaited again
/// before extraction.
pub async fn search_feeds<D: PageDriver + ?Sized>(
    driver: &D,
    filters: &FilterSelection,
    ui: UiConfig,
) -> Result<Vec<FeedSummary>> {
    wait_for_search_state(driver).await?;

    if !filters.is_empty() {
        let engine = FilterEngine::new(driver, ui);
        engine.apply(filters).await?.into_result()?;

        driver
            .pause(Duration::from_millis(1200), Duration::from_millis(400))
            .await;
        wait_for_search_state(driver).await?;
    }

    extract_search_feeds(driver).await
}

/// Extracts one note detail from an already-open detail page.
pub async fn get_feed_detail<D: PageDriver + ?Sized>(driver: &D, feed_id: &str) -> Result<Value> {
    let feed_id = feed_id.trim();
    if feed_id.is_empty() {
        return Err(Error::invalid_argument("feed_id cannot be empty"));
    }
    wait_for_detail_state(driver).await?;
    extract_feed_detail(driver, feed_id).await
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::page::tests::FakePage;

    #[test]
    fn test_make_search_url_encodes_keyword() {
        let url = make_search_url(" 旅行 攻略 ").expect("url");
        assert!(url.starts_with("https://www.xiaohongshu.com/search_result?keyword="));
        assert!(url.ends_with("&source=web_explore_feed"));
        // CJK and the interior space are percent-encoded.
        assert!(url.contains("%E6%97%85%E8%A1%8C%20%E6%94%BB%E7%95%A5"));
    }

    #[test]
    fn test_make_search_url_rejects_blank_keyword() {
        assert!(make_search_url("   ").is_err());
    }

    #[test]
    fn test_make_feed_detail_url() {
        let url = make_feed_detail_url("abc123", "tok=en").expect("url");
        assert_eq!(
            url,
            "https://www.xiaohongshu.com/explore/abc123?xsec_token=tok%3Den&xsec_source=pc_feed"
        );
        assert!(make_feed_detail_url("", "t").is_err());
        assert!(make_feed_detail_url("id", " ").is_err());
    }

    #[tokio::test]
    async fn test_extract_search_feeds_round_trips_json_string() {
        let payload = json!([
            { "id": "a1", "xsec_token": "t1", "model_type": "note" },
            { "id": "a2" }
        ])
        .to_string();
        let page = FakePage::new(vec![Ok(Value::String(payload))]);

        let feeds = extract_search_feeds(&page).await.expect("feeds");
        assert_eq!(feeds.len(), 2);
        assert_eq!(feeds[0].id, "a1");
        assert_eq!(feeds[0].xsec_token.as_deref(), Some("t1"));
        assert_eq!(feeds[1].id, "a2");
    }

    #[tokio::test]
    async fn test_extract_search_feeds_empty_store_is_empty_list() {
        let page = FakePage::new(vec![Ok(Value::String(String::new()))]);
        assert!(extract_search_feeds(&page).await.expect("empty").is_empty());
    }

    #[tokio::test]
    async fn test_extract_search_feeds_rejects_unexpected_shapes() {
        let page = FakePage::new(vec![Ok(json!(42))]);
        assert!(extract_search_feeds(&page).await.is_err());

        let page = FakePage::new(vec![Ok(Value::String(r#"{"not":"a list"}"#.to_string()))]);
        assert!(extract_search_feeds(&page).await.is_err());
    }

    #[tokio::test]
    async fn test_extract_feed_detail_by_id() {
        let detail = json!({ "id": "a1", "title": "T" }).to_string();
        let page = FakePage::new(vec![Ok(Value::String(detail))]);

        let value = extract_feed_detail(&page, "a1").await.expect("detail");
        assert_eq!(value.get("title").and_then(Value::as_str), Some("T"));
    }

    #[tokio::test]
    async fn test_extract_feed_detail_missing_is_not_found() {
        let page = FakePage::new(vec![Ok(Value::String(String::new()))]);
        let err = extract_feed_detail(&page, "a1").await.expect_err("missing");
        assert!(matches!(err, Error::ElementNotFound { .. }));
        assert!(err.to_string().contains("a1"));
    }

    #[tokio::test]
    async fn test_search_feeds_validates_before_touching_the_page() {
        let page = FakePage::new(vec![
            // Search state readiness probe succeeds.
            Ok(Value::Bool(true)),
        ]);

        let err = search_feeds(
            &page,
            &FilterSelection::new().sort_by("乱序"),
            UiConfig::default(),
        )
        .await
        .expect_err("validation");
        assert!(matches!(err, Error::Validation { .. }));
        assert_eq!(
            page.pointer_events
                .load(std::sync::atomic::Ordering::SeqCst),
            0
        );
    }
}
