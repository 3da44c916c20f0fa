//! High-level automation session.
//!
//! [`Session`] ties the pieces together: target resolution yields one
//! connection, the page facade drives it, and the capture, filter, and
//! feed modules run on top. One session owns one page; open another
//! session for another tab.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::capture::{
    self, ContentPayload, ContentQuery, DEFAULT_CAPTURE_DEADLINE, fetch_response_body,
    parse_content_payload, wait_for_hit,
};
use crate::error::{Error, Result};
use crate::feed::{self, FeedSummary};
use crate::filters::{FilterSelection, UiConfig};
use crate::page::{Page, PageDriver, wait_until};
use crate::protocol::{Command, NetworkCommand, StorageCommand};
use crate::target::{BrowserLauncher, EndpointConfig, TargetPolicy, TargetResolver};
use crate::transport::Connection;

// ============================================================================
// Constants
// ============================================================================

const HOME_URL: &str = "https://www.xiaohongshu.com";
const CREATOR_URL: &str = "https://creator.xiaohongshu.com";
const CONTENT_DATA_URL: &str = "https://creator.xiaohongshu.com/statistics/data-analysis";

/// API path of the creator analytics call the session captures.
pub const CONTENT_DATA_API_PATH: &str = "/api/galaxy/creator/datacenter/note/analyze/list";

/// Text shown by the home page's login modal when unauthenticated.
pub const HOME_LOGIN_MODAL_KEYWORD: &str = "登录后推荐更懂你的笔记";

/// How long the home login check watches for the modal.
const HOME_LOGIN_WATCH: Duration = Duration::from_secs(8);

/// Storage buckets wiped by [`Session::clear_session_data`].
const CLEARED_STORAGE_TYPES: &str = "cookies,local_storage,session_storage";

// ============================================================================
// ContentData
// ============================================================================

/// Result of one creator analytics capture.
#[derive(Debug, Clone)]
pub struct ContentData {
    /// Full URL of the captured call.
    pub request_url: String,
    /// Parameters the caller asked for.
    pub requested: ContentQuery,
    /// Parameters the page actually sent; authoritative for the rows.
    pub served: ContentQuery,
    /// Parsed payload.
    pub payload: ContentPayload,
}

// ============================================================================
// Session
// ============================================================================

/// One automation session against one browser tab.
pub struct Session {
    page: Page,
    ui: UiConfig,
    capture_deadline: Duration,
}

impl Session {
    /// Resolves a target per the policy and connects to it.
    pub async fn connect(endpoint: EndpointConfig, policy: &TargetPolicy) -> Result<Self> {
        let resolver = TargetResolver::new(endpoint)?;
        Self::connect_with_resolver(&resolver, policy).await
    }

    /// Like [`Session::connect`], with a launcher used to (re)start the
    /// browser when endpoint discovery fails.
    pub async fn connect_with_launcher(
        endpoint: EndpointConfig,
        policy: &TargetPolicy,
        launcher: Arc<dyn BrowserLauncher>,
    ) -> Result<Self> {
        let resolver = TargetResolver::new(endpoint)?.with_launcher(launcher);
        Self::connect_with_resolver(&resolver, policy).await
    }

    async fn connect_with_resolver(
        resolver: &TargetResolver,
        policy: &TargetPolicy,
    ) -> Result<Self> {
        let ws_url = resolver.resolve(policy).await?;
        let conn = Connection::connect(&ws_url).await?;
        info!(ws_url = %ws_url, "Session connected");
        Ok(Self::from_page(Page::new(Arc::new(conn))))
    }

    /// Wraps an already-connected page.
    #[must_use]
    pub fn from_page(page: Page) -> Self {
        Self {
            page,
            ui: UiConfig::default(),
            capture_deadline: DEFAULT_CAPTURE_DEADLINE,
        }
    }

    /// Overrides the selector config used for filter application.
    #[must_use]
    pub fn with_ui_config(mut self, ui: UiConfig) -> Self {
        self.ui = ui;
        self
    }

    /// Overrides the network capture deadline.
    #[must_use]
    pub fn with_capture_deadline(mut self, deadline: Duration) -> Self {
        self.capture_deadline = deadline;
        self
    }

    /// Returns the underlying page facade.
    #[inline]
    #[must_use]
    pub fn page(&self) -> &Page {
        &self.page
    }

    // ------------------------------------------------------------------
    // Search and detail
    // ------------------------------------------------------------------

    /// Searches for a keyword, applies filters, and returns the feeds.
    pub async fn search_feeds(
        &self,
        keyword: &str,
        filters: &FilterSelection,
    ) -> Result<Vec<FeedSummary>> {
        filters.validate()?;
        let url = feed::make_search_url(keyword)?;
        self.page.navigate(&url).await?;
        feed::search_feeds(&self.page, filters, self.ui.clone()).await
    }

    /// Opens a note's detail page and returns its detail object.
    pub async fn get_feed_detail(&self, feed_id: &str, xsec_token: &str) -> Result<Value> {
        let url = feed::make_feed_detail_url(feed_id, xsec_token)?;
        self.page.navigate(&url).await?;
        feed::get_feed_detail(&self.page, feed_id).await
    }

    // ------------------------------------------------------------------
    // Creator analytics capture
    // ------------------------------------------------------------------

    /// Captures the creator analytics table from the data-analysis page.
    ///
    /// A direct fetch to this API is rejected when browser-only
    /// anti-automation headers are absent, so the real request issued by
    /// page scripts is captured and its body read back instead. The
    /// served query parameters win over the requested ones; a mismatch
    /// is logged, not raised.
    pub async fn content_data(&self, requested: ContentQuery) -> Result<ContentData> {
        if requested.page_num == 0 {
            return Err(Error::invalid_argument("page_num must be >= 1"));
        }
        if requested.page_size == 0 {
            return Err(Error::invalid_argument("page_size must be >= 1"));
        }

        let conn = self.page.connection();
        capture::enable_observation(conn).await?;

        // Subscribe before navigating so the request-start event cannot
        // be missed.
        let mut events = conn.subscribe();
        self.page.navigate(CONTENT_DATA_URL).await?;

        let hit = wait_for_hit(&mut events, CONTENT_DATA_API_PATH, self.capture_deadline).await?;
        let body = fetch_response_body(conn, &hit.request_id).await?;
        let payload = parse_content_payload(&body)?;

        let served = ContentQuery::from_captured_url(&hit.url);
        requested.warn_on_mismatch(&served, &hit.url);

        debug!(
            url = %hit.url,
            rows = payload.notes.len(),
            total = ?payload.total,
            "Content data captured"
        );
        Ok(ContentData {
            request_url: hit.url,
            requested,
            served,
            payload,
        })
    }

    // ------------------------------------------------------------------
    // Login state
    // ------------------------------------------------------------------

    /// Checks login state on the creator domain.
    ///
    /// The creator center redirects to a login page when unauthenticated,
    /// so the check is URL-based.
    pub async fn check_login(&self) -> Result<bool> {
        self.page.navigate(CREATOR_URL).await?;

        let current_url = self.current_url().await?;
        debug!(url = %current_url, "Creator login check");
        Ok(!current_url.to_lowercase().contains("login"))
    }

    /// Checks login state on the home domain.
    ///
    /// The home page serves content to anonymous visitors and signals the
    /// unauthenticated state with a login modal instead of a redirect, so
    /// the modal keyword is watched for a fixed interval.
    pub async fn check_home_login(&self) -> Result<bool> {
        self.page.navigate(HOME_URL).await?;

        let current_url = self.current_url().await?;
        if current_url.to_lowercase().contains("login") {
            return Ok(false);
        }

        watch_for_login_modal(&self.page, HOME_LOGIN_WATCH).await
    }

    async fn current_url(&self) -> Result<String> {
        let value = self.page.evaluate("window.location.href").await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::evaluation("window.location.href is not a string"))
    }

    // ------------------------------------------------------------------
    // Session reset
    // ------------------------------------------------------------------

    /// Clears cookies and storage for both site origins to force a
    /// re-login, e.g. when switching accounts.
    pub async fn clear_session_data(&self) -> Result<()> {
        let conn = self.page.connection();
        capture::enable_observation(conn).await?;
        conn.send(Command::Network(NetworkCommand::ClearBrowserCookies))
            .await?;

        for origin in [HOME_URL, CREATOR_URL] {
            conn.send(Command::Storage(StorageCommand::ClearDataForOrigin {
                origin: origin.to_string(),
                storage_types: CLEARED_STORAGE_TYPES.to_string(),
            }))
            .await?;
        }
        info!("Session data cleared for both origins");
        Ok(())
    }
}

/// Watches for the login modal through the readiness waiter.
///
/// The modal mounts asynchronously, so the probe runs on the waiter's
/// tolerant contract: transient evaluation errors count as "not shown
/// yet". The modal appearing means logged out; the watch window lapsing
/// without it means logged in.
async fn watch_for_login_modal<D>(driver: &D, watch: Duration) -> Result<bool>
where
    D: PageDriver + ?Sized,
{
    let probe = login_modal_probe_js(HOME_LOGIN_MODAL_KEYWORD);
    match wait_until(
        driver,
        &probe,
        "home login modal",
        watch,
        Duration::from_millis(700),
    )
    .await
    {
        Ok(()) => {
            warn!(keyword = HOME_LOGIN_MODAL_KEYWORD, "Login modal detected");
            Ok(false)
        }
        Err(Error::Timeout { .. }) => Ok(true),
        Err(other) => Err(other),
    }
}

/// Probe for a visible modal containing the login keyword.
fn login_modal_probe_js(keyword: &str) -> String {
    let keyword_literal = Value::String(keyword.to_string()).to_string();
    format!(
        r#"(() => {{
    const keyword = {keyword_literal};
    const normalize = (text) => (text || "").replace(/\s+/g, " ").trim();
    const containsKeyword = (text) => normalize(text).includes(keyword);

    const modalSelectors = [
        "[class*='login']",
        "[class*='modal']",
        "[class*='popup']",
        "[class*='dialog']",
        "[class*='mask']",
    ];
    for (const selector of modalSelectors) {{
        const nodes = document.querySelectorAll(selector);
        for (const node of nodes) {{
            if (!(node instanceof HTMLElement) || node.offsetParent === null) {{
                continue;
            }}
            if (containsKeyword(node.textContent) || containsKeyword(node.innerText)) {{
                return true;
            }}
        }}
    }}
    if (document.body && containsKeyword(document.body.innerText)) {{
        return true;
    }}
    return false;
}})()"#
    )
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::Ordering;

    use crate::page::tests::FakePage;

    #[tokio::test]
    async fn test_modal_watch_reports_logged_out_when_modal_appears() {
        // Transient DOM errors while the modal mounts are not conclusive
        // either way; the watch keeps polling through them.
        let page = FakePage::new(vec![
            Err(Error::evaluation("ReferenceError: $ is not defined")),
            Ok(Value::Bool(false)),
            Ok(Value::Bool(true)),
        ]);

        let logged_in = watch_for_login_modal(&page, Duration::from_secs(5))
            .await
            .expect("watch");
        assert!(!logged_in);
        assert_eq!(page.evaluations.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_modal_watch_reports_logged_in_when_modal_never_shows() {
        let page = FakePage::new(vec![]);

        let logged_in = watch_for_login_modal(&page, Duration::from_millis(20))
            .await
            .expect("watch");
        assert!(logged_in);
    }

    #[tokio::test]
    async fn test_modal_watch_propagates_fatal_errors() {
        let page = FakePage::new(vec![Err(Error::ConnectionClosed)]);

        let err = watch_for_login_modal(&page, Duration::from_secs(1))
            .await
            .expect_err("fatal");
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[test]
    fn test_login_modal_probe_embeds_keyword() {
        let probe = login_modal_probe_js(HOME_LOGIN_MODAL_KEYWORD);
        assert!(probe.contains("登录后推荐更懂你的笔记"));
        assert!(probe.contains("[class*='modal']"));
        assert!(probe.contains("offsetParent"));
    }

    #[test]
    fn test_content_query_defaults_match_first_page() {
        let query = ContentQuery::default();
        assert_eq!(query.page_num, 1);
        assert_eq!(query.page_size, 10);
        assert_eq!(query.note_type, 0);
    }
}
