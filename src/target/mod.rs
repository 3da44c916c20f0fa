//! Target discovery and selection.
//!
//! The debugging endpoint enumerates connectable surfaces (tabs) over
//! plain HTTP: `GET /json` lists them, `PUT /json/new?{url}` creates one.
//! Targets appear and disappear as tabs open and close, so the list is
//! fetched fresh on every resolution attempt and never cached.
//!
//! Selection policy, in order:
//!
//! 1. URL-prefix match - reattach to a specific already-open page
//! 2. Reuse-first - any existing page, to reduce focus churn in headed runs
//! 3. Create-new - a fresh tab, optionally pre-navigated
//! 4. Fallback - first existing page
//!
//! If nothing is connectable the resolution fails with a connectivity
//! error. A transport-level listing failure triggers one browser
//! restart-and-retry cycle through the injected [`BrowserLauncher`].

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// HTTP timeout for discovery requests.
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Settle delay after a browser restart before retrying the listing.
const RESTART_SETTLE: Duration = Duration::from_secs(2);

// ============================================================================
// EndpointConfig
// ============================================================================

/// Location of the remote debugging endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Debugging host.
    pub host: String,
    /// Debugging port.
    pub port: u16,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9222,
        }
    }
}

impl EndpointConfig {
    /// Returns the HTTP base URL of the endpoint.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

// ============================================================================
// TargetInfo
// ============================================================================

/// One connectable surface exposed by the debugging endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfo {
    /// Stable target identifier.
    #[serde(default)]
    pub id: String,
    /// Target type; only `page` targets are automation-eligible.
    #[serde(rename = "type", default)]
    pub target_type: String,
    /// Current URL of the surface.
    #[serde(default)]
    pub url: String,
    /// Connect endpoint, absent when another client is attached.
    #[serde(default)]
    pub web_socket_debugger_url: Option<String>,
}

impl TargetInfo {
    /// Returns `true` if this target can be automated.
    #[inline]
    #[must_use]
    pub fn is_connectable_page(&self) -> bool {
        self.target_type == "page" && self.web_socket_debugger_url.is_some()
    }
}

// ============================================================================
// TargetPolicy
// ============================================================================

/// Selection policy for one resolution attempt.
#[derive(Debug, Clone, Default)]
pub struct TargetPolicy {
    /// Reattach to the first page whose URL starts with this prefix.
    pub url_prefix: Option<String>,
    /// Prefer reusing an existing page before creating a new one.
    pub reuse_existing: bool,
    /// Initial URL for a newly created target.
    pub new_target_url: Option<String>,
}

impl TargetPolicy {
    /// Policy that reattaches to a page by URL prefix.
    #[must_use]
    pub fn with_url_prefix(prefix: impl Into<String>) -> Self {
        Self {
            url_prefix: Some(prefix.into()),
            ..Self::default()
        }
    }

    /// Policy that reuses the first existing page.
    #[must_use]
    pub fn reuse_first() -> Self {
        Self {
            reuse_existing: true,
            ..Self::default()
        }
    }
}

/// Selects an existing page target per policy, without creating one.
///
/// Returns the prefix match if a prefix is configured, else the first
/// page when reuse is requested, else nothing.
#[must_use]
pub fn select_existing<'a>(
    targets: &'a [TargetInfo],
    policy: &TargetPolicy,
) -> Option<&'a TargetInfo> {
    let pages: Vec<&TargetInfo> = targets.iter().filter(|t| t.is_connectable_page()).collect();

    if let Some(prefix) = &policy.url_prefix {
        return pages.iter().find(|t| t.url.starts_with(prefix)).copied();
    }

    if policy.reuse_existing {
        return pages.first().copied();
    }

    None
}

// ============================================================================
// BrowserLauncher
// ============================================================================

/// External collaborator able to (re)start the browser process.
///
/// Only invoked when endpoint discovery fails. Restarting is a shared
/// mutation; callers must be certain no other automation session is
/// mid-flight against the same endpoint.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Ensures a browser is listening on the debugging endpoint.
    async fn ensure_running(&self) -> Result<()>;
}

// ============================================================================
// TargetResolver
// ============================================================================

/// Resolves one connectable surface per policy.
pub struct TargetResolver {
    endpoint: EndpointConfig,
    http: reqwest::Client,
    launcher: Option<Arc<dyn BrowserLauncher>>,
}

impl TargetResolver {
    /// Creates a resolver for the given endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] when the HTTP client cannot be built; the
    /// client carries a proxy bypass and a discovery timeout that must
    /// not be lost to a silent default.
    pub fn new(endpoint: EndpointConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .no_proxy()
            .timeout(DISCOVERY_TIMEOUT)
            .build()?;

        Ok(Self {
            endpoint,
            http,
            launcher: None,
        })
    }

    /// Attaches a browser launcher used for the restart-and-retry cycle.
    #[must_use]
    pub fn with_launcher(mut self, launcher: Arc<dyn BrowserLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Fetches the live target list.
    ///
    /// On a transport-level failure the configured launcher is asked to
    /// (re)start the browser once before the listing is retried.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connectivity`] when the endpoint stays unreachable
    /// after the retry cycle.
    pub async fn list_targets(&self) -> Result<Vec<TargetInfo>> {
        let url = format!("{}/json", self.endpoint.base_url());

        match self.fetch_targets(&url).await {
            Ok(targets) => Ok(targets),
            Err(first) => {
                if let Some(launcher) = &self.launcher {
                    warn!(error = %first, "Target listing failed, restarting browser");
                    launcher.ensure_running().await?;
                    tokio::time::sleep(RESTART_SETTLE).await;
                } else {
                    warn!(error = %first, "Target listing failed, retrying");
                }

                self.fetch_targets(&url).await.map_err(|e| {
                    Error::connectivity(format!(
                        "cannot reach {}:{}: {e}",
                        self.endpoint.host, self.endpoint.port
                    ))
                })
            }
        }
    }

    async fn fetch_targets(&self, url: &str) -> Result<Vec<TargetInfo>> {
        let response = self.http.get(url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }

    /// Creates a new page target, optionally pre-navigated.
    ///
    /// Returns the connect endpoint on success.
    pub async fn create_target(&self, initial_url: Option<&str>) -> Result<Option<String>> {
        let mut url = format!("{}/json/new", self.endpoint.base_url());
        if let Some(initial) = initial_url {
            url.push('?');
            url.push_str(initial);
        }

        let response = self.http.put(&url).send().await?;
        if !response.status().is_success() {
            debug!(status = %response.status(), "Target creation refused");
            return Ok(None);
        }

        let created: TargetInfo = response.json().await?;
        Ok(created.web_socket_debugger_url)
    }

    /// Resolves one connect endpoint per policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connectivity`] when no surface is connectable.
    pub async fn resolve(&self, policy: &TargetPolicy) -> Result<String> {
        let targets = self.list_targets().await?;

        if let Some(target) = select_existing(&targets, policy) {
            info!(url = %target.url, "Attaching to existing page target");
            return Ok(target
                .web_socket_debugger_url
                .clone()
                .unwrap_or_default());
        }

        // Prefix given but nothing matched: fall through to creation so the
        // caller still gets a usable surface.
        if let Ok(Some(ws_url)) = self
            .create_target(policy.new_target_url.as_deref())
            .await
        {
            info!("Created new page target");
            return Ok(ws_url);
        }

        if let Some(first) = targets.iter().find(|t| t.is_connectable_page()) {
            info!(url = %first.url, "Falling back to first page target");
            return Ok(first
                .web_socket_debugger_url
                .clone()
                .unwrap_or_default());
        }

        Err(Error::connectivity("no browser tabs available"))
    }
}

// ============================================================================
// Tests
// ============================================================================
