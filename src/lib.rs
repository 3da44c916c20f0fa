//! XHS Driver - Browser automation over the DevTools protocol.
//!
//! This library drives an already-running Chromium-family browser through
//! its remote debugging endpoint to automate Xiaohongshu workflows: feed
//! search with filter application, note detail extraction, and creator
//! analytics capture.
//!
//! # Architecture
//!
//! The crate is layered, leaves first:
//!
//! - **Transport**: one WebSocket per tab; assigns correlation ids to
//!   outgoing commands and demultiplexes incoming frames into command
//!   responses or unsolicited events
//! - **Page facade**: typed helpers on the transport for script
//!   evaluation, navigation, and synthetic pointer input
//! - **Target resolver**: enumerates connectable tabs over HTTP and
//!   selects or creates one per policy
//! - **Capture / filters / feed**: the automation flows, composed by
//!   [`Session`]
//!
//! Key design principles:
//!
//! - One [`Connection`] per tab, exclusively owned by one [`Session`]
//! - Real pointer events for hover-revealed UI; script events only as a
//!   tagged fallback strategy
//! - API bodies the server refuses to serve directly are captured off
//!   the page's own traffic instead
//! - Every timed wait goes through one readiness primitive,
//!   [`wait_until`], with an explicit deadline
//!
//! # Quick Start
//!
//! ```no_run
//! use xhs_driver::{EndpointConfig, FilterSelection, Result, Session, TargetPolicy};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // Attach to a browser started with --remote-debugging-port=9222
//!     let session = Session::connect(
//!         EndpointConfig::default(),
//!         &TargetPolicy::reuse_first(),
//!     )
//!     .await?;
//!
//!     let filters = FilterSelection::new().sort_by("最新").note_type("图文");
//!     let feeds = session.search_feeds("旅行攻略", &filters).await?;
//!     for feed in &feeds {
//!         println!("{} {:?}", feed.id, feed.xsec_token);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`capture`] | Network traffic capture and analytics payload parsing |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`feed`] | Search/detail URL builders and state extraction |
//! | [`filters`] | Filter selection, validation, and application engine |
//! | [`page`] | Page facade, readiness waiter, pointer input |
//! | [`protocol`] | DevTools wire frames and typed commands (internal) |
//! | [`session`] | High-level session composing the other modules |
//! | [`target`] | Debugging-endpoint discovery and tab selection |
//! | [`transport`] | WebSocket command/event multiplexer (internal) |

// ============================================================================
// Modules
// ============================================================================

/// Network traffic capture.
///
/// Recovers API response bodies by observing the page's own requests.
pub mod capture;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Feed search and detail extraction from hydrated page state.
pub mod feed;

/// Filter selection and the hover-panel application engine.
pub mod filters;

/// Page command facade, timing jitter, and the readiness waiter.
pub mod page;

/// DevTools protocol frames and typed commands.
///
/// Internal module defining command/response/event structures.
pub mod protocol;

/// High-level automation session.
pub mod session;

/// Debugging-endpoint discovery and target selection.
pub mod target;

/// WebSocket transport layer.
///
/// Internal module multiplexing commands and events on one connection.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Capture types
pub use capture::{CaptureHit, CaptureState, ContentPayload, ContentQuery, NoteInfo};

// Error types
pub use error::{Error, Result};

// Feed types
pub use feed::{FeedSummary, make_feed_detail_url, make_search_url};

// Filter types
pub use filters::{FilterEngine, FilterSelection, Rect, StrategyOutcome, UiConfig};

// Page types
pub use page::{Jitter, Page, PageDriver, wait_until};

// Protocol identifiers
pub use protocol::CommandId;

// Session types
pub use session::{ContentData, Session};

// Target types
pub use target::{BrowserLauncher, EndpointConfig, TargetInfo, TargetPolicy, TargetResolver};

// Transport types
pub use transport::{Connection, EventStream};
