//! Feed search with filter application.
//!
//! Demonstrates:
//! - Attaching to a running browser over the debugging endpoint
//! - Searching for a keyword
//! - Applying hover-panel filters (sort order, note type)
//! - Reading the extracted feed list
//!
//! Usage:
//!   cargo run --example 001_search_filters -- [--host HOST] [--port PORT] [--debug]
//!
//! The browser must be started with --remote-debugging-port and logged in.

mod common;

// ============================================================================
// Imports
// ============================================================================

use common::Args;
use xhs_driver::{FilterSelection, Result};

// ============================================================================
// Constants
// ============================================================================

const KEYWORD: &str = "旅行攻略";

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    common::init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    println!("=== 001: Search with Filters ===\n");

    println!("[Setup] Connecting to {}:{}...", args.host, args.port);
    let session = common::connect(&args).await?;
    println!("        ✓ Connected\n");

    if !session.check_home_login().await? {
        eprintln!("Not logged in on xiaohongshu.com; log in and retry.");
        return Ok(());
    }

    println!("[1] Searching for {KEYWORD:?} sorted by newest, image posts only");
    let filters = FilterSelection::new().sort_by("最新").note_type("图文");
    let feeds = session.search_feeds(KEYWORD, &filters).await?;
    println!("    {} feeds extracted", feeds.len());

    for feed in feeds.iter().take(10) {
        println!("    {} token={:?}", feed.id, feed.xsec_token);
    }
    println!("    ✓ Done");

    Ok(())
}
