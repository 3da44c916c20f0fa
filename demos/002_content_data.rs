//! Creator analytics capture.
//!
//! Demonstrates:
//! - Capturing the analytics API response off the page's own traffic
//! - Requested vs served pagination parameters
//!
//! Usage:
//!   cargo run --example 002_content_data -- [--host HOST] [--port PORT] [--debug]
//!
//! Requires a browser logged in to creator.xiaohongshu.com.

mod common;

// ============================================================================
// Imports
// ============================================================================

use common::Args;
use xhs_driver::{ContentQuery, Result};

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
    println!("=== 002: Content Data Capture ===\n");

    println!("[Setup] Connecting to {}:{}...", args.host, args.port);
    let session = common::connect(&args).await?;
    println!("        ✓ Connected\n");

    if !session.check_login().await? {
        eprintln!("Not logged in on creator.xiaohongshu.com; log in and retry.");
        return Ok(());
    }

    println!("[1] Capturing first analytics page");
    let data = session
        .content_data(ContentQuery {
            page_num: 1,
            page_size: 10,
            note_type: 0,
        })
        .await?;

    println!("    url: {}", data.request_url);
    println!("    served: {:?} (requested {:?})", data.served, data.requested);
    println!("    total: {:?}", data.payload.total);
    for note in &data.payload.notes {
        println!(
            "    {} {:?} views={:?} likes={:?}",
            note.id, note.title, note.read_count, note.like_count
        );
    }
    println!("    ✓ Done");

    Ok(())
}
