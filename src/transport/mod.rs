//! WebSocket transport layer.
//!
//! This module owns the duplex channel to one page target and multiplexes
//! all traffic on it: command completions are correlated back to their
//! callers by id, id-less frames are fanned out to event subscribers.
//!
//! # Connection Lifecycle
//!
//! 1. `Connection::connect` - Dial the target's `webSocketDebuggerUrl`
//! 2. `Connection::send` - Issue commands, await correlated responses
//! 3. `Connection::subscribe` - Receive unsolicited events
//! 4. `Connection::shutdown` - Close the channel

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket connection and event loop.
pub mod connection;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Connection, EventStream};
