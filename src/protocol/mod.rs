//! CDP message types.
//!
//! This module defines the message format for communication between the
//! local end (Rust) and the remote end (Chrome DevTools).
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `CommandFrame` | Local → Remote | Command request `{id, method, params?}` |
//! | `ResponseFrame` | Remote → Local | Command completion `{id, result}` / `{id, error}` |
//! | `EventFrame` | Remote → Local | Unsolicited notification `{method, params}` (no id) |
//!
//! # Command Naming
//!
//! Commands follow the CDP `Domain.method` format:
//!
//! - `Page.navigate`
//! - `Runtime.evaluate`
//! - `Input.dispatchMouseEvent`
//! - `Network.getResponseBody`
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `command` | Command definitions by domain |
//! | `message` | Frame types and inbound classification |

// ============================================================================
// Submodules
// ============================================================================

/// Command definitions organized by CDP domain.
pub mod command;

/// Wire frame types.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::{Command, InputCommand, NetworkCommand, PageCommand, RuntimeCommand,
    StorageCommand};
pub use message::{CommandFrame, CommandId, EventFrame, IncomingFrame, ResponseFrame};
