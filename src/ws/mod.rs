//! Websocket adapter.
//!
//! Wraps the framework's websocket so that send/receive/close can be
//! awaited from the application runtime while the socket itself lives on
//! the server loop.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────┐  commands + acks   ┌────────────────────┐
//! │ handler (app rt)   │───────────────────►│ pump (server loop) │
//! │   WsSession        │                    │   owns the socket  │
//! │                    │◄───────────────────│                    │
//! └────────────────────┘  inbound messages  └────────────────────┘
//! ```
//!
//! One pump per session owns the underlying connection exclusively. The
//! session is handed to the user handler; when the handler returns or
//! fails, the upgrade wrapper closes the connection — exactly once.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `session` | [`WsSession`], [`WsMsg`], and the socket pump |
//! | `upgrade` | [`websocket`] route helper and the upgrade wrapper |

// ============================================================================
// Submodules
// ============================================================================

/// Session adapter and socket pump.
pub mod session;

/// Upgrade handling and the `websocket` route helper.
pub mod upgrade;

// ============================================================================
// Re-exports
// ============================================================================

pub use session::{CloseInfo, WsMsg, WsSession};
pub use upgrade::websocket;
