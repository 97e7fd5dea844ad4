//! Event-loop bridge.
//!
//! This module lets two tokio runtimes exchange suspended computations:
//!
//! - The **server loop** is a dedicated single-threaded runtime on its own
//!   OS thread. The web framework, every listener, and every websocket
//!   pump run there.
//! - The **application runtime** is whatever runtime the caller drives
//!   [`run_app`](crate::run_app) from. User handlers execute there.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐                    ┌──────────────────────┐
//! │ Application runtime  │   Remote::run      │ Server loop (thread) │
//! │                      │───────────────────►│                      │
//! │  run_app, handlers   │                    │  axum, listeners,    │
//! │                      │◄───────────────────│  websocket pumps     │
//! └──────────────────────┘   AppHandle::run   └──────────────────────┘
//! ```
//!
//! Either direction is a task handoff: the computation is shipped to the
//! other side and the caller suspends on a completion channel.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `server_loop` | [`ServerLoop`] guard and its [`Remote`] handle |
//! | `handoff` | [`AppHandle`] — dispatch back onto the application runtime |

// ============================================================================
// Submodules
// ============================================================================

/// Server loop guard and remote handle.
pub mod server_loop;

/// Application-runtime handoff.
pub mod handoff;

// ============================================================================
// Re-exports
// ============================================================================

pub use handoff::AppHandle;
pub use server_loop::{Remote, ServerLoop};
