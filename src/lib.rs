//! loopbridge - Serve async web applications across two runtimes.
//!
//! This library runs a routed web application on a dedicated server
//! event-loop thread while the application's own handlers keep executing on
//! the caller's runtime, with transparent bridging between the two.
//!
//! # Architecture
//!
//! Two runtimes cooperate for the lifetime of one [`run_app`] call:
//!
//! - **Server loop**: a single-threaded runtime on its own OS thread; owns
//!   listeners, connections, and websocket pumps
//! - **Application runtime**: the caller's runtime; owns every user handler
//!
//! Key design principles:
//!
//! - [`run_app`] opens the bridge, serves, and tears everything down on
//!   every exit path (including cancellation)
//! - Handlers are plain async functions; the calling-convention hop is
//!   invisible to them
//! - One pump per websocket owns the socket; [`WsSession`] is the
//!   application-side handle
//! - Listen endpoints are typed ([`ListenTarget`]), never guessed from
//!   argument shapes
//!
//! # Quick Start
//!
//! ```no_run
//! use loopbridge::{App, Result, ServeConfig, get, run_app, websocket};
//!
//! async fn hello(_req: axum::extract::Request) -> &'static str {
//!     "Hello, world"
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let app = App::new().add_routes([
//!         get("/", hello),
//!         websocket("/ws", |mut ws| async move {
//!             while let Some(msg) = ws.recv().await {
//!                 ws.send_json(&serde_json::json!({ "got": format!("{msg:?}") }))
//!                     .await?;
//!             }
//!             Ok(())
//!         }),
//!     ]);
//!
//!     run_app(app, ServeConfig::new().host("127.0.0.1").port(8080)).await
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`bridge`] | Server loop thread and cross-runtime handoff |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`routing`] | [`App`], [`RouteDef`], and the per-verb helpers |
//! | [`server`] | [`ServeConfig`] and the [`run_app`] bootstrap |
//! | [`ws`] | Websocket adapter: [`WsSession`], [`websocket`] |

// ============================================================================
// Modules
// ============================================================================

/// Server loop thread and cross-runtime handoff.
///
/// - [`ServerLoop`](bridge::ServerLoop) - guard owning the loop thread
/// - [`Remote`](bridge::Remote) - submits work to the loop
/// - [`AppHandle`](bridge::AppHandle) - runs work on the application runtime
pub mod bridge;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Route table types and helper constructors.
pub mod routing;

/// Serve configuration and the bootstrap entry point.
pub mod server;

/// Websocket adapter.
pub mod ws;

// ============================================================================
// Re-exports
// ============================================================================

// Bridge types
pub use bridge::{AppHandle, Remote, ServerLoop};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::SessionId;

// Routing types
pub use routing::{App, RouteDef, delete, get, head, patch, post, put, route, view};

// Server types
pub use server::{ListenTarget, ServeConfig, run_app};

// Websocket types
pub use ws::{CloseInfo, WsMsg, WsSession, websocket};
