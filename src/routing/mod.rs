//! Route table construction.
//!
//! Route helpers turn a handler authored for the application runtime into a
//! [`RouteDef`] the framework's dispatch loop can call from the server
//! loop. The helpers are pass-through constructors: no validation beyond
//! what the router itself performs.
//!
//! # Example
//!
//! ```ignore
//! use loopbridge::{App, get, post};
//!
//! let app = App::new().add_routes([
//!     get("/", index),
//!     post("/submit", submit),
//! ]);
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `route` | [`RouteDef`] and the per-verb helper functions |
//! | `app` | [`App`] — ordered route collection, router conversion |

// ============================================================================
// Submodules
// ============================================================================

/// Route definitions and helper constructors.
pub mod route;

/// Application: route collection and router conversion.
pub mod app;

// ============================================================================
// Re-exports
// ============================================================================

pub use app::App;
pub use route::{RouteDef, delete, get, head, patch, post, put, route, view};
