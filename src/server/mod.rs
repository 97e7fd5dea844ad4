//! Server bootstrap.
//!
//! Serving happens on the server loop; handlers run on the application
//! runtime. [`run_app`] wires the two together for the lifetime of one
//! call:
//!
//! ```text
//! run_app ──► ServerLoop::open ──► bind sites ──► serve ──► wind down
//!                  (bridge)        (on loop)    (blocks)   (all paths)
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `config` | [`ServeConfig`] builder and endpoint derivation |
//! | `site` | [`ListenTarget`] and bound-site lifecycle |
//! | `runner` | [`run_app`] itself |

// ============================================================================
// Submodules
// ============================================================================

/// Serve configuration and endpoint derivation.
pub mod config;

/// The bootstrap entry point.
pub mod runner;

/// Listen targets and bound sites.
pub mod site;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::{DEFAULT_HOST, DEFAULT_PORT, Printer, ServeConfig};
pub use runner::run_app;
pub use site::ListenTarget;
