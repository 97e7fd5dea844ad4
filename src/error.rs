//! Error types for loopbridge.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use loopbridge::{Result, WsSession};
//!
//! async fn example(ws: &WsSession) -> Result<()> {
//!     ws.send_text("hello").await?;
//!     ws.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidMethod`] |
//! | Serving | [`Error::Bind`], [`Error::Serve`] |
//! | Bridging | [`Error::BridgeClosed`], [`Error::HandlerPanic`] |
//! | Websocket | [`Error::SessionClosed`] |
//! | External | [`Error::Io`], [`Error::Json`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when serve configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// HTTP method not expressible as a route filter.
    ///
    /// Returned by [`route`](crate::route) for methods the router
    /// cannot dispatch on (e.g. `CONNECT`).
    #[error("Unsupported route method: {method}")]
    InvalidMethod {
        /// The rejected method name.
        method: String,
    },

    // ========================================================================
    // Serving Errors
    // ========================================================================
    /// Failed to bind a listen target.
    ///
    /// Returned during bootstrap when a site cannot be bound or started.
    #[error("Failed to bind {target}: {source}")]
    Bind {
        /// Human-readable name of the listen target.
        target: String,
        /// Underlying IO error.
        #[source]
        source: IoError,
    },

    /// A started site terminated with an error.
    #[error("Site {site} failed: {message}")]
    Serve {
        /// Name of the failed site.
        site: String,
        /// Description of the failure.
        message: String,
    },

    // ========================================================================
    // Bridging Errors
    // ========================================================================
    /// The event-loop bridge has shut down.
    ///
    /// Returned when an operation is submitted to a closed [`ServerLoop`]
    /// or when the peer runtime disappeared mid-call.
    ///
    /// [`ServerLoop`]: crate::bridge::ServerLoop
    #[error("Event-loop bridge closed")]
    BridgeClosed,

    /// A bridged handler panicked on the application runtime.
    #[error("Handler panicked: {message}")]
    HandlerPanic {
        /// Panic payload description.
        message: String,
    },

    // ========================================================================
    // Websocket Errors
    // ========================================================================
    /// Websocket session is closed.
    ///
    /// Returned when sending on a session whose connection is gone.
    #[error("Websocket session closed")]
    SessionClosed,

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid method error.
    #[inline]
    pub fn invalid_method(method: impl Into<String>) -> Self {
        Self::InvalidMethod {
            method: method.into(),
        }
    }

    /// Creates a bind error for the named target.
    #[inline]
    pub fn bind(target: impl Into<String>, source: IoError) -> Self {
        Self::Bind {
            target: target.into(),
            source,
        }
    }

    /// Creates a serve error for the named site.
    #[inline]
    pub fn serve(site: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Serve {
            site: site.into(),
            message: message.into(),
        }
    }

    /// Creates a handler panic error.
    #[inline]
    pub fn handler_panic(message: impl Into<String>) -> Self {
        Self::HandlerPanic {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a bind or serve failure.
    #[inline]
    #[must_use]
    pub fn is_serve_error(&self) -> bool {
        matches!(self, Self::Bind { .. } | Self::Serve { .. })
    }

    /// Returns `true` if this error indicates a torn-down peer.
    ///
    /// Covers both a closed bridge and a closed websocket session.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::BridgeClosed | Self::SessionClosed)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::config("no listen targets");
        assert_eq!(err.to_string(), "Configuration error: no listen targets");
    }

    #[test]
    fn test_bind_error_display() {
        let io = IoError::new(ErrorKind::AddrInUse, "address in use");
        let err = Error::bind("http://127.0.0.1:8080", io);
        assert!(err.to_string().contains("http://127.0.0.1:8080"));
        assert!(err.to_string().contains("address in use"));
    }

    #[test]
    fn test_invalid_method() {
        let err = Error::invalid_method("CONNECT");
        assert_eq!(err.to_string(), "Unsupported route method: CONNECT");
    }

    #[test]
    fn test_is_serve_error() {
        let bind = Error::bind("x", IoError::other("boom"));
        let serve = Error::serve("x", "boom");
        let other = Error::config("test");

        assert!(bind.is_serve_error());
        assert!(serve.is_serve_error());
        assert!(!other.is_serve_error());
    }

    #[test]
    fn test_is_closed() {
        assert!(Error::BridgeClosed.is_closed());
        assert!(Error::SessionClosed.is_closed());
        assert!(!Error::config("test").is_closed());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
