//! Handoff from the server loop back to the application runtime.
//!
//! Route and websocket handlers are authored for the caller's runtime, but
//! the framework dispatches them from the server loop. [`AppHandle`] does
//! the calling-convention conversion: it schedules the handler onto the
//! application runtime and suspends the server-loop side until the handler
//! completes.

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;

use tokio::runtime::Handle;

use crate::error::{Error, Result};

// ============================================================================
// AppHandle
// ============================================================================

/// Handle to the application runtime.
///
/// Captured once per bootstrap call, inside [`run_app`](crate::run_app),
/// and cloned into every bridged handler.
#[derive(Clone, Debug)]
pub struct AppHandle {
    handle: Handle,
}

impl AppHandle {
    /// Captures the runtime the current task is executing on.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] when called outside a tokio runtime
    pub fn try_current() -> Result<Self> {
        Handle::try_current()
            .map(|handle| Self { handle })
            .map_err(|_| {
                Error::config("handlers must be bound from within the application runtime")
            })
    }

    /// Runs a future on the application runtime and waits for its output.
    ///
    /// The future is spawned as a task of its own, so a panic inside it is
    /// contained and reported as an error instead of unwinding through the
    /// server loop.
    ///
    /// # Errors
    ///
    /// - [`Error::HandlerPanic`] if the future panicked
    /// - [`Error::BridgeClosed`] if the application runtime shut down
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.handle.spawn(fut).await.map_err(|e| {
            if e.is_panic() {
                Error::handler_panic(panic_message(e.into_panic()))
            } else {
                Error::BridgeClosed
            }
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Extracts a printable message from a panic payload.
fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

// ============================================================================
// Tests
// ============================================================================
