//! Type-safe identifiers.
//!
//! Newtype wrappers prevent mixing unrelated IDs at compile time and keep
//! log output uniform.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use uuid::Uuid;

// ============================================================================
// SessionId
// ============================================================================

/// Identifier for one websocket session.
///
/// Assigned at upgrade time and carried in every log line the session
/// emits, so concurrent connections can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Creates a fresh random session ID.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The first uuid group is unique enough for log correlation.
        let s = self.0.to_string();
        f.write_str(&s[..8])
    }
}

// ============================================================================
// Tests
// ============================================================================
