//! Explicit authentication context.
//!
//! The bearer token lives in a [`SessionContext`] handed to whatever needs
//! it. Clones share the same token, so signing out through one clone is seen
//! by every repository holding another.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Shared handle to the current bearer token.
///
/// # Example
///
/// ```
/// use marquee_runtime::SessionContext;
///
/// let session = SessionContext::new();
/// let repository_view = session.clone();
///
/// session.sign_in("token-123");
/// assert_eq!(repository_view.token().as_deref(), Some("token-123"));
///
/// session.sign_out();
/// assert!(!repository_view.is_signed_in());
/// ```
#[derive(Clone, Default)]
pub struct SessionContext {
    token: Arc<RwLock<Option<String>>>,
}

impl SessionContext {
    /// Create a signed-out session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session that is already signed in.
    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        let session = Self::new();
        session.sign_in(token);
        session
    }

    /// Store a bearer token.
    pub fn sign_in(&self, token: impl Into<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.into());
        tracing::debug!("Session signed in");
    }

    /// Forget the bearer token.
    pub fn sign_out(&self) {
        self.token.write().unwrap_or_else(PoisonError::into_inner).take();
        tracing::debug!("Session signed out");
    }

    /// The current bearer token.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.token.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Whether a token is present.
    #[must_use]
    pub fn is_signed_in(&self) -> bool {
        self.token.read().unwrap_or_else(PoisonError::into_inner).is_some()
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("signed_in", &self.is_signed_in())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_does_not_leak_token() {
        let session = SessionContext::with_token("secret");
        let rendered = format!("{session:?}");

        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("signed_in: true"));
    }
}
