//! Shared bearer-token handle.
//!
//! One `AuthToken` is created per process and handed to the `HttpClient`;
//! every clone sees the same value. The last `set` wins.

use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Clone, Default)]
pub struct AuthToken {
    inner: Arc<RwLock<Option<String>>>,
}

impl AuthToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, token: Option<String>) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = token;
    }

    pub fn get(&self) -> Option<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_set(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// `authorization` header for the current token, if any.
    pub(crate) fn header(&self) -> Option<(String, String)> {
        self.get()
            .map(|token| ("authorization".to_string(), format!("Bearer {token}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_token() {
        let token = AuthToken::new();
        let other = token.clone();
        token.set(Some("abc123".to_string()));
        assert_eq!(other.get().as_deref(), Some("abc123"));
        other.set(None);
        assert!(!token.is_set());
        assert!(token.header().is_none());
    }

    #[test]
    fn header_uses_bearer_scheme() {
        let token = AuthToken::new();
        token.set(Some("t0k".to_string()));
        assert_eq!(
            token.header(),
            Some(("authorization".to_string(), "Bearer t0k".to_string()))
        );
    }
}
