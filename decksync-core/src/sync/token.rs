//! Bearer credential source for the socket handshake.

use std::sync::Arc;

use parking_lot::RwLock;

/// Supplies the current bearer token, or `None` when signed out.
pub trait TokenProvider: Send + Sync {
    fn access_token(&self) -> Option<String>;
}

impl<F> TokenProvider for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn access_token(&self) -> Option<String> {
        self()
    }
}

/// A token holder that can be swapped at runtime (sign-in / sign-out).
#[derive(Debug, Clone, Default)]
pub struct SharedToken {
    token: Arc<RwLock<Option<String>>>,
}

impl SharedToken {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: Arc::new(RwLock::new(token)),
        }
    }

    pub fn set(&self, token: Option<String>) {
        *self.token.write() = token;
    }
}

impl TokenProvider for SharedToken {
    fn access_token(&self) -> Option<String> {
        self.token.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_provider() {
        let provider = || Some("abc".to_string());
        assert_eq!(provider.access_token().as_deref(), Some("abc"));
    }

    #[test]
    fn test_shared_token_swap() {
        let token = SharedToken::new(None);
        assert!(token.access_token().is_none());
        let clone = token.clone();
        clone.set(Some("t1".into()));
        assert_eq!(token.access_token().as_deref(), Some("t1"));
    }
}
