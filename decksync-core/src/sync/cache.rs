//! Shared document cache keyed by presentation id.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::listeners::{ListenerSet, Subscription};
use crate::models::Presentation;

/// Notification emitted when a cache entry changes.
#[derive(Debug, Clone)]
pub struct CacheUpdate {
    pub document_id: String,
    /// `None` when the entry was removed.
    pub presentation: Option<Arc<Presentation>>,
}

#[derive(Default)]
struct CacheInner {
    documents: RwLock<HashMap<String, Arc<Presentation>>>,
    listeners: ListenerSet<CacheUpdate>,
}

/// Cheaply cloneable handle to the cache. Entries are immutable snapshots;
/// every change installs a new `Arc`.
#[derive(Clone, Default)]
pub struct DocumentCache {
    inner: Arc<CacheInner>,
}

impl DocumentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, document_id: &str) -> Option<Arc<Presentation>> {
        self.inner.documents.read().get(document_id).cloned()
    }

    pub fn set(&self, presentation: Presentation) {
        let document_id = presentation.id.clone();
        self.update(&document_id, |_| Some(Arc::new(presentation)));
    }

    pub fn remove(&self, document_id: &str) {
        self.update(document_id, |_| None);
    }

    /// Replaces the entry for `document_id` with `apply(previous)`.
    /// Listeners are notified only if the entry actually changed. Returns
    /// whether it did.
    pub fn update<F>(&self, document_id: &str, apply: F) -> bool
    where
        F: FnOnce(Option<Arc<Presentation>>) -> Option<Arc<Presentation>>,
    {
        let next = {
            let mut documents = self.inner.documents.write();
            let previous = documents.get(document_id).cloned();
            let next = apply(previous.clone());
            let changed = match (&previous, &next) {
                (Some(a), Some(b)) => !Arc::ptr_eq(a, b),
                (None, None) => false,
                _ => true,
            };
            if !changed {
                return false;
            }
            match &next {
                Some(p) => documents.insert(document_id.to_string(), p.clone()),
                None => documents.remove(document_id),
            };
            next
        };

        self.inner.listeners.emit(&CacheUpdate {
            document_id: document_id.to_string(),
            presentation: next,
        });
        true
    }

    pub fn on_update<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&CacheUpdate) + Send + Sync + 'static,
    {
        self.inner.listeners.subscribe(callback)
    }

    pub fn len(&self) -> usize {
        self.inner.documents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
