//! Resource body caching.
//!
//! Fetched script and style bodies are keyed by their absolute URL so an
//! entry's scripts are downloaded once even when both the host and
//! `exec_scripts` ask for them.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use url::Url;

/// A thread-safe cache of fetched resource bodies.
///
/// Only successful loads are stored; a failed fetch is retried on the next
/// request.
#[derive(Debug, Default)]
pub struct ResourceCache {
    entries: RwLock<HashMap<Url, Arc<str>>>,
}

impl ResourceCache {
    /// Create a new empty cache.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Get the cached body for `url`.
    pub fn get(&self, url: &Url) -> Option<Arc<str>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(url).map(Arc::clone)
    }

    /// Store a body. If another task stored the same URL first, that body is
    /// kept and returned.
    pub fn insert(&self, url: Url, content: &str) -> Arc<str> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(entries.entry(url).or_insert_with(|| Arc::from(content)))
    }

    /// Check if a body is cached.
    pub fn contains(&self, url: &Url) -> bool {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.contains_key(url)
    }

    /// Remove a body from the cache.
    ///
    /// Returns `true` if it was present.
    pub fn remove(&self, url: &Url) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(url).is_some()
    }

    /// Clear all cached bodies.
    pub fn clear(&self) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.clear();
    }

    /// Get the number of cached bodies.
    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
