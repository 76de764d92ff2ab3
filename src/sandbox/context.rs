//! Host-provided globals shared across sandboxes.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::script::Value;

/// A map of globals that sandboxes read live and write through.
///
/// Cloning yields another handle to the same map. Two sandboxes holding
/// clones of one context observe each other's writes to its keys.
#[derive(Clone, Debug, Default)]
pub struct SharedContext {
    entries: Arc<RwLock<BTreeMap<String, Value>>>,
}

impl SharedContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from a JSON object; other JSON values yield an empty
    /// context.
    pub fn from_json(json: serde_json::Value) -> Self {
        match Value::from(json) {
            Value::Object(map) => map.into_iter().collect(),
            _ => Self::new(),
        }
    }

    /// Whether `key` is part of this context.
    pub fn contains_key(&self, key: &str) -> bool {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.contains_key(key)
    }

    /// Current value of `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).cloned()
    }

    /// Set `key`, returning the previous value.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.into(), value.into())
    }

    /// Every key, sorted.
    pub fn keys(&self) -> Vec<String> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.keys().cloned().collect()
    }

    /// A point-in-time copy of every entry.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.clone()
    }

    /// Number of shared keys.
    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.len()
    }

    /// Whether the context shares no keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether both handles refer to the same underlying map.
    pub fn ptr_eq(&self, other: &SharedContext) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for SharedContext {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let entries = iter.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Self {
            entries: Arc::new(RwLock::new(entries)),
        }
    }
}
