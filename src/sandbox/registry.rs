//! Name-keyed registry of application sandboxes.
//!
//! Sandboxes are created lazily on first use and live until removed, so the
//! same application name always resolves to the same scope across imports.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tracing::debug;

use crate::sandbox::context::SharedContext;
use crate::sandbox::instance::Sandbox;

/// A thread-safe map from application name to [`Sandbox`].
///
/// # Example
///
/// ```rust
/// use entry_sandbox_rs::{SandboxRegistry, SharedContext};
/// use std::sync::Arc;
///
/// let registry = SandboxRegistry::new();
/// let first = registry.create("app1", SharedContext::new());
/// let second = registry.create("app1", SharedContext::new());
///
/// assert!(Arc::ptr_eq(&first, &second));
/// ```
#[derive(Debug, Default)]
pub struct SandboxRegistry {
    sandboxes: RwLock<HashMap<String, Arc<Sandbox>>>,
    default_context: SharedContext,
    execution: Mutex<()>,
}

impl SandboxRegistry {
    /// Create an empty registry with an empty default context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry whose [`create_default`](Self::create_default)
    /// sandboxes share `context`.
    pub fn with_shared_context(context: SharedContext) -> Self {
        Self {
            default_context: context,
            ..Self::default()
        }
    }

    /// The context handed to sandboxes created without an explicit one.
    pub fn default_context(&self) -> &SharedContext {
        &self.default_context
    }

    /// Get the sandbox for `name`, creating it over `context` if absent.
    ///
    /// An existing sandbox keeps its own context; `context` is only used on
    /// creation.
    pub fn create(&self, name: &str, context: SharedContext) -> Arc<Sandbox> {
        {
            let sandboxes = self.sandboxes.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(sandbox) = sandboxes.get(name) {
                return Arc::clone(sandbox);
            }
        }

        let mut sandboxes = self.sandboxes.write().unwrap_or_else(PoisonError::into_inner);
        // Another thread may have created it between the two locks.
        if let Some(existing) = sandboxes.get(name) {
            return Arc::clone(existing);
        }
        let sandbox = Arc::new(Sandbox::new(name, context));
        sandboxes.insert(name.to_string(), Arc::clone(&sandbox));
        debug!(sandbox = name, "created sandbox");
        sandbox
    }

    /// Get or create `name` over the registry's default context.
    pub fn create_default(&self, name: &str) -> Arc<Sandbox> {
        self.create(name, self.default_context.clone())
    }

    /// Look up an existing sandbox.
    pub fn get(&self, name: &str) -> Option<Arc<Sandbox>> {
        let sandboxes = self.sandboxes.read().unwrap_or_else(PoisonError::into_inner);
        sandboxes.get(name).map(Arc::clone)
    }

    /// Clear and evict a sandbox.
    ///
    /// Returns `true` if it was present.
    pub fn remove(&self, name: &str) -> bool {
        let removed = {
            let mut sandboxes = self.sandboxes.write().unwrap_or_else(PoisonError::into_inner);
            sandboxes.remove(name)
        };
        match removed {
            Some(sandbox) => {
                sandbox.clear();
                true
            }
            None => false,
        }
    }

    /// Clear every sandbox and empty the registry.
    pub fn clear_all(&self) {
        let drained: Vec<_> = {
            let mut sandboxes = self.sandboxes.write().unwrap_or_else(PoisonError::into_inner);
            sandboxes.drain().map(|(_, sandbox)| sandbox).collect()
        };
        for sandbox in &drained {
            sandbox.clear();
        }
        debug!(count = drained.len(), "cleared all sandboxes");
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let sandboxes = self.sandboxes.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<_> = sandboxes.keys().cloned().collect();
        names.sort();
        names
    }

    /// Get the number of registered sandboxes.
    pub fn len(&self) -> usize {
        let sandboxes = self.sandboxes.read().unwrap_or_else(PoisonError::into_inner);
        sandboxes.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serializes script batches so bodies from different imports never
    /// interleave.
    pub(crate) fn lock_execution(&self) -> MutexGuard<'_, ()> {
        self.execution.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::Value;

    #[test]
    fn test_registry_new() {
        let registry = SandboxRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.get("app").is_none());
    }

    #[test]
    fn test_create_is_idempotent() {
        let registry = SandboxRegistry::new();
        let first = registry.create_default("app1");
        let other_context: SharedContext = [("x", Value::from(1))].into_iter().collect();
        let second = registry.create("app1", other_context);

        assert!(Arc::ptr_eq(&first, &second));
        assert!(!second.has("x"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_default_context_is_shared() {
        let context: SharedContext = [("path", Value::from("/"))].into_iter().collect();
        let registry = SandboxRegistry::with_shared_context(context);
        let a = registry.create_default("a");
        let b = registry.create_default("b");

        let _guard = a.enter();
        let _ = a.set("path", Value::from("/a"));
        assert_eq!(b.get("path"), Value::from("/a"));
    }

    #[test]
    fn test_remove_clears_sandbox() {
        let registry = SandboxRegistry::new();
        let sandbox = registry.create_default("app");
        sandbox.activate();
        let _ = sandbox.set("x", Value::from(1));

        assert!(registry.remove("app"));
        assert!(!registry.remove("app"));
        assert!(!sandbox.is_running());
        assert!(!sandbox.has("x"));
    }

    #[test]
    fn test_clear_all_and_names() {
        let registry = SandboxRegistry::new();
        registry.create_default("b");
        registry.create_default("a");
        assert_eq!(registry.names(), vec!["a".to_string(), "b".to_string()]);

        registry.clear_all();
        assert!(registry.is_empty());
    }
}
