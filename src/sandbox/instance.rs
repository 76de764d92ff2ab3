//! A single application's isolated global scope.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, trace};

use crate::sandbox::context::SharedContext;
use crate::script::{GlobalScope, Value, WriteOutcome};

/// Per-application global scope.
///
/// Reads prefer the shared context for keys it defines; everything else lives
/// in a private store. Writes are only accepted while the sandbox is running.
#[derive(Debug)]
pub struct Sandbox {
    name: String,
    running: AtomicBool,
    store: RwLock<HashMap<String, Value>>,
    context: RwLock<SharedContext>,
}

impl Sandbox {
    /// Create an inactive sandbox over `context`.
    pub fn new(name: impl Into<String>, context: SharedContext) -> Self {
        Self {
            name: name.into(),
            running: AtomicBool::new(false),
            store: RwLock::new(HashMap::new()),
            context: RwLock::new(context),
        }
    }

    /// The application name this sandbox belongs to.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn activate(&self) {
        self.running.store(true, Ordering::SeqCst);
    }

    pub fn deactivate(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Activate until the returned guard is dropped, then restore the
    /// previous state.
    pub fn enter(&self) -> ActiveGuard<'_> {
        let was_running = self.running.swap(true, Ordering::SeqCst);
        ActiveGuard {
            sandbox: self,
            was_running,
        }
    }

    /// Read a global.
    pub fn get(&self, key: &str) -> Value {
        let context = self.context();
        if context.contains_key(key) {
            return context.get(key).unwrap_or_default();
        }
        let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
        store.get(key).cloned().unwrap_or_default()
    }

    /// Write a global. Dropped while the sandbox is inactive.
    pub fn set(&self, key: &str, value: Value) -> WriteOutcome {
        if !self.is_running() {
            trace!(sandbox = %self.name, key, "write dropped on inactive sandbox");
            return WriteOutcome::Dropped;
        }

        let context = self.context();
        if context.contains_key(key) {
            context.insert(key, value.clone());
        }
        let mut store = self.store.write().unwrap_or_else(PoisonError::into_inner);
        store.insert(key.to_string(), value);
        WriteOutcome::Applied
    }

    /// Whether a global is bound, privately or through the shared context.
    pub fn has(&self, key: &str) -> bool {
        if self.context().contains_key(key) {
            return true;
        }
        let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
        store.contains_key(key)
    }

    /// Deactivate and forget every private global. The shared context is
    /// left as is.
    pub fn clear(&self) {
        self.deactivate();
        let mut store = self.store.write().unwrap_or_else(PoisonError::into_inner);
        store.clear();
        debug!(sandbox = %self.name, "sandbox cleared");
    }

    /// A handle to the current shared context.
    pub fn context(&self) -> SharedContext {
        let context = self.context.read().unwrap_or_else(PoisonError::into_inner);
        context.clone()
    }

    /// Point this sandbox at another shared context.
    pub fn set_context(&self, context: SharedContext) {
        let mut current = self.context.write().unwrap_or_else(PoisonError::into_inner);
        *current = context;
    }

    /// Merge `entries` over the current context into a fresh context owned
    /// by this sandbox. Sandboxes sharing the old context keep it unchanged.
    pub fn update_context<K, I>(&self, entries: I)
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let mut merged = self.context().snapshot();
        merged.extend(entries.into_iter().map(|(k, v)| (k.into(), v)));
        self.set_context(merged.into_iter().collect());
    }

    /// The [`GlobalScope`] view scripts resolve identifiers through.
    ///
    /// The proxy owns a handle to the sandbox so it can move onto the script
    /// engine's worker thread.
    pub fn proxy(self: &Arc<Self>) -> SandboxProxy {
        SandboxProxy {
            sandbox: Arc::clone(self),
        }
    }
}

/// Identifier resolution for scripts running in a [`Sandbox`].
#[derive(Debug, Clone)]
pub struct SandboxProxy {
    sandbox: Arc<Sandbox>,
}

impl SandboxProxy {
    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }
}

impl GlobalScope for SandboxProxy {
    fn get(&self, key: &str) -> Value {
        self.sandbox.get(key)
    }

    fn set(&self, key: &str, value: Value) -> WriteOutcome {
        self.sandbox.set(key, value)
    }

    fn has(&self, key: &str) -> bool {
        self.sandbox.has(key)
    }
}

/// Keeps a sandbox active; restores the prior running state on drop.
#[derive(Debug)]
#[must_use = "the sandbox is deactivated again when the guard is dropped"]
pub struct ActiveGuard<'a> {
    sandbox: &'a Sandbox,
    was_running: bool,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.sandbox
            .running
            .store(self.was_running, Ordering::SeqCst);
    }
}
