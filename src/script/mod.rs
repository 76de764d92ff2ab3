//! Script execution for sandboxed applications.
//!
//! Bodies run on an embedded JavaScript engine against a [`GlobalScope`].
//! Every global read, write and presence check that is not an engine
//! intrinsic goes through that trait, so the scope decides where bindings
//! live. Values that cross into the scope are plain data ([`Value`]).

pub mod console;
mod convert;
pub mod engine;
pub mod limits;
mod scan;
pub mod value;

pub use console::{ConsoleLevel, ConsoleLine, ConsoleOutput};
pub use engine::{BatchOutcome, ScriptEngine};
pub use limits::{ScriptLimits, ScriptLimitsBuilder};
pub use value::Value;

/// Global name resolution for a running script.
///
/// Scripts run on a worker thread, so scopes must be shareable across
/// threads.
pub trait GlobalScope: Send + Sync {
    /// Read a global. Absent names read as [`Value::Undefined`].
    fn get(&self, key: &str) -> Value;

    /// Write a global.
    fn set(&self, key: &str, value: Value) -> WriteOutcome;

    /// Whether a global is bound.
    fn has(&self, key: &str) -> bool;
}

/// Result of a global write.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The value was stored.
    Applied,
    /// The scope is not accepting writes; the value was discarded.
    Dropped,
}

impl WriteOutcome {
    pub fn is_applied(self) -> bool {
        self == WriteOutcome::Applied
    }
}

/// Summary of one script run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScriptOutcome {
    /// Global writes the scope accepted.
    pub writes_applied: usize,
    /// Global writes the scope dropped.
    pub writes_dropped: usize,
}

impl ScriptOutcome {
    /// Accumulate another run into this one.
    pub fn merge(&mut self, other: ScriptOutcome) {
        self.writes_applied += other.writes_applied;
        self.writes_dropped += other.writes_dropped;
    }
}
