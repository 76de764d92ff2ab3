//! Capture of `console.*` output produced by sandbox scripts.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{error, info, warn};

/// Severity of a console line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleLevel {
    Log,
    Info,
    Warn,
    Error,
}

impl fmt::Display for ConsoleLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConsoleLevel::Log => "log",
            ConsoleLevel::Info => "info",
            ConsoleLevel::Warn => "warn",
            ConsoleLevel::Error => "error",
        })
    }
}

/// One captured console call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleLine {
    pub level: ConsoleLevel,
    pub text: String,
}

/// A shared buffer of console lines.
///
/// Every recorded line is also emitted as a `tracing` event at the matching
/// level, so hosts see script output in their normal logs.
#[derive(Clone, Debug, Default)]
pub struct ConsoleOutput {
    lines: Arc<Mutex<Vec<ConsoleLine>>>,
}

impl ConsoleOutput {
    /// Create a new empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a line.
    pub fn record(&self, level: ConsoleLevel, text: impl Into<String>) {
        let text = text.into();
        match level {
            ConsoleLevel::Log | ConsoleLevel::Info => info!(target: "script_console", %level, "{text}"),
            ConsoleLevel::Warn => warn!(target: "script_console", "{text}"),
            ConsoleLevel::Error => error!(target: "script_console", "{text}"),
        }
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        lines.push(ConsoleLine { level, text });
    }

    /// Every captured line, in call order.
    pub fn lines(&self) -> Vec<ConsoleLine> {
        let lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        lines.clone()
    }

    /// Text of `log` and `info` lines, newline-joined.
    pub fn stdout_str(&self) -> String {
        self.joined(|level| matches!(level, ConsoleLevel::Log | ConsoleLevel::Info))
    }

    /// Text of `warn` and `error` lines, newline-joined.
    pub fn stderr_str(&self) -> String {
        self.joined(|level| matches!(level, ConsoleLevel::Warn | ConsoleLevel::Error))
    }

    fn joined(&self, keep: impl Fn(ConsoleLevel) -> bool) -> String {
        let lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        lines
            .iter()
            .filter(|line| keep(line.level))
            .map(|line| line.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Clear the buffer.
    pub fn clear(&self) {
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        lines.clear();
    }

    /// Number of captured lines.
    pub fn len(&self) -> usize {
        let lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        lines.len()
    }

    /// Check if nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_by_level() {
        let console = ConsoleOutput::new();
        console.record(ConsoleLevel::Log, "hello");
        console.record(ConsoleLevel::Warn, "careful");
        console.record(ConsoleLevel::Info, "world");

        assert_eq!(console.stdout_str(), "hello\nworld");
        assert_eq!(console.stderr_str(), "careful");
        assert_eq!(console.len(), 3);
    }

    #[test]
    fn test_clones_share_buffer() {
        let console = ConsoleOutput::new();
        let clone = console.clone();
        clone.record(ConsoleLevel::Error, "boom");
        assert_eq!(console.lines()[0].level, ConsoleLevel::Error);

        console.clear();
        assert!(clone.is_empty());
    }
}
