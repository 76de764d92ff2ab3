//! Runs script bodies inside a sandbox.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info_span, warn};

use crate::error::{EntryError, Result, ScriptError};
use crate::sandbox::instance::Sandbox;
use crate::sandbox::registry::SandboxRegistry;
use crate::script::{ConsoleOutput, ScriptEngine, ScriptLimits, ScriptOutcome};

/// A script body with the label used to report it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptBody {
    /// The script URL, or `inline script #n` for inline bodies.
    pub label: String,
    /// Script source text.
    pub source: String,
}

impl ScriptBody {
    pub fn new(label: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            source: source.into(),
        }
    }
}

/// Result of running a batch of scripts.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    /// Sandbox the batch ran in.
    pub app: String,
    /// Labels of executed bodies, in execution order.
    pub executed: Vec<String>,
    /// Global writes accepted and dropped across the batch.
    pub outcome: ScriptOutcome,
    /// Console output produced by the batch.
    pub console: ConsoleOutput,
    /// Wall time spent executing.
    pub duration: Duration,
}

impl ExecutionReport {
    /// Number of bodies executed.
    pub fn len(&self) -> usize {
        self.executed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executed.is_empty()
    }
}

/// Executes scripts through a sandbox's [`GlobalScope`](crate::script::GlobalScope).
///
/// Console output of every execution is collected in [`console`](Self::console).
#[derive(Debug, Clone, Default)]
pub struct ScriptExecutor {
    console: ConsoleOutput,
    engine: ScriptEngine,
}

impl ScriptExecutor {
    /// Create an executor with default limits and an empty console buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an executor that runs scripts under `limits`.
    pub fn with_limits(limits: ScriptLimits) -> Self {
        Self {
            console: ConsoleOutput::new(),
            engine: ScriptEngine::new(limits),
        }
    }

    /// Console output captured so far.
    pub fn console(&self) -> &ConsoleOutput {
        &self.console
    }

    /// Run one body against `sandbox` in a fresh realm.
    ///
    /// Global writes are only kept while the sandbox is running. Non-strict
    /// global mode has no meaning here: scripts always resolve globals
    /// through the sandbox, and `strict_global == false` only logs a warning.
    pub fn execute(
        &self,
        code: &str,
        sandbox: &Arc<Sandbox>,
        strict_global: bool,
    ) -> std::result::Result<ScriptOutcome, ScriptError> {
        warn_non_strict(sandbox, strict_global);
        self.engine
            .run(Arc::new(sandbox.proxy()), &self.console, code)
    }

    /// Run `bodies` in order with `sandbox` active, sharing one realm.
    ///
    /// Holds the registry's execution lock for the whole batch. The first
    /// failing body stops the batch; later bodies never run. Writes made by
    /// the failing body before it failed are kept.
    pub fn execute_all(
        &self,
        registry: &SandboxRegistry,
        sandbox: &Arc<Sandbox>,
        bodies: &[ScriptBody],
        strict_global: bool,
    ) -> Result<ExecutionReport> {
        let span = info_span!("execute_scripts", app = sandbox.name(), scripts = bodies.len());
        let _span = span.enter();
        warn_non_strict(sandbox, strict_global);

        let _exclusive = registry.lock_execution();
        let _active = sandbox.enter();
        let started = Instant::now();

        let mut report = ExecutionReport {
            app: sandbox.name().to_string(),
            executed: Vec::with_capacity(bodies.len()),
            outcome: ScriptOutcome::default(),
            console: self.console.clone(),
            duration: Duration::ZERO,
        };
        if bodies.is_empty() {
            return Ok(report);
        }

        let sources: Vec<&str> = bodies.iter().map(|body| body.source.as_str()).collect();
        let batch = self
            .engine
            .run_batch(Arc::new(sandbox.proxy()), &self.console, &sources);

        for (body, outcome) in bodies.iter().zip(&batch.completed) {
            debug!(script = %body.label, writes = outcome.writes_applied, "script executed");
            report.outcome.merge(*outcome);
            report.executed.push(body.label.clone());
        }

        if let Some(source) = batch.failure {
            let label = bodies
                .get(batch.completed.len())
                .map_or_else(String::new, |body| body.label.clone());
            warn!(script = %label, error = %source, "script failed; aborting batch");
            return Err(EntryError::Execution {
                app: sandbox.name().to_string(),
                script: label,
                source,
            });
        }

        report.duration = started.elapsed();
        Ok(report)
    }
}

fn warn_non_strict(sandbox: &Sandbox, strict_global: bool) {
    if !strict_global {
        warn!(
            sandbox = sandbox.name(),
            "non-strict global mode is unsupported; executing through the sandbox"
        );
    }
}
