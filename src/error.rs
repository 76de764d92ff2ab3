//! Error types for entry loading and sandboxed execution.

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::entry::resource::ResourceKind;

/// Why a single resource could not be loaded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The fetch did not settle before the timeout fired.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Connection, DNS or body transfer failure.
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a non-2xx status.
    #[error("HTTP status {0}")]
    HttpStatus(u16),
}

/// A failed resource load. Returned as a value, never raised, so callers can
/// decide whether a partial load is acceptable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to load {kind} from {url}: {reason}")]
pub struct ResourceError {
    /// The absolute URL that was requested.
    pub url: Url,
    /// Whether this was a script or a style.
    pub kind: ResourceKind,
    /// The failure cause.
    pub reason: FailureReason,
}

impl ResourceError {
    /// Check if this failure was caused by the timeout firing.
    pub fn is_timeout(&self) -> bool {
        matches!(self.reason, FailureReason::Timeout(_))
    }

    /// Check if this failure was a transport-level error.
    pub fn is_network(&self) -> bool {
        matches!(self.reason, FailureReason::Network(_))
    }

    /// The HTTP status code, if the server answered with a non-2xx status.
    pub fn http_status(&self) -> Option<u16> {
        match self.reason {
            FailureReason::HttpStatus(code) => Some(code),
            _ => None,
        }
    }
}

/// Entry markup that could not be scanned. Never fatal: the parser falls back
/// to passing the markup through untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed entry markup at byte {offset}: {message}")]
pub struct ParseFailure {
    /// Byte offset into the markup where scanning gave up.
    pub offset: usize,
    /// What was wrong.
    pub message: String,
}

/// Errors raised while running a script body.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScriptError {
    /// The script text could not be parsed.
    #[error("SyntaxError: {0}")]
    Syntax(String),

    /// An unbound identifier was read.
    #[error("ReferenceError: {0}")]
    Reference(String),

    /// An operation was applied to a value of the wrong type, or a value
    /// could not be stored on the sandbox.
    #[error("TypeError: {0}")]
    Type(String),

    /// A numeric argument was out of range.
    #[error("RangeError: {0}")]
    Range(String),

    /// The script threw a value, or an error of another kind.
    #[error("Uncaught {0}")]
    Thrown(String),

    /// The script exceeded a configured limit (nesting, loop iterations,
    /// recursion).
    #[error("script limit exceeded: {0}")]
    Limit(String),

    /// The engine itself failed (worker thread could not start or panicked).
    #[error("script engine failure: {0}")]
    Engine(String),
}

impl ScriptError {
    /// Check if this error came from a configured limit.
    pub fn is_limit(&self) -> bool {
        matches!(self, ScriptError::Limit(_))
    }
}

/// The orchestrator stage an [`EntryError`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Fetching the entry document or its resources.
    Fetch,
    /// Interpreting the entry string or applying its markup to the host.
    /// Malformed markup is not reported here: the parser passes it through
    /// as the template instead.
    Parse,
    /// Running the entry's scripts.
    Execute,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Fetch => "fetch",
            Stage::Parse => "parse",
            Stage::Execute => "execute",
        })
    }
}

/// Aggregated error surfaced by [`EntryLoader`](crate::EntryLoader) and
/// [`ImportedEntry`](crate::ImportedEntry).
#[derive(Error, Debug)]
pub enum EntryError {
    /// The entry document itself could not be fetched.
    #[error("fetch stage failed for entry {url}: {reason}")]
    EntryFetch {
        /// Entry URL.
        url: Url,
        /// Failure cause.
        reason: FailureReason,
    },

    /// One or more resources of the entry failed to load.
    #[error("{stage} stage failed: {}", summarize(.failures))]
    Resources {
        /// Stage in which the batch was needed.
        stage: Stage,
        /// Every failed resource, in descriptor order.
        failures: Vec<ResourceError>,
    },

    /// A script raised an error; remaining scripts of the entry were skipped.
    #[error("execute stage failed for app `{app}` in {script}: {source}")]
    Execution {
        /// Sandbox name the scripts ran in.
        app: String,
        /// Which script body failed (URL or inline position).
        script: String,
        /// The script engine error.
        #[source]
        source: ScriptError,
    },

    /// The entry string was neither a usable URL nor markup.
    #[error("invalid entry: {0}")]
    InvalidEntry(String),

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    /// The host document rejected a side effect (style injection).
    #[error("host document error: {0}")]
    Host(#[source] anyhow::Error),
}

impl EntryError {
    /// The stage this error belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            EntryError::EntryFetch { .. } | EntryError::HttpClient(_) => Stage::Fetch,
            EntryError::Resources { stage, .. } => *stage,
            EntryError::Execution { .. } => Stage::Execute,
            EntryError::InvalidEntry(_) | EntryError::Host(_) => Stage::Parse,
        }
    }

    /// Check if this error (or any aggregated resource failure) was a timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            EntryError::EntryFetch { reason, .. } => matches!(reason, FailureReason::Timeout(_)),
            EntryError::Resources { failures, .. } => failures.iter().any(ResourceError::is_timeout),
            _ => false,
        }
    }

    /// Check if this error came from a script raising.
    pub fn is_script_error(&self) -> bool {
        matches!(self, EntryError::Execution { .. })
    }

    /// Aggregated resource failures, if any.
    pub fn resource_failures(&self) -> &[ResourceError] {
        match self {
            EntryError::Resources { failures, .. } => failures,
            _ => &[],
        }
    }
}

fn summarize(failures: &[ResourceError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias for entry operations.
pub type Result<T> = std::result::Result<T, EntryError>;
