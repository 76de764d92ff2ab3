//! Bounds applied to every script batch.

/// Limits for running untrusted script bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptLimits {
    /// Deepest syntactic nesting accepted before a body is handed to the
    /// engine (brackets, prefix operator runs, chained assignments).
    pub max_nesting: usize,
    /// Iterations a single loop may run.
    pub loop_iteration_limit: u64,
    /// Depth of nested native calls inside the engine.
    pub recursion_limit: usize,
    /// Stack size of the engine worker thread, in bytes.
    pub stack_size: usize,
    /// Longest array (or object key list) a script may store on a sandbox.
    pub max_array_length: u64,
    /// Deepest object graph a script may store on a sandbox.
    pub max_value_depth: usize,
}

impl Default for ScriptLimits {
    fn default() -> Self {
        Self {
            max_nesting: 256,
            loop_iteration_limit: 10_000_000,
            recursion_limit: 512,
            stack_size: 32 * 1024 * 1024, // 32MB
            max_array_length: 1 << 20,
            max_value_depth: 64,
        }
    }
}

impl ScriptLimits {
    /// Create a new builder for ScriptLimits.
    pub fn builder() -> ScriptLimitsBuilder {
        ScriptLimitsBuilder::default()
    }
}

/// Builder for [`ScriptLimits`].
#[derive(Debug, Clone, Default)]
pub struct ScriptLimitsBuilder {
    max_nesting: Option<usize>,
    loop_iteration_limit: Option<u64>,
    recursion_limit: Option<usize>,
    stack_size: Option<usize>,
    max_array_length: Option<u64>,
    max_value_depth: Option<usize>,
}

impl ScriptLimitsBuilder {
    /// Set the deepest accepted syntactic nesting.
    pub fn max_nesting(mut self, depth: usize) -> Self {
        self.max_nesting = Some(depth);
        self
    }

    /// Set the per-loop iteration limit.
    pub fn loop_iteration_limit(mut self, iterations: u64) -> Self {
        self.loop_iteration_limit = Some(iterations);
        self
    }

    /// Set the engine recursion limit.
    pub fn recursion_limit(mut self, depth: usize) -> Self {
        self.recursion_limit = Some(depth);
        self
    }

    /// Set the worker thread stack size in bytes.
    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    /// Set the longest array a script may store on a sandbox.
    pub fn max_array_length(mut self, length: u64) -> Self {
        self.max_array_length = Some(length);
        self
    }

    /// Set the deepest object graph a script may store on a sandbox.
    pub fn max_value_depth(mut self, depth: usize) -> Self {
        self.max_value_depth = Some(depth);
        self
    }

    /// Build the limits, using defaults for unset values.
    pub fn build(self) -> ScriptLimits {
        let default = ScriptLimits::default();
        ScriptLimits {
            max_nesting: self.max_nesting.unwrap_or(default.max_nesting),
            loop_iteration_limit: self
                .loop_iteration_limit
                .unwrap_or(default.loop_iteration_limit),
            recursion_limit: self.recursion_limit.unwrap_or(default.recursion_limit),
            stack_size: self.stack_size.unwrap_or(default.stack_size),
            max_array_length: self.max_array_length.unwrap_or(default.max_array_length),
            max_value_depth: self.max_value_depth.unwrap_or(default.max_value_depth),
        }
    }
}
