//! Loader configuration and per-import options, with builders.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::sandbox::context::SharedContext;
use crate::script::ScriptLimits;

/// Default per-resource fetch timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Configuration for an [`EntryLoader`](crate::EntryLoader) and its
/// [`ResourceLoader`](crate::ResourceLoader).
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Timeout applied to every resource fetch unless overridden per call.
    pub timeout: Duration,
    /// Pause between fetching external scripts and running them.
    pub settle_delay: Duration,
    /// Keep fetched resource bodies in a URL-keyed cache.
    pub cache_resources: bool,
    /// Honour `HTTP_PROXY`/`HTTPS_PROXY` style environment variables.
    pub proxy_from_env: bool,
    /// User agent sent with every request.
    pub user_agent: String,
    /// Bounds applied to every script batch.
    pub script_limits: ScriptLimits,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            settle_delay: Duration::ZERO,
            cache_resources: true,
            proxy_from_env: true,
            user_agent: concat!("entry-sandbox-rs/", env!("CARGO_PKG_VERSION")).to_string(),
            script_limits: ScriptLimits::default(),
        }
    }
}

impl LoaderConfig {
    /// Create a new builder for LoaderConfig.
    pub fn builder() -> LoaderConfigBuilder {
        LoaderConfigBuilder::default()
    }
}

/// Builder for creating LoaderConfig instances.
#[derive(Debug, Clone, Default)]
pub struct LoaderConfigBuilder {
    timeout: Option<Duration>,
    settle_delay: Option<Duration>,
    cache_resources: Option<bool>,
    proxy_from_env: Option<bool>,
    user_agent: Option<String>,
    script_limits: Option<ScriptLimits>,
}

impl LoaderConfigBuilder {
    /// Set the per-resource fetch timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the delay inserted before scripts run.
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = Some(delay);
        self
    }

    /// Enable or disable the resource cache.
    pub fn cache_resources(mut self, enabled: bool) -> Self {
        self.cache_resources = Some(enabled);
        self
    }

    /// Enable or disable proxy detection from the environment.
    pub fn proxy_from_env(mut self, enabled: bool) -> Self {
        self.proxy_from_env = Some(enabled);
        self
    }

    /// Set the user agent.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Set the limits scripts run under.
    pub fn script_limits(mut self, limits: ScriptLimits) -> Self {
        self.script_limits = Some(limits);
        self
    }

    /// Build the LoaderConfig.
    pub fn build(self) -> LoaderConfig {
        let default = LoaderConfig::default();
        LoaderConfig {
            timeout: self.timeout.unwrap_or(default.timeout),
            settle_delay: self.settle_delay.unwrap_or(default.settle_delay),
            cache_resources: self.cache_resources.unwrap_or(default.cache_resources),
            proxy_from_env: self.proxy_from_env.unwrap_or(default.proxy_from_env),
            user_agent: self.user_agent.unwrap_or(default.user_agent),
            script_limits: self.script_limits.unwrap_or(default.script_limits),
        }
    }
}

/// Options recognised by [`EntryLoader::import_entry`](crate::EntryLoader::import_entry).
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Include the body markup in the result.
    pub get_template: bool,
    /// Extract and allow execution of scripts at all.
    pub execute_scripts: bool,
    /// Fetch styles and inject them into the host document immediately.
    pub get_styles: bool,
    /// Skip warming the cache from `preload`/`prefetch` hints.
    pub ignore_preload_assets: bool,
    /// Extra headers sent with the entry document request.
    pub request_headers: BTreeMap<String, String>,
    /// Context handed to a sandbox created by `exec_scripts`. Falls back to the
    /// registry's default context.
    pub shared_context: Option<SharedContext>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            get_template: true,
            execute_scripts: true,
            get_styles: true,
            ignore_preload_assets: false,
            request_headers: BTreeMap::new(),
            shared_context: None,
        }
    }
}

impl ImportOptions {
    /// Create a new builder for ImportOptions.
    pub fn builder() -> ImportOptionsBuilder {
        ImportOptionsBuilder {
            options: ImportOptions::default(),
        }
    }
}

/// Builder for ImportOptions.
#[derive(Debug, Clone)]
pub struct ImportOptionsBuilder {
    options: ImportOptions,
}

impl ImportOptionsBuilder {
    pub fn get_template(mut self, enabled: bool) -> Self {
        self.options.get_template = enabled;
        self
    }

    pub fn execute_scripts(mut self, enabled: bool) -> Self {
        self.options.execute_scripts = enabled;
        self
    }

    pub fn get_styles(mut self, enabled: bool) -> Self {
        self.options.get_styles = enabled;
        self
    }

    pub fn ignore_preload_assets(mut self, ignore: bool) -> Self {
        self.options.ignore_preload_assets = ignore;
        self
    }

    /// Add a header to the entry document request.
    pub fn request_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.request_headers.insert(name.into(), value.into());
        self
    }

    pub fn shared_context(mut self, context: SharedContext) -> Self {
        self.options.shared_context = Some(context);
        self
    }

    pub fn build(self) -> ImportOptions {
        self.options
    }
}
