//! Importing an entry: fetch, parse, inject styles, and run scripts on demand.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use url::Url;

use crate::entry::base;
use crate::entry::config::{ImportOptions, LoaderConfig};
use crate::entry::document::HostDocument;
use crate::entry::loader::ResourceLoader;
use crate::entry::parser::{EntryParser, ParsedEntry, ScriptRef};
use crate::entry::resource::{Attributes, ResourceDescriptor};
use crate::error::{EntryError, Result, Stage};
use crate::sandbox::executor::{ExecutionReport, ScriptBody, ScriptExecutor};
use crate::sandbox::registry::SandboxRegistry;
use crate::error::ScriptError;
use crate::script::{ConsoleOutput, ScriptLimits, ScriptOutcome};

/// What to import: a document URL, or markup already in hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// Fetched, with relative references resolved against its directory.
    Url(Url),
    /// Used as is, with relative references resolved against the host origin.
    Html(String),
}

impl Entry {
    /// Wrap raw markup.
    pub fn html(markup: impl Into<String>) -> Self {
        Entry::Html(markup.into())
    }
}

impl FromStr for Entry {
    type Err = EntryError;

    /// Strings starting with `http://` or `https://` are URLs; anything else
    /// is markup.
    fn from_str(entry: &str) -> Result<Self> {
        if base::is_url_entry(entry) {
            Url::parse(entry)
                .map(Entry::Url)
                .map_err(|e| EntryError::InvalidEntry(format!("{entry}: {e}")))
        } else {
            Ok(Entry::Html(entry.to_string()))
        }
    }
}

impl From<Url> for Entry {
    fn from(url: Url) -> Self {
        Entry::Url(url)
    }
}

/// Imports entries into a host document, running their scripts in sandboxes
/// from a shared registry.
pub struct EntryLoader {
    loader: ResourceLoader,
    settle_delay: Duration,
    script_limits: ScriptLimits,
    registry: Arc<SandboxRegistry>,
    document: Arc<dyn HostDocument>,
}

impl fmt::Debug for EntryLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryLoader")
            .field("loader", &self.loader)
            .field("settle_delay", &self.settle_delay)
            .field("script_limits", &self.script_limits)
            .field("registry", &self.registry)
            .field("document", &"<dyn HostDocument>")
            .finish()
    }
}

impl EntryLoader {
    /// Create a loader. Fails only if the HTTP client cannot be built.
    pub fn new(
        config: LoaderConfig,
        registry: Arc<SandboxRegistry>,
        document: Arc<dyn HostDocument>,
    ) -> Result<Self> {
        Ok(Self {
            loader: ResourceLoader::new(&config)?,
            settle_delay: config.settle_delay,
            script_limits: config.script_limits,
            registry,
            document,
        })
    }

    /// The underlying resource loader.
    pub fn resource_loader(&self) -> &ResourceLoader {
        &self.loader
    }

    /// The sandbox registry scripts run in.
    pub fn registry(&self) -> &Arc<SandboxRegistry> {
        &self.registry
    }

    /// Fetch and parse `entry`, inject its styles, and return a handle for
    /// its template and scripts.
    ///
    /// Styles are appended to the host document before this returns. Scripts
    /// are not fetched or run until [`ImportedEntry::exec_scripts`].
    pub async fn import_entry(&self, entry: Entry, options: ImportOptions) -> Result<ImportedEntry> {
        let (html, base_path) = match entry {
            Entry::Url(url) => {
                let html = self
                    .loader
                    .fetch_document(&url, &options.request_headers)
                    .await
                    .map_err(|reason| EntryError::EntryFetch {
                        url: url.clone(),
                        reason,
                    })?;
                (html, base::base_path_for_url(&url))
            }
            Entry::Html(html) => (html, base::base_path_for_origin(&self.document.origin())),
        };

        let parsed = EntryParser::parse(&html, &base_path);
        info!(
            base = %parsed.base_path,
            scripts = parsed.resources.scripts.len(),
            inline_scripts = parsed.resources.inline_scripts.len(),
            styles = parsed.resources.styles.len(),
            "entry parsed"
        );

        if options.get_styles {
            self.inject_styles(&parsed).await?;
        }
        if !options.ignore_preload_assets {
            self.warm_preloads(&parsed.resources.preloads);
        }

        Ok(ImportedEntry {
            parsed,
            options,
            loader: self.loader.clone(),
            settle_delay: self.settle_delay,
            script_limits: self.script_limits.clone(),
            registry: Arc::clone(&self.registry),
        })
    }

    /// Inline styles first, then external ones, each group in document order.
    async fn inject_styles(&self, parsed: &ParsedEntry) -> Result<()> {
        for css in &parsed.resources.inline_styles {
            self.document
                .append_style(css, &Attributes::new())
                .map_err(EntryError::Host)?;
        }

        let styles = &parsed.resources.styles;
        let loaded = self
            .loader
            .load_batch(styles)
            .await
            .into_result()
            .map_err(|failures| EntryError::Resources {
                stage: Stage::Fetch,
                failures,
            })?;
        for (resource, descriptor) in loaded.iter().zip(styles) {
            self.document
                .append_style(&resource.content, &descriptor.attributes)
                .map_err(EntryError::Host)?;
        }
        debug!(
            inline = parsed.resources.inline_styles.len(),
            external = loaded.len(),
            "styles injected"
        );
        Ok(())
    }

    /// Fetch preload hints in the background so later loads hit the cache.
    fn warm_preloads(&self, preloads: &[ResourceDescriptor]) {
        if preloads.is_empty() {
            return;
        }
        if self.loader.cache().is_none() {
            debug!(count = preloads.len(), "resource cache disabled; preload hints ignored");
            return;
        }

        let loader = self.loader.clone();
        let preloads = preloads.to_vec();
        tokio::spawn(async move {
            for result in loader.load_all(&preloads).await {
                if let Err(error) = result {
                    warn!(%error, "preload failed");
                }
            }
        });
    }
}

/// A parsed entry whose styles have been injected.
#[derive(Debug, Clone)]
pub struct ImportedEntry {
    parsed: ParsedEntry,
    options: ImportOptions,
    loader: ResourceLoader,
    settle_delay: Duration,
    script_limits: ScriptLimits,
    registry: Arc<SandboxRegistry>,
}

impl ImportedEntry {
    /// Body markup with scripts removed; empty when templates were not
    /// requested.
    pub fn template(&self) -> &str {
        if self.options.get_template {
            &self.parsed.template
        } else {
            ""
        }
    }

    /// Base that relative references were resolved against.
    pub fn asset_base_path(&self) -> &Url {
        &self.parsed.base_path
    }

    /// The full parse result.
    pub fn parsed(&self) -> &ParsedEntry {
        &self.parsed
    }

    /// Bodies of the external scripts, in document order. Empty when script
    /// execution is disabled.
    pub async fn get_external_scripts(&self) -> Result<Vec<String>> {
        if !self.options.execute_scripts {
            return Ok(Vec::new());
        }
        self.fetch_all(&self.parsed.resources.scripts).await
    }

    /// Bodies of the external stylesheets, in document order. Empty when
    /// styles are disabled.
    pub async fn get_external_style_sheets(&self) -> Result<Vec<String>> {
        if !self.options.get_styles {
            return Ok(Vec::new());
        }
        self.fetch_all(&self.parsed.resources.styles).await
    }

    async fn fetch_all(&self, descriptors: &[ResourceDescriptor]) -> Result<Vec<String>> {
        let loaded = self
            .loader
            .load_batch(descriptors)
            .await
            .into_result()
            .map_err(|failures| EntryError::Resources {
                stage: Stage::Fetch,
                failures,
            })?;
        Ok(loaded.into_iter().map(|resource| resource.content).collect())
    }

    /// Run every script of the entry in the sandbox named `app_name`.
    ///
    /// External scripts are fetched concurrently first; then inline and
    /// external bodies run once each, in document order, on a blocking
    /// worker. The first script error stops the run.
    pub async fn exec_scripts(&self, app_name: &str, strict_global: bool) -> Result<ExecutionReport> {
        if !self.options.execute_scripts {
            debug!(app = app_name, "script execution disabled for this entry");
            return Ok(ExecutionReport {
                app: app_name.to_string(),
                executed: Vec::new(),
                outcome: ScriptOutcome::default(),
                console: ConsoleOutput::new(),
                duration: Duration::ZERO,
            });
        }

        let external = self.get_external_scripts().await?;
        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }

        let context = self
            .options
            .shared_context
            .clone()
            .unwrap_or_else(|| self.registry.default_context().clone());
        let sandbox = self.registry.create(app_name, context);

        let resources = &self.parsed.resources;
        let bodies: Vec<ScriptBody> = self
            .parsed
            .script_order
            .iter()
            .filter_map(|script| match *script {
                ScriptRef::External(i) => Some(ScriptBody::new(
                    resources.scripts.get(i)?.url.as_str(),
                    external.get(i)?.as_str(),
                )),
                ScriptRef::Inline(i) => Some(ScriptBody::new(
                    format!("inline script #{i}"),
                    resources.inline_scripts.get(i)?.as_str(),
                )),
            })
            .collect();

        let executor = ScriptExecutor::with_limits(self.script_limits.clone());
        let registry = Arc::clone(&self.registry);
        let app = app_name.to_string();
        let report = tokio::task::spawn_blocking(move || {
            executor.execute_all(&registry, &sandbox, &bodies, strict_global)
        })
        .await
        .map_err(|e| EntryError::Execution {
            app,
            script: String::new(),
            source: ScriptError::Engine(format!("script task failed: {e}")),
        })??;
        info!(
            app = app_name,
            scripts = report.len(),
            elapsed_ms = report.duration.as_millis() as u64,
            "scripts executed"
        );
        Ok(report)
    }
}
