//! # Entry Sandbox
//!
//! Loads micro-frontend entry documents and runs their scripts in isolated,
//! per-application sandboxes.
//!
//! An entry is an HTML document (fetched by URL or supplied as markup). This
//! crate scans it for scripts, stylesheets and preload hints, resolves every
//! reference against the entry's base path, injects the styles into a host
//! document, and hands back the template plus a handle that runs the scripts
//! on demand:
//!
//! - **Tolerant parsing**: malformed markup degrades to a passthrough, never
//!   an error
//! - **Bounded fetches**: every resource load has its own timeout, and a
//!   timeout is reported separately from network and HTTP failures
//! - **Concurrent batches**: external resources are fetched in parallel while
//!   execution stays in document order
//! - **Isolation**: each application writes its globals into its own sandbox;
//!   only keys of an explicit shared context leak between applications
//!
//! ## Example
//!
//! ```rust,no_run
//! use entry_sandbox_rs::prelude::*;
//! use std::sync::Arc;
//! use url::Url;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let document = Arc::new(MemoryDocument::new(Url::parse("https://host.example").unwrap()));
//!     let registry = Arc::new(SandboxRegistry::new());
//!     let loader = EntryLoader::new(LoaderConfig::default(), registry, document)?;
//!
//!     let entry = "https://apps.example/shop/index.html".parse::<Entry>()?;
//!     let imported = loader.import_entry(entry, ImportOptions::default()).await?;
//!
//!     println!("{}", imported.template());
//!     imported.exec_scripts("shop", true).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Execution Model
//!
//! Scripts run on an embedded JavaScript engine ([`boa_engine`]), one fresh
//! realm per batch, on a dedicated worker thread. The realm's global
//! identifiers resolve through the sandbox:
//!
//! 1. **Reads** come from the shared context for its keys, otherwise from the
//!    sandbox's private store, otherwise from the realm's intrinsics
//! 2. **Writes** are accepted only while the sandbox is active, and write
//!    through to the shared context for its keys
//! 3. **Batches** of one import run under a registry-wide lock, so bodies of
//!    different imports never interleave
//! 4. **Limits** bound syntactic nesting, loop iterations, call depth and the
//!    size of values stored on a sandbox ([`ScriptLimits`])

pub mod entry;
pub mod error;
pub mod prelude;
pub mod sandbox;
pub mod script;

// Re-export main types at crate root for convenience
pub use entry::cache::ResourceCache;
pub use entry::config::{ImportOptions, ImportOptionsBuilder, LoaderConfig, LoaderConfigBuilder};
pub use entry::document::{HostDocument, InjectedStyle, MemoryDocument};
pub use entry::import::{Entry, EntryLoader, ImportedEntry};
pub use entry::loader::{BatchResult, ResourceLoader};
pub use entry::parser::{EntryParser, EntryResources, ParsedEntry, ScriptRef};
pub use entry::resource::{Attributes, LoadedResource, ResourceDescriptor, ResourceKind};
pub use error::{
    EntryError, FailureReason, ParseFailure, ResourceError, Result, ScriptError, Stage,
};
pub use sandbox::context::SharedContext;
pub use sandbox::executor::{ExecutionReport, ScriptBody, ScriptExecutor};
pub use sandbox::instance::{ActiveGuard, Sandbox, SandboxProxy};
pub use sandbox::registry::SandboxRegistry;
pub use script::{
    BatchOutcome, ConsoleOutput, GlobalScope, ScriptEngine, ScriptLimits, ScriptOutcome, Value,
    WriteOutcome,
};
