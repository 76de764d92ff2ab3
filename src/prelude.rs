//! Prelude module for convenient imports.

pub use crate::entry::{
    config::{ImportOptions, LoaderConfig},
    document::{HostDocument, MemoryDocument},
    import::{Entry, EntryLoader, ImportedEntry},
};
pub use crate::error::{EntryError, Result};
pub use crate::sandbox::{
    context::SharedContext, executor::ExecutionReport, registry::SandboxRegistry,
};
pub use crate::script::{ScriptLimits, Value};
