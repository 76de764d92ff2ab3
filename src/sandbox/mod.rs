//! Per-application sandboxes and the executor that runs scripts in them.

pub mod context;
pub mod executor;
pub mod instance;
pub mod registry;
