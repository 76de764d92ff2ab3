//! Entry documents: fetching, parsing, and importing them into a host page.

pub mod base;
pub mod cache;
pub mod config;
pub mod document;
pub mod import;
pub mod loader;
pub mod parser;
pub mod resource;
