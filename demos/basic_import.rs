//! Basic example of importing an entry and running its scripts.
//!
//! Run with: cargo run --example basic_import [ENTRY_URL]
//!
//! Without an argument a built-in markup entry is imported, so no network is
//! needed. Set `RUST_LOG=debug` to see loader and sandbox events.

use std::sync::Arc;

use anyhow::Context;
use entry_sandbox_rs::prelude::*;
use tracing_subscriber::EnvFilter;
use url::Url;

const DEMO_ENTRY: &str = r#"<!DOCTYPE html>
<html>
<head>
  <style>#app { font-family: sans-serif; }</style>
</head>
<body>
  <div id="app">Loading...</div>
  <script>
    var greeting = 'hello from the sandbox'
    window.mountedAt = 'demo'
    console.log(greeting, typeof window.mountedAt)
  </script>
</body>
</html>"#;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let document = Arc::new(MemoryDocument::new(Url::parse("https://host.example")?));
    let registry = Arc::new(SandboxRegistry::new());
    let loader = EntryLoader::new(LoaderConfig::default(), Arc::clone(&registry), document.clone())?;

    let entry = match std::env::args().nth(1) {
        Some(arg) => arg.parse::<Entry>().context("invalid entry argument")?,
        None => Entry::html(DEMO_ENTRY),
    };

    println!("=== Import ===");
    let imported = loader.import_entry(entry, ImportOptions::default()).await?;
    println!("asset base path: {}", imported.asset_base_path());
    println!("template:\n{}", imported.template().trim());
    println!("injected head:\n{}", document.head_html());

    println!("\n=== Execute ===");
    let report = imported.exec_scripts("demo", true).await?;
    println!("executed {} script(s) in {:?}", report.len(), report.duration);
    println!("console:\n{}", report.console.stdout_str());

    if let Some(sandbox) = registry.get("demo") {
        println!("greeting = {}", sandbox.get("greeting"));
    }

    Ok(())
}
