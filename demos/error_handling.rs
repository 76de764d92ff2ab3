//! Example demonstrating error handling patterns.
//!
//! This example shows how to handle the error stages of an import:
//! - Invalid entries
//! - Fetch failures (network errors and timeouts)
//! - Script errors during execution
//! - Hostile scripts stopped by limits
//!
//! Run with: cargo run --example error_handling

use std::sync::Arc;
use std::time::Duration;

use entry_sandbox_rs::prelude::*;
use entry_sandbox_rs::{ScriptError, Stage};
use tracing_subscriber::EnvFilter;
use url::Url;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = LoaderConfig::builder()
        .timeout(Duration::from_millis(300))
        .build();
    let document = Arc::new(MemoryDocument::new(Url::parse("https://host.example")?));
    let loader = EntryLoader::new(config, Arc::new(SandboxRegistry::new()), document)?;

    println!("--- Test 1: Invalid entry ---");
    match "https://".parse::<Entry>() {
        Ok(entry) => println!("unexpectedly parsed: {entry:?}"),
        Err(e) => println!("rejected: {e}"),
    }

    println!("\n--- Test 2: Unreachable entry ---");
    // A non-routable address: the fetch either fails fast or hits the timeout.
    let entry = Entry::Url(Url::parse("http://10.255.255.1/index.html")?);
    match loader.import_entry(entry, ImportOptions::default()).await {
        Ok(_) => println!("unexpected success"),
        Err(e) if e.is_timeout() => println!("timed out in {} stage: {e}", e.stage()),
        Err(e) => println!("failed in {} stage: {e}", e.stage()),
    }

    println!("\n--- Test 3: Script error ---");
    let imported = loader
        .import_entry(
            Entry::html("<script>ready = true</script><script>total = price * 2</script><script>after = 1</script>"),
            ImportOptions::default(),
        )
        .await?;

    match imported.exec_scripts("shop", true).await {
        Ok(report) => println!("ran {} scripts", report.len()),
        Err(EntryError::Execution { app, script, source }) => {
            println!("app `{app}` failed in {script}");
            match source {
                ScriptError::Reference(message) => println!("  unbound global: {message}"),
                error if error.is_limit() => println!("  stopped by a script limit: {error}"),
                other => println!("  {other}"),
            }
        }
        Err(e) => return Err(e.into()),
    }

    println!("\n--- Test 4: Script limit ---");
    let imported = loader
        .import_entry(
            Entry::html("<script>while (true) {}</script>"),
            ImportOptions::default(),
        )
        .await?;
    match imported.exec_scripts("spinner", true).await {
        Ok(_) => println!("unexpected success"),
        Err(e) => println!("{} stage: {e}", e.stage()),
    }

    println!("\n--- Test 5: Stage inspection ---");
    let imported = loader
        .import_entry(
            Entry::html(r#"<script src="http://127.0.0.1:9/missing.js"></script>"#),
            ImportOptions::default(),
        )
        .await?;
    if let Err(e) = imported.exec_scripts("app", true).await {
        assert_eq!(e.stage(), Stage::Fetch);
        for failure in e.resource_failures() {
            println!("{} failed: {}", failure.url, failure.reason);
        }
    }

    Ok(())
}
