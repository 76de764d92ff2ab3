//! Example showing isolation between applications and a shared context.
//!
//! Two applications are imported into one host. Private globals stay in
//! each app's sandbox; keys of the shared context are visible to both.
//!
//! Run with: cargo run --example shared_context

use std::sync::Arc;

use entry_sandbox_rs::prelude::*;
use serde_json::json;
use tracing_subscriber::EnvFilter;
use url::Url;

const NAV_ENTRY: &str = r#"<nav>menu</nav>
<script>
  route = '/cart'
  navOnly = 'private to nav'
</script>"#;

const CART_ENTRY: &str = r#"<main>cart</main>
<script>
  seenRoute = route
  seenNavOnly = typeof navOnly
  console.info('cart sees route', route, 'and navOnly is', seenNavOnly)
</script>"#;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let context = SharedContext::from_json(json!({ "route": "/", "user": { "name": "ada" } }));
    let registry = Arc::new(SandboxRegistry::with_shared_context(context.clone()));
    let document = Arc::new(MemoryDocument::new(Url::parse("https://host.example")?));
    let loader = EntryLoader::new(LoaderConfig::default(), Arc::clone(&registry), document)?;

    for (app, markup) in [("nav", NAV_ENTRY), ("cart", CART_ENTRY)] {
        let imported = loader
            .import_entry(Entry::html(markup), ImportOptions::default())
            .await?;
        let report = imported.exec_scripts(app, true).await?;
        println!("[{app}] console: {}", report.console.stdout_str());
    }

    println!("\nshared route after both apps: {:?}", context.get("route"));
    for name in registry.names() {
        if let Some(sandbox) = registry.get(&name) {
            println!(
                "{name}: navOnly = {}, seenNavOnly = {}",
                sandbox.get("navOnly"),
                sandbox.get("seenNavOnly")
            );
        }
    }

    // Detach one app from the shared context without affecting the other.
    if let Some(cart) = registry.get("cart") {
        cart.update_context([("route", Value::from("/checkout"))]);
        println!(
            "\nafter detaching cart: cart route = {}, host route = {:?}",
            cart.get("route"),
            context.get("route")
        );
    }

    Ok(())
}
