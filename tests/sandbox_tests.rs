//! Isolation tests for sandboxes.
//!
//! Scripts from different applications must not see each other's globals,
//! except through keys of a context they explicitly share.

use std::sync::Arc;
use std::thread;

use entry_sandbox_rs::prelude::*;
use entry_sandbox_rs::{ScriptBody, ScriptError, ScriptExecutor, WriteOutcome};

fn run(registry: &SandboxRegistry, app: &str, source: &str) -> ExecutionReport {
    try_run(registry, app, source).unwrap()
}

fn try_run(registry: &SandboxRegistry, app: &str, source: &str) -> Result<ExecutionReport> {
    let sandbox = registry.create_default(app);
    ScriptExecutor::new().execute_all(registry, &sandbox, &[ScriptBody::new("test", source)], true)
}

fn script_error(result: Result<ExecutionReport>) -> ScriptError {
    match result {
        Err(EntryError::Execution { source, .. }) => source,
        other => panic!("expected a script error, got {other:?}"),
    }
}

#[test]
fn test_private_globals_are_isolated() {
    let registry = SandboxRegistry::new();
    run(&registry, "app1", "var user = 'ada'\nwindow.theme = 'dark'");
    run(
        &registry,
        "app2",
        "seenUser = typeof user\nseenTheme = 'theme' in window",
    );

    let app2 = registry.get("app2").unwrap();
    assert_eq!(app2.get("seenUser"), Value::from("undefined"));
    assert_eq!(app2.get("seenTheme"), Value::Bool(false));
    assert_eq!(registry.get("app1").unwrap().get("user"), Value::from("ada"));
}

#[test]
fn test_reading_other_apps_global_is_reference_error() {
    let registry = SandboxRegistry::new();
    run(&registry, "app1", "secret = 42");

    let sandbox = registry.create_default("app2");
    let err = ScriptExecutor::new()
        .execute_all(&registry, &sandbox, &[ScriptBody::new("peek", "x = secret")], true)
        .unwrap_err();
    assert!(err.is_script_error());
    assert!(matches!(
        err,
        EntryError::Execution { source: ScriptError::Reference(ref message), .. }
            if message.contains("secret")
    ));
}

#[test]
fn test_shared_context_leaks_only_shared_keys() {
    let context = SharedContext::from_json(serde_json::json!({ "route": "/" }));
    let registry = SandboxRegistry::with_shared_context(context.clone());

    run(&registry, "nav", "route = '/cart'\nlocal = 1");
    run(&registry, "cart", "current = route\nsawLocal = typeof local");

    let cart = registry.get("cart").unwrap();
    assert_eq!(cart.get("current"), Value::from("/cart"));
    assert_eq!(cart.get("sawLocal"), Value::from("undefined"));
    assert_eq!(context.get("route"), Some(Value::from("/cart")));
}

#[test]
fn test_host_updates_to_shared_context_are_live() {
    let context = SharedContext::new();
    context.insert("locale", "en");
    let registry = SandboxRegistry::with_shared_context(context.clone());
    let sandbox = registry.create_default("app");

    context.insert("locale", "fr");
    assert_eq!(sandbox.get("locale"), Value::from("fr"));
}

#[test]
fn test_inactive_sandbox_drops_writes() {
    let registry = SandboxRegistry::new();
    let sandbox = registry.create_default("app");

    assert_eq!(sandbox.set("x", Value::from(1)), WriteOutcome::Dropped);
    let outcome = ScriptExecutor::new()
        .execute("y = 2", &sandbox, true)
        .unwrap();
    assert_eq!(outcome.writes_dropped, 1);
    assert!(!sandbox.has("x"));
    assert!(!sandbox.has("y"));
}

#[test]
fn test_same_name_same_sandbox_across_threads() {
    let registry = Arc::new(SandboxRegistry::new());

    let sandboxes: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| registry.create_default("shared-name")))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(registry.len(), 1);
    assert!(sandboxes.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
}

#[test]
fn test_clear_resets_private_state_only() {
    let context = SharedContext::new();
    context.insert("session", "abc");
    let registry = SandboxRegistry::with_shared_context(context);
    run(&registry, "app", "session = 'xyz'\ncache = [1, 2]");

    let sandbox = registry.get("app").unwrap();
    sandbox.clear();

    assert!(!sandbox.is_running());
    assert!(!sandbox.has("cache"));
    assert_eq!(sandbox.get("session"), Value::from("xyz"));
}

#[test]
fn test_batches_restore_activation() {
    let registry = SandboxRegistry::new();
    let report = run(&registry, "app", "console.info('ran')");

    assert_eq!(report.console.stdout_str(), "ran");
    assert!(!registry.get("app").unwrap().is_running());
}

#[test]
fn test_huge_sparse_index_does_not_allocate() {
    let registry = SandboxRegistry::new();
    run(&registry, "app", "a = []\na[1000000000000000] = 1");

    assert_eq!(registry.get("app").unwrap().get("a"), Value::Array(Vec::new()));
}

#[test]
fn test_oversized_array_is_rejected() {
    let registry = SandboxRegistry::new();
    let error = script_error(try_run(&registry, "app", "a = []\na[4294967294] = 1"));

    assert!(
        matches!(error, ScriptError::Type(ref message) if message.contains("too large")),
        "{error:?}"
    );
}

#[test]
fn test_deeply_nested_values_are_rejected() {
    let registry = SandboxRegistry::new();
    let source = "x = []\nfor (let i = 0; i < 100; i++) x = [x]";
    let error = script_error(try_run(&registry, "app", source));

    assert!(matches!(error, ScriptError::Type(_)), "{error:?}");
}

#[test]
fn test_deeply_nested_expression_is_rejected() {
    let registry = SandboxRegistry::new();
    let source = format!("x = {}1", "!".repeat(200_000));
    let error = script_error(try_run(&registry, "app", &source));

    assert!(error.is_limit(), "{error:?}");
    assert!(error.to_string().contains("nesting too deep"));

    let source = format!("x = {}1{}", "[".repeat(100_000), "]".repeat(100_000));
    assert!(script_error(try_run(&registry, "app", &source)).is_limit());
}

#[test]
fn test_runaway_recursion_is_stopped() {
    let registry = SandboxRegistry::new();
    let error = script_error(try_run(&registry, "app", "function f() { return f() }\nf()"));

    assert!(
        matches!(error, ScriptError::Limit(_) | ScriptError::Range(_)),
        "{error:?}"
    );
}

#[test]
fn test_long_flat_body_runs() {
    let registry = SandboxRegistry::new();
    let source = format!("n = 0\n{}", "n += 1\n".repeat(20_000));
    run(&registry, "app", &source);

    assert_eq!(registry.get("app").unwrap().get("n"), Value::from(20_000));
}

#[test]
fn test_hostile_body_leaves_other_apps_intact() {
    let registry = SandboxRegistry::new();
    run(&registry, "a", "state = 'a'");
    run(&registry, "b", "state = 'b'");

    let hostile = format!("state = 'clobbered'\nx = {}1", "-".repeat(200_000));
    assert!(try_run(&registry, "a", &hostile).is_err());
    assert!(try_run(&registry, "a", "a = []\na[4294967294] = 1").is_err());

    let b = registry.get("b").unwrap();
    assert_eq!(b.get("state"), Value::from("b"));
    assert!(!b.is_running());
    assert_eq!(registry.get("a").unwrap().get("state"), Value::from("a"));

    run(&registry, "b", "state += '!'");
    assert_eq!(b.get("state"), Value::from("b!"));
}
