//! Resource loading against a local HTTP stub.
//!
//! Covers the timeout bound, failure classification, and concurrent batches.

mod common;

use std::time::{Duration, Instant};

use common::{closed_port_url, init_tracing, Route, StubServer};
use entry_sandbox_rs::prelude::*;
use entry_sandbox_rs::{FailureReason, ResourceDescriptor, ResourceLoader};

fn loader_with_timeout(timeout: Duration) -> ResourceLoader {
    let config = LoaderConfig::builder()
        .timeout(timeout)
        .proxy_from_env(false)
        .build();
    ResourceLoader::new(&config).unwrap()
}

#[tokio::test]
async fn test_timeout_resolves_within_bound() {
    init_tracing();
    let server = StubServer::start(&[("/slow.js", Route::hang())]).await;
    let loader = loader_with_timeout(Duration::from_millis(50));

    let started = Instant::now();
    let err = loader
        .load(&ResourceDescriptor::script(server.url("/slow.js")))
        .await
        .unwrap_err();

    assert!(err.is_timeout(), "expected timeout, got {err}");
    assert_eq!(err.reason, FailureReason::Timeout(Duration::from_millis(50)));
    assert!(
        started.elapsed() < Duration::from_millis(500),
        "timeout took {:?}",
        started.elapsed()
    );
}

#[tokio::test]
async fn test_failures_are_classified() {
    let server = StubServer::start(&[("/error.css", Route::status(500))]).await;
    let loader = loader_with_timeout(Duration::from_secs(5));

    let missing = loader
        .load(&ResourceDescriptor::script(server.url("/missing.js")))
        .await
        .unwrap_err();
    assert_eq!(missing.http_status(), Some(404));
    assert!(!missing.is_timeout());

    let broken = loader
        .load(&ResourceDescriptor::style(server.url("/error.css")))
        .await
        .unwrap_err();
    assert_eq!(broken.http_status(), Some(500));

    let refused = loader
        .load(&ResourceDescriptor::script(closed_port_url("/a.js").await))
        .await
        .unwrap_err();
    assert!(refused.is_network(), "expected network error, got {refused}");
    assert!(!refused.is_timeout());
}

#[tokio::test]
async fn test_per_call_timeout_overrides_default() {
    let server = StubServer::start(&[(
        "/late.js",
        Route::ok("late = true").delayed(Duration::from_millis(300)),
    )])
    .await;
    let loader = loader_with_timeout(Duration::from_secs(5));
    let descriptor = ResourceDescriptor::script(server.url("/late.js"));

    let err = loader
        .load_with_timeout(&descriptor, Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(err.is_timeout());

    let loaded = loader.load(&descriptor).await.unwrap();
    assert_eq!(loaded.content, "late = true");
}

#[tokio::test]
async fn test_batch_runs_concurrently() {
    let delay = Duration::from_millis(200);
    let server = StubServer::start(&[
        ("/a.js", Route::ok("a").delayed(delay)),
        ("/b.js", Route::ok("b").delayed(delay)),
        ("/c.js", Route::ok("c").delayed(delay)),
    ])
    .await;
    let loader = loader_with_timeout(Duration::from_secs(5));
    let descriptors: Vec<_> = ["/a.js", "/b.js", "/c.js"]
        .iter()
        .map(|path| ResourceDescriptor::script(server.url(path)))
        .collect();

    let started = Instant::now();
    let loaded = loader.load_batch(&descriptors).await.into_result().unwrap();

    assert!(started.elapsed() < delay * 3, "batch was sequential");
    let bodies: Vec<_> = loaded.iter().map(|r| r.content.as_str()).collect();
    assert_eq!(bodies, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_sibling_failure_does_not_cancel_batch() {
    let server = StubServer::start(&[
        ("/ok.js", Route::ok("fine").delayed(Duration::from_millis(50))),
        ("/gone.js", Route::status(410)),
    ])
    .await;
    let loader = loader_with_timeout(Duration::from_secs(5));
    let descriptors = vec![
        ResourceDescriptor::script(server.url("/gone.js")),
        ResourceDescriptor::script(server.url("/ok.js")),
    ];

    let batch = loader.load_batch(&descriptors).await;
    assert!(!batch.is_complete());

    let (loaded, failed) = batch.partial();
    assert_eq!(loaded[0].content, "fine");
    assert_eq!(failed[0].http_status(), Some(410));
}

#[tokio::test]
async fn test_content_type_and_cache() {
    let server = StubServer::start(&[
        ("/main.js", Route::ok("main = 1")),
        ("/main.css", Route::ok("body{}")),
    ])
    .await;
    let loader = loader_with_timeout(Duration::from_secs(5));
    let script = ResourceDescriptor::script(server.url("/main.js"));

    loader.load(&script).await.unwrap();
    loader.load(&script).await.unwrap();
    loader
        .load(&ResourceDescriptor::style(server.url("/main.css")))
        .await
        .unwrap();

    assert_eq!(server.hits("/main.js"), 1, "second load should hit the cache");
    let requests = server.requests();
    let content_type = |path: &str| {
        requests
            .iter()
            .find(|r| r.path == path)
            .and_then(|r| r.headers.get("content-type").cloned())
    };
    assert_eq!(content_type("/main.js").as_deref(), Some("text/javascript"));
    assert_eq!(content_type("/main.css").as_deref(), Some("text/css"));
}

#[tokio::test]
async fn test_failures_are_not_cached() {
    let server = StubServer::start(&[]).await;
    let loader = loader_with_timeout(Duration::from_secs(5));
    let script = ResourceDescriptor::script(server.url("/flaky.js"));

    assert!(loader.load(&script).await.is_err());
    assert!(loader.load(&script).await.is_err());
    assert_eq!(server.hits("/flaky.js"), 2);
    assert!(loader.cache().unwrap().is_empty());
}
