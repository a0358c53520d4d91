use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::support::helpers::init_tracing;
use crate::support::mock_feed::{atom_document, rss_document, FeedRoute, MockFeedServer};
use anyhow::{Context, Result};
use hyper::StatusCode;
use sputnik::runtime::runner::{run_session, ExitStatus};
use sputnik::store::BatchStore;
use sputnik::{
    user_key, Batch, FeedDescriptor, FetchError, FetchFeed, HttpFeedFetcher, JsonFileStore,
    ReconcilerConfig, ReconciliationOutcome, Reconciler, RunOutcome,
};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const BUILD_1: &str = "Mon, 06 Sep 2021 16:45:00 +0000";
const BUILD_2: &str = "Tue, 07 Sep 2021 09:00:00 +0000";

fn fetcher() -> Result<HttpFeedFetcher> {
    HttpFeedFetcher::new(Duration::from_secs(5), 1024 * 1024, "sputnik-tests")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn http_fetcher_parses_served_feed() -> Result<()> {
    init_tracing();
    let server = MockFeedServer::start(HashMap::from([(
        "/news.xml".to_string(),
        FeedRoute::rss(rss_document(
            BUILD_1,
            &[
                ("guid1", "First", "http://example.com/1"),
                ("guid2", "Second", "http://example.com/2"),
            ],
        )),
    )]))
    .await?;

    let snapshot = fetcher()?
        .fetch(&server.url("/news.xml"), &CancellationToken::new())
        .await
        .context("fetch should succeed")?;

    assert_eq!(snapshot.freshness_token, BUILD_1);
    let ids: Vec<_> = snapshot.entries.iter().map(|e| e.identifier.as_str()).collect();
    assert_eq!(ids, ["guid1", "guid2"]);
    assert_eq!(snapshot.entries[0].title, "First");
    assert_eq!(snapshot.entries[1].locator, "http://example.com/2");

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn http_status_errors_are_hard_failures() -> Result<()> {
    init_tracing();
    let server = MockFeedServer::start(HashMap::from([(
        "/broken.xml".to_string(),
        FeedRoute::status(StatusCode::INTERNAL_SERVER_ERROR),
    )]))
    .await?;

    let err = fetcher()?
        .fetch(&server.url("/broken.xml"), &CancellationToken::new())
        .await
        .expect_err("500 must fail");
    assert!(matches!(err, FetchError::Status { status: 500 }));
    assert!(!err.is_cancellation());

    let err = fetcher()?
        .fetch(&server.url("/missing.xml"), &CancellationToken::new())
        .await
        .expect_err("404 must fail");
    assert!(matches!(err, FetchError::Status { status: 404 }));

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn oversized_bodies_are_rejected() -> Result<()> {
    init_tracing();
    let items: Vec<(String, String, String)> = (0..200)
        .map(|i| (format!("guid{i}"), "x".repeat(64), format!("http://example.com/{i}")))
        .collect();
    let borrowed: Vec<(&str, &str, &str)> = items
        .iter()
        .map(|(g, t, l)| (g.as_str(), t.as_str(), l.as_str()))
        .collect();
    let server = MockFeedServer::start(HashMap::from([(
        "/big.xml".to_string(),
        FeedRoute::rss(rss_document(BUILD_1, &borrowed)),
    )]))
    .await?;

    let small = HttpFeedFetcher::new(Duration::from_secs(5), 1024, "sputnik-tests")?;
    let err = small
        .fetch(&server.url("/big.xml"), &CancellationToken::new())
        .await
        .expect_err("body exceeds limit");
    assert!(matches!(err, FetchError::TooLarge { limit: 1024 }));

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancellation_interrupts_a_slow_download() -> Result<()> {
    init_tracing();
    let server = MockFeedServer::start(HashMap::from([(
        "/slow.xml".to_string(),
        FeedRoute::rss(rss_document(BUILD_1, &[])).delayed(Duration::from_secs(3)),
    )]))
    .await?;

    let cancel = CancellationToken::new();
    let trigger = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        })
    };

    let fetcher = fetcher()?;
    let url = server.url("/slow.xml");
    let result = timeout(Duration::from_secs(2), fetcher.fetch(&url, &cancel))
        .await
        .context("fetch ignored cancellation")?;
    trigger.await?;

    assert!(matches!(result, Err(FetchError::Cancelled)));
    // The delayed handler may still be pending; skip the graceful drain.
    drop(server);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reconciler_over_http_classifies_each_feed() -> Result<()> {
    init_tracing();
    let server = MockFeedServer::start(HashMap::from([
        (
            "/same.xml".to_string(),
            FeedRoute::rss(rss_document(BUILD_1, &[("old", "Old", "http://example.com/old")])),
        ),
        (
            "/fresh.xml".to_string(),
            FeedRoute::rss(rss_document(
                BUILD_2,
                &[
                    ("old", "Old", "http://example.com/old"),
                    ("new", "New", "http://example.com/new"),
                ],
            )),
        ),
    ]))
    .await?;

    let batch = Batch::new(
        "1",
        vec![
            FeedDescriptor::new(server.url("/same.xml"))
                .with_cursor(BUILD_1)
                .with_known("old"),
            FeedDescriptor::new(server.url("/fresh.xml"))
                .with_cursor(BUILD_1)
                .with_known("old"),
        ],
    );

    let report = Reconciler::with_capacity(2)
        .run(batch, Arc::new(fetcher()?), CancellationToken::new())
        .await;

    assert!(matches!(report.outcome, RunOutcome::Success));
    assert!(matches!(report.feeds[0].outcome, ReconciliationOutcome::Unchanged));
    assert!(matches!(report.feeds[1].outcome, ReconciliationOutcome::Updated(1)));
    assert_eq!(report.batch.items[1].cursor(), BUILD_2);
    assert_eq!(report.batch.items[1].unprocessed()[0].identifier, "new");

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn session_round_trips_through_the_json_store() -> Result<()> {
    init_tracing();
    let server = MockFeedServer::start(HashMap::from([(
        "/feed.xml".to_string(),
        FeedRoute::rss(rss_document(
            BUILD_2,
            &[
                ("guid1", "One", "http://example.com/1"),
                ("guid2", "Two", "http://example.com/2"),
                ("guid3", "Three", "http://example.com/3"),
            ],
        )),
    )]))
    .await?;

    let dir = tempfile::tempdir()?;
    let store = JsonFileStore::new(dir.path());
    let path = store.path_for(&user_key("alice"))?;
    store.save(
        &Batch::new(
            "1",
            vec![FeedDescriptor::new(server.url("/feed.xml"))
                .with_kind("rss")
                .with_hash("feed-hash")
                .with_cursor(BUILD_1)
                .with_known("guid1")],
        ),
        &path,
    )?;

    let config = ReconcilerConfig::builder().data_dir(dir.path()).build()?;
    let status = run_session(
        "alice",
        &store,
        Arc::new(HttpFeedFetcher::from_config(&config)?),
        &config,
        CancellationToken::new(),
    )
    .await;
    assert_eq!(status, ExitStatus::Success);

    let saved = store.load(&path)?;
    let feed = &saved.items[0];
    assert_eq!(feed.kind(), "rss");
    assert_eq!(feed.hash(), "feed-hash");
    assert_eq!(feed.cursor(), BUILD_2);
    let queued: Vec<_> = feed.unprocessed().iter().map(|e| e.identifier.as_str()).collect();
    assert_eq!(queued, ["guid2", "guid3"]);

    let raw: serde_json::Value = serde_json::from_slice(&std::fs::read(&path)?)?;
    assert_eq!(raw["items"][0]["updated"], BUILD_2);
    assert!(raw["items"][0]["unprocessed_set"]["guid3"].is_object());
    assert_eq!(raw["items"][0]["unprocessed_items"][0]["url"], "http://example.com/2");

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn atom_subscriptions_reconcile_alongside_rss() -> Result<()> {
    init_tracing();
    const ATOM_1: &str = "2024-01-01T00:00:00+00:00";
    const ATOM_2: &str = "2024-01-02T00:00:00+00:00";
    let server = MockFeedServer::start(HashMap::from([
        (
            "/atom.xml".to_string(),
            FeedRoute::rss(atom_document(
                ATOM_2,
                &[
                    ("urn:e1", "One", "http://example.com/e1"),
                    ("urn:e2", "Two", "http://example.com/e2"),
                ],
            )),
        ),
        (
            "/rss.xml".to_string(),
            FeedRoute::rss(rss_document(BUILD_2, &[("guid1", "One", "http://example.com/1")])),
        ),
    ]))
    .await?;

    let batch = Batch::new(
        "1",
        vec![
            FeedDescriptor::new(server.url("/atom.xml"))
                .with_cursor(ATOM_1)
                .with_known("urn:e1"),
            FeedDescriptor::new(server.url("/rss.xml")).with_cursor(BUILD_1),
        ],
    );

    let report = Reconciler::with_capacity(2)
        .run(batch, Arc::new(fetcher()?), CancellationToken::new())
        .await;

    assert!(matches!(report.outcome, RunOutcome::Success), "{:?}", report.outcome);
    let atom = &report.batch.items[0];
    assert_eq!(atom.cursor(), ATOM_2);
    assert_eq!(atom.unprocessed().len(), 1);
    assert_eq!(atom.unprocessed()[0].identifier, "urn:e2");
    assert_eq!(atom.unprocessed()[0].locator, "http://example.com/e2");
    assert!(matches!(report.feeds[1].outcome, ReconciliationOutcome::Updated(1)));

    server.shutdown().await;
    Ok(())
}
