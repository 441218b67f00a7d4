//! End-to-end cycle tests against a mock content source
//!
//! These tests run full ingestion cycles: a wiremock server plays the
//! photo-blog, a recording publisher plays the channel, and the store is
//! in-memory SQLite.

use async_trait::async_trait;
use ferrotype::config::{
    Config, HealthConfig, MediaConfig, PublisherConfig, SelectorConfig, ServerConfig, SourceConfig,
    StorageConfig,
};
use ferrotype::health::HealthTracker;
use ferrotype::metrics::Metrics;
use ferrotype::pipeline::Orchestrator;
use ferrotype::publish::{PublishError, Publisher};
use ferrotype::storage::{ItemRecord, PublishStatus, SqliteStore, Store};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Publisher that records which items it was handed
struct RecordingPublisher {
    calls: std::sync::Mutex<Vec<String>>,
    reject: Option<String>,
}

impl RecordingPublisher {
    fn new() -> Self {
        Self {
            calls: std::sync::Mutex::new(Vec::new()),
            reject: None,
        }
    }

    fn rejecting(source_id: &str) -> Self {
        Self {
            calls: std::sync::Mutex::new(Vec::new()),
            reject: Some(source_id.to_string()),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, item: &ItemRecord) -> Result<(), PublishError> {
        self.calls.lock().unwrap().push(item.source_id.clone());
        if self.reject.as_deref() == Some(item.source_id.as_str()) {
            return Err(PublishError::Rejected {
                status: 400,
                body: "rejected by test".to_string(),
            });
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

fn listing_body(ids: &[u32]) -> String {
    // Newest first, like a real listing page
    let mut nodes = String::new();
    for id in ids {
        nodes.push_str(&format!(
            r#"<div class="node">
                <h2 class="nodetitle"><a href="/photos/{id:05}-item.html">Item {id}</a></h2>
                <div class="content"><img src="/files/{id:05}.jpg" /><p>Caption {id}</p></div>
            </div>"#
        ));
    }
    format!("<html><body>{}</body></html>", nodes)
}

fn jpeg_response() -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "image/jpeg")
        .set_body_bytes(vec![0xAAu8; 32])
}

async fn mount_listing(server: &MockServer, ids: &[u32]) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_body(ids)))
        .mount(server)
        .await;
    for id in ids {
        Mock::given(method("GET"))
            .and(path(format!("/files/{:05}.jpg", id)))
            .respond_with(jpeg_response())
            .mount(server)
            .await;
    }
}

fn test_config(base_url: &str, work_dir: &Path) -> Config {
    Config {
        source: SourceConfig {
            base_url: base_url.to_string(),
            user_agent: "Ferrotype/test".to_string(),
            request_timeout_secs: 5,
            selectors: SelectorConfig::default(),
        },
        media: MediaConfig {
            max_concurrent_downloads: 3,
            max_attempts: 2,
            base_delay_ms: 10,
            max_delay_ms: 50,
            staging_dir: work_dir.join("staging").to_string_lossy().into_owned(),
            artifact_dir: work_dir.join("artifacts").to_string_lossy().into_owned(),
        },
        storage: StorageConfig {
            database_path: ":memory:".to_string(),
        },
        publisher: PublisherConfig::default(),
        server: ServerConfig::default(),
        health: HealthConfig::default(),
    }
}

struct Harness {
    store: Arc<Mutex<SqliteStore>>,
    publisher: Arc<RecordingPublisher>,
    metrics: Arc<Metrics>,
    health: Arc<HealthTracker>,
    orchestrator: Orchestrator,
    _work_dir: tempfile::TempDir,
}

fn harness_with_publisher(base_url: &str, publisher: RecordingPublisher) -> Harness {
    let work_dir = tempfile::tempdir().unwrap();
    let config = test_config(base_url, work_dir.path());
    let store = Arc::new(Mutex::new(SqliteStore::new_in_memory().unwrap()));
    let publisher = Arc::new(publisher);
    let metrics = Arc::new(Metrics::new());
    let health = Arc::new(HealthTracker::new());
    let (_tx, rx) = watch::channel(false);

    let orchestrator = Orchestrator::new(
        config,
        Arc::clone(&store),
        Arc::clone(&publisher) as Arc<dyn Publisher>,
        Arc::clone(&metrics),
        Arc::clone(&health),
        rx,
        None,
    )
    .unwrap();

    Harness {
        store,
        publisher,
        metrics,
        health,
        orchestrator,
        _work_dir: work_dir,
    }
}

fn harness(base_url: &str) -> Harness {
    harness_with_publisher(base_url, RecordingPublisher::new())
}

#[tokio::test]
async fn fresh_store_ingests_and_publishes_everything() {
    let server = MockServer::start().await;
    mount_listing(&server, &[3, 2, 1]).await;

    let h = harness(&server.uri());
    let outcome = h.orchestrator.try_run_cycle().await.unwrap().unwrap();

    assert_eq!(outcome.discovered, 3);
    assert_eq!(outcome.published, 3);
    assert_eq!(outcome.failed, 0);
    assert_eq!(outcome.checkpoint, "/photos/00003-item.html");

    // Published oldest first
    assert_eq!(
        h.publisher.calls(),
        vec![
            "/photos/00001-item.html",
            "/photos/00002-item.html",
            "/photos/00003-item.html"
        ]
    );

    let store = h.store.lock().await;
    assert_eq!(store.count_items().unwrap(), 3);
    assert_eq!(store.count_by_status(PublishStatus::Published).unwrap(), 3);

    let item = store.get_item("/photos/00002-item.html").unwrap().unwrap();
    assert!(item.published_at.is_some());
    let artifacts = item.artifact_paths.unwrap();
    assert_eq!(artifacts.len(), 1);
    assert!(Path::new(&artifacts[0]).exists());
}

#[tokio::test]
async fn second_cycle_is_idempotent() {
    let server = MockServer::start().await;
    mount_listing(&server, &[2, 1]).await;

    let h = harness(&server.uri());
    h.orchestrator.try_run_cycle().await.unwrap().unwrap();
    let second = h.orchestrator.try_run_cycle().await.unwrap().unwrap();

    // The checkpoint filtered everything out before any store access
    assert_eq!(second.discovered, 0);
    assert_eq!(second.published, 0);
    assert_eq!(second.deduped, 0);
    assert_eq!(second.checkpoint, "/photos/00002-item.html");
    assert_eq!(h.publisher.calls().len(), 2);
    assert_eq!(h.store.lock().await.count_items().unwrap(), 2);
}

#[tokio::test]
async fn reset_checkpoint_dedupes_against_the_store() {
    let server = MockServer::start().await;
    mount_listing(&server, &[2, 1]).await;

    let h = harness(&server.uri());
    h.orchestrator.try_run_cycle().await.unwrap().unwrap();
    h.store.lock().await.reset_checkpoint().unwrap();

    let outcome = h.orchestrator.try_run_cycle().await.unwrap().unwrap();

    // Candidates pass the unset checkpoint but collide with stored rows
    assert_eq!(outcome.discovered, 2);
    assert_eq!(outcome.deduped, 2);
    assert_eq!(outcome.published, 0);
    assert_eq!(h.publisher.calls().len(), 2);
}

#[tokio::test]
async fn media_failure_isolates_one_item() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_body(&[3, 2, 1])))
        .mount(&server)
        .await;
    for id in [1u32, 3] {
        Mock::given(method("GET"))
            .and(path(format!("/files/{:05}.jpg", id)))
            .respond_with(jpeg_response())
            .mount(&server)
            .await;
    }
    // Item 2's image is permanently gone
    Mock::given(method("GET"))
        .and(path("/files/00002.jpg"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let h = harness(&server.uri());
    let outcome = h.orchestrator.try_run_cycle().await.unwrap().unwrap();

    assert_eq!(outcome.published, 2);
    assert_eq!(outcome.failed, 1);
    // The failed item is resolved, so the checkpoint still reaches the top
    assert_eq!(outcome.checkpoint, "/photos/00003-item.html");

    let store = h.store.lock().await;
    let failed = store.get_item("/photos/00002-item.html").unwrap().unwrap();
    assert_eq!(failed.publish_status, PublishStatus::Failed);
    assert!(failed.failure_reason.is_some());
    assert!(failed.artifact_paths.is_none());
}

#[tokio::test]
async fn publish_rejection_marks_item_failed() {
    let server = MockServer::start().await;
    mount_listing(&server, &[2, 1]).await;

    let h = harness_with_publisher(
        &server.uri(),
        RecordingPublisher::rejecting("/photos/00001-item.html"),
    );
    let outcome = h.orchestrator.try_run_cycle().await.unwrap().unwrap();

    assert_eq!(outcome.published, 1);
    assert_eq!(outcome.failed, 1);

    let store = h.store.lock().await;
    let rejected = store.get_item("/photos/00001-item.html").unwrap().unwrap();
    assert_eq!(rejected.publish_status, PublishStatus::Failed);
    // Media landed before the publisher refused it
    assert!(rejected.artifact_paths.is_some());
}

#[tokio::test]
async fn unavailable_source_aborts_without_moving_the_checkpoint() {
    let server = MockServer::start().await;
    mount_listing(&server, &[1]).await;

    let h = harness(&server.uri());
    h.orchestrator.try_run_cycle().await.unwrap().unwrap();

    // The source goes down
    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = h.orchestrator.try_run_cycle().await.unwrap_err();
    assert!(err.is_cycle_fatal());

    let checkpoint = h.store.lock().await.load_checkpoint().unwrap();
    assert_eq!(checkpoint.last_item_id, "/photos/00001-item.html");

    let snap = h.metrics.snapshot();
    assert_eq!(snap.counters["cycles.fatal"], 1);
    assert_eq!(
        h.health.evaluate(true, &HealthConfig::default()),
        ferrotype::HealthStatus::Degraded
    );
}

#[tokio::test]
async fn purge_makes_the_next_cycle_fresh() {
    let server = MockServer::start().await;
    mount_listing(&server, &[2, 1]).await;

    let h = harness(&server.uri());
    h.orchestrator.try_run_cycle().await.unwrap().unwrap();
    h.store.lock().await.purge().unwrap();

    let outcome = h.orchestrator.try_run_cycle().await.unwrap().unwrap();
    assert_eq!(outcome.discovered, 2);
    assert_eq!(outcome.published, 2);
    assert_eq!(h.store.lock().await.count_items().unwrap(), 2);
}

#[tokio::test]
async fn reprocess_retries_failed_items() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_body(&[1])))
        .mount(&server)
        .await;
    // First the image is gone, then it comes back
    Mock::given(method("GET"))
        .and(path("/files/00001.jpg"))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/00001.jpg"))
        .respond_with(jpeg_response())
        .mount(&server)
        .await;

    let h = harness(&server.uri());
    let first = h.orchestrator.try_run_cycle().await.unwrap().unwrap();
    assert_eq!(first.failed, 1);

    let reprocessed = h.orchestrator.reprocess(100).await.unwrap();
    assert_eq!(reprocessed.published, 1);
    assert_eq!(reprocessed.failed, 0);

    let store = h.store.lock().await;
    let item = store.get_item("/photos/00001-item.html").unwrap().unwrap();
    assert_eq!(item.publish_status, PublishStatus::Published);
}

/// Publisher that requests shutdown as soon as it accepts its first item
struct ShutdownAfterFirstPublisher {
    tx: watch::Sender<bool>,
    calls: std::sync::Mutex<Vec<String>>,
}

#[async_trait]
impl Publisher for ShutdownAfterFirstPublisher {
    async fn publish(&self, item: &ItemRecord) -> Result<(), PublishError> {
        self.calls.lock().unwrap().push(item.source_id.clone());
        let _ = self.tx.send(true);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "shutdown-after-first"
    }
}

#[tokio::test]
async fn shutdown_mid_cycle_stops_at_the_last_resolved_item() {
    let server = MockServer::start().await;
    mount_listing(&server, &[3, 2, 1]).await;

    let work_dir = tempfile::tempdir().unwrap();
    let config = test_config(&server.uri(), work_dir.path());
    let store = Arc::new(Mutex::new(SqliteStore::new_in_memory().unwrap()));
    let (tx, rx) = watch::channel(false);
    let publisher = Arc::new(ShutdownAfterFirstPublisher {
        tx,
        calls: std::sync::Mutex::new(Vec::new()),
    });

    let orchestrator = Orchestrator::new(
        config,
        Arc::clone(&store),
        Arc::clone(&publisher) as Arc<dyn Publisher>,
        Arc::new(Metrics::new()),
        Arc::new(HealthTracker::new()),
        rx,
        None,
    )
    .unwrap();

    let outcome = orchestrator.try_run_cycle().await.unwrap().unwrap();

    // The first (oldest) item resolved before the flag was seen; the
    // cycle then ended without touching the rest
    assert_eq!(outcome.published, 1);
    assert_eq!(outcome.failed, 0);
    assert_eq!(outcome.checkpoint, "/photos/00001-item.html");
    assert_eq!(publisher.calls.lock().unwrap().len(), 1);

    let store = store.lock().await;
    assert_eq!(store.count_items().unwrap(), 1);
    assert!(store.get_item("/photos/00002-item.html").unwrap().is_none());
    assert!(store.get_item("/photos/00003-item.html").unwrap().is_none());
}

#[tokio::test]
async fn limited_cycle_caps_candidates_oldest_first() {
    let server = MockServer::start().await;
    mount_listing(&server, &[5, 4, 3, 2, 1]).await;

    let work_dir = tempfile::tempdir().unwrap();
    let config = test_config(&server.uri(), work_dir.path());
    let store = Arc::new(Mutex::new(SqliteStore::new_in_memory().unwrap()));
    let publisher = Arc::new(RecordingPublisher::new());
    let (_tx, rx) = watch::channel(false);

    let orchestrator = Orchestrator::new(
        config,
        Arc::clone(&store),
        Arc::clone(&publisher) as Arc<dyn Publisher>,
        Arc::new(Metrics::new()),
        Arc::new(HealthTracker::new()),
        rx,
        Some(2),
    )
    .unwrap();

    let outcome = orchestrator.try_run_cycle().await.unwrap().unwrap();
    assert_eq!(outcome.discovered, 2);
    assert_eq!(outcome.published, 2);
    // The cap keeps the oldest candidates, so the checkpoint sits below
    // everything that was not processed
    assert_eq!(outcome.checkpoint, "/photos/00002-item.html");
    assert_eq!(
        publisher.calls(),
        vec!["/photos/00001-item.html", "/photos/00002-item.html"]
    );
}

#[tokio::test]
async fn full_cycle_after_capped_run_ingests_the_remainder() {
    let server = MockServer::start().await;
    mount_listing(&server, &[5, 4, 3, 2, 1]).await;

    let work_dir = tempfile::tempdir().unwrap();
    let config = test_config(&server.uri(), work_dir.path());
    let store = Arc::new(Mutex::new(SqliteStore::new_in_memory().unwrap()));
    let publisher = Arc::new(RecordingPublisher::new());
    let metrics = Arc::new(Metrics::new());
    let health = Arc::new(HealthTracker::new());
    let (_tx, rx) = watch::channel(false);

    let capped = Orchestrator::new(
        config.clone(),
        Arc::clone(&store),
        Arc::clone(&publisher) as Arc<dyn Publisher>,
        Arc::clone(&metrics),
        Arc::clone(&health),
        rx.clone(),
        Some(2),
    )
    .unwrap();
    let first = capped.try_run_cycle().await.unwrap().unwrap();
    assert_eq!(first.published, 2);
    assert_eq!(first.checkpoint, "/photos/00002-item.html");

    // A normal cycle afterwards must pick up everything the capped run
    // left above its checkpoint
    let full = Orchestrator::new(
        config,
        Arc::clone(&store),
        Arc::clone(&publisher) as Arc<dyn Publisher>,
        metrics,
        health,
        rx,
        None,
    )
    .unwrap();
    let second = full.try_run_cycle().await.unwrap().unwrap();

    assert_eq!(second.discovered, 3);
    assert_eq!(second.published, 3);
    assert_eq!(second.checkpoint, "/photos/00005-item.html");
    assert_eq!(store.lock().await.count_items().unwrap(), 5);
}
