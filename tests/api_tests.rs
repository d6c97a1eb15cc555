//! Integration tests for the HTTP API.
//!
//! These tests spawn a real Axum server on a random port backed by the
//! in-memory store and use reqwest to hit it with actual HTTP requests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use job_polling::daemon;
use job_polling::models::Settings;
use job_polling::server;
use job_polling::storage::memory::MemoryStore;
use job_polling::storage::KvStore;

// ---------------------------------------------------------------------------
// Helper to spawn a test server on a random port
// ---------------------------------------------------------------------------

async fn spawn_test_server(store: Arc<MemoryStore>) -> (String, tokio::task::JoinHandle<()>) {
    let settings = Arc::new(Settings {
        worker_id: "worker-it".to_string(),
        ..Settings::default()
    });
    let state = daemon::build_state(settings, store as Arc<dyn KvStore>).expect("build state");
    let router = server::create_router(state);

    // Bind to port 0 to get a random available port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind to random port");
    let addr = listener.local_addr().expect("get local addr");
    let base_url = format!("http://{}", addr);

    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    // Give the server a moment to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    (base_url, handle)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_wait_terminal_on_first_read() {
    let store = Arc::new(MemoryStore::new());
    store.insert(
        "job:abc",
        r#"{"status":"Completed","url":"https://x/y","updated_on":1700000000}"#,
    );
    let (base_url, _handle) = spawn_test_server(store).await;

    let resp = reqwest::get(format!(
        "{}/job/abc/wait?max_wait_time=30&poll_interval=1",
        base_url
    ))
    .await
    .unwrap();
    assert_eq!(resp.status(), 200);

    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "Completed");
    assert_eq!(json["polls_count"], 1);
    assert!(json["polling_time"].as_f64().unwrap() < 1.0);
    assert_eq!(json["updated_on"], 1_700_000_000);
    assert_eq!(json["worker_id"], "worker-it");
}

#[tokio::test]
async fn test_wait_sees_transition_mid_wait() {
    let store = Arc::new(MemoryStore::new());
    store.insert("job:p1", r#"{"status":"Running"}"#);
    let (base_url, _handle) = spawn_test_server(Arc::clone(&store)).await;

    let writer = Arc::clone(&store);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(2500)).await;
        writer.insert("job:p1", r#"{"status":"Completed"}"#);
    });

    let start = Instant::now();
    let resp = reqwest::get(format!(
        "{}/job/p1/wait?max_wait_time=10&poll_interval=1",
        base_url
    ))
    .await
    .unwrap();
    let elapsed = start.elapsed();

    assert_eq!(resp.status(), 200);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "Completed");
    let polls = json["polls_count"].as_u64().unwrap();
    assert!((3..=5).contains(&polls), "polls_count = {}", polls);
    assert!(elapsed >= Duration::from_millis(2500));
    assert!(elapsed < Duration::from_millis(4500));
}

#[tokio::test]
async fn test_wait_deadline_returns_last_status() {
    let store = Arc::new(MemoryStore::new());
    store.insert("job:q", r#"{"status":"Running"}"#);
    let (base_url, _handle) = spawn_test_server(store).await;

    let start = Instant::now();
    let resp = reqwest::get(format!(
        "{}/job/q/wait?max_wait_time=10&poll_interval=2",
        base_url
    ))
    .await
    .unwrap();
    let elapsed = start.elapsed();

    assert_eq!(resp.status(), 200);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "Running");
    assert_eq!(json["timed_out"], true);
    let polls = json["polls_count"].as_u64().unwrap();
    assert!((5..=6).contains(&polls));
    assert!(elapsed >= Duration::from_secs(10) && elapsed <= Duration::from_secs(12));
}

#[tokio::test]
async fn test_wait_unknown_job_returns_404() {
    let (base_url, _handle) = spawn_test_server(Arc::new(MemoryStore::new())).await;

    let resp = reqwest::get(format!(
        "{}/job/none/wait?max_wait_time=10&poll_interval=1",
        base_url
    ))
    .await
    .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_wait_param_bounds_return_422() {
    let (base_url, _handle) = spawn_test_server(Arc::new(MemoryStore::new())).await;
    let client = reqwest::Client::new();

    for query in ["max_wait_time=5", "poll_interval=0.1"] {
        let resp = client
            .get(format!("{}/job/x/wait?{}", base_url, query))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 422, "{}", query);
    }
}

#[tokio::test]
async fn test_backend_down() {
    let store = Arc::new(MemoryStore::new());
    store.set_available(false);
    let (base_url, _handle) = spawn_test_server(store).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/job/x/status", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 503);

    let resp = client
        .get(format!("{}/health/", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["redis_connected"], false);
    assert_eq!(json["status"], "unhealthy");
}

#[tokio::test]
async fn test_status_and_stats_via_http() {
    let store = Arc::new(MemoryStore::new());
    store.insert("job:a", r#"{"status":"Pending"}"#);
    store.insert("job:b", r#"{"status":"Completed","output_json":{"ok":true}}"#);
    let (base_url, _handle) = spawn_test_server(store).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/job/b/status", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["job_id"], "b");
    assert_eq!(json["output_json"]["ok"], true);

    let resp = client
        .get(format!("{}/admin/stats", base_url))
        .send()
        .await
        .unwrap();
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["total_jobs"], 2);
    assert_eq!(json["by_status"]["Pending"], 1);
    assert_eq!(json["by_status"]["Completed"], 1);
}

#[tokio::test]
async fn test_disconnected_waiter_does_not_block_server() {
    let store = Arc::new(MemoryStore::new());
    store.insert("job:slow", r#"{"status":"Running"}"#);
    let (base_url, _handle) = spawn_test_server(store).await;

    // Abandon a long wait after a short client-side timeout.
    let impatient = reqwest::Client::builder()
        .timeout(Duration::from_millis(300))
        .build()
        .unwrap();
    let result = impatient
        .get(format!(
            "{}/job/slow/wait?max_wait_time=3600&poll_interval=1",
            base_url
        ))
        .send()
        .await;
    assert!(result.is_err());

    let resp = reqwest::get(format!("{}/health/ping", base_url))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}
