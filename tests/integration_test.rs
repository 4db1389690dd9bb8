use banner_stat::config::{AppConfig, DatabaseConfig};
use banner_stat::storage::{ClickStore, SqliteClickStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

const FMT: &str = "%Y-%m-%dT%H:%M:%S";

/// Spawn the server on a random port over a fresh database and return the address.
async fn spawn_server() -> (
    SocketAddr,
    Arc<SqliteClickStore>,
    tempfile::TempDir,
    tokio::task::JoinHandle<()>,
) {
    let dir = tempfile::tempdir().unwrap();

    let config = AppConfig {
        database: DatabaseConfig {
            path: dir.path().join("banner_stat.db"),
            max_open_conns: 8,
            max_idle_conns: 4,
            connect_attempts: 1,
            ..DatabaseConfig::default()
        },
        ..AppConfig::default()
    };

    let store = Arc::new(SqliteClickStore::connect(&config.database).await.unwrap());
    let app = banner_stat::app::build_router(store.clone(), &config);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give server a moment to start
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    (addr, store, dir, handle)
}

fn last_hour() -> serde_json::Value {
    let now = chrono::Utc::now().naive_utc();
    serde_json::json!({
        "from": (now - chrono::Duration::hours(1)).format(FMT).to_string(),
        "to": (now + chrono::Duration::minutes(1)).format(FMT).to_string(),
    })
}

#[tokio::test]
async fn test_health() {
    let (addr, _store, _dir, _handle) = spawn_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["db_ok"], true);
}

#[tokio::test]
async fn test_health_degraded_after_close() {
    let (addr, store, _dir, _handle) = spawn_server().await;
    store.close().await.unwrap();

    let body: serde_json::Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["db_ok"], false);
}

#[tokio::test]
async fn test_counter_and_stats_roundtrip() {
    let (addr, _store, _dir, _handle) = spawn_server().await;
    let client = reqwest::Client::new();

    for _ in 0..3 {
        let resp = client
            .post(format!("http://{addr}/counter/5"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }

    let resp = client
        .post(format!("http://{addr}/stats/5"))
        .json(&last_hour())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = resp.json().await.unwrap();
    let stats = body["stats"].as_array().unwrap();
    assert!(!stats.is_empty() && stats.len() <= 2, "3 clicks land in 1 or 2 minutes");

    let total: i64 = stats.iter().map(|s| s["v"].as_i64().unwrap()).sum();
    assert_eq!(total, 3);

    for s in stats {
        let ts = s["ts"].as_str().unwrap();
        let parsed = chrono::NaiveDateTime::parse_from_str(ts, FMT).unwrap();
        assert_eq!(ts.len(), 19, "no offset or fraction on the wire");
        assert!(ts.ends_with(":00"), "buckets start on the minute: {ts}");
        assert_eq!(parsed.format(FMT).to_string(), ts);
    }
}

#[tokio::test]
async fn test_stats_isolated_per_banner() {
    let (addr, _store, _dir, _handle) = spawn_server().await;
    let client = reqwest::Client::new();

    client
        .post(format!("http://{addr}/counter/1"))
        .send()
        .await
        .unwrap();

    let body: serde_json::Value = client
        .post(format!("http://{addr}/stats/2"))
        .json(&last_hour())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, serde_json::json!({ "stats": [] }));
}

#[tokio::test]
async fn test_invalid_banner_id() {
    let (addr, _store, _dir, _handle) = spawn_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{addr}/counter/abc"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "invalid banner ID");

    let resp = client
        .post(format!("http://{addr}/stats/1.5"))
        .json(&last_hour())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_stats_rejects_inverted_range() {
    let (addr, _store, _dir, _handle) = spawn_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{addr}/stats/5"))
        .json(&serde_json::json!({
            "from": "2024-03-01T10:02:00",
            "to": "2024-03-01T10:00:00",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "`from` must be before `to`");
}

#[tokio::test]
async fn test_stats_accepts_equal_bounds() {
    let (addr, _store, _dir, _handle) = spawn_server().await;

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/stats/5"))
        .json(&serde_json::json!({
            "from": "2024-03-01T10:00:00",
            "to": "2024-03-01T10:00:00",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_stats_rejects_malformed_body() {
    let (addr, _store, _dir, _handle) = spawn_server().await;
    let client = reqwest::Client::new();

    for body in [
        r#"{"from":"2024-03-01 10:00:00","to":"2024-03-01T10:01:00"}"#,
        r#"{"from":"2024-03-01T10:00:00+02:00","to":"2024-03-01T10:01:00"}"#,
        r#"{"from":"2024-03-01T10:00:00"}"#,
        "not json",
    ] {
        let resp = client
            .post(format!("http://{addr}/stats/5"))
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400, "body {body:?}");
        let json: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(json["error"], "invalid request body");
    }
}

#[tokio::test]
async fn test_stats_body_limit() {
    let (addr, _store, _dir, _handle) = spawn_server().await;

    let padding = "x".repeat(8 * 1024);
    let body = format!(
        r#"{{"from":"2024-03-01T10:00:00","to":"2024-03-01T10:01:00","pad":"{padding}"}}"#
    );
    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/stats/5"))
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_client_error(), "got {}", resp.status());
}

#[tokio::test]
async fn test_counter_after_close_is_unavailable() {
    let (addr, store, _dir, _handle) = spawn_server().await;
    store.close().await.unwrap();

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/counter/5"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 503);
}

#[tokio::test]
async fn test_cors_preflight_allows_any_origin() {
    let (addr, _store, _dir, _handle) = spawn_server().await;

    let resp = reqwest::Client::new()
        .request(reqwest::Method::OPTIONS, format!("http://{addr}/counter/5"))
        .header("origin", "https://ads.example.com")
        .header("access-control-request-method", "POST")
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    assert_eq!(
        resp.headers()["access-control-allow-origin"],
        "*"
    );
}
