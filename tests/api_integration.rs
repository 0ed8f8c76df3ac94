//! API integration tests for the query gateway.
//!
//! Each test spins up the real proxy on a random port, backed by an
//! in-memory SQLite driver, and speaks to it over HTTP like the editor UI.

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::net::TcpListener;

use sqlgate::config::AuthConfig;
use sqlgate::driver::SqliteDriver;
use sqlgate::server::{AppState, create_router};

// =============================================================================
// Test Helpers
// =============================================================================

/// Start a test server over an in-memory database and return its base URL.
async fn start_test_server(auth: Option<AuthConfig>) -> String {
    let state = AppState {
        driver: Arc::new(SqliteDriver::memory()),
        studio_url: "https://studio.example.com/embed/sqlite".to_string(),
        log_statements: false,
        auth,
    };
    let router = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let addr = listener.local_addr().expect("Failed to get local addr");

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    // Give server time to start
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    format!("http://{}", addr)
}

async fn post_command(client: &reqwest::Client, base_url: &str, command: Value) -> Value {
    let resp = client
        .post(format!("{}/query", base_url))
        .json(&command)
        .send()
        .await
        .expect("Failed to send command");
    assert_eq!(resp.status(), 200);
    resp.json().await.expect("Failed to parse response body")
}

// =============================================================================
// Command Endpoint Tests
// =============================================================================

#[tokio::test]
async fn test_query_envelope_roundtrip() {
    let base_url = start_test_server(None).await;
    let client = reqwest::Client::new();

    let body = post_command(
        &client,
        &base_url,
        json!({"type": "query", "id": "a1", "statement": "select 1 as x"}),
    )
    .await;

    assert_eq!(body["type"], "query");
    assert_eq!(body["id"], "a1");
    assert!(body.get("error").is_none());
    assert_eq!(body["data"]["rows"], json!([{"x": 1}]));
    assert_eq!(body["data"]["headers"][0]["name"], "x");
    assert_eq!(body["data"]["headers"][0]["type"], 2);
    assert_eq!(body["data"]["stat"]["rowsAffected"], 0);
    assert_eq!(body["data"]["stat"]["rowsRead"], Value::Null);
}

#[tokio::test]
async fn test_transaction_returns_one_result_per_statement() {
    let base_url = start_test_server(None).await;
    let client = reqwest::Client::new();

    let body = post_command(
        &client,
        &base_url,
        json!({
            "type": "transaction",
            "id": 1,
            "statements": [
                "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)",
                "INSERT INTO t (name) VALUES ('alice')",
                "SELECT name FROM t"
            ]
        }),
    )
    .await;

    assert_eq!(body["id"], 1);
    let results = body["data"].as_array().expect("expected result array");
    assert_eq!(results.len(), 3);
    assert_eq!(results[1]["stat"]["rowsAffected"], 1);
    assert_eq!(results[1]["lastInsertRowid"], 1);
    assert_eq!(results[2]["rows"], json!([{"name": "alice"}]));
}

#[tokio::test]
async fn test_failing_transaction_reports_single_error() {
    let base_url = start_test_server(None).await;
    let client = reqwest::Client::new();

    let body = post_command(
        &client,
        &base_url,
        json!({
            "type": "transaction",
            "id": "tx",
            "statements": [
                "CREATE TABLE t (id INTEGER PRIMARY KEY)",
                "INSERT INTO missing VALUES (1)"
            ]
        }),
    )
    .await;

    assert_eq!(body["id"], "tx");
    assert!(body["error"].is_string());
    assert!(body.get("data").is_none());
}

#[tokio::test]
async fn test_malformed_command_keeps_server_responsive() {
    let base_url = start_test_server(None).await;
    let client = reqwest::Client::new();

    let body = post_command(
        &client,
        &base_url,
        json!({"type": "vacuum", "id": 9}),
    )
    .await;
    assert_eq!(body["id"], 9);
    assert!(body["error"].is_string());
    assert!(body.get("data").is_none());

    let body = post_command(
        &client,
        &base_url,
        json!({"type": "query", "id": 10, "statement": "select 2 as y"}),
    )
    .await;
    assert!(body.get("error").is_none());
    assert_eq!(body["data"]["rows"], json!([{"y": 2}]));
}

#[tokio::test]
async fn test_concurrent_commands_correlate_by_id() {
    let base_url = start_test_server(None).await;
    let client = reqwest::Client::new();

    let first = post_command(
        &client,
        &base_url,
        json!({"type": "query", "id": "1", "statement": "select 1 as n"}),
    );
    let second = post_command(
        &client,
        &base_url,
        json!({"type": "query", "id": "2", "statement": "select 2 as n"}),
    );

    let (first, second) = tokio::join!(first, second);
    assert_eq!(first["id"], "1");
    assert_eq!(first["data"]["rows"], json!([{"n": 1}]));
    assert_eq!(second["id"], "2");
    assert_eq!(second["data"]["rows"], json!([{"n": 2}]));
}

// =============================================================================
// Host Page & Auth Tests
// =============================================================================

#[tokio::test]
async fn test_index_page_serves_editor_iframe() {
    let base_url = start_test_server(None).await;
    let client = reqwest::Client::new();

    let resp = client.get(&base_url).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let page = resp.text().await.unwrap();
    assert!(page.contains("https://studio.example.com/embed/sqlite"));
    assert!(page.contains("<iframe"));
}

#[tokio::test]
async fn test_basic_auth_required_when_configured() {
    let base_url = start_test_server(Some(AuthConfig {
        username: "admin".to_string(),
        password: "secret".to_string(),
    }))
    .await;
    let client = reqwest::Client::new();

    let resp = client.get(&base_url).send().await.unwrap();
    assert_eq!(resp.status(), 401);

    let resp = client
        .get(&base_url)
        .basic_auth("admin", Some("secret"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}
