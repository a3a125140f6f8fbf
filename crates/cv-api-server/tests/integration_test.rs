//! Integration tests for the API server.
//!
//! These tests start the server on a loopback port, send real HTTP requests
//! through reqwest, and check the wire-level shape of the responses. Tests
//! that need a live Postgres or object-storage backend check reachability
//! first and skip (rather than fail) when the dependency isn't there, the
//! same way the face-detection/OCR/Qdrant tests in this crate's history
//! handled optional models and services.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use uuid::Uuid;

use cv_api_server::ApiState;
use cv_llm::{FakeLlmClient, LlmClient};
use cv_orchestrator::Orchestrator;
use cv_storage::PostgresConfig;
use cv_taxonomy::{AliasEntry, AliasIndex, StaticAliasSource, TaxonomyCategory};

/// Builds an `ApiState` backed by a `FakeLlmClient` and a default
/// `PostgresConfig`, matching the test doubles `cv-api-server`'s own unit
/// tests use.
fn fake_state() -> ApiState {
    let llm: Arc<dyn LlmClient> = Arc::new(FakeLlmClient::new(vec![]));

    let mut entries = HashMap::new();
    entries.insert(
        TaxonomyCategory::Skill,
        vec![AliasEntry { canonical_id: "skill.rust".into(), alias: "rust".into() }],
    );
    entries.insert(TaxonomyCategory::Certification, vec![]);
    entries.insert(TaxonomyCategory::Role, vec![]);
    entries.insert(TaxonomyCategory::Software, vec![]);
    let alias_index = Arc::new(AliasIndex::new(Arc::new(StaticAliasSource { entries })));

    let orchestrator = Arc::new(Orchestrator::new(llm.clone(), alias_index.clone()));
    ApiState::new(orchestrator, llm, alias_index, PostgresConfig::default())
}

async fn spawn_server(addr: &'static str) -> tokio::task::JoinHandle<()> {
    let state = fake_state();
    let handle = tokio::spawn(async move {
        cv_api_server::start_server(addr, state).await.expect("server failed to start");
    });
    sleep(Duration::from_millis(200)).await;
    handle
}

#[tokio::test]
async fn test_health_endpoint() {
    let server_handle = spawn_server("127.0.0.1:18180").await;

    let client = reqwest::Client::new();
    let response =
        client.get("http://127.0.0.1:18180/health").send().await.expect("failed to send health check request");

    assert_eq!(response.status(), 200);

    let json: serde_json::Value = response.json().await.expect("failed to parse JSON");
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());

    server_handle.abort();
}

#[tokio::test]
async fn test_status_unknown_correlation_id_returns_404() {
    let server_handle = spawn_server("127.0.0.1:18181").await;

    let client = reqwest::Client::new();
    let unknown = Uuid::new_v4();
    let response = client
        .get(format!("http://127.0.0.1:18181/status/{unknown}"))
        .send()
        .await
        .expect("failed to send status request");

    assert_eq!(response.status(), 404, "expected 404 for a correlation id with no intake record");

    server_handle.abort();
}

#[tokio::test]
async fn test_status_invalid_correlation_id_returns_400() {
    let server_handle = spawn_server("127.0.0.1:18182").await;

    let client = reqwest::Client::new();
    let response = client
        .get("http://127.0.0.1:18182/status/not-a-uuid")
        .send()
        .await
        .expect("failed to send status request");

    assert_eq!(response.status(), 400, "expected 400 for a malformed correlation id");

    server_handle.abort();
}

#[tokio::test]
async fn test_hr_job_unknown_returns_404() {
    let server_handle = spawn_server("127.0.0.1:18183").await;

    let client = reqwest::Client::new();
    let unknown = Uuid::new_v4();
    let response =
        client.get(format!("http://127.0.0.1:18183/hr/{unknown}")).send().await.expect("failed to send hr request");

    assert_eq!(response.status(), 404, "expected 404 for an hr job id nobody submitted");

    server_handle.abort();
}

#[tokio::test]
async fn test_intake_invalid_json_request() {
    let server_handle = spawn_server("127.0.0.1:18184").await;

    let client = reqwest::Client::new();
    let response = client
        .post("http://127.0.0.1:18184/intake")
        .header("Content-Type", "application/json")
        .body("{not valid json")
        .send()
        .await
        .expect("failed to send request");

    assert!(response.status().is_client_error());

    server_handle.abort();
}

#[tokio::test]
async fn test_intake_invalid_correlation_id_returns_400() {
    let server_handle = spawn_server("127.0.0.1:18185").await;

    let request_body = serde_json::json!({
        "bucket": "cv-uploads",
        "object_key": "incoming/resume.pdf",
        "correlation_id": "not-a-uuid",
    });

    let client = reqwest::Client::new();
    let response = client
        .post("http://127.0.0.1:18185/intake")
        .json(&request_body)
        .send()
        .await
        .expect("failed to send intake request");

    assert_eq!(response.status(), 400, "expected 400 for an unparseable correlation id");

    server_handle.abort();
}

/// Exercises the download-failure path: without a reachable object store,
/// `submit_intake` should surface a client error rather than hang or panic.
///
/// Ignored by default since it depends on AWS SDK region/credential resolution,
/// which can take a while to time out when no object storage is configured.
/// Run with: cargo test `test_intake_missing_object` -- --ignored
#[tokio::test]
#[ignore]
async fn test_intake_missing_object() {
    let server_handle = spawn_server("127.0.0.1:18186").await;

    let request_body = serde_json::json!({
        "bucket": "cv-intake-test-bucket-does-not-exist",
        "object_key": "incoming/does-not-exist.pdf",
    });

    let client = reqwest::Client::new();
    let response = client
        .post("http://127.0.0.1:18186/intake")
        .json(&request_body)
        .send()
        .await
        .expect("failed to send intake request");

    assert!(response.status().is_client_error(), "expected a client error when the object can't be downloaded");

    server_handle.abort();
}

/// Runs a query through the full engine against a local Postgres instance.
/// Skips when nothing is listening on the configured host/port, since CI
/// doesn't provision a database for this crate's own test run.
#[tokio::test]
async fn test_query_against_local_postgres() {
    let postgres = PostgresConfig::default();
    let addr = format!("{}:{}", postgres.host, postgres.port);
    if tokio::net::TcpStream::connect(&addr).await.is_err() {
        eprintln!("no Postgres listening on {addr}, skipping test_query_against_local_postgres");
        return;
    }

    let server_handle = spawn_server("127.0.0.1:18187").await;

    let request_body = serde_json::json!({
        "query": "find candidates with rust experience",
        "execute": true,
        "limit": 5,
    });

    let client = reqwest::Client::new();
    let response =
        client.post("http://127.0.0.1:18187/query").json(&request_body).send().await.expect("failed to send query");

    assert!(response.status().is_success() || response.status().is_server_error());

    server_handle.abort();
}
