use axum::http::{HeaderName, HeaderValue, StatusCode};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use agentops_engine::{
    config::Config,
    server::Server,
    store::{create_store, DatabaseConfig, DatabaseType, Store},
    workflow::AgentEngine,
};

async fn test_server() -> (axum_test::TestServer, Arc<dyn Store>) {
    // Create a test configuration with SQLite in memory
    let database_config = DatabaseConfig {
        db_type: DatabaseType::Sqlite,
        sqlite_path: Some(PathBuf::from(":memory:")),
        connection_string: None,
    };

    let store = create_store(&database_config)
        .await
        .expect("Failed to create store");
    store.init().await.expect("Failed to initialize store");

    let mut config = Config::default();
    config.database = database_config;

    let engine = Arc::new(AgentEngine::new(
        store.clone(),
        Duration::from_secs(5),
        Duration::from_secs(30),
    ));

    let server = Server::new(&config, store.clone(), engine);
    let client = axum_test::TestServer::new(server.build_router()).unwrap();

    (client, store)
}

#[tokio::test]
async fn test_health_and_metrics_endpoints() {
    let (client, _store) = test_server().await;

    let response = client.get("/health").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "healthy");

    let response = client.get("/metrics").await;
    assert_eq!(response.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_website_registration() {
    let (client, _store) = test_server().await;

    // Create a website
    let response = client
        .post("/websites")
        .json(&json!({ "name": "Example", "url": "https://example.com/" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["website"]["domain"], "example.com");
    assert_eq!(body["website"]["health_status"], "unknown");
    assert_eq!(body["website"]["verified"], false);
    let website_id = body["website"]["id"].as_str().unwrap().to_string();

    // Same domain again is rejected
    let response = client
        .post("/websites")
        .json(&json!({ "name": "Example again", "url": "https://example.com/other" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("already connected"));

    // Invalid URL is rejected
    let response = client
        .post("/websites")
        .json(&json!({ "name": "Broken", "url": "not a url" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    // Listing shows the one website
    let response = client.get("/websites").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: serde_json::Value = response.json();
    assert_eq!(body["websites"].as_array().unwrap().len(), 1);

    // Delete, then a second delete is a 404
    let response = client.delete(&format!("/websites/{}", website_id)).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let response = client.delete(&format!("/websites/{}", website_id)).await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_websites_are_tenant_scoped() {
    let (client, _store) = test_server().await;

    let response = client
        .post("/websites")
        .add_header(
            HeaderName::from_static("x-tenant-id"),
            HeaderValue::from_static("tenant-a"),
        )
        .json(&json!({ "name": "Example", "url": "https://example.com/" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);

    // a different tenant does not see it
    let response = client
        .get("/websites")
        .add_header(
            HeaderName::from_static("x-tenant-id"),
            HeaderValue::from_static("tenant-b"),
        )
        .await;
    let body: serde_json::Value = response.json();
    assert!(body["websites"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_incident_crud_and_resolution() {
    let (client, _store) = test_server().await;

    // severity is accepted case-insensitively
    let response = client
        .post("/incidents")
        .json(&json!({ "title": "Checkout latency", "severity": "high" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["incident"]["severity"], "HIGH");
    assert_eq!(body["incident"]["status"], "OPEN");
    assert_eq!(body["incident"]["source"], "manual");
    let incident_id = body["incident"]["id"].as_str().unwrap().to_string();

    // filtered listing
    let response = client.get("/incidents?status=open").await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["incidents"].as_array().unwrap().len(), 1);

    // resolve; resolved_at is stamped
    let response = client
        .patch(&format!("/incidents/{}", incident_id))
        .json(&json!({ "status": "resolved" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: serde_json::Value = response.json();
    assert_eq!(body["incident"]["status"], "RESOLVED");
    assert!(!body["incident"]["resolved_at"].is_null());
    let resolved_at = body["incident"]["resolved_at"].clone();

    // resolving again does not move the timestamp
    let response = client
        .patch(&format!("/incidents/{}", incident_id))
        .json(&json!({ "status": "resolved" }))
        .await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["incident"]["resolved_at"], resolved_at);

    // unknown status values are rejected
    let response = client
        .patch(&format!("/incidents/{}", incident_id))
        .json(&json!({ "status": "reopened" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    // detail view includes events and remediations
    let response = client.get(&format!("/incidents/{}", incident_id)).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: serde_json::Value = response.json();
    assert!(body["events"].as_array().unwrap().is_empty());
    assert!(body["remediations"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_agent_task_dispatch_validation() {
    let (client, _store) = test_server().await;

    // RCA without an incident id never creates a task
    let response = client
        .post("/agent-tasks")
        .json(&json!({ "agentType": "RCA", "name": "RCA run" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("incidentId"));

    let response = client.get("/agent-tasks").await;
    let body: serde_json::Value = response.json();
    assert!(body["tasks"].as_array().unwrap().is_empty());

    // bad filter values are a validation error
    let response = client.get("/agent-tasks?status=bogus").await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_placeholder_agent_kinds_complete_immediately() {
    let (client, _store) = test_server().await;

    let response = client
        .post("/agent-tasks")
        .json(&json!({ "agentType": "DEPLOYMENT", "name": "Deploy check" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["task"]["status"], "COMPLETED");
    assert!(!body["task"]["completed_at"].is_null());
    let task_id = body["task"]["id"].as_str().unwrap().to_string();

    let response = client.get(&format!("/agent-tasks/{}", task_id)).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: serde_json::Value = response.json();
    assert_eq!(body["task"]["kind"], "DEPLOYMENT");

    // listing filters by kind
    let response = client.get("/agent-tasks?agentType=DEPLOYMENT").await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["tasks"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_llm_settings_never_echo_secrets() {
    let (client, _store) = test_server().await;

    // nothing configured yet
    let response = client.get("/settings/llm").await;
    let body: serde_json::Value = response.json();
    assert!(body["settings"].is_null());

    let response = client
        .put("/settings/llm")
        .json(&json!({
            "defaultProvider": "anthropic",
            "anthropicApiKey": "sk-ant-secret",
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: serde_json::Value = response.json();
    assert_eq!(body["settings"]["defaultProvider"], "anthropic");
    assert_eq!(body["settings"]["anthropicKeySet"], true);
    assert_eq!(body["settings"]["openaiKeySet"], false);
    assert!(body.to_string().find("sk-ant-secret").is_none());

    let response = client.get("/settings/llm").await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["settings"]["anthropicKeySet"], true);
    assert!(body.to_string().find("sk-ant-secret").is_none());
}
