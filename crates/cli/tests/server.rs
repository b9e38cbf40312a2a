//! HTTP presenter routes over stub services

use async_trait::async_trait;
use docchat_cli::server::router;
use docchat_core::{ChatMessage, EmbeddingService, GenerationService, ServiceError};
use docchat_engine::{DocChat, Settings};
use serde_json::{json, Value};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

struct LengthEmbedder;

#[async_trait]
impl EmbeddingService for LengthEmbedder {
    async fn embed(&self, text: &str, _is_query: bool) -> Result<Vec<f32>, ServiceError> {
        Ok(vec![text.len() as f32, 1.0])
    }
}

struct ContextGenerator;

#[async_trait]
impl GenerationService for ContextGenerator {
    async fn condense(&self, message: &str, _history: &[ChatMessage]) -> Result<String, ServiceError> {
        Ok(message.to_string())
    }

    async fn generate(
        &self,
        _query: &str,
        context: &[String],
        _history: &[ChatMessage],
    ) -> Result<String, ServiceError> {
        Ok(format!("From the docs: {}", context.join(" | ")))
    }
}

async fn spawn_server() -> (String, TempDir) {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("install.md"), "PDM installs packages.").unwrap();

    let chat = DocChat::with_services(
        Settings::new("test-key", dir.path()),
        Arc::new(LengthEmbedder),
        Arc::new(ContextGenerator),
    );
    chat.start().await.unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(Arc::new(chat))).await.unwrap();
    });
    (format!("http://{}", addr), dir)
}

#[tokio::test]
async fn test_health_reports_index() {
    let (url, _dir) = spawn_server().await;

    let body: Value = reqwest::get(format!("{url}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["status"], "ok");
    assert_eq!(body["index"]["documents"], 1);
    assert_eq!(body["sessions"], 0);
}

#[tokio::test]
async fn test_session_lifecycle() {
    let (url, _dir) = spawn_server().await;
    let client = reqwest::Client::new();

    let response = client.post(format!("{url}/sessions")).send().await.unwrap();
    assert_eq!(response.status(), 201);
    let created: Value = response.json().await.unwrap();
    let id = created["session_id"].as_str().unwrap().to_string();
    assert_eq!(created["transcript"].as_array().unwrap().len(), 1);
    assert_eq!(created["transcript"][0]["role"], "assistant");
    assert!(created["error"].is_null());

    let turn: Value = client
        .post(format!("{url}/sessions/{id}/messages"))
        .json(&json!({ "content": "How do I install packages?" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let transcript = turn["transcript"].as_array().unwrap();
    assert_eq!(transcript.len(), 3);
    assert_eq!(transcript[1]["content"], "How do I install packages?");
    assert!(transcript[2]["content"]
        .as_str()
        .unwrap()
        .contains("PDM installs packages."));
    assert!(turn["error"].is_null());

    let fetched: Value = client
        .get(format!("{url}/sessions/{id}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched["transcript"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_blank_message_is_a_turn_error() {
    let (url, _dir) = spawn_server().await;
    let client = reqwest::Client::new();

    let created: Value = client
        .post(format!("{url}/sessions"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = created["session_id"].as_str().unwrap();

    let turn: Value = client
        .post(format!("{url}/sessions/{id}/messages"))
        .json(&json!({ "content": "   " }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(turn["error"]["kind"], "turn_failed");
    assert_eq!(turn["error"]["stage"], "input");
    assert_eq!(turn["transcript"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unknown_and_malformed_session_ids() {
    let (url, _dir) = spawn_server().await;
    let client = reqwest::Client::new();

    let missing = client
        .get(format!("{url}/sessions/{}", uuid::Uuid::new_v4()))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
    let body: Value = missing.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");

    let malformed = client
        .post(format!("{url}/sessions/not-a-uuid/messages"))
        .json(&json!({ "content": "hello" }))
        .send()
        .await
        .unwrap();
    assert_eq!(malformed.status(), 400);
    let body: Value = malformed.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_delete_session_frees_it() {
    let (url, _dir) = spawn_server().await;
    let client = reqwest::Client::new();

    let created: Value = client
        .post(format!("{url}/sessions"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = created["session_id"].as_str().unwrap();

    let deleted = client
        .delete(format!("{url}/sessions/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), 204);

    let health: Value = client
        .get(format!("{url}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["sessions"], 0);

    let fetched = client.get(format!("{url}/sessions/{id}")).send().await.unwrap();
    assert_eq!(fetched.status(), 404);

    let again = client
        .delete(format!("{url}/sessions/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(again.status(), 404);
    let body: Value = again.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");
}
