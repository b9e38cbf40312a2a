//! HTTP presenter over the session registry

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use docchat_engine::{DocChat, Submission};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

pub fn router(chat: Arc<DocChat>) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/sessions", post(handle_create_session))
        .route(
            "/sessions/{id}",
            get(handle_get_session).delete(handle_delete_session),
        )
        .route("/sessions/{id}/messages", post(handle_post_message))
        .with_state(chat)
}

/// Bind `addr` and serve until the process exits
pub async fn serve(chat: Arc<DocChat>, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Serving on http://{}", listener.local_addr()?);
    axum::serve(listener, router(chat)).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn unavailable(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::SERVICE_UNAVAILABLE,
        code: "index_unavailable",
        message: message.into(),
    }
}

fn parse_session_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| bad_request(format!("Invalid session id: {}", raw)))
}

// ============ Handlers ============

#[derive(Deserialize)]
struct MessageBody {
    content: String,
}

async fn handle_health(State(chat): State<Arc<DocChat>>) -> Json<serde_json::Value> {
    let index = chat.cache().get().map(|index| index.stats());
    let sessions = chat.sessions().len().await;
    Json(serde_json::json!({
        "status": "ok",
        "topic": chat.settings().topic,
        "index": index,
        "sessions": sessions,
    }))
}

#[instrument(skip(chat))]
async fn handle_create_session(
    State(chat): State<Arc<DocChat>>,
) -> Result<(StatusCode, Json<Submission>), AppError> {
    let presenter = chat
        .new_presenter()
        .await
        .map_err(|e| unavailable(e.to_string()))?;
    let snapshot = presenter.snapshot();
    chat.sessions().insert(presenter).await;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

async fn handle_get_session(
    State(chat): State<Arc<DocChat>>,
    Path(id): Path<String>,
) -> Result<Json<Submission>, AppError> {
    let id = parse_session_id(&id)?;
    let presenter = chat
        .sessions()
        .get(&id)
        .await
        .ok_or_else(|| not_found(format!("Unknown session: {}", id)))?;
    let snapshot = presenter.lock().await.snapshot();
    Ok(Json(snapshot))
}

#[instrument(skip(chat))]
async fn handle_delete_session(
    State(chat): State<Arc<DocChat>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = parse_session_id(&id)?;
    if !chat.sessions().remove(&id).await {
        return Err(not_found(format!("Unknown session: {}", id)));
    }
    info!("Session {} closed", id);
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(chat, body))]
async fn handle_post_message(
    State(chat): State<Arc<DocChat>>,
    Path(id): Path<String>,
    Json(body): Json<MessageBody>,
) -> Result<Json<Submission>, AppError> {
    let id = parse_session_id(&id)?;
    let presenter = chat
        .sessions()
        .get(&id)
        .await
        .ok_or_else(|| not_found(format!("Unknown session: {}", id)))?;

    // Held for the whole turn so turns on one session never interleave
    let mut presenter = presenter.lock().await;
    Ok(Json(presenter.submit(&body.content).await))
}
