//! Session presenter - the request/response boundary for UI layers

use crate::session::{ChatSession, SourceRef};
use crate::TurnError;
use docchat_core::ChatMessage;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// User-visible description of a failed turn
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorDescriptor {
    /// Always `turn_failed`
    pub kind: &'static str,
    pub stage: &'static str,
    pub code: &'static str,
    pub message: String,
    pub retryable: bool,
}

impl From<&TurnError> for ErrorDescriptor {
    fn from(err: &TurnError) -> Self {
        Self {
            kind: "turn_failed",
            stage: err.stage(),
            code: err.code(),
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

/// The transcript after a submit, plus the error if the turn failed
#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    pub session_id: Uuid,
    pub transcript: Vec<ChatMessage>,
    pub error: Option<ErrorDescriptor>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceRef>,
}

impl Submission {
    pub fn reply(&self) -> Option<&ChatMessage> {
        if self.error.is_some() {
            return None;
        }
        self.transcript.last()
    }
}

/// Thin adapter over a [`ChatSession`]; never fails, errors are data
pub struct SessionPresenter {
    session: ChatSession,
}

impl SessionPresenter {
    pub fn new(session: ChatSession) -> Self {
        Self { session }
    }

    pub fn id(&self) -> Uuid {
        self.session.id()
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    /// Snapshot without submitting anything
    pub fn snapshot(&self) -> Submission {
        Submission {
            session_id: self.session.id(),
            transcript: self.session.transcript().to_vec(),
            error: None,
            sources: Vec::new(),
        }
    }

    pub async fn submit(&mut self, message: &str) -> Submission {
        let (error, sources) = match self.session.submit(message).await {
            Ok(outcome) => (None, outcome.sources),
            Err(err) => (Some(ErrorDescriptor::from(&err)), Vec::new()),
        };

        Submission {
            session_id: self.session.id(),
            transcript: self.session.transcript().to_vec(),
            error,
            sources,
        }
    }
}

pub type SharedPresenter = Arc<Mutex<SessionPresenter>>;

/// Live sessions of this process, keyed by session id.
///
/// Each presenter sits behind its own mutex, so turns of one session run
/// strictly in submission order while different sessions proceed in
/// parallel.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, SharedPresenter>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, presenter: SessionPresenter) -> (Uuid, SharedPresenter) {
        let id = presenter.id();
        let shared = Arc::new(Mutex::new(presenter));
        self.sessions.write().await.insert(id, Arc::clone(&shared));
        (id, shared)
    }

    pub async fn get(&self, id: &Uuid) -> Option<SharedPresenter> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn remove(&self, id: &Uuid) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
