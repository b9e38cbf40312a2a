//! Conversational session - one user's chat over the shared index.
//!
//! Each turn runs `Condensing -> Retrieving -> Generating` and returns to
//! `Idle`. The user message is recorded before any stage runs; the
//! assistant reply is appended only when the whole turn succeeds.

use crate::TurnError;
use docchat_core::{ChatMessage, EmbeddingService, GenerationService, ServiceError, Transcript};
use docchat_index::IndexArtifact;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Condensing,
    Retrieving,
    Generating,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// First assistant message of every transcript
    pub greeting: String,
    /// Chunks retrieved per turn
    pub top_k: usize,
    /// Upper bound for each external call in a turn
    pub stage_timeout: Duration,
    /// Prior messages handed to condensation
    pub history_messages: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            greeting: "Ask me a question!".to_string(),
            top_k: 3,
            stage_timeout: Duration::from_secs(60),
            history_messages: 10,
        }
    }
}

/// A retrieved chunk that backed a reply
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceRef {
    pub path: String,
    pub chunk_index: usize,
    pub score: f32,
}

/// Result of a successful turn
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub condensed_query: String,
    pub reply: String,
    pub sources: Vec<SourceRef>,
}

pub struct ChatSession {
    id: Uuid,
    index: Arc<IndexArtifact>,
    embedder: Arc<dyn EmbeddingService>,
    generator: Arc<dyn GenerationService>,
    options: SessionOptions,
    transcript: Transcript,
    state: SessionState,
}

impl ChatSession {
    pub fn new(
        index: Arc<IndexArtifact>,
        embedder: Arc<dyn EmbeddingService>,
        generator: Arc<dyn GenerationService>,
        options: SessionOptions,
    ) -> Self {
        let transcript = Transcript::with_greeting(options.greeting.clone());
        Self {
            id: Uuid::new_v4(),
            index,
            embedder,
            generator,
            options,
            transcript,
            state: SessionState::Idle,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Run one turn for `message`.
    ///
    /// On failure the user message stays in the transcript and no
    /// assistant message is added. Dropping the returned future mid-turn
    /// leaves the session `Idle` with the same guarantee.
    #[instrument(skip(self, message), fields(session = %self.id))]
    pub async fn submit(&mut self, message: &str) -> Result<TurnOutcome, TurnError> {
        if message.trim().is_empty() {
            return Err(TurnError::EmptyMessage);
        }

        let has_exchange = self.transcript.has_exchange();
        let prior = self.transcript.len();
        self.transcript.push_user(message);

        let turn = Turn {
            index: &self.index,
            embedder: self.embedder.as_ref(),
            generator: self.generator.as_ref(),
            options: &self.options,
            history: &self.transcript.messages()[..prior],
            has_exchange,
        };
        let mut state = StateGuard::new(&mut self.state);
        let outcome = turn.run(message, &mut state).await;
        drop(state);

        match outcome {
            Ok(outcome) => {
                self.transcript.push_assistant(outcome.reply.clone())?;
                info!("Turn answered with {} sources", outcome.sources.len());
                Ok(outcome)
            }
            Err(err) => {
                warn!("Turn failed during {}: {}", err.stage(), err);
                Err(err)
            }
        }
    }
}

struct Turn<'a> {
    index: &'a IndexArtifact,
    embedder: &'a dyn EmbeddingService,
    generator: &'a dyn GenerationService,
    options: &'a SessionOptions,
    history: &'a [ChatMessage],
    has_exchange: bool,
}

impl Turn<'_> {
    async fn run(&self, message: &str, state: &mut StateGuard<'_>) -> Result<TurnOutcome, TurnError> {
        let limit = self.options.stage_timeout;

        state.enter(SessionState::Condensing);
        let condensed_query = if self.has_exchange {
            let start = self.history.len().saturating_sub(self.options.history_messages);
            let window = &self.history[start..];
            let condensed = bounded(limit, self.generator.condense(message, window))
                .await
                .map_err(TurnError::Condense)?;
            if condensed.trim().is_empty() {
                message.to_string()
            } else {
                condensed
            }
        } else {
            message.to_string()
        };
        debug!("Standalone query: {}", condensed_query);

        state.enter(SessionState::Retrieving);
        let query_vector = bounded(limit, self.embedder.embed(&condensed_query, true))
            .await
            .map_err(TurnError::Retrieve)?;
        let dimensions = self.index.stats().dimensions;
        if query_vector.len() != dimensions {
            return Err(TurnError::Retrieve(ServiceError::InvalidInput(format!(
                "Query embedding has {} dimensions, index has {}",
                query_vector.len(),
                dimensions
            ))));
        }
        let hits = self.index.search(&query_vector, self.options.top_k);
        debug!("Retrieved {} chunks", hits.len());

        state.enter(SessionState::Generating);
        let context: Vec<String> = hits.iter().map(|hit| hit.text.clone()).collect();
        let reply = bounded(
            limit,
            self.generator.generate(&condensed_query, &context, self.history),
        )
        .await
        .map_err(TurnError::Generate)?;

        let sources = hits
            .iter()
            .map(|hit| SourceRef {
                path: hit.document.relative_path.clone(),
                chunk_index: hit.chunk_index,
                score: hit.score,
            })
            .collect();

        Ok(TurnOutcome {
            condensed_query,
            reply,
            sources,
        })
    }
}

/// Tracks the turn stage; resets to `Idle` when dropped, including when
/// the turn future is cancelled.
struct StateGuard<'a> {
    state: &'a mut SessionState,
}

impl<'a> StateGuard<'a> {
    fn new(state: &'a mut SessionState) -> Self {
        Self { state }
    }

    fn enter(&mut self, next: SessionState) {
        debug!("Session state {:?} -> {:?}", self.state, next);
        *self.state = next;
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        *self.state = SessionState::Idle;
    }
}

async fn bounded<T, F>(limit: Duration, future: F) -> Result<T, ServiceError>
where
    F: Future<Output = Result<T, ServiceError>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => Err(ServiceError::Timeout(limit)),
    }
}
