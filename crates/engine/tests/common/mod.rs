//! Common test utilities: stub services and corpus fixtures

#![allow(dead_code)]

use async_trait::async_trait;
use docchat_core::{ChatMessage, EmbeddingService, GenerationService, ServiceError};
use docchat_engine::{DocChat, Settings};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const DIMS: usize = 64;

/// Deterministic bag-of-words embedder that counts its calls
#[derive(Default)]
pub struct HashingEmbedder {
    pub calls: AtomicUsize,
    pub delay: Option<Duration>,
    /// Returned for query embeddings; documents still embed
    pub query_failure: Option<ServiceError>,
}

#[async_trait]
impl EmbeddingService for HashingEmbedder {
    async fn embed(&self, text: &str, is_query: bool) -> Result<Vec<f32>, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let (true, Some(err)) = (is_query, &self.query_failure) {
            return Err(err.clone());
        }
        let mut vector = vec![0.0; DIMS];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hash: u64 = 0xcbf29ce484222325;
            for byte in word.to_lowercase().bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(0x100000001b3);
            }
            vector[(hash % DIMS as u64) as usize] += 1.0;
        }
        Ok(vector)
    }
}

/// Replies with the retrieved context, or fails on demand
#[derive(Default)]
pub struct EchoGenerator {
    pub failure: Option<ServiceError>,
    pub condense_failure: Option<ServiceError>,
    pub generate_calls: AtomicUsize,
}

impl EchoGenerator {
    pub fn failing(err: ServiceError) -> Self {
        Self {
            failure: Some(err),
            ..Default::default()
        }
    }
}

#[async_trait]
impl GenerationService for EchoGenerator {
    async fn condense(&self, message: &str, history: &[ChatMessage]) -> Result<String, ServiceError> {
        if let Some(err) = &self.condense_failure {
            return Err(err.clone());
        }
        let previous = history
            .iter()
            .rev()
            .find(|m| m.role == docchat_core::Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        Ok(format!("{message} (following up on: {previous})"))
    }

    async fn generate(
        &self,
        _query: &str,
        context: &[String],
        _history: &[ChatMessage],
    ) -> Result<String, ServiceError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        Ok(format!("From the docs: {}", context.join(" | ")))
    }
}

pub fn corpus(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp dir");
    for (name, content) in files {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }
    dir
}

pub fn settings(root: &Path) -> Settings {
    Settings::new("test-key", root)
}

pub fn app(
    settings: Settings,
    embedder: Arc<HashingEmbedder>,
    generator: Arc<EchoGenerator>,
) -> DocChat {
    DocChat::with_services(settings, embedder, generator)
}
