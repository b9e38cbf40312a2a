//! Capability traits for the hosted model services.
//!
//! The index and the chat session only see these traits; the concrete
//! HTTP clients live in the engine crate, and tests plug in stubs.

use crate::{ChatMessage, ServiceError};
use async_trait::async_trait;

/// Turns text into vectors comparable by cosine similarity
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Embed one text. `is_query` distinguishes search queries from
    /// corpus passages for providers that embed them differently.
    async fn embed(&self, text: &str, is_query: bool) -> Result<Vec<f32>, ServiceError>;

    /// Embed several texts, returning one vector per input in order.
    async fn embed_batch(
        &self,
        texts: &[String],
        is_query: bool,
    ) -> Result<Vec<Vec<f32>>, ServiceError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text, is_query).await?);
        }
        Ok(vectors)
    }
}

/// Produces text with a hosted language model
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Rewrite `message` into a standalone question using `history`.
    async fn condense(&self, message: &str, history: &[ChatMessage]) -> Result<String, ServiceError>;

    /// Answer `query` from the retrieved `context` passages.
    async fn generate(
        &self,
        query: &str,
        context: &[String],
        history: &[ChatMessage],
    ) -> Result<String, ServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct LengthEmbedder;

    #[async_trait]
    impl EmbeddingService for LengthEmbedder {
        async fn embed(&self, text: &str, _is_query: bool) -> Result<Vec<f32>, ServiceError> {
            if text.is_empty() {
                return Err(ServiceError::InvalidInput("empty text".into()));
            }
            Ok(vec![text.len() as f32])
        }
    }

    #[tokio::test]
    async fn test_default_batch_preserves_order() {
        let texts = vec!["a".to_string(), "abc".to_string()];
        let vectors = LengthEmbedder.embed_batch(&texts, false).await.unwrap();

        assert_eq!(vectors, vec![vec![1.0], vec![3.0]]);
    }

    #[tokio::test]
    async fn test_default_batch_stops_on_first_error() {
        let texts = vec!["a".to_string(), String::new(), "abc".to_string()];
        let err = LengthEmbedder.embed_batch(&texts, false).await.unwrap_err();

        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }
}
