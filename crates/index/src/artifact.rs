//! Index builder and the read-only index artifact

use crate::chunk::chunk_text;
use crate::{IndexError, Result};
use docchat_core::{DocumentRecord, EmbeddingService, ServiceError};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument};

const DEFAULT_CHUNK_CHARS: usize = 4096;
const DEFAULT_EMBED_BATCH: usize = 32;

/// Knobs for [`IndexArtifact::build`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildOptions {
    /// Maximum characters per chunk
    pub chunk_chars: usize,
    /// Texts sent per embedding request
    pub embed_batch: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            chunk_chars: DEFAULT_CHUNK_CHARS,
            embed_batch: DEFAULT_EMBED_BATCH,
        }
    }
}

struct IndexEntry {
    document: usize,
    chunk_index: usize,
    text: String,
    vector: Vec<f32>,
}

/// One retrieved chunk
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub document: Arc<DocumentRecord>,
    pub chunk_index: usize,
    pub text: String,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub documents: usize,
    pub chunks: usize,
    pub dimensions: usize,
}

/// Embedded corpus, searchable by cosine similarity.
///
/// Never mutated after [`build`](Self::build) returns.
pub struct IndexArtifact {
    documents: Vec<Arc<DocumentRecord>>,
    entries: Vec<IndexEntry>,
    dimensions: usize,
}

impl std::fmt::Debug for IndexArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexArtifact")
            .field("stats", &self.stats())
            .finish()
    }
}

impl IndexArtifact {
    /// Chunk and embed every document.
    ///
    /// Any embedding failure fails the whole build; no partial index is
    /// ever returned.
    #[instrument(skip_all, fields(documents = documents.len()))]
    pub async fn build(
        documents: Vec<DocumentRecord>,
        embedder: &dyn EmbeddingService,
        options: &BuildOptions,
    ) -> Result<Self> {
        let started = Instant::now();
        let documents: Vec<Arc<DocumentRecord>> = documents.into_iter().map(Arc::new).collect();

        let mut pending: Vec<(usize, usize, String)> = Vec::new();
        for (doc_idx, document) in documents.iter().enumerate() {
            for (chunk_idx, text) in chunk_text(&document.text, options.chunk_chars)
                .into_iter()
                .enumerate()
            {
                pending.push((doc_idx, chunk_idx, text));
            }
        }
        if pending.is_empty() {
            return Err(IndexError::NothingToIndex);
        }

        let mut entries = Vec::with_capacity(pending.len());
        let mut dimensions = 0;
        let batch_size = options.embed_batch.max(1);

        for batch in pending.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|(_, _, text)| text.clone()).collect();
            debug!("Embedding batch of {} chunks", texts.len());
            let vectors = embedder.embed_batch(&texts, false).await?;
            if vectors.len() != texts.len() {
                return Err(IndexError::IndexBuildFailed(ServiceError::InvalidInput(format!(
                    "Embedding service returned {} vectors for {} texts",
                    vectors.len(),
                    texts.len()
                ))));
            }

            for ((doc_idx, chunk_idx, text), vector) in batch.iter().zip(vectors) {
                if vector.is_empty() {
                    return Err(IndexError::IndexBuildFailed(ServiceError::InvalidInput(
                        "Embedding service returned an empty vector".to_string(),
                    )));
                }
                if dimensions == 0 {
                    dimensions = vector.len();
                } else if vector.len() != dimensions {
                    return Err(IndexError::IndexBuildFailed(ServiceError::InvalidInput(format!(
                        "Embedding dimension {} does not match expected {}",
                        vector.len(),
                        dimensions
                    ))));
                }
                entries.push(IndexEntry {
                    document: *doc_idx,
                    chunk_index: *chunk_idx,
                    text: text.clone(),
                    vector,
                });
            }
        }

        let artifact = Self {
            documents,
            entries,
            dimensions,
        };
        let stats = artifact.stats();
        info!(
            "Indexed {} documents ({} chunks, {} dims) in {:.2?}",
            stats.documents,
            stats.chunks,
            stats.dimensions,
            started.elapsed()
        );
        Ok(artifact)
    }

    /// Return the `top_k` chunks most similar to `query`, best first.
    ///
    /// Equal scores keep discovery order.
    pub fn search(&self, query: &[f32], top_k: usize) -> Vec<SearchHit> {
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| (idx, cosine_similarity(query, &entry.vector)))
            .collect();

        // stable sort
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(top_k);

        scored
            .into_iter()
            .map(|(idx, score)| {
                let entry = &self.entries[idx];
                SearchHit {
                    document: Arc::clone(&self.documents[entry.document]),
                    chunk_index: entry.chunk_index,
                    text: entry.text.clone(),
                    score,
                }
            })
            .collect()
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            documents: self.documents.len(),
            chunks: self.entries.len(),
            dimensions: self.dimensions,
        }
    }

    pub fn documents(&self) -> &[Arc<DocumentRecord>] {
        &self.documents
    }
}

/// Cosine similarity in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or
/// zero-magnitude vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Embeds each text as a one-hot vector keyed by its first letter.
    struct LetterEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingService for LetterEmbedder {
        async fn embed(&self, text: &str, _is_query: bool) -> std::result::Result<Vec<f32>, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut v = vec![0.0; 26];
            let first = text.bytes().next().unwrap_or(b'a').to_ascii_lowercase();
            v[(first.saturating_sub(b'a') as usize).min(25)] = 1.0;
            Ok(v)
        }
    }

    struct FlakyEmbedder {
        fail_after: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingService for FlakyEmbedder {
        async fn embed(&self, _text: &str, _is_query: bool) -> std::result::Result<Vec<f32>, ServiceError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) >= self.fail_after {
                return Err(ServiceError::QuotaExceeded("daily limit".into()));
            }
            Ok(vec![1.0, 0.0])
        }
    }

    fn doc(name: &str, text: &str) -> DocumentRecord {
        DocumentRecord::new(format!("/docs/{name}"), name, text)
    }

    #[test]
    fn test_cosine_identical_and_orthogonal() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[tokio::test]
    async fn test_search_ranks_and_limits() {
        let embedder = LetterEmbedder { calls: AtomicUsize::new(0) };
        let docs = vec![doc("a.md", "apple"), doc("b.md", "banana"), doc("c.md", "cherry")];
        let index = IndexArtifact::build(docs, &embedder, &BuildOptions::default())
            .await
            .unwrap();

        let query = embedder.embed("bread", true).await.unwrap();
        let hits = index.search(&query, 2);

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].document.relative_path, "b.md");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        // remaining scores tie at zero, discovery order wins
        assert_eq!(hits[1].document.relative_path, "a.md");
        assert_eq!(index.stats(), IndexStats { documents: 3, chunks: 3, dimensions: 26 });
    }

    #[tokio::test]
    async fn test_top_k_larger_than_index() {
        let embedder = LetterEmbedder { calls: AtomicUsize::new(0) };
        let index = IndexArtifact::build(vec![doc("a.md", "apple")], &embedder, &BuildOptions::default())
            .await
            .unwrap();

        assert_eq!(index.search(&[1.0; 26], 3).len(), 1);
        assert!(index.search(&[1.0; 26], 0).is_empty());
    }

    #[tokio::test]
    async fn test_batches_cover_every_chunk() {
        let embedder = LetterEmbedder { calls: AtomicUsize::new(0) };
        let docs = (0..5).map(|i| doc(&format!("{i}.md"), "text")).collect();
        let options = BuildOptions { chunk_chars: 100, embed_batch: 2 };

        let index = IndexArtifact::build(docs, &embedder, &options).await.unwrap();

        assert_eq!(index.stats().chunks, 5);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_embedding_failure_fails_whole_build() {
        let embedder = FlakyEmbedder { fail_after: 2, calls: AtomicUsize::new(0) };
        let docs = (0..4).map(|i| doc(&format!("{i}.md"), "text")).collect();

        let err = IndexArtifact::build(docs, &embedder, &BuildOptions::default())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            IndexError::IndexBuildFailed(ServiceError::QuotaExceeded("daily limit".into()))
        );
    }

    #[tokio::test]
    async fn test_no_text_to_index() {
        let embedder = LetterEmbedder { calls: AtomicUsize::new(0) };
        let err = IndexArtifact::build(vec![doc("a.md", "  ")], &embedder, &BuildOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err, IndexError::NothingToIndex);
    }
}
