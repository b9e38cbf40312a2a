//! Corpus loading and the in-memory vector index
//!
//! Reads the documentation corpus from disk, embeds it once through an
//! [`EmbeddingService`](docchat_core::EmbeddingService) and keeps the
//! resulting [`IndexArtifact`] in a process-wide [`IndexCache`].

pub mod artifact;
pub mod cache;
pub mod chunk;
pub mod corpus;
pub mod error;

pub use artifact::{cosine_similarity, BuildOptions, IndexArtifact, IndexStats, SearchHit};
pub use cache::{BuildFailurePolicy, IndexCache};
pub use corpus::CorpusLoader;
pub use error::{IndexError, Result};
