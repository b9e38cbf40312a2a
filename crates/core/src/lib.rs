//! Core domain types for the documentation chat service
//!
//! This crate defines the data that flows between the corpus loader, the
//! index and the chat session: document records, chat messages and the
//! transcript, plus the capability traits for the hosted embedding and
//! generation services.

pub mod document;
pub mod message;
pub mod service;
pub mod error;

pub use document::DocumentRecord;
pub use message::{ChatMessage, Role, Transcript};
pub use service::{EmbeddingService, GenerationService};
pub use error::{CoreError, Result, ServiceError};
