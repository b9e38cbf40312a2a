//! Chat engine for the documentation assistant
//!
//! This crate wires the pieces together:
//! - Settings: environment-driven configuration
//! - GeminiClient: hosted embedding and generation services
//! - ChatSession: the condense / retrieve / generate turn state machine
//! - SessionPresenter: request/response adapter for the UI layers
//! - DocChat: application object owning the index cache and sessions

pub mod app;
pub mod config;
pub mod error;
pub mod inference;
pub mod presenter;
pub mod session;

pub use app::DocChat;
pub use config::Settings;
pub use error::{ConfigError, StartupError, TurnError};
pub use inference::GeminiClient;
pub use presenter::{ErrorDescriptor, SessionPresenter, SessionRegistry, Submission};
pub use session::{ChatSession, SessionOptions, SessionState, SourceRef, TurnOutcome};
