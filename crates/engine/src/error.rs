//! Engine error types

use docchat_core::{CoreError, ServiceError};
use docchat_index::IndexError;
use std::path::PathBuf;
use thiserror::Error;

/// Invalid or missing configuration, detected before serving anything
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing API credential: set GOOGLE_API_KEY in the environment or a .env file")]
    MissingCredential,

    #[error("Corpus root not found: {}", .0.display())]
    CorpusNotFound(PathBuf),

    #[error("Invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

/// Anything that stops the service from starting
#[derive(Error, Debug)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("HTTP client setup failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl StartupError {
    /// Which startup precondition failed
    pub fn precondition(&self) -> &'static str {
        match self {
            StartupError::Config(ConfigError::MissingCredential) => "credential",
            StartupError::Config(ConfigError::CorpusNotFound(_))
            | StartupError::Index(IndexError::CorpusNotFound(_)) => "corpus_root",
            StartupError::Config(ConfigError::Invalid { .. }) => "configuration",
            StartupError::Index(IndexError::EmptyCorpus { .. })
            | StartupError::Index(IndexError::NothingToIndex) => "corpus",
            StartupError::Index(_) => "index_build",
            StartupError::Http(_) => "http_client",
        }
    }
}

/// A single chat turn failed; the session stays usable
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TurnError {
    #[error("Message must not be empty")]
    EmptyMessage,

    #[error("Index unavailable: {0}")]
    Index(#[from] IndexError),

    #[error("Condensing the question failed: {0}")]
    Condense(ServiceError),

    #[error("Retrieving context failed: {0}")]
    Retrieve(ServiceError),

    #[error("Generating the answer failed: {0}")]
    Generate(ServiceError),

    #[error(transparent)]
    Transcript(#[from] CoreError),
}

impl TurnError {
    /// The turn stage that failed
    pub fn stage(&self) -> &'static str {
        match self {
            TurnError::EmptyMessage => "input",
            TurnError::Index(_) => "index",
            TurnError::Condense(_) => "condensing",
            TurnError::Retrieve(_) => "retrieving",
            TurnError::Generate(_) => "generating",
            TurnError::Transcript(_) => "transcript",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            TurnError::EmptyMessage => "empty_message",
            TurnError::Index(_) => "index_unavailable",
            TurnError::Condense(err) | TurnError::Retrieve(err) | TurnError::Generate(err) => {
                err.code()
            }
            TurnError::Transcript(_) => "internal",
        }
    }

    /// Whether sending the same message again may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            TurnError::Condense(err) | TurnError::Retrieve(err) | TurnError::Generate(err) => {
                err.is_transient()
            }
            TurnError::Index(IndexError::IndexBuildFailed(err)) => err.is_transient(),
            _ => false,
        }
    }
}
