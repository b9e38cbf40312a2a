//! Error types for the core domain

use std::time::Duration;
use thiserror::Error;

/// Core domain errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Transcript already ends with an assistant message")]
    ConsecutiveAssistantMessage,
}

/// Failures reported by the hosted embedding and generation services.
///
/// `Clone` so that one failed index build can be handed to every caller
/// that was waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Credential rejected: {0}")]
    Unauthorized(String),

    #[error("Content filtered: {0}")]
    ContentFiltered(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
}

impl ServiceError {
    /// Whether trying the same request again later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ServiceError::ServiceUnavailable(_)
                | ServiceError::QuotaExceeded(_)
                | ServiceError::Timeout(_)
        )
    }

    /// Short machine-readable name, used in error descriptors.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::ServiceUnavailable(_) => "service_unavailable",
            ServiceError::QuotaExceeded(_) => "quota_exceeded",
            ServiceError::InvalidInput(_) => "invalid_input",
            ServiceError::Unauthorized(_) => "unauthorized",
            ServiceError::ContentFiltered(_) => "content_filtered",
            ServiceError::Timeout(_) => "timeout",
        }
    }
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ServiceError::ServiceUnavailable("down".into()).is_transient());
        assert!(ServiceError::QuotaExceeded("429".into()).is_transient());
        assert!(ServiceError::Timeout(Duration::from_secs(5)).is_transient());
        assert!(!ServiceError::InvalidInput("bad".into()).is_transient());
        assert!(!ServiceError::ContentFiltered("SAFETY".into()).is_transient());
        assert!(!ServiceError::Unauthorized("403".into()).is_transient());
    }

    #[test]
    fn test_transcript_error_message() {
        assert_eq!(
            CoreError::ConsecutiveAssistantMessage.to_string(),
            "Transcript already ends with an assistant message"
        );
    }

    #[test]
    fn test_codes() {
        assert_eq!(ServiceError::QuotaExceeded(String::new()).code(), "quota_exceeded");
        assert_eq!(
            ServiceError::Timeout(Duration::from_millis(1)).code(),
            "timeout"
        );
        assert_eq!(ServiceError::Unauthorized(String::new()).code(), "unauthorized");
    }
}
