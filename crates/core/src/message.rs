//! Chat messages and the append-only transcript

use crate::{CoreError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of the message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Human/user message
    User,
    /// Assistant reply
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,

    pub content: String,

    /// When the message was appended
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// Ordered, append-only conversation history.
///
/// Starts with a synthetic assistant greeting. Every later assistant
/// message answers the user message directly before it, so two assistant
/// messages never appear back to back.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    /// Create a transcript holding only the greeting
    pub fn with_greeting(greeting: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::assistant(greeting)],
        }
    }

    pub fn push_user(&mut self, content: impl Into<String>) -> &ChatMessage {
        self.messages.push(ChatMessage::user(content));
        &self.messages[self.messages.len() - 1]
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) -> Result<&ChatMessage> {
        if matches!(self.last().map(|m| m.role), Some(Role::Assistant)) {
            return Err(CoreError::ConsecutiveAssistantMessage);
        }
        self.messages.push(ChatMessage::assistant(content));
        Ok(&self.messages[self.messages.len() - 1])
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Whether a user message has already been answered, i.e. there is a
    /// real exchange beyond the greeting.
    pub fn has_exchange(&self) -> bool {
        let mut seen_user = false;
        for message in &self.messages {
            match message.role {
                Role::User => seen_user = true,
                Role::Assistant if seen_user => return true,
                Role::Assistant => {}
            }
        }
        false
    }

    pub fn to_vec(&self) -> Vec<ChatMessage> {
        self.messages.clone()
    }
}
