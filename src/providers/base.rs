//! Provider trait and message type shared by all LLM backends
//!
//! Only plain role/content pairs cross this boundary. Providers translate
//! them into their own wire format and map failures to
//! [`FitchatError::Llm`](crate::error::FitchatError::Llm), flagging whether
//! the same request may succeed when repeated.

use crate::error::{FitchatError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One entry of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the sender (`system`, `user` or `assistant`)
    pub role: String,
    /// Message text
    pub content: String,
}

impl Message {
    /// Creates a new user message
    ///
    /// # Examples
    ///
    /// ```
    /// use fitchat::providers::Message;
    ///
    /// let msg = Message::user("How far did I run last week?");
    /// assert_eq!(msg.role, "user");
    /// ```
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Creates a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }

    /// Creates a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// Length of the content in characters
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// A chat-capable LLM backend
///
/// Implementations must be stateless between calls: everything the model
/// should see is passed in `history`.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Send one user turn and return the model's reply text
    ///
    /// # Arguments
    ///
    /// * `history` - Prior messages, oldest first; may start with a system message
    /// * `new_message` - The user's new question
    ///
    /// # Errors
    ///
    /// Returns `Llm { retryable }` on any provider failure
    async fn send_turn(&self, history: &[Message], new_message: &str) -> Result<String>;

    /// Short provider name for display and logs
    fn name(&self) -> &str;

    /// Model identifier in use
    fn model(&self) -> &str;
}

/// Build an `Llm` error from an HTTP status and response body.
///
/// 429 and 5xx are retryable; everything else (bad key, bad request,
/// unknown model) is not.
pub(crate) fn status_error(provider: &str, status: u16, body: &str) -> anyhow::Error {
    let retryable = status == 429 || (500..600).contains(&status);
    let body = body.trim();
    let detail = if body.is_empty() {
        String::new()
    } else {
        format!(": {}", truncate(body, 300))
    };
    FitchatError::Llm {
        message: format!("{} returned HTTP {}{}", provider, status, detail),
        retryable,
    }
    .into()
}

/// Build an `Llm` error from a failed send.
pub(crate) fn send_error(provider: &str, err: reqwest::Error) -> anyhow::Error {
    FitchatError::Llm {
        message: format!("{} request failed: {}", provider, err),
        retryable: err.is_timeout() || err.is_connect(),
    }
    .into()
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retryable(err: &anyhow::Error) -> Option<bool> {
        match err.downcast_ref::<FitchatError>() {
            Some(FitchatError::Llm { retryable, .. }) => Some(*retryable),
            _ => None,
        }
    }

    #[test]
    fn test_message_constructors() {
        assert_eq!(Message::system("s").role, "system");
        assert_eq!(Message::assistant("a").role, "assistant");
        assert_eq!(Message::user("ü").char_len(), 1);
    }

    #[test]
    fn test_status_error_classification() {
        assert_eq!(retryable(&status_error("gemini", 503, "")), Some(true));
        assert_eq!(retryable(&status_error("gemini", 429, "slow down")), Some(true));
        assert_eq!(retryable(&status_error("gemini", 403, "API key invalid")), Some(false));
        assert_eq!(retryable(&status_error("ollama", 404, "model not found")), Some(false));
    }

    #[test]
    fn test_status_error_message_truncates_body() {
        let body = "x".repeat(1000);
        let msg = status_error("ollama", 500, &body).to_string();
        assert!(msg.contains("HTTP 500"));
        assert!(msg.len() < 400);
    }
}
