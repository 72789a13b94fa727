//! Scripted in-memory chat provider
//!
//! [`ScriptedProvider`] answers from a queue of canned replies and records
//! every request, so chat sessions can be tested without a model. When the
//! queue is empty it answers `"ok"`.
//!
//! # Example
//!
//! ```
//! use fitchat::providers::{ChatProvider, ScriptedProvider};
//!
//! # tokio_test::block_on(async {
//! let provider = ScriptedProvider::new();
//! provider.push_reply("42 km");
//! assert_eq!(provider.send_turn(&[], "how far?").await.unwrap(), "42 km");
//! assert_eq!(provider.call_count(), 1);
//! # });
//! ```

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::{FitchatError, Result};
use crate::providers::{ChatProvider, Message};

#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Fail { message: String, retryable: bool },
}

/// A request the provider received
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedTurn {
    pub history: Vec<Message>,
    pub new_message: String,
}

#[derive(Debug, Default)]
struct ScriptState {
    replies: VecDeque<Reply>,
    calls: Vec<RecordedTurn>,
}

/// Chat provider driven by a reply queue.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    state: Mutex<ScriptState>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue a successful reply
    pub fn push_reply(&self, text: impl Into<String>) {
        self.lock().replies.push_back(Reply::Text(text.into()));
    }

    /// Queue a failure
    pub fn push_failure(&self, message: impl Into<String>, retryable: bool) {
        self.lock().replies.push_back(Reply::Fail {
            message: message.into(),
            retryable,
        });
    }

    /// Number of `send_turn` calls so far
    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    /// Every request received, oldest first
    pub fn calls(&self) -> Vec<RecordedTurn> {
        self.lock().calls.clone()
    }

    /// The most recent request
    pub fn last_call(&self) -> Option<RecordedTurn> {
        self.lock().calls.last().cloned()
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    async fn send_turn(&self, history: &[Message], new_message: &str) -> Result<String> {
        let mut state = self.lock();
        state.calls.push(RecordedTurn {
            history: history.to_vec(),
            new_message: new_message.to_string(),
        });
        match state.replies.pop_front() {
            None => Ok("ok".to_string()),
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Fail { message, retryable }) => {
                Err(FitchatError::Llm { message, retryable }.into())
            }
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted"
    }
}
