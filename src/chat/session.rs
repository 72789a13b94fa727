//! Multi-turn, grounded chat session
//!
//! A [`ChatSession`] moves through `Idle → Active → Closed`. Every request
//! to the provider carries, in order:
//!
//! 1. a system instruction
//! 2. a user preamble holding the grounding text
//! 3. an assistant acknowledgement
//! 4. the most recent turns that fit the history budget
//!
//! Older turns stay in [`ConversationState`] but are not resent.

use std::sync::Arc;
use std::time::Duration;

use crate::chat::GroundingContext;
use crate::config::Config;
use crate::error::{self, FitchatError, Result};
use crate::providers::{ChatProvider, Message};
use crate::remote::{retry, RetryPolicy, Throttle};

const SYSTEM_INSTRUCTION: &str = "You are a specialized running and fitness analyst. \
The user has provided their activity data below. \
You must use this data to answer every question and must not claim you lack access to it. \
Answer specifically about the activities, laps, heart rate and pace found in the data. \
If something is not in the data (gear, weather, shoes), say that it is not provided.";

const DATA_PREAMBLE: &str = "Here is my activity data. \
Please analyze it and answer my questions based only on it.";

const ACKNOWLEDGEMENT: &str = "I have received your activity data and am ready to answer \
questions about your activities, laps, heart rate and pace based on it.";

/// Lifecycle of a [`ChatSession`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active,
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Active => write!(f, "active"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// One completed question/answer exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub question: String,
    pub answer: String,
}

impl Turn {
    fn char_len(&self) -> usize {
        self.question.chars().count() + self.answer.chars().count()
    }
}

/// Every completed exchange of a session, oldest first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationState {
    turns: Vec<Turn>,
}

impl ConversationState {
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    fn push(&mut self, question: &str, answer: &str) {
        self.turns.push(Turn {
            question: question.to_string(),
            answer: answer.to_string(),
        });
    }

    /// Newest turns whose combined size stays within `budget` characters,
    /// returned oldest first.
    fn recent_within(&self, budget: usize) -> &[Turn] {
        let mut used = 0usize;
        let mut start = self.turns.len();
        for (i, turn) in self.turns.iter().enumerate().rev() {
            let len = turn.char_len();
            if used + len > budget {
                break;
            }
            used += len;
            start = i;
        }
        &self.turns[start..]
    }
}

/// Tunables for a chat session
#[derive(Debug, Clone)]
pub struct ChatSessionConfig {
    /// Characters of prior turns resent with each question
    pub history_budget_chars: usize,
    /// Retry policy for transient provider failures
    pub retry: RetryPolicy,
}

impl Default for ChatSessionConfig {
    fn default() -> Self {
        Self {
            history_budget_chars: 24_000,
            retry: RetryPolicy::default(),
        }
    }
}

impl From<&Config> for ChatSessionConfig {
    fn from(config: &Config) -> Self {
        Self {
            history_budget_chars: config.chat.history_budget_chars,
            retry: config.sync.retry.policy(),
        }
    }
}

/// Grounded conversation with an LLM provider
pub struct ChatSession {
    provider: Arc<dyn ChatProvider>,
    config: ChatSessionConfig,
    throttle: Throttle,
    state: SessionState,
    context: Option<GroundingContext>,
    conversation: ConversationState,
}

impl ChatSession {
    /// Create an idle session
    pub fn new(provider: Arc<dyn ChatProvider>, config: ChatSessionConfig) -> Self {
        Self {
            provider,
            config,
            throttle: Throttle::new(Duration::ZERO),
            state: SessionState::Idle,
            context: None,
            conversation: ConversationState::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn conversation(&self) -> &ConversationState {
        &self.conversation
    }

    /// Grounding context in use, once started
    pub fn context(&self) -> Option<&GroundingContext> {
        self.context.as_ref()
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    /// Ground the session and make it active
    ///
    /// No provider call is made; the grounding is sent with the first
    /// question.
    ///
    /// # Errors
    ///
    /// - `InvalidState` if the session is not idle
    /// - `NoDataAvailable` if `context` holds no activities
    pub fn start(&mut self, context: GroundingContext) -> Result<()> {
        if self.state != SessionState::Idle {
            return Err(FitchatError::InvalidState(format!(
                "cannot start a session that is {}",
                self.state
            ))
            .into());
        }
        check_has_data(&context)?;

        tracing::info!(
            provider = self.provider.name(),
            activities = context.included_activities,
            truncated = context.truncated,
            context_chars = context.char_len(),
            "Chat session started"
        );
        self.context = Some(context);
        self.state = SessionState::Active;
        Ok(())
    }

    /// Ask a question and return the answer
    ///
    /// Transient provider failures are retried. On failure the
    /// conversation is left exactly as it was.
    ///
    /// # Errors
    ///
    /// - `InvalidState` unless the session is active
    /// - `Llm { retryable: true }` when retries are exhausted
    /// - `Llm { retryable: false }` for a permanent failure; the session is
    ///   closed
    pub async fn ask(&mut self, message: &str) -> Result<String> {
        if self.state != SessionState::Active {
            return Err(FitchatError::InvalidState(format!(
                "cannot ask in a session that is {}",
                self.state
            ))
            .into());
        }

        let history = self.build_history()?;
        tracing::debug!(
            messages = history.len(),
            resent_turns = history.len().saturating_sub(3),
            "Sending chat turn"
        );

        let provider = self.provider.as_ref();
        let history_ref = history.as_slice();
        let outcome = retry::with_retry(&self.config.retry, &self.throttle, "chat", move || {
            provider.send_turn(history_ref, message)
        })
        .await;

        match outcome {
            Ok(answer) => {
                self.conversation.push(message, &answer);
                Ok(answer)
            }
            Err(e) => {
                if is_permanent_llm_failure(&e) {
                    tracing::error!("Provider failed permanently, closing session: {}", e);
                    self.state = SessionState::Closed;
                } else {
                    tracing::warn!("Chat turn failed: {}", e);
                }
                Err(e)
            }
        }
    }

    /// Replace the grounding context for subsequent questions
    ///
    /// Prior turns are kept.
    ///
    /// # Errors
    ///
    /// - `InvalidState` unless the session is active
    /// - `NoDataAvailable` if `context` holds no activities; the previous
    ///   context stays in place
    pub fn reground(&mut self, context: GroundingContext) -> Result<()> {
        if self.state != SessionState::Active {
            return Err(FitchatError::InvalidState(format!(
                "cannot reground a session that is {}",
                self.state
            ))
            .into());
        }
        check_has_data(&context)?;
        tracing::info!(activities = context.included_activities, "Chat session regrounded");
        self.context = Some(context);
        Ok(())
    }

    /// Close the session. Closing twice is a no-op.
    pub fn close(&mut self) {
        if self.state != SessionState::Closed {
            tracing::info!(turns = self.conversation.len(), "Chat session closed");
        }
        self.state = SessionState::Closed;
    }

    fn build_history(&self) -> Result<Vec<Message>> {
        let context = self
            .context
            .as_ref()
            .ok_or_else(|| FitchatError::InvalidState("session has no grounding context".to_string()))?;

        let mut history = vec![
            Message::system(SYSTEM_INSTRUCTION),
            Message::user(format!(
                "{}\n\n--- DATA START ---\n{}\n--- DATA END ---",
                DATA_PREAMBLE, context.text
            )),
            Message::assistant(ACKNOWLEDGEMENT),
        ];
        for turn in self.conversation.recent_within(self.config.history_budget_chars) {
            history.push(Message::user(turn.question.clone()));
            history.push(Message::assistant(turn.answer.clone()));
        }
        Ok(history)
    }
}

fn check_has_data(context: &GroundingContext) -> Result<()> {
    if context.has_no_data() {
        return Err(FitchatError::NoDataAvailable(
            "the local store is empty; run `fitchat sync` first".to_string(),
        )
        .into());
    }
    Ok(())
}

fn is_permanent_llm_failure(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<FitchatError>(),
        Some(FitchatError::Llm {
            retryable: false,
            ..
        })
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ScriptedProvider;

    fn context(activities: usize) -> GroundingContext {
        GroundingContext {
            text: "# Activity data\n- 2024-07-01 | running | 10.00 km".to_string(),
            truncated: false,
            included_activities: activities,
            omitted_activities: 0,
            total_activities: activities,
        }
    }

    fn session(provider: Arc<ScriptedProvider>, history_budget: usize) -> ChatSession {
        ChatSession::new(
            provider,
            ChatSessionConfig {
                history_budget_chars: history_budget,
                retry: RetryPolicy {
                    max_retries: 2,
                    base_delay: Duration::from_millis(1),
                    max_delay: Duration::from_millis(2),
                },
            },
        )
    }

    #[test]
    fn test_recent_within_keeps_newest() {
        let mut conversation = ConversationState::default();
        conversation.push("aaaa", "bbbb");
        conversation.push("cc", "dd");
        conversation.push("e", "f");
        assert_eq!(conversation.recent_within(6).len(), 2);
        assert_eq!(conversation.recent_within(6)[0].question, "cc");
        assert_eq!(conversation.recent_within(1).len(), 0);
        assert_eq!(conversation.recent_within(1000).len(), 3);
    }

    #[tokio::test]
    async fn test_history_layout() {
        let provider = Arc::new(ScriptedProvider::new());
        let mut chat = session(provider.clone(), 10_000);
        chat.start(context(1)).unwrap();
        chat.ask("first?").await.unwrap();
        chat.ask("second?").await.unwrap();

        let call = provider.last_call().unwrap();
        assert_eq!(call.new_message, "second?");
        let roles: Vec<&str> = call.history.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, ["system", "user", "assistant", "user", "assistant"]);
        assert!(call.history[1].content.contains("--- DATA START ---"));
        assert!(call.history[1].content.contains("10.00 km"));
        assert_eq!(call.history[3].content, "first?");
    }

    #[tokio::test]
    async fn test_history_budget_limits_resent_turns() {
        let provider = Arc::new(ScriptedProvider::new());
        let mut chat = session(provider.clone(), 0);
        chat.start(context(1)).unwrap();
        chat.ask("first?").await.unwrap();
        chat.ask("second?").await.unwrap();

        assert_eq!(provider.last_call().unwrap().history.len(), 3);
        assert_eq!(chat.conversation().len(), 2);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_failure("overloaded", true);
        provider.push_reply("fine");
        let mut chat = session(provider.clone(), 10_000);
        chat.start(context(1)).unwrap();

        assert_eq!(chat.ask("q").await.unwrap(), "fine");
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_reground_swaps_context() {
        let provider = Arc::new(ScriptedProvider::new());
        let mut chat = session(provider.clone(), 10_000);
        chat.start(context(1)).unwrap();

        let mut fresh = context(2);
        fresh.text = "# Activity data\nfresh".to_string();
        chat.reground(fresh).unwrap();
        chat.ask("q").await.unwrap();
        assert!(provider.last_call().unwrap().history[1].content.contains("fresh"));

        assert!(chat.reground(context(0)).is_err());
        assert_eq!(chat.context().unwrap().total_activities, 2);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut chat = session(Arc::new(ScriptedProvider::new()), 10);
        chat.close();
        chat.close();
        assert_eq!(chat.state(), SessionState::Closed);
    }
}
