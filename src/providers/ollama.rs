//! Ollama provider
//!
//! Talks to a local or remote Ollama server through `/api/chat` with
//! streaming disabled.

use crate::config::OllamaConfig;
use crate::error::{FitchatError, Result};
use crate::providers::base::{send_error, status_error};
use crate::providers::{ChatProvider, Message};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Ollama API provider
///
/// # Examples
///
/// ```no_run
/// use fitchat::config::OllamaConfig;
/// use fitchat::providers::{ChatProvider, OllamaProvider};
///
/// # async fn example() -> fitchat::error::Result<()> {
/// let provider = OllamaProvider::new(OllamaConfig::default(), 0.2)?;
/// let reply = provider.send_turn(&[], "Hello!").await?;
/// # Ok(())
/// # }
/// ```
pub struct OllamaProvider {
    client: Client,
    config: OllamaConfig,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: usize,
    #[serde(default)]
    eval_count: usize,
}

impl OllamaProvider {
    /// Create a new Ollama provider
    ///
    /// # Errors
    ///
    /// Returns `Config` if the HTTP client cannot be built
    pub fn new(config: OllamaConfig, temperature: f32) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .user_agent(concat!("fitchat/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FitchatError::Config(format!("Failed to create HTTP client: {}", e)))?;

        tracing::info!(
            "Initialized Ollama provider: host={}, model={}",
            config.host,
            config.model
        );

        Ok(Self {
            client,
            config,
            temperature,
        })
    }

    /// Configured Ollama host
    pub fn host(&self) -> &str {
        &self.config.host
    }

    fn convert_messages(history: &[Message], new_message: &str) -> Vec<OllamaMessage> {
        history
            .iter()
            .map(|m| OllamaMessage {
                role: m.role.clone(),
                content: m.content.clone(),
            })
            .chain(std::iter::once(OllamaMessage {
                role: "user".to_string(),
                content: new_message.to_string(),
            }))
            .collect()
    }
}

#[async_trait]
impl ChatProvider for OllamaProvider {
    async fn send_turn(&self, history: &[Message], new_message: &str) -> Result<String> {
        let url = format!("{}/api/chat", self.config.host.trim_end_matches('/'));
        let request = OllamaRequest {
            model: &self.config.model,
            messages: Self::convert_messages(history, new_message),
            stream: false,
            options: OllamaOptions {
                temperature: self.temperature,
            },
        };

        tracing::debug!("Sending Ollama request: {} messages", request.messages.len());

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Ollama request failed: {}", e);
                send_error("Ollama", e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("Ollama returned error {}", status);
            return Err(status_error("Ollama", status.as_u16(), &error_text));
        }

        let ollama_response: OllamaResponse = response.json().await.map_err(|e| {
            tracing::error!("Failed to parse Ollama response: {}", e);
            FitchatError::Llm {
                message: format!("Failed to parse Ollama response: {}", e),
                retryable: false,
            }
        })?;

        tracing::debug!(
            "Ollama response: done={}, prompt_tokens={}, completion_tokens={}",
            ollama_response.done,
            ollama_response.prompt_eval_count,
            ollama_response.eval_count
        );

        Ok(ollama_response.message.content)
    }

    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}
