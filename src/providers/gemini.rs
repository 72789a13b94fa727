//! Google Gemini provider
//!
//! Uses the `generateContent` REST endpoint. System messages from the
//! history are folded into `systemInstruction`; assistant turns are sent
//! with the `model` role.

use crate::config::GeminiConfig;
use crate::error::{FitchatError, Result};
use crate::providers::base::{send_error, status_error};
use crate::providers::{ChatProvider, Message};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Gemini API provider
pub struct GeminiProvider {
    client: Client,
    config: GeminiConfig,
    api_key: String,
    temperature: f32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}

impl GeminiProvider {
    /// Create a new Gemini provider
    ///
    /// # Errors
    ///
    /// Returns `MissingCredentials` when no API key is configured, or
    /// `Config` if the HTTP client cannot be built
    pub fn new(config: GeminiConfig, temperature: f32) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                FitchatError::MissingCredentials(
                    "Gemini API key not set (GOOGLE_API_KEY or FITCHAT_GEMINI_API_KEY)".to_string(),
                )
            })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .user_agent(concat!("fitchat/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FitchatError::Config(format!("Failed to create HTTP client: {}", e)))?;

        tracing::info!("Initialized Gemini provider: model={}", config.model);

        Ok(Self {
            client,
            config,
            api_key,
            temperature,
        })
    }

    fn build_request(&self, history: &[Message], new_message: &str) -> GenerateContentRequest {
        let system: Vec<&str> = history
            .iter()
            .filter(|m| m.role == "system")
            .map(|m| m.content.as_str())
            .collect();
        let system_instruction = (!system.is_empty()).then(|| Content {
            role: None,
            parts: vec![Part {
                text: system.join("\n\n"),
            }],
        });

        let contents = history
            .iter()
            .filter(|m| m.role != "system")
            .map(|m| Content {
                role: Some(if m.role == "assistant" { "model" } else { "user" }.to_string()),
                parts: vec![Part {
                    text: m.content.clone(),
                }],
            })
            .chain(std::iter::once(Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: new_message.to_string(),
                }],
            }))
            .collect();

        GenerateContentRequest {
            contents,
            system_instruction,
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
        }
    }
}

fn error_detail(body: &str) -> String {
    serde_json::from_str::<ErrorWrapper>(body)
        .ok()
        .and_then(|w| match (w.error.status, w.error.message) {
            (Some(status), Some(message)) => Some(format!("{}: {}", status, message)),
            (None, Some(message)) => Some(message),
            (Some(status), None) => Some(status),
            (None, None) => None,
        })
        .unwrap_or_else(|| body.to_string())
}

#[async_trait]
impl ChatProvider for GeminiProvider {
    async fn send_turn(&self, history: &[Message], new_message: &str) -> Result<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.api_base.trim_end_matches('/'),
            self.config.model
        );
        let request = self.build_request(history, new_message);
        tracing::debug!("Sending Gemini request: {} contents", request.contents.len());

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                // Strip the URL, it carries the key.
                let e = e.without_url();
                tracing::error!("Gemini request failed: {}", e);
                send_error("Gemini", e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Gemini returned error {}", status);
            return Err(status_error("Gemini", status.as_u16(), &error_detail(&body)));
        }

        let parsed: GenerateContentResponse = response.json().await.map_err(|e| FitchatError::Llm {
            message: format!("Failed to parse Gemini response: {}", e.without_url()),
            retryable: false,
        })?;

        parsed
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .find_map(|p| p.text)
            .ok_or_else(|| {
                FitchatError::Llm {
                    message: "Gemini returned no text in the response candidates".to_string(),
                    retryable: true,
                }
                .into()
            })
    }

    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}
