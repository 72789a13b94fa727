//! LLM providers
//!
//! The [`ChatProvider`] abstraction plus implementations for Ollama and
//! Google Gemini, and a scripted provider for tests.

pub mod base;
pub mod gemini;
pub mod ollama;
pub mod scripted;

pub use base::{ChatProvider, Message};
pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;
pub use scripted::ScriptedProvider;

use crate::config::ProviderConfig;
use crate::error::{FitchatError, Result};

/// Create a provider instance from configuration
///
/// # Arguments
///
/// * `config` - Provider configuration
/// * `provider_override` - Provider type to use instead of `config.provider_type`
///
/// # Errors
///
/// Returns `Config` for an unknown provider type, or the provider's own
/// construction error (e.g. a missing Gemini API key)
///
/// # Examples
///
/// ```
/// use fitchat::config::ProviderConfig;
/// use fitchat::providers::create_provider;
///
/// let config = ProviderConfig::default();
/// let provider = create_provider(&config, Some("ollama")).unwrap();
/// assert_eq!(provider.name(), "ollama");
/// ```
pub fn create_provider(
    config: &ProviderConfig,
    provider_override: Option<&str>,
) -> Result<Box<dyn ChatProvider>> {
    let provider_type = provider_override.unwrap_or(&config.provider_type);

    match provider_type {
        "ollama" => Ok(Box::new(OllamaProvider::new(
            config.ollama.clone(),
            config.temperature,
        )?)),
        "gemini" => Ok(Box::new(GeminiProvider::new(
            config.gemini.clone(),
            config.temperature,
        )?)),
        _ => Err(FitchatError::Config(format!(
            "Unknown provider type: {}",
            provider_type
        ))
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_provider_invalid_type() {
        let result = create_provider(&ProviderConfig::default(), Some("invalid"));
        assert!(result.is_err());
    }

    #[test]
    fn test_create_provider_uses_config_type() {
        let config = ProviderConfig {
            provider_type: "ollama".to_string(),
            ..ProviderConfig::default()
        };
        let provider = create_provider(&config, None).unwrap();
        assert_eq!(provider.name(), "ollama");
        assert_eq!(provider.model(), "llama3.2:latest");
    }

    #[test]
    fn test_create_provider_override_wins() {
        let mut config = ProviderConfig::default();
        config.provider_type = "ollama".to_string();
        config.gemini.api_key = Some("k".to_string());
        let provider = create_provider(&config, Some("gemini")).unwrap();
        assert_eq!(provider.name(), "gemini");
    }

    #[test]
    fn test_gemini_without_key_fails() {
        let config = ProviderConfig::default();
        assert!(create_provider(&config, Some("gemini")).is_err());
    }
}
