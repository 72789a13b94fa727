//! Configuration management for fitchat
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.
//! Precedence, lowest to highest: built-in defaults, YAML file,
//! `FITCHAT_*` environment variables, command-line flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::{FitchatError, Result};
use crate::remote::retry::RetryPolicy;

/// Main configuration structure for fitchat
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote activity service settings
    #[serde(default)]
    pub remote: RemoteConfig,
    /// Synchronization behavior
    #[serde(default)]
    pub sync: SyncConfig,
    /// Local file locations
    #[serde(default)]
    pub storage: StorageConfig,
    /// LLM provider settings
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Chat grounding settings
    #[serde(default)]
    pub chat: ChatConfig,
}

/// Remote activity service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the activity service
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Account email; usually supplied through `FITCHAT_EMAIL`
    #[serde(default)]
    pub email: Option<String>,

    /// Account password; usually supplied through `FITCHAT_PASSWORD`
    #[serde(default, skip_serializing)]
    pub password: Option<String>,

    /// Per-request timeout (seconds)
    #[serde(default = "default_remote_timeout")]
    pub timeout_seconds: u64,
}

fn default_api_base() -> String {
    "https://connect.garmin.com".to_string()
}

fn default_remote_timeout() -> u64 {
    30
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            email: None,
            password: None,
            timeout_seconds: default_remote_timeout(),
        }
    }
}

/// Synchronization configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// How far back to look when syncing (days)
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,

    /// Activity summaries requested per page
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Activity type filter; `None` syncs every type
    #[serde(default = "default_activity_type")]
    pub activity_type: Option<String>,

    /// Derive a single lap from the summary when the service returns none
    #[serde(default = "default_synthesize_missing_laps")]
    pub synthesize_missing_laps: bool,

    /// Minimum gap between consecutive remote calls (milliseconds)
    #[serde(default = "default_min_call_interval_ms")]
    pub min_call_interval_ms: u64,

    /// Retry behavior for transient failures
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_lookback_days() -> u32 {
    180
}

fn default_page_size() -> u32 {
    100
}

fn default_activity_type() -> Option<String> {
    Some("running".to_string())
}

fn default_synthesize_missing_laps() -> bool {
    true
}

fn default_min_call_interval_ms() -> u64 {
    500
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            lookback_days: default_lookback_days(),
            page_size: default_page_size(),
            activity_type: default_activity_type(),
            synthesize_missing_laps: default_synthesize_missing_laps(),
            min_call_interval_ms: default_min_call_interval_ms(),
            retry: RetryConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Minimum inter-call delay as a [`Duration`]
    pub fn min_call_interval(&self) -> Duration {
        Duration::from_millis(self.min_call_interval_ms)
    }
}

/// Bounded exponential backoff settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry (milliseconds), doubled per attempt
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Cap on any single delay (milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    /// Build the runtime [`RetryPolicy`] from these settings
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

/// Local file locations
///
/// Both paths default to platform directories resolved through
/// `directories::ProjectDirs`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Snapshot file holding synchronized activities
    #[serde(default)]
    pub data_file: Option<PathBuf>,

    /// Credential file holding the reusable session token
    #[serde(default)]
    pub credentials_file: Option<PathBuf>,
}

impl StorageConfig {
    /// Resolve the snapshot path
    ///
    /// # Errors
    ///
    /// Returns `Config` if no override is set and the platform data
    /// directory cannot be determined
    pub fn data_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.data_file {
            return Ok(path.clone());
        }
        Ok(project_dirs()?.data_dir().join("activities.json"))
    }

    /// Resolve the credential file path
    ///
    /// # Errors
    ///
    /// Returns `Config` if no override is set and the platform config
    /// directory cannot be determined
    pub fn credentials_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.credentials_file {
            return Ok(path.clone());
        }
        Ok(project_dirs()?.config_dir().join("credentials.json"))
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("com", "fitchat", "fitchat").ok_or_else(|| {
        FitchatError::Config("Could not determine platform data directory".to_string()).into()
    })
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Type of provider to use ("ollama" or "gemini")
    #[serde(rename = "type", default = "default_provider_type")]
    pub provider_type: String,

    /// Sampling temperature passed to the provider
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Ollama configuration
    #[serde(default)]
    pub ollama: OllamaConfig,

    /// Gemini configuration
    #[serde(default)]
    pub gemini: GeminiConfig,
}

fn default_provider_type() -> String {
    "gemini".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider_type: default_provider_type(),
            temperature: default_temperature(),
            ollama: OllamaConfig::default(),
            gemini: GeminiConfig::default(),
        }
    }
}

/// Ollama provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Ollama server host
    #[serde(default = "default_ollama_host")]
    pub host: String,

    /// Model to use for Ollama
    #[serde(default = "default_ollama_model")]
    pub model: String,
}

fn default_ollama_host() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.2:latest".to_string()
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: default_ollama_host(),
            model: default_ollama_model(),
        }
    }
}

/// Gemini provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// API base URL (overridable for tests and proxies)
    #[serde(default = "default_gemini_api_base")]
    pub api_base: String,

    /// Model identifier
    #[serde(default = "default_gemini_model")]
    pub model: String,

    /// API key; usually supplied through `GOOGLE_API_KEY`
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

fn default_gemini_api_base() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_gemini_model() -> String {
    "gemini-3-flash-preview".to_string()
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_base: default_gemini_api_base(),
            model: default_gemini_model(),
            api_key: None,
        }
    }
}

/// Chat grounding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Maximum size of the grounding context (characters)
    #[serde(default = "default_context_budget")]
    pub context_budget_chars: usize,

    /// Maximum size of prior turns resent with each question (characters)
    #[serde(default = "default_history_budget")]
    pub history_budget_chars: usize,
}

fn default_context_budget() -> usize {
    120_000
}

fn default_history_budget() -> usize {
    24_000
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            context_budget_chars: default_context_budget(),
            history_budget_chars: default_history_budget(),
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| FitchatError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| FitchatError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(email) = std::env::var("FITCHAT_EMAIL") {
            self.remote.email = Some(email);
        }

        if let Ok(password) = std::env::var("FITCHAT_PASSWORD") {
            self.remote.password = Some(password);
        }

        if let Ok(api_base) = std::env::var("FITCHAT_API_BASE") {
            tracing::debug!(api_base = %api_base, "Env override: FITCHAT_API_BASE");
            self.remote.api_base = api_base;
        }

        if let Ok(provider_type) = std::env::var("FITCHAT_PROVIDER") {
            self.provider.provider_type = provider_type;
        }

        if let Ok(host) = std::env::var("FITCHAT_OLLAMA_HOST") {
            self.provider.ollama.host = host;
        }

        if let Ok(model) = std::env::var("FITCHAT_OLLAMA_MODEL") {
            self.provider.ollama.model = model;
        }

        if let Ok(model) = std::env::var("FITCHAT_GEMINI_MODEL") {
            self.provider.gemini.model = model;
        }

        if let Ok(key) =
            std::env::var("FITCHAT_GEMINI_API_KEY").or_else(|_| std::env::var("GOOGLE_API_KEY"))
        {
            self.provider.gemini.api_key = Some(key);
        }

        if let Ok(days) = std::env::var("FITCHAT_LOOKBACK_DAYS") {
            if let Ok(value) = days.parse() {
                self.sync.lookback_days = value;
            } else {
                tracing::warn!("Invalid FITCHAT_LOOKBACK_DAYS: {}", days);
            }
        }

        if let Ok(size) = std::env::var("FITCHAT_PAGE_SIZE") {
            if let Ok(value) = size.parse() {
                self.sync.page_size = value;
            } else {
                tracing::warn!("Invalid FITCHAT_PAGE_SIZE: {}", size);
            }
        }

        if let Ok(activity_type) = std::env::var("FITCHAT_ACTIVITY_TYPE") {
            self.sync.activity_type = match activity_type.trim() {
                "" | "all" | "*" => None,
                other => Some(other.to_string()),
            };
            tracing::debug!(activity_type = ?self.sync.activity_type, "Env override: FITCHAT_ACTIVITY_TYPE");
        }

        if let Ok(budget) = std::env::var("FITCHAT_CONTEXT_BUDGET") {
            if let Ok(value) = budget.parse() {
                self.chat.context_budget_chars = value;
            } else {
                tracing::warn!("Invalid FITCHAT_CONTEXT_BUDGET: {}", budget);
            }
        }

        if let Ok(path) = std::env::var("FITCHAT_DATA_FILE") {
            self.storage.data_file = Some(PathBuf::from(path));
        }

        if let Ok(path) = std::env::var("FITCHAT_CREDENTIALS_FILE") {
            self.storage.credentials_file = Some(PathBuf::from(path));
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        use crate::cli::Commands;

        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }

        match &cli.command {
            Commands::Sync {
                days,
                r#type,
                all_types,
            } => {
                if let Some(days) = days {
                    self.sync.lookback_days = *days;
                }
                if *all_types {
                    self.sync.activity_type = None;
                } else if let Some(kind) = r#type {
                    self.sync.activity_type = Some(kind.clone());
                }
            }
            Commands::Chat { provider, budget } => {
                if let Some(provider) = provider {
                    self.provider.provider_type = provider.clone();
                }
                if let Some(budget) = budget {
                    self.chat.context_budget_chars = *budget;
                }
            }
            Commands::Login | Commands::Logout | Commands::Status => {}
        }
    }

    /// Validate the configuration
    ///
    /// Ensures all configuration values are within acceptable ranges.
    ///
    /// # Errors
    ///
    /// Returns `Config` describing the first failed check
    pub fn validate(&self) -> Result<()> {
        let valid_providers = ["ollama", "gemini"];
        if !valid_providers.contains(&self.provider.provider_type.as_str()) {
            return Err(FitchatError::Config(format!(
                "Invalid provider type: {}. Must be one of: {}",
                self.provider.provider_type,
                valid_providers.join(", ")
            ))
            .into());
        }

        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return Err(FitchatError::Config(
                "provider.temperature must be between 0.0 and 2.0".to_string(),
            )
            .into());
        }

        if self.sync.lookback_days == 0 {
            return Err(FitchatError::Config(
                "sync.lookback_days must be greater than 0".to_string(),
            )
            .into());
        }

        if self.sync.page_size == 0 || self.sync.page_size > 1000 {
            return Err(FitchatError::Config(
                "sync.page_size must be between 1 and 1000".to_string(),
            )
            .into());
        }

        if self.sync.retry.max_delay_ms < self.sync.retry.base_delay_ms {
            return Err(FitchatError::Config(
                "sync.retry.max_delay_ms must not be less than base_delay_ms".to_string(),
            )
            .into());
        }

        if self.remote.timeout_seconds == 0 {
            return Err(FitchatError::Config(
                "remote.timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.chat.context_budget_chars == 0 {
            return Err(FitchatError::Config(
                "chat.context_budget_chars must be greater than 0".to_string(),
            )
            .into());
        }

        if self.chat.history_budget_chars == 0 {
            return Err(FitchatError::Config(
                "chat.history_budget_chars must be greater than 0".to_string(),
            )
            .into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn test_cli() -> crate::cli::Cli {
        crate::cli::Cli {
            config: None,
            verbose: false,
            command: crate::cli::Commands::Status,
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.provider.provider_type, "gemini");
        assert_eq!(config.provider.gemini.model, "gemini-3-flash-preview");
        assert_eq!(config.sync.lookback_days, 180);
        assert_eq!(config.sync.page_size, 100);
        assert_eq!(config.sync.activity_type.as_deref(), Some("running"));
        assert!((config.provider.temperature - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn test_config_validation_success() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_validation_invalid_provider() {
        let mut config = Config::default();
        config.provider.provider_type = "copilot".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Invalid provider type"));
    }

    #[test]
    fn test_config_validation_page_size_bounds() {
        let mut config = Config::default();
        config.sync.page_size = 0;
        assert!(config.validate().is_err());

        config.sync.page_size = 1001;
        assert!(config.validate().is_err());

        config.sync.page_size = 1000;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_zero_lookback() {
        let mut config = Config::default();
        config.sync.lookback_days = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_retry_delays() {
        let mut config = Config::default();
        config.sync.retry.base_delay_ms = 10_000;
        config.sync.retry.max_delay_ms = 1_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_budgets() {
        let mut config = Config::default();
        config.chat.context_budget_chars = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.chat.history_budget_chars = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
remote:
  api_base: http://localhost:9000
  email: runner@example.com
sync:
  lookback_days: 30
  page_size: 50
  activity_type: null
  retry:
    max_retries: 5
provider:
  type: ollama
  ollama:
    host: http://localhost:11434
    model: qwen3:latest
chat:
  context_budget_chars: 8000
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.remote.api_base, "http://localhost:9000");
        assert_eq!(config.remote.email.as_deref(), Some("runner@example.com"));
        assert_eq!(config.sync.lookback_days, 30);
        assert_eq!(config.sync.page_size, 50);
        assert!(config.sync.activity_type.is_none());
        assert_eq!(config.sync.retry.max_retries, 5);
        assert_eq!(config.sync.retry.base_delay_ms, 500);
        assert_eq!(config.provider.provider_type, "ollama");
        assert_eq!(config.provider.ollama.model, "qwen3:latest");
        assert_eq!(config.chat.context_budget_chars, 8000);
        assert_eq!(config.chat.history_budget_chars, 24_000);
    }

    #[test]
    fn test_password_is_never_serialized() {
        let mut config = Config::default();
        config.remote.password = Some("hunter2".to_string());
        config.provider.gemini.api_key = Some("secret-key".to_string());
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(!yaml.contains("hunter2"));
        assert!(!yaml.contains("secret-key"));
    }

    #[test]
    fn test_retry_policy_from_config() {
        let policy = RetryConfig::default().policy();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(500));
        assert_eq!(policy.max_delay, Duration::from_secs(30));
    }

    #[test]
    fn test_storage_overrides_win() {
        let storage = StorageConfig {
            data_file: Some(PathBuf::from("/tmp/a.json")),
            credentials_file: Some(PathBuf::from("/tmp/c.json")),
        };
        assert_eq!(storage.data_path().unwrap(), PathBuf::from("/tmp/a.json"));
        assert_eq!(
            storage.credentials_path().unwrap(),
            PathBuf::from("/tmp/c.json")
        );
    }

    #[test]
    #[serial]
    fn test_load_nonexistent_file_uses_defaults() {
        let config = Config::load("nonexistent.yaml", &test_cli()).unwrap();
        assert_eq!(config.sync.page_size, 100);
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        std::env::set_var("FITCHAT_PROVIDER", "ollama");
        std::env::set_var("FITCHAT_LOOKBACK_DAYS", "30");
        std::env::set_var("FITCHAT_PAGE_SIZE", "not-a-number");
        std::env::set_var("FITCHAT_ACTIVITY_TYPE", "all");

        let mut config = Config::default();
        config.apply_env_vars();

        std::env::remove_var("FITCHAT_PROVIDER");
        std::env::remove_var("FITCHAT_LOOKBACK_DAYS");
        std::env::remove_var("FITCHAT_PAGE_SIZE");
        std::env::remove_var("FITCHAT_ACTIVITY_TYPE");

        assert_eq!(config.provider.provider_type, "ollama");
        assert_eq!(config.sync.lookback_days, 30);
        assert_eq!(config.sync.page_size, 100);
        assert!(config.sync.activity_type.is_none());
    }

    #[test]
    fn test_cli_overrides_for_sync() {
        let mut config = Config::default();
        config.apply_cli_overrides(&crate::cli::Cli {
            config: None,
            verbose: false,
            command: crate::cli::Commands::Sync {
                days: Some(30),
                r#type: Some("cycling".to_string()),
                all_types: false,
            },
        });
        assert_eq!(config.sync.lookback_days, 30);
        assert_eq!(config.sync.activity_type.as_deref(), Some("cycling"));

        config.apply_cli_overrides(&crate::cli::Cli {
            config: None,
            verbose: false,
            command: crate::cli::Commands::Sync {
                days: None,
                r#type: None,
                all_types: true,
            },
        });
        assert_eq!(config.sync.lookback_days, 30);
        assert!(config.sync.activity_type.is_none());
    }

    #[test]
    fn test_cli_overrides_for_chat() {
        let mut config = Config::default();
        config.apply_cli_overrides(&crate::cli::Cli {
            config: None,
            verbose: true,
            command: crate::cli::Commands::Chat {
                provider: Some("ollama".to_string()),
                budget: Some(5000),
            },
        });
        assert_eq!(config.provider.provider_type, "ollama");
        assert_eq!(config.chat.context_budget_chars, 5000);
    }
}
