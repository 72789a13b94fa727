//! Error types for fitchat
//!
//! This module defines the error taxonomy used throughout the application,
//! using `thiserror` for ergonomic error handling. Fallible functions return
//! [`Result`], an `anyhow` alias; callers that need to branch on the kind of
//! failure use `downcast_ref::<FitchatError>()`.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for fitchat operations
///
/// Covers authentication against the remote activity service, transport and
/// rate-limit failures, local store corruption, LLM provider failures and
/// misuse of the chat session state machine.
#[derive(Error, Debug)]
pub enum FitchatError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid credentials, or a refresh/re-login that could not recover
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// The remote service asked for a second factor and no interactive
    /// completion was possible
    #[error("Multi-factor authentication required (challenge {challenge_id}); run `fitchat login`")]
    MfaRequired {
        /// Identifier of the pending challenge
        challenge_id: String,
    },

    /// An MFA code was rejected, or no matching challenge is pending
    #[error("MFA error: {0}")]
    Mfa(String),

    /// Network, connection or server-side failure talking to a remote service
    #[error("Transport error: {0}")]
    Transport(String),

    /// The remote service throttled us
    #[error("Rate limited by remote service (retry after {retry_after_secs:?}s)")]
    RateLimited {
        /// Server-suggested wait, when one was provided
        retry_after_secs: Option<u64>,
    },

    /// The remote service refused a request for a reason retrying will not fix
    #[error("Remote service rejected request ({status}): {message}")]
    RemoteRejected {
        /// HTTP status code
        status: u16,
        /// Response body or summary
        message: String,
    },

    /// Lap detail for a single activity could not be fetched
    #[error("{reason}")]
    PartialSync {
        /// Activity whose detail fetch failed
        activity_id: u64,
        /// Human readable reason recorded in the sync result
        reason: String,
    },

    /// The local store exists but cannot be read back
    #[error("Local store at {} is corrupt: {reason}. Delete the file and run `fitchat sync` again", path.display())]
    StoreCorruption {
        /// Path of the offending file
        path: PathBuf,
        /// What went wrong while reading it
        reason: String,
    },

    /// LLM provider failure
    #[error("LLM error: {message}")]
    Llm {
        /// Provider supplied or transport message
        message: String,
        /// Whether the same request may succeed if repeated
        retryable: bool,
    },

    /// Operation not permitted in the current chat session state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Chat was requested but there is nothing to ground it on
    #[error("No activity data available: {0}")]
    NoDataAvailable(String),

    /// Missing credentials for the remote service or a provider
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl FitchatError {
    /// Returns `true` for failures that a bounded retry may resolve.
    pub fn is_transient(&self) -> bool {
        match self {
            FitchatError::Transport(_) | FitchatError::RateLimited { .. } => true,
            FitchatError::Llm { retryable, .. } => *retryable,
            FitchatError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

/// Result type alias for fitchat operations
///
/// Uses `anyhow::Error` as the error type so that context can be attached
/// while the underlying [`FitchatError`] stays reachable via downcasting.
pub type Result<T> = anyhow::Result<T>;

/// Returns `true` when `err` wraps a transient [`FitchatError`].
pub fn is_transient(err: &anyhow::Error) -> bool {
    err.downcast_ref::<FitchatError>()
        .map(FitchatError::is_transient)
        .unwrap_or(false)
}

/// Returns the server-suggested wait carried by a rate-limit error.
pub fn retry_after(err: &anyhow::Error) -> Option<std::time::Duration> {
    match err.downcast_ref::<FitchatError>() {
        Some(FitchatError::RateLimited {
            retry_after_secs: Some(secs),
        }) => Some(std::time::Duration::from_secs(*secs)),
        _ => None,
    }
}

/// Returns `true` when `err` is an authentication rejection.
pub fn is_authentication(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<FitchatError>(),
        Some(FitchatError::Authentication(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let error = FitchatError::Config("invalid format".to_string());
        assert_eq!(error.to_string(), "Configuration error: invalid format");
    }

    #[test]
    fn test_mfa_required_mentions_login() {
        let error = FitchatError::MfaRequired {
            challenge_id: "c-1".to_string(),
        };
        let s = error.to_string();
        assert!(s.contains("c-1"));
        assert!(s.contains("fitchat login"));
    }

    #[test]
    fn test_store_corruption_display_names_path() {
        let error = FitchatError::StoreCorruption {
            path: PathBuf::from("/tmp/activities.json"),
            reason: "expected value".to_string(),
        };
        let s = error.to_string();
        assert!(s.contains("/tmp/activities.json"));
        assert!(s.contains("expected value"));
    }

    #[test]
    fn test_partial_sync_displays_reason_only() {
        let error = FitchatError::PartialSync {
            activity_id: 7,
            reason: "laps unavailable".to_string(),
        };
        assert_eq!(error.to_string(), "laps unavailable");
    }

    #[test]
    fn test_transient_classification() {
        assert!(FitchatError::Transport("reset".to_string()).is_transient());
        assert!(FitchatError::RateLimited {
            retry_after_secs: None
        }
        .is_transient());
        assert!(FitchatError::Llm {
            message: "overloaded".to_string(),
            retryable: true
        }
        .is_transient());
        assert!(!FitchatError::Llm {
            message: "bad key".to_string(),
            retryable: false
        }
        .is_transient());
        assert!(!FitchatError::Authentication("nope".to_string()).is_transient());
        assert!(!FitchatError::RemoteRejected {
            status: 404,
            message: "not found".to_string()
        }
        .is_transient());
    }

    #[test]
    fn test_anyhow_helpers() {
        let err: anyhow::Error = FitchatError::RateLimited {
            retry_after_secs: Some(3),
        }
        .into();
        assert!(is_transient(&err));
        assert_eq!(retry_after(&err), Some(std::time::Duration::from_secs(3)));
        assert!(!is_authentication(&err));

        let err: anyhow::Error = FitchatError::Authentication("expired".to_string()).into();
        assert!(is_authentication(&err));
        assert!(!is_transient(&err));

        let plain = anyhow::anyhow!("something else");
        assert!(!is_transient(&plain));
        assert_eq!(retry_after(&plain), None);
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: FitchatError = io_error.into();
        assert!(matches!(error, FitchatError::Io(_)));
    }

    #[test]
    fn test_yaml_error_conversion() {
        let yaml_error = serde_yaml::from_str::<serde_yaml::Value>("invalid: : yaml").unwrap_err();
        let error: FitchatError = yaml_error.into();
        assert!(matches!(error, FitchatError::Yaml(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FitchatError>();
    }
}
