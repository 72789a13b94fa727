//! Authenticated session state
//!
//! A [`Session`] is the token material obtained from the remote activity
//! service. It is persisted as JSON by the credential store so that later
//! runs can reuse it without logging in again.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Seconds before `expires_at` at which a token is already treated as expired.
const EXPIRY_BUFFER_SECONDS: i64 = 60;

/// How the session was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MfaState {
    /// Password login was sufficient
    #[default]
    NotRequired,
    /// A second factor was completed for this session
    Completed,
}

/// Token material for the remote activity service.
///
/// # Examples
///
/// ```
/// use fitchat::auth::Session;
/// use chrono::{Duration, Utc};
///
/// let session = Session::new("access", Some("refresh".to_string()), Some(Utc::now() + Duration::hours(1)));
/// assert!(!session.is_expired());
///
/// let stale = Session::new("access", None, Some(Utc::now() - Duration::seconds(1)));
/// assert!(stale.is_expired());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Bearer token sent on data requests
    pub access_token: String,

    /// Token used to obtain a new access token without a password login
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// When the access token stops being accepted; `None` means unknown
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Whether a second factor was involved
    #[serde(default)]
    pub mfa_state: MfaState,
}

impl Session {
    /// Create a session with `MfaState::NotRequired`
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_at,
            mfa_state: MfaState::NotRequired,
        }
    }

    /// Returns `true` when the access token is expired or about to expire.
    ///
    /// A 60-second buffer is applied so a refresh can happen before the
    /// service starts rejecting the token. Sessions without `expires_at` are
    /// treated as valid until the service says otherwise.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            None => false,
            Some(expires_at) => Utc::now() >= expires_at - Duration::seconds(EXPIRY_BUFFER_SECONDS),
        }
    }

    /// Returns `true` when a refresh token is available.
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// A pending second-factor challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MfaChallenge {
    /// Identifier to echo back with the code
    pub challenge_id: String,
    /// When the challenge was received
    pub issued_at: DateTime<Utc>,
}

impl MfaChallenge {
    pub fn new(challenge_id: impl Into<String>) -> Self {
        Self {
            challenge_id: challenge_id.into(),
            issued_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_without_expiry_never_expires() {
        let session = Session::new("tok", None, None);
        assert!(!session.is_expired());
    }

    #[test]
    fn test_session_inside_buffer_is_expired() {
        let session = Session::new("tok", None, Some(Utc::now() + Duration::seconds(30)));
        assert!(session.is_expired());
    }

    #[test]
    fn test_session_outside_buffer_is_valid() {
        let session = Session::new("tok", None, Some(Utc::now() + Duration::seconds(120)));
        assert!(!session.is_expired());
    }

    #[test]
    fn test_can_refresh() {
        assert!(Session::new("a", Some("r".to_string()), None).can_refresh());
        assert!(!Session::new("a", Some(String::new()), None).can_refresh());
        assert!(!Session::new("a", None, None).can_refresh());
    }

    #[test]
    fn test_session_json_round_trip() {
        let mut session = Session::new(
            "access",
            Some("refresh".to_string()),
            Some(Utc::now() + Duration::hours(2)),
        );
        session.mfa_state = MfaState::Completed;
        let json = serde_json::to_string(&session).unwrap();
        assert!(json.contains("\"completed\""));
        let back: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(session, back);
    }

    #[test]
    fn test_session_defaults_when_fields_missing() {
        let session: Session = serde_json::from_str(r#"{"access_token":"a"}"#).unwrap();
        assert_eq!(session.mfa_state, MfaState::NotRequired);
        assert!(session.refresh_token.is_none());
        assert!(session.expires_at.is_none());
    }
}
