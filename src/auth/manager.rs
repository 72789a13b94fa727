//! Session lifecycle against the remote activity service
//!
//! [`SessionManager`] owns the single active [`Session`] of the process. It
//! reuses cached tokens when they are still valid, refreshes or re-logs in
//! when they are not, and exposes the second-factor step as an explicit
//! suspend/resume boundary: [`SessionManager::authenticate`] returns
//! [`AuthOutcome::MfaRequired`] and the caller later supplies the code
//! through [`SessionManager::complete_mfa`].

use std::fmt;
use std::sync::Arc;

use crate::auth::{CredentialStore, MfaChallenge, Session};
use crate::error::{self, FitchatError, Result};
use crate::remote::{ActivityService, LoginResponse};

/// Account credentials for a password login
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Result of [`SessionManager::authenticate`]
#[derive(Debug, Clone, PartialEq)]
pub enum AuthOutcome {
    /// A usable session is available
    Authenticated(Session),
    /// The account needs a second factor before a session can be issued
    MfaRequired(MfaChallenge),
}

/// Owner of the authenticated session.
///
/// Every successful login, MFA completion or refresh is persisted through
/// the [`CredentialStore`] before it is returned; logout deletes it.
pub struct SessionManager {
    service: Arc<dyn ActivityService>,
    store: CredentialStore,
    credentials: Option<Credentials>,
    current: Option<Session>,
    pending: Option<MfaChallenge>,
}

impl SessionManager {
    /// Create a manager
    ///
    /// # Arguments
    ///
    /// * `service` - Remote activity service
    /// * `store` - Where reusable tokens are kept
    /// * `credentials` - Account credentials, if known; without them only
    ///   cached or refreshable sessions can be used
    pub fn new(
        service: Arc<dyn ActivityService>,
        store: CredentialStore,
        credentials: Option<Credentials>,
    ) -> Self {
        Self {
            service,
            store,
            credentials,
            current: None,
            pending: None,
        }
    }

    /// The active session, if any
    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    /// The challenge awaiting a code, if any
    pub fn pending_challenge(&self) -> Option<&MfaChallenge> {
        self.pending.as_ref()
    }

    /// Provide or replace account credentials
    pub fn set_credentials(&mut self, credentials: Credentials) {
        self.credentials = Some(credentials);
    }

    /// Obtain a session, preferring cached tokens.
    ///
    /// Order: in-memory session, cached token (no network contact), refresh
    /// of an expired cached token, full password login.
    ///
    /// # Returns
    ///
    /// `AuthOutcome::Authenticated` with a usable session, or
    /// `AuthOutcome::MfaRequired` when the login needs a second factor; the
    /// challenge stays pending until [`complete_mfa`](Self::complete_mfa).
    ///
    /// # Errors
    ///
    /// - `Authentication` if the service rejects the credentials
    /// - `MissingCredentials` if a login is needed and no credentials are set
    /// - `Transport` / `RateLimited` if the service stays unreachable
    pub async fn authenticate(&mut self) -> Result<AuthOutcome> {
        if let Some(session) = self.current.as_ref().filter(|s| !s.is_expired()) {
            return Ok(AuthOutcome::Authenticated(session.clone()));
        }

        if let Some(cached) = self.store.load()? {
            if !cached.is_expired() {
                tracing::info!("Reusing cached session");
                self.current = Some(cached.clone());
                return Ok(AuthOutcome::Authenticated(cached));
            }

            if let Some(session) = self.try_refresh(&cached).await? {
                return Ok(AuthOutcome::Authenticated(session));
            }
        }

        self.login().await
    }

    /// Finish a login that required a second factor.
    ///
    /// # Errors
    ///
    /// Returns `Mfa` if no challenge with `challenge_id` is pending or the
    /// service rejects `code`. A rejected code keeps the challenge pending
    /// so the caller may try again.
    pub async fn complete_mfa(&mut self, challenge_id: &str, code: &str) -> Result<Session> {
        match &self.pending {
            Some(pending) if pending.challenge_id == challenge_id => {}
            _ => {
                return Err(FitchatError::Mfa(format!(
                    "no pending challenge with id {}",
                    challenge_id
                ))
                .into())
            }
        }

        let session = match self.service.complete_mfa(challenge_id, code.trim()).await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!("MFA code rejected: {}", e);
                return Err(e);
            }
        };

        self.pending = None;
        tracing::info!("Multi-factor authentication completed");
        self.adopt(session)
    }

    /// Return `session` if still valid, otherwise refresh or re-login.
    ///
    /// # Errors
    ///
    /// - `Authentication` if neither refresh nor re-login succeeds
    /// - `MfaRequired` if the re-login needs a second factor; run an
    ///   interactive login first
    pub async fn ensure_valid(&mut self, session: &Session) -> Result<Session> {
        if !session.is_expired() {
            return Ok(session.clone());
        }
        tracing::info!("Session expired, renewing");
        self.renew(session).await
    }

    /// The service rejected `session` although it looked valid locally.
    ///
    /// The cached token is discarded and the session renewed as in
    /// [`ensure_valid`](Self::ensure_valid).
    pub async fn handle_rejection(&mut self, session: &Session) -> Result<Session> {
        tracing::warn!("Remote service rejected the current session, re-authenticating");
        self.current = None;
        self.store.delete()?;
        self.renew(session).await
    }

    /// Drop the session and pending challenge and delete cached credentials.
    pub fn logout(&mut self) -> Result<()> {
        self.current = None;
        self.pending = None;
        self.store.delete()?;
        tracing::info!("Logged out");
        Ok(())
    }

    async fn renew(&mut self, session: &Session) -> Result<Session> {
        if let Some(renewed) = self.try_refresh(session).await? {
            return Ok(renewed);
        }

        match self.login().await {
            Ok(AuthOutcome::Authenticated(session)) => Ok(session),
            Ok(AuthOutcome::MfaRequired(challenge)) => Err(FitchatError::MfaRequired {
                challenge_id: challenge.challenge_id,
            }
            .into()),
            Err(e) => match e.downcast_ref::<FitchatError>() {
                Some(FitchatError::MissingCredentials(_)) => Err(FitchatError::Authentication(
                    "session expired and no credentials are configured to log in again".to_string(),
                )
                .into()),
                _ => Err(e),
            },
        }
    }

    /// Refresh `session` if it carries a refresh token.
    ///
    /// `Ok(None)` means the refresh was not possible or was rejected and a
    /// full login is the next step.
    async fn try_refresh(&mut self, session: &Session) -> Result<Option<Session>> {
        let Some(refresh_token) = session.refresh_token.as_deref().filter(|t| !t.is_empty()) else {
            return Ok(None);
        };

        match self.service.refresh(refresh_token).await {
            Ok(mut renewed) => {
                tracing::info!("Refreshed session");
                if renewed.refresh_token.is_none() {
                    renewed.refresh_token = session.refresh_token.clone();
                }
                renewed.mfa_state = session.mfa_state;
                self.adopt(renewed).map(Some)
            }
            Err(e) if error::is_authentication(&e) => {
                tracing::warn!("Refresh token rejected: {}", e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn login(&mut self) -> Result<AuthOutcome> {
        let Some(credentials) = self.credentials.clone() else {
            return Err(FitchatError::MissingCredentials(
                "set FITCHAT_EMAIL and FITCHAT_PASSWORD, or run `fitchat login`".to_string(),
            )
            .into());
        };

        tracing::info!(email = %credentials.email, "Logging in");
        match self
            .service
            .login(&credentials.email, &credentials.password)
            .await?
        {
            LoginResponse::Tokens(session) => self.adopt(session).map(AuthOutcome::Authenticated),
            LoginResponse::MfaChallenge { challenge_id } => {
                tracing::info!("Second factor required");
                let challenge = MfaChallenge::new(challenge_id);
                self.pending = Some(challenge.clone());
                Ok(AuthOutcome::MfaRequired(challenge))
            }
        }
    }

    fn adopt(&mut self, session: Session) -> Result<Session> {
        self.store.save(&session)?;
        self.current = Some(session.clone());
        Ok(session)
    }
}
