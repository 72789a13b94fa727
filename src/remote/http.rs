//! HTTP implementation of the activity service
//!
//! Talks JSON over HTTPS with `reqwest`. Authentication goes through a small
//! token endpoint family (`/auth/login`, `/auth/mfa`, `/auth/refresh`); data
//! comes from the activity search and per-activity splits endpoints. Status
//! codes are mapped onto [`FitchatError`] so that callers can decide what to
//! retry.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use crate::activity::LapRecord;
use crate::auth::{MfaState, Session};
use crate::config::RemoteConfig;
use crate::error::{FitchatError, Result};
use crate::remote::types::{
    ActivitySummaryDto, LoginRequest, LoginResponseDto, MfaRequest, RefreshRequest, SplitsDto,
    TokenResponse,
};
use crate::remote::{ActivityPage, ActivityQuery, ActivityService, LoginResponse};

const SEARCH_PATH: &str = "activitylist-service/activities/search/activities";

/// Which endpoint family a response came from; decides how 4xx is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    Login,
    Mfa,
    Refresh,
    Data,
}

/// Activity service client over HTTP
///
/// # Examples
///
/// ```
/// use fitchat::remote::HttpActivityService;
/// use std::time::Duration;
///
/// let service = HttpActivityService::new("http://localhost:9000", Duration::from_secs(5));
/// assert!(service.is_ok());
/// assert!(HttpActivityService::new("not a url", Duration::from_secs(5)).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct HttpActivityService {
    client: Client,
    base: Url,
}

impl HttpActivityService {
    /// Create a client for the service rooted at `api_base`
    ///
    /// # Errors
    ///
    /// Returns `Config` if `api_base` is not a valid URL or the HTTP client
    /// cannot be built
    pub fn new(api_base: &str, timeout: Duration) -> Result<Self> {
        // A trailing slash makes Url::join append instead of replacing the last segment.
        let normalized = format!("{}/", api_base.trim_end_matches('/'));
        let base = Url::parse(&normalized)
            .map_err(|e| FitchatError::Config(format!("Invalid api_base {}: {}", api_base, e)))?;

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("fitchat/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FitchatError::Config(format!("Failed to create HTTP client: {}", e)))?;

        tracing::info!("Initialized activity service client: base={}", base);
        Ok(Self { client, base })
    }

    /// Create a client from the `remote` configuration section
    pub fn from_config(config: &RemoteConfig) -> Result<Self> {
        Self::new(&config.api_base, Duration::from_secs(config.timeout_seconds))
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| FitchatError::Config(format!("Invalid endpoint path {}: {}", path, e)).into())
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response> {
        request.send().await.map_err(|e| {
            tracing::warn!("Activity service request failed: {}", e);
            FitchatError::Transport(e.to_string()).into()
        })
    }

    /// Turn a response into `T`, mapping non-success statuses to errors.
    async fn parse<T: DeserializeOwned>(response: Response, endpoint: Endpoint) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();
            tracing::debug!(status = status.as_u16(), ?endpoint, "Activity service error response");
            return Err(map_status(status, retry_after, &body, endpoint).into());
        }

        response.json::<T>().await.map_err(|e| {
            tracing::error!("Failed to parse activity service response: {}", e);
            FitchatError::Transport(format!("Malformed response: {}", e)).into()
        })
    }
}

/// Map a non-success status to the error taxonomy.
fn map_status(status: StatusCode, retry_after: Option<u64>, body: &str, endpoint: Endpoint) -> FitchatError {
    let code = status.as_u16();
    let message = if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("no reason").to_string()
    } else {
        body.trim().chars().take(200).collect()
    };

    match code {
        429 => FitchatError::RateLimited {
            retry_after_secs: retry_after,
        },
        500..=599 => FitchatError::Transport(format!("server error {}: {}", code, message)),
        400 | 401 | 403 if endpoint == Endpoint::Mfa => {
            FitchatError::Mfa(format!("verification code rejected: {}", message))
        }
        400 | 401 | 403 if endpoint != Endpoint::Data => FitchatError::Authentication(message),
        401 | 403 => FitchatError::Authentication(format!("access token rejected: {}", message)),
        _ => FitchatError::RemoteRejected {
            status: code,
            message,
        },
    }
}

#[async_trait]
impl ActivityService for HttpActivityService {
    async fn login(&self, email: &str, password: &str) -> Result<LoginResponse> {
        tracing::debug!("Logging in to activity service");
        let url = self.url("auth/login")?;
        let response = self
            .send(self.client.post(url).json(&LoginRequest { email, password }))
            .await?;

        match Self::parse::<LoginResponseDto>(response, Endpoint::Login).await? {
            LoginResponseDto::Mfa {
                mfa_required: true,
                challenge_id,
            } => Ok(LoginResponse::MfaChallenge { challenge_id }),
            LoginResponseDto::Mfa { .. } => Err(FitchatError::Authentication(
                "login response carried neither tokens nor a challenge".to_string(),
            )
            .into()),
            LoginResponseDto::Tokens(tokens) => Ok(LoginResponse::Tokens(tokens.into_session())),
        }
    }

    async fn complete_mfa(&self, challenge_id: &str, code: &str) -> Result<Session> {
        let url = self.url("auth/mfa")?;
        let response = self
            .send(self.client.post(url).json(&MfaRequest { challenge_id, code }))
            .await?;
        let mut session = Self::parse::<TokenResponse>(response, Endpoint::Mfa)
            .await?
            .into_session();
        session.mfa_state = MfaState::Completed;
        Ok(session)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session> {
        let url = self.url("auth/refresh")?;
        let response = self
            .send(self.client.post(url).json(&RefreshRequest { refresh_token }))
            .await?;
        Ok(Self::parse::<TokenResponse>(response, Endpoint::Refresh)
            .await?
            .into_session())
    }

    async fn list_activities(
        &self,
        session: &Session,
        query: &ActivityQuery,
    ) -> Result<ActivityPage> {
        let mut url = self.url(SEARCH_PATH)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("start", &query.offset.to_string());
            pairs.append_pair("limit", &query.limit.to_string());
            if let Some(start) = query.start_date {
                pairs.append_pair("startDate", &start.format("%Y-%m-%d").to_string());
            }
            if let Some(end) = query.end_date {
                pairs.append_pair("endDate", &end.format("%Y-%m-%d").to_string());
            }
            if let Some(kind) = &query.activity_type {
                pairs.append_pair("activityType", kind);
            }
        }

        tracing::debug!(offset = query.offset, limit = query.limit, "Listing activities");
        let response = self
            .send(self.client.get(url).bearer_auth(&session.access_token))
            .await?;
        let summaries = Self::parse::<Vec<ActivitySummaryDto>>(response, Endpoint::Data).await?;

        let mut page = ActivityPage::default();
        for summary in summaries {
            let id = summary.activity_id;
            match summary.into_record() {
                Some(record) => page.records.push(record),
                None => page.skipped_ids.push(id),
            }
        }
        if !page.skipped_ids.is_empty() {
            tracing::debug!(skipped = ?page.skipped_ids, "Skipped summaries without a start time");
        }
        Ok(page)
    }

    async fn get_activity_laps(&self, session: &Session, activity_id: u64) -> Result<Vec<LapRecord>> {
        let url = self.url(&format!("activity-service/activity/{}/splits", activity_id))?;
        let response = self
            .send(self.client.get(url).bearer_auth(&session.access_token))
            .await?;
        Ok(Self::parse::<SplitsDto>(response, Endpoint::Data)
            .await?
            .into_laps())
    }
}
