//! Remote activity service boundary
//!
//! [`ActivityService`] is the seam between the sync pipeline and the vendor
//! API. [`http::HttpActivityService`] talks to the real service,
//! [`fake::FakeActivityService`] is an in-memory stand-in for tests, and
//! [`ThrottledService`] wraps either one with call spacing and bounded
//! retries.

pub mod fake;
pub mod http;
pub mod retry;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::activity::{ActivityRecord, LapRecord};
use crate::auth::Session;
use crate::error::Result;

pub use fake::FakeActivityService;
pub use http::HttpActivityService;
pub use retry::{RetryPolicy, Throttle};

/// Outcome of a password login
#[derive(Debug, Clone, PartialEq)]
pub enum LoginResponse {
    /// Login finished; here are the tokens
    Tokens(Session),
    /// The account requires a second factor
    MfaChallenge {
        /// Identifier to send back with the code
        challenge_id: String,
    },
}

/// One page request against the activity list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityQuery {
    /// Number of entries to skip, newest first
    pub offset: u32,
    /// Maximum number of entries to return
    pub limit: u32,
    /// Earliest local start date to include
    pub start_date: Option<NaiveDate>,
    /// Latest local start date to include
    pub end_date: Option<NaiveDate>,
    /// Exact activity type key for the service to match. The sync engine
    /// leaves this unset and filters locally, since its filter is a
    /// substring match the service does not understand.
    pub activity_type: Option<String>,
}

/// One page of the activity list as the service returned it
///
/// The end of the data is judged on [`listed`](Self::listed), not on the
/// number of usable records: a summary that cannot be converted still
/// occupies a slot on the vendor page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityPage {
    /// Summaries converted to records, in service order
    pub records: Vec<ActivityRecord>,
    /// Ids of listed entries that could not be converted
    pub skipped_ids: Vec<u64>,
}

impl ActivityPage {
    /// A page where every listed entry converted cleanly
    pub fn new(records: Vec<ActivityRecord>) -> Self {
        Self {
            records,
            skipped_ids: Vec::new(),
        }
    }

    /// Number of entries the service listed, usable or not
    pub fn listed(&self) -> usize {
        self.records.len() + self.skipped_ids.len()
    }
}

/// Operations the sync pipeline needs from the remote activity service.
///
/// Listing is newest first. A token the service no longer accepts is
/// reported as `FitchatError::Authentication`; throttling as `RateLimited`;
/// network and 5xx failures as `Transport`.
#[async_trait]
pub trait ActivityService: Send + Sync {
    /// Password login
    async fn login(&self, email: &str, password: &str) -> Result<LoginResponse>;

    /// Finish a login that returned [`LoginResponse::MfaChallenge`]
    async fn complete_mfa(&self, challenge_id: &str, code: &str) -> Result<Session>;

    /// Exchange a refresh token for a new session
    async fn refresh(&self, refresh_token: &str) -> Result<Session>;

    /// Fetch one page of activity summaries (without laps)
    async fn list_activities(
        &self,
        session: &Session,
        query: &ActivityQuery,
    ) -> Result<ActivityPage>;

    /// Fetch lap detail for one activity
    async fn get_activity_laps(&self, session: &Session, activity_id: u64) -> Result<Vec<LapRecord>>;
}

/// Decorator that spaces out calls and retries transient failures.
pub struct ThrottledService {
    inner: Arc<dyn ActivityService>,
    policy: RetryPolicy,
    throttle: Throttle,
}

impl ThrottledService {
    /// Wrap `inner`, enforcing `min_interval` between calls and retrying per `policy`
    pub fn new(inner: Arc<dyn ActivityService>, policy: RetryPolicy, min_interval: Duration) -> Self {
        Self {
            inner,
            policy,
            throttle: Throttle::new(min_interval),
        }
    }
}

#[async_trait]
impl ActivityService for ThrottledService {
    async fn login(&self, email: &str, password: &str) -> Result<LoginResponse> {
        retry::with_retry(&self.policy, &self.throttle, "login", move || {
            self.inner.login(email, password)
        })
        .await
    }

    async fn complete_mfa(&self, challenge_id: &str, code: &str) -> Result<Session> {
        retry::with_retry(&self.policy, &self.throttle, "complete_mfa", move || {
            self.inner.complete_mfa(challenge_id, code)
        })
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session> {
        retry::with_retry(&self.policy, &self.throttle, "refresh", move || {
            self.inner.refresh(refresh_token)
        })
        .await
    }

    async fn list_activities(
        &self,
        session: &Session,
        query: &ActivityQuery,
    ) -> Result<ActivityPage> {
        retry::with_retry(&self.policy, &self.throttle, "list_activities", move || {
            self.inner.list_activities(session, query)
        })
        .await
    }

    async fn get_activity_laps(&self, session: &Session, activity_id: u64) -> Result<Vec<LapRecord>> {
        retry::with_retry(&self.policy, &self.throttle, "get_activity_laps", move || {
            self.inner.get_activity_laps(session, activity_id)
        })
        .await
    }
}
