//! In-memory fake of the remote activity service
//!
//! [`FakeActivityService`] implements [`ActivityService`] without any
//! network I/O so that the session manager and sync engine can be exercised
//! deterministically. Tests configure it up front (accounts, activities,
//! MFA, injected failures) and inspect the call counters afterwards.
//!
//! # Example
//!
//! ```
//! use fitchat::remote::{ActivityService, FakeActivityService, LoginResponse};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let fake = FakeActivityService::new();
//! let response = fake
//!     .login(FakeActivityService::EMAIL, FakeActivityService::PASSWORD)
//!     .await
//!     .unwrap();
//! assert!(matches!(response, LoginResponse::Tokens(_)));
//! assert_eq!(fake.login_calls(), 1);
//! # }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use crate::activity::{ActivityRecord, LapRecord};
use crate::auth::{MfaState, Session};
use crate::error::{FitchatError, Result};
use crate::remote::{ActivityPage, ActivityQuery, ActivityService, LoginResponse};

#[derive(Debug, Default)]
struct Counters {
    login: u32,
    mfa: u32,
    refresh: u32,
    list: u32,
    laps: u32,
}

#[derive(Debug)]
struct FakeState {
    email: String,
    password: String,
    mfa_code: Option<String>,
    pending_challenges: HashSet<String>,
    valid_access: HashSet<String>,
    valid_refresh: HashSet<String>,
    next_token: u64,
    token_lifetime: Duration,
    activities: BTreeMap<u64, ActivityRecord>,
    failing_laps: HashSet<u64>,
    list_failures_remaining: u32,
    honor_date_range: bool,
    reject_next_data_call: bool,
    calls: Counters,
}

/// In-memory fake of the remote activity service.
#[derive(Debug)]
pub struct FakeActivityService {
    state: Mutex<FakeState>,
}

impl Default for FakeActivityService {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeActivityService {
    /// Email accepted by a freshly created fake
    pub const EMAIL: &'static str = "runner@example.com";
    /// Password accepted by a freshly created fake
    pub const PASSWORD: &'static str = "correct-horse";

    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                email: Self::EMAIL.to_string(),
                password: Self::PASSWORD.to_string(),
                mfa_code: None,
                pending_challenges: HashSet::new(),
                valid_access: HashSet::new(),
                valid_refresh: HashSet::new(),
                next_token: 0,
                token_lifetime: Duration::hours(1),
                activities: BTreeMap::new(),
                failing_laps: HashSet::new(),
                list_failures_remaining: 0,
                honor_date_range: true,
                reject_next_data_call: false,
                calls: Counters::default(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ---- Configuration ----

    /// Require a second factor; `code` is the only accepted value
    pub fn require_mfa(&self, code: impl Into<String>) {
        self.lock().mfa_code = Some(code.into());
    }

    /// Add or replace an activity. Its `laps` are what lap detail returns.
    pub fn add_activity(&self, activity: ActivityRecord) {
        self.lock().activities.insert(activity.id, activity);
    }

    /// Lap detail for `activity_id` fails with a transport error
    pub fn fail_laps_for(&self, activity_id: u64) {
        self.lock().failing_laps.insert(activity_id);
    }

    /// Lap detail for `activity_id` works again
    pub fn restore_laps_for(&self, activity_id: u64) {
        self.lock().failing_laps.remove(&activity_id);
    }

    /// The next `n` list calls fail with a transient transport error
    pub fn fail_next_list_calls(&self, n: u32) {
        self.lock().list_failures_remaining = n;
    }

    /// When `false`, list calls ignore the date range like some vendor
    /// endpoints do, leaving window filtering to the client
    pub fn set_honor_date_range(&self, honor: bool) {
        self.lock().honor_date_range = honor;
    }

    /// Lifetime of tokens issued from now on
    pub fn set_token_lifetime(&self, lifetime: Duration) {
        self.lock().token_lifetime = lifetime;
    }

    /// Invalidate every issued access token; refresh tokens keep working
    pub fn revoke_access_tokens(&self) {
        self.lock().valid_access.clear();
    }

    /// Invalidate every issued refresh token
    pub fn revoke_refresh_tokens(&self) {
        self.lock().valid_refresh.clear();
    }

    /// The next data call rejects its token and revokes all access tokens,
    /// as if the session expired server-side mid-sync
    pub fn reject_next_data_call(&self) {
        self.lock().reject_next_data_call = true;
    }

    /// Issue a valid session directly, bypassing login
    pub fn issue_session(&self) -> Session {
        let mut state = self.lock();
        Self::mint(&mut state, MfaState::NotRequired)
    }

    // ---- Counters ----

    pub fn login_calls(&self) -> u32 {
        self.lock().calls.login
    }

    pub fn mfa_calls(&self) -> u32 {
        self.lock().calls.mfa
    }

    pub fn refresh_calls(&self) -> u32 {
        self.lock().calls.refresh
    }

    pub fn list_calls(&self) -> u32 {
        self.lock().calls.list
    }

    pub fn lap_calls(&self) -> u32 {
        self.lock().calls.laps
    }

    /// Total number of calls of any kind
    pub fn total_calls(&self) -> u32 {
        let state = self.lock();
        let c = &state.calls;
        c.login + c.mfa + c.refresh + c.list + c.laps
    }

    // ---- Internals ----

    fn mint(state: &mut FakeState, mfa_state: MfaState) -> Session {
        state.next_token += 1;
        let access = format!("fake-access-{}", state.next_token);
        let refresh = format!("fake-refresh-{}", state.next_token);
        state.valid_access.insert(access.clone());
        state.valid_refresh.insert(refresh.clone());
        let mut session = Session::new(
            access,
            Some(refresh),
            Some(Utc::now() + state.token_lifetime),
        );
        session.mfa_state = mfa_state;
        session
    }

    fn check_access(state: &mut FakeState, session: &Session) -> Result<()> {
        if state.reject_next_data_call {
            state.reject_next_data_call = false;
            state.valid_access.clear();
        }
        if state.valid_access.contains(&session.access_token) {
            Ok(())
        } else {
            Err(FitchatError::Authentication("access token rejected".to_string()).into())
        }
    }
}

#[async_trait]
impl ActivityService for FakeActivityService {
    async fn login(&self, email: &str, password: &str) -> Result<LoginResponse> {
        let mut state = self.lock();
        state.calls.login += 1;

        if email != state.email || password != state.password {
            return Err(FitchatError::Authentication("invalid email or password".to_string()).into());
        }

        if state.mfa_code.is_some() {
            let challenge_id = format!("challenge-{}", state.calls.login);
            state.pending_challenges.insert(challenge_id.clone());
            return Ok(LoginResponse::MfaChallenge { challenge_id });
        }

        Ok(LoginResponse::Tokens(Self::mint(&mut state, MfaState::NotRequired)))
    }

    async fn complete_mfa(&self, challenge_id: &str, code: &str) -> Result<Session> {
        let mut state = self.lock();
        state.calls.mfa += 1;

        if !state.pending_challenges.contains(challenge_id) {
            return Err(FitchatError::Mfa(format!("unknown challenge {}", challenge_id)).into());
        }
        if state.mfa_code.as_deref() != Some(code) {
            return Err(FitchatError::Mfa("invalid verification code".to_string()).into());
        }

        state.pending_challenges.remove(challenge_id);
        Ok(Self::mint(&mut state, MfaState::Completed))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session> {
        let mut state = self.lock();
        state.calls.refresh += 1;

        if !state.valid_refresh.remove(refresh_token) {
            return Err(FitchatError::Authentication("refresh token rejected".to_string()).into());
        }
        Ok(Self::mint(&mut state, MfaState::NotRequired))
    }

    async fn list_activities(
        &self,
        session: &Session,
        query: &ActivityQuery,
    ) -> Result<ActivityPage> {
        let mut state = self.lock();
        state.calls.list += 1;

        if state.list_failures_remaining > 0 {
            state.list_failures_remaining -= 1;
            return Err(FitchatError::Transport("connection reset by peer".to_string()).into());
        }
        Self::check_access(&mut state, session)?;

        let honor_dates = state.honor_date_range;
        let mut matching: Vec<&ActivityRecord> = state
            .activities
            .values()
            .filter(|a| {
                query
                    .activity_type
                    .as_deref()
                    .map_or(true, |kind| a.activity_type.eq_ignore_ascii_case(kind))
            })
            .filter(|a| {
                !honor_dates
                    || (query.start_date.map_or(true, |d| a.date() >= d)
                        && query.end_date.map_or(true, |d| a.date() <= d))
            })
            .collect();
        matching.sort_by(|a, b| {
            b.start_time_local
                .cmp(&a.start_time_local)
                .then(b.id.cmp(&a.id))
        });

        let records = matching
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .map(|a| ActivityRecord {
                laps: Vec::new(),
                ..a.clone()
            })
            .collect();
        Ok(ActivityPage::new(records))
    }

    async fn get_activity_laps(&self, session: &Session, activity_id: u64) -> Result<Vec<LapRecord>> {
        let mut state = self.lock();
        state.calls.laps += 1;

        Self::check_access(&mut state, session)?;

        if state.failing_laps.contains(&activity_id) {
            return Err(FitchatError::Transport(format!(
                "lap detail for activity {} unavailable",
                activity_id
            ))
            .into());
        }

        state
            .activities
            .get(&activity_id)
            .map(|a| a.laps.clone())
            .ok_or_else(|| {
                FitchatError::Transport(format!("activity {} not found", activity_id)).into()
            })
    }
}

impl FakeActivityService {
    /// Number of challenges awaiting a code
    pub fn pending_challenges(&self) -> usize {
        self.lock().pending_challenges.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn activity(id: u64, day: u32) -> ActivityRecord {
        ActivityRecord::new(
            id,
            "running",
            NaiveDate::from_ymd_opt(2024, 3, day)
                .unwrap()
                .and_hms_opt(7, 0, 0)
                .unwrap(),
            1800.0,
            5000.0,
        )
    }

    fn query(offset: u32, limit: u32) -> ActivityQuery {
        ActivityQuery {
            offset,
            limit,
            start_date: None,
            end_date: None,
            activity_type: None,
        }
    }

    #[tokio::test]
    async fn test_type_key_is_matched_exactly() {
        let fake = FakeActivityService::new();
        fake.add_activity(activity(1, 1));
        let mut trail = activity(2, 2);
        trail.activity_type = "trail_running".to_string();
        fake.add_activity(trail);
        let session = fake.issue_session();

        let mut running = query(0, 10);
        running.activity_type = Some("Running".to_string());
        let page = fake.list_activities(&session, &running).await.unwrap();
        assert_eq!(page.records.iter().map(|a| a.id).collect::<Vec<_>>(), vec![1]);

        let page = fake.list_activities(&session, &query(0, 10)).await.unwrap();
        assert_eq!(page.listed(), 2);
    }

    #[tokio::test]
    async fn test_list_is_newest_first_and_paged() {
        let fake = FakeActivityService::new();
        for (id, day) in [(1, 1), (2, 5), (3, 3)] {
            fake.add_activity(activity(id, day));
        }
        let session = fake.issue_session();
        let first = fake.list_activities(&session, &query(0, 2)).await.unwrap();
        assert_eq!(first.records.iter().map(|a| a.id).collect::<Vec<_>>(), vec![2, 3]);
        let second = fake.list_activities(&session, &query(2, 2)).await.unwrap();
        assert_eq!(second.records.iter().map(|a| a.id).collect::<Vec<_>>(), vec![1]);
    }

    #[tokio::test]
    async fn test_mfa_flow() {
        let fake = FakeActivityService::new();
        fake.require_mfa("123456");
        let response = fake
            .login(FakeActivityService::EMAIL, FakeActivityService::PASSWORD)
            .await
            .unwrap();
        let LoginResponse::MfaChallenge { challenge_id } = response else {
            panic!("expected a challenge");
        };
        assert!(fake.complete_mfa(&challenge_id, "000000").await.is_err());
        assert_eq!(fake.pending_challenges(), 1);
        let session = fake.complete_mfa(&challenge_id, "123456").await.unwrap();
        assert_eq!(session.mfa_state, MfaState::Completed);
        assert_eq!(fake.pending_challenges(), 0);
    }

    #[tokio::test]
    async fn test_revoked_token_is_rejected() {
        let fake = FakeActivityService::new();
        let session = fake.issue_session();
        fake.revoke_access_tokens();
        let err = fake.list_activities(&session, &query(0, 1)).await.unwrap_err();
        assert!(crate::error::is_authentication(&err));
    }

    #[tokio::test]
    async fn test_refresh_tokens_are_single_use() {
        let fake = FakeActivityService::new();
        let session = fake.issue_session();
        let refresh = session.refresh_token.clone().unwrap();
        assert!(fake.refresh(&refresh).await.is_ok());
        assert!(fake.refresh(&refresh).await.is_err());
    }
}
