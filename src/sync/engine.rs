//! Paginated activity synchronization
//!
//! [`ActivitySyncEngine::sync`] pulls every activity inside a lookback window
//! page by page, fetches lap detail per activity, and merges the result into
//! the local store in a single atomic write. A failed lap fetch is recorded
//! and does not abort the run; an authentication failure does.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, Local, NaiveDate, Utc};

use crate::activity::{ActivityRecord, LapRecord};
use crate::auth::{AuthOutcome, Session, SessionManager};
use crate::error::{self, FitchatError, Result};
use crate::remote::{ActivityPage, ActivityQuery, ActivityService};
use crate::store::{merge, LocalStore, Snapshot};
use crate::sync::{metrics, SyncFailure, SyncResult};

/// Tunables for a sync run
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Summaries requested per page (1..=1000)
    pub page_size: u32,
    /// Derive one lap from the summary when the service reports none
    pub synthesize_missing_laps: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            page_size: 100,
            synthesize_missing_laps: true,
        }
    }
}

impl From<&crate::config::SyncConfig> for SyncOptions {
    fn from(config: &crate::config::SyncConfig) -> Self {
        Self {
            page_size: config.page_size,
            synthesize_missing_laps: config.synthesize_missing_laps,
        }
    }
}

/// Drives synchronization from the remote service into the local store.
pub struct ActivitySyncEngine {
    service: Arc<dyn ActivityService>,
    sessions: SessionManager,
    store: LocalStore,
    options: SyncOptions,
}

impl ActivitySyncEngine {
    /// Create an engine
    ///
    /// # Arguments
    ///
    /// * `service` - Remote activity service (normally throttled)
    /// * `sessions` - Session owner used for validity checks and re-login
    /// * `store` - Destination store
    /// * `options` - Page size and lap synthesis
    pub fn new(
        service: Arc<dyn ActivityService>,
        sessions: SessionManager,
        store: LocalStore,
        options: SyncOptions,
    ) -> Self {
        Self {
            service,
            sessions,
            store,
            options,
        }
    }

    /// The session manager, e.g. for an interactive MFA step before syncing
    pub fn sessions_mut(&mut self) -> &mut SessionManager {
        &mut self.sessions
    }

    /// Sync the last `lookback_days` days up to today (local time).
    ///
    /// # Arguments
    ///
    /// * `lookback_days` - Size of the window
    /// * `activity_type` - Case-insensitive substring filter on the type;
    ///   `None` syncs every type
    ///
    /// # Returns
    ///
    /// Counts of added, updated and unchanged activities plus per-activity
    /// lap failures
    ///
    /// # Errors
    ///
    /// - `Authentication` / `MfaRequired` / `MissingCredentials` if no valid
    ///   session can be obtained
    /// - `Transport` / `RateLimited` if a summary page still fails after retries
    /// - `StoreCorruption` if the existing store cannot be read
    ///
    /// Nothing is written when an error is returned.
    pub async fn sync(&mut self, lookback_days: u32, activity_type: Option<&str>) -> Result<SyncResult> {
        let today = Local::now().date_naive();
        self.sync_as_of(today, lookback_days, activity_type).await
    }

    /// [`sync`](Self::sync) with an explicit "today"
    pub async fn sync_as_of(
        &mut self,
        today: NaiveDate,
        lookback_days: u32,
        activity_type: Option<&str>,
    ) -> Result<SyncResult> {
        let started = Instant::now();
        let outcome = self.run(today, lookback_days, activity_type).await;
        match &outcome {
            Ok(result) => metrics::record_success(result, started.elapsed()),
            Err(_) => metrics::record_failure(started.elapsed()),
        }
        outcome
    }

    async fn run(
        &mut self,
        today: NaiveDate,
        lookback_days: u32,
        activity_type: Option<&str>,
    ) -> Result<SyncResult> {
        let window_start = today - Duration::days(i64::from(lookback_days));
        tracing::info!(%window_start, window_end = %today, activity_type = ?activity_type, "Starting sync");

        let before = self.store.load()?;
        let mut session = self.initial_session().await?;

        let summaries = self
            .fetch_summaries(&mut session, window_start, today, activity_type)
            .await?;
        tracing::info!(count = summaries.len(), "Fetched activity summaries");

        let mut failed = Vec::new();
        let mut records = Vec::with_capacity(summaries.len());
        for (id, mut activity) in summaries {
            match self.fetch_laps(&mut session, id).await {
                Ok(laps) => activity.laps = self.finish_laps(&activity, laps),
                Err(e) if is_fatal(&e) => return Err(e),
                Err(e) => {
                    tracing::warn!(activity_id = id, "Lap detail unavailable: {}", e);
                    let failure = FitchatError::PartialSync {
                        activity_id: id,
                        reason: e.to_string(),
                    };
                    failed.push(SyncFailure {
                        activity_id: id,
                        reason: failure.to_string(),
                    });
                    // Keep whatever laps we already had for this activity.
                    if let Some(previous) = before.activities.get(&id) {
                        activity.laps = previous.laps.clone();
                    }
                }
            }
            records.push(activity);
        }

        let mut result = SyncResult {
            fetched: records.len(),
            failed,
            window_start,
            window_end: today,
            ..SyncResult::default()
        };
        classify(&before, &records, &mut result);

        let mut snapshot = merge(before, records);
        snapshot.last_sync = Some(Utc::now());
        self.store.persist(&snapshot)?;

        tracing::info!(
            added = result.added,
            updated = result.updated,
            unchanged = result.unchanged,
            failed = result.failed.len(),
            "Sync finished"
        );
        Ok(result)
    }

    /// A valid session without user interaction.
    async fn initial_session(&mut self) -> Result<Session> {
        let session = match self.sessions.current().cloned() {
            Some(session) => session,
            None => match self.sessions.authenticate().await? {
                AuthOutcome::Authenticated(session) => session,
                AuthOutcome::MfaRequired(challenge) => {
                    return Err(FitchatError::MfaRequired {
                        challenge_id: challenge.challenge_id,
                    }
                    .into())
                }
            },
        };
        self.sessions.ensure_valid(&session).await
    }

    /// Page through summaries newest first until the data runs out or
    /// falls behind the window. Returns window-matching summaries by id.
    async fn fetch_summaries(
        &mut self,
        session: &mut Session,
        window_start: NaiveDate,
        window_end: NaiveDate,
        activity_type: Option<&str>,
    ) -> Result<BTreeMap<u64, ActivityRecord>> {
        let page_size = self.options.page_size.max(1);
        let mut collected = BTreeMap::new();
        let mut seen = HashSet::new();
        let mut offset = 0u32;

        loop {
            let query = ActivityQuery {
                offset,
                limit: page_size,
                start_date: Some(window_start),
                end_date: Some(window_end),
                // The service matches type keys exactly; the substring
                // filter is applied below.
                activity_type: None,
            };
            let page = self.list_page(session, &query).await?;
            let listed = page.listed();
            tracing::debug!(
                offset,
                listed,
                skipped = page.skipped_ids.len(),
                "Fetched summary page"
            );

            let mut reached_older = false;
            let mut progressed = false;
            for id in &page.skipped_ids {
                progressed |= seen.insert(*id);
            }
            for activity in page.records {
                progressed |= seen.insert(activity.id);
                let date = activity.date();
                if date < window_start {
                    reached_older = true;
                    continue;
                }
                if date > window_end || !activity.matches_type(activity_type) {
                    continue;
                }
                collected.entry(activity.id).or_insert(activity);
            }

            if listed < page_size as usize || reached_older {
                break;
            }
            if !progressed {
                // A full page of ids we already have; the service is not
                // advancing the offset.
                tracing::warn!(offset, "Pagination made no progress, stopping");
                break;
            }
            offset = offset.saturating_add(page_size);
        }

        Ok(collected)
    }

    async fn list_page(&mut self, session: &mut Session, query: &ActivityQuery) -> Result<ActivityPage> {
        *session = self.sessions.ensure_valid(session).await?;
        match self.service.list_activities(session, query).await {
            Err(e) if error::is_authentication(&e) => {
                *session = self.sessions.handle_rejection(session).await?;
                self.service.list_activities(session, query).await
            }
            other => other,
        }
    }

    async fn fetch_laps(&mut self, session: &mut Session, activity_id: u64) -> Result<Vec<LapRecord>> {
        *session = self.sessions.ensure_valid(session).await?;
        match self.service.get_activity_laps(session, activity_id).await {
            Err(e) if error::is_authentication(&e) => {
                *session = self.sessions.handle_rejection(session).await?;
                self.service.get_activity_laps(session, activity_id).await
            }
            other => other,
        }
    }

    fn finish_laps(&self, activity: &ActivityRecord, mut laps: Vec<LapRecord>) -> Vec<LapRecord> {
        if laps.is_empty() && self.options.synthesize_missing_laps {
            return vec![activity.synthetic_lap()];
        }
        laps.sort_by_key(|l| l.lap_index);
        laps
    }
}

/// Errors that end the whole run rather than one activity.
fn is_fatal(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<FitchatError>(),
        Some(
            FitchatError::Authentication(_)
                | FitchatError::MfaRequired { .. }
                | FitchatError::MissingCredentials(_)
                | FitchatError::Io(_)
        )
    )
}

/// Count fetched records against the pre-sync snapshot.
fn classify(before: &Snapshot, records: &[ActivityRecord], result: &mut SyncResult) {
    for record in records {
        match before.activities.get(&record.id) {
            None => result.added += 1,
            Some(previous) if previous == record => result.unchanged += 1,
            Some(_) => result.updated += 1,
        }
    }
}
