use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use tempfile::TempDir;

use fitchat::activity::{ActivityRecord, LapRecord};
use fitchat::auth::{CredentialStore, Credentials, SessionManager};
use fitchat::remote::FakeActivityService;
use fitchat::store::LocalStore;
use fitchat::sync::{ActivitySyncEngine, SyncOptions};

/// Fixed "today" so windows are reproducible
#[allow(dead_code)]
pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 30).expect("valid date")
}

/// A running activity `days_ago` days before [`today`] with `laps` laps.
#[allow(dead_code)]
pub fn activity(id: u64, days_ago: i64, laps: u32) -> ActivityRecord {
    let start = (today() - Duration::days(days_ago))
        .and_hms_opt(7, 15, 0)
        .expect("valid time");
    let mut record = ActivityRecord::new(id, "running", start, 1500.0 + id as f64, 5000.0);
    record.name = format!("Run {}", id);
    record.average_heart_rate = Some(148.0);
    record.max_heart_rate = Some(171.0);
    record.laps = (0..laps)
        .map(|i| LapRecord {
            lap_index: i,
            distance_meters: 1000.0,
            duration_seconds: 300.0 + f64::from(i),
            average_heart_rate: Some(145.0 + f64::from(i)),
            average_pace_seconds_per_km: Some(300.0 + f64::from(i)),
        })
        .collect();
    record
}

/// Temporary locations for the snapshot and credential files
#[allow(dead_code)]
pub struct Paths {
    pub dir: TempDir,
}

#[allow(dead_code)]
impl Paths {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("failed to create tempdir"),
        }
    }

    pub fn data(&self) -> PathBuf {
        self.dir.path().join("activities.json")
    }

    pub fn credentials(&self) -> PathBuf {
        self.dir.path().join("credentials.json")
    }

    pub fn store(&self) -> LocalStore {
        LocalStore::new(self.data())
    }

    pub fn credential_store(&self) -> CredentialStore {
        CredentialStore::new(self.credentials())
    }
}

/// Session manager over `fake` with the fake's accepted credentials
#[allow(dead_code)]
pub fn session_manager(fake: &Arc<FakeActivityService>, paths: &Paths) -> SessionManager {
    SessionManager::new(
        fake.clone(),
        paths.credential_store(),
        Some(Credentials::new(
            FakeActivityService::EMAIL,
            FakeActivityService::PASSWORD,
        )),
    )
}

/// Sync engine talking to `fake` directly
#[allow(dead_code)]
pub fn engine(fake: &Arc<FakeActivityService>, paths: &Paths, page_size: u32) -> ActivitySyncEngine {
    ActivitySyncEngine::new(
        fake.clone(),
        session_manager(fake, paths),
        paths.store(),
        SyncOptions {
            page_size,
            synthesize_missing_laps: true,
        },
    )
}
