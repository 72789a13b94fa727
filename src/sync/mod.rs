//! Synchronization of remote activities into the local store

pub mod engine;
pub mod metrics;

use chrono::NaiveDate;
use serde::Serialize;

pub use engine::{ActivitySyncEngine, SyncOptions};

/// An activity whose lap detail could not be fetched
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncFailure {
    pub activity_id: u64,
    pub reason: String,
}

/// What a sync run did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    /// Activities not present before
    pub added: usize,
    /// Activities present before whose content changed
    pub updated: usize,
    /// Activities present before and identical now
    pub unchanged: usize,
    /// Activities merged without fresh lap detail
    pub failed: Vec<SyncFailure>,
    /// Activities inside the window that were merged
    pub fetched: usize,
    /// First day of the window
    pub window_start: NaiveDate,
    /// Last day of the window
    pub window_end: NaiveDate,
}

impl Default for SyncResult {
    fn default() -> Self {
        Self {
            added: 0,
            updated: 0,
            unchanged: 0,
            failed: Vec::new(),
            fetched: 0,
            window_start: NaiveDate::MIN,
            window_end: NaiveDate::MIN,
        }
    }
}

impl SyncResult {
    /// `true` when every fetched activity also got its lap detail
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}
