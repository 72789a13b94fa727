//! Durable local store of synchronized activities
//!
//! The whole [`Snapshot`] lives in one JSON file. Loading a missing file
//! yields an empty snapshot; loading a file that cannot be parsed is a
//! [`FitchatError::StoreCorruption`]. Writes go through
//! [`atomic::write_atomic`], so the file is always either the previous or
//! the new snapshot.

pub mod atomic;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::activity::ActivityRecord;
use crate::error::{FitchatError, Result};

/// Version written into every snapshot file
pub const SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Everything the store knows, keyed by activity id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// File format version
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Activities keyed by remote id
    #[serde(default)]
    pub activities: BTreeMap<u64, ActivityRecord>,

    /// When the last successful sync finished
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            activities: BTreeMap::new(),
            last_sync: None,
        }
    }
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }

    pub fn len(&self) -> usize {
        self.activities.len()
    }

    /// Summary figures for display
    pub fn stats(&self) -> StoreStats {
        let first = self.activities.values().map(ActivityRecord::date).min();
        let last = self.activities.values().map(ActivityRecord::date).max();
        StoreStats {
            activity_count: self.activities.len(),
            lap_count: self.activities.values().map(|a| a.laps.len()).sum(),
            first_activity: first,
            last_activity: last,
            last_sync: self.last_sync,
        }
    }
}

/// Summary of what a snapshot holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    pub activity_count: usize,
    pub lap_count: usize,
    pub first_activity: Option<NaiveDate>,
    pub last_activity: Option<NaiveDate>,
    pub last_sync: Option<DateTime<Utc>>,
}

/// Keyed union of `snapshot` and `new_activities`; new entries win.
///
/// Pure: the input snapshot is consumed and returned updated, nothing
/// touches the disk.
///
/// # Examples
///
/// ```
/// use fitchat::activity::ActivityRecord;
/// use fitchat::store::{merge, Snapshot};
/// use chrono::NaiveDate;
///
/// let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(8, 0, 0).unwrap();
/// let a = ActivityRecord::new(1, "running", start, 1800.0, 5000.0);
/// let mut b = a.clone();
/// b.distance_meters = 5100.0;
///
/// let merged = merge(merge(Snapshot::default(), vec![a]), vec![b.clone()]);
/// assert_eq!(merged.len(), 1);
/// assert_eq!(merged.activities[&1], b);
/// ```
pub fn merge(mut snapshot: Snapshot, new_activities: impl IntoIterator<Item = ActivityRecord>) -> Snapshot {
    for activity in new_activities {
        snapshot.activities.insert(activity.id, activity);
    }
    snapshot
}

/// JSON-file-backed snapshot store
#[derive(Debug, Clone)]
pub struct LocalStore {
    path: PathBuf,
}

impl LocalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the snapshot file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the snapshot from disk.
    ///
    /// # Returns
    ///
    /// An empty snapshot when the file does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns `StoreCorruption` if the file cannot be read, is not valid
    /// JSON for a snapshot, or was written by an unknown schema version
    pub fn load(&self) -> Result<Snapshot> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No local store yet, starting empty");
                return Ok(Snapshot::default());
            }
            Err(e) => return Err(self.corruption(e.to_string())),
        };

        let snapshot: Snapshot =
            serde_json::from_str(&contents).map_err(|e| self.corruption(e.to_string()))?;

        if snapshot.schema_version != SCHEMA_VERSION {
            return Err(self.corruption(format!(
                "unsupported schema version {} (expected {})",
                snapshot.schema_version, SCHEMA_VERSION
            )));
        }

        tracing::debug!(path = %self.path.display(), activities = snapshot.len(), "Loaded local store");
        Ok(snapshot)
    }

    /// Write `snapshot` atomically, replacing the previous file.
    ///
    /// # Errors
    ///
    /// Returns `Io` or `Serialization` on failure; the previous file is
    /// left intact
    pub fn persist(&self, snapshot: &Snapshot) -> Result<()> {
        let json = serde_json::to_vec_pretty(snapshot)?;
        atomic::write_atomic(&self.path, &json)?;
        tracing::info!(path = %self.path.display(), activities = snapshot.len(), "Persisted local store");
        Ok(())
    }

    fn corruption(&self, reason: String) -> anyhow::Error {
        FitchatError::StoreCorruption {
            path: self.path.clone(),
            reason,
        }
        .into()
    }
}
