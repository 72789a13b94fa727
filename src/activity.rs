//! Activity records as stored locally
//!
//! These are the fixed, vendor-independent shapes that the rest of the
//! application works with. Vendor payloads are converted into them at the
//! remote boundary (see `remote::types`); unknown vendor fields never get
//! this far.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// A single synchronized activity.
///
/// `id` is assigned by the remote service and is the natural key: a resync
/// overwrites the record with the same id, never duplicates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    /// Remote-assigned identifier
    pub id: u64,

    /// Display name given by the user or the device
    #[serde(default)]
    pub name: String,

    /// Activity type key, e.g. `running` or `trail_running`
    pub activity_type: String,

    /// Start time in the athlete's local time zone
    pub start_time_local: NaiveDateTime,

    /// Elapsed duration in seconds
    pub duration_seconds: f64,

    /// Distance in meters
    pub distance_meters: f64,

    /// Average heart rate (bpm)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_heart_rate: Option<f64>,

    /// Maximum heart rate (bpm)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_heart_rate: Option<f64>,

    /// Average pace in seconds per kilometer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_pace_seconds_per_km: Option<f64>,

    /// Laps ordered by `lap_index`
    #[serde(default)]
    pub laps: Vec<LapRecord>,
}

/// One lap (split) of an activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LapRecord {
    /// Zero-based position within the parent activity
    pub lap_index: u32,

    /// Distance in meters
    pub distance_meters: f64,

    /// Duration in seconds
    pub duration_seconds: f64,

    /// Average heart rate (bpm)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_heart_rate: Option<f64>,

    /// Average pace in seconds per kilometer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_pace_seconds_per_km: Option<f64>,
}

impl ActivityRecord {
    /// Local calendar date the activity started on
    pub fn date(&self) -> NaiveDate {
        self.start_time_local.date()
    }

    /// Case-insensitive substring match against the activity type.
    ///
    /// `None` matches everything, so `Some("running")` matches both
    /// `running` and `trail_running`.
    ///
    /// # Examples
    ///
    /// ```
    /// use fitchat::activity::ActivityRecord;
    /// use chrono::NaiveDate;
    ///
    /// let start = NaiveDate::from_ymd_opt(2024, 3, 1)
    ///     .unwrap()
    ///     .and_hms_opt(7, 0, 0)
    ///     .unwrap();
    /// let activity = ActivityRecord::new(1, "trail_running", start, 3600.0, 10_000.0);
    /// assert!(activity.matches_type(Some("Running")));
    /// assert!(activity.matches_type(None));
    /// assert!(!activity.matches_type(Some("cycling")));
    /// ```
    pub fn matches_type(&self, filter: Option<&str>) -> bool {
        match filter {
            None => true,
            Some(f) => self
                .activity_type
                .to_lowercase()
                .contains(&f.trim().to_lowercase()),
        }
    }

    /// Minimal constructor used by the remote fakes and tests
    pub fn new(
        id: u64,
        activity_type: impl Into<String>,
        start_time_local: NaiveDateTime,
        duration_seconds: f64,
        distance_meters: f64,
    ) -> Self {
        Self {
            id,
            name: String::new(),
            activity_type: activity_type.into(),
            start_time_local,
            duration_seconds,
            distance_meters,
            average_heart_rate: None,
            max_heart_rate: None,
            average_pace_seconds_per_km: pace_from_distance(distance_meters, duration_seconds),
            laps: Vec::new(),
        }
    }

    /// A single lap covering the whole activity, for when the service
    /// reports no laps at all.
    pub fn synthetic_lap(&self) -> LapRecord {
        LapRecord {
            lap_index: 0,
            distance_meters: self.distance_meters,
            duration_seconds: self.duration_seconds,
            average_heart_rate: self.average_heart_rate,
            average_pace_seconds_per_km: self.average_pace_seconds_per_km,
        }
    }
}

/// Convert a speed in meters per second to seconds per kilometer.
///
/// Zero, negative or non-finite speeds have no meaningful pace.
pub fn pace_from_speed(speed_mps: Option<f64>) -> Option<f64> {
    match speed_mps {
        Some(s) if s.is_finite() && s > 0.0 => Some(1000.0 / s),
        _ => None,
    }
}

/// Pace derived from total distance and duration.
pub fn pace_from_distance(distance_meters: f64, duration_seconds: f64) -> Option<f64> {
    if distance_meters > 0.0 && duration_seconds.is_finite() && duration_seconds > 0.0 {
        Some(duration_seconds / (distance_meters / 1000.0))
    } else {
        None
    }
}

/// Format a pace as `m:ss/km`.
///
/// # Examples
///
/// ```
/// use fitchat::activity::format_pace;
///
/// assert_eq!(format_pace(330.4), "5:30/km");
/// assert_eq!(format_pace(59.6), "1:00/km");
/// ```
pub fn format_pace(seconds_per_km: f64) -> String {
    let total = seconds_per_km.round().max(0.0) as u64;
    format!("{}:{:02}/km", total / 60, total % 60)
}

/// Format a duration as `h:mm:ss` (or `m:ss` under an hour).
///
/// # Examples
///
/// ```
/// use fitchat::activity::format_duration;
///
/// assert_eq!(format_duration(3725.0), "1:02:05");
/// assert_eq!(format_duration(305.0), "5:05");
/// ```
pub fn format_duration(seconds: f64) -> String {
    let total = seconds.round().max(0.0) as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}
