//! Wire types for the remote activity service
//!
//! Vendor payloads are deserialized into these private-ish DTOs and
//! converted to [`ActivityRecord`] / [`LapRecord`] / [`Session`] right away.
//! Unknown fields are ignored by serde and never reach the local store.

use chrono::{Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::activity::{pace_from_speed, ActivityRecord, LapRecord};
use crate::auth::Session;

/// Timestamp format used by the service for `startTimeLocal`
pub const VENDOR_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Activity summary as returned by the activity search endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySummaryDto {
    pub activity_id: u64,
    #[serde(default)]
    pub activity_name: Option<String>,
    #[serde(default)]
    pub activity_type: Option<ActivityTypeDto>,
    #[serde(default)]
    pub start_time_local: Option<String>,
    #[serde(default)]
    pub distance: Option<f64>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default, rename = "averageHR")]
    pub average_hr: Option<f64>,
    #[serde(default, rename = "maxHR")]
    pub max_hr: Option<f64>,
    #[serde(default)]
    pub average_speed: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityTypeDto {
    pub type_key: String,
}

/// Response of the per-activity splits endpoint
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitsDto {
    #[serde(default, rename = "lapDTOs")]
    pub lap_dtos: Vec<LapDto>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LapDto {
    #[serde(default)]
    pub lap_index: Option<u32>,
    #[serde(default)]
    pub distance: Option<f64>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub average_speed: Option<f64>,
    #[serde(default, rename = "averageHR", alias = "averageHeartRate")]
    pub average_hr: Option<f64>,
}

impl ActivitySummaryDto {
    /// Convert to an [`ActivityRecord`] without laps.
    ///
    /// Returns `None` when the summary has no parseable start time; such
    /// entries cannot be placed in the sync window and are skipped.
    pub fn into_record(self) -> Option<ActivityRecord> {
        let start = self.start_time_local.as_deref()?;
        let start_time_local = match NaiveDateTime::parse_from_str(start, VENDOR_TIME_FORMAT) {
            Ok(t) => t,
            Err(e) => {
                tracing::debug!(activity_id = self.activity_id, "Skipping activity with bad start time {:?}: {}", start, e);
                return None;
            }
        };

        Some(ActivityRecord {
            id: self.activity_id,
            name: self.activity_name.unwrap_or_default(),
            activity_type: self
                .activity_type
                .map(|t| t.type_key)
                .unwrap_or_else(|| "unknown".to_string()),
            start_time_local,
            duration_seconds: self.duration.unwrap_or(0.0),
            distance_meters: self.distance.unwrap_or(0.0),
            average_heart_rate: self.average_hr,
            max_heart_rate: self.max_hr,
            average_pace_seconds_per_km: pace_from_speed(self.average_speed),
            laps: Vec::new(),
        })
    }
}

impl SplitsDto {
    /// Convert to [`LapRecord`]s ordered by the vendor's lap index and
    /// renumbered from zero.
    pub fn into_laps(self) -> Vec<LapRecord> {
        let mut laps: Vec<(usize, LapDto)> = self.lap_dtos.into_iter().enumerate().collect();
        // Laps without a vendor index keep their position relative to each other.
        laps.sort_by_key(|(pos, lap)| (lap.lap_index.unwrap_or(u32::MAX), *pos));

        laps.into_iter()
            .enumerate()
            .map(|(i, (_, lap))| LapRecord {
                lap_index: i as u32,
                distance_meters: lap.distance.unwrap_or(0.0),
                duration_seconds: lap.duration.unwrap_or(0.0),
                average_heart_rate: lap.average_hr,
                average_pace_seconds_per_km: pace_from_speed(lap.average_speed),
            })
            .collect()
    }
}

/// Login request body
#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// MFA completion request body
#[derive(Debug, Serialize)]
pub struct MfaRequest<'a> {
    pub challenge_id: &'a str,
    pub code: &'a str,
}

/// Token refresh request body
#[derive(Debug, Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

/// Token endpoint response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<i64>,
}

impl TokenResponse {
    pub fn into_session(self) -> Session {
        Session::new(
            self.access_token,
            self.refresh_token,
            self.expires_in.map(|secs| Utc::now() + Duration::seconds(secs)),
        )
    }
}

/// Login endpoint response: either tokens or a second-factor challenge
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LoginResponseDto {
    Mfa {
        mfa_required: bool,
        challenge_id: String,
    },
    Tokens(TokenResponse),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_conversion() {
        let json = r#"{
            "activityId": 123,
            "activityName": "Morning Run",
            "activityType": {"typeKey": "running", "typeId": 1},
            "startTimeLocal": "2024-05-04 06:30:00",
            "distance": 10000.0,
            "duration": 3000.0,
            "averageHR": 150.0,
            "maxHR": 172.0,
            "averageSpeed": 4.0,
            "elevationGain": 55.0,
            "deviceId": 999
        }"#;
        let dto: ActivitySummaryDto = serde_json::from_str(json).unwrap();
        let record = dto.into_record().unwrap();
        assert_eq!(record.id, 123);
        assert_eq!(record.name, "Morning Run");
        assert_eq!(record.activity_type, "running");
        assert_eq!(record.start_time_local.to_string(), "2024-05-04 06:30:00");
        assert_eq!(record.average_heart_rate, Some(150.0));
        assert_eq!(record.max_heart_rate, Some(172.0));
        assert_eq!(record.average_pace_seconds_per_km, Some(250.0));
        assert!(record.laps.is_empty());
    }

    #[test]
    fn test_summary_without_start_time_is_skipped() {
        let dto: ActivitySummaryDto =
            serde_json::from_str(r#"{"activityId": 1, "activityType": {"typeKey": "running"}}"#)
                .unwrap();
        assert!(dto.into_record().is_none());

        let dto: ActivitySummaryDto =
            serde_json::from_str(r#"{"activityId": 1, "startTimeLocal": "yesterday"}"#).unwrap();
        assert!(dto.into_record().is_none());
    }

    #[test]
    fn test_summary_zero_speed_has_no_pace() {
        let dto: ActivitySummaryDto = serde_json::from_str(
            r#"{"activityId": 5, "startTimeLocal": "2024-01-01 00:00:00", "averageSpeed": 0.0}"#,
        )
        .unwrap();
        let record = dto.into_record().unwrap();
        assert_eq!(record.activity_type, "unknown");
        assert!(record.average_pace_seconds_per_km.is_none());
    }

    #[test]
    fn test_laps_are_sorted_and_renumbered() {
        let json = r#"{"lapDTOs": [
            {"lapIndex": 3, "distance": 300.0, "duration": 90.0, "averageSpeed": 3.3},
            {"lapIndex": 1, "distance": 1000.0, "duration": 300.0, "averageHR": 140.0},
            {"lapIndex": 2, "distance": 1000.0, "duration": 290.0, "averageHeartRate": 150.0}
        ]}"#;
        let laps = serde_json::from_str::<SplitsDto>(json).unwrap().into_laps();
        assert_eq!(laps.len(), 3);
        assert_eq!(
            laps.iter().map(|l| l.lap_index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(laps[0].distance_meters, 1000.0);
        assert_eq!(laps[0].average_heart_rate, Some(140.0));
        assert_eq!(laps[1].average_heart_rate, Some(150.0));
        assert_eq!(laps[2].distance_meters, 300.0);
    }

    #[test]
    fn test_missing_lap_list_is_empty() {
        let laps = serde_json::from_str::<SplitsDto>("{}").unwrap().into_laps();
        assert!(laps.is_empty());
    }

    #[test]
    fn test_login_response_variants() {
        let mfa: LoginResponseDto =
            serde_json::from_str(r#"{"mfa_required": true, "challenge_id": "abc"}"#).unwrap();
        assert!(matches!(mfa, LoginResponseDto::Mfa { ref challenge_id, .. } if challenge_id == "abc"));

        let tokens: LoginResponseDto = serde_json::from_str(
            r#"{"access_token": "a", "refresh_token": "r", "expires_in": 3600}"#,
        )
        .unwrap();
        match tokens {
            LoginResponseDto::Tokens(t) => {
                let session = t.into_session();
                assert_eq!(session.access_token, "a");
                assert!(!session.is_expired());
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
