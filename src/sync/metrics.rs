//! Counters and timings for sync runs
//!
//! Uses the `metrics` facade; without an installed recorder every call is a
//! no-op.
//!
//! # Metrics
//!
//! - `fitchat_sync_runs_total`: completed sync runs, labeled by `outcome`
//! - `fitchat_sync_activities_total`: activities processed, labeled by `result`
//! - `fitchat_sync_lap_failures_total`: lap detail fetches that failed
//! - `fitchat_sync_duration_seconds`: wall time of a sync run

use std::time::Duration;

use metrics::{counter, histogram, increment_counter};

use crate::sync::SyncResult;

/// Record a finished sync run.
pub fn record_success(result: &SyncResult, elapsed: Duration) {
    increment_counter!("fitchat_sync_runs_total", "outcome" => "success");
    counter!("fitchat_sync_activities_total", result.added as u64, "result" => "added");
    counter!("fitchat_sync_activities_total", result.updated as u64, "result" => "updated");
    counter!("fitchat_sync_activities_total", result.unchanged as u64, "result" => "unchanged");
    counter!("fitchat_sync_lap_failures_total", result.failed.len() as u64);
    histogram!("fitchat_sync_duration_seconds", elapsed.as_secs_f64());
}

/// Record a sync run that aborted.
pub fn record_failure(elapsed: Duration) {
    increment_counter!("fitchat_sync_runs_total", "outcome" => "error");
    histogram!("fitchat_sync_duration_seconds", elapsed.as_secs_f64());
}
