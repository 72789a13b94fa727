//! Bounded, deterministic grounding context for the LLM
//!
//! [`ChatContextBuilder::build`] renders a [`Snapshot`] into plain text that
//! never exceeds a character budget. Content is added in priority order:
//!
//! 1. Summary: date range, counts, and per-type totals. If the whole
//!    summary does not fit, its lines are kept in order as far as they go
//! 2. Activities newest first, each with its laps; when a full block does
//!    not fit, the activity line alone is tried before giving up
//! 3. A note saying what was left out, for which room is reserved up front
//!
//! Output depends only on the snapshot and the budget: maps are ordered,
//! floats use fixed precision, and no clock is read.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::activity::{format_duration, format_pace, pace_from_distance, ActivityRecord, LapRecord};
use crate::store::Snapshot;

/// Rendered context plus what it left out
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GroundingContext {
    /// Text to place in the prompt; at most `budget` characters
    pub text: String,
    /// Whether anything was omitted
    pub truncated: bool,
    /// Activities rendered (with or without laps)
    pub included_activities: usize,
    /// Activities not rendered at all
    pub omitted_activities: usize,
    /// Activities in the snapshot
    pub total_activities: usize,
}

impl GroundingContext {
    /// `true` when the snapshot had nothing to ground on
    pub fn has_no_data(&self) -> bool {
        self.total_activities == 0
    }

    /// Length of `text` in characters
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Renders snapshots into grounding contexts
#[derive(Debug, Clone, Copy, Default)]
pub struct ChatContextBuilder;

struct Block {
    full: String,
    line_only: String,
    has_laps: bool,
}

impl ChatContextBuilder {
    /// Render `snapshot` within `budget` characters.
    ///
    /// Never fails: a budget too small for even the truncation note yields
    /// empty text with `truncated` set.
    ///
    /// # Examples
    ///
    /// ```
    /// use fitchat::chat::ChatContextBuilder;
    /// use fitchat::store::Snapshot;
    ///
    /// let context = ChatContextBuilder::build(&Snapshot::default(), 10);
    /// assert!(context.has_no_data());
    /// assert!(context.char_len() <= 10);
    /// ```
    pub fn build(snapshot: &Snapshot, budget: usize) -> GroundingContext {
        let total = snapshot.len();
        if total == 0 {
            let text = "No activity data available.";
            return GroundingContext {
                text: fit_or_empty(text, budget),
                truncated: text.chars().count() > budget,
                ..GroundingContext::default()
            };
        }

        let mut activities: Vec<&ActivityRecord> = snapshot.activities.values().collect();
        activities.sort_by(|a, b| {
            b.start_time_local
                .cmp(&a.start_time_local)
                .then(b.id.cmp(&a.id))
        });

        let summary_block = render_summary(snapshot, &activities);
        let summary = summary_block.full();
        let blocks: Vec<Block> = activities.iter().map(|a| render_block(a)).collect();

        let full_len = chars(&summary) + blocks.iter().map(|b| chars(&b.full)).sum::<usize>();
        if full_len <= budget {
            let mut text = summary;
            for block in &blocks {
                text.push_str(&block.full);
            }
            return GroundingContext {
                text,
                truncated: false,
                included_activities: total,
                omitted_activities: 0,
                total_activities: total,
            };
        }

        // Worst-case note: every number at its maximum digit count.
        let reserve = chars(&truncation_note(total, total));
        if chars(&summary) + reserve > budget {
            return GroundingContext {
                text: partial_summary(&summary_block, total, reserve, budget),
                truncated: true,
                included_activities: 0,
                omitted_activities: total,
                total_activities: total,
            };
        }

        let mut text = summary;
        let mut used = chars(&text);
        let mut included = 0usize;
        let mut laps_dropped = 0usize;
        for block in &blocks {
            let full = chars(&block.full);
            let line = chars(&block.line_only);
            if used + full + reserve <= budget {
                text.push_str(&block.full);
                used += full;
            } else if used + line + reserve <= budget {
                text.push_str(&block.line_only);
                used += line;
                if block.has_laps {
                    laps_dropped += 1;
                }
            } else {
                break;
            }
            included += 1;
        }

        let omitted = total - included;
        text.push_str(&truncation_note(omitted, laps_dropped));

        GroundingContext {
            text,
            truncated: true,
            included_activities: included,
            omitted_activities: omitted,
            total_activities: total,
        }
    }
}

fn chars(s: &str) -> usize {
    s.chars().count()
}

fn fit_or_empty(text: &str, budget: usize) -> String {
    if chars(text) <= budget {
        text.to_string()
    } else {
        String::new()
    }
}

/// Summary lines that fit ahead of the note, in order, with no activity
/// detail. Without room for the header and counts line only the note is
/// returned (or nothing, if even that does not fit).
fn partial_summary(summary: &Summary, total: usize, reserve: usize, budget: usize) -> String {
    let note = truncation_note(total, 0);
    let mut text = String::new();
    let mut used = 0usize;
    let mut kept = 0usize;
    for line in &summary.stats {
        let len = chars(line);
        if used + len + reserve > budget {
            break;
        }
        text.push_str(line);
        used += len;
        kept += 1;
    }

    if kept < MIN_SUMMARY_LINES {
        return fit_or_empty(note.trim_start(), budget);
    }
    text.push_str(&note);
    text
}

fn truncation_note(omitted: usize, laps_dropped: usize) -> String {
    format!(
        "\n[context truncated: {} activities omitted, {} lap breakdowns omitted]\n",
        omitted, laps_dropped
    )
}

/// Header plus counts line
const MIN_SUMMARY_LINES: usize = 2;

/// Summary section split into droppable pieces, highest priority first
struct Summary {
    /// Header, counts, last sync, then one entry per activity type (the
    /// first carrying the section heading)
    stats: Vec<String>,
    /// Heading that introduces the per-activity detail
    activities_heading: String,
}

impl Summary {
    fn full(&self) -> String {
        let mut out = self.stats.concat();
        out.push_str(&self.activities_heading);
        out
    }
}

#[derive(Default)]
struct TypeTotals {
    count: usize,
    distance_meters: f64,
    duration_seconds: f64,
}

fn render_summary(snapshot: &Snapshot, newest_first: &[&ActivityRecord]) -> Summary {
    let mut stats = vec!["# Activity data\n".to_string()];

    let newest = newest_first.first().map(|a| a.date());
    let oldest = newest_first.last().map(|a| a.date());
    if let (Some(oldest), Some(newest)) = (oldest, newest) {
        stats.push(format!(
            "Activities: {} (from {} to {})\n",
            newest_first.len(),
            oldest,
            newest
        ));
    }
    if let Some(last_sync) = snapshot.last_sync {
        stats.push(format!("Last sync: {}\n", last_sync.format("%Y-%m-%d %H:%M UTC")));
    }

    let mut by_type: BTreeMap<&str, TypeTotals> = BTreeMap::new();
    for activity in newest_first {
        let totals = by_type.entry(activity.activity_type.as_str()).or_default();
        totals.count += 1;
        totals.distance_meters += activity.distance_meters;
        totals.duration_seconds += activity.duration_seconds;
    }

    for (i, (kind, totals)) in by_type.iter().enumerate() {
        let mut line = if i == 0 {
            "\n## Totals by type\n".to_string()
        } else {
            String::new()
        };
        let _ = write!(
            line,
            "- {}: {} activities, {:.2} km, {}",
            kind,
            totals.count,
            totals.distance_meters / 1000.0,
            format_duration(totals.duration_seconds)
        );
        if let Some(pace) = pace_from_distance(totals.distance_meters, totals.duration_seconds) {
            let _ = write!(line, ", avg pace {}", format_pace(pace));
        }
        line.push('\n');
        stats.push(line);
    }

    Summary {
        stats,
        activities_heading: "\n## Activities (newest first)\n".to_string(),
    }
}

fn render_block(activity: &ActivityRecord) -> Block {
    let mut line = format!(
        "- {} | {} | {:.2} km | {}",
        activity.start_time_local.format("%Y-%m-%d %H:%M"),
        activity.activity_type,
        activity.distance_meters / 1000.0,
        format_duration(activity.duration_seconds)
    );
    if !activity.name.is_empty() {
        let _ = write!(line, " | \"{}\"", activity.name);
    }
    if let Some(pace) = activity.average_pace_seconds_per_km {
        let _ = write!(line, " | pace {}", format_pace(pace));
    }
    if let Some(hr) = activity.average_heart_rate {
        let _ = write!(line, " | avg HR {:.0}", hr);
    }
    if let Some(hr) = activity.max_heart_rate {
        let _ = write!(line, " | max HR {:.0}", hr);
    }
    let _ = write!(line, " | id {}", activity.id);
    line.push('\n');

    let mut full = line.clone();
    for lap in &activity.laps {
        full.push_str(&render_lap(lap));
    }

    Block {
        full,
        line_only: line,
        has_laps: !activity.laps.is_empty(),
    }
}

fn render_lap(lap: &LapRecord) -> String {
    let mut out = format!(
        "  - lap {}: {:.2} km, {}",
        lap.lap_index + 1,
        lap.distance_meters / 1000.0,
        format_duration(lap.duration_seconds)
    );
    if let Some(pace) = lap.average_pace_seconds_per_km {
        let _ = write!(out, ", pace {}", format_pace(pace));
    }
    if let Some(hr) = lap.average_heart_rate {
        let _ = write!(out, ", HR {:.0}", hr);
    }
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::merge;
    use chrono::NaiveDate;

    fn activity(id: u64, day: u32, laps: usize) -> ActivityRecord {
        let mut a = ActivityRecord::new(
            id,
            "running",
            NaiveDate::from_ymd_opt(2024, 7, day)
                .unwrap()
                .and_hms_opt(6, 0, 0)
                .unwrap(),
            3000.0,
            10_000.0,
        );
        a.average_heart_rate = Some(151.4);
        a.laps = (0..laps)
            .map(|i| LapRecord {
                lap_index: i as u32,
                distance_meters: 1000.0,
                duration_seconds: 300.0,
                average_heart_rate: Some(150.0),
                average_pace_seconds_per_km: Some(300.0),
            })
            .collect();
        a
    }

    fn snapshot(n: u64) -> Snapshot {
        merge(
            Snapshot::default(),
            (1..=n).map(|i| activity(i, i as u32, 5)),
        )
    }

    #[test]
    fn test_everything_fits() {
        let ctx = ChatContextBuilder::build(&snapshot(3), 100_000);
        assert!(!ctx.truncated);
        assert_eq!(ctx.included_activities, 3);
        assert!(ctx.text.contains("running: 3 activities, 30.00 km, 2:30:00, avg pace 5:00/km"));
        assert!(ctx.text.contains("lap 5: 1.00 km"));
        assert!(!ctx.text.contains("context truncated"));
    }

    #[test]
    fn test_newest_first() {
        let ctx = ChatContextBuilder::build(&snapshot(3), 100_000);
        let p3 = ctx.text.find("id 3").unwrap();
        let p1 = ctx.text.find("id 1").unwrap();
        assert!(p3 < p1);
    }

    #[test]
    fn test_truncation_respects_budget_and_reports() {
        let full = ChatContextBuilder::build(&snapshot(20), usize::MAX);
        let budget = full.char_len() / 2;
        let ctx = ChatContextBuilder::build(&snapshot(20), budget);
        assert!(ctx.truncated);
        assert!(ctx.char_len() <= budget);
        assert!(ctx.omitted_activities > 0);
        assert_eq!(ctx.included_activities + ctx.omitted_activities, 20);
        assert!(ctx.text.contains("context truncated"));
        // The newest activity is always kept first.
        assert!(ctx.text.contains("id 20"));
    }

    #[test]
    fn test_laps_dropped_before_activity() {
        let snap = snapshot(1);
        let full = ChatContextBuilder::build(&snap, usize::MAX);
        let ctx = ChatContextBuilder::build(&snap, full.char_len() - 1);
        assert!(ctx.truncated);
        assert_eq!(ctx.included_activities, 1);
        assert!(ctx.text.contains("id 1"));
        assert!(!ctx.text.contains("lap 1:"));
        assert!(ctx.text.contains("1 lap breakdowns omitted"));
    }

    #[test]
    fn test_tiny_budgets_degrade() {
        let snap = snapshot(5);
        for budget in [0, 1, 10, 40, 80, 200] {
            let ctx = ChatContextBuilder::build(&snap, budget);
            assert!(ctx.char_len() <= budget, "budget {budget}");
            assert!(ctx.truncated);
        }
        assert!(ChatContextBuilder::build(&snap, 0).text.is_empty());
    }

    fn many_types(n: u64) -> Snapshot {
        merge(
            Snapshot::default(),
            (1..=n).map(|i| {
                let mut a = activity(i, (i % 28 + 1) as u32, 0);
                a.activity_type = format!("sport_type_number_{:02}", i);
                a
            }),
        )
    }

    #[test]
    fn test_summary_degrades_line_by_line() {
        let snap = many_types(30);
        let mut activities: Vec<&ActivityRecord> = snap.activities.values().collect();
        activities.sort_by(|a, b| b.start_time_local.cmp(&a.start_time_local).then(b.id.cmp(&a.id)));
        let summary = render_summary(&snap, &activities).full();

        let budget = chars(&summary);
        let ctx = ChatContextBuilder::build(&snap, budget);
        assert!(ctx.truncated);
        assert!(ctx.char_len() <= budget);
        assert_eq!(ctx.included_activities, 0);
        assert_eq!(ctx.omitted_activities, 30);
        assert!(ctx.text.starts_with("# Activity data\nActivities: 30 (from "));
        assert!(ctx.text.contains("## Totals by type\n- sport_type_number_01: 1 activities"));
        assert!(!ctx.text.contains("sport_type_number_30"));
        assert!(!ctx.text.contains("## Activities (newest first)"));
        assert!(ctx.text.ends_with("[context truncated: 30 activities omitted, 0 lap breakdowns omitted]\n"));
    }

    #[test]
    fn test_summary_keeps_counts_when_no_type_line_fits() {
        let snap = many_types(30);
        let full = ChatContextBuilder::build(&snap, usize::MAX);
        let counts_end = full.text.find("\n\n## Totals").unwrap() + 1;
        let reserve = chars(&truncation_note(30, 30));

        let ctx = ChatContextBuilder::build(&snap, counts_end + reserve);
        assert!(ctx.text.contains("Activities: 30 (from "));
        assert!(!ctx.text.contains("## Totals by type"));
        assert!(ctx.text.contains("[context truncated: 30 activities omitted"));

        // One character short of header + counts + note: note alone.
        let ctx = ChatContextBuilder::build(&snap, counts_end + reserve - 1);
        assert!(!ctx.text.contains("Activities: 30"));
        assert!(ctx.text.starts_with("[context truncated: 30 activities omitted"));
    }

    #[test]
    fn test_deterministic() {
        let snap = snapshot(10);
        let a = ChatContextBuilder::build(&snap, 1500);
        let b = ChatContextBuilder::build(&snap.clone(), 1500);
        assert_eq!(a, b);
    }

    #[test]
    fn test_multibyte_names_count_chars() {
        let mut a = activity(1, 1, 0);
        a.name = "Läufchen über den Berg 🏃".to_string();
        let snap = merge(Snapshot::default(), vec![a]);
        let full = ChatContextBuilder::build(&snap, usize::MAX);
        let exact = ChatContextBuilder::build(&snap, full.char_len());
        assert!(!exact.truncated);
        assert!(exact.text.len() > exact.char_len());
    }
}
