//! # Trajectory Analytics
//!
//! The fixed battery of computations run after ingestion completes, against
//! a now-static dataset. Each scan is a single linear pass over rows the
//! store returns pre-joined and pre-ordered by activity; grouping is implicit
//! in contiguous equal `activity_id` runs, and all accumulator state is local
//! to the scan. Everything here is read-only and stateless across
//! invocations.
//!
//! The scans are plain functions over row slices so they can be exercised
//! without a database; each has a store-backed wrapper pairing it with its
//! query.

use chrono::{Datelike, Duration, NaiveDateTime};
use serde::Serialize;

use crate::error::Result;
use crate::geo_utils::haversine_km;
use crate::store::Store;
use crate::ALTITUDE_SENTINEL;

// ============================================================================
// Row Types (the store's pre-ordered scan inputs)
// ============================================================================

/// One (activity, lat, lon) row for distance accumulation.
#[derive(Debug, Clone, PartialEq)]
pub struct PointRow {
    pub activity_id: i64,
    pub lat: f64,
    pub lon: f64,
}

/// One (user, activity, altitude) row for altitude-gain scans.
#[derive(Debug, Clone, PartialEq)]
pub struct AltitudeRow {
    pub user_id: String,
    pub activity_id: i64,
    pub altitude: i32,
}

/// One (user, activity, timestamp) row for temporal-gap scans.
#[derive(Debug, Clone, PartialEq)]
pub struct TimestampRow {
    pub user_id: String,
    pub activity_id: i64,
    pub time: NaiveDateTime,
}

/// One (user, mode, count) row, pre-aggregated and pre-sorted by user
/// ascending then count descending.
#[derive(Debug, Clone, PartialEq)]
pub struct ModeUsageRow {
    pub user_id: String,
    pub mode: String,
    pub count: i64,
}

// ============================================================================
// Result Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableCounts {
    pub users: i64,
    pub activities: i64,
    pub trackpoints: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserActivityCount {
    pub user_id: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModeCount {
    pub mode: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AltitudeGain {
    pub user_id: String,
    /// Total gained altitude in feet, sentinel samples excluded.
    pub total_gain: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvalidActivityCount {
    pub user_id: String,
    /// One increment per consecutive pair with a gap of five minutes or
    /// more — per gap, not per activity.
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserMode {
    pub user_id: String,
    pub mode: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearCount {
    pub year: i32,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearHours {
    pub year: i32,
    pub hours: i64,
}

/// Both halves of the busiest-year question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearSummary {
    pub most_activities: Option<YearCount>,
    pub most_recorded_hours: Option<YearHours>,
}

// ============================================================================
// Scans
// ============================================================================

/// Minimum temporal gap that marks a consecutive pair invalid.
const INVALID_GAP_MINUTES: i64 = 5;

/// Sum the great-circle distance (km) between consecutive points of the same
/// activity. On an activity change the comparison basis resets to the new
/// row, so no cross-activity segment is ever added.
pub fn accumulate_distance_km(rows: &[PointRow]) -> f64 {
    let mut total = 0.0;
    let mut prev: Option<&PointRow> = None;

    for row in rows {
        if let Some(p) = prev {
            if p.activity_id == row.activity_id {
                total += haversine_km(p.lat, p.lon, row.lat, row.lon);
            }
        }
        prev = Some(row);
    }
    total
}

/// Total altitude gained per user, in first-seen user order.
///
/// Within a run of equal `activity_id`, a positive delta is added whenever
/// the current altitude exceeds the previous and neither equals the sentinel.
/// The previous-altitude reference updates on every row regardless of
/// validity; only the activity-id equality gates whether a delta is computed.
pub fn altitude_gain_totals(rows: &[AltitudeRow]) -> Vec<AltitudeGain> {
    let mut accumulator = OrderedTotals::new();
    let mut prev: Option<(i64, i32)> = None;

    for row in rows {
        if let Some((prev_activity, prev_alt)) = prev {
            if prev_activity == row.activity_id
                && prev_alt != ALTITUDE_SENTINEL
                && row.altitude != ALTITUDE_SENTINEL
                && row.altitude > prev_alt
            {
                accumulator.add(&row.user_id, (row.altitude - prev_alt) as i64);
            }
        }
        prev = Some((row.activity_id, row.altitude));
    }

    accumulator
        .into_entries()
        .into_iter()
        .map(|(user_id, total_gain)| AltitudeGain {
            user_id,
            total_gain,
        })
        .collect()
}

/// The `limit` users with the highest altitude gain, stable-sorted
/// descending so ties keep first-seen order.
pub fn top_altitude_gainers_scan(rows: &[AltitudeRow], limit: usize) -> Vec<AltitudeGain> {
    let mut totals = altitude_gain_totals(rows);
    totals.sort_by(|a, b| b.total_gain.cmp(&a.total_gain));
    totals.truncate(limit);
    totals
}

/// Per-user count of invalid gaps, in first-seen user order.
///
/// A gap is invalid when consecutive timestamps within one activity are five
/// minutes or more apart; every offending pair counts, so one activity with
/// three wide gaps contributes three.
pub fn invalid_gap_counts(rows: &[TimestampRow]) -> Vec<InvalidActivityCount> {
    let mut accumulator = OrderedTotals::new();
    let mut prev: Option<(i64, NaiveDateTime)> = None;

    for row in rows {
        if let Some((prev_activity, prev_time)) = prev {
            if prev_activity == row.activity_id
                && row.time - prev_time >= Duration::minutes(INVALID_GAP_MINUTES)
            {
                accumulator.add(&row.user_id, 1);
            }
        }
        prev = Some((row.activity_id, row.time));
    }

    accumulator
        .into_entries()
        .into_iter()
        .map(|(user_id, count)| InvalidActivityCount {
            user_id,
            count: count as u32,
        })
        .collect()
}

/// Keep the first (user, mode) pair per user from rows pre-sorted by user
/// ascending then count descending. Count ties break on whatever order the
/// aggregation emitted — documented as first-seen.
pub fn most_used_modes(rows: &[ModeUsageRow]) -> Vec<UserMode> {
    let mut result: Vec<UserMode> = Vec::new();

    for row in rows {
        if result.last().map(|m| m.user_id.as_str()) != Some(row.user_id.as_str()) {
            result.push(UserMode {
                user_id: row.user_id.clone(),
                mode: row.mode.clone(),
            });
        }
    }
    result
}

/// Sum recorded hours per year over activity spans. Full durations count,
/// not just the sub-day remainder.
pub fn recorded_hours_by_year(spans: &[(NaiveDateTime, NaiveDateTime)]) -> Vec<YearHours> {
    let mut accumulator = OrderedTotals::new();

    for (start, end) in spans {
        let seconds = (*end - *start).num_seconds().max(0);
        accumulator.add(&start.year().to_string(), seconds);
    }

    accumulator
        .into_entries()
        .into_iter()
        .map(|(year, seconds)| YearHours {
            year: year.parse().unwrap_or(0),
            hours: seconds / 3600,
        })
        .collect()
}

/// Per-key running totals that remember first-seen insertion order, so the
/// stable sorts downstream have a deterministic tie order.
struct OrderedTotals {
    order: Vec<String>,
    totals: std::collections::HashMap<String, i64>,
}

impl OrderedTotals {
    fn new() -> Self {
        Self {
            order: Vec::new(),
            totals: std::collections::HashMap::new(),
        }
    }

    fn add(&mut self, key: &str, amount: i64) {
        if let Some(total) = self.totals.get_mut(key) {
            *total += amount;
        } else {
            self.order.push(key.to_string());
            self.totals.insert(key.to_string(), amount);
        }
    }

    fn into_entries(mut self) -> Vec<(String, i64)> {
        self.order
            .drain(..)
            .map(|key| {
                let total = self.totals[&key];
                (key, total)
            })
            .collect()
    }
}

// ============================================================================
// Store-backed Battery
// ============================================================================

/// Row counts of the three tables.
pub fn table_counts(store: &Store) -> Result<TableCounts> {
    Ok(TableCounts {
        users: store.row_count("User")?,
        activities: store.row_count("Activity")?,
        trackpoints: store.row_count("TrackPoint")?,
    })
}

/// Mean activity count per user; `None` on an empty store.
pub fn average_activities_per_user(store: &Store) -> Result<Option<f64>> {
    store.average_activities_per_user()
}

/// The `limit` users with the most activities.
pub fn most_active_users(store: &Store, limit: u32) -> Result<Vec<UserActivityCount>> {
    Ok(store
        .most_active_users(limit)?
        .into_iter()
        .map(|(user_id, count)| UserActivityCount { user_id, count })
        .collect())
}

/// Users who have at least one activity of the given mode.
pub fn users_with_mode(store: &Store, mode: &str) -> Result<Vec<String>> {
    store.users_with_mode(mode)
}

/// Activity count per labeled transportation mode.
pub fn mode_counts(store: &Store) -> Result<Vec<ModeCount>> {
    Ok(store
        .mode_counts()?
        .into_iter()
        .map(|(mode, count)| ModeCount { mode, count })
        .collect())
}

/// The year with the most activities and the year with the most recorded
/// hours.
pub fn busiest_year(store: &Store) -> Result<YearSummary> {
    let most_activities = store
        .year_with_most_activities()?
        .map(|(year, count)| YearCount { year, count });

    let spans = store.activity_spans()?;
    let most_recorded_hours = recorded_hours_by_year(&spans)
        .into_iter()
        .max_by_key(|y| y.hours);

    Ok(YearSummary {
        most_activities,
        most_recorded_hours,
    })
}

/// Total great-circle distance (km) covered by one user, in one mode, in one
/// year.
pub fn user_distance_km(store: &Store, user_id: &str, mode: &str, year: i32) -> Result<f64> {
    let rows = store.points_for_user_mode_year(user_id, mode, year)?;
    Ok(accumulate_distance_km(&rows))
}

/// The `limit` users who gained the most altitude.
pub fn top_altitude_gainers(store: &Store, limit: usize) -> Result<Vec<AltitudeGain>> {
    let rows = store.altitude_rows()?;
    Ok(top_altitude_gainers_scan(&rows, limit))
}

/// Per-user counts of invalid (≥5 minute) temporal gaps.
pub fn invalid_activities(store: &Store) -> Result<Vec<InvalidActivityCount>> {
    let rows = store.timestamp_rows()?;
    Ok(invalid_gap_counts(&rows))
}

/// Users whose trackpoints round to the given 3-decimal coordinate cell.
pub fn users_at_location(store: &Store, lat: f64, lon: f64) -> Result<Vec<String>> {
    store.users_at_location(lat, lon)
}

/// The most-used transportation mode per labeled user.
pub fn most_used_mode_per_user(store: &Store) -> Result<Vec<UserMode>> {
    let rows = store.mode_usage_rows()?;
    Ok(most_used_modes(&rows))
}

// ============================================================================
// Full Report
// ============================================================================

/// Parameters for the point queries in the full battery.
#[derive(Debug, Clone)]
pub struct ReportParams {
    /// (user, mode, year) for the distance accumulation
    pub distance_user: String,
    pub distance_mode: String,
    pub distance_year: i32,
    /// 3-decimal coordinate cell for the location query
    pub location_lat: f64,
    pub location_lon: f64,
    /// Limit for the ranking queries
    pub top_limit: usize,
}

impl Default for ReportParams {
    fn default() -> Self {
        // The assignment's reference questions: user 112 walking in 2008,
        // and the Forbidden City cell.
        Self {
            distance_user: "112".to_string(),
            distance_mode: "walk".to_string(),
            distance_year: 2008,
            location_lat: 39.916,
            location_lon: 116.397,
            top_limit: 20,
        }
    }
}

/// Results of the whole analytics battery.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsReport {
    pub table_counts: TableCounts,
    pub average_activities_per_user: Option<f64>,
    pub most_active_users: Vec<UserActivityCount>,
    pub taxi_users: Vec<String>,
    pub mode_counts: Vec<ModeCount>,
    pub busiest_year: YearSummary,
    pub distance_km: f64,
    pub top_altitude_gainers: Vec<AltitudeGain>,
    pub invalid_activities: Vec<InvalidActivityCount>,
    pub users_at_location: Vec<String>,
    pub most_used_mode_per_user: Vec<UserMode>,
}

impl AnalyticsReport {
    /// Serialize the report as JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Run the whole battery against an ingested store.
pub fn full_report(store: &Store, params: &ReportParams) -> Result<AnalyticsReport> {
    Ok(AnalyticsReport {
        table_counts: table_counts(store)?,
        average_activities_per_user: average_activities_per_user(store)?,
        most_active_users: most_active_users(store, params.top_limit as u32)?,
        taxi_users: users_with_mode(store, "taxi")?,
        mode_counts: mode_counts(store)?,
        busiest_year: busiest_year(store)?,
        distance_km: user_distance_km(
            store,
            &params.distance_user,
            &params.distance_mode,
            params.distance_year,
        )?,
        top_altitude_gainers: top_altitude_gainers(store, params.top_limit)?,
        invalid_activities: invalid_activities(store)?,
        users_at_location: users_at_location(store, params.location_lat, params.location_lon)?,
        most_used_mode_per_user: most_used_mode_per_user(store)?,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trajectory::combine_date_time;

    fn alt_row(user: &str, activity: i64, altitude: i32) -> AltitudeRow {
        AltitudeRow {
            user_id: user.to_string(),
            activity_id: activity,
            altitude,
        }
    }

    fn ts_row(user: &str, activity: i64, time: &str) -> TimestampRow {
        TimestampRow {
            user_id: user.to_string(),
            activity_id: activity,
            time: combine_date_time("2008-10-23", time).unwrap(),
        }
    }

    #[test]
    fn test_distance_resets_at_activity_boundary() {
        // Three points [A, A, B]: only the A-to-A segment counts.
        let rows = vec![
            PointRow { activity_id: 1, lat: 10.0, lon: 20.0 },
            PointRow { activity_id: 1, lat: 10.0, lon: 20.1 },
            PointRow { activity_id: 2, lat: 50.0, lon: 60.0 },
        ];

        let expected = haversine_km(10.0, 20.0, 10.0, 20.1);
        assert_eq!(accumulate_distance_km(&rows), expected);
    }

    #[test]
    fn test_distance_empty_and_single() {
        assert_eq!(accumulate_distance_km(&[]), 0.0);
        let rows = vec![PointRow { activity_id: 1, lat: 10.0, lon: 20.0 }];
        assert_eq!(accumulate_distance_km(&rows), 0.0);
    }

    #[test]
    fn test_altitude_gain_basic() {
        let rows = vec![
            alt_row("010", 1, 100),
            alt_row("010", 1, 150), // +50
            alt_row("010", 1, 120), // descent, ignored
            alt_row("010", 1, 180), // +60
        ];

        let totals = altitude_gain_totals(&rows);
        assert_eq!(totals, vec![AltitudeGain { user_id: "010".to_string(), total_gain: 110 }]);
    }

    #[test]
    fn test_altitude_sentinel_excluded_both_positions() {
        let rows = vec![
            alt_row("010", 1, 100),
            alt_row("010", 1, -777), // sentinel as current: no delta
            alt_row("010", 1, 200),  // sentinel as previous: no delta
            alt_row("010", 1, 250),  // +50
        ];

        let totals = altitude_gain_totals(&rows);
        assert_eq!(totals[0].total_gain, 50);
    }

    #[test]
    fn test_altitude_gain_resets_at_activity_boundary() {
        let rows = vec![
            alt_row("010", 1, 100),
            alt_row("010", 2, 500), // new activity: no cross-activity delta
            alt_row("010", 2, 510), // +10
        ];

        let totals = altitude_gain_totals(&rows);
        assert_eq!(totals[0].total_gain, 10);
    }

    #[test]
    fn test_top_gainers_stable_ties() {
        let rows = vec![
            alt_row("b", 1, 0),
            alt_row("b", 1, 10),
            alt_row("a", 2, 0),
            alt_row("a", 2, 10),
        ];

        // Equal totals keep first-seen order: "b" was seen first.
        let top = top_altitude_gainers_scan(&rows, 20);
        assert_eq!(top[0].user_id, "b");
        assert_eq!(top[1].user_id, "a");

        let top = top_altitude_gainers_scan(&rows, 1);
        assert_eq!(top.len(), 1);
    }

    #[test]
    fn test_invalid_gaps_per_gap_not_per_activity() {
        // Consecutive deltas of 1, 6, 7, 1 minutes: exactly two invalid gaps.
        let rows = vec![
            ts_row("010", 1, "00:00:00"),
            ts_row("010", 1, "00:01:00"),
            ts_row("010", 1, "00:07:00"),
            ts_row("010", 1, "00:14:00"),
            ts_row("010", 1, "00:15:00"),
        ];

        let counts = invalid_gap_counts(&rows);
        assert_eq!(
            counts,
            vec![InvalidActivityCount { user_id: "010".to_string(), count: 2 }]
        );
    }

    #[test]
    fn test_invalid_gap_exactly_five_minutes_counts() {
        let rows = vec![
            ts_row("010", 1, "00:00:00"),
            ts_row("010", 1, "00:05:00"),
        ];
        assert_eq!(invalid_gap_counts(&rows)[0].count, 1);
    }

    #[test]
    fn test_invalid_gap_ignores_activity_boundary() {
        let rows = vec![
            ts_row("010", 1, "00:00:00"),
            ts_row("010", 2, "03:00:00"), // different activity: not a gap
        ];
        assert!(invalid_gap_counts(&rows).is_empty());
    }

    #[test]
    fn test_most_used_modes_first_wins() {
        let rows = vec![
            ModeUsageRow { user_id: "010".to_string(), mode: "bus".to_string(), count: 9 },
            ModeUsageRow { user_id: "010".to_string(), mode: "walk".to_string(), count: 4 },
            ModeUsageRow { user_id: "020".to_string(), mode: "taxi".to_string(), count: 2 },
        ];

        let modes = most_used_modes(&rows);
        assert_eq!(
            modes,
            vec![
                UserMode { user_id: "010".to_string(), mode: "bus".to_string() },
                UserMode { user_id: "020".to_string(), mode: "taxi".to_string() },
            ]
        );
    }

    #[test]
    fn test_recorded_hours_by_year() {
        let spans = vec![
            (
                combine_date_time("2008-10-23", "00:00:00").unwrap(),
                combine_date_time("2008-10-24", "02:00:00").unwrap(),
            ),
            (
                combine_date_time("2009-01-01", "00:00:00").unwrap(),
                combine_date_time("2009-01-01", "01:30:00").unwrap(),
            ),
        ];

        let hours = recorded_hours_by_year(&spans);
        // The 26-hour span counts in full, not modulo days.
        assert_eq!(hours[0], YearHours { year: 2008, hours: 26 });
        assert_eq!(hours[1], YearHours { year: 2009, hours: 1 });
    }

    #[test]
    fn test_distance_roundtrip_through_store() {
        use crate::TrackPoint;

        let mut store = Store::in_memory().unwrap();
        store.create_tables().unwrap();
        store.insert_user("112", true).unwrap();

        let start = combine_date_time("2008-01-01", "00:00:00").unwrap();
        let end = combine_date_time("2008-01-01", "00:05:00").unwrap();
        let activity_id = store
            .insert_activity("112", Some("walk"), start, end)
            .unwrap();

        let points = vec![
            TrackPoint { lat: 10.0, lon: 20.0, altitude: 100, date_days: 0.1, time: start },
            TrackPoint { lat: 10.0, lon: 20.1, altitude: 100, date_days: 0.1, time: end },
        ];
        store.insert_trackpoints(activity_id, &points, 100).unwrap();

        let distance = user_distance_km(&store, "112", "walk", 2008).unwrap();
        assert_eq!(distance, haversine_km(10.0, 20.0, 10.0, 20.1));

        // Mode and year filters exclude the activity.
        assert_eq!(user_distance_km(&store, "112", "bus", 2008).unwrap(), 0.0);
        assert_eq!(user_distance_km(&store, "112", "walk", 2009).unwrap(), 0.0);
    }

    #[test]
    fn test_full_report_on_empty_store() {
        let store = Store::in_memory().unwrap();
        store.create_tables().unwrap();

        let report = full_report(&store, &ReportParams::default()).unwrap();
        assert_eq!(report.table_counts.users, 0);
        assert_eq!(report.average_activities_per_user, None);
        assert!(report.busiest_year.most_activities.is_none());
        assert!(report.top_altitude_gainers.is_empty());
        assert!(!report.to_json().is_empty());
    }
}
