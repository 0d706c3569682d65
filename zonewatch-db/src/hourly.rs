//! Hourly batch aggregation (§4.F). The arithmetic itself lives in a pure
//! function (`compute_hour`) so it can be unit-tested without a database —
//! translated from the original `scripts/aggregate_hourly.py` CTE, but
//! extended to the cross-hour starting-occupancy and clipped-dwell
//! semantics SPEC_FULL.md §4.F specifies (the Python query's occupancy
//! window resets to zero at the start of every hour; this one carries it
//! forward, which is the behavior scenario 5 requires).

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::{PgPool, Row};
use tracing::warn;

use zonewatch_core::model::EventKind;

use crate::events::{fetch_zone_event_history, ZoneEventSlice};

#[derive(Debug, Clone, PartialEq)]
pub struct HourlyComputation {
    pub avg_occupancy: f64,
    pub max_occupancy: i32,
    pub avg_dwell_seconds: f64,
    pub total_entries: i32,
    pub starting_occupancy: i32,
}

/// Computes one zone's hourly metrics for the hour `[hour_start, hour_start
/// + 1h)` from its full, already-sorted (`track_id`, `ts`) event history.
/// `events` need not be pre-filtered to any window — all of the zone's
/// history is required to get the starting occupancy and cross-hour dwell
/// right.
pub fn compute_hour(events: &[ZoneEventSlice], hour_start: DateTime<Utc>) -> HourlyComputation {
    let hour_end = hour_start + ChronoDuration::hours(1);

    let starting_occupancy: i32 = events
        .iter()
        .filter(|e| e.ts < hour_start)
        .map(|e| match e.event {
            EventKind::Enter => 1,
            EventKind::Exit => -1,
        })
        .sum();

    if starting_occupancy < 0 {
        warn!(
            hour = %hour_start,
            starting_occupancy,
            "negative starting occupancy — likely a corrupted or out-of-order event stream"
        );
    }

    // Stepwise occupancy timeline: start at `starting_occupancy`, apply each
    // in-hour delta in timestamp order, track duration-weighted average and
    // running max. The segment that starts at `starting_occupancy` itself
    // runs from hour_start until the first in-hour change (or to hour_end
    // if there are none).
    let mut in_hour: Vec<&ZoneEventSlice> = events.iter().filter(|e| e.ts >= hour_start && e.ts < hour_end).collect();
    in_hour.sort_by_key(|e| e.ts);

    let mut occ = starting_occupancy;
    let mut max_occupancy = occ;
    let mut weighted_sum = 0.0f64;
    let mut segment_start = hour_start;

    for e in &in_hour {
        let duration = (e.ts - segment_start).num_milliseconds() as f64 / 1000.0;
        weighted_sum += occ as f64 * duration;
        occ += match e.event {
            EventKind::Enter => 1,
            EventKind::Exit => -1,
        };
        max_occupancy = max_occupancy.max(occ);
        segment_start = e.ts;
    }
    let tail_duration = (hour_end - segment_start).num_milliseconds() as f64 / 1000.0;
    weighted_sum += occ as f64 * tail_duration;
    let avg_occupancy = weighted_sum / 3600.0;

    let total_entries = in_hour.iter().filter(|e| e.event == EventKind::Enter).count() as i32;

    // Dwell pairing: every enter before hour_end, paired with the next
    // exit for the same track (alternation invariant, §3), contributes
    // min(exit, hour_end) - max(enter, hour_start) to this hour whenever
    // that exit exists and lands at or after hour_start.
    let mut dwell_contributions = Vec::new();
    let mut track_events: std::collections::BTreeMap<i32, Vec<&ZoneEventSlice>> = std::collections::BTreeMap::new();
    for e in events {
        track_events.entry(e.track_id).or_default().push(e);
    }
    for track in track_events.values() {
        let mut iter = track.iter().peekable();
        while let Some(e) = iter.next() {
            if e.event != EventKind::Enter || e.ts >= hour_end {
                continue;
            }
            if let Some(next) = iter.peek() {
                if next.event == EventKind::Exit && next.ts >= hour_start {
                    let start = e.ts.max(hour_start);
                    let end = next.ts.min(hour_end);
                    if end > start {
                        dwell_contributions.push((end - start).num_milliseconds() as f64 / 1000.0);
                    }
                }
            }
        }
    }
    let avg_dwell_seconds = if dwell_contributions.is_empty() {
        0.0
    } else {
        dwell_contributions.iter().sum::<f64>() / dwell_contributions.len() as f64
    };

    HourlyComputation {
        avg_occupancy,
        max_occupancy,
        avg_dwell_seconds,
        total_entries,
        starting_occupancy,
    }
}

/// Runs `compute_hour` for a single zone against the store and upserts the
/// result. Idempotent: `ON CONFLICT (ts, zone_id) DO UPDATE` lets the job
/// be safely re-run for any past hour (§4.F "Re-executability").
pub async fn aggregate_zone_hour(pool: &PgPool, zone_id: i32, hour_start: DateTime<Utc>) -> Result<HourlyComputation, sqlx::Error> {
    let events = fetch_zone_event_history(pool, zone_id).await?;
    let computed = compute_hour(&events, hour_start);
    upsert_hourly_metrics(pool, zone_id, hour_start, &computed).await?;
    Ok(computed)
}

pub async fn upsert_hourly_metrics(
    pool: &PgPool,
    zone_id: i32,
    hour_start: DateTime<Utc>,
    computed: &HourlyComputation,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO hourly_metrics (ts, zone_id, avg_occupancy, max_occupancy, avg_dwell_seconds, total_entries)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (ts, zone_id) DO UPDATE SET
            avg_occupancy = EXCLUDED.avg_occupancy,
            max_occupancy = EXCLUDED.max_occupancy,
            avg_dwell_seconds = EXCLUDED.avg_dwell_seconds,
            total_entries = EXCLUDED.total_entries
        "#,
    )
    .bind(hour_start)
    .bind(zone_id)
    .bind(computed.avg_occupancy)
    .bind(computed.max_occupancy)
    .bind(computed.avg_dwell_seconds)
    .bind(computed.total_entries)
    .execute(pool)
    .await?;
    Ok(())
}

/// All zone ids, used by the aggregator binary to iterate the whole fleet
/// for a given target hour.
pub async fn fetch_all_zone_ids(pool: &PgPool) -> Result<Vec<i32>, sqlx::Error> {
    let rows = sqlx::query("SELECT id FROM zones ORDER BY id").fetch_all(pool).await?;
    rows.into_iter().map(|r| r.try_get("id")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, h, m, s).unwrap()
    }

    fn slice(track_id: i32, event: EventKind, h: u32, m: u32, s: u32) -> ZoneEventSlice {
        ZoneEventSlice { track_id, event, ts: ts(h, m, s) }
    }

    #[test]
    fn cross_hour_dwell_split_across_two_hours() {
        // scenario 5: single track enters zone at 14:50, exits at 15:20.
        let events = vec![slice(1, EventKind::Enter, 14, 50, 0), slice(1, EventKind::Exit, 15, 20, 0)];

        let hour14 = compute_hour(&events, ts(14, 0, 0));
        assert!((hour14.avg_dwell_seconds - 600.0).abs() < 0.01);

        let hour15 = compute_hour(&events, ts(15, 0, 0));
        assert!((hour15.avg_dwell_seconds - 1200.0).abs() < 0.01);
    }

    #[test]
    fn starting_occupancy_carries_forward_and_is_not_clamped() {
        let events = vec![
            slice(1, EventKind::Enter, 10, 0, 0),
            slice(2, EventKind::Enter, 10, 5, 0),
            slice(2, EventKind::Exit, 10, 10, 0),
            slice(1, EventKind::Exit, 10, 20, 0),
        ];
        let hour11 = compute_hour(&events, ts(11, 0, 0));
        assert_eq!(hour11.starting_occupancy, 0);
        assert_eq!(hour11.total_entries, 0);

        // a zone whose only activity is two exits with no enters this hour
        // has a negative, unclamped starting occupancy next hour.
        let corrupt = vec![slice(1, EventKind::Exit, 10, 0, 0)];
        let hour_after = compute_hour(&corrupt, ts(11, 0, 0));
        assert_eq!(hour_after.starting_occupancy, -1);
    }

    #[test]
    fn time_weighted_average_and_max_occupancy() {
        // occupancy starts at 0, one enter at minute 0, another at minute 30;
        // average should weight the 0/1/2-occupancy segments by duration.
        let events = vec![
            slice(1, EventKind::Enter, 10, 0, 0),
            slice(2, EventKind::Enter, 10, 30, 0),
        ];
        let hour = compute_hour(&events, ts(10, 0, 0));
        // 0..30min at occ=1 (1800s), 30..60min at occ=2 (1800s)
        let expected = (1.0 * 1800.0 + 2.0 * 1800.0) / 3600.0;
        assert!((hour.avg_occupancy - expected).abs() < 0.01);
        assert_eq!(hour.max_occupancy, 2);
    }

    #[test]
    fn total_entries_counts_only_in_hour_enters() {
        let events = vec![
            slice(1, EventKind::Enter, 9, 59, 0),
            slice(2, EventKind::Enter, 10, 1, 0),
            slice(3, EventKind::Enter, 10, 59, 59),
        ];
        let hour = compute_hour(&events, ts(10, 0, 0));
        assert_eq!(hour.total_entries, 2);
    }

    #[test]
    fn no_events_yields_all_zero_metrics() {
        let hour = compute_hour(&[], ts(10, 0, 0));
        assert_eq!(hour.avg_occupancy, 0.0);
        assert_eq!(hour.max_occupancy, 0);
        assert_eq!(hour.avg_dwell_seconds, 0.0);
        assert_eq!(hour.total_entries, 0);
    }
}
