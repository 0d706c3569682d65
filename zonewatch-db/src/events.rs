//! Event log writes (Ingest, §4.C) and raw reads (Hourly Aggregation, §4.F).

use chrono::{DateTime, Utc};
use sqlx::{PgPool, QueryBuilder, Row};

use zonewatch_core::model::{EventKind, ZoneEvent};

/// Multi-row insert of a batch into `zone_events`. Mirrors the teacher's
/// single `sqlx::query` insert idiom, generalized to N rows per flush via
/// `QueryBuilder::push_values` rather than one round-trip per event.
pub async fn insert_events_batch(pool: &PgPool, events: &[ZoneEvent]) -> Result<u64, sqlx::Error> {
    if events.is_empty() {
        return Ok(0);
    }

    let mut builder = QueryBuilder::new(
        "INSERT INTO zone_events (tenant_id, camera_id, zone_id, track_id, event, ts, dwell_seconds) ",
    );
    builder.push_values(events, |mut row, event| {
        row.push_bind(event.tenant_id)
            .push_bind(event.camera_id)
            .push_bind(event.zone_id)
            .push_bind(event.track_id)
            .push_bind(event.event.as_str())
            .push_bind(event.ts)
            .push_bind(event.dwell_seconds);
    });

    let result = builder.build().execute(pool).await?;
    Ok(result.rows_affected())
}

/// A parsed event stripped to the fields the aggregator's per-track pairing
/// logic needs.
#[derive(Debug, Clone)]
pub struct ZoneEventSlice {
    pub track_id: i32,
    pub event: EventKind,
    pub ts: DateTime<Utc>,
}

/// The full event history for one zone, ordered by `(track_id, ts)`. The
/// hourly aggregator needs unbounded lookback (the starting occupancy of an
/// hour sums every prior event) and unbounded lookahead (a dwell pair's
/// exit may land hours after its enter), so there is no time filter here —
/// see SPEC_FULL.md §4.F.
pub async fn fetch_zone_event_history(pool: &PgPool, zone_id: i32) -> Result<Vec<ZoneEventSlice>, sqlx::Error> {
    let raw = sqlx::query(
        r#"
        SELECT track_id, event, ts
        FROM zone_events
        WHERE zone_id = $1
        ORDER BY track_id, ts
        "#,
    )
    .bind(zone_id)
    .fetch_all(pool)
    .await?;

    raw.into_iter()
        .filter_map(|r| {
            let track_id: i32 = r.try_get("track_id").ok()?;
            let event_str: String = r.try_get("event").ok()?;
            let ts: DateTime<Utc> = r.try_get("ts").ok()?;
            EventKind::parse(&event_str).map(|event| ZoneEventSlice { track_id, event, ts })
        })
        .map(Ok)
        .collect()
}

/// Total row count in `zone_events`, used only by tests to assert batching
/// arithmetic (scenario 2).
pub async fn count_events(pool: &PgPool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM zone_events")
        .fetch_one(pool)
        .await
}
