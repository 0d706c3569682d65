//! The live metrics snapshot (§4.D, §4.E): canonical occupancy (last event
//! per track, bounded by the zone's `ghost_timeout_minutes`) and a 5-minute
//! rolling mean dwell. Both the Metrics API and the Alerter read through
//! this module so the two surfaces never disagree on the definition (see
//! DESIGN.md, Open Question 1).

use std::collections::BTreeMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::{PgPool, Row};

use zonewatch_core::model::{EventKind, MetricsSnapshot, Zone, ZoneMetric, ZoneSnapshot};

/// One track's most recent event in a zone. The SQL side only picks the
/// latest row per `(zone_id, track_id)`; the ghost-timeout cutoff itself is
/// applied in `occupancy_from_latest` so that arithmetic is unit-testable
/// without a database, the same split `hourly::compute_hour` uses.
struct LatestTrackEvent {
    zone_id: i32,
    event: EventKind,
    ts: DateTime<Utc>,
}

async fn fetch_latest_event_per_track(pool: &PgPool) -> Result<Vec<LatestTrackEvent>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT z.id AS zone_id, latest.event AS event, latest.ts AS ts
        FROM zones z
        JOIN LATERAL (
            SELECT DISTINCT ON (e.track_id) e.track_id, e.event, e.ts
            FROM zone_events e
            WHERE e.zone_id = z.id
            ORDER BY e.track_id, e.ts DESC
        ) latest ON true
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            let zone_id: i32 = row.try_get("zone_id")?;
            let event_str: String = row.try_get("event")?;
            let ts: DateTime<Utc> = row.try_get("ts")?;
            let event = EventKind::parse(&event_str).unwrap_or(EventKind::Exit);
            Ok(LatestTrackEvent { zone_id, event, ts })
        })
        .collect()
}

/// Distinct tracks whose most recent event is `enter`, not older than
/// `ghost_timeout_minutes` relative to `now` (scenario 3).
fn occupancy_from_latest(events: &[LatestTrackEvent], zone_id: i32, now: DateTime<Utc>, ghost_timeout_minutes: i32) -> i64 {
    let cutoff = now - ChronoDuration::minutes(ghost_timeout_minutes as i64);
    events
        .iter()
        .filter(|e| e.zone_id == zone_id && e.event == EventKind::Enter && e.ts >= cutoff)
        .count() as i64
}

/// Mean `dwell_seconds` over `exit` events in the last 5 minutes, per zone.
async fn avg_dwell_5m_by_zone(pool: &PgPool) -> Result<BTreeMap<i32, f64>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT zone_id, AVG(dwell_seconds) AS avg_dwell
        FROM zone_events
        WHERE event = 'exit'
          AND dwell_seconds IS NOT NULL
          AND ts >= now() - interval '5 minutes'
        GROUP BY zone_id
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut out = BTreeMap::new();
    for row in rows {
        let zone_id: i32 = row.try_get("zone_id")?;
        let avg_dwell: f64 = decimal_to_f64(row.try_get("avg_dwell")?);
        out.insert(zone_id, avg_dwell);
    }
    Ok(out)
}

/// `AVG(...)` over a Postgres `double precision` column already arrives as
/// `f64` via sqlx, but guards against non-finite results (e.g. if the
/// driver ever hands back a `NUMERIC` aggregate) before it reaches
/// serialization — finite doubles only, per §4.D.
fn decimal_to_f64(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

/// Builds the full snapshot for every zone in `zones`, restricted to each
/// zone's enabled metric set. Callers (API, Alerter) own the degrade-to-
/// empty-on-error policy (§7) — this function surfaces the store error.
pub async fn compute_snapshot(pool: &PgPool, zones: &[Zone]) -> Result<MetricsSnapshot, sqlx::Error> {
    let latest_events = fetch_latest_event_per_track(pool).await?;
    let dwell = avg_dwell_5m_by_zone(pool).await?;
    let now = Utc::now();

    let mut out = BTreeMap::new();
    for zone in zones {
        let mut snap = ZoneSnapshot::default();
        if zone.has_metric(ZoneMetric::Occupancy) {
            snap.occupancy = Some(occupancy_from_latest(&latest_events, zone.id, now, zone.ghost_timeout_minutes));
        }
        if zone.has_metric(ZoneMetric::Dwell) {
            snap.avg_dwell_seconds_5m = dwell.get(&zone.id).copied();
        }
        out.insert(zone.id, snap);
    }

    Ok(MetricsSnapshot { timestamp: now, zones: out })
}

/// Loads every zone across all tenants — the snapshot and alerter both
/// operate over the whole fleet, not a single tenant.
pub async fn fetch_all_zones(pool: &PgPool) -> Result<Vec<Zone>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT id, tenant_id, camera_id, name, polygon, metrics, ghost_timeout_minutes
        FROM zones
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut zones = Vec::with_capacity(rows.len());
    for row in rows {
        let polygon_json: serde_json::Value = row.try_get("polygon")?;
        let polygon: Vec<(f64, f64)> = serde_json::from_value(polygon_json).unwrap_or_default();
        let metrics_raw: Vec<String> = row.try_get("metrics")?;
        let metrics = metrics_raw.iter().filter_map(|m| ZoneMetric::parse(m)).collect();

        zones.push(Zone {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            camera_id: row.try_get("camera_id")?,
            name: row.try_get("name")?,
            polygon,
            metrics,
            ghost_timeout_minutes: row.try_get("ghost_timeout_minutes")?,
        });
    }
    Ok(zones)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ghost_timeout_excludes_stale_enter() {
        // scenario 3: track A entered 25 minutes ago with no exit, track B
        // entered 10 minutes ago; ghost_timeout_minutes=20 should count
        // only B.
        let now = Utc::now();
        let events = vec![
            LatestTrackEvent { zone_id: 1, event: EventKind::Enter, ts: now - ChronoDuration::minutes(25) },
            LatestTrackEvent { zone_id: 1, event: EventKind::Enter, ts: now - ChronoDuration::minutes(10) },
        ];
        assert_eq!(occupancy_from_latest(&events, 1, now, 20), 1);
    }

    #[test]
    fn exit_as_latest_event_never_counts_toward_occupancy() {
        let now = Utc::now();
        let events = vec![LatestTrackEvent { zone_id: 1, event: EventKind::Exit, ts: now }];
        assert_eq!(occupancy_from_latest(&events, 1, now, 60), 0);
    }

    #[test]
    fn occupancy_is_scoped_to_its_own_zone() {
        let now = Utc::now();
        let events = vec![
            LatestTrackEvent { zone_id: 1, event: EventKind::Enter, ts: now },
            LatestTrackEvent { zone_id: 2, event: EventKind::Enter, ts: now },
        ];
        assert_eq!(occupancy_from_latest(&events, 1, now, 60), 1);
        assert_eq!(occupancy_from_latest(&events, 2, now, 60), 1);
    }
}
