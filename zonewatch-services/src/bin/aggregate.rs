//! Hourly aggregation (component F, SPEC_FULL.md §4.F): runs
//! `zonewatch_db::hourly::aggregate_zone_hour` for every zone against one
//! target hour. The arithmetic lives in `zonewatch-db`; this binary is just
//! the CLI entry point and the per-zone fan-out, grounded on the original
//! `scripts/aggregate_hourly.py`'s cron-job shape — re-expressed as an
//! explicit `--hour` flag via `clap` rather than always-the-previous-hour,
//! since SPEC_FULL.md §4.F calls out re-executability for any past hour.

use anyhow::{Context, Result};
use chrono::{Datelike, DateTime, Duration, TimeZone, Timelike, Utc};
use clap::Parser;
use tracing::{error, info};

use zonewatch_db::Store;

#[derive(Parser, Debug)]
#[command(name = "zonewatch-aggregate", about = "Computes one hour of zone metrics for every zone")]
struct Args {
    /// Target hour, RFC3339 (e.g. 2026-07-28T14:00:00Z). Defaults to the
    /// previous UTC hour, truncated to the hour boundary.
    #[arg(long)]
    hour: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    zonewatch_services::init_tracing("zonewatch_aggregate");

    let args = Args::parse();
    let database_url = zonewatch_services::env_var("DATABASE_URL")?;

    let hour_start = match args.hour {
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .with_context(|| format!("invalid --hour value: {raw}"))?,
        None => previous_hour(Utc::now()),
    };

    let store = Store::connect(&database_url).await.context("connecting to database")?;
    let zone_ids = zonewatch_db::hourly::fetch_all_zone_ids(store.pool()).await.context("loading zone ids")?;

    info!(%hour_start, zone_count = zone_ids.len(), "aggregating hour");

    let mut failures = 0;
    for zone_id in zone_ids {
        let result = zonewatch_db::pool::with_retry("aggregate_zone_hour", || {
            zonewatch_db::hourly::aggregate_zone_hour(store.pool(), zone_id, hour_start)
        })
        .await;
        match result {
            Ok(computed) => {
                info!(zone_id, avg_occupancy = computed.avg_occupancy, total_entries = computed.total_entries, "zone aggregated");
            }
            Err(err) => {
                error!(zone_id, error = %err, "failed to aggregate zone");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} zone(s) failed to aggregate");
    }

    Ok(())
}

fn previous_hour(now: DateTime<Utc>) -> DateTime<Utc> {
    let truncated = Utc.with_ymd_and_hms(now.year(), now.month(), now.day(), now.hour(), 0, 0).unwrap();
    truncated - Duration::hours(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn previous_hour_truncates_and_steps_back() {
        let now = Utc.with_ymd_and_hms(2026, 7, 28, 14, 37, 12).unwrap();
        let prev = previous_hour(now);
        assert_eq!(prev, Utc.with_ymd_and_hms(2026, 7, 28, 13, 0, 0).unwrap());
    }

    #[test]
    fn previous_hour_crosses_day_boundary() {
        let now = Utc.with_ymd_and_hms(2026, 7, 28, 0, 10, 0).unwrap();
        let prev = previous_hour(now);
        assert_eq!(prev, Utc.with_ymd_and_hms(2026, 7, 27, 23, 0, 0).unwrap());
    }
}
