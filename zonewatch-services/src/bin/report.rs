//! Weekly report (component H, supplemented — SPEC_FULL.md §4.H): computes
//! the prior Monday-Sunday week in a fixed UTC-5 offset, digests the hourly
//! metrics, asks the LLM collaborator for a narrative, and upserts the
//! result. Grounded end to end on the original `reporter/main.py`'s exact
//! week-boundary arithmetic (`ECUADOR_TZ = UTC-5`) and digest/report shape,
//! both of which already have Rust homes in `zonewatch-notify::llm` and
//! `zonewatch-db::reports`.

use anyhow::{Context, Result};
use chrono::{Datelike, Duration, FixedOffset, NaiveDate, Timelike, Utc};
use tracing::info;

use zonewatch_db::reports::{fetch_hourly_metrics_range, upsert_weekly_report};
use zonewatch_db::Store;
use zonewatch_notify::llm::{format_digest, DigestRow, LlmClient};

const WEEK_TZ_OFFSET_HOURS: i32 = -5;

#[tokio::main]
async fn main() -> Result<()> {
    zonewatch_services::init_tracing("zonewatch_report");

    let database_url = zonewatch_services::env_var("DATABASE_URL")?;
    let llm_url = zonewatch_services::env_var_or("LLM_SERVICE_URL", "http://localhost:8002/summarize");
    let llm_api_key = zonewatch_services::env_var("LLM_API_KEY")?;

    let tz = FixedOffset::east_opt(WEEK_TZ_OFFSET_HOURS * 3600).expect("valid fixed offset");
    let (start_date, end_date) = last_full_week(tz);
    info!(%start_date, %end_date, "generating weekly report");

    let store = Store::connect(&database_url).await.context("connecting to database")?;

    let start = start_date.and_hms_opt(0, 0, 0).unwrap().and_local_timezone(tz).unwrap().with_timezone(&Utc);
    let end = end_date.and_hms_opt(0, 0, 0).unwrap().and_local_timezone(tz).unwrap().with_timezone(&Utc);

    let rows = fetch_hourly_metrics_range(store.pool(), start, end).await.context("loading hourly metrics range")?;

    let digest_rows: Vec<DigestRow> = rows
        .iter()
        .map(|r| {
            let local_ts = r.metrics.ts.with_timezone(&tz);
            DigestRow {
                zone_name: r.zone_name.clone(),
                camera_name: r.camera_name.clone(),
                weekday_hour: format!("{}, {:02}:00", local_ts.format("%A"), local_ts.hour()),
                avg_occupancy: r.metrics.avg_occupancy,
                max_occupancy: r.metrics.max_occupancy,
                avg_dwell_minutes: r.metrics.avg_dwell_seconds / 60.0,
                total_entries: r.metrics.total_entries,
            }
        })
        .collect();

    let digest = format_digest(&digest_rows);

    let status = if digest.trim().is_empty() {
        "empty".to_string()
    } else {
        let llm = LlmClient::new(llm_url, llm_api_key);
        let prompt = format!(
            "Summarize this week's zone occupancy and dwell activity for a store operations audience:\n{digest}"
        );
        match llm.summarize(&prompt).await {
            Ok(summary) => {
                upsert_weekly_report(store.pool(), start_date, end_date, &summary, "completed", Utc::now())
                    .await
                    .context("upserting weekly report")?;
                info!("weekly report generated");
                return Ok(());
            }
            Err(err) => {
                tracing::error!(error = %err, "LLM summarization failed");
                "failed".to_string()
            }
        }
    };

    upsert_weekly_report(store.pool(), start_date, end_date, "", &status, Utc::now())
        .await
        .context("upserting weekly report")?;
    Ok(())
}

/// Monday-Sunday boundary of the week immediately prior to the current
/// one, matching `reporter/main.py`: `today = datetime.now(ECUADOR_TZ).date()`,
/// `last_week_sunday = today - days((weekday()+1)%7)` (Python `weekday()`:
/// Monday=0..Sunday=6), then `end_date = last_week_sunday + 1 day`,
/// `start_date = end_date - 7 days`. `today` must be taken in the reporting
/// offset, not UTC: between 00:00-05:00 UTC the UTC date is already a day
/// ahead of the UTC-5 local date.
fn last_full_week(tz: FixedOffset) -> (NaiveDate, NaiveDate) {
    last_full_week_at(Utc::now(), tz)
}

/// Pure date arithmetic behind `last_full_week`, taking `now` explicitly so
/// the UTC-day-boundary case is unit-testable without mocking the clock.
fn last_full_week_at(now: chrono::DateTime<Utc>, tz: FixedOffset) -> (NaiveDate, NaiveDate) {
    let today = now.with_timezone(&tz).date_naive();
    let python_weekday = today.weekday().num_days_from_monday() as i64; // Mon=0..Sun=6
    let last_week_sunday = today - Duration::days((python_weekday + 1) % 7);
    let end_date = last_week_sunday + Duration::days(1);
    let start_date = end_date - Duration::days(7);
    (start_date, end_date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        chrono::Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap().date_naive()
    }

    #[test]
    fn week_boundary_matches_reference_on_a_wednesday() {
        // "today" = Wednesday 2026-07-29; previous full week is Mon
        // 2026-07-20 through Sun 2026-07-26 (end_date exclusive = 07-27).
        let today = date(2026, 7, 29);
        let python_weekday = today.weekday().num_days_from_monday() as i64;
        let last_week_sunday = today - Duration::days((python_weekday + 1) % 7);
        let end_date = last_week_sunday + Duration::days(1);
        let start_date = end_date - Duration::days(7);
        assert_eq!(start_date, date(2026, 7, 20));
        assert_eq!(end_date, date(2026, 7, 27));
    }

    #[test]
    fn week_boundary_on_a_monday_matches_the_week_just_completed() {
        // today = Monday 2026-07-27: the week that just completed is Mon
        // 07-20 through Sun 07-26 (end_date exclusive = 07-27, i.e. today).
        let today = date(2026, 7, 27); // Monday
        let python_weekday = today.weekday().num_days_from_monday() as i64;
        let last_week_sunday = today - Duration::days((python_weekday + 1) % 7);
        let end_date = last_week_sunday + Duration::days(1);
        let start_date = end_date - Duration::days(7);
        assert_eq!(start_date, date(2026, 7, 20));
        assert_eq!(end_date, date(2026, 7, 27));
    }

    #[test]
    fn week_boundary_uses_reporting_offset_not_utc_date() {
        // 2026-07-26 02:00 UTC (a Sunday in UTC) is still 2026-07-25 21:00
        // in UTC-5 (a Saturday): the week containing that Saturday has not
        // finished yet, so the last *full* week is the one before it,
        // 07-13..07-20. The UTC-date bug would instead anchor on Sunday
        // 07-26, one week later (07-20..07-27) — the boundary that matters
        // here is the Saturday/Sunday edge of this formula, which a UTC-5
        // offset can straddle independently of the UTC calendar date.
        let tz = FixedOffset::east_opt(WEEK_TZ_OFFSET_HOURS * 3600).unwrap();
        let now = chrono::Utc.with_ymd_and_hms(2026, 7, 26, 2, 0, 0).unwrap();
        let (start_date, end_date) = last_full_week_at(now, tz);
        assert_eq!(start_date, date(2026, 7, 13));
        assert_eq!(end_date, date(2026, 7, 20));
    }
}
