//! Weekly report persistence (§4.H).

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Row};

use zonewatch_core::model::{HourlyMetrics, WeeklyReport};

pub async fn upsert_weekly_report(
    pool: &PgPool,
    start_date: NaiveDate,
    end_date: NaiveDate,
    llm_summary_markdown: &str,
    status: &str,
    generated_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO weekly_reports (start_date, end_date, llm_summary_markdown, status, generated_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (start_date, end_date) DO UPDATE SET
            llm_summary_markdown = EXCLUDED.llm_summary_markdown,
            status = EXCLUDED.status,
            generated_at = EXCLUDED.generated_at
        "#,
    )
    .bind(start_date)
    .bind(end_date)
    .bind(llm_summary_markdown)
    .bind(status)
    .bind(generated_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn fetch_weekly_report(
    pool: &PgPool,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<Option<WeeklyReport>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT start_date, end_date, llm_summary_markdown, status, generated_at
        FROM weekly_reports
        WHERE start_date = $1 AND end_date = $2
        "#,
    )
    .bind(start_date)
    .bind(end_date)
    .fetch_optional(pool)
    .await?;

    row.map(|r| {
        Ok(WeeklyReport {
            start_date: r.try_get("start_date")?,
            end_date: r.try_get("end_date")?,
            llm_summary_markdown: r.try_get("llm_summary_markdown")?,
            status: r.try_get("status")?,
            generated_at: r.try_get("generated_at")?,
        })
    })
    .transpose()
}

/// One row per `(zone, hour)` joined to the zone/camera names, used to
/// build the weekly report's per-zone digest.
#[derive(Debug, Clone)]
pub struct HourlyMetricsWithNames {
    pub metrics: HourlyMetrics,
    pub zone_name: String,
    pub camera_name: String,
}

pub async fn fetch_hourly_metrics_range(
    pool: &PgPool,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<HourlyMetricsWithNames>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT h.ts, h.zone_id, h.avg_occupancy, h.max_occupancy, h.avg_dwell_seconds, h.total_entries,
               z.name AS zone_name, c.name AS camera_name
        FROM hourly_metrics h
        JOIN zones z ON z.id = h.zone_id
        JOIN cameras c ON c.id = z.camera_id
        WHERE h.ts >= $1 AND h.ts < $2
        ORDER BY z.id, h.ts
        "#,
    )
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|r| {
            Ok(HourlyMetricsWithNames {
                metrics: HourlyMetrics {
                    ts: r.try_get("ts")?,
                    zone_id: r.try_get("zone_id")?,
                    avg_occupancy: r.try_get("avg_occupancy")?,
                    max_occupancy: r.try_get("max_occupancy")?,
                    avg_dwell_seconds: r.try_get("avg_dwell_seconds")?,
                    total_entries: r.try_get("total_entries")?,
                },
                zone_name: r.try_get("zone_name")?,
                camera_name: r.try_get("camera_name")?,
            })
        })
        .collect()
}
