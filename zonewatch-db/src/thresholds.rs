//! Threshold reads and the config-sync replace-thresholds step (§4.E, §4.G).

use sqlx::{PgPool, Row};

use zonewatch_core::model::{AlertLevel, ZoneMetric, ZoneThreshold};

/// One threshold row joined to the zone and camera names the Alerter needs
/// to render a notification body.
#[derive(Debug, Clone)]
pub struct ThresholdWithNames {
    pub threshold: ZoneThreshold,
    pub zone_name: String,
    pub camera_name: String,
    pub tenant_id: i32,
}

pub async fn fetch_thresholds_with_names(pool: &PgPool) -> Result<Vec<ThresholdWithNames>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT t.zone_id, t.metric, t.level, t.threshold,
               z.name AS zone_name, z.tenant_id AS tenant_id,
               c.name AS camera_name
        FROM zone_thresholds t
        JOIN zones z ON z.id = t.zone_id
        JOIN cameras c ON c.id = z.camera_id
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let metric_str: String = row.try_get("metric")?;
        let level_str: String = row.try_get("level")?;
        let (Some(metric), Some(level)) = (ZoneMetric::parse(&metric_str), AlertLevel::parse(&level_str)) else {
            continue;
        };
        out.push(ThresholdWithNames {
            threshold: ZoneThreshold {
                zone_id: row.try_get("zone_id")?,
                metric,
                level,
                threshold: row.try_get("threshold")?,
            },
            zone_name: row.try_get("zone_name")?,
            camera_name: row.try_get("camera_name")?,
            tenant_id: row.try_get("tenant_id")?,
        });
    }
    Ok(out)
}
