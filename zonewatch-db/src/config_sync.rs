//! Config loader sync (§4.G): upsert tenants/cameras/zones, replace
//! thresholds per zone atomically (delete-then-insert), one transaction for
//! the whole tree. Any failure rolls back the entire sync.

use anyhow::{Context, Result};
use sqlx::PgPool;

use zonewatch_core::config::ConfigRoot;

pub async fn sync_config(pool: &PgPool, config: &ConfigRoot) -> Result<()> {
    let mut tx = pool.begin().await.context("failed to start config-sync transaction")?;

    for tenant in &config.tenants {
        sqlx::query("INSERT INTO tenants (id, name) VALUES ($1, $2) ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name")
            .bind(tenant.id)
            .bind(&tenant.name)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("upserting tenant {}", tenant.id))?;

        for camera in &tenant.cameras {
            sqlx::query(
                r#"
                INSERT INTO cameras (id, tenant_id, name, location, rtsp_url, fps)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (id) DO UPDATE SET
                    tenant_id = EXCLUDED.tenant_id,
                    name = EXCLUDED.name,
                    location = EXCLUDED.location,
                    rtsp_url = EXCLUDED.rtsp_url,
                    fps = EXCLUDED.fps
                "#,
            )
            .bind(camera.id)
            .bind(tenant.id)
            .bind(&camera.name)
            .bind(&camera.location)
            .bind(&camera.rtsp_url)
            .bind(camera.fps)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("upserting camera {}", camera.id))?;

            for zone in &camera.zones {
                let polygon_json = serde_json::to_value(&zone.polygon).context("serializing zone polygon")?;
                let metrics: Vec<String> = zone
                    .metrics
                    .iter()
                    .map(|m| {
                        zonewatch_core::model::ZoneMetric::parse(m)
                            .map(|parsed| parsed.as_str().to_string())
                            .ok_or_else(|| anyhow::anyhow!("zone {} has unrecognized metric {}", zone.id, m))
                    })
                    .collect::<Result<_>>()?;

                sqlx::query(
                    r#"
                    INSERT INTO zones (id, tenant_id, camera_id, name, polygon, metrics, ghost_timeout_minutes)
                    VALUES ($1, $2, $3, $4, $5, $6, $7)
                    ON CONFLICT (id) DO UPDATE SET
                        tenant_id = EXCLUDED.tenant_id,
                        camera_id = EXCLUDED.camera_id,
                        name = EXCLUDED.name,
                        polygon = EXCLUDED.polygon,
                        metrics = EXCLUDED.metrics,
                        ghost_timeout_minutes = EXCLUDED.ghost_timeout_minutes
                    "#,
                )
                .bind(zone.id)
                .bind(tenant.id)
                .bind(camera.id)
                .bind(&zone.name)
                .bind(polygon_json)
                .bind(&metrics)
                .bind(zone.ghost_timeout_minutes)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("upserting zone {}", zone.id))?;

                sqlx::query("DELETE FROM zone_thresholds WHERE zone_id = $1")
                    .bind(zone.id)
                    .execute(&mut *tx)
                    .await
                    .with_context(|| format!("clearing thresholds for zone {}", zone.id))?;

                for threshold in &zone.thresholds {
                    let (Some(metric), Some(level)) = (threshold.metric(), threshold.level()) else {
                        anyhow::bail!(
                            "zone {} has a threshold with unrecognized metric/level: {}/{}",
                            zone.id,
                            threshold.metric,
                            threshold.level
                        );
                    };
                    sqlx::query(
                        "INSERT INTO zone_thresholds (zone_id, metric, level, threshold) VALUES ($1, $2, $3, $4)",
                    )
                    .bind(zone.id)
                    .bind(metric.as_str())
                    .bind(level.as_str())
                    .bind(threshold.threshold)
                    .execute(&mut *tx)
                    .await
                    .with_context(|| format!("inserting threshold for zone {}", zone.id))?;
                }
            }
        }
    }

    tx.commit().await.context("failed to commit config-sync transaction")?;
    Ok(())
}
