//! Alerter (component E, SPEC_FULL.md §4.E): polls the same occupancy/dwell
//! snapshot the API exposes, compares it against configured thresholds, and
//! emails on an edge-triggered cooldown. Grounded on the original
//! `alerter/alerter.py` for the 30-second loop and the trigger/clear edge
//! logic — except its occupancy window, which is NOT carried forward (see
//! DESIGN.md, Open Question 1): this binary reuses `zonewatch_db::snapshot`
//! so the Alerter and the API never disagree on what "occupancy" means.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use zonewatch_core::model::{AlertLevel, ZoneMetric};
use zonewatch_core::shutdown::Shutdown;
use zonewatch_db::thresholds::ThresholdWithNames;
use zonewatch_db::Store;
use zonewatch_notify::email::{log_delivery_failure, render_alert, EmailClient};

const LOOP_INTERVAL: Duration = Duration::from_secs(30);

/// Edge-triggered cooldown key. Independent per level, by design (a
/// warning and a critical alert on the same zone/metric do not suppress
/// each other) — a deliberate improvement over the Python original, which
/// keys only by `(zone_id, metric)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct AlertKey {
    zone_id: i32,
    metric: ZoneMetric,
    level: AlertLevel,
}

#[tokio::main]
async fn main() -> Result<()> {
    zonewatch_services::init_tracing("zonewatch_alerter");

    let database_url = zonewatch_services::env_var("DATABASE_URL")?;
    let resend_api_key = zonewatch_services::env_var("RESEND_API_KEY")?;
    let alert_email_to = zonewatch_services::env_var("ALERT_EMAIL_TO")?;
    let alert_email_from = zonewatch_services::env_var_or("ALERT_EMAIL_FROM", "alerts@zonewatch.local");

    let store = Store::connect(&database_url).await.context("connecting to database")?;
    let email = EmailClient::new(resend_api_key, alert_email_from);

    info!("alerter starting");

    let shutdown = Shutdown::new();
    shutdown.spawn_ctrl_c_listener();
    let mut shutdown_rx = shutdown.subscribe();

    let mut active: HashMap<AlertKey, ()> = HashMap::new();

    loop {
        if shutdown_rx.try_recv().is_ok() {
            info!("alerter shutting down");
            break;
        }

        if let Err(err) = run_once(&store, &email, &alert_email_to, &mut active).await {
            warn!(error = %err, "alerter pass failed");
        }

        tokio::time::sleep(LOOP_INTERVAL).await;
    }

    Ok(())
}

async fn run_once(
    store: &Store,
    email: &EmailClient,
    alert_to: &str,
    active: &mut HashMap<AlertKey, ()>,
) -> Result<()> {
    let zones = zonewatch_db::snapshot::fetch_all_zones(store.pool()).await.context("loading zones")?;
    let snapshot = zonewatch_db::snapshot::compute_snapshot(store.pool(), &zones).await.context("computing snapshot")?;
    let thresholds =
        zonewatch_db::thresholds::fetch_thresholds_with_names(store.pool()).await.context("loading thresholds")?;

    let mut seen = std::collections::HashSet::new();

    for t in &thresholds {
        let key = AlertKey { zone_id: t.threshold.zone_id, metric: t.threshold.metric, level: t.threshold.level };
        seen.insert(key);

        let Some(value) = current_value(&snapshot, t) else { continue };

        match edge(value, t.threshold.threshold, active.contains_key(&key)) {
            Edge::Trigger => {
                active.insert(key, ());
                let alert = render_alert(
                    t.threshold.metric,
                    t.threshold.level,
                    value,
                    t.threshold.threshold,
                    &t.zone_name,
                    &t.camera_name,
                );
                if let Err(err) = email.send_alert(alert_to, &alert).await {
                    log_delivery_failure(&t.zone_name, t.threshold.metric, &err);
                }
            }
            Edge::Clear => {
                active.remove(&key);
            }
            Edge::NoChange => {}
        }
    }

    // Thresholds removed from config (e.g. via config-sync) should not
    // leave a stale cooldown entry behind forever.
    active.retain(|key, _| seen.contains(key));

    Ok(())
}

fn current_value(snapshot: &zonewatch_core::model::MetricsSnapshot, t: &ThresholdWithNames) -> Option<f64> {
    let zone = snapshot.zones.get(&t.threshold.zone_id)?;
    match t.threshold.metric {
        ZoneMetric::Occupancy => zone.occupancy.map(|v| v as f64),
        ZoneMetric::Dwell => zone.avg_dwell_seconds_5m,
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Edge {
    Trigger,
    Clear,
    NoChange,
}

/// Pure edge-trigger decision (§4.E): `v > t` with no active state
/// notifies and marks triggered; `v <= t` with an active state clears
/// silently. Strict `>` (not `>=`) matches the threshold comparison in
/// SPEC_FULL.md §4.E exactly.
fn edge(value: f64, threshold: f64, already_active: bool) -> Edge {
    let exceeded = value > threshold;
    match (exceeded, already_active) {
        (true, false) => Edge::Trigger,
        (false, true) => Edge::Clear,
        _ => Edge::NoChange,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notifications_equal_upward_crossings_not_sample_count() {
        // scenario 4: occupancy>5 warning, trace 3,4,6,6,7,6,3,4,6.
        // crossings above 5: 4->6 and 4->6, i.e. exactly 2 notifications.
        let trace = [3.0, 4.0, 6.0, 6.0, 7.0, 6.0, 3.0, 4.0, 6.0];
        let threshold = 5.0;
        let mut active = false;
        let mut notifications = 0;

        for &value in &trace {
            match edge(value, threshold, active) {
                Edge::Trigger => {
                    notifications += 1;
                    active = true;
                }
                Edge::Clear => active = false,
                Edge::NoChange => {}
            }
        }

        assert_eq!(notifications, 2);
    }

    #[test]
    fn equal_to_threshold_does_not_trigger() {
        assert_eq!(edge(5.0, 5.0, false), Edge::NoChange);
        assert_eq!(edge(5.0, 5.0, true), Edge::Clear);
    }
}
