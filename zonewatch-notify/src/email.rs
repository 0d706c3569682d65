//! Threshold-alert email delivery. Grounded on the original
//! `alerter/email_templates.py` (level→color/emoji bucketing, per-metric
//! subject/message wording — re-expressed, not translated line-by-line) and
//! the teacher's `ml_client.rs` HTTP-collaborator shape for the client
//! itself. Resend is treated as an external collaborator (§6): one POST,
//! bearer auth, JSON body.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{error, info};

use zonewatch_core::model::{AlertLevel, ZoneMetric};

const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";

pub struct EmailClient {
    client: reqwest::Client,
    api_key: String,
    from: String,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: &'a str,
    html: &'a str,
}

impl EmailClient {
    pub fn new(api_key: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            from: from.into(),
        }
    }

    /// Sends one alert email. Failures are returned to the caller, which
    /// (per §7) logs them without retrying — the triggered state is set
    /// regardless of delivery success.
    pub async fn send_alert(&self, to: &str, alert: &AlertBody) -> Result<()> {
        let body = SendRequest { from: &self.from, to: vec![to], subject: &alert.subject, html: &alert.html };

        let response = self
            .client
            .post(RESEND_ENDPOINT)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("failed to reach notification service")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("notification service returned {}: {}", status, text);
        }

        info!(to, subject = %alert.subject, "alert email delivered");
        Ok(())
    }
}

pub struct AlertBody {
    pub subject: String,
    pub html: String,
}

struct LevelStyle {
    bg: &'static str,
    border: &'static str,
    text: &'static str,
    emoji: &'static str,
}

fn style_for(level: AlertLevel) -> LevelStyle {
    match level {
        AlertLevel::Warning => LevelStyle { bg: "#FEF3C7", border: "#F59E0B", text: "#92400E", emoji: "\u{26A0}\u{FE0F}" },
        AlertLevel::Critical => LevelStyle { bg: "#FEE2E2", border: "#DC2626", text: "#991B1B", emoji: "\u{1F6A8}" },
    }
}

/// Renders the alert subject/body for a threshold crossing. `value` and
/// `threshold` are in the metric's native unit (persons, seconds).
pub fn render_alert(
    metric: ZoneMetric,
    level: AlertLevel,
    value: f64,
    threshold: f64,
    zone_name: &str,
    camera_name: &str,
) -> AlertBody {
    let style = style_for(level);

    let (subject, title, message) = match metric {
        ZoneMetric::Occupancy => (
            format!("{} Occupancy alert: {} people in {}", style.emoji, value as i64, zone_name),
            "High occupancy detected",
            format!(
                "The system detected <strong>{} people</strong> in zone <strong>{}</strong> (camera: {}), exceeding the threshold of {}.",
                value as i64, zone_name, camera_name, threshold as i64
            ),
        ),
        ZoneMetric::Dwell => {
            let (m, s) = (value as i64 / 60, value as i64 % 60);
            let (tm, ts) = (threshold as i64 / 60, threshold as i64 % 60);
            (
                format!("{} Dwell alert: {}m {}s in {}", style.emoji, m, s, zone_name),
                "Extended dwell time",
                format!(
                    "Average dwell time of <strong>{}m {}s</strong> detected in zone <strong>{}</strong> (camera: {}), exceeding the threshold of {}m {}s.",
                    m, s, zone_name, camera_name, tm, ts
                ),
            )
        }
    };

    let html = format!(
        r#"<!DOCTYPE html>
<html><body style="margin:0;padding:0;font-family:-apple-system,Segoe UI,Roboto,sans-serif;background-color:#f3f4f6;">
<table width="100%" cellpadding="0" cellspacing="0" style="padding:20px 0;"><tr><td align="center">
<table width="600" cellpadding="0" cellspacing="0" style="background-color:#ffffff;border-radius:12px;overflow:hidden;">
<tr><td style="padding:0 40px;">
<div style="background-color:{bg};border-left:4px solid {border};padding:16px 20px;margin:30px 0 20px 0;border-radius:6px;">
<div style="color:{text};font-size:18px;font-weight:600;">{emoji} {title}</div>
</div>
</td></tr>
<tr><td style="padding:0 40px 30px 40px;">
<p style="color:#374151;font-size:16px;line-height:1.6;">{message}</p>
</td></tr>
</table></td></tr></table></body></html>"#,
        bg = style.bg,
        border = style.border,
        text = style.text,
        emoji = style.emoji,
        title = title,
        message = message,
    );

    AlertBody { subject, html }
}

pub fn log_delivery_failure(zone_name: &str, metric: ZoneMetric, err: &anyhow::Error) {
    error!(zone_name, metric = metric.as_str(), error = %err, "alert email delivery failed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn occupancy_alert_renders_person_count_in_subject() {
        let alert = render_alert(ZoneMetric::Occupancy, AlertLevel::Warning, 8.0, 5.0, "Register", "Front door");
        assert!(alert.subject.contains('8'));
        assert!(alert.html.contains("Register"));
    }

    #[test]
    fn dwell_alert_renders_minutes_and_seconds() {
        let alert = render_alert(ZoneMetric::Dwell, AlertLevel::Critical, 125.0, 60.0, "Lobby", "Cam 1");
        assert!(alert.subject.contains("2m"));
        assert!(alert.subject.contains("5s"));
    }
}
