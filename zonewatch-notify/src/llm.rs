//! Weekly narrative generation (§4.H). Grounded on the original
//! `reporter/main.py` (`format_data_for_llm`, `generate_insights_with_gemini`)
//! — the prompt wording itself is out of scope (§1); only the digest
//! formatting and HTTP transport are reimplemented.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub struct LlmClient {
    client: reqwest::Client,
    service_url: String,
    api_key: String,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    text: String,
}

impl LlmClient {
    pub fn new(service_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(DEFAULT_TIMEOUT_SECS))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            service_url: service_url.into(),
            api_key: api_key.into(),
        }
    }

    pub async fn summarize(&self, prompt: &str) -> Result<String> {
        let response = self
            .client
            .post(&self.service_url)
            .bearer_auth(&self.api_key)
            .json(&CompletionRequest { prompt })
            .send()
            .await
            .context("failed to reach LLM service")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("LLM service returned {}: {}", status, body);
        }

        let parsed: CompletionResponse = response.json().await.context("failed to parse LLM response")?;
        Ok(parsed.text)
    }
}

/// One zone-hour row of the weekly digest.
pub struct DigestRow {
    pub zone_name: String,
    pub camera_name: String,
    pub weekday_hour: String,
    pub avg_occupancy: f64,
    pub max_occupancy: i32,
    pub avg_dwell_minutes: f64,
    pub total_entries: i32,
}

/// Formats the week's hourly metrics into the compact per-zone digest fed
/// to the LLM collaborator. Only hours with entries or nonzero average
/// occupancy are included, mirroring `format_data_for_llm`'s filter, to
/// keep the prompt small.
pub fn format_digest(rows: &[DigestRow]) -> String {
    let mut out = String::new();
    let mut current_zone: Option<String> = None;

    for row in rows {
        if row.total_entries == 0 && row.avg_occupancy == 0.0 {
            continue;
        }
        let zone_label = format!("{} ({})", row.zone_name, row.camera_name);
        if current_zone.as_deref() != Some(zone_label.as_str()) {
            out.push_str(&format!("\n**Zone: {}**\n", zone_label));
            current_zone = Some(zone_label);
        }
        out.push_str(&format!(
            "- {}: avg occupancy {:.1}, max occupancy {}, avg dwell {:.1} min, entries {}\n",
            row.weekday_hour, row.avg_occupancy, row.max_occupancy, row.avg_dwell_minutes, row.total_entries
        ));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_skips_quiet_hours() {
        let rows = vec![
            DigestRow {
                zone_name: "Register".into(),
                camera_name: "Front".into(),
                weekday_hour: "Monday, 09:00".into(),
                avg_occupancy: 0.0,
                max_occupancy: 0,
                avg_dwell_minutes: 0.0,
                total_entries: 0,
            },
            DigestRow {
                zone_name: "Register".into(),
                camera_name: "Front".into(),
                weekday_hour: "Monday, 12:00".into(),
                avg_occupancy: 3.2,
                max_occupancy: 5,
                avg_dwell_minutes: 2.5,
                total_entries: 14,
            },
        ];
        let digest = format_digest(&rows);
        assert!(!digest.contains("09:00"));
        assert!(digest.contains("12:00"));
        assert!(digest.contains("Register (Front)"));
    }
}
