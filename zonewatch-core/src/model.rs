//! The shared data model: tenants, cameras, zones, thresholds, and the
//! append-only zone event log plus its two batch-derived tables.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneMetric {
    Occupancy,
    Dwell,
}

impl ZoneMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneMetric::Occupancy => "occupancy",
            ZoneMetric::Dwell => "dwell",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "occupancy" => Some(ZoneMetric::Occupancy),
            "dwell" => Some(ZoneMetric::Dwell),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Warning,
    Critical,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Warning => "warning",
            AlertLevel::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "warning" => Some(AlertLevel::Warning),
            "critical" => Some(AlertLevel::Critical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Enter,
    Exit,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Enter => "enter",
            EventKind::Exit => "exit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "enter" => Some(EventKind::Enter),
            "exit" => Some(EventKind::Exit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Camera {
    pub id: i32,
    pub tenant_id: i32,
    pub name: String,
    pub location: Option<String>,
    pub rtsp_url: String,
    pub fps: i16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    pub id: i32,
    pub tenant_id: i32,
    pub camera_id: i32,
    pub name: String,
    /// Ordered vertices in the same normalized `[0, 1]` image-coordinate
    /// space the detector reports detection centers in (§6); operators
    /// drawing zones in pixel space must divide by frame width/height
    /// before writing the config file.
    pub polygon: Vec<(f64, f64)>,
    pub metrics: Vec<ZoneMetric>,
    pub ghost_timeout_minutes: i32,
}

impl Zone {
    pub fn has_metric(&self, metric: ZoneMetric) -> bool {
        self.metrics.contains(&metric)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneThreshold {
    pub zone_id: i32,
    pub metric: ZoneMetric,
    pub level: AlertLevel,
    pub threshold: f64,
}

/// One row of the append-only event log. `dwell_seconds` is only ever
/// `Some` on an `Exit` event, and only when the owning zone enables the
/// `dwell` metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneEvent {
    pub tenant_id: i32,
    pub camera_id: i32,
    pub zone_id: i32,
    pub track_id: i32,
    pub event: EventKind,
    pub ts: DateTime<Utc>,
    pub dwell_seconds: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HourlyMetrics {
    pub ts: DateTime<Utc>,
    pub zone_id: i32,
    pub avg_occupancy: f64,
    pub max_occupancy: i32,
    pub avg_dwell_seconds: f64,
    pub total_entries: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyReport {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub llm_summary_markdown: String,
    pub status: String,
    pub generated_at: DateTime<Utc>,
}

/// Per-zone snapshot value. Fields absent from the zone's enabled metric
/// set are omitted from serialization rather than emitted as `null`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZoneSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occupancy: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_dwell_seconds_5m: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub zones: std::collections::BTreeMap<i32, ZoneSnapshot>,
}
