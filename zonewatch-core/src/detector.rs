//! The person detector/tracker is an external collaborator (see SPEC_FULL.md
//! §1, §6): this crate only defines its contract, reached over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 5;

/// Distinguishes a detector the worker should back off from (unreachable or
/// erroring) from one that answered but with a body the worker can't parse;
/// the two call for different log levels and, per SPEC_FULL.md §5, different
/// caller behavior (the former is worth a brief pause, the latter isn't
/// expected to recur on the very next frame).
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("detector transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("detector returned {status}: {body}")]
    ServiceError { status: u16, body: String },
    #[error("malformed detector response: {0}")]
    Malformed(String),
}

/// A single detection in normalized `[0, 1]` image coordinates, already
/// carrying the stable `track_id` the external tracker assigned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub confidence: f32,
    pub track_id: i32,
}

impl Detection {
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

#[async_trait]
pub trait Detector: Send + Sync {
    async fn detect_people(&self, jpeg_bytes: &[u8], width: u32, height: u32) -> Result<Vec<Detection>, DetectorError>;
}

#[derive(Debug, Deserialize)]
struct DetectionResponse {
    detections: Vec<Detection>,
}

/// HTTP-backed `Detector`, grounded on the teacher's `MLClient`: POST raw
/// JPEG bytes with `width`/`height` query parameters, parse a JSON body.
pub struct HttpDetector {
    client: reqwest::Client,
    service_url: String,
}

impl HttpDetector {
    pub fn new(service_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, service_url: service_url.into() }
    }
}

#[async_trait]
impl Detector for HttpDetector {
    async fn detect_people(&self, jpeg_bytes: &[u8], width: u32, height: u32) -> Result<Vec<Detection>, DetectorError> {
        let url = format!("{}/detect", self.service_url);
        let response = self
            .client
            .post(&url)
            .query(&[("width", width.to_string()), ("height", height.to_string())])
            .header("Content-Type", "application/octet-stream")
            .body(jpeg_bytes.to_vec())
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(DetectorError::ServiceError { status, body });
        }

        let parsed: DetectionResponse = response
            .json()
            .await
            .map_err(|e| DetectorError::Malformed(e.to_string()))?;
        Ok(parsed.detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_is_midpoint_of_bounding_box() {
        let d = Detection { x: 0.2, y: 0.3, width: 0.1, height: 0.2, confidence: 0.9, track_id: 1 };
        let (cx, cy) = d.center();
        assert!((cx - 0.25).abs() < 1e-9);
        assert!((cy - 0.4).abs() < 1e-9);
    }

    #[test]
    fn service_error_carries_status_and_body() {
        let err = DetectorError::ServiceError { status: 503, body: "overloaded".into() };
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("overloaded"));
    }
}
