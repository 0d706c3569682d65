//! Redis-backed transport for `frames_queue`/`detections_queue` and the
//! single-slot `annotated_frame_cam_{id}` relay. Grounded on the original
//! `worker/worker.py` (`blpop`, `rpush`, `redis_client.set`) and
//! `ingest/ingest.py` (`lpop`); the `redis` crate feature set is grounded
//! on `examples/other_examples/manifests/nbuckles13-dark_tower/Cargo.toml`.

use anyhow::{Context, Result};
use base64::Engine;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use zonewatch_core::model::{EventKind, ZoneEvent};

pub const DEFAULT_FRAMES_QUEUE: &str = "frames_queue";
pub const DEFAULT_DETECTIONS_QUEUE: &str = "detections_queue";

/// Distinguishes a dead/unreachable queue (worth a brief backoff before the
/// caller retries) from one malformed entry on an otherwise healthy queue
/// (worth dropping and counting, per SPEC_FULL.md §7 — the two must not
/// share one log line, since a transport outage logged as "malformed" would
/// hide a real incident behind a steady trickle of drop counters).
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue transport error: {0}")]
    Transport(#[from] redis::RedisError),
    #[error("malformed queue entry: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameMessage {
    pub camera_id: i32,
    pub ts: f64,
    pub frame_b64: String,
}

impl FrameMessage {
    pub fn new(camera_id: i32, ts: f64, jpeg_bytes: &[u8]) -> Self {
        Self {
            camera_id,
            ts,
            frame_b64: base64::engine::general_purpose::STANDARD.encode(jpeg_bytes),
        }
    }

    pub fn decode_frame(&self) -> Result<Vec<u8>> {
        base64::engine::general_purpose::STANDARD
            .decode(&self.frame_b64)
            .context("frame_b64 is not valid base64")
    }
}

/// Wire shape of a `detections_queue` entry. `tenant_id` defaults to 1 on
/// decode, mirroring the original ingest job's `d.get("tenant_id", 1)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionMessage {
    #[serde(default = "default_tenant_id")]
    pub tenant_id: i32,
    pub camera_id: i32,
    pub zone_id: i32,
    pub track_id: i32,
    pub event: String,
    pub ts: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dwell: Option<f64>,
}

fn default_tenant_id() -> i32 {
    1
}

impl From<&ZoneEvent> for DetectionMessage {
    fn from(e: &ZoneEvent) -> Self {
        Self {
            tenant_id: e.tenant_id,
            camera_id: e.camera_id,
            zone_id: e.zone_id,
            track_id: e.track_id,
            event: e.event.as_str().to_string(),
            ts: e.ts,
            dwell: e.dwell_seconds,
        }
    }
}

impl TryFrom<DetectionMessage> for ZoneEvent {
    type Error = anyhow::Error;

    fn try_from(m: DetectionMessage) -> Result<Self> {
        let event = EventKind::parse(&m.event)
            .ok_or_else(|| anyhow::anyhow!("malformed event kind: {}", m.event))?;
        Ok(ZoneEvent {
            tenant_id: m.tenant_id,
            camera_id: m.camera_id,
            zone_id: m.zone_id,
            track_id: m.track_id,
            event,
            ts: m.ts,
            dwell_seconds: m.dwell,
        })
    }
}

pub struct RedisQueue {
    conn: ConnectionManager,
    frames_key: String,
    detections_key: String,
}

impl RedisQueue {
    pub async fn connect(redis_url: &str, frames_key: String, detections_key: String) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("invalid redis url")?;
        let conn = ConnectionManager::new(client)
            .await
            .context("failed to connect to redis")?;
        Ok(Self { conn, frames_key, detections_key })
    }

    /// Capture's publish side: append a frame, never blocking on queue
    /// depth (drop-oldest is a consumer-side concern per SPEC_FULL.md §4.A).
    pub async fn push_frame(&mut self, msg: &FrameMessage) -> Result<()> {
        let payload = serde_json::to_string(msg)?;
        self.conn.rpush::<_, _, ()>(&self.frames_key, payload).await?;
        Ok(())
    }

    /// Worker's dequeue side: blocking pop with a timeout, returning `None`
    /// on timeout so the caller's loop can re-check shutdown.
    pub async fn blocking_pop_frame(&mut self, timeout_secs: f64) -> Result<Option<FrameMessage>, QueueError> {
        let reply: Option<(String, String)> = self.conn.blpop(&self.frames_key, timeout_secs).await?;
        match reply {
            Some((_, payload)) => {
                let msg = serde_json::from_str(&payload).map_err(|e| QueueError::Malformed(e.to_string()))?;
                Ok(Some(msg))
            }
            None => Ok(None),
        }
    }

    pub async fn push_detection(&mut self, event: &ZoneEvent) -> Result<()> {
        let msg = DetectionMessage::from(event);
        let payload = serde_json::to_string(&msg)?;
        self.conn.rpush::<_, _, ()>(&self.detections_key, payload).await?;
        Ok(())
    }

    /// Ingest's dequeue side: a single non-blocking pop. A malformed payload
    /// and a dead transport are distinct `QueueError` variants so the caller
    /// can drop-and-count the former while backing off on the latter.
    pub async fn pop_detection_nonblocking(&mut self) -> Result<Option<ZoneEvent>, QueueError> {
        let reply: Option<String> = self.conn.lpop(&self.detections_key, None).await?;
        match reply {
            Some(payload) => {
                let msg: DetectionMessage =
                    serde_json::from_str(&payload).map_err(|e| QueueError::Malformed(e.to_string()))?;
                let event = ZoneEvent::try_from(msg).map_err(|e| QueueError::Malformed(e.to_string()))?;
                Ok(Some(event))
            }
            None => Ok(None),
        }
    }

    pub async fn set_annotated_frame(&mut self, camera_id: i32, jpeg_bytes: &[u8]) -> Result<()> {
        let key = annotated_frame_key(camera_id);
        self.conn.set::<_, _, ()>(key, jpeg_bytes).await?;
        Ok(())
    }

    pub async fn get_annotated_frame(&mut self, camera_id: i32) -> Result<Option<Vec<u8>>> {
        let key = annotated_frame_key(camera_id);
        let value: Option<Vec<u8>> = self.conn.get(key).await?;
        Ok(value)
    }
}

pub fn annotated_frame_key(camera_id: i32) -> String {
    format!("annotated_frame_cam_{camera_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn frame_message_roundtrips_base64() {
        let bytes = vec![0xFF, 0xD8, 0xFF, 0x00, 0x01];
        let msg = FrameMessage::new(3, 100.5, &bytes);
        assert_eq!(msg.decode_frame().unwrap(), bytes);
    }

    #[test]
    fn detection_message_defaults_tenant_id() {
        let json = r#"{"camera_id":1,"zone_id":2,"track_id":3,"event":"enter","ts":"2026-01-01T00:00:00Z"}"#;
        let msg: DetectionMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.tenant_id, 1);
    }

    #[test]
    fn zone_event_roundtrips_through_detection_message() {
        let event = ZoneEvent {
            tenant_id: 1,
            camera_id: 2,
            zone_id: 3,
            track_id: 4,
            event: EventKind::Exit,
            ts: Utc::now(),
            dwell_seconds: Some(12.5),
        };
        let msg = DetectionMessage::from(&event);
        let back = ZoneEvent::try_from(msg).unwrap();
        assert_eq!(back.zone_id, event.zone_id);
        assert_eq!(back.dwell_seconds, event.dwell_seconds);
    }

    #[test]
    fn annotated_frame_key_matches_contract() {
        assert_eq!(annotated_frame_key(42), "annotated_frame_cam_42");
    }

    #[test]
    fn queue_error_variants_are_distinguishable() {
        let malformed = QueueError::Malformed("bad json".into());
        assert!(matches!(malformed, QueueError::Malformed(_)));
        assert!(malformed.to_string().contains("bad json"));
    }
}
