//! Worker (component B, SPEC_FULL.md §4.B): dequeues this camera's frames,
//! calls the external detector, runs the zone state machine, annotates the
//! frame, and publishes both the annotated frame and zone events. Grounded
//! end to end on `retail-surveillance/src/ml_client.rs` (detector HTTP
//! client shape, zone-counting concept) and the original `worker/worker.py`
//! for the exact dequeue/filter/annotate/publish sequencing — including its
//! "drop frames from other cameras" behavior, since every worker shares one
//! `frames_queue` key.

use std::time::Instant;

use anyhow::{Context, Result};
use image::{ImageBuffer, Rgb};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use tracing::{debug, info, warn};

use zonewatch_core::config::ConfigRoot;
use zonewatch_core::detector::{Detector, DetectorError, HttpDetector};
use zonewatch_core::metrics::ProcessMetrics;
use zonewatch_core::model::Zone;
use zonewatch_core::shutdown::Shutdown;
use zonewatch_core::zonestate::{TrackCenter, ZoneStateMachine};
use zonewatch_queue::{QueueError, RedisQueue};

const BLOCKING_POP_TIMEOUT_SECS: f64 = 30.0;
const JPEG_QUALITY: u8 = 80;
const SUMMARY_INTERVAL: u64 = 200;
const TRANSPORT_ERROR_BACKOFF: std::time::Duration = std::time::Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<()> {
    zonewatch_services::init_tracing("zonewatch_worker");

    let camera_id: i32 = zonewatch_services::env_var("CAMERA_ID")?.parse().context("CAMERA_ID must be an integer")?;
    let config_path = zonewatch_services::env_var_or("CONFIG_PATH", "config.yaml");
    let redis_url = zonewatch_services::env_var_or("REDIS_URL", "redis://127.0.0.1:6379");
    let frames_queue = zonewatch_services::env_var_or("REDIS_FRAMES_QUEUE", zonewatch_queue::DEFAULT_FRAMES_QUEUE);
    let detections_queue =
        zonewatch_services::env_var_or("REDIS_DETECTIONS_QUEUE", zonewatch_queue::DEFAULT_DETECTIONS_QUEUE);
    let detector_url = zonewatch_services::env_var_or("DETECTOR_URL", "http://localhost:8001");

    let config = ConfigRoot::load(&config_path).context("loading camera configuration")?;
    let (tenant, camera) = config
        .find_camera(camera_id)
        .with_context(|| format!("camera id {camera_id} not found in {config_path}"))?;
    let tenant_id = tenant.id;

    let zones: Vec<Zone> = camera
        .zones
        .iter()
        .map(|z| Zone {
            id: z.id,
            tenant_id,
            camera_id,
            name: z.name.clone(),
            polygon: z.polygon.clone(),
            metrics: z.metrics.iter().filter_map(|m| zonewatch_core::model::ZoneMetric::parse(m)).collect(),
            ghost_timeout_minutes: z.ghost_timeout_minutes,
        })
        .collect();
    let zone_names: std::collections::HashMap<i32, String> =
        camera.zones.iter().map(|z| (z.id, z.name.clone())).collect();
    let zone_polygons: Vec<(i32, Vec<(f64, f64)>)> =
        camera.zones.iter().map(|z| (z.id, z.polygon.clone())).collect();

    let mut state_machine = ZoneStateMachine::new(tenant_id, camera_id, zones)?;
    let detector = HttpDetector::new(detector_url);

    info!(camera_id, tenant_id, zone_count = zone_polygons.len(), "worker starting");

    let shutdown = Shutdown::new();
    shutdown.spawn_ctrl_c_listener();
    let mut shutdown_rx = shutdown.subscribe();

    let mut queue = RedisQueue::connect(&redis_url, frames_queue, detections_queue).await?;
    let metrics = ProcessMetrics::default();

    loop {
        if shutdown_rx.try_recv().is_ok() {
            info!(camera_id, "worker shutting down");
            break;
        }

        let msg = match queue.blocking_pop_frame(BLOCKING_POP_TIMEOUT_SECS).await {
            Ok(Some(msg)) => msg,
            Ok(None) => continue,
            Err(QueueError::Malformed(reason)) => {
                warn!(camera_id, reason, "malformed frame message, dropping");
                metrics.record_error();
                continue;
            }
            Err(err @ QueueError::Transport(_)) => {
                warn!(camera_id, error = %err, "frame queue unreachable, backing off");
                metrics.record_error();
                tokio::time::sleep(TRANSPORT_ERROR_BACKOFF).await;
                continue;
            }
        };

        // Only this camera's own frames are processed; everything else on
        // the shared queue is dropped, mirroring worker.py's filter.
        if msg.camera_id != camera_id {
            metrics.record_dropped();
            continue;
        }

        let jpeg_bytes = match msg.decode_frame() {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(camera_id, error = %err, "malformed frame payload");
                metrics.record_error();
                continue;
            }
        };

        let decoded = match image::load_from_memory(&jpeg_bytes) {
            Ok(img) => img.to_rgb8(),
            Err(err) => {
                warn!(camera_id, error = %err, "failed to decode frame");
                metrics.record_error();
                continue;
            }
        };
        let (width, height) = (decoded.width(), decoded.height());

        let detections = match detector.detect_people(&jpeg_bytes, width, height).await {
            Ok(d) => d,
            Err(err @ (DetectorError::Transport(_) | DetectorError::ServiceError { .. })) => {
                warn!(camera_id, error = %err, "detector unreachable or erroring, backing off");
                metrics.record_error();
                tokio::time::sleep(TRANSPORT_ERROR_BACKOFF).await;
                continue;
            }
            Err(err @ DetectorError::Malformed(_)) => {
                warn!(camera_id, error = %err, "malformed detector response, skipping frame");
                metrics.record_error();
                continue;
            }
        };

        let tracks: Vec<TrackCenter> = detections
            .iter()
            .map(|d| TrackCenter { track_id: d.track_id, center: d.center() })
            .collect();

        let now = chrono::Utc::now();
        let events = state_machine.process_frame(&tracks, now, Instant::now());

        let annotated = annotate_frame(decoded, &detections, &zone_polygons, &zone_names);
        let mut jpeg = Vec::new();
        let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY);
        if let Err(err) = encoder.encode_image(&annotated) {
            warn!(camera_id, error = %err, "failed to re-encode annotated frame");
        } else if let Err(err) = queue.set_annotated_frame(camera_id, &jpeg).await {
            warn!(camera_id, error = %err, "failed to publish annotated frame");
        }

        for event in &events {
            debug!(camera_id, zone_id = event.zone_id, track_id = event.track_id, event = event.event.as_str(), "zone event");
            if let Err(err) = queue.push_detection(event).await {
                warn!(camera_id, error = %err, "failed to publish zone event");
                metrics.record_error();
            }
        }

        metrics.record_processed();
        if metrics.processed.load(std::sync::atomic::Ordering::Relaxed) % SUMMARY_INTERVAL == 0 {
            metrics.log_summary("worker");
        }
    }

    metrics.log_summary("worker");
    Ok(())
}

/// Draws bounding boxes, zone polygon outlines, and zone-name labels onto
/// the decoded raster before re-encode, per SPEC_FULL.md §4.B
/// "(supplemented) Annotation" — re-expressed with `imageproc` rather than
/// porting the reference worker's OpenCV overlay line by line.
fn annotate_frame(
    mut image: ImageBuffer<Rgb<u8>, Vec<u8>>,
    detections: &[zonewatch_core::detector::Detection],
    zone_polygons: &[(i32, Vec<(f64, f64)>)],
    zone_names: &std::collections::HashMap<i32, String>,
) -> ImageBuffer<Rgb<u8>, Vec<u8>> {
    let (width, height) = (image.width() as f64, image.height() as f64);
    let box_color = Rgb([0u8, 255, 0]);
    let zone_color = Rgb([255u8, 165, 0]);

    for det in detections {
        let x = (det.x * width) as i32;
        let y = (det.y * height) as i32;
        let w = ((det.width * width) as u32).max(1);
        let h = ((det.height * height) as u32).max(1);
        let rect = Rect::at(x, y).of_size(w, h);
        draw_hollow_rect_mut(&mut image, rect, box_color);
    }

    for (zone_id, polygon) in zone_polygons {
        for window in polygon.windows(2) {
            draw_line_segment(&mut image, window[0], window[1], width, height, zone_color);
        }
        if let (Some(&first), Some(&last)) = (polygon.first(), polygon.last()) {
            draw_line_segment(&mut image, last, first, width, height, zone_color);
        }
        // Label text needs a loaded font; in its absence we mark the
        // zone's anchor vertex with a small filled square instead of a
        // name, matching the spirit of worker.py's cv2 overlay without
        // depending on a bundled font asset.
        if zone_names.contains_key(zone_id) {
            if let Some(&(cx, cy)) = polygon.first() {
                let anchor = Rect::at((cx * width) as i32 - 4, (cy * height) as i32 - 4).of_size(8, 8);
                draw_hollow_rect_mut(&mut image, anchor, zone_color);
            }
        }
    }

    image
}

fn draw_line_segment(
    image: &mut ImageBuffer<Rgb<u8>, Vec<u8>>,
    start: (f64, f64),
    end: (f64, f64),
    width: f64,
    height: f64,
    color: Rgb<u8>,
) {
    let p1 = ((start.0 * width) as f32, (start.1 * height) as f32);
    let p2 = ((end.0 * width) as f32, (end.1 * height) as f32);
    imageproc::drawing::draw_line_segment_mut(image, p1, p2, color);
}
