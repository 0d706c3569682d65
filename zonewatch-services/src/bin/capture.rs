//! Capture (component A, SPEC_FULL.md §4.A): pulls RTSP frames for one
//! camera, JPEG-encodes them, and publishes `{camera_id, ts, frame_b64}` to
//! `frames_queue`. Grounded on `retail-surveillance/src/main.rs`'s
//! `create_rtsp_pipeline`/`create_test_pipeline` split and ctrl-c shutdown,
//! generalized from a single hardcoded pipeline to a per-camera,
//! config-driven one, and on the original `capture/capture.py` for the
//! exact FPS-interval/reconnect-backoff constants.

use std::time::Duration;

use anyhow::{Context, Result};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use image::{ImageBuffer, Rgb};
use tracing::{error, info, warn};

use zonewatch_core::config::ConfigRoot;
use zonewatch_core::metrics::ProcessMetrics;
use zonewatch_core::shutdown::Shutdown;
use zonewatch_queue::{FrameMessage, RedisQueue};

const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);
const JPEG_QUALITY: u8 = 80;
const FRAME_WIDTH: u32 = 640;
const FRAME_HEIGHT: u32 = 480;
const RTSP_LATENCY_MS: u32 = 100;
const SUMMARY_INTERVAL: u64 = 300; // frames

/// Abstracts the raster source behind JPEG encoding so production (RTSP via
/// GStreamer) and CI (a synthetic generator, no GStreamer init required) can
/// share the same capture loop — see SPEC_FULL.md §4.A "(ambient) Video
/// source abstraction".
trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<Vec<u8>>;
}

struct GstRtspSource {
    pipeline: gst::Pipeline,
    appsink: gst_app::AppSink,
    width: u32,
    height: u32,
}

impl GstRtspSource {
    fn connect(rtsp_url: &str, width: u32, height: u32) -> Result<Self> {
        if !rtsp_url.starts_with("rtsp://") && !rtsp_url.starts_with("rtsps://") {
            anyhow::bail!("invalid RTSP URL format: {rtsp_url}");
        }

        let pipeline_str = format!(
            "rtspsrc location=\"{rtsp_url}\" latency={RTSP_LATENCY_MS} drop-on-latency=true buffer-mode=1 ! \
             rtph264depay ! h264parse ! avdec_h264 ! \
             videoconvert ! videoscale ! \
             video/x-raw,format=RGB,width={width},height={height} ! \
             appsink name=sink max-buffers=4 drop=true sync=false"
        );

        let pipeline = gst::parse::launch(&pipeline_str)?
            .downcast::<gst::Pipeline>()
            .map_err(|_| anyhow::anyhow!("failed to build RTSP pipeline"))?;
        let appsink = pipeline
            .by_name("sink")
            .and_then(|e| e.dynamic_cast::<gst_app::AppSink>().ok())
            .context("pipeline has no appsink")?;

        pipeline.set_state(gst::State::Playing).context("failed to start RTSP pipeline")?;

        Ok(Self { pipeline, appsink, width, height })
    }
}

impl FrameSource for GstRtspSource {
    fn next_frame(&mut self) -> Result<Vec<u8>> {
        let sample = self.appsink.pull_sample().context("RTSP stream disconnected")?;
        let buffer = sample.buffer().context("sample has no buffer")?;
        let map = buffer.map_readable().context("failed to map frame buffer")?;

        let image: ImageBuffer<Rgb<u8>, _> =
            ImageBuffer::from_raw(self.width, self.height, map.as_slice().to_vec())
                .context("frame buffer size did not match negotiated caps")?;

        let mut jpeg = Vec::new();
        let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY);
        encoder.encode_image(&image)?;
        Ok(jpeg)
    }
}

impl Drop for GstRtspSource {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

/// Synthetic source for CI/offline runs: a solid color frame whose shade
/// cycles with a counter, so consumers can still observe motion without a
/// live camera. Mirrors the teacher's `create_test_pipeline` intent (a
/// pipeline that "just works" without hardware) without depending on
/// GStreamer's `videotestsrc` element.
struct SyntheticSource {
    width: u32,
    height: u32,
    tick: u8,
}

impl SyntheticSource {
    fn new(width: u32, height: u32) -> Self {
        Self { width, height, tick: 0 }
    }
}

impl FrameSource for SyntheticSource {
    fn next_frame(&mut self) -> Result<Vec<u8>> {
        self.tick = self.tick.wrapping_add(4);
        let shade = self.tick;
        let image = ImageBuffer::from_fn(self.width, self.height, |_, _| Rgb([shade, 64, 255 - shade]));

        let mut jpeg = Vec::new();
        let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY);
        encoder.encode_image(&image)?;
        Ok(jpeg)
    }
}

fn open_source(rtsp_url: &str) -> Result<Box<dyn FrameSource>> {
    if rtsp_url == "test" {
        return Ok(Box::new(SyntheticSource::new(FRAME_WIDTH, FRAME_HEIGHT)));
    }
    gst::init().context("failed to initialize GStreamer")?;
    Ok(Box::new(GstRtspSource::connect(rtsp_url, FRAME_WIDTH, FRAME_HEIGHT)?))
}

#[tokio::main]
async fn main() -> Result<()> {
    zonewatch_services::init_tracing("zonewatch_capture");

    let camera_id: i32 = zonewatch_services::env_var("CAMERA_ID")?.parse().context("CAMERA_ID must be an integer")?;
    let config_path = zonewatch_services::env_var_or("CONFIG_PATH", "config.yaml");
    let redis_url = zonewatch_services::env_var_or("REDIS_URL", "redis://127.0.0.1:6379");
    let frames_queue = zonewatch_services::env_var_or("REDIS_FRAMES_QUEUE", zonewatch_queue::DEFAULT_FRAMES_QUEUE);
    let detections_queue =
        zonewatch_services::env_var_or("REDIS_DETECTIONS_QUEUE", zonewatch_queue::DEFAULT_DETECTIONS_QUEUE);

    let config = ConfigRoot::load(&config_path).context("loading camera configuration")?;
    let (_, camera) = config
        .find_camera(camera_id)
        .with_context(|| format!("camera id {camera_id} not found in {config_path}"))?;
    let rtsp_url = camera.rtsp_url.clone();
    let fps = camera.fps.max(1) as u32;
    let frame_interval = Duration::from_secs_f64(1.0 / fps as f64);

    info!(camera_id, %rtsp_url, fps, "capture starting");

    let shutdown = Shutdown::new();
    shutdown.spawn_ctrl_c_listener();
    let mut shutdown_rx = shutdown.subscribe();

    let mut queue = RedisQueue::connect(&redis_url, frames_queue, detections_queue).await?;
    let metrics = ProcessMetrics::default();

    let mut source = open_source(&rtsp_url)?;

    loop {
        if shutdown_rx.try_recv().is_ok() {
            info!(camera_id, "capture shutting down");
            break;
        }

        let frame = match source.next_frame() {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(camera_id, error = %err, "capture source error, reconnecting");
                metrics.record_error();
                tokio::time::sleep(RECONNECT_BACKOFF).await;
                source = match open_source(&rtsp_url) {
                    Ok(s) => s,
                    Err(err) => {
                        error!(camera_id, error = %err, "reconnect failed");
                        continue;
                    }
                };
                continue;
            }
        };

        let ts = chrono::Utc::now().timestamp_millis() as f64 / 1000.0;
        let msg = FrameMessage::new(camera_id, ts, &frame);
        if let Err(err) = queue.push_frame(&msg).await {
            warn!(camera_id, error = %err, "failed to publish frame");
            metrics.record_error();
        } else {
            metrics.record_processed();
        }

        if metrics.processed.load(std::sync::atomic::Ordering::Relaxed) % SUMMARY_INTERVAL == 0 {
            metrics.log_summary("capture");
        }

        tokio::time::sleep(frame_interval).await;
    }

    metrics.log_summary("capture");
    Ok(())
}
