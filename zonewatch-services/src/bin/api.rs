//! Metrics API (component D, SPEC_FULL.md §4.D): `/health`, an SSE metrics
//! stream, and an MJPEG video relay per camera. Router shape and
//! `serve()` are grounded on `retail-surveillance/src/api.rs`
//! (`create_router`/`AppState`/`axum::serve`); the SSE/MJPEG semantics and
//! the literal "frame" multipart boundary are grounded on the original
//! `api/main.py`.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::http::{HeaderValue, Method};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use axum::body::{Body, Bytes};
use futures::stream::{self, Stream};
use serde::Serialize;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use zonewatch_core::model::MetricsSnapshot;
use zonewatch_db::Store;
use zonewatch_queue::RedisQueue;

const SSE_INTERVAL: Duration = Duration::from_secs(2);
const MJPEG_INTERVAL: Duration = Duration::from_millis(50);
const MJPEG_BOUNDARY: &str = "frame";

#[derive(Clone)]
struct AppState {
    store: Store,
    queue: Arc<Mutex<RedisQueue>>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    time: chrono::DateTime<chrono::Utc>,
}

#[tokio::main]
async fn main() -> Result<()> {
    zonewatch_services::init_tracing("zonewatch_api");

    let database_url = zonewatch_services::env_var("DATABASE_URL")?;
    let redis_url = zonewatch_services::env_var_or("REDIS_URL", "redis://127.0.0.1:6379");
    let frames_queue = zonewatch_services::env_var_or("REDIS_FRAMES_QUEUE", zonewatch_queue::DEFAULT_FRAMES_QUEUE);
    let detections_queue =
        zonewatch_services::env_var_or("REDIS_DETECTIONS_QUEUE", zonewatch_queue::DEFAULT_DETECTIONS_QUEUE);
    let port: u16 = zonewatch_services::env_parsed_or("API_PORT", 8080);
    let cors_origins = zonewatch_services::env_var_or("API_CORS_ORIGINS", "http://localhost:3000");

    let store = Store::connect(&database_url).await.context("connecting to database")?;
    let queue = RedisQueue::connect(&redis_url, frames_queue, detections_queue).await?;

    let state = AppState { store, queue: Arc::new(Mutex::new(queue)) };

    let app = create_router(state, &cors_origins);
    let addr = format!("0.0.0.0:{port}");
    info!(%addr, "metrics API listening");

    let listener = tokio::net::TcpListener::bind(&addr).await.context("failed to bind API address")?;
    axum::serve(listener, app).await.context("API server error")?;

    Ok(())
}

fn create_router(state: AppState, cors_origins: &str) -> Router {
    let origins: Vec<HeaderValue> = cors_origins
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| HeaderValue::from_str(s).ok())
        .collect();

    // Explicit allow-list, never `CorsLayer::permissive()` — SPEC_FULL.md
    // §4.D calls this out explicitly rather than mirroring the teacher.
    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET])
        .allow_headers(tower_http::cors::Any);

    Router::new()
        .route("/health", get(health))
        .route("/realtime/stream", get(realtime_stream))
        .route("/video/stream/:camera_id", get(video_stream))
        .layer(cors)
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok", time: chrono::Utc::now() })
}

async fn realtime_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = stream::unfold(state, |state| async move {
        tokio::time::sleep(SSE_INTERVAL).await;
        let snapshot = snapshot_or_empty(&state.store).await;
        let event = Event::default().event("metrics").json_data(&snapshot).unwrap_or_else(|_| Event::default());
        Some((Ok(event), state))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Degrades to an empty, freshly-timestamped snapshot on store failure
/// rather than surfacing a 5xx to long-lived SSE clients, per SPEC_FULL.md
/// §7.
async fn snapshot_or_empty(store: &Store) -> MetricsSnapshot {
    let zones = match zonewatch_db::snapshot::fetch_all_zones(store.pool()).await {
        Ok(zones) => zones,
        Err(err) => {
            warn!(error = %err, "failed to load zones for snapshot");
            return MetricsSnapshot { timestamp: chrono::Utc::now(), zones: Default::default() };
        }
    };

    match zonewatch_db::snapshot::compute_snapshot(store.pool(), &zones).await {
        Ok(snapshot) => snapshot,
        Err(err) => {
            warn!(error = %err, "failed to compute snapshot");
            MetricsSnapshot { timestamp: chrono::Utc::now(), zones: Default::default() }
        }
    }
}

async fn video_stream(State(state): State<AppState>, Path(camera_id): Path<i32>) -> impl IntoResponse {
    let body_stream = stream::unfold(state, move |state| async move {
        tokio::time::sleep(MJPEG_INTERVAL).await;

        let frame = {
            let mut queue = state.queue.lock().await;
            match queue.get_annotated_frame(camera_id).await {
                Ok(frame) => frame,
                Err(err) => {
                    error!(camera_id, error = %err, "failed to read annotated frame");
                    None
                }
            }
        };

        let chunk: Bytes = match frame {
            Some(jpeg) => {
                let mut buf = Vec::with_capacity(jpeg.len() + 64);
                buf.extend_from_slice(format!("--{MJPEG_BOUNDARY}\r\nContent-Type: image/jpeg\r\n\r\n").as_bytes());
                buf.extend_from_slice(&jpeg);
                buf.extend_from_slice(b"\r\n");
                Bytes::from(buf)
            }
            // No frame published yet for this camera: emit nothing this
            // tick rather than stalling the stream.
            None => Bytes::new(),
        };

        Some((Ok::<Bytes, Infallible>(chunk), state))
    });

    let content_type = format!("multipart/x-mixed-replace; boundary={MJPEG_BOUNDARY}");
    ([(axum::http::header::CONTENT_TYPE, content_type)], Body::from_stream(body_stream))
}
