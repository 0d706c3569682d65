//! Ingest (component C, SPEC_FULL.md §4.C): drains `detections_queue` in
//! batches and flushes them into Postgres. Grounded on the original
//! `ingest/ingest.py` for the exact batching/backoff constants, and on
//! `zonewatch-db::pool` (retry/backoff helpers already shared with the
//! rest of the workspace) for how a flush failure is retried.

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use zonewatch_core::metrics::ProcessMetrics;
use zonewatch_core::model::ZoneEvent;
use zonewatch_core::shutdown::Shutdown;
use zonewatch_db::Store;
use zonewatch_queue::{QueueError, RedisQueue};

const DEFAULT_BATCH_SIZE: usize = 200;
const DEFAULT_LOOP_SLEEP_MS: u64 = 200;
const MAX_FLUSH_ATTEMPTS: u32 = 5;
const RETRY_BASE_SECS: u64 = 2;
const MAX_CONSECUTIVE_ERRORS: u32 = 10;
const COOLDOWN: Duration = Duration::from_secs(10);
const TRANSPORT_ERROR_BACKOFF: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<()> {
    zonewatch_services::init_tracing("zonewatch_ingest");

    let database_url = zonewatch_services::env_var("DATABASE_URL")?;
    let redis_url = zonewatch_services::env_var_or("REDIS_URL", "redis://127.0.0.1:6379");
    let frames_queue = zonewatch_services::env_var_or("REDIS_FRAMES_QUEUE", zonewatch_queue::DEFAULT_FRAMES_QUEUE);
    let detections_queue =
        zonewatch_services::env_var_or("REDIS_DETECTIONS_QUEUE", zonewatch_queue::DEFAULT_DETECTIONS_QUEUE);
    let batch_size: usize = zonewatch_services::env_parsed_or("BATCH_SIZE", DEFAULT_BATCH_SIZE);
    let loop_sleep = Duration::from_millis(zonewatch_services::env_parsed_or("LOOP_SLEEP", DEFAULT_LOOP_SLEEP_MS));

    let store = Store::connect(&database_url).await.context("connecting to database")?;
    let mut queue = RedisQueue::connect(&redis_url, frames_queue, detections_queue).await?;

    info!(batch_size, loop_sleep_ms = loop_sleep.as_millis(), "ingest starting");

    let shutdown = Shutdown::new();
    shutdown.spawn_ctrl_c_listener();
    let mut shutdown_rx = shutdown.subscribe();

    let metrics = ProcessMetrics::default();
    let mut batch: Vec<ZoneEvent> = Vec::with_capacity(batch_size);
    let mut consecutive_errors: u32 = 0;

    loop {
        if shutdown_rx.try_recv().is_ok() {
            if !batch.is_empty() {
                flush_with_retry(&store, &mut batch, &metrics).await;
            }
            info!("ingest shutting down");
            break;
        }

        match queue.pop_detection_nonblocking().await {
            Ok(Some(event)) => {
                batch.push(event);
            }
            Ok(None) => {
                // Queue is empty: flush whatever has accumulated rather than
                // waiting for a full batch, mirroring ingest.py.
                if !batch.is_empty() {
                    flush_with_retry(&store, &mut batch, &metrics).await;
                } else {
                    tokio::time::sleep(loop_sleep).await;
                }
                continue;
            }
            Err(QueueError::Malformed(reason)) => {
                warn!(reason, "malformed detections_queue entry, dropping");
                metrics.record_error();
                continue;
            }
            Err(err @ QueueError::Transport(_)) => {
                warn!(error = %err, "detections queue unreachable, backing off");
                metrics.record_error();
                if !batch.is_empty() {
                    flush_with_retry(&store, &mut batch, &metrics).await;
                }
                tokio::time::sleep(TRANSPORT_ERROR_BACKOFF).await;
                continue;
            }
        }

        if batch.len() >= batch_size {
            let ok = flush_with_retry(&store, &mut batch, &metrics).await;
            if !ok {
                consecutive_errors += 1;
                if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                    error!(consecutive_errors, "too many consecutive flush failures, cooling down");
                    tokio::time::sleep(COOLDOWN).await;
                    consecutive_errors = 0;
                }
            } else {
                consecutive_errors = 0;
            }
        }
    }

    metrics.log_summary("ingest");
    Ok(())
}

/// Flushes `batch` with exponential backoff, leaving the batch intact (for
/// the caller to retry later) only if every attempt is exhausted — ingest
/// guarantees at-least-once delivery, never silently drops a batch.
async fn flush_with_retry(store: &Store, batch: &mut Vec<ZoneEvent>, metrics: &ProcessMetrics) -> bool {
    let mut attempt = 0u32;
    loop {
        match zonewatch_db::events::insert_events_batch(store.pool(), batch.as_slice()).await {
            Ok(inserted) => {
                for _ in 0..inserted {
                    metrics.record_processed();
                }
                info!(inserted, "flushed batch");
                batch.clear();
                return true;
            }
            Err(err) => {
                attempt += 1;
                metrics.record_error();
                if attempt >= MAX_FLUSH_ATTEMPTS {
                    error!(error = %err, attempt, "batch flush exhausted retries, will retry next cycle");
                    return false;
                }
                let delay = Duration::from_secs(RETRY_BASE_SECS * 2u64.pow(attempt - 1));
                warn!(error = %err, attempt, delay_secs = delay.as_secs(), "batch flush failed, retrying");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    // Re-derives the backoff schedule ingest.py specifies (RETRY_DELAY *
    // 2**attempt, attempts 0..5) so a change to the constants above is
    // caught without needing a live database.
    #[test]
    fn backoff_schedule_matches_reference() {
        let expected = [2u64, 4, 8, 16];
        for (attempt, &exp) in (1u32..5).zip(expected.iter()) {
            let delay = Duration::from_secs(super::RETRY_BASE_SECS * 2u64.pow(attempt - 1));
            assert_eq!(delay, Duration::from_secs(exp));
        }
    }
}
