//! Process-local atomic counters and a periodic summary log line, grounded
//! on the teacher's `Metrics`/`MLMetrics` structs in `main.rs`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tracing::info;

#[derive(Debug)]
pub struct ProcessMetrics {
    started_at: Instant,
    pub processed: AtomicU64,
    pub errors: AtomicU64,
    pub dropped: AtomicU64,
}

impl Default for ProcessMetrics {
    fn default() -> Self {
        Self {
            started_at: Instant::now(),
            processed: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }
}

impl ProcessMetrics {
    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rate_per_sec(&self) -> f64 {
        let elapsed = self.started_at.elapsed().as_secs_f64().max(1e-6);
        self.processed.load(Ordering::Relaxed) as f64 / elapsed
    }

    pub fn log_summary(&self, component: &str) {
        info!(
            component,
            processed = self.processed.load(Ordering::Relaxed),
            errors = self.errors.load(Ordering::Relaxed),
            dropped = self.dropped.load(Ordering::Relaxed),
            rate_per_sec = self.rate_per_sec(),
            "periodic summary"
        );
    }
}
