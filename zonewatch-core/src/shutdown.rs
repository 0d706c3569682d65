//! Broadcast-based graceful shutdown, grounded on
//! `Coldaine-recall-pipeline/capture/src/bin/recall.rs`'s `ShutdownSignal`
//! channel and per-task `tokio::select!` idiom.

use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy)]
pub struct ShutdownSignal;

/// Wraps a broadcast channel fed by `ctrl_c()`. Every long-running loop
/// subscribes its own receiver and selects on `recv()` alongside its
/// regular work.
#[derive(Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<ShutdownSignal>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownSignal> {
        self.tx.subscribe()
    }

    pub fn trigger(&self) {
        let _ = self.tx.send(ShutdownSignal);
    }

    /// Spawns a task that triggers shutdown on ctrl-c.
    pub fn spawn_ctrl_c_listener(&self) {
        let this = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown signal received");
                this.trigger();
            }
        });
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
