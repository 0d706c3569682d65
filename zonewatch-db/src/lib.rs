pub mod config_sync;
pub mod events;
pub mod hourly;
pub mod pool;
pub mod reports;
pub mod snapshot;
pub mod thresholds;

pub use pool::Store;
