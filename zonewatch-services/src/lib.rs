//! Bin-shared support: tracing init and environment-driven config loading.
//! Grounded on the teacher's `Config::default()` + override pattern
//! (`retail-surveillance/src/main.rs`), generalized to env vars per
//! SPEC_FULL.md §5 "(ambient) Configuration".

use std::str::FromStr;

use tracing_subscriber::EnvFilter;

/// Initializes `tracing-subscriber` with `RUST_LOG`, falling back to
/// `info` for this binary and `warn` for everything else.
pub fn init_tracing(binary: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{binary}=info,warn")));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

pub fn env_var(name: &str) -> anyhow::Result<String> {
    std::env::var(name).map_err(|_| anyhow::anyhow!("missing required environment variable {name}"))
}

pub fn env_var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

pub fn env_parsed_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
