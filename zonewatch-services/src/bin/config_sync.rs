//! Config loader (component G, SPEC_FULL.md §4.G): reads the declarative
//! YAML tree and upserts tenants/cameras/zones/thresholds in one
//! transaction. Grounded on the original `shared/config_loader.py`'s
//! `sync_config_to_db` entry point, re-expressed as a one-shot `clap`
//! binary rather than an import run at worker/capture startup — every
//! consumer of the config tree now reads it back from the store instead of
//! re-parsing the YAML file itself.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use zonewatch_core::config::ConfigRoot;
use zonewatch_db::Store;

#[derive(Parser, Debug)]
#[command(name = "zonewatch-config-sync", about = "Upserts tenants/cameras/zones/thresholds from a YAML config file")]
struct Args {
    /// Path to the declarative config tree (§4.G).
    #[arg(long, default_value = "config.yaml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    zonewatch_services::init_tracing("zonewatch_config_sync");

    let args = Args::parse();
    let database_url = zonewatch_services::env_var("DATABASE_URL")?;

    let config = ConfigRoot::load(&args.config)
        .with_context(|| format!("loading config file {}", args.config))?;
    let tenant_count = config.tenants.len();
    let camera_count: usize = config.tenants.iter().map(|t| t.cameras.len()).sum();
    let zone_count: usize = config.tenants.iter().flat_map(|t| &t.cameras).map(|c| c.zones.len()).sum();

    info!(config = %args.config, tenant_count, camera_count, zone_count, "syncing configuration");

    let store = Store::connect(&database_url).await.context("connecting to database")?;
    zonewatch_db::config_sync::sync_config(store.pool(), &config)
        .await
        .context("config sync failed, transaction rolled back")?;

    info!("configuration sync complete");
    Ok(())
}
