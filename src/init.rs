//! Store initialization.
//!
//! `assetctl init` checks that the store is reachable and creates the
//! unique identity index on every asset collection. Running it again is
//! a no-op.

use anyhow::{Context, Result};

use crate::asset::sqlite_asset_client;
use crate::config::Settings;

/// Create the identity indexes and return the collections they cover.
pub async fn init_store(settings: &Settings) -> Result<Vec<String>> {
    let (connections, client) = sqlite_asset_client(settings);
    let result = client.ensure_indexes().await;
    connections.close().await;
    result.context("failed to initialize the asset store")?;
    Ok(client.collections().to_vec())
}

/// `assetctl init`: verify connectivity and create the identity indexes.
pub async fn run_init(settings: &Settings) -> Result<()> {
    let collections = init_store(settings).await?;

    println!("init {}", settings.store.url);
    for collection in &collections {
        println!("  indexed: {}", collection);
    }
    println!("ok");
    Ok(())
}
