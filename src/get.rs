//! Asset retrieval commands.
//!
//! `assetctl get` prints one stored asset, `assetctl list` prints a page
//! of assets of one type. Both only see non-expired records and print JSON
//! so the output can be piped into other tools.

use anyhow::{bail, Context, Result};
use serde::Serialize;

use asset_catalog_core::models::Document;
use asset_catalog_core::query::{Filter, Projection};

use crate::asset::{sqlite_asset_client, AssetClient};
use crate::config::Settings;

/// One page of `list` output.
#[derive(Debug, Clone, Serialize)]
pub struct AssetPage {
    pub asset_type: String,
    pub page: u64,
    pub page_size: u64,
    pub total: u64,
    pub items: Vec<Document>,
}

fn projection_for(fields: &[String]) -> Projection {
    if fields.is_empty() {
        Projection::all()
    } else {
        Projection::fields(fields.iter().cloned())
    }
}

/// Fetch a single asset, failing when it does not exist.
pub async fn get_asset(
    client: &AssetClient,
    asset_type: &str,
    asset_id: &str,
    cloud_account_id: &str,
    fields: &[String],
) -> Result<Document> {
    let found = client
        .get_asset(asset_type, asset_id, cloud_account_id, &projection_for(fields))
        .await
        .with_context(|| format!("failed to read asset '{}'", asset_id))?;
    match found {
        Some(doc) => Ok(doc),
        None => bail!("asset not found: {} {}", asset_type, asset_id),
    }
}

pub async fn list_assets(
    client: &AssetClient,
    asset_type: &str,
    page: u64,
    page_size: u64,
    fields: &[String],
) -> Result<AssetPage> {
    let items = client
        .list_assets(
            asset_type,
            Filter::new(),
            &projection_for(fields),
            page,
            page_size,
        )
        .await
        .with_context(|| format!("failed to list '{}'", asset_type))?;
    let total = client
        .count_assets(asset_type, Filter::new())
        .await
        .with_context(|| format!("failed to count '{}'", asset_type))?;
    Ok(AssetPage {
        asset_type: asset_type.to_string(),
        page,
        page_size,
        total,
        items,
    })
}

pub async fn run_get(
    settings: &Settings,
    asset_type: &str,
    asset_id: &str,
    cloud_account_id: &str,
    fields: &[String],
) -> Result<()> {
    let (connections, client) = sqlite_asset_client(settings);
    let result = get_asset(&client, asset_type, asset_id, cloud_account_id, fields).await;
    connections.close().await;

    let doc = result?;
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}

pub async fn run_list(
    settings: &Settings,
    asset_type: &str,
    page: u64,
    page_size: u64,
    fields: &[String],
) -> Result<()> {
    let (connections, client) = sqlite_asset_client(settings);
    let result = list_assets(&client, asset_type, page, page_size, fields).await;
    connections.close().await;

    let page = result?;
    println!("{}", serde_json::to_string_pretty(&page)?);
    Ok(())
}
