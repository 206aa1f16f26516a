//! Catalog ingestion driver.
//!
//! Walks a [`MetadataSource`] and stores one `aws.product` asset per
//! service and one `aws.product_action` asset per operation. Indexes are
//! ensured up front; a failure there aborts the run. Failures on individual
//! items are logged, counted, and skipped.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde_json::Value;

use asset_catalog_core::models::{ApiOperation, AssetRecord, Document, ServiceMeta};
use asset_catalog_core::store::UpsertOutcome;

use crate::asset::{sqlite_asset_client, AssetClient};
use crate::catalog::{MetadataSource, ModelRepository};
use crate::config::Settings;

/// Outcome of one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub services_seen: u64,
    pub services_saved: u64,
    pub operations_seen: u64,
    pub operations_saved: u64,
    /// Assets created rather than updated, across both kinds.
    pub inserted: u64,
    pub failures: u64,
}

impl IngestReport {
    fn record(&mut self, outcome: &UpsertOutcome) {
        if matches!(outcome, UpsertOutcome::Inserted(_)) {
            self.inserted += 1;
        }
    }
}

fn raw_document(raw: &Value) -> Document {
    let mut extra = Document::new();
    extra.insert("raw".to_string(), raw.clone());
    extra
}

/// Store the asset describing a whole service.
pub async fn save_service_meta(
    client: &AssetClient,
    meta: &ServiceMeta,
) -> Result<UpsertOutcome> {
    let record = AssetRecord::for_service(meta);
    let outcome = client
        .save_asset(&record, raw_document(&meta.raw))
        .await
        .with_context(|| format!("failed to save service asset '{}'", record.asset_id))?;
    tracing::info!(asset_id = %record.asset_id, "saved service");
    Ok(outcome)
}

/// Store the asset describing one operation of `service_name`.
pub async fn save_service_api(
    client: &AssetClient,
    service_name: &str,
    op: &ApiOperation,
) -> Result<UpsertOutcome> {
    let record = AssetRecord::for_operation(service_name, op);
    let outcome = client
        .save_asset(&record, raw_document(&op.raw))
        .await
        .with_context(|| format!("failed to save operation asset '{}'", record.asset_id))?;
    tracing::debug!(asset_id = %record.asset_id, "saved operation");
    Ok(outcome)
}

/// Ingest every service and operation of `source` through `client`.
pub async fn ingest_catalog(
    client: &AssetClient,
    source: &dyn MetadataSource,
) -> Result<IngestReport> {
    client
        .ensure_indexes()
        .await
        .context("failed to prepare asset collections")?;

    let services = source
        .list_services()
        .context("failed to enumerate services")?;

    let mut report = IngestReport::default();
    for meta in &services {
        report.services_seen += 1;
        match save_service_meta(client, meta).await {
            Ok(outcome) => {
                report.services_saved += 1;
                report.record(&outcome);
            }
            Err(e) => {
                report.failures += 1;
                tracing::error!(service = %meta.name, error = %format!("{:#}", e), "service save failed");
            }
        }

        let operations = match source.list_operations(&meta.name) {
            Ok(ops) => ops,
            Err(e) => {
                report.failures += 1;
                tracing::error!(service = %meta.name, error = %format!("{:#}", e), "listing operations failed");
                continue;
            }
        };

        for op in &operations {
            report.operations_seen += 1;
            match save_service_api(client, &meta.name, op).await {
                Ok(outcome) => {
                    report.operations_saved += 1;
                    report.record(&outcome);
                }
                Err(e) => {
                    report.failures += 1;
                    tracing::error!(
                        service = %meta.name,
                        operation = %op.name,
                        error = %format!("{:#}", e),
                        "operation save failed"
                    );
                }
            }
        }
    }

    Ok(report)
}

/// Walk `source` without touching the store.
pub fn survey_catalog(source: &dyn MetadataSource) -> Result<IngestReport> {
    let services = source
        .list_services()
        .context("failed to enumerate services")?;
    let mut report = IngestReport::default();
    for meta in &services {
        report.services_seen += 1;
        match source.list_operations(&meta.name) {
            Ok(ops) => report.operations_seen += ops.len() as u64,
            Err(e) => {
                report.failures += 1;
                tracing::warn!(service = %meta.name, error = %format!("{:#}", e), "listing operations failed");
            }
        }
    }
    Ok(report)
}

/// `assetctl ingest`: load the model repository and store it.
///
/// The store connection is closed whether or not the run succeeds.
pub async fn run_ingest(
    settings: &Settings,
    models_dir: Option<PathBuf>,
    dry_run: bool,
) -> Result<IngestReport> {
    let mut catalog = settings.catalog.clone();
    if let Some(dir) = models_dir {
        catalog.models_dir = dir;
    }
    let repository = ModelRepository::from_settings(&catalog)?;

    if dry_run {
        let report = survey_catalog(&repository)?;
        println!("ingest {} (dry-run)", catalog.models_dir.display());
        println!("  services found: {}", report.services_seen);
        println!("  operations found: {}", report.operations_seen);
        println!("  unreadable services: {}", report.failures);
        return Ok(report);
    }

    let (connections, client) = sqlite_asset_client(settings);
    let result = ingest_catalog(&client, &repository).await;
    connections.close().await;
    let report = result?;

    println!("ingest {}", catalog.models_dir.display());
    println!(
        "  services saved: {}/{}",
        report.services_saved, report.services_seen
    );
    println!(
        "  operations saved: {}/{}",
        report.operations_saved, report.operations_seen
    );
    println!("  new assets: {}", report.inserted);
    println!("  failures: {}", report.failures);
    println!("ok");

    Ok(report)
}
