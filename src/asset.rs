//! Asset domain layer.
//!
//! Shapes the generic document operations into asset semantics:
//!
//! - every asset lives in `asset.<provider>.<asset>`;
//! - `(asset_id, cloud_account_id)` identifies a record and is backed by a
//!   unique index;
//! - saves are upserts keyed by that identity and always clear `_expired`;
//! - reads only see records whose `_expired` flag is `false`.

use std::sync::Arc;

use futures::stream::BoxStream;

use asset_catalog_core::error::StoreResult;
use asset_catalog_core::models::{asset_collection, AssetRecord, Document, EXPIRED_FIELD};
use asset_catalog_core::query::{Filter, Patch, Projection};
use asset_catalog_core::store::{IndexSpec, UpsertOutcome};

use crate::config::Settings;
use crate::db::ConnectionManager;
use crate::documents::DocumentClient;
use crate::retry::RetryPolicy;
use crate::sqlite_store::SqliteDocumentStore;

/// Name of the composite identity index on every asset collection.
pub const IDENTITY_INDEX: &str = "assetId_cloudAccountId_unique";

/// Collections the ingestion pipeline writes to.
pub const DEFAULT_ASSET_COLLECTIONS: [&str; 2] = ["asset.aws.product", "asset.aws.product_action"];

fn identity_index() -> IndexSpec {
    IndexSpec::unique(IDENTITY_INDEX, ["asset_id", "cloud_account_id"])
}

/// Asset persistence on top of a [`DocumentClient`].
#[derive(Clone)]
pub struct AssetClient {
    documents: DocumentClient,
    collections: Vec<String>,
}

impl AssetClient {
    pub fn new(documents: DocumentClient) -> Self {
        Self {
            documents,
            collections: DEFAULT_ASSET_COLLECTIONS
                .iter()
                .map(|c| c.to_string())
                .collect(),
        }
    }

    /// Replace the set of collections [`ensure_indexes`](Self::ensure_indexes)
    /// provisions.
    pub fn with_collections<I, S>(mut self, collections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.collections = collections.into_iter().map(Into::into).collect();
        self
    }

    pub fn documents(&self) -> &DocumentClient {
        &self.documents
    }

    pub fn collections(&self) -> &[String] {
        &self.collections
    }

    /// Verify connectivity, then create the identity index on every known
    /// asset collection. Neither step is retried.
    pub async fn ensure_indexes(&self) -> StoreResult<()> {
        if let Err(err) = self.documents.ping().await {
            tracing::error!(error = %err, "document store connection failed");
            return Err(err);
        }
        tracing::info!("document store connection successful");

        let index = identity_index();
        for collection in &self.collections {
            if let Err(err) = self.documents.create_index(collection, &index).await {
                tracing::error!(collection = %collection, error = %err, "index creation failed");
                return Err(err);
            }
            tracing::info!(collection = %collection, index = IDENTITY_INDEX, "created index");
        }
        Ok(())
    }

    /// Upsert `record` merged with `extra` into `asset.<provider>.<asset>`.
    ///
    /// The record's own fields win over keys of the same name in `extra`,
    /// and `_expired` is reset to `false`. Write conflicts are logged with
    /// the asset id and returned.
    pub async fn save_asset(
        &self,
        record: &AssetRecord,
        extra: Document,
    ) -> StoreResult<UpsertOutcome> {
        let mut item = extra;
        item.insert(EXPIRED_FIELD.to_string(), false.into());
        item.extend(record.to_document());

        let collection = record.collection();
        let filter = Filter::new()
            .eq("asset_id", record.asset_id.as_str())
            .eq("cloud_account_id", record.cloud_account_id.as_str());

        match self
            .documents
            .upsert_one(&collection, &filter, &Patch::from(item))
            .await
        {
            Err(err) if err.is_write_conflict() => {
                tracing::warn!(
                    asset_id = %record.asset_id,
                    collection = %collection,
                    error = %err,
                    "write conflict saving asset"
                );
                Err(err)
            }
            other => other,
        }
    }

    /// Non-expired record of `asset_type` (e.g. `aws.product`) by identity.
    pub async fn get_asset(
        &self,
        asset_type: &str,
        asset_id: &str,
        cloud_account_id: &str,
        projection: &Projection,
    ) -> StoreResult<Option<Document>> {
        let filter = Filter::new()
            .eq("asset_id", asset_id)
            .eq("cloud_account_id", cloud_account_id)
            .eq(EXPIRED_FIELD, false);
        self.documents
            .get_one(&asset_collection(asset_type), &filter, projection)
            .await
    }

    /// Stream non-expired records of `asset_type` matching `filter`.
    pub fn iterate_assets(
        &self,
        asset_type: &str,
        filter: Filter,
        projection: &Projection,
        limit: usize,
    ) -> BoxStream<'static, StoreResult<Document>> {
        let filter = filter.eq(EXPIRED_FIELD, false);
        self.documents
            .iterate(&asset_collection(asset_type), &filter, projection, limit)
    }

    pub async fn count_assets(&self, asset_type: &str, filter: Filter) -> StoreResult<u64> {
        let filter = filter.eq(EXPIRED_FIELD, false);
        self.documents
            .count(&asset_collection(asset_type), &filter)
            .await
    }

    /// One page of non-expired records, `_id` included.
    pub async fn list_assets(
        &self,
        asset_type: &str,
        filter: Filter,
        projection: &Projection,
        page: u64,
        page_size: u64,
    ) -> StoreResult<Vec<Document>> {
        let filter = filter.eq(EXPIRED_FIELD, false);
        self.documents
            .paginate(&asset_collection(asset_type), &filter, projection, page, page_size)
            .await
    }

    /// Soft-expire every record of `asset_type` matching `filter`.
    pub async fn expire_assets(&self, asset_type: &str, filter: Filter) -> StoreResult<u64> {
        let collection = asset_collection(asset_type);
        let expired = self
            .documents
            .update_many(&collection, &filter, &Patch::new().set(EXPIRED_FIELD, true))
            .await?;
        tracing::info!(collection = %collection, expired, "expired assets");
        Ok(expired)
    }
}

/// Build the SQLite-backed asset client described by `settings`.
///
/// No connection is made until the first store operation.
pub fn sqlite_asset_client(settings: &Settings) -> (Arc<ConnectionManager>, AssetClient) {
    let connections = Arc::new(ConnectionManager::new(settings.store.clone()));
    let store = SqliteDocumentStore::new(Arc::clone(&connections));
    let documents = DocumentClient::new(Arc::new(store), RetryPolicy::from(&settings.retry));
    (connections, AssetClient::new(documents))
}
