//! Generic document operations.
//!
//! [`DocumentClient`] wraps a [`DocumentStore`] with a [`RetryPolicy`] and
//! the server-managed timestamp fields:
//!
//! | Operation | Retry | Notes |
//! |-----------|-------|-------|
//! | [`get_one`](DocumentClient::get_one) | single-result | |
//! | [`iterate`](DocumentClient::iterate) | streaming (full restart) | batches of 100, `limit == 0` unbounded |
//! | [`count`](DocumentClient::count) | single-result | |
//! | [`paginate`](DocumentClient::paginate) | single-result | 1-indexed pages, ascending `_id`, `_id` included |
//! | [`update_many`](DocumentClient::update_many) | single-result | sets `_update_time` |
//! | [`upsert_one`](DocumentClient::upsert_one) | single-result | sets `_update_time`, `_create_time` on insert |
//! | [`insert_one`](DocumentClient::insert_one) | none | raw insert |
//! | [`ping`](DocumentClient::ping) | none | liveness check |

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use futures::stream::BoxStream;

use asset_catalog_core::error::{StoreError, StoreResult};
use asset_catalog_core::models::{Document, CREATE_TIME_FIELD, UPDATE_TIME_FIELD};
use asset_catalog_core::query::{Filter, Patch, Projection};
use asset_catalog_core::store::{DocumentStore, IndexSpec, UpsertOutcome};

use crate::retry::RetryPolicy;

/// Current time as stored in `_create_time` / `_update_time`.
///
/// RFC 3339 in UTC with microseconds, so lexical order is chronological.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// `patch` without caller-supplied server-managed fields, stamped with
/// `_update_time = now`.
fn stamped(patch: &Patch, now: &str) -> Patch {
    let mut set = patch.clone();
    set.remove(CREATE_TIME_FIELD);
    set.insert(UPDATE_TIME_FIELD, now);
    set
}

/// Retry-governed access to a document store.
#[derive(Clone)]
pub struct DocumentClient {
    store: Arc<dyn DocumentStore>,
    retry: RetryPolicy,
}

impl DocumentClient {
    pub fn new(store: Arc<dyn DocumentStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub async fn ping(&self) -> StoreResult<()> {
        self.store.ping().await
    }

    pub async fn get_one(
        &self,
        collection: &str,
        filter: &Filter,
        projection: &Projection,
    ) -> StoreResult<Option<Document>> {
        self.retry
            .run(|| self.store.find_one(collection, filter, projection))
            .await
    }

    /// Lazily stream matching documents. After a transient failure the
    /// whole sequence restarts, so already-yielded documents repeat.
    pub fn iterate(
        &self,
        collection: &str,
        filter: &Filter,
        projection: &Projection,
        limit: usize,
    ) -> BoxStream<'static, StoreResult<Document>> {
        let store = Arc::clone(&self.store);
        let collection = collection.to_string();
        let filter = filter.clone();
        let projection = projection.clone();
        self.retry
            .stream(move || store.find(&collection, &filter, &projection, limit))
    }

    pub async fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        self.retry
            .run(|| self.store.count(collection, filter))
            .await
    }

    /// Page `page` (1-indexed) of `page_size` documents ordered by
    /// ascending `_id`. The identity field is always included.
    pub async fn paginate(
        &self,
        collection: &str,
        filter: &Filter,
        projection: &Projection,
        page: u64,
        page_size: u64,
    ) -> StoreResult<Vec<Document>> {
        if page < 1 {
            return Err(StoreError::InvalidQuery(format!(
                "page must be >= 1, got {}",
                page
            )));
        }
        let skip = (page - 1).saturating_mul(page_size);
        let projection = projection.clone().with_id();
        self.retry
            .run(|| {
                self.store
                    .find_page(collection, filter, &projection, skip, page_size)
            })
            .await
    }

    /// Set `patch` on every matching document. Returns the match count.
    ///
    /// `_create_time` and `_update_time` in `patch` are ignored.
    pub async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Patch,
    ) -> StoreResult<u64> {
        let store = &self.store;
        self.retry
            .run(|| {
                let set = stamped(patch, &now_timestamp());
                async move { store.update_many(collection, filter, &set).await }
            })
            .await
    }

    /// Insert-or-update the document matching `filter`.
    ///
    /// `_create_time` is written only when the document is created.
    /// Server-managed fields in `patch` are ignored.
    pub async fn upsert_one(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Patch,
    ) -> StoreResult<UpsertOutcome> {
        let store = &self.store;
        self.retry
            .run(|| {
                let now = now_timestamp();
                let set = stamped(patch, &now);
                let on_insert = Patch::new().set(CREATE_TIME_FIELD, now);
                async move {
                    store
                        .upsert_one(collection, filter, &set, &on_insert)
                        .await
                }
            })
            .await
    }

    pub async fn insert_one(&self, collection: &str, doc: Document) -> StoreResult<i64> {
        self.store.insert_one(collection, doc).await
    }

    pub async fn create_index(&self, collection: &str, index: &IndexSpec) -> StoreResult<()> {
        self.store.create_index(collection, index).await
    }
}
