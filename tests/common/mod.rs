//! Fault-injecting document store shared by integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use asset_catalog_core::error::{StoreError, StoreResult};
use asset_catalog_core::models::Document;
use asset_catalog_core::query::{Filter, Patch, Projection};
use asset_catalog_core::store::memory::InMemoryDocumentStore;
use asset_catalog_core::store::{DocumentStore, DocumentStream, IndexSpec, UpsertOutcome};

/// Wraps an in-memory store and injects failures.
///
/// - `failing_calls` single-result calls fail with a connection error
///   before reaching the store;
/// - `failing_streams` streams yield `stream_fail_after` documents, then
///   fail with a connection error;
/// - `conflicts` upserts fail with a write conflict;
/// - upserts of an `asset_id` in `rejected` always fail fatally.
pub struct FlakyStore {
    pub inner: InMemoryDocumentStore,
    pub failing_calls: AtomicUsize,
    pub failing_streams: AtomicUsize,
    pub stream_fail_after: usize,
    pub conflicts: AtomicUsize,
    pub rejected: Mutex<HashSet<String>>,
    pub calls: AtomicUsize,
    pub opens: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryDocumentStore::new(),
            failing_calls: AtomicUsize::new(0),
            failing_streams: AtomicUsize::new(0),
            stream_fail_after: 0,
            conflicts: AtomicUsize::new(0),
            rejected: Mutex::new(HashSet::new()),
            calls: AtomicUsize::new(0),
            opens: AtomicUsize::new(0),
        }
    }

    pub fn reject(&self, asset_id: &str) {
        self.rejected.lock().unwrap().insert(asset_id.to_string());
    }

    fn take(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn enter(&self) -> StoreResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if Self::take(&self.failing_calls) {
            return Err(StoreError::Connection("connection reset by peer".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn ping(&self) -> StoreResult<()> {
        self.enter()?;
        self.inner.ping().await
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
        projection: &Projection,
    ) -> StoreResult<Option<Document>> {
        self.enter()?;
        self.inner.find_one(collection, filter, projection).await
    }

    fn find(
        &self,
        collection: &str,
        filter: &Filter,
        projection: &Projection,
        limit: usize,
    ) -> DocumentStream {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let docs = self.inner.find(collection, filter, projection, limit);
        if Self::take(&self.failing_streams) {
            docs.take(self.stream_fail_after)
                .chain(stream::once(async {
                    Err(StoreError::Connection("cursor lost".into()))
                }))
                .boxed()
        } else {
            docs
        }
    }

    async fn find_page(
        &self,
        collection: &str,
        filter: &Filter,
        projection: &Projection,
        skip: u64,
        limit: u64,
    ) -> StoreResult<Vec<Document>> {
        self.enter()?;
        self.inner
            .find_page(collection, filter, projection, skip, limit)
            .await
    }

    async fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        self.enter()?;
        self.inner.count(collection, filter).await
    }

    async fn insert_one(&self, collection: &str, doc: Document) -> StoreResult<i64> {
        self.enter()?;
        self.inner.insert_one(collection, doc).await
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        set: &Patch,
    ) -> StoreResult<u64> {
        self.enter()?;
        self.inner.update_many(collection, filter, set).await
    }

    async fn upsert_one(
        &self,
        collection: &str,
        filter: &Filter,
        set: &Patch,
        set_on_insert: &Patch,
    ) -> StoreResult<UpsertOutcome> {
        self.enter()?;
        let rejected = filter
            .get("asset_id")
            .and_then(|v| v.as_str())
            .map(|id| self.rejected.lock().unwrap().contains(id))
            .unwrap_or(false);
        if rejected {
            return Err(StoreError::Backend("document rejected".into()));
        }
        if Self::take(&self.conflicts) {
            return Err(StoreError::WriteConflict {
                collection: collection.to_string(),
                message: "concurrent upsert".into(),
            });
        }
        self.inner
            .upsert_one(collection, filter, set, set_on_insert)
            .await
    }

    async fn create_index(&self, collection: &str, index: &IndexSpec) -> StoreResult<()> {
        self.enter()?;
        self.inner.create_index(collection, index).await
    }
}
