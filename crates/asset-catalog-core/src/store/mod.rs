//! Storage abstraction for the asset catalog.
//!
//! The [`DocumentStore`] trait defines the raw document primitives the
//! persistence layer is built on: point lookup, streamed and paged reads,
//! counting, inserts, field-level updates, upserts, and index creation.
//! Implementations do not retry; retry and server-managed timestamps are
//! layered on top by the application's document client.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::StoreResult;
use crate::models::Document;
use crate::query::{Filter, Patch, Projection};

/// Number of documents fetched per round-trip by streamed reads.
pub const ITER_BATCH_SIZE: usize = 100;

/// Lazily produced sequence of documents.
pub type DocumentStream = BoxStream<'static, StoreResult<Document>>;

/// Index definition over one or more field paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub fields: Vec<String>,
    pub unique: bool,
}

impl IndexSpec {
    pub fn unique<I, S>(name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
            unique: true,
        }
    }
}

/// Result of an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No document matched; a new one was created with this identity.
    Inserted(i64),
    /// The document with this identity was updated.
    Updated(i64),
}

impl UpsertOutcome {
    pub fn id(&self) -> i64 {
        match self {
            UpsertOutcome::Inserted(id) | UpsertOutcome::Updated(id) => *id,
        }
    }
}

/// Abstract document store.
///
/// Collections are created implicitly on first use. Reads of a collection
/// that was never written return no documents.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`ping`](DocumentStore::ping) | Lightweight liveness check |
/// | [`find_one`](DocumentStore::find_one) | Point lookup |
/// | [`find`](DocumentStore::find) | Streamed read in batches of [`ITER_BATCH_SIZE`] |
/// | [`find_page`](DocumentStore::find_page) | Offset read ordered by ascending `_id` |
/// | [`count`](DocumentStore::count) | Number of matching documents |
/// | [`insert_one`](DocumentStore::insert_one) | Raw insert |
/// | [`update_many`](DocumentStore::update_many) | Field-level set on every match |
/// | [`upsert_one`](DocumentStore::upsert_one) | Insert-or-update the first match |
/// | [`create_index`](DocumentStore::create_index) | Idempotent index creation |
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn ping(&self) -> StoreResult<()>;

    /// First matching document in ascending `_id` order.
    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
        projection: &Projection,
    ) -> StoreResult<Option<Document>>;

    /// Matching documents in ascending `_id` order. `limit == 0` means
    /// unbounded. Nothing is read until the stream is polled.
    fn find(
        &self,
        collection: &str,
        filter: &Filter,
        projection: &Projection,
        limit: usize,
    ) -> DocumentStream;

    async fn find_page(
        &self,
        collection: &str,
        filter: &Filter,
        projection: &Projection,
        skip: u64,
        limit: u64,
    ) -> StoreResult<Vec<Document>>;

    async fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64>;

    /// Returns the assigned `_id`. Unique index violations surface as
    /// [`StoreError::WriteConflict`](crate::error::StoreError::WriteConflict).
    async fn insert_one(&self, collection: &str, doc: Document) -> StoreResult<i64>;

    /// Returns the number of matched documents.
    async fn update_many(&self, collection: &str, filter: &Filter, set: &Patch)
        -> StoreResult<u64>;

    /// Applies `set` to the first match. When nothing matches, inserts a
    /// document built from the filter's top-level equality fields,
    /// `set_on_insert`, and `set` (later wins).
    async fn upsert_one(
        &self,
        collection: &str,
        filter: &Filter,
        set: &Patch,
        set_on_insert: &Patch,
    ) -> StoreResult<UpsertOutcome>;

    /// No-op when an index with the same name already exists.
    async fn create_index(&self, collection: &str, index: &IndexSpec) -> StoreResult<()>;
}
