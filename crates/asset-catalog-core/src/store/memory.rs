//! In-memory [`DocumentStore`] implementation for testing.
//!
//! Collections are `BTreeMap`s keyed by `_id` behind a `std::sync::RwLock`.
//! Unique indexes are enforced on every write. As in SQLite, a key with a
//! missing or null component is not constrained.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::Value;

use crate::error::{StoreError, StoreResult};
use crate::models::Document;
use crate::query::{lookup_path, validate_collection_name, Filter, Patch, Projection};

use super::{DocumentStore, DocumentStream, IndexSpec, UpsertOutcome};

#[derive(Default)]
struct Collection {
    next_id: i64,
    docs: BTreeMap<i64, Document>,
    indexes: Vec<IndexSpec>,
}

impl Collection {
    fn unique_key(index: &IndexSpec, doc: &Document) -> Option<String> {
        let mut parts = Vec::with_capacity(index.fields.len());
        for field in &index.fields {
            match lookup_path(doc, field) {
                None | Some(Value::Null) => return None,
                Some(v) => parts.push(v.to_string()),
            }
        }
        Some(parts.join("\u{1f}"))
    }

    /// Check `doc` (stored as `id`) against every unique index.
    fn check_unique(&self, name: &str, id: i64, doc: &Document) -> StoreResult<()> {
        for index in self.indexes.iter().filter(|i| i.unique) {
            let key = match Self::unique_key(index, doc) {
                Some(k) => k,
                None => continue,
            };
            let clash = self
                .docs
                .iter()
                .any(|(other, d)| *other != id && Self::unique_key(index, d).as_ref() == Some(&key));
            if clash {
                return Err(StoreError::WriteConflict {
                    collection: name.to_string(),
                    message: format!("duplicate key for index {}", index.name),
                });
            }
        }
        Ok(())
    }

    fn matching(&self, filter: &Filter) -> impl Iterator<Item = (&i64, &Document)> + '_ {
        let filter = filter.clone();
        self.docs.iter().filter(move |(id, d)| filter.matches(**id, d))
    }

    fn insert(&mut self, name: &str, doc: Document) -> StoreResult<i64> {
        let id = self.next_id + 1;
        self.check_unique(name, id, &doc)?;
        self.next_id = id;
        self.docs.insert(id, doc);
        Ok(id)
    }
}

/// In-memory document store.
pub struct InMemoryDocumentStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Names of collections that have been written to.
    pub fn collection_names(&self) -> Vec<String> {
        let guard = self.collections.read().unwrap();
        let mut names: Vec<String> = guard.keys().cloned().collect();
        names.sort();
        names
    }

    fn read_matching(
        &self,
        collection: &str,
        filter: &Filter,
        projection: &Projection,
    ) -> StoreResult<Vec<Document>> {
        validate_collection_name(collection)?;
        filter.validate()?;
        projection.validate()?;
        let guard = self.collections.read().unwrap();
        Ok(match guard.get(collection) {
            Some(coll) => coll
                .matching(filter)
                .map(|(id, d)| projection.apply(*id, d.clone()))
                .collect(),
            None => Vec::new(),
        })
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
        projection: &Projection,
    ) -> StoreResult<Option<Document>> {
        Ok(self
            .read_matching(collection, filter, projection)?
            .into_iter()
            .next())
    }

    fn find(
        &self,
        collection: &str,
        filter: &Filter,
        projection: &Projection,
        limit: usize,
    ) -> DocumentStream {
        match self.read_matching(collection, filter, projection) {
            Ok(mut docs) => {
                if limit > 0 {
                    docs.truncate(limit);
                }
                stream::iter(docs.into_iter().map(Ok)).boxed()
            }
            Err(err) => stream::once(async move { Err(err) }).boxed(),
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
        Ok(self
            .read_matching(collection, filter, projection)?
            .into_iter()
            .skip(skip as usize)
            .take(limit as usize)
            .collect())
    }

    async fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        validate_collection_name(collection)?;
        filter.validate()?;
        let guard = self.collections.read().unwrap();
        Ok(guard
            .get(collection)
            .map(|c| c.matching(filter).count() as u64)
            .unwrap_or(0))
    }

    async fn insert_one(&self, collection: &str, doc: Document) -> StoreResult<i64> {
        validate_collection_name(collection)?;
        let mut guard = self.collections.write().unwrap();
        guard
            .entry(collection.to_string())
            .or_default()
            .insert(collection, doc)
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        set: &Patch,
    ) -> StoreResult<u64> {
        validate_collection_name(collection)?;
        filter.validate()?;
        set.validate()?;
        let mut guard = self.collections.write().unwrap();
        let coll = match guard.get_mut(collection) {
            Some(c) => c,
            None => return Ok(0),
        };
        let ids: Vec<i64> = coll.matching(filter).map(|(id, _)| *id).collect();
        let mut updated = Vec::with_capacity(ids.len());
        for id in &ids {
            let mut doc = coll.docs[id].clone();
            set.apply_to(&mut doc);
            coll.check_unique(collection, *id, &doc)?;
            updated.push((*id, doc));
        }
        for (id, doc) in updated {
            coll.docs.insert(id, doc);
        }
        Ok(ids.len() as u64)
    }

    async fn upsert_one(
        &self,
        collection: &str,
        filter: &Filter,
        set: &Patch,
        set_on_insert: &Patch,
    ) -> StoreResult<UpsertOutcome> {
        validate_collection_name(collection)?;
        filter.validate()?;
        set.validate()?;
        set_on_insert.validate()?;
        let mut guard = self.collections.write().unwrap();
        let coll = guard.entry(collection.to_string()).or_default();

        let existing = coll.matching(filter).map(|(id, _)| *id).next();
        match existing {
            Some(id) => {
                let mut doc = coll.docs[&id].clone();
                set.apply_to(&mut doc);
                coll.check_unique(collection, id, &doc)?;
                coll.docs.insert(id, doc);
                Ok(UpsertOutcome::Updated(id))
            }
            None => {
                let mut doc = filter.insert_fields();
                set_on_insert.apply_to(&mut doc);
                set.apply_to(&mut doc);
                coll.insert(collection, doc).map(UpsertOutcome::Inserted)
            }
        }
    }

    async fn create_index(&self, collection: &str, index: &IndexSpec) -> StoreResult<()> {
        validate_collection_name(collection)?;
        for field in &index.fields {
            crate::query::validate_field_path(field)?;
        }
        let mut guard = self.collections.write().unwrap();
        let coll = guard.entry(collection.to_string()).or_default();
        if coll.indexes.iter().any(|i| i.name == index.name) {
            return Ok(());
        }
        if index.unique {
            let mut seen = HashSet::new();
            for doc in coll.docs.values() {
                if let Some(key) = Collection::unique_key(index, doc) {
                    if !seen.insert(key) {
                        return Err(StoreError::WriteConflict {
                            collection: collection.to_string(),
                            message: format!(
                                "existing documents violate unique index {}",
                                index.name
                            ),
                        });
                    }
                }
            }
        }
        coll.indexes.push(index.clone());
        Ok(())
    }
}
