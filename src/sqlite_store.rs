//! SQLite-backed [`DocumentStore`] implementation.
//!
//! Each collection is a table named exactly after the collection, holding
//! one JSON document per row:
//!
//! ```sql
//! CREATE TABLE "asset.aws.product" (
//!     _id  INTEGER PRIMARY KEY AUTOINCREMENT,
//!     body TEXT NOT NULL
//! )
//! ```
//!
//! Filters compile to `json_extract(body, '$."field"') = ?` conditions and
//! patches to a single `json_set(...)` update. Indexes are expression
//! indexes over the same `json_extract` calls, so a unique index rejects
//! duplicate keys at the storage level.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool};

use asset_catalog_core::error::{StoreError, StoreResult};
use asset_catalog_core::models::{Document, ID_FIELD};
use asset_catalog_core::query::{
    validate_collection_name, validate_field_path, Filter, Patch, Projection,
};
use asset_catalog_core::store::{
    DocumentStore, DocumentStream, IndexSpec, UpsertOutcome, ITER_BATCH_SIZE,
};

use crate::db::ConnectionManager;

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// Map a sqlx error onto the store error taxonomy.
pub(crate) fn classify_sqlx_error(collection: &str, err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::WorkerCrashed => StoreError::Connection(err.to_string()),
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::WriteConflict {
            collection: collection.to_string(),
            message: db.message().to_string(),
        },
        sqlx::Error::Database(db) => {
            let primary = db
                .code()
                .and_then(|c| c.parse::<i32>().ok())
                .map(|c| c & 0xff);
            match primary {
                // SQLITE_BUSY, SQLITE_LOCKED, SQLITE_CANTOPEN
                Some(5) | Some(6) | Some(14) => StoreError::Connection(err.to_string()),
                _ => StoreError::Backend(err.to_string()),
            }
        }
        _ => StoreError::Backend(err.to_string()),
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name)
}

/// `raw.http.method` → `'$."raw"."http"."method"'` (validated paths only).
fn json_path_literal(path: &str) -> String {
    let mut out = String::from("'$");
    for segment in path.split('.') {
        out.push_str(".\"");
        out.push_str(segment);
        out.push('"');
    }
    out.push('\'');
    out
}

fn extract_expr(path: &str) -> String {
    format!("json_extract(body, {})", json_path_literal(path))
}

#[derive(Debug, Clone)]
enum SqlValue {
    Int(i64),
    Real(f64),
    Text(String),
}

fn bind_all<'q>(mut query: SqliteQuery<'q>, values: &[SqlValue]) -> SqliteQuery<'q> {
    for value in values {
        query = match value {
            SqlValue::Int(v) => query.bind(*v),
            SqlValue::Real(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.clone()),
        };
    }
    query
}

/// Compile a validated filter into a `WHERE` clause and its bind values.
fn where_clause(filter: &Filter) -> (String, Vec<SqlValue>) {
    let mut conditions = Vec::with_capacity(filter.len());
    let mut binds = Vec::with_capacity(filter.len());
    for (path, value) in filter.iter() {
        if path == ID_FIELD {
            conditions.push("_id = ?".to_string());
            binds.push(SqlValue::Int(value.as_i64().unwrap_or_default()));
            continue;
        }
        let expr = extract_expr(path);
        // json_extract flattens booleans to 1/0 and containers to JSON
        // text, so every typed comparison also checks json_type.
        let json_type = format!("json_type(body, {})", json_path_literal(path));
        match value {
            Value::Null => conditions.push(format!("{} IS NULL", expr)),
            Value::Bool(b) => {
                let literal = if *b { "true" } else { "false" };
                conditions.push(format!("{} = '{}'", json_type, literal));
            }
            Value::Number(n) => {
                conditions.push(format!(
                    "{} = ? AND {} IN ('integer', 'real')",
                    expr, json_type
                ));
                match n.as_i64() {
                    Some(i) => binds.push(SqlValue::Int(i)),
                    None => binds.push(SqlValue::Real(n.as_f64().unwrap_or_default())),
                }
            }
            Value::String(s) => {
                conditions.push(format!("{} = ? AND {} = 'text'", expr, json_type));
                binds.push(SqlValue::Text(s.clone()));
            }
            Value::Array(_) | Value::Object(_) => {
                // rejected by Filter::validate
                conditions.push("0".to_string());
            }
        }
    }
    if conditions.is_empty() {
        ("1 = 1".to_string(), binds)
    } else {
        (conditions.join(" AND "), binds)
    }
}

/// Compile a validated patch into `json_set(body, path, json(?), ...)`.
fn json_set_expr(patch: &Patch) -> StoreResult<(String, Vec<SqlValue>)> {
    let mut expr = String::from("json_set(body");
    let mut binds = Vec::new();
    for (key, value) in patch.iter() {
        expr.push_str(", ");
        expr.push_str(&json_path_literal(key));
        expr.push_str(", json(?)");
        binds.push(SqlValue::Text(serde_json::to_string(value)?));
    }
    expr.push(')');
    Ok((expr, binds))
}

fn row_to_document(row: &SqliteRow, projection: &Projection) -> StoreResult<Document> {
    let id: i64 = row
        .try_get("_id")
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    let body: String = row
        .try_get("body")
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    let doc: Document = serde_json::from_str(&body)?;
    Ok(projection.apply(id, doc))
}

/// SQLite implementation of the [`DocumentStore`] trait.
///
/// Cloning is cheap; clones share the connection manager and the set of
/// collections already known to exist.
#[derive(Clone)]
pub struct SqliteDocumentStore {
    connections: Arc<ConnectionManager>,
    known_collections: Arc<Mutex<HashSet<String>>>,
}

impl SqliteDocumentStore {
    pub fn new(connections: Arc<ConnectionManager>) -> Self {
        Self {
            connections,
            known_collections: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    /// Acquire the pool and make sure the collection's table exists.
    async fn collection_pool(&self, collection: &str) -> StoreResult<&SqlitePool> {
        validate_collection_name(collection)?;
        let pool = self.connections.acquire().await?;

        let known = self
            .known_collections
            .lock()
            .map(|set| set.contains(collection))
            .unwrap_or(false);
        if !known {
            let sql = format!(
                "CREATE TABLE IF NOT EXISTS {} (_id INTEGER PRIMARY KEY AUTOINCREMENT, body TEXT NOT NULL)",
                quote_ident(collection)
            );
            sqlx::query(&sql)
                .execute(pool)
                .await
                .map_err(|e| classify_sqlx_error(collection, e))?;
            if let Ok(mut set) = self.known_collections.lock() {
                set.insert(collection.to_string());
            }
        }
        Ok(pool)
    }

    async fn fetch_batch(
        &self,
        collection: &str,
        filter: &Filter,
        after_id: i64,
        batch: usize,
    ) -> StoreResult<Vec<(i64, Document)>> {
        let pool = self.collection_pool(collection).await?;
        let (clause, binds) = where_clause(filter);
        let sql = format!(
            "SELECT _id, body FROM {} WHERE ({}) AND _id > ? ORDER BY _id ASC LIMIT ?",
            quote_ident(collection),
            clause
        );
        let rows = bind_all(sqlx::query(&sql), &binds)
            .bind(after_id)
            .bind(batch as i64)
            .fetch_all(pool)
            .await
            .map_err(|e| classify_sqlx_error(collection, e))?;
        rows.iter()
            .map(|row| {
                let id: i64 = row
                    .try_get("_id")
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
                let doc = row_to_document(row, &Projection::all())?;
                Ok((id, doc))
            })
            .collect()
    }
}

/// State of a streamed read: keyset pagination over `_id`.
struct Cursor {
    store: SqliteDocumentStore,
    collection: String,
    filter: Filter,
    projection: Projection,
    remaining: Option<usize>,
    last_id: i64,
    buffer: VecDeque<Document>,
    exhausted: bool,
}

impl Cursor {
    async fn refill(&mut self) -> StoreResult<()> {
        let batch = match self.remaining {
            Some(0) => {
                self.exhausted = true;
                return Ok(());
            }
            Some(n) => n.min(ITER_BATCH_SIZE),
            None => ITER_BATCH_SIZE,
        };
        let rows = self
            .store
            .fetch_batch(&self.collection, &self.filter, self.last_id, batch)
            .await?;
        if rows.len() < batch {
            self.exhausted = true;
        }
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= rows.len();
        }
        for (id, doc) in rows {
            self.last_id = id;
            self.buffer.push_back(self.projection.apply(id, doc));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn ping(&self) -> StoreResult<()> {
        let pool = self.connections.acquire().await?;
        sqlx::query("SELECT 1")
            .execute(pool)
            .await
            .map_err(|e| classify_sqlx_error("<ping>", e))?;
        Ok(())
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
        projection: &Projection,
    ) -> StoreResult<Option<Document>> {
        filter.validate()?;
        projection.validate()?;
        let pool = self.collection_pool(collection).await?;
        let (clause, binds) = where_clause(filter);
        let sql = format!(
            "SELECT _id, body FROM {} WHERE {} ORDER BY _id ASC LIMIT 1",
            quote_ident(collection),
            clause
        );
        let row = bind_all(sqlx::query(&sql), &binds)
            .fetch_optional(pool)
            .await
            .map_err(|e| classify_sqlx_error(collection, e))?;
        row.map(|r| row_to_document(&r, projection)).transpose()
    }

    fn find(
        &self,
        collection: &str,
        filter: &Filter,
        projection: &Projection,
        limit: usize,
    ) -> DocumentStream {
        let checked = validate_collection_name(collection)
            .and_then(|_| filter.validate())
            .and_then(|_| projection.validate());
        if let Err(err) = checked {
            return stream::once(async move { Err(err) }).boxed();
        }

        let cursor = Cursor {
            store: self.clone(),
            collection: collection.to_string(),
            filter: filter.clone(),
            projection: projection.clone(),
            remaining: if limit == 0 { None } else { Some(limit) },
            last_id: 0,
            buffer: VecDeque::new(),
            exhausted: false,
        };

        stream::try_unfold(cursor, |mut cursor| async move {
            loop {
                if let Some(doc) = cursor.buffer.pop_front() {
                    return Ok::<_, StoreError>(Some((doc, cursor)));
                }
                if cursor.exhausted {
                    return Ok(None);
                }
                cursor.refill().await?;
            }
        })
        .boxed()
    }

    async fn find_page(
        &self,
        collection: &str,
        filter: &Filter,
        projection: &Projection,
        skip: u64,
        limit: u64,
    ) -> StoreResult<Vec<Document>> {
        filter.validate()?;
        projection.validate()?;
        let pool = self.collection_pool(collection).await?;
        let (clause, binds) = where_clause(filter);
        let sql = format!(
            "SELECT _id, body FROM {} WHERE {} ORDER BY _id ASC LIMIT ? OFFSET ?",
            quote_ident(collection),
            clause
        );
        let rows = bind_all(sqlx::query(&sql), &binds)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .bind(i64::try_from(skip).unwrap_or(i64::MAX))
            .fetch_all(pool)
            .await
            .map_err(|e| classify_sqlx_error(collection, e))?;
        rows.iter()
            .map(|row| row_to_document(row, projection))
            .collect()
    }

    async fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        filter.validate()?;
        let pool = self.collection_pool(collection).await?;
        let (clause, binds) = where_clause(filter);
        let sql = format!(
            "SELECT COUNT(*) AS n FROM {} WHERE {}",
            quote_ident(collection),
            clause
        );
        let row = bind_all(sqlx::query(&sql), &binds)
            .fetch_one(pool)
            .await
            .map_err(|e| classify_sqlx_error(collection, e))?;
        let n: i64 = row
            .try_get("n")
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(n.max(0) as u64)
    }

    async fn insert_one(&self, collection: &str, mut doc: Document) -> StoreResult<i64> {
        let pool = self.collection_pool(collection).await?;
        doc.remove(ID_FIELD);
        let body = serde_json::to_string(&doc)?;
        let sql = format!("INSERT INTO {} (body) VALUES (json(?))", quote_ident(collection));
        let result = sqlx::query(&sql)
            .bind(body)
            .execute(pool)
            .await
            .map_err(|e| classify_sqlx_error(collection, e))?;
        Ok(result.last_insert_rowid())
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        set: &Patch,
    ) -> StoreResult<u64> {
        filter.validate()?;
        set.validate()?;
        if set.is_empty() {
            return self.count(collection, filter).await;
        }
        let pool = self.collection_pool(collection).await?;
        let (set_expr, mut binds) = json_set_expr(set)?;
        let (clause, where_binds) = where_clause(filter);
        binds.extend(where_binds);
        let sql = format!(
            "UPDATE {} SET body = {} WHERE {}",
            quote_ident(collection),
            set_expr,
            clause
        );
        let result = bind_all(sqlx::query(&sql), &binds)
            .execute(pool)
            .await
            .map_err(|e| classify_sqlx_error(collection, e))?;
        Ok(result.rows_affected())
    }

    async fn upsert_one(
        &self,
        collection: &str,
        filter: &Filter,
        set: &Patch,
        set_on_insert: &Patch,
    ) -> StoreResult<UpsertOutcome> {
        filter.validate()?;
        set.validate()?;
        set_on_insert.validate()?;
        let pool = self.collection_pool(collection).await?;
        let map_err = |e| classify_sqlx_error(collection, e);

        let mut tx = pool.begin().await.map_err(map_err)?;

        let (clause, binds) = where_clause(filter);
        let select = format!(
            "SELECT _id FROM {} WHERE {} ORDER BY _id ASC LIMIT 1",
            quote_ident(collection),
            clause
        );
        let existing: Option<i64> = bind_all(sqlx::query(&select), &binds)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_err)?
            .map(|row| row.try_get::<i64, _>("_id"))
            .transpose()
            .map_err(map_err)?;

        let outcome = match existing {
            Some(id) => {
                if !set.is_empty() {
                    let (set_expr, binds) = json_set_expr(set)?;
                    let sql = format!(
                        "UPDATE {} SET body = {} WHERE _id = ?",
                        quote_ident(collection),
                        set_expr
                    );
                    bind_all(sqlx::query(&sql), &binds)
                        .bind(id)
                        .execute(&mut *tx)
                        .await
                        .map_err(map_err)?;
                }
                UpsertOutcome::Updated(id)
            }
            None => {
                let mut doc = filter.insert_fields();
                set_on_insert.apply_to(&mut doc);
                set.apply_to(&mut doc);
                let body = serde_json::to_string(&doc)?;
                let sql = format!("INSERT INTO {} (body) VALUES (json(?))", quote_ident(collection));
                let result = sqlx::query(&sql)
                    .bind(body)
                    .execute(&mut *tx)
                    .await
                    .map_err(map_err)?;
                UpsertOutcome::Inserted(result.last_insert_rowid())
            }
        };

        tx.commit().await.map_err(map_err)?;
        Ok(outcome)
    }

    async fn create_index(&self, collection: &str, index: &IndexSpec) -> StoreResult<()> {
        validate_collection_name(&index.name)?;
        if index.fields.is_empty() {
            return Err(StoreError::InvalidQuery(format!(
                "index {} has no fields",
                index.name
            )));
        }
        for field in &index.fields {
            validate_field_path(field)?;
        }
        let pool = self.collection_pool(collection).await?;
        let columns: Vec<String> = index.fields.iter().map(|f| extract_expr(f)).collect();
        let sql = format!(
            "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
            if index.unique { "UNIQUE " } else { "" },
            quote_ident(&format!("{}.{}", collection, index.name)),
            quote_ident(collection),
            columns.join(", ")
        );
        sqlx::query(&sql)
            .execute(pool)
            .await
            .map_err(|e| classify_sqlx_error(collection, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_path_literal() {
        assert_eq!(json_path_literal("asset_id"), "'$.\"asset_id\"'");
        assert_eq!(json_path_literal("raw.http"), "'$.\"raw\".\"http\"'");
    }

    #[test]
    fn test_where_clause_types() {
        let filter = Filter::new()
            .eq("_expired", false)
            .eq("asset_id", "s3.ListBuckets")
            .eq("missing", Value::Null)
            .eq("_id", 3);
        let (clause, binds) = where_clause(&filter);
        assert!(clause.contains("_id = ?"));
        assert!(clause.contains("json_extract(body, '$.\"missing\"') IS NULL"));
        assert!(clause.contains("json_type(body, '$.\"_expired\"') = 'false'"));
        assert!(clause.contains("json_type(body, '$.\"asset_id\"') = 'text'"));
        assert_eq!(binds.len(), 2);
    }

    #[test]
    fn test_where_clause_number_requires_numeric_type() {
        let (clause, binds) = where_clause(&Filter::new().eq("raw.version", 2));
        assert_eq!(
            clause,
            "json_extract(body, '$.\"raw\".\"version\"') = ? \
             AND json_type(body, '$.\"raw\".\"version\"') IN ('integer', 'real')"
        );
        assert!(matches!(binds.as_slice(), [SqlValue::Int(2)]));
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let (clause, binds) = where_clause(&Filter::new());
        assert_eq!(clause, "1 = 1");
        assert!(binds.is_empty());
    }

    #[test]
    fn test_json_set_expr_binds_json_text() {
        let patch = Patch::new().set("raw", json!({"a": 1})).set("_expired", false);
        let (expr, binds) = json_set_expr(&patch).unwrap();
        assert!(expr.starts_with("json_set(body, "));
        assert_eq!(expr.matches("json(?)").count(), 2);
        assert_eq!(binds.len(), 2);
    }
}
