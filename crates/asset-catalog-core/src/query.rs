//! Query shaping types: filters, patches, and field projections.
//!
//! A [`Filter`] is a conjunction of equality tests on scalar values.
//! Field paths may be dotted (`raw.protocol`) to address nested fields;
//! `_id` addresses the store-assigned identity. A [`Patch`] is a
//! field-level set applied to top-level fields. A [`Projection`] selects
//! which fields a read returns.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::error::StoreError;
use crate::models::{Document, ID_FIELD};

/// Check that a field path is made of non-empty segments of
/// `[A-Za-z0-9_-]`, separated by dots.
pub fn validate_field_path(path: &str) -> Result<(), StoreError> {
    if path.is_empty() {
        return Err(StoreError::InvalidQuery("empty field path".to_string()));
    }
    for segment in path.split('.') {
        let ok = !segment.is_empty()
            && segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !ok {
            return Err(StoreError::InvalidQuery(format!(
                "invalid field path: '{}'",
                path
            )));
        }
    }
    Ok(())
}

/// Check that a collection name is made of `[A-Za-z0-9_.-]`.
pub fn validate_collection_name(name: &str) -> Result<(), StoreError> {
    let ok = !name.is_empty()
        && !name.starts_with("sqlite_")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.');
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidQuery(format!(
            "invalid collection name: '{}'",
            name
        )))
    }
}

/// Resolve a dotted path inside a document.
pub fn lookup_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn scalar_eq(actual: Option<&Value>, expected: &Value) -> bool {
    match (actual, expected) {
        (None, Value::Null) => true,
        (None, _) => false,
        (Some(Value::Number(a)), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Some(a), b) => a == b,
    }
}

/// Conjunction of field equality tests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: BTreeMap<String, Value>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`insert`](Filter::insert).
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    /// Add or replace the condition on `field`.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.conditions.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.conditions.get(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.conditions.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    /// Paths must be well formed and values scalar (string, number,
    /// bool, or null).
    pub fn validate(&self) -> Result<(), StoreError> {
        for (path, value) in &self.conditions {
            validate_field_path(path)?;
            if value.is_object() || value.is_array() {
                return Err(StoreError::InvalidQuery(format!(
                    "filter on '{}' must compare against a scalar value",
                    path
                )));
            }
            if path == ID_FIELD && value.as_i64().is_none() {
                return Err(StoreError::InvalidQuery(
                    "filter on '_id' must compare against an integer".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Evaluate the filter against a stored document and its identity.
    ///
    /// A missing field matches only a `null` expectation.
    pub fn matches(&self, id: i64, doc: &Document) -> bool {
        self.conditions.iter().all(|(path, expected)| {
            if path == ID_FIELD {
                expected.as_i64() == Some(id)
            } else {
                scalar_eq(lookup_path(doc, path), expected)
            }
        })
    }

    /// Top-level, non-identity equality fields. These are written into a
    /// document created by an upsert.
    pub fn insert_fields(&self) -> Document {
        self.conditions
            .iter()
            .filter(|(path, _)| path.as_str() != ID_FIELD && !path.contains('.'))
            .map(|(path, value)| (path.clone(), value.clone()))
            .collect()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Filter {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut filter = Filter::new();
        for (k, v) in iter {
            filter.insert(k, v);
        }
        filter
    }
}

/// Field-level set applied to top-level fields of matching documents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    fields: Document,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn as_document(&self) -> &Document {
        &self.fields
    }

    /// Keys must be plain top-level names; `_id` cannot be set.
    pub fn validate(&self) -> Result<(), StoreError> {
        for key in self.fields.keys() {
            if key.contains('.') {
                return Err(StoreError::InvalidQuery(format!(
                    "patch key '{}' must be a top-level field",
                    key
                )));
            }
            validate_field_path(key)?;
            if key == ID_FIELD {
                return Err(StoreError::InvalidQuery(
                    "the '_id' field cannot be modified".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Overwrite the patched fields in `doc`.
    pub fn apply_to(&self, doc: &mut Document) {
        for (k, v) in &self.fields {
            doc.insert(k.clone(), v.clone());
        }
    }
}

impl From<Document> for Patch {
    fn from(fields: Document) -> Self {
        Self { fields }
    }
}

/// The set of fields a read returns.
///
/// An empty field set returns every stored field. The identity field is
/// excluded unless [`with_id`](Projection::with_id) is used.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projection {
    fields: BTreeSet<String>,
    include_id: bool,
}

impl Projection {
    /// Every stored field, without `_id`.
    pub fn all() -> Self {
        Self::default()
    }

    /// Only the named fields (dotted paths allowed), without `_id`.
    pub fn fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields
                .into_iter()
                .map(Into::into)
                .filter(|f: &String| f != ID_FIELD)
                .collect(),
            include_id: false,
        }
    }

    pub fn with_id(mut self) -> Self {
        self.include_id = true;
        self
    }

    pub fn includes_id(&self) -> bool {
        self.include_id
    }

    pub fn field_names(&self) -> impl Iterator<Item = &String> {
        self.fields.iter()
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        self.fields.iter().try_for_each(|f| validate_field_path(f))
    }

    /// Shape a stored body into the returned document.
    pub fn apply(&self, id: i64, mut body: Document) -> Document {
        body.remove(ID_FIELD);
        let mut out = if self.fields.is_empty() {
            body
        } else {
            let mut out = Document::new();
            for path in &self.fields {
                if let Some(value) = lookup_path(&body, path) {
                    insert_path(&mut out, path, value.clone());
                }
            }
            out
        };
        if self.include_id {
            out.insert(ID_FIELD.to_string(), Value::from(id));
        }
        out
    }
}

fn insert_path(doc: &mut Document, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            doc.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = doc
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Document::new()));
            if !entry.is_object() {
                *entry = Value::Object(Document::new());
            }
            if let Value::Object(child) = entry {
                insert_path(child, rest, value);
            }
        }
    }
}
