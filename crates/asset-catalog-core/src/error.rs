//! Store error taxonomy.
//!
//! Errors are split into *transient* failures, which the retry layer
//! recovers from by re-running the operation, and *fatal* failures, which
//! surface immediately.

use thiserror::Error;

/// Error returned by [`DocumentStore`](crate::store::DocumentStore)
/// operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store could not be reached, or the connection dropped or was
    /// busy mid-operation.
    #[error("connection failure: {0}")]
    Connection(String),

    /// A write collided with another write or with a unique index.
    #[error("write conflict on collection {collection}: {message}")]
    WriteConflict { collection: String, message: String },

    /// Malformed filter, patch, projection, or collection name.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// A stored or supplied document could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Any other backend failure.
    #[error("store error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Connection(_) | StoreError::WriteConflict { .. }
        )
    }

    pub fn is_write_conflict(&self) -> bool {
        matches!(self, StoreError::WriteConflict { .. })
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
