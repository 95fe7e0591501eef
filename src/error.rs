//! Error types for the document database.

use thiserror::Error;

/// Result alias for database operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The closed set of failures surfaced by [`Db`](crate::Db) operations.
///
/// Any error raised inside a mutating call aborts the whole transaction;
/// no partial effects are observable. Nothing is retried internally.
#[derive(Debug, Error)]
pub enum Error {
    /// The supplied document is not valid JSON.
    #[error("document is not valid JSON: {0}")]
    InvalidJsonDoc(#[from] serde_json::Error),

    /// The document has no `id` field.
    #[error("document has no id field")]
    NoId,

    /// The document has no `rev` field.
    #[error("document has no rev field")]
    NoRev,

    /// The document id is empty, not a string, or contains a reserved byte.
    #[error("invalid document id {id:?}")]
    InvalidId {
        /// The rejected id.
        id: String,
    },

    /// The revision on the document does not match the stored revision.
    #[error("document revision does not match the stored revision")]
    NoMatchRev,

    /// A requested document id does not exist.
    #[error("no document with id {id:?}")]
    KeyNotFound {
        /// The missing id.
        id: String,
    },

    /// The store contains data the database cannot interpret.
    #[error("store corrupted: {0}")]
    Corrupt(String),

    /// An error surfaced by the underlying ordered key-value store.
    #[error(transparent)]
    Storage(#[from] redb::Error),
}

impl From<redb::DatabaseError> for Error {
    fn from(err: redb::DatabaseError) -> Self {
        Self::Storage(err.into())
    }
}

impl From<redb::TransactionError> for Error {
    fn from(err: redb::TransactionError) -> Self {
        Self::Storage(err.into())
    }
}

impl From<redb::TableError> for Error {
    fn from(err: redb::TableError) -> Self {
        Self::Storage(err.into())
    }
}

impl From<redb::StorageError> for Error {
    fn from(err: redb::StorageError) -> Self {
        Self::Storage(err.into())
    }
}

impl From<redb::CommitError> for Error {
    fn from(err: redb::CommitError) -> Self {
        Self::Storage(err.into())
    }
}
