use shard_types::Collection;

/// Errors from document store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A stored document could not be decoded into the expected shape.
    #[error("corrupt document {collection}/{id}: {reason}")]
    CorruptDocument {
        collection: Collection,
        id: String,
        reason: String,
    },

    /// A document could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The snapshot root is not a JSON object of collections.
    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(String),

    /// I/O error while loading or saving a snapshot file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
