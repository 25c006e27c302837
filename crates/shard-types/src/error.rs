use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid epoch id: {0}")]
    InvalidEpochId(String),

    #[error("unknown collection: {0}")]
    UnknownCollection(String),

    #[error("identifier must not be empty")]
    EmptyId,
}
