use shard_store::StoreError;
use shard_types::{EpochId, FileId, TxId};

/// Errors produced by ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// A protocol precondition did not hold. Nothing was written.
    #[error("precondition failed: {0}")]
    PreconditionFailed(Precondition),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl LedgerError {
    /// The failed precondition, if this is a protocol failure.
    pub fn precondition(&self) -> Option<&Precondition> {
        match self {
            Self::PreconditionFailed(p) => Some(p),
            _ => None,
        }
    }
}

impl From<Precondition> for LedgerError {
    fn from(p: Precondition) -> Self {
        Self::PreconditionFailed(p)
    }
}

/// Why a transition was refused.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Precondition {
    #[error("epoch {epoch} must be closed first")]
    EpochNotClosed { epoch: EpochId },

    #[error("epoch {epoch} is no longer open")]
    EpochNotOpen { epoch: EpochId },

    #[error("transaction file {file} is still open")]
    FileStillOpen { file: FileId },

    #[error("transaction file {file} is closed")]
    FileClosed { file: FileId },

    #[error("transaction {tx} in file {file} is closed")]
    TransactionClosed { file: FileId, tx: TxId },

    #[error("transaction {tx} is not closed")]
    TransactionNotClosed { tx: TxId },

    #[error("transaction {tx} is not registered in epoch {epoch}")]
    TransactionNotFound { epoch: EpochId, tx: TxId },
}
