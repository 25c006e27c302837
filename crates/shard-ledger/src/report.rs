use shard_types::{EpochId, FileId, TxId};

use crate::epoch::EpochState;
use crate::status::Status;

/// Read-only summary of an epoch and what still blocks its next transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EpochReport {
    pub epoch: EpochId,
    pub state: EpochState,
    pub files: Vec<FileSummary>,
}

/// One registered transaction file as seen from its epoch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileSummary {
    pub file: FileId,
    /// `None` if the file was registered but its document was never written.
    pub status: Option<Status>,
    pub transaction_count: usize,
    pub open_transactions: Vec<TxId>,
}

impl EpochReport {
    /// Files that keep the epoch from closing.
    pub fn blocking_files(&self) -> Vec<&FileId> {
        self.files
            .iter()
            .filter(|f| f.status != Some(Status::Closed))
            .map(|f| &f.file)
            .collect()
    }

    /// Returns `true` if closing the epoch would succeed now.
    pub fn ready_to_close(&self) -> bool {
        self.state == EpochState::Open && self.blocking_files().is_empty()
    }

    /// Transactions still open in any registered file.
    pub fn open_transaction_count(&self) -> usize {
        self.files.iter().map(|f| f.open_transactions.len()).sum()
    }
}
