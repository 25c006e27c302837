//! Epochs: append-only checkpoints grouping transaction files.
//!
//! State only moves forward, `Open -> Closed -> Consolidated`. Repeating a
//! transition that already happened returns the epoch unchanged.

use std::fmt;

use serde::{Deserialize, Serialize};
use shard_types::{EpochId, FileId, IdSet};

use crate::error::{LedgerError, Precondition};
use crate::status::Status;

/// Lifecycle state of an epoch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EpochState {
    /// Accepting new transaction files.
    #[default]
    Open,
    /// Every registered file is closed; accounts may be consolidated.
    Closed,
    /// Consolidation of the epoch has been declared complete.
    Consolidated,
}

impl fmt::Display for EpochState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
            Self::Consolidated => write!(f, "consolidated"),
        }
    }
}

/// An epoch document.
///
/// Stored as `{closed, consolidated, txfs}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "EpochDoc", into = "EpochDoc")]
pub struct Epoch {
    pub state: EpochState,
    /// Transaction files registered while the epoch was open.
    pub files: IdSet,
}

#[derive(Default, Serialize, Deserialize)]
struct EpochDoc {
    #[serde(default)]
    closed: bool,
    #[serde(default)]
    consolidated: bool,
    #[serde(default)]
    txfs: IdSet,
}

impl From<EpochDoc> for Epoch {
    fn from(doc: EpochDoc) -> Self {
        // `consolidated` implies `closed`; a document with only the former
        // set still reads as consolidated.
        let state = match (doc.closed, doc.consolidated) {
            (_, true) => EpochState::Consolidated,
            (true, false) => EpochState::Closed,
            (false, false) => EpochState::Open,
        };
        Self {
            state,
            files: doc.txfs,
        }
    }
}

impl From<Epoch> for EpochDoc {
    fn from(epoch: Epoch) -> Self {
        Self {
            closed: epoch.state >= EpochState::Closed,
            consolidated: epoch.state == EpochState::Consolidated,
            txfs: epoch.files,
        }
    }
}

impl Epoch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.state == EpochState::Open
    }

    /// Closed or consolidated.
    pub fn is_closed(&self) -> bool {
        self.state >= EpochState::Closed
    }

    pub fn is_consolidated(&self) -> bool {
        self.state == EpochState::Consolidated
    }

    pub fn files(&self) -> &IdSet {
        &self.files
    }

    /// Register a transaction file. Registering twice is a no-op.
    pub fn register_file(mut self, file: &FileId) -> Self {
        self.files.insert(file.as_str());
        self
    }

    /// Close the epoch.
    ///
    /// `status_of` resolves a registered file id to its status, or `None` if
    /// the file document does not exist. Every registered file must resolve
    /// to `Closed`; a missing file counts as open. An epoch with no files
    /// closes trivially. The files are checked even if the epoch is already
    /// closed; a file registered after the close blocks it.
    pub fn close<F>(self, mut status_of: F) -> Result<Self, LedgerError>
    where
        F: FnMut(&FileId) -> Result<Option<Status>, LedgerError>,
    {
        for id in &self.files {
            let file = FileId::from(id.as_str());
            if status_of(&file)? != Some(Status::Closed) {
                return Err(Precondition::FileStillOpen { file }.into());
            }
        }
        if self.is_closed() {
            return Ok(self);
        }
        Ok(Self {
            state: EpochState::Closed,
            ..self
        })
    }

    /// Mark the epoch consolidated. `id` is only used for the error.
    pub fn consolidate(self, id: EpochId) -> Result<Self, Precondition> {
        match self.state {
            EpochState::Open => Err(Precondition::EpochNotClosed { epoch: id }),
            EpochState::Closed => Ok(Self {
                state: EpochState::Consolidated,
                ..self
            }),
            EpochState::Consolidated => Ok(self),
        }
    }
}
