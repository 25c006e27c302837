//! Transaction files: named batches of transactions and their participants.
//!
//! A file and each transaction in it move from open to closed exactly once.
//! Participants can only be added while both are open. This module knows
//! nothing about accounts or amounts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use shard_types::{FileId, IdSet, TxId};

use crate::error::Precondition;
use crate::status::{closed_flag, Status};

/// One transaction inside a transaction file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default, rename = "closed", with = "closed_flag")]
    pub status: Status,
    /// Account ids taking part in this transaction.
    #[serde(default, rename = "docs")]
    pub participants: IdSet,
}

impl Transaction {
    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    pub fn is_closed(&self) -> bool {
        self.status.is_closed()
    }
}

/// A transaction-file document.
///
/// Written as `{closed, txs: {tx: {closed, docs}}}`. Reading also accepts the
/// flat layout with each transaction as a top-level key beside `closed`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "TransactionFileDoc")]
pub struct TransactionFile {
    #[serde(rename = "closed", with = "closed_flag")]
    pub status: Status,
    #[serde(rename = "txs")]
    pub transactions: BTreeMap<TxId, Transaction>,
}

#[derive(Deserialize)]
struct TransactionFileDoc {
    #[serde(default, deserialize_with = "closed_flag::deserialize")]
    closed: Status,
    #[serde(default)]
    txs: BTreeMap<TxId, Transaction>,
    #[serde(flatten)]
    flat: BTreeMap<TxId, Transaction>,
}

impl From<TransactionFileDoc> for TransactionFile {
    fn from(doc: TransactionFileDoc) -> Self {
        let mut transactions = doc.flat;
        transactions.extend(doc.txs);
        Self {
            status: doc.closed,
            transactions,
        }
    }
}

impl TransactionFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    pub fn is_closed(&self) -> bool {
        self.status.is_closed()
    }

    pub fn transaction(&self, tx: &TxId) -> Option<&Transaction> {
        self.transactions.get(tx)
    }

    /// A transaction that does not exist yet counts as open: it can still be
    /// created.
    pub fn is_transaction_open(&self, tx: &TxId) -> bool {
        self.transaction(tx).map_or(true, Transaction::is_open)
    }

    /// Only an existing, closed transaction counts as closed.
    pub fn is_transaction_closed(&self, tx: &TxId) -> bool {
        self.transaction(tx).is_some_and(Transaction::is_closed)
    }

    /// Participants of `tx`, empty if it does not exist.
    pub fn participants(&self, tx: &TxId) -> IdSet {
        self.transaction(tx)
            .map(|t| t.participants.clone())
            .unwrap_or_default()
    }

    /// Ids of all transactions in the file, ascending.
    pub fn transaction_ids(&self) -> Vec<TxId> {
        self.transactions.keys().cloned().collect()
    }

    /// Transactions that have not been closed yet.
    pub fn open_transaction_ids(&self) -> Vec<TxId> {
        self.transactions
            .iter()
            .filter(|(_, t)| t.is_open())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Add one participant to `tx`, creating the transaction if needed.
    ///
    /// Fails if the file is closed or `tx` exists and is closed. `file` is
    /// the id this document is stored under; it is only used for the error.
    pub fn add_participant(
        self,
        file: &FileId,
        tx: TxId,
        account: &str,
    ) -> Result<Self, Precondition> {
        self.add_participants(file, tx, [account])
    }

    /// Add several participants to `tx` in one write.
    pub fn add_participants<I, S>(
        mut self,
        file: &FileId,
        tx: TxId,
        accounts: I,
    ) -> Result<Self, Precondition>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.is_closed() {
            return Err(Precondition::FileClosed { file: file.clone() });
        }
        if !self.is_transaction_open(&tx) {
            return Err(Precondition::TransactionClosed {
                file: file.clone(),
                tx,
            });
        }

        let transaction = self.transactions.entry(tx).or_default();
        for account in accounts {
            transaction.participants.insert(account);
        }
        Ok(self)
    }

    /// Mark `tx` closed, creating it empty if it never had participants.
    pub fn close_transaction(mut self, tx: TxId) -> Self {
        self.transactions.entry(tx).or_default().status = Status::Closed;
        self
    }

    /// Mark the whole file closed. Open transactions inside stay as they are.
    pub fn close(mut self) -> Self {
        self.status = Status::Closed;
        self
    }
}
