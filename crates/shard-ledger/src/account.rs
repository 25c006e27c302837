//! Per-account pending and settled balances.
//!
//! Nothing in this module knows whether an epoch is open or closed. When a
//! consolidation is allowed is decided by the [`Protocol`](crate::Protocol);
//! these functions only define what it does to the account document.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use shard_types::{Amount, EpochId, TxId};

/// An account document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Advised, not yet consolidated amounts, one per transaction.
    #[serde(default)]
    pub pending: BTreeMap<TxId, Amount>,
    /// Settled balance per epoch that received a consolidation. Cumulative
    /// when written by [`consolidate_carrying`](Self::consolidate_carrying),
    /// per-epoch sums when written by [`consolidate`](Self::consolidate).
    #[serde(default, rename = "vs")]
    pub settled: BTreeMap<EpochId, Amount>,
}

impl Account {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or overwrite) the pending amount for `tx`.
    pub fn advise(mut self, tx: TxId, amount: Amount) -> Self {
        self.pending.insert(tx, amount);
        self
    }

    /// The settled balance at the highest epoch that has one, or zero.
    pub fn latest_settled(&self) -> Amount {
        self.settled
            .last_key_value()
            .map_or(0, |(_, balance)| *balance)
    }

    /// Sum of the settled values of every epoch.
    pub fn settled_total(&self) -> Amount {
        self.settled
            .values()
            .fold(0, |sum, balance| sum.saturating_add(*balance))
    }

    /// Sum of all pending amounts.
    pub fn pending_total(&self) -> Amount {
        self.pending
            .values()
            .fold(0, |sum, amount| sum.saturating_add(*amount))
    }

    /// Latest settled balance plus everything still pending. Reads cumulative
    /// balances.
    pub fn available_balance(&self) -> Amount {
        self.latest_settled().saturating_add(self.pending_total())
    }

    /// Sum of all settled values plus everything still pending. Reads
    /// per-epoch balances.
    pub fn available_balance_from_deltas(&self) -> Amount {
        self.settled_total().saturating_add(self.pending_total())
    }

    /// Settled balance for exactly `epoch`, if that epoch wrote one.
    pub fn balance_at(&self, epoch: EpochId) -> Option<Amount> {
        self.settled.get(&epoch).copied()
    }

    pub fn pending_amount(&self, tx: &TxId) -> Option<Amount> {
        self.pending.get(tx).copied()
    }

    /// Move `tx`'s pending amount into the settled balance of `epoch`, which
    /// starts from zero if the epoch has no balance yet. Each epoch then
    /// holds only its own consolidations; pair with
    /// [`available_balance_from_deltas`](Self::available_balance_from_deltas).
    ///
    /// A transaction with no pending entry leaves the account unchanged, so
    /// repeating a consolidation is harmless.
    pub fn consolidate(mut self, epoch: EpochId, tx: &TxId) -> Self {
        let Some(amount) = self.pending.remove(tx) else {
            return self;
        };
        let balance = self.settled.entry(epoch).or_insert(0);
        *balance = balance.saturating_add(amount);
        self
    }

    /// Like [`consolidate`](Self::consolidate), but keeps settled balances
    /// cumulative: an epoch without a balance starts from the latest settled
    /// balance of an earlier epoch, and the amount is also added to every
    /// later epoch that already has one. Pair with
    /// [`available_balance`](Self::available_balance).
    pub fn consolidate_carrying(mut self, epoch: EpochId, tx: &TxId) -> Self {
        let Some(amount) = self.pending.remove(tx) else {
            return self;
        };
        let opening = self.opening_balance(epoch);
        self.settled.entry(epoch).or_insert(opening);
        for (_, balance) in self.settled.range_mut(epoch..) {
            *balance = balance.saturating_add(amount);
        }
        self
    }

    /// Settled balance of the highest epoch strictly before `epoch`.
    pub fn opening_balance(&self, epoch: EpochId) -> Amount {
        self.settled
            .range(..epoch)
            .next_back()
            .map_or(0, |(_, balance)| *balance)
    }
}
