//! The protocol orchestrator.
//!
//! This is the only place that touches more than one document per call. Each
//! public operation takes a store snapshot and returns either a new snapshot
//! with the whole operation applied, or an error and no snapshot. All
//! validation runs before the first write.

use shard_store::DocumentStore;
use shard_types::{AccountId, Amount, Collection, EpochId, FileId, IdSet, TxId, OPEN_EPOCH_KEY};
use tracing::{debug, info, warn};

use crate::account::Account;
use crate::config::ProtocolConfig;
use crate::epoch::Epoch;
use crate::error::{LedgerError, Precondition};
use crate::report::{EpochReport, FileSummary};
use crate::transaction_file::TransactionFile;

/// Sequences the epoch, transaction-file and account state machines over a
/// [`DocumentStore`].
#[derive(Clone, Debug, Default)]
pub struct Protocol {
    config: ProtocolConfig,
}

impl Protocol {
    pub fn new(config: ProtocolConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Register `file` with the epoch the routing pointer names and return
    /// that epoch's id. Never creates a new epoch id or moves the pointer.
    pub fn open_connection<S: DocumentStore>(
        &self,
        store: &S,
        file: &FileId,
    ) -> Result<(S, EpochId), LedgerError> {
        let epoch_id = self.open_epoch_id(store)?;
        let require_open = self.config.require_open_epoch_to_connect;

        let (store, epoch) = store
            .process_document(
                Collection::Epochs,
                &epoch_id.as_key(),
                |epoch: Epoch| -> Result<Epoch, LedgerError> {
                    if require_open && !epoch.is_open() {
                        return Err(Precondition::EpochNotOpen { epoch: epoch_id }.into());
                    }
                    Ok(epoch.register_file(file))
                },
            )
            .inspect_err(|e| warn!(epoch = %epoch_id, %file, error = %e, "connection refused"))?;

        info!(epoch = %epoch_id, %file, files = epoch.files().len(), "connection opened");
        Ok((store, epoch_id))
    }

    /// Register `account` as a participant of `tx` without advising an
    /// amount.
    pub fn add_participant<S: DocumentStore>(
        &self,
        store: &S,
        file: &FileId,
        tx: &TxId,
        account: &AccountId,
    ) -> Result<S, LedgerError> {
        self.add_participants(store, file, tx, [account])
    }

    /// Register several participants of `tx` in one write.
    pub fn add_participants<'a, S, I>(
        &self,
        store: &S,
        file: &FileId,
        tx: &TxId,
        accounts: I,
    ) -> Result<S, LedgerError>
    where
        S: DocumentStore,
        I: IntoIterator<Item = &'a AccountId>,
    {
        let store = store
            .update_document(Collection::Txfs, file.as_str(), |txf: TransactionFile| {
                let accounts = accounts.into_iter().map(AccountId::as_str);
                txf.add_participants(file, tx.clone(), accounts)
                    .map_err(LedgerError::from)
            })
            .inspect_err(|e| warn!(%file, %tx, error = %e, "participant refused"))?;

        debug!(%file, %tx, "participants added");
        Ok(store)
    }

    /// Record `amount` for `account` under `tx`.
    ///
    /// Two single-document writes, in this order: the participant goes into
    /// the transaction file first, then the pending amount onto the account.
    /// If the second write is lost the file still shows the intent, and
    /// replaying `advise` just overwrites the same pending entry.
    pub fn advise<S: DocumentStore>(
        &self,
        store: &S,
        file: &FileId,
        tx: &TxId,
        account: &AccountId,
        amount: Amount,
    ) -> Result<S, LedgerError> {
        let store = self.add_participant(store, file, tx, account)?;
        let store = store.update_document(Collection::Accts, account.as_str(), |acct: Account| {
            Ok::<_, LedgerError>(acct.advise(tx.clone(), amount))
        })?;

        debug!(%file, %tx, %account, amount, "amount advised");
        Ok(store)
    }

    /// Close one transaction in a file.
    pub fn close_tx<S: DocumentStore>(
        &self,
        store: &S,
        file: &FileId,
        tx: &TxId,
    ) -> Result<S, LedgerError> {
        let require_open_file = self.config.require_open_file_to_close_tx;

        let store = store
            .update_document(
                Collection::Txfs,
                file.as_str(),
                |txf: TransactionFile| -> Result<TransactionFile, LedgerError> {
                    if require_open_file && txf.is_closed() {
                        return Err(Precondition::FileClosed { file: file.clone() }.into());
                    }
                    Ok(txf.close_transaction(tx.clone()))
                },
            )
            .inspect_err(|e| warn!(%file, %tx, error = %e, "transaction close refused"))?;

        info!(%file, %tx, "transaction closed");
        Ok(store)
    }

    /// Close a transaction file.
    pub fn close_txf<S: DocumentStore>(&self, store: &S, file: &FileId) -> Result<S, LedgerError> {
        let store = store.update_document(Collection::Txfs, file.as_str(), |txf: TransactionFile| {
            Ok::<_, LedgerError>(txf.close())
        })?;

        info!(%file, "transaction file closed");
        Ok(store)
    }

    /// Close an epoch. Every registered file must already be closed.
    pub fn close_epoch<S: DocumentStore>(
        &self,
        store: &S,
        epoch_id: EpochId,
    ) -> Result<S, LedgerError> {
        let store = store
            .update_document(Collection::Epochs, &epoch_id.as_key(), |epoch: Epoch| {
                epoch.close(|file| {
                    Ok(store
                        .get_typed::<TransactionFile>(Collection::Txfs, file.as_str())?
                        .map(|txf| txf.status))
                })
            })
            .inspect_err(|e| warn!(epoch = %epoch_id, error = %e, "epoch close refused"))?;

        info!(epoch = %epoch_id, "epoch closed");
        Ok(store)
    }

    /// Move `tx`'s pending amount on `account` into its settled balance for
    /// `epoch_id`. The epoch must be closed. With
    /// [`require_closed_transaction`](ProtocolConfig::require_closed_transaction)
    /// the transaction must also be closed in one of the epoch's files.
    pub fn consolidate_account_tx<S: DocumentStore>(
        &self,
        store: &S,
        epoch_id: EpochId,
        account: &AccountId,
        tx: &TxId,
    ) -> Result<S, LedgerError> {
        self.check_consolidation(store, epoch_id, tx)
            .inspect_err(|e| {
                warn!(epoch = %epoch_id, %account, %tx, error = %e, "consolidation refused")
            })?;

        let carry = self.config.carry_forward_settled;
        let store = store.update_document(Collection::Accts, account.as_str(), |acct: Account| {
            Ok::<_, LedgerError>(if carry {
                acct.consolidate_carrying(epoch_id, tx)
            } else {
                acct.consolidate(epoch_id, tx)
            })
        })?;

        debug!(epoch = %epoch_id, %account, %tx, "account consolidated");
        Ok(store)
    }

    /// Declare an epoch's consolidation complete. The epoch must be closed.
    pub fn consolidate_epoch<S: DocumentStore>(
        &self,
        store: &S,
        epoch_id: EpochId,
    ) -> Result<S, LedgerError> {
        let store = store
            .update_document(Collection::Epochs, &epoch_id.as_key(), |epoch: Epoch| {
                epoch.consolidate(epoch_id).map_err(LedgerError::from)
            })
            .inspect_err(|e| warn!(epoch = %epoch_id, error = %e, "epoch consolidation refused"))?;

        info!(epoch = %epoch_id, "epoch consolidated");
        Ok(store)
    }

    fn check_consolidation<S: DocumentStore>(
        &self,
        store: &S,
        epoch_id: EpochId,
        tx: &TxId,
    ) -> Result<(), LedgerError> {
        let epoch = self.epoch(store, epoch_id)?.unwrap_or_default();
        if !epoch.is_closed() {
            return Err(Precondition::EpochNotClosed { epoch: epoch_id }.into());
        }
        if !self.config.require_closed_transaction {
            return Ok(());
        }

        let mut found = false;
        for file in epoch.files() {
            let Some(txf) = self.transaction_file(store, &FileId::from(file.as_str()))? else {
                continue;
            };
            if txf.transaction(tx).is_none() {
                continue;
            }
            if !txf.is_transaction_closed(tx) {
                return Err(Precondition::TransactionNotClosed { tx: tx.clone() }.into());
            }
            found = true;
        }

        if found {
            Ok(())
        } else {
            Err(Precondition::TransactionNotFound {
                epoch: epoch_id,
                tx: tx.clone(),
            }
            .into())
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// The epoch currently accepting transaction files, `0` if never set.
    pub fn open_epoch_id<S: DocumentStore>(&self, store: &S) -> Result<EpochId, LedgerError> {
        Ok(store
            .get_typed::<EpochId>(Collection::Meta, OPEN_EPOCH_KEY)?
            .unwrap_or(EpochId::GENESIS))
    }

    pub fn epoch<S: DocumentStore>(
        &self,
        store: &S,
        epoch_id: EpochId,
    ) -> Result<Option<Epoch>, LedgerError> {
        Ok(store.get_typed(Collection::Epochs, &epoch_id.as_key())?)
    }

    pub fn transaction_file<S: DocumentStore>(
        &self,
        store: &S,
        file: &FileId,
    ) -> Result<Option<TransactionFile>, LedgerError> {
        Ok(store.get_typed(Collection::Txfs, file.as_str())?)
    }

    pub fn account<S: DocumentStore>(
        &self,
        store: &S,
        account: &AccountId,
    ) -> Result<Option<Account>, LedgerError> {
        Ok(store.get_typed(Collection::Accts, account.as_str())?)
    }

    /// Settled balance of `account` for exactly `epoch_id`.
    pub fn balance_at<S: DocumentStore>(
        &self,
        store: &S,
        epoch_id: EpochId,
        account: &AccountId,
    ) -> Result<Option<Amount>, LedgerError> {
        Ok(self
            .account(store, account)?
            .and_then(|acct| acct.balance_at(epoch_id)))
    }

    /// Settled plus pending amounts; zero for unknown accounts. Reads the
    /// settled map the way
    /// [`carry_forward_settled`](ProtocolConfig::carry_forward_settled)
    /// writes it.
    pub fn available_balance<S: DocumentStore>(
        &self,
        store: &S,
        account: &AccountId,
    ) -> Result<Amount, LedgerError> {
        let carry = self.config.carry_forward_settled;
        Ok(self.account(store, account)?.map_or(0, |acct| {
            if carry {
                acct.available_balance()
            } else {
                acct.available_balance_from_deltas()
            }
        }))
    }

    pub fn is_epoch_closed<S: DocumentStore>(
        &self,
        store: &S,
        epoch_id: EpochId,
    ) -> Result<bool, LedgerError> {
        Ok(self.epoch(store, epoch_id)?.is_some_and(|e| e.is_closed()))
    }

    /// Returns `true` if every file registered with the epoch is closed.
    pub fn all_files_closed<S: DocumentStore>(
        &self,
        store: &S,
        epoch_id: EpochId,
    ) -> Result<bool, LedgerError> {
        Ok(self.epoch_report(store, epoch_id)?.blocking_files().is_empty())
    }

    pub fn participants<S: DocumentStore>(
        &self,
        store: &S,
        file: &FileId,
        tx: &TxId,
    ) -> Result<IdSet, LedgerError> {
        Ok(self
            .transaction_file(store, file)?
            .map(|txf| txf.participants(tx))
            .unwrap_or_default())
    }

    /// Summarise an epoch and its registered files.
    pub fn epoch_report<S: DocumentStore>(
        &self,
        store: &S,
        epoch_id: EpochId,
    ) -> Result<EpochReport, LedgerError> {
        let epoch = self.epoch(store, epoch_id)?.unwrap_or_default();

        let mut files = Vec::with_capacity(epoch.files().len());
        for id in epoch.files() {
            let file = FileId::from(id.as_str());
            let summary = match self.transaction_file(store, &file)? {
                Some(txf) => FileSummary {
                    status: Some(txf.status),
                    transaction_count: txf.transactions.len(),
                    open_transactions: txf.open_transaction_ids(),
                    file,
                },
                None => FileSummary {
                    file,
                    status: None,
                    transaction_count: 0,
                    open_transactions: Vec::new(),
                },
            };
            files.push(summary);
        }

        Ok(EpochReport {
            epoch: epoch_id,
            state: epoch.state,
            files,
        })
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;
    use shard_store::InMemorySnapshot;

    use super::*;
    use crate::epoch::EpochState;
    use crate::status::Status;

    fn fid(id: &str) -> FileId {
        FileId::from(id)
    }

    fn tid(id: &str) -> TxId {
        TxId::from(id)
    }

    fn aid(id: &str) -> AccountId {
        AccountId::from(id)
    }

    fn precondition(result: Result<InMemorySnapshot, LedgerError>) -> Precondition {
        match result {
            Err(LedgerError::PreconditionFailed(p)) => p,
            other => panic!("expected precondition failure, got {other:?}"),
        }
    }

    /// Connect `file`, move `amount` from `from` to `to` under `tx`, and close
    /// the transaction.
    fn transfer(
        protocol: &Protocol,
        store: &InMemorySnapshot,
        file: &str,
        tx: &str,
        from: &str,
        to: &str,
        amount: Amount,
    ) -> InMemorySnapshot {
        let (f, t) = (fid(file), tid(tx));
        let store = protocol
            .add_participants(store, &f, &t, [&aid(from), &aid(to)])
            .unwrap();
        let store = protocol.advise(&store, &f, &t, &aid(from), -amount).unwrap();
        let store = protocol.advise(&store, &f, &t, &aid(to), amount).unwrap();
        protocol.close_tx(&store, &f, &t).unwrap()
    }

    #[test]
    fn conservation_scenario() {
        let protocol = Protocol::default();
        let (alice, bob, f, t) = (aid("alice"), aid("bob"), fid("F"), tid("T"));

        let (store, epoch) = protocol
            .open_connection(&InMemorySnapshot::new(), &f)
            .unwrap();
        assert_eq!(epoch, EpochId(0));

        let store = protocol.add_participant(&store, &f, &t, &alice).unwrap();
        let store = protocol.add_participant(&store, &f, &t, &bob).unwrap();
        let store = protocol.advise(&store, &f, &t, &alice, -100).unwrap();
        let store = protocol.advise(&store, &f, &t, &bob, 100).unwrap();
        let store = protocol.close_tx(&store, &f, &t).unwrap();
        let store = protocol.close_txf(&store, &f).unwrap();
        let store = protocol.close_epoch(&store, epoch).unwrap();
        let store = protocol
            .consolidate_account_tx(&store, epoch, &alice, &t)
            .unwrap();
        let store = protocol
            .consolidate_account_tx(&store, epoch, &bob, &t)
            .unwrap();
        let store = protocol.consolidate_epoch(&store, epoch).unwrap();

        assert_eq!(protocol.available_balance(&store, &bob).unwrap(), 100);
        assert_eq!(protocol.available_balance(&store, &alice).unwrap(), -100);

        let a = protocol.balance_at(&store, epoch, &alice).unwrap().unwrap();
        let b = protocol.balance_at(&store, epoch, &bob).unwrap().unwrap();
        assert_eq!(a + b, 0);

        let final_epoch = protocol.epoch(&store, epoch).unwrap().unwrap();
        assert_eq!(final_epoch.state, EpochState::Consolidated);
    }

    #[test]
    fn multiple_files_share_the_open_epoch() {
        let protocol = Protocol::default();
        let (store, first) = protocol
            .open_connection(&InMemorySnapshot::new(), &fid("my-file-1"))
            .unwrap();
        let (store, second) = protocol.open_connection(&store, &fid("my-file-2")).unwrap();

        assert_eq!(first, EpochId(0));
        assert_eq!(second, EpochId(0));
        let epoch = protocol.epoch(&store, EpochId(0)).unwrap().unwrap();
        assert_eq!(epoch.files().len(), 2);
        assert!(epoch.files().contains("my-file-1"));
        assert!(epoch.files().contains("my-file-2"));
    }

    #[test]
    fn connection_follows_routing_pointer() {
        let protocol = Protocol::default();
        let store = InMemorySnapshot::new()
            .set(Collection::Meta, OPEN_EPOCH_KEY, json!(2))
            .set(Collection::Epochs, "1", json!({"closed": true}));

        let (store, epoch) = protocol.open_connection(&store, &fid("my-file")).unwrap();

        assert_eq!(epoch, EpochId(2));
        assert_eq!(protocol.open_epoch_id(&store).unwrap(), EpochId(2));
        assert_eq!(
            store.get(Collection::Epochs, "2"),
            Some(json!({"closed": false, "consolidated": false, "txfs": ["my-file"]}))
        );
        // The pointer itself is never written by a connection.
        assert_eq!(store.get(Collection::Meta, OPEN_EPOCH_KEY), Some(json!(2)));
    }

    #[test]
    fn closing_epoch_with_open_file_fails_without_writing() {
        let protocol = Protocol::default();
        let (store, epoch) = protocol
            .open_connection(&InMemorySnapshot::new(), &fid("open-file"))
            .unwrap();
        let store = protocol
            .add_participant(&store, &fid("open-file"), &tid("t"), &aid("a"))
            .unwrap();
        let before = store.clone();

        let err = precondition(protocol.close_epoch(&store, epoch));

        assert_eq!(err, Precondition::FileStillOpen { file: fid("open-file") });
        assert_eq!(store, before);
        assert!(!protocol.is_epoch_closed(&store, epoch).unwrap());
    }

    #[test]
    fn registered_file_without_document_blocks_close() {
        let protocol = Protocol::default();
        let (store, epoch) = protocol
            .open_connection(&InMemorySnapshot::new(), &fid("never-written"))
            .unwrap();

        let err = precondition(protocol.close_epoch(&store, epoch));
        assert_eq!(err, Precondition::FileStillOpen { file: fid("never-written") });
        assert!(!protocol.all_files_closed(&store, epoch).unwrap());

        let store = protocol.close_txf(&store, &fid("never-written")).unwrap();
        assert!(protocol.all_files_closed(&store, epoch).unwrap());
        assert!(protocol.close_epoch(&store, epoch).is_ok());
    }

    #[test]
    fn empty_epoch_closes_trivially() {
        let protocol = Protocol::default();
        let store = protocol
            .close_epoch(&InMemorySnapshot::new(), EpochId(7))
            .unwrap();
        assert!(protocol.is_epoch_closed(&store, EpochId(7)).unwrap());
    }

    #[test]
    fn consolidation_requires_closed_epoch() {
        let protocol = Protocol::default();
        let store = InMemorySnapshot::new()
            .set(Collection::Epochs, "0", json!({}))
            .set(Collection::Accts, "payer", json!({}));

        let err = precondition(protocol.consolidate_account_tx(
            &store,
            EpochId(0),
            &aid("payer"),
            &tid("tx-1"),
        ));
        assert_eq!(err, Precondition::EpochNotClosed { epoch: EpochId(0) });

        let err = precondition(protocol.consolidate_epoch(&store, EpochId(0)));
        assert_eq!(err, Precondition::EpochNotClosed { epoch: EpochId(0) });
    }

    #[test]
    fn consolidation_is_idempotent_and_disjoint() {
        let protocol = Protocol::default();
        let (store, epoch) = protocol
            .open_connection(&InMemorySnapshot::new(), &fid("f"))
            .unwrap();
        let store = transfer(&protocol, &store, "f", "t", "a", "b", 25);
        let store = protocol.close_txf(&store, &fid("f")).unwrap();
        let store = protocol.close_epoch(&store, epoch).unwrap();

        let once = protocol
            .consolidate_account_tx(&store, epoch, &aid("b"), &tid("t"))
            .unwrap();
        let twice = protocol
            .consolidate_account_tx(&once, epoch, &aid("b"), &tid("t"))
            .unwrap();

        assert_eq!(once, twice);
        let account = protocol.account(&twice, &aid("b")).unwrap().unwrap();
        assert!(account.pending_amount(&tid("t")).is_none());
        assert_eq!(account.balance_at(epoch), Some(25));
    }

    #[test]
    fn consolidating_open_transaction_is_refused_by_default() {
        let protocol = Protocol::default();
        let (store, epoch) = protocol
            .open_connection(&InMemorySnapshot::new(), &fid("f"))
            .unwrap();
        let store = protocol
            .advise(&store, &fid("f"), &tid("t"), &aid("a"), 10)
            .unwrap();
        let store = protocol.close_txf(&store, &fid("f")).unwrap();
        let store = protocol.close_epoch(&store, epoch).unwrap();

        let err = precondition(protocol.consolidate_account_tx(
            &store,
            epoch,
            &aid("a"),
            &tid("t"),
        ));
        assert_eq!(err, Precondition::TransactionNotClosed { tx: tid("t") });

        let permissive = Protocol::new(ProtocolConfig::permissive());
        let store = permissive
            .consolidate_account_tx(&store, epoch, &aid("a"), &tid("t"))
            .unwrap();
        assert_eq!(permissive.balance_at(&store, epoch, &aid("a")).unwrap(), Some(10));
    }

    #[test]
    fn consolidating_unknown_transaction_is_refused_by_default() {
        let protocol = Protocol::default();
        let store = protocol
            .close_epoch(&InMemorySnapshot::new(), EpochId(0))
            .unwrap();

        let err = precondition(protocol.consolidate_account_tx(
            &store,
            EpochId(0),
            &aid("a"),
            &tid("ghost"),
        ));
        assert_eq!(
            err,
            Precondition::TransactionNotFound {
                epoch: EpochId(0),
                tx: tid("ghost")
            }
        );
    }

    #[test]
    fn consolidation_still_allowed_after_epoch_consolidated() {
        let protocol = Protocol::default();
        let (store, epoch) = protocol
            .open_connection(&InMemorySnapshot::new(), &fid("f"))
            .unwrap();
        let store = transfer(&protocol, &store, "f", "t", "a", "b", 5);
        let store = protocol.close_txf(&store, &fid("f")).unwrap();
        let store = protocol.close_epoch(&store, epoch).unwrap();
        let store = protocol.consolidate_epoch(&store, epoch).unwrap();

        let store = protocol
            .consolidate_account_tx(&store, epoch, &aid("a"), &tid("t"))
            .unwrap();
        assert_eq!(protocol.balance_at(&store, epoch, &aid("a")).unwrap(), Some(-5));
    }

    #[test]
    fn participants_cannot_join_closed_transaction_or_file() {
        let protocol = Protocol::default();
        let (store, _) = protocol
            .open_connection(&InMemorySnapshot::new(), &fid("f"))
            .unwrap();
        let store = protocol.close_tx(&store, &fid("f"), &tid("t")).unwrap();

        let err = precondition(protocol.advise(&store, &fid("f"), &tid("t"), &aid("a"), 1));
        assert_eq!(
            err,
            Precondition::TransactionClosed {
                file: fid("f"),
                tx: tid("t")
            }
        );
        assert!(protocol.account(&store, &aid("a")).unwrap().is_none());

        let store = protocol.close_txf(&store, &fid("f")).unwrap();
        let err = precondition(protocol.add_participant(&store, &fid("f"), &tid("u"), &aid("a")));
        assert_eq!(err, Precondition::FileClosed { file: fid("f") });
    }

    #[test]
    fn close_tx_on_closed_file_depends_on_config() {
        let store = Protocol::default()
            .close_txf(&InMemorySnapshot::new(), &fid("f"))
            .unwrap();

        let lenient = Protocol::default().close_tx(&store, &fid("f"), &tid("t")).unwrap();
        let txf = Protocol::default()
            .transaction_file(&lenient, &fid("f"))
            .unwrap()
            .unwrap();
        assert!(txf.is_transaction_closed(&tid("t")));

        let strict = Protocol::new(ProtocolConfig::strict());
        let err = precondition(strict.close_tx(&store, &fid("f"), &tid("t")));
        assert_eq!(err, Precondition::FileClosed { file: fid("f") });
    }

    #[test]
    fn connecting_to_closed_epoch_depends_on_config() {
        let store = Protocol::default()
            .close_epoch(&InMemorySnapshot::new(), EpochId(0))
            .unwrap();

        let err = match Protocol::default().open_connection(&store, &fid("late")) {
            Err(LedgerError::PreconditionFailed(p)) => p,
            other => panic!("expected precondition failure, got {other:?}"),
        };
        assert_eq!(err, Precondition::EpochNotOpen { epoch: EpochId(0) });

        let (store, epoch) = Protocol::new(ProtocolConfig::permissive())
            .open_connection(&store, &fid("late"))
            .unwrap();
        assert_eq!(epoch, EpochId(0));
        let epoch = Protocol::default().epoch(&store, epoch).unwrap().unwrap();
        assert!(epoch.files().contains("late"));
        assert_eq!(epoch.state, EpochState::Closed);
    }

    #[test]
    fn advise_is_replayable() {
        let protocol = Protocol::default();
        let store = InMemorySnapshot::new();
        let once = protocol
            .advise(&store, &fid("f"), &tid("t"), &aid("a"), 30)
            .unwrap();
        let twice = protocol
            .advise(&once, &fid("f"), &tid("t"), &aid("a"), 30)
            .unwrap();
        assert_eq!(once, twice);
        assert_eq!(
            protocol.participants(&twice, &fid("f"), &tid("t")).unwrap(),
            IdSet::from_iter(["a"])
        );
    }

    #[test]
    fn three_accounts_two_files() {
        let protocol = Protocol::default();
        let (store, e1) = protocol
            .open_connection(&InMemorySnapshot::new(), &fid("file-1"))
            .unwrap();
        let (store, e2) = protocol.open_connection(&store, &fid("file-2")).unwrap();
        assert_eq!(e1, e2);

        let store = transfer(&protocol, &store, "file-1", "tx-1", "a", "b", 50);
        let store = transfer(&protocol, &store, "file-2", "tx-2", "b", "c", 30);

        assert_eq!(protocol.available_balance(&store, &aid("a")).unwrap(), -50);
        assert_eq!(protocol.available_balance(&store, &aid("b")).unwrap(), 20);
        assert_eq!(protocol.available_balance(&store, &aid("c")).unwrap(), 30);

        let store = protocol.close_txf(&store, &fid("file-1")).unwrap();
        let store = protocol.close_txf(&store, &fid("file-2")).unwrap();
        let mut store = protocol.close_epoch(&store, e1).unwrap();
        for (account, tx) in [("a", "tx-1"), ("b", "tx-1"), ("b", "tx-2"), ("c", "tx-2")] {
            store = protocol
                .consolidate_account_tx(&store, e1, &aid(account), &tid(tx))
                .unwrap();
        }
        let store = protocol.consolidate_epoch(&store, e1).unwrap();

        let total: Amount = ["a", "b", "c"]
            .iter()
            .map(|a| protocol.balance_at(&store, e1, &aid(a)).unwrap().unwrap())
            .sum();
        assert_eq!(protocol.balance_at(&store, e1, &aid("b")).unwrap(), Some(20));
        assert_eq!(total, 0);
    }

    /// Epoch 0 settles bank -> alice 100, epoch 1 settles alice -> bob 60.
    /// Returns the store with everything consolidated, and alice's available
    /// balance as observed right before each consolidation.
    fn two_epoch_history(protocol: &Protocol) -> (InMemorySnapshot, Vec<Amount>) {
        let alice = aid("alice");
        let mut seen = Vec::new();

        let (store, e0) = protocol
            .open_connection(&InMemorySnapshot::new(), &fid("f0"))
            .unwrap();
        let store = transfer(protocol, &store, "f0", "t0", "bank", "alice", 100);
        let store = protocol.close_txf(&store, &fid("f0")).unwrap();
        let store = protocol.close_epoch(&store, e0).unwrap();
        seen.push(protocol.available_balance(&store, &alice).unwrap());
        let store = protocol
            .consolidate_account_tx(&store, e0, &alice, &tid("t0"))
            .unwrap();

        // Advancing the pointer is an external decision.
        let store = store.set(Collection::Meta, OPEN_EPOCH_KEY, json!(1));
        let (store, e1) = protocol.open_connection(&store, &fid("f1")).unwrap();
        assert_eq!(e1, EpochId(1));

        let store = transfer(protocol, &store, "f1", "t1", "alice", "bob", 60);
        let store = protocol.close_txf(&store, &fid("f1")).unwrap();
        let store = protocol.close_epoch(&store, e1).unwrap();
        seen.push(protocol.available_balance(&store, &alice).unwrap());
        let store = protocol
            .consolidate_account_tx(&store, e1, &alice, &tid("t1"))
            .unwrap();
        seen.push(protocol.available_balance(&store, &alice).unwrap());

        (store, seen)
    }

    #[test]
    fn settled_balances_are_cumulative_by_default() {
        let protocol = Protocol::default();
        let (store, seen) = two_epoch_history(&protocol);

        assert_eq!(seen, vec![100, 40, 40]);
        assert_eq!(protocol.balance_at(&store, EpochId(0), &aid("alice")).unwrap(), Some(100));
        assert_eq!(protocol.balance_at(&store, EpochId(1), &aid("alice")).unwrap(), Some(40));
        assert_eq!(protocol.available_balance(&store, &aid("alice")).unwrap(), 40);
    }

    #[test]
    fn per_epoch_settlement_sums_epochs() {
        let protocol = Protocol::new(ProtocolConfig {
            carry_forward_settled: false,
            ..ProtocolConfig::default()
        });
        let (store, seen) = two_epoch_history(&protocol);

        assert_eq!(seen, vec![100, 40, 40]);
        assert_eq!(protocol.balance_at(&store, EpochId(0), &aid("alice")).unwrap(), Some(100));
        assert_eq!(protocol.balance_at(&store, EpochId(1), &aid("alice")).unwrap(), Some(-60));
        assert_eq!(protocol.available_balance(&store, &aid("alice")).unwrap(), 40);
    }

    #[test]
    fn late_consolidation_into_earlier_epoch_keeps_available_balance() {
        let protocol = Protocol::default();
        let (store, e0) = protocol
            .open_connection(&InMemorySnapshot::new(), &fid("f0"))
            .unwrap();
        let store = transfer(&protocol, &store, "f0", "t0", "bank", "alice", 100);
        let store = protocol.close_txf(&store, &fid("f0")).unwrap();
        let store = protocol.close_epoch(&store, e0).unwrap();

        let store = store.set(Collection::Meta, OPEN_EPOCH_KEY, json!(1));
        let (store, e1) = protocol.open_connection(&store, &fid("f1")).unwrap();
        let store = transfer(&protocol, &store, "f1", "t1", "bank", "alice", 20);
        let store = protocol.close_txf(&store, &fid("f1")).unwrap();
        let store = protocol.close_epoch(&store, e1).unwrap();

        // Epoch 1 is consolidated before the older transaction from epoch 0.
        let store = protocol
            .consolidate_account_tx(&store, e1, &aid("alice"), &tid("t1"))
            .unwrap();
        let store = protocol
            .consolidate_account_tx(&store, e0, &aid("alice"), &tid("t0"))
            .unwrap();

        assert_eq!(protocol.balance_at(&store, e0, &aid("alice")).unwrap(), Some(100));
        assert_eq!(protocol.balance_at(&store, e1, &aid("alice")).unwrap(), Some(120));
        assert_eq!(protocol.available_balance(&store, &aid("alice")).unwrap(), 120);
    }

    #[test]
    fn reclosing_epoch_checks_late_registered_files() {
        let protocol = Protocol::new(ProtocolConfig::permissive());
        let store = protocol
            .close_epoch(&InMemorySnapshot::new(), EpochId(0))
            .unwrap();
        let (store, epoch) = protocol.open_connection(&store, &fid("late")).unwrap();
        let before = store.clone();

        let err = precondition(protocol.close_epoch(&store, epoch));
        assert_eq!(err, Precondition::FileStillOpen { file: fid("late") });
        assert_eq!(store, before);

        let store = protocol.close_txf(&store, &fid("late")).unwrap();
        let store = protocol.close_epoch(&store, epoch).unwrap();
        assert!(protocol.all_files_closed(&store, epoch).unwrap());
        assert!(protocol.is_epoch_closed(&store, epoch).unwrap());
    }

    #[test]
    fn epoch_report_lists_blockers() {
        let protocol = Protocol::default();
        let (store, epoch) = protocol
            .open_connection(&InMemorySnapshot::new(), &fid("a"))
            .unwrap();
        let (store, _) = protocol.open_connection(&store, &fid("b")).unwrap();
        let store = protocol
            .add_participant(&store, &fid("a"), &tid("t1"), &aid("x"))
            .unwrap();
        let store = protocol
            .add_participant(&store, &fid("a"), &tid("t2"), &aid("y"))
            .unwrap();
        let store = protocol.close_tx(&store, &fid("a"), &tid("t2")).unwrap();

        let report = protocol.epoch_report(&store, epoch).unwrap();
        assert_eq!(report.state, EpochState::Open);
        assert_eq!(report.files.len(), 2);
        assert_eq!(report.blocking_files(), vec![&fid("a"), &fid("b")]);
        assert_eq!(report.open_transaction_count(), 1);
        assert_eq!(report.files[0].status, Some(Status::Open));
        assert_eq!(report.files[0].transaction_count, 2);
        assert_eq!(report.files[1].status, None);
        assert!(!report.ready_to_close());

        let store = protocol.close_txf(&store, &fid("a")).unwrap();
        let store = protocol.close_txf(&store, &fid("b")).unwrap();
        assert!(protocol.epoch_report(&store, epoch).unwrap().ready_to_close());
    }

    #[test]
    fn corrupt_documents_surface_as_store_errors() {
        let protocol = Protocol::default();
        let store = InMemorySnapshot::new().set(Collection::Accts, "a", json!({"pending": 3}));
        let err = protocol.available_balance(&store, &aid("a")).unwrap_err();
        assert!(matches!(err, LedgerError::Store(_)));
    }

    #[derive(Clone, Debug)]
    enum Step {
        Connect(u8),
        Participate(u8),
        CloseFile(u8),
        CloseEpoch,
        ConsolidateEpoch,
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            (0u8..3).prop_map(Step::Connect),
            (0u8..3).prop_map(Step::Participate),
            (0u8..3).prop_map(Step::CloseFile),
            Just(Step::CloseEpoch),
            Just(Step::ConsolidateEpoch),
        ]
    }

    proptest! {
        #[test]
        fn epoch_state_never_moves_backward(steps in proptest::collection::vec(step(), 0..24)) {
            let protocol = Protocol::default();
            let epoch = EpochId(0);
            let mut store = InMemorySnapshot::new();
            let mut last = EpochState::Open;

            for step in steps {
                let before = store.clone();
                let result = match &step {
                    Step::Connect(n) => protocol
                        .open_connection(&store, &fid(&format!("f{n}")))
                        .map(|(s, _)| s),
                    Step::Participate(n) => protocol.add_participant(
                        &store,
                        &fid(&format!("f{n}")),
                        &tid("t"),
                        &aid("a"),
                    ),
                    Step::CloseFile(n) => protocol.close_txf(&store, &fid(&format!("f{n}"))),
                    Step::CloseEpoch => protocol.close_epoch(&store, epoch),
                    Step::ConsolidateEpoch => protocol.consolidate_epoch(&store, epoch),
                };

                match result {
                    Ok(next) => store = next,
                    Err(LedgerError::PreconditionFailed(_)) => prop_assert_eq!(&store, &before),
                    Err(other) => prop_assert!(false, "unexpected error {other}"),
                }

                let state = protocol
                    .epoch(&store, epoch)
                    .unwrap()
                    .map_or(EpochState::Open, |e| e.state);
                prop_assert!(state >= last, "{last} -> {state} after {step:?}");
                if state >= EpochState::Closed {
                    prop_assert!(protocol.all_files_closed(&store, epoch).unwrap());
                }
                last = state;
            }
        }
    }
}
