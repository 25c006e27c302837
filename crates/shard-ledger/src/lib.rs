//! Epoch-based consolidation protocol for a double-entry ledger.
//!
//! The ledger runs on a store that only offers atomic writes of a single
//! document. Money movements are first advised as pending deltas on
//! independent account documents and later consolidated, one document at a
//! time, into per-epoch settled balances once the epoch holding them is
//! frozen.
//!
//! This crate provides:
//! - [`Account`] -- pending and settled balances of one account
//! - [`TransactionFile`] / [`Transaction`] -- transaction membership and
//!   open/closed status
//! - [`Epoch`] -- the registry of transaction files and the
//!   `Open -> Closed -> Consolidated` lifecycle
//! - [`Protocol`] -- the orchestrator composing them into connect, advise,
//!   close and consolidate operations over any [`DocumentStore`]
//! - [`ProtocolConfig`] -- optional strictness checks
//! - [`EpochReport`] -- read-only view of what blocks an epoch
//!
//! Every state machine operation consumes a document and returns the next
//! one; nothing is mutated in place.
//!
//! [`DocumentStore`]: shard_store::DocumentStore

pub mod account;
pub mod config;
pub mod epoch;
pub mod error;
pub mod protocol;
pub mod report;
pub mod status;
pub mod transaction_file;

pub use account::Account;
pub use config::ProtocolConfig;
pub use epoch::{Epoch, EpochState};
pub use error::{LedgerError, Precondition};
pub use protocol::Protocol;
pub use report::{EpochReport, FileSummary};
pub use status::Status;
pub use transaction_file::{Transaction, TransactionFile};
