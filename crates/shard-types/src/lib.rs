//! Foundation types for the shardable ledger.
//!
//! This crate provides the identifiers and small value types shared by every
//! other crate in the workspace. Nothing here knows about the protocol's
//! state machines.
//!
//! # Key Types
//!
//! - [`EpochId`] -- non-negative epoch number, the key of the `epochs` collection
//! - [`FileId`], [`TxId`], [`AccountId`] -- string keys for transaction files,
//!   transactions and accounts
//! - [`Amount`] -- signed delta in minor units
//! - [`IdSet`] -- the one canonical set of string ids (file registries,
//!   transaction participants)
//! - [`Collection`] -- the four document collections the protocol uses

pub mod collection;
pub mod error;
pub mod id;
pub mod set;

pub use collection::{Collection, OPEN_EPOCH_KEY};
pub use error::TypeError;
pub use id::{AccountId, Amount, EpochId, FileId, TxId};
pub use set::IdSet;
