//! Document store abstraction for the shardable ledger.
//!
//! The protocol runs on stores that only guarantee atomic read-modify-write of
//! a single document. This crate models such a store as an immutable snapshot:
//! `collection -> id -> JSON document`. Every write returns a new snapshot and
//! leaves the old one untouched, which is what lets the ledger validate a
//! whole operation before any of its writes become visible.
//!
//! # Contents
//!
//! - [`DocumentStore`] -- get/set by collection and id, plus typed
//!   read-apply-write helpers
//! - [`InMemorySnapshot`] -- JSON-backed snapshot store for tests, the CLI and
//!   embedding
//! - [`SnapshotFile`] -- load/save a snapshot as a JSON file
//! - [`path`] -- key-path helpers (`get_in`, `set_in`,
//!   `merge_deep`) over `serde_json::Value`
//!
//! # Design Rules
//!
//! 1. A write never mutates the snapshot it was called on.
//! 2. Documents are opaque JSON to the store; decoding happens in the typed
//!    helpers and a decode failure is reported, never defaulted.
//! 3. A missing document and a missing collection are the same thing.

pub mod error;
pub mod file;
pub mod memory;
pub mod path;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use file::SnapshotFile;
pub use memory::InMemorySnapshot;
pub use traits::DocumentStore;
