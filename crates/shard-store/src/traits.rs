use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use shard_types::Collection;

use crate::error::{StoreError, StoreResult};

/// Snapshot-based document store.
///
/// All implementations must satisfy these invariants:
/// - `set` returns a new snapshot and never mutates `self`.
/// - Each `set` touches exactly one document; there is no multi-document write.
/// - `get` on a missing collection or id returns `None`.
pub trait DocumentStore: Clone {
    /// Read a document.
    fn get(&self, collection: Collection, id: &str) -> Option<Value>;

    /// Write a document, returning the new snapshot.
    fn set(&self, collection: Collection, id: &str, value: Value) -> Self;

    /// Read and decode a document.
    ///
    /// Returns `Ok(None)` if the document does not exist and
    /// `Err(CorruptDocument)` if it exists but does not decode as `T`.
    fn get_typed<T: DeserializeOwned>(
        &self,
        collection: Collection,
        id: &str,
    ) -> StoreResult<Option<T>> {
        self.get(collection, id)
            .map(|value| {
                serde_json::from_value(value).map_err(|e| StoreError::CorruptDocument {
                    collection,
                    id: id.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    /// Encode and write a document.
    fn set_typed<T: Serialize>(
        &self,
        collection: Collection,
        id: &str,
        value: &T,
    ) -> StoreResult<Self> {
        let encoded =
            serde_json::to_value(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(self.set(collection, id, encoded))
    }

    /// Read a document (absent reads as `T::default()`), apply `f`, write the
    /// result back, and return both the new snapshot and the new document.
    ///
    /// If `f` fails nothing is written.
    fn process_document<T, E, F>(
        &self,
        collection: Collection,
        id: &str,
        f: F,
    ) -> Result<(Self, T), E>
    where
        T: DeserializeOwned + Serialize + Default,
        E: From<StoreError>,
        F: FnOnce(T) -> Result<T, E>,
    {
        let current = self.get_typed::<T>(collection, id)?.unwrap_or_default();
        let next = f(current)?;
        let store = self.set_typed(collection, id, &next)?;
        Ok((store, next))
    }

    /// Like [`process_document`](Self::process_document) but only returns the
    /// new snapshot.
    fn update_document<T, E, F>(&self, collection: Collection, id: &str, f: F) -> Result<Self, E>
    where
        T: DeserializeOwned + Serialize + Default,
        E: From<StoreError>,
        F: FnOnce(T) -> Result<T, E>,
    {
        self.process_document(collection, id, f)
            .map(|(store, _)| store)
    }
}
