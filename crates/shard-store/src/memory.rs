use std::fmt;

use serde_json::{Map, Value};
use shard_types::Collection;

use crate::error::{StoreError, StoreResult};
use crate::path::{get_in, set_in};
use crate::traits::DocumentStore;

/// In-memory, JSON-backed snapshot store.
///
/// The whole database is one JSON object of collections, each an object of
/// documents. Writes clone the root, so every snapshot handed out stays valid
/// and unchanged for as long as the caller holds it.
#[derive(Clone, PartialEq, Eq)]
pub struct InMemorySnapshot {
    root: Value,
}

impl InMemorySnapshot {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self {
            root: Value::Object(Map::new()),
        }
    }

    /// Wrap an existing JSON database. The root must be an object and every
    /// collection present must be an object too.
    pub fn from_value(root: Value) -> StoreResult<Self> {
        let Value::Object(map) = &root else {
            return Err(StoreError::MalformedSnapshot(
                "root is not a JSON object".into(),
            ));
        };
        if let Some((name, _)) = map.iter().find(|(_, v)| !v.is_object()) {
            return Err(StoreError::MalformedSnapshot(format!(
                "collection {name} is not a JSON object"
            )));
        }
        Ok(Self { root })
    }

    pub fn as_value(&self) -> &Value {
        &self.root
    }

    /// Number of documents in a collection.
    pub fn len(&self, collection: Collection) -> usize {
        get_in(&self.root, &[collection.as_str()])
            .and_then(Value::as_object)
            .map_or(0, Map::len)
    }

    /// Returns `true` if no collection holds a document.
    pub fn is_empty(&self) -> bool {
        Collection::ALL.iter().all(|c| self.len(*c) == 0)
    }
}

impl Default for InMemorySnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for InMemorySnapshot {
    fn get(&self, collection: Collection, id: &str) -> Option<Value> {
        get_in(&self.root, &[collection.as_str(), id]).cloned()
    }

    fn set(&self, collection: Collection, id: &str, value: Value) -> Self {
        Self {
            root: set_in(self.root.clone(), &[collection.as_str(), id], value),
        }
    }
}

impl fmt::Debug for InMemorySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("InMemorySnapshot");
        for collection in Collection::ALL {
            s.field(collection.as_str(), &self.len(collection));
        }
        s.finish()
    }
}
