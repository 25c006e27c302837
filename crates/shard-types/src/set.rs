use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Canonical set of string ids.
///
/// Used for an epoch's registered transaction files and a transaction's
/// participants. Insertion is idempotent. On the wire it is always written as
/// a JSON array; reading also accepts a lone string so older documents that
/// stored a single id still load as a one-element set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "IdSetRepr", into = "Vec<String>")]
pub struct IdSet(BTreeSet<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum IdSetRepr {
    One(String),
    Many(Vec<String>),
}

impl From<IdSetRepr> for IdSet {
    fn from(repr: IdSetRepr) -> Self {
        match repr {
            IdSetRepr::One(id) => Self(BTreeSet::from([id])),
            IdSetRepr::Many(ids) => ids.into_iter().collect(),
        }
    }
}

impl From<IdSet> for Vec<String> {
    fn from(set: IdSet) -> Self {
        set.0.into_iter().collect()
    }
}

impl IdSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an id. Returns `false` if it was already present.
    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        self.0.insert(id.into())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.contains(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for IdSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl<'a> IntoIterator for &'a IdSet {
    type Item = &'a String;
    type IntoIter = std::collections::btree_set::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
