use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Key of the routing-pointer document in the `meta` collection.
pub const OPEN_EPOCH_KEY: &str = "open-epoch";

/// Document collections used by the protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    /// Holds the routing pointer under [`OPEN_EPOCH_KEY`].
    Meta,
    /// Epoch documents keyed by epoch id.
    Epochs,
    /// Transaction-file documents keyed by file id.
    Txfs,
    /// Account documents keyed by account id.
    Accts,
}

impl Collection {
    pub const ALL: [Collection; 4] = [Self::Meta, Self::Epochs, Self::Txfs, Self::Accts];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Meta => "meta",
            Self::Epochs => "epochs",
            Self::Txfs => "txfs",
            Self::Accts => "accts",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| TypeError::UnknownCollection(s.to_string()))
    }
}
