use std::fmt;

/// Open/closed status shared by transaction files and transactions.
///
/// Stored as the boolean `closed` field; an absent field reads as open.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Status {
    #[default]
    Open,
    Closed,
}

impl Status {
    pub fn is_open(self) -> bool {
        self == Self::Open
    }

    pub fn is_closed(self) -> bool {
        self == Self::Closed
    }
}

impl From<bool> for Status {
    fn from(closed: bool) -> Self {
        if closed {
            Self::Closed
        } else {
            Self::Open
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// `#[serde(with = "closed_flag")]` for a [`Status`] field named `closed`.
pub(crate) mod closed_flag {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::Status;

    pub fn serialize<S: Serializer>(status: &Status, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bool(status.is_closed())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Status, D::Error> {
        Option::<bool>::deserialize(deserializer).map(|flag| Status::from(flag.unwrap_or(false)))
    }
}
