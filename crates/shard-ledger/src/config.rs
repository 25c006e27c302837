use serde::{Deserialize, Serialize};
use shard_store::path::merge_deep;

use crate::error::LedgerError;

/// Strictness knobs for the protocol orchestrator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Consolidating an account requires the transaction to be closed in one
    /// of the epoch's registered files.
    pub require_closed_transaction: bool,
    /// Closing a transaction requires its file to still be open.
    pub require_open_file_to_close_tx: bool,
    /// Opening a connection requires the routed epoch to still be open.
    pub require_open_epoch_to_connect: bool,
    /// Settled balances are cumulative across epochs. When off, each epoch
    /// holds only its own consolidations and available balance sums them.
    pub carry_forward_settled: bool,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            require_closed_transaction: true,
            require_open_file_to_close_tx: false,
            require_open_epoch_to_connect: true,
            carry_forward_settled: true,
        }
    }
}

impl ProtocolConfig {
    /// Only the checks every deployment needs: epoch close and consolidate
    /// ordering, and no writes to closed files or transactions. Settled
    /// balances are kept per epoch.
    pub fn permissive() -> Self {
        Self {
            require_closed_transaction: false,
            require_open_file_to_close_tx: false,
            require_open_epoch_to_connect: false,
            carry_forward_settled: false,
        }
    }

    /// Every optional check enabled.
    pub fn strict() -> Self {
        Self {
            require_closed_transaction: true,
            require_open_file_to_close_tx: true,
            require_open_epoch_to_connect: true,
            carry_forward_settled: true,
        }
    }

    /// Overlay a TOML document onto `self`. Keys absent from `source` keep
    /// the value they have here.
    pub fn layered(&self, source: &str) -> Result<Self, LedgerError> {
        let overlay: toml::Table = source
            .parse()
            .map_err(|e: toml::de::Error| LedgerError::Config(e.to_string()))?;
        let overlay =
            serde_json::to_value(overlay).map_err(|e| LedgerError::Config(e.to_string()))?;
        let base =
            serde_json::to_value(self).map_err(|e| LedgerError::Config(e.to_string()))?;

        serde_json::from_value(merge_deep(&base, &overlay))
            .map_err(|e| LedgerError::Config(e.to_string()))
    }
}
