//! Chain gateway seam
//!
//! Everything the pipeline needs from the network goes through [`ChainGateway`].
//! The production adapter is [`rpc::JsonRpcGateway`]; tests use an in-memory
//! gateway.

pub mod abi;
pub mod rpc;

#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Lower-cased `0x`-prefixed hex address
pub type Address = String;

/// 18-decimal fixed-point integer amount
pub type Wei = u128;

/// Decoded `PriceFinalized` event for one symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceFinalized {
    pub epoch_id: u64,
    pub median_price: u128,
    pub low_reward_price: u128,
    pub high_reward_price: u128,
    pub rewarded: bool,
    pub finalization_type: u8,
    pub timestamp: u64,
}

/// Result of `getDataProviderPerformanceInfo(epoch, provider)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PerformanceInfo {
    pub reward_amount: Wei,
    pub vote_power: Wei,
}

/// One entry from `getDataProviderScheduledFeePercentageChanges`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledFeeChange {
    pub fee_bips: u64,
    pub valid_from_epoch: u64,
}

#[derive(Debug)]
pub enum ChainError {
    /// HTTP or connection failure
    Transport(String),
    /// Node returned a JSON-RPC error object
    Rpc { code: i64, message: String },
    /// Response bytes did not match the expected ABI shape
    Decode(String),
    /// Contract or feature not present on this network
    Unavailable(String),
}

impl std::fmt::Display for ChainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainError::Transport(msg) => write!(f, "Transport error: {}", msg),
            ChainError::Rpc { code, message } => write!(f, "RPC error {}: {}", code, message),
            ChainError::Decode(msg) => write!(f, "Decode error: {}", msg),
            ChainError::Unavailable(msg) => write!(f, "Unavailable: {}", msg),
        }
    }
}

impl std::error::Error for ChainError {}

impl From<reqwest::Error> for ChainError {
    fn from(err: reqwest::Error) -> Self {
        ChainError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::Decode(err.to_string())
    }
}

/// Validate a hex address and return it lower-cased with a `0x` prefix
pub fn normalize_address(raw: &str) -> Option<Address> {
    let trimmed = raw.trim();
    let hex_part = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    Some(format!("0x{}", hex_part.to_lowercase()))
}

/// Read and write access to the FTSO contracts of one network
///
/// All addresses passed in and returned are normalized (see
/// [`normalize_address`]). Amounts are raw wei.
#[async_trait]
pub trait ChainGateway: Send + Sync {
    async fn current_epoch_id(&self) -> Result<u64, ChainError>;

    /// Unix timestamp at which the current reward epoch ends
    async fn current_epoch_end(&self) -> Result<i64, ChainError>;

    async fn epoch_duration(&self) -> Result<u64, ChainError>;

    async fn total_vote_power(&self) -> Result<Wei, ChainError>;

    async fn vote_power_of(&self, address: &str) -> Result<Wei, ChainError>;

    /// Block at which vote power is locked for `epoch_id`
    async fn epoch_vote_power_block(&self, epoch_id: u64) -> Result<u64, ChainError>;

    async fn vote_power_of_at(&self, address: &str, block: u64) -> Result<Wei, ChainError>;

    /// Addresses authorized to submit prices for `symbol`
    async fn whitelisted_providers(&self, symbol: &str) -> Result<Vec<Address>, ChainError>;

    async fn balance_of(&self, address: &str) -> Result<Wei, ChainError>;

    /// Current fee in basis points
    async fn current_fee(&self, address: &str) -> Result<u64, ChainError>;

    async fn scheduled_fee_changes(&self, address: &str) -> Result<Vec<ScheduledFeeChange>, ChainError>;

    /// First reward amount reported by `getStateOfRewards(address, epoch)`, 0 when none
    async fn unclaimed_reward(&self, address: &str, epoch_id: u64) -> Result<Wei, ChainError>;

    async fn provider_performance(&self, epoch_id: u64, address: &str) -> Result<PerformanceInfo, ChainError>;

    /// Price submitted by `address` for `symbol` in a price epoch (0 = none)
    async fn submitted_price(&self, symbol: &str, epoch_id: u64, address: &str) -> Result<u128, ChainError>;

    /// Executors authorized to claim on behalf of `owner`
    async fn claim_executors(&self, owner: &str) -> Result<Vec<Address>, ChainError>;

    /// Submit one batched `autoClaim(owners, epoch_id)`; returns the transaction hash
    async fn submit_auto_claim(&self, owners: &[Address], epoch_id: u64) -> Result<String, ChainError>;

    /// Stream of finalization events for one symbol
    ///
    /// The stream ends (sender dropped) when the underlying subscription
    /// fails; callers re-subscribe.
    async fn price_finalized_stream(&self, symbol: &str) -> Result<mpsc::Receiver<PriceFinalized>, ChainError>;
}
