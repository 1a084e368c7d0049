//! Core data structures for the metrics pipeline

use crate::chain::PriceFinalized;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

pub use crate::chain::{Address, Wei};

/// Price-feed instrument identifier (e.g. "XRP")
pub type Symbol = String;

/// A reward epoch as reported by the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Epoch {
    pub id: u64,
    pub start_unix_time: i64,
    pub end_unix_time: i64,
}

impl Epoch {
    pub fn from_end(id: u64, end_unix_time: i64, duration_secs: u64) -> Self {
        Self {
            id,
            start_unix_time: end_unix_time - duration_secs as i64,
            end_unix_time,
        }
    }

    /// Seconds remaining at `now`; negative once the epoch has ended
    pub fn ends_in(&self, now: i64) -> i64 {
        self.end_unix_time - now
    }
}

/// Outcome of one provider's submission for one price epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Classification {
    /// Outside the reward band, or no submission
    Miss,
    /// Exactly on the low or high reward bound
    Boundary,
    /// Strictly inside the reward band
    Hit,
}

impl Classification {
    /// Classify a submission against the reward band
    ///
    /// An unread submission is a miss. Equality with either bound is checked
    /// before the strict interval test, on the raw value, so a zero read still
    /// lands on a zero low bound.
    pub fn classify(submitted: Option<u128>, low: u128, high: u128) -> Self {
        match submitted {
            None => Classification::Miss,
            Some(p) if p == low || p == high => Classification::Boundary,
            Some(p) if low < p && p < high => Classification::Hit,
            Some(_) => Classification::Miss,
        }
    }

    pub fn value(&self) -> f64 {
        match self {
            Classification::Miss => 0.0,
            Classification::Boundary => 0.5,
            Classification::Hit => 1.0,
        }
    }

    pub fn from_value(value: f64) -> Option<Self> {
        if value == 0.0 {
            Some(Classification::Miss)
        } else if value == 0.5 {
            Some(Classification::Boundary)
        } else if value == 1.0 {
            Some(Classification::Hit)
        } else {
            None
        }
    }
}

/// One provider's classified outcome for one (symbol, epoch)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceRecord {
    pub epoch_id: u64,
    pub address: Address,
    /// `None` when the provider did not submit (or the read failed)
    pub submitted_price: Option<u128>,
    pub median_price: u128,
    pub low_bound: u128,
    pub high_bound: u128,
    pub classification: Classification,
}

impl PriceRecord {
    pub fn from_event(address: &str, submitted: Option<u128>, event: &PriceFinalized) -> Self {
        let submitted_price = submitted.filter(|p| *p != 0);
        Self {
            epoch_id: event.epoch_id,
            address: address.to_string(),
            submitted_price,
            median_price: event.median_price,
            low_bound: event.low_reward_price,
            high_bound: event.high_reward_price,
            classification: Classification::classify(
                submitted,
                event.low_reward_price,
                event.high_reward_price,
            ),
        }
    }

    pub fn has_price(&self) -> bool {
        self.submitted_price.is_some()
    }
}

/// Provider address → symbols it is whitelisted for
///
/// Rebuilt from scratch every round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Whitelist {
    entries: BTreeMap<Address, BTreeSet<Symbol>>,
}

impl Whitelist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, address: &str, symbol: &str) {
        self.entries
            .entry(address.to_lowercase())
            .or_default()
            .insert(symbol.to_string());
    }

    pub fn addresses(&self) -> impl Iterator<Item = &Address> {
        self.entries.keys()
    }

    pub fn symbols_for(&self, address: &str) -> Option<&BTreeSet<Symbol>> {
        self.entries.get(address)
    }

    pub fn providers_for(&self, symbol: &str) -> Vec<Address> {
        self.entries
            .iter()
            .filter(|(_, symbols)| symbols.contains(symbol))
            .map(|(address, _)| address.clone())
            .collect()
    }

    pub fn contains(&self, address: &str) -> bool {
        self.entries.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Period reward per unit of vote power, in percent
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RewardRate {
    Rate(f64),
    NotAvailable,
}

impl RewardRate {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RewardRate::Rate(rate) => Some(*rate),
            RewardRate::NotAvailable => None,
        }
    }
}

impl fmt::Display for RewardRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RewardRate::Rate(rate) => write!(f, "{:.4}", rate),
            RewardRate::NotAvailable => write!(f, "N/A"),
        }
    }
}

impl Serialize for RewardRate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RewardRate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw == "N/A" {
            return Ok(RewardRate::NotAvailable);
        }
        raw.parse::<f64>()
            .map(RewardRate::Rate)
            .map_err(serde::de::Error::custom)
    }
}

/// A fee change that takes effect from a future reward epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledFee {
    pub fee_bips: u64,
    pub from_epoch: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSchedule {
    pub fee_bips: u64,
    pub scheduled: Option<ScheduledFee>,
}

/// Per-provider figures derived in one round
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderMetrics {
    pub address: Address,
    pub success_rate: f64,
    pub availability_rate: f64,
    pub current_epoch_reward: Wei,
    pub total_epoch_reward: Wei,
    pub current_reward_rate: RewardRate,
    pub prev_reward_rate: RewardRate,
    pub vote_power: Option<Wei>,
    pub locked_vote_power: Option<Wei>,
    pub balance: Option<Wei>,
    pub fee: Option<FeeSchedule>,
    /// Unclaimed reward captured shortly before the previous rollover
    pub prev_epoch_reward: Option<Wei>,
    /// Total reward earned over the previous epoch
    pub prev_total_epoch_reward: Option<Wei>,
}

impl ProviderMetrics {
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            success_rate: 0.0,
            availability_rate: 0.0,
            current_epoch_reward: 0,
            total_epoch_reward: 0,
            current_reward_rate: RewardRate::NotAvailable,
            prev_reward_rate: RewardRate::NotAvailable,
            vote_power: None,
            locked_vote_power: None,
            balance: None,
            fee: None,
            prev_epoch_reward: None,
            prev_total_epoch_reward: None,
        }
    }
}

/// End-of-round reward figures for one epoch, consumed by the next epoch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EpochSnapshot {
    pub epoch_id: u64,
    pub current_epoch_reward: BTreeMap<Address, Wei>,
    pub total_epoch_reward: BTreeMap<Address, Wei>,
    pub vote_power: BTreeMap<Address, Wei>,
}

/// Account opted in to automated reward claiming
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoClaimSubscriber {
    pub address: Address,
    pub executor: Address,
    pub created_at: i64,
}

/// Reward state read shortly before an epoch expires
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreRolloverCapture {
    pub epoch_id: u64,
    pub captured_at: i64,
    pub unclaimed_reward: BTreeMap<Address, Wei>,
}
