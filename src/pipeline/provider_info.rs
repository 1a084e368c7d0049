//! ProviderInfoBuilder and the served snapshot
//!
//! The served snapshot is the monitor's only public read surface. Numbers are
//! rendered as strings: wei amounts as integers, balances as whole units,
//! rates with fixed decimals.

use super::clock::ClockStatus;
use super::directory::DirectoryIndex;
use super::round::RoundState;
use super::types::{FeeSchedule, ProviderMetrics, RewardRate, Wei, Whitelist};
use crate::units::format_units;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServedScheduledFee {
    pub fee: String,
    pub from: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServedFee {
    pub fee: String,
    pub scheduled_fee: Option<ServedScheduledFee>,
}

impl From<&FeeSchedule> for ServedFee {
    fn from(schedule: &FeeSchedule) -> Self {
        Self {
            fee: schedule.fee_bips.to_string(),
            scheduled_fee: schedule.scheduled.map(|s| ServedScheduledFee {
                fee: s.fee_bips.to_string(),
                from: s.from_epoch.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInfo {
    pub name: String,
    pub desc: String,
    pub url: String,
    #[serde(rename = "logoURI")]
    pub logo_uri: String,
    pub listed: bool,
    pub address: String,
    pub whitelist: BTreeMap<String, bool>,
    pub success_rate: String,
    pub availability: String,
    pub current_vote_power: Option<String>,
    pub locked_vote_power: Option<String>,
    pub balance: Option<String>,
    pub current_epoch_reward: String,
    pub total_epoch_reward: String,
    pub current_reward_rate: RewardRate,
    pub prev_reward_rate: RewardRate,
    pub prev_epoch_reward: Option<String>,
    pub prev_total_epoch_reward: Option<String>,
    pub fee: Option<ServedFee>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServedSnapshot {
    pub epoch_id: String,
    pub ends_in: String,
    pub duration: String,
    pub total_vote_power: String,
    pub providers_info: Vec<ProviderInfo>,
}

impl ServedSnapshot {
    pub fn empty() -> Self {
        Self {
            epoch_id: "0".to_string(),
            ends_in: "0".to_string(),
            duration: "0".to_string(),
            total_vote_power: "0".to_string(),
            providers_info: Vec::new(),
        }
    }
}

/// Inputs of one build, all owned by the round
pub struct RoundView<'a> {
    pub epoch_id: u64,
    pub ends_in: i64,
    pub duration: u64,
    pub total_vote_power: Option<Wei>,
    pub whitelist: &'a Whitelist,
    pub metrics: &'a BTreeMap<String, ProviderMetrics>,
}

pub struct ProviderInfoBuilder {
    chain_id: u64,
}

impl ProviderInfoBuilder {
    pub fn new(chain_id: u64) -> Self {
        Self { chain_id }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Join whitelist, metrics and directory metadata
    ///
    /// Addresses without a directory entry for this chain get empty
    /// descriptive fields; their metrics are still served in full.
    pub fn build(&self, view: &RoundView<'_>, directory: &DirectoryIndex) -> ServedSnapshot {
        let providers_info = view
            .whitelist
            .addresses()
            .map(|address| {
                let metrics = view
                    .metrics
                    .get(address)
                    .cloned()
                    .unwrap_or_else(|| ProviderMetrics::new(address));

                let whitelist = view
                    .whitelist
                    .symbols_for(address)
                    .map(|symbols| symbols.iter().map(|s| (s.clone(), true)).collect())
                    .unwrap_or_default();

                let entry = directory.get(address).filter(|entry| entry.chain_id == self.chain_id);

                ProviderInfo {
                    name: entry.map(|e| e.name.clone()).unwrap_or_default(),
                    desc: entry.map(|e| e.description.clone()).unwrap_or_default(),
                    url: entry.map(|e| e.url.clone()).unwrap_or_default(),
                    logo_uri: entry.map(|e| e.logo_uri.clone()).unwrap_or_default(),
                    listed: entry.map(|e| e.listed).unwrap_or(false),
                    address: address.clone(),
                    whitelist,
                    success_rate: format!("{:.2}", metrics.success_rate),
                    availability: format!("{:.2}", metrics.availability_rate),
                    current_vote_power: metrics.vote_power.map(|v| v.to_string()),
                    locked_vote_power: metrics.locked_vote_power.map(|v| v.to_string()),
                    balance: metrics.balance.map(|b| format_units(b, 18)),
                    current_epoch_reward: metrics.current_epoch_reward.to_string(),
                    total_epoch_reward: metrics.total_epoch_reward.to_string(),
                    current_reward_rate: metrics.current_reward_rate,
                    prev_reward_rate: metrics.prev_reward_rate,
                    prev_epoch_reward: metrics.prev_epoch_reward.map(|r| r.to_string()),
                    prev_total_epoch_reward: metrics.prev_total_epoch_reward.map(|r| r.to_string()),
                    fee: metrics.fee.as_ref().map(ServedFee::from),
                }
            })
            .collect();

        ServedSnapshot {
            epoch_id: view.epoch_id.to_string(),
            ends_in: view.ends_in.to_string(),
            duration: view.duration.to_string(),
            total_vote_power: view.total_vote_power.unwrap_or(0).to_string(),
            providers_info,
        }
    }
}

/// Read handle on the latest completed round
#[derive(Clone)]
pub struct SnapshotHandle {
    round_rx: watch::Receiver<Option<Arc<RoundState>>>,
    clock_rx: watch::Receiver<ClockStatus>,
}

impl SnapshotHandle {
    pub fn new(round_rx: watch::Receiver<Option<Arc<RoundState>>>, clock_rx: watch::Receiver<ClockStatus>) -> Self {
        Self { round_rx, clock_rx }
    }

    /// Last completed round with the live countdown; `None` before the first round
    pub fn latest(&self) -> Option<ServedSnapshot> {
        let round = self.round_rx.borrow().clone()?;
        let mut served = round.served.clone();

        let clock = self.clock_rx.borrow();
        if clock.epoch_id.is_some() {
            served.ends_in = clock.ends_in.to_string();
        }

        Some(served)
    }

    /// Latest served snapshot, or an empty one before the first round
    pub fn latest_or_empty(&self) -> ServedSnapshot {
        self.latest().unwrap_or_else(ServedSnapshot::empty)
    }

    /// Wait for the next published round; `false` once the round loop is gone
    pub async fn changed(&mut self) -> bool {
        self.round_rx.changed().await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::directory::DirectoryEntry;
    use crate::pipeline::types::ScheduledFee;
    use crate::units::WEI_PER_UNIT;

    fn view_inputs() -> (Whitelist, BTreeMap<String, ProviderMetrics>) {
        let mut whitelist = Whitelist::new();
        whitelist.insert("0xa1", "XRP");
        whitelist.insert("0xa1", "BTC");
        whitelist.insert("0xa2", "XRP");

        let mut metrics = BTreeMap::new();
        let mut m = ProviderMetrics::new("0xa1");
        m.success_rate = 87.5;
        m.availability_rate = 99.17;
        m.vote_power = Some(5 * WEI_PER_UNIT);
        m.balance = Some(WEI_PER_UNIT + WEI_PER_UNIT / 4);
        m.current_reward_rate = RewardRate::Rate(0.1234);
        m.fee = Some(FeeSchedule {
            fee_bips: 2_000,
            scheduled: Some(ScheduledFee {
                fee_bips: 1_500,
                from_epoch: 210,
            }),
        });
        metrics.insert("0xa1".to_string(), m);
        metrics.insert("0xa2".to_string(), ProviderMetrics::new("0xa2"));

        (whitelist, metrics)
    }

    #[test]
    fn test_build_joins_directory_and_metrics() {
        let (whitelist, metrics) = view_inputs();
        let mut directory = DirectoryIndex::new();
        directory.insert(
            "0xa1".to_string(),
            DirectoryEntry {
                chain_id: 19,
                name: "Alpha".to_string(),
                description: "alpha desc".to_string(),
                url: "https://alpha.example".to_string(),
                address: "0xA1".to_string(),
                logo_uri: "https://alpha.example/logo.png".to_string(),
                listed: true,
            },
        );

        let view = RoundView {
            epoch_id: 200,
            ends_in: 3_600,
            duration: 302_400,
            total_vote_power: Some(1_000),
            whitelist: &whitelist,
            metrics: &metrics,
        };
        let served = ProviderInfoBuilder::new(19).build(&view, &directory);

        assert_eq!(served.epoch_id, "200");
        assert_eq!(served.providers_info.len(), 2);

        let alpha = &served.providers_info[0];
        assert_eq!(alpha.name, "Alpha");
        assert!(alpha.listed);
        assert_eq!(alpha.whitelist.len(), 2);
        assert_eq!(alpha.success_rate, "87.50");
        assert_eq!(alpha.balance.as_deref(), Some("1.25"));
        assert_eq!(alpha.current_vote_power.as_deref(), Some("5000000000000000000"));
        assert_eq!(alpha.prev_reward_rate, RewardRate::NotAvailable);

        let unlisted = &served.providers_info[1];
        assert_eq!(unlisted.name, "");
        assert!(!unlisted.listed);
        assert_eq!(unlisted.success_rate, "0.00");
    }

    #[test]
    fn test_directory_entry_for_other_chain_is_ignored() {
        let (whitelist, metrics) = view_inputs();
        let mut directory = DirectoryIndex::new();
        directory.insert(
            "0xa1".to_string(),
            DirectoryEntry {
                chain_id: 14,
                name: "Alpha".to_string(),
                description: String::new(),
                url: String::new(),
                address: "0xa1".to_string(),
                logo_uri: String::new(),
                listed: true,
            },
        );

        let view = RoundView {
            epoch_id: 1,
            ends_in: 0,
            duration: 0,
            total_vote_power: None,
            whitelist: &whitelist,
            metrics: &metrics,
        };
        let served = ProviderInfoBuilder::new(19).build(&view, &directory);
        assert_eq!(served.providers_info[0].name, "");
    }

    #[test]
    fn test_served_json_shape() {
        let (whitelist, metrics) = view_inputs();
        let view = RoundView {
            epoch_id: 200,
            ends_in: 10,
            duration: 302_400,
            total_vote_power: Some(7),
            whitelist: &whitelist,
            metrics: &metrics,
        };
        let served = ProviderInfoBuilder::new(19).build(&view, &DirectoryIndex::new());
        let json = serde_json::to_value(&served).unwrap();

        assert_eq!(json["epochId"], "200");
        assert_eq!(json["totalVotePower"], "7");
        let first = &json["providersInfo"][0];
        assert_eq!(first["logoURI"], "");
        assert_eq!(first["whitelist"]["XRP"], true);
        assert_eq!(first["currentRewardRate"], "0.1234");
        assert_eq!(first["prevRewardRate"], "N/A");
        assert_eq!(first["fee"]["fee"], "2000");
        assert_eq!(first["fee"]["scheduledFee"]["from"], "210");
    }
}
