//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use ftsoflow::chain::{
    Address, ChainError, ChainGateway, PerformanceInfo, PriceFinalized, ScheduledFeeChange, Wei,
};
use ftsoflow::pipeline::directory::{DirectoryIndex, ProviderDirectory};
use ftsoflow::pipeline::SqliteStore;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;
use tokio::sync::mpsc;

pub const SCHEMA_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/sql");
pub const UNIT: u128 = 1_000_000_000_000_000_000;

#[derive(Default)]
pub struct ChainState {
    pub epoch_id: u64,
    pub epoch_end: i64,
    pub duration: u64,
    pub total_vote_power: Wei,
    pub vote_power: HashMap<Address, Wei>,
    pub locked_vote_power: HashMap<Address, Wei>,
    pub whitelist: HashMap<String, Vec<Address>>,
    pub unclaimed: HashMap<(Address, u64), Wei>,
    pub total_reward: HashMap<(Address, u64), Wei>,
    pub submitted: HashMap<(String, u64, Address), u128>,
    pub executors: HashMap<Address, Vec<Address>>,
    pub failing: HashSet<String>,
    pub claims: Vec<(Vec<Address>, u64)>,
    pub streams: HashMap<String, mpsc::Sender<PriceFinalized>>,
}

/// Scriptable in-memory chain
#[derive(Default)]
pub struct ScriptedGateway {
    state: Mutex<ChainState>,
}

impl ScriptedGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with<F: FnOnce(&mut ChainState)>(&self, f: F) {
        f(&mut self.state.lock().unwrap());
    }

    pub fn claims(&self) -> Vec<(Vec<Address>, u64)> {
        self.state.lock().unwrap().claims.clone()
    }

    pub fn has_stream(&self, symbol: &str) -> bool {
        self.state.lock().unwrap().streams.contains_key(symbol)
    }

    pub async fn emit(&self, symbol: &str, event: PriceFinalized) {
        let sender = self.state.lock().unwrap().streams.get(symbol).cloned();
        if let Some(sender) = sender {
            sender.send(event).await.unwrap();
        }
    }

    fn state(&self, op: &str) -> Result<std::sync::MutexGuard<'_, ChainState>, ChainError> {
        let state = self.state.lock().unwrap();
        if state.failing.contains(op) {
            return Err(ChainError::Transport(format!("{} unavailable", op)));
        }
        Ok(state)
    }
}

#[async_trait]
impl ChainGateway for ScriptedGateway {
    async fn current_epoch_id(&self) -> Result<u64, ChainError> {
        Ok(self.state("current_epoch_id")?.epoch_id)
    }

    async fn current_epoch_end(&self) -> Result<i64, ChainError> {
        Ok(self.state("current_epoch_end")?.epoch_end)
    }

    async fn epoch_duration(&self) -> Result<u64, ChainError> {
        Ok(self.state("epoch_duration")?.duration)
    }

    async fn total_vote_power(&self) -> Result<Wei, ChainError> {
        Ok(self.state("total_vote_power")?.total_vote_power)
    }

    async fn vote_power_of(&self, address: &str) -> Result<Wei, ChainError> {
        Ok(self.state("vote_power_of")?.vote_power.get(address).copied().unwrap_or(0))
    }

    async fn epoch_vote_power_block(&self, epoch_id: u64) -> Result<u64, ChainError> {
        self.state("epoch_vote_power_block")?;
        Ok(epoch_id * 1_000)
    }

    async fn vote_power_of_at(&self, address: &str, _block: u64) -> Result<Wei, ChainError> {
        Ok(self
            .state("vote_power_of_at")?
            .locked_vote_power
            .get(address)
            .copied()
            .unwrap_or(0))
    }

    async fn whitelisted_providers(&self, symbol: &str) -> Result<Vec<Address>, ChainError> {
        Ok(self
            .state("whitelisted_providers")?
            .whitelist
            .get(symbol)
            .cloned()
            .unwrap_or_default())
    }

    async fn balance_of(&self, _address: &str) -> Result<Wei, ChainError> {
        self.state("balance_of")?;
        Ok(10 * UNIT)
    }

    async fn current_fee(&self, _address: &str) -> Result<u64, ChainError> {
        self.state("current_fee")?;
        Ok(2_000)
    }

    async fn scheduled_fee_changes(&self, _address: &str) -> Result<Vec<ScheduledFeeChange>, ChainError> {
        self.state("scheduled_fee_changes")?;
        Ok(Vec::new())
    }

    async fn unclaimed_reward(&self, address: &str, epoch_id: u64) -> Result<Wei, ChainError> {
        Ok(self
            .state("unclaimed_reward")?
            .unclaimed
            .get(&(address.to_string(), epoch_id))
            .copied()
            .unwrap_or(0))
    }

    async fn provider_performance(&self, epoch_id: u64, address: &str) -> Result<PerformanceInfo, ChainError> {
        let state = self.state("provider_performance")?;
        Ok(PerformanceInfo {
            reward_amount: state
                .total_reward
                .get(&(address.to_string(), epoch_id))
                .copied()
                .unwrap_or(0),
            vote_power: state.vote_power.get(address).copied().unwrap_or(0),
        })
    }

    async fn submitted_price(&self, symbol: &str, epoch_id: u64, address: &str) -> Result<u128, ChainError> {
        Ok(self
            .state("submitted_price")?
            .submitted
            .get(&(symbol.to_string(), epoch_id, address.to_string()))
            .copied()
            .unwrap_or(0))
    }

    async fn claim_executors(&self, owner: &str) -> Result<Vec<Address>, ChainError> {
        Ok(self
            .state("claim_executors")?
            .executors
            .get(owner)
            .cloned()
            .unwrap_or_default())
    }

    async fn submit_auto_claim(&self, owners: &[Address], epoch_id: u64) -> Result<String, ChainError> {
        let mut state = self.state("submit_auto_claim")?;
        state.claims.push((owners.to_vec(), epoch_id));
        Ok(format!("0x{:064x}", state.claims.len()))
    }

    async fn price_finalized_stream(&self, symbol: &str) -> Result<mpsc::Receiver<PriceFinalized>, ChainError> {
        let mut state = self.state("price_finalized_stream")?;
        let (tx, rx) = mpsc::channel(256);
        state.streams.insert(symbol.to_string(), tx);
        Ok(rx)
    }
}

pub struct StaticDirectory(pub DirectoryIndex);

#[async_trait]
impl ProviderDirectory for StaticDirectory {
    async fn fetch(&self, _chain_id: u64) -> Result<DirectoryIndex, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.0.clone())
    }
}

pub fn open_store() -> (NamedTempFile, Arc<SqliteStore>) {
    let temp = NamedTempFile::new().unwrap();
    let store = SqliteStore::open(temp.path().to_str().unwrap(), SCHEMA_DIR).unwrap();
    (temp, Arc::new(store))
}

pub fn finalized(epoch_id: u64, low: u128, high: u128) -> PriceFinalized {
    PriceFinalized {
        epoch_id,
        median_price: (low + high) / 2,
        low_reward_price: low,
        high_reward_price: high,
        rewarded: true,
        finalization_type: 1,
        timestamp: 0,
    }
}
