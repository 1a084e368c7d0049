//! In-memory gateway for unit tests

use super::{Address, ChainError, ChainGateway, PerformanceInfo, PriceFinalized, ScheduledFeeChange, Wei};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tokio::sync::mpsc;

#[derive(Default)]
pub struct MockState {
    pub epoch_id: u64,
    pub epoch_end: i64,
    pub duration: u64,
    pub total_vote_power: Wei,
    pub vote_power: HashMap<Address, Wei>,
    pub vote_power_block: u64,
    pub locked_vote_power: HashMap<Address, Wei>,
    pub whitelist: HashMap<String, Vec<Address>>,
    pub balances: HashMap<Address, Wei>,
    pub fees: HashMap<Address, u64>,
    pub scheduled_fees: HashMap<Address, Vec<ScheduledFeeChange>>,
    pub unclaimed: HashMap<(Address, u64), Wei>,
    pub performance: HashMap<(u64, Address), PerformanceInfo>,
    pub submitted: HashMap<(String, u64, Address), u128>,
    pub executors: HashMap<Address, Vec<Address>>,
    /// `"op"` fails every call, `"op:arg"` fails calls for one argument
    pub failing: HashSet<String>,
    pub claims: Vec<(Vec<Address>, u64)>,
    pub streams: HashMap<String, mpsc::Sender<PriceFinalized>>,
    pub calls: HashMap<String, usize>,
}

#[derive(Default)]
pub struct MockGateway {
    pub state: Mutex<MockState>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<F: FnOnce(&mut MockState)>(&self, f: F) {
        f(&mut self.state.lock().unwrap());
    }

    pub fn fail(&self, key: &str) {
        self.state.lock().unwrap().failing.insert(key.to_string());
    }

    pub fn recover(&self, key: &str) {
        self.state.lock().unwrap().failing.remove(key);
    }

    pub fn call_count(&self, op: &str) -> usize {
        self.state.lock().unwrap().calls.get(op).copied().unwrap_or(0)
    }

    pub fn claims(&self) -> Vec<(Vec<Address>, u64)> {
        self.state.lock().unwrap().claims.clone()
    }

    pub async fn emit(&self, symbol: &str, event: PriceFinalized) {
        let sender = self.state.lock().unwrap().streams.get(symbol).cloned();
        if let Some(sender) = sender {
            let _ = sender.send(event).await;
        }
    }

    fn check(&self, op: &str, arg: Option<&str>) -> Result<std::sync::MutexGuard<'_, MockState>, ChainError> {
        let mut state = self.state.lock().unwrap();
        *state.calls.entry(op.to_string()).or_insert(0) += 1;
        if state.failing.contains(op) {
            return Err(ChainError::Transport(format!("{} unavailable", op)));
        }
        if let Some(arg) = arg {
            if state.failing.contains(&format!("{}:{}", op, arg)) {
                return Err(ChainError::Transport(format!("{} unavailable for {}", op, arg)));
            }
        }
        Ok(state)
    }
}

#[async_trait]
impl ChainGateway for MockGateway {
    async fn current_epoch_id(&self) -> Result<u64, ChainError> {
        Ok(self.check("current_epoch_id", None)?.epoch_id)
    }

    async fn current_epoch_end(&self) -> Result<i64, ChainError> {
        Ok(self.check("current_epoch_end", None)?.epoch_end)
    }

    async fn epoch_duration(&self) -> Result<u64, ChainError> {
        Ok(self.check("epoch_duration", None)?.duration)
    }

    async fn total_vote_power(&self) -> Result<Wei, ChainError> {
        Ok(self.check("total_vote_power", None)?.total_vote_power)
    }

    async fn vote_power_of(&self, address: &str) -> Result<Wei, ChainError> {
        let state = self.check("vote_power_of", Some(address))?;
        Ok(state.vote_power.get(address).copied().unwrap_or(0))
    }

    async fn epoch_vote_power_block(&self, _epoch_id: u64) -> Result<u64, ChainError> {
        Ok(self.check("epoch_vote_power_block", None)?.vote_power_block)
    }

    async fn vote_power_of_at(&self, address: &str, _block: u64) -> Result<Wei, ChainError> {
        let state = self.check("vote_power_of_at", Some(address))?;
        Ok(state.locked_vote_power.get(address).copied().unwrap_or(0))
    }

    async fn whitelisted_providers(&self, symbol: &str) -> Result<Vec<Address>, ChainError> {
        let state = self.check("whitelisted_providers", Some(symbol))?;
        Ok(state.whitelist.get(symbol).cloned().unwrap_or_default())
    }

    async fn balance_of(&self, address: &str) -> Result<Wei, ChainError> {
        let state = self.check("balance_of", Some(address))?;
        Ok(state.balances.get(address).copied().unwrap_or(0))
    }

    async fn current_fee(&self, address: &str) -> Result<u64, ChainError> {
        let state = self.check("current_fee", Some(address))?;
        Ok(state.fees.get(address).copied().unwrap_or(2_000))
    }

    async fn scheduled_fee_changes(&self, address: &str) -> Result<Vec<ScheduledFeeChange>, ChainError> {
        let state = self.check("scheduled_fee_changes", Some(address))?;
        Ok(state.scheduled_fees.get(address).cloned().unwrap_or_default())
    }

    async fn unclaimed_reward(&self, address: &str, epoch_id: u64) -> Result<Wei, ChainError> {
        let state = self.check("unclaimed_reward", Some(address))?;
        Ok(state.unclaimed.get(&(address.to_string(), epoch_id)).copied().unwrap_or(0))
    }

    async fn provider_performance(&self, epoch_id: u64, address: &str) -> Result<PerformanceInfo, ChainError> {
        let state = self.check("provider_performance", Some(address))?;
        Ok(state
            .performance
            .get(&(epoch_id, address.to_string()))
            .copied()
            .unwrap_or_default())
    }

    async fn submitted_price(&self, symbol: &str, epoch_id: u64, address: &str) -> Result<u128, ChainError> {
        let state = self.check("submitted_price", Some(address))?;
        Ok(state
            .submitted
            .get(&(symbol.to_string(), epoch_id, address.to_string()))
            .copied()
            .unwrap_or(0))
    }

    async fn claim_executors(&self, owner: &str) -> Result<Vec<Address>, ChainError> {
        let state = self.check("claim_executors", Some(owner))?;
        Ok(state.executors.get(owner).cloned().unwrap_or_default())
    }

    async fn submit_auto_claim(&self, owners: &[Address], epoch_id: u64) -> Result<String, ChainError> {
        let mut state = self.check("submit_auto_claim", None)?;
        state.claims.push((owners.to_vec(), epoch_id));
        Ok(format!("0x{:064x}", state.claims.len()))
    }

    async fn price_finalized_stream(&self, symbol: &str) -> Result<mpsc::Receiver<PriceFinalized>, ChainError> {
        let mut state = self.check("price_finalized_stream", Some(symbol))?;
        let (tx, rx) = mpsc::channel(64);
        state.streams.insert(symbol.to_string(), tx);
        Ok(rx)
    }
}
