//! One metrics round
//!
//! A round rebuilds the whitelist, reads every provider's chain figures,
//! aggregates the sliding windows, persists the epoch snapshot and builds the
//! served snapshot. The result is published wholesale as a [`RoundState`].
//!
//! Failure handling:
//! - whitelist, epoch id and window loads abort the round ([`RoundError`])
//! - per-provider reads fall back to zero / `None` and the round continues
//! - a failed snapshot write or directory fetch is logged only

use super::aggregator::{reward_rate, MetricsAggregator};
use super::clock::ClockStatus;
use super::db::{PriceRecordStore, StoreError};
use super::directory::CachedDirectory;
use super::provider_info::{ProviderInfoBuilder, RoundView, ServedSnapshot};
use super::snapshot::{snapshot_from_metrics, SnapshotStore};
use super::types::{Address, FeeSchedule, ProviderMetrics, ScheduledFee, Symbol, Wei, Whitelist};
use super::window::SlidingWindow;
use crate::chain::{ChainError, ChainGateway};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Everything one completed round produced
#[derive(Debug, Clone)]
pub struct RoundState {
    pub epoch_id: u64,
    pub duration: u64,
    pub total_vote_power: Option<Wei>,
    pub whitelist: Whitelist,
    pub metrics: BTreeMap<Address, ProviderMetrics>,
    pub served: ServedSnapshot,
    pub completed_at: i64,
}

impl RoundState {
    /// A round with a whitelist and no metrics
    pub fn empty(epoch_id: u64, whitelist: Whitelist) -> Self {
        let mut served = ServedSnapshot::empty();
        served.epoch_id = epoch_id.to_string();

        Self {
            epoch_id,
            duration: 0,
            total_vote_power: None,
            whitelist,
            metrics: BTreeMap::new(),
            served,
            completed_at: 0,
        }
    }
}

#[derive(Debug)]
pub enum RoundError {
    Chain(ChainError),
    Store(StoreError),
}

impl fmt::Display for RoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundError::Chain(e) => write!(f, "Chain read failed: {}", e),
            RoundError::Store(e) => write!(f, "Store access failed: {}", e),
        }
    }
}

impl std::error::Error for RoundError {}

impl From<ChainError> for RoundError {
    fn from(err: ChainError) -> Self {
        RoundError::Chain(err)
    }
}

impl From<StoreError> for RoundError {
    fn from(err: StoreError) -> Self {
        RoundError::Store(err)
    }
}

/// Chain figures read for one provider
#[derive(Debug, Default)]
struct ProviderReads {
    vote_power: Option<Wei>,
    locked_vote_power: Option<Wei>,
    balance: Option<Wei>,
    current_epoch_reward: Option<Wei>,
    total_epoch_reward: Option<Wei>,
    prev_total_epoch_reward: Option<Wei>,
    fee: Option<FeeSchedule>,
}

pub struct RoundPipeline {
    gateway: Arc<dyn ChainGateway>,
    records: Arc<dyn PriceRecordStore>,
    snapshots: SnapshotStore,
    aggregator: MetricsAggregator,
    directory: CachedDirectory,
    builder: ProviderInfoBuilder,
    clock_rx: watch::Receiver<ClockStatus>,
    capacity: usize,
}

impl RoundPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        gateway: Arc<dyn ChainGateway>,
        records: Arc<dyn PriceRecordStore>,
        snapshots: SnapshotStore,
        aggregator: MetricsAggregator,
        directory: CachedDirectory,
        builder: ProviderInfoBuilder,
        clock_rx: watch::Receiver<ClockStatus>,
        capacity: usize,
    ) -> Self {
        Self {
            gateway,
            records,
            snapshots,
            aggregator,
            directory,
            builder,
            clock_rx,
            capacity,
        }
    }

    /// Rebuild the whitelist from the per-symbol provider lists
    ///
    /// Any failed symbol read fails the round; a partial whitelist is never
    /// published.
    pub async fn load_whitelist(&self) -> Result<Whitelist, ChainError> {
        let mut whitelist = Whitelist::new();
        for symbol in self.aggregator.symbols() {
            let providers = self.gateway.whitelisted_providers(symbol).await?;
            for address in providers {
                whitelist.insert(&address, symbol);
            }
        }
        Ok(whitelist)
    }

    async fn load_windows(&self) -> Result<HashMap<Symbol, SlidingWindow>, StoreError> {
        let mut windows = HashMap::new();
        for symbol in self.aggregator.symbols() {
            let window = self.records.load_window(symbol, self.capacity).await?;
            windows.insert(symbol.clone(), window);
        }
        Ok(windows)
    }

    async fn read_provider(&self, address: &str, epoch_id: u64, vote_power_block: Option<u64>) -> ProviderReads {
        let mut reads = ProviderReads::default();

        match self.gateway.vote_power_of(address).await {
            Ok(v) => reads.vote_power = Some(v),
            Err(e) => log::warn!("⚠️  Vote power read failed for {}: {}", address, e),
        }

        if let Some(block) = vote_power_block {
            match self.gateway.vote_power_of_at(address, block).await {
                Ok(v) => reads.locked_vote_power = Some(v),
                Err(e) => log::warn!("⚠️  Locked vote power read failed for {}: {}", address, e),
            }
        }

        match self.gateway.balance_of(address).await {
            Ok(b) => reads.balance = Some(b),
            Err(e) => log::warn!("⚠️  Balance read failed for {}: {}", address, e),
        }

        match self.gateway.unclaimed_reward(address, epoch_id).await {
            Ok(r) => reads.current_epoch_reward = Some(r),
            Err(e) => log::warn!("⚠️  Unclaimed reward read failed for {}: {}", address, e),
        }

        match self.gateway.provider_performance(epoch_id, address).await {
            Ok(info) => reads.total_epoch_reward = Some(info.reward_amount),
            Err(e) => log::warn!("⚠️  Performance read failed for {}: {}", address, e),
        }

        if let Some(prev_epoch) = epoch_id.checked_sub(1) {
            match self.gateway.provider_performance(prev_epoch, address).await {
                Ok(info) => reads.prev_total_epoch_reward = Some(info.reward_amount),
                Err(e) => log::warn!("⚠️  Previous epoch performance read failed for {}: {}", address, e),
            }
        }

        reads
    }

    async fn read_fee(&self, address: &str) -> Option<FeeSchedule> {
        let fee_bips = match self.gateway.current_fee(address).await {
            Ok(fee) => fee,
            Err(e) => {
                log::warn!("⚠️  Fee read failed for {}: {}", address, e);
                return None;
            }
        };

        let scheduled = match self.gateway.scheduled_fee_changes(address).await {
            Ok(changes) => changes.first().map(|change| ScheduledFee {
                fee_bips: change.fee_bips,
                from_epoch: change.valid_from_epoch,
            }),
            Err(e) => {
                log::warn!("⚠️  Scheduled fee read failed for {}: {}", address, e);
                None
            }
        };

        Some(FeeSchedule { fee_bips, scheduled })
    }

    /// Run one round from whitelist to served snapshot
    pub async fn run_round(&self) -> Result<RoundState, RoundError> {
        let whitelist = self.load_whitelist().await?;
        let epoch_id = self.gateway.current_epoch_id().await?;

        log::info!("📊 Round for epoch {} ({} providers)", epoch_id, whitelist.len());

        let prev_rates = self.snapshots.previous_reward_rates(epoch_id, whitelist.addresses()).await;

        let duration = match self.gateway.epoch_duration().await {
            Ok(duration) => duration,
            Err(e) => {
                log::warn!("⚠️  Epoch duration read failed: {}", e);
                self.clock_rx.borrow().duration
            }
        };

        let total_vote_power = match self.gateway.total_vote_power().await {
            Ok(total) => Some(total),
            Err(e) => {
                log::warn!("⚠️  Total vote power read failed: {}", e);
                None
            }
        };

        let windows = self.load_windows().await?;
        let rates = self.aggregator.compute_rates(&whitelist, &windows);

        let vote_power_block = match self.gateway.epoch_vote_power_block(epoch_id).await {
            Ok(block) => Some(block),
            Err(e) => {
                log::warn!("⚠️  Vote power block read failed for epoch {}: {}", epoch_id, e);
                None
            }
        };

        let mut metrics = BTreeMap::new();
        for address in whitelist.addresses() {
            let reads = self.read_provider(address, epoch_id, vote_power_block).await;

            let mut m = ProviderMetrics::new(address);
            if let Some(r) = rates.get(address) {
                m.success_rate = r.success_rate;
                m.availability_rate = r.availability_rate;
            }
            m.vote_power = reads.vote_power;
            m.locked_vote_power = reads.locked_vote_power;
            m.balance = reads.balance;
            m.current_epoch_reward = reads.current_epoch_reward.unwrap_or(0);
            m.total_epoch_reward = reads.total_epoch_reward.unwrap_or(0);
            m.prev_total_epoch_reward = reads.prev_total_epoch_reward;
            m.current_reward_rate =
                reward_rate(reads.total_epoch_reward, reads.current_epoch_reward, reads.vote_power);
            if let Some(rate) = prev_rates.get(address) {
                m.prev_reward_rate = *rate;
            }

            metrics.insert(address.clone(), m);
        }

        let snapshot = snapshot_from_metrics(epoch_id, &metrics);
        if let Err(e) = self.snapshots.persist(&snapshot).await {
            log::error!("❌ Failed to persist snapshot for epoch {}: {}", epoch_id, e);
        }

        for (address, m) in metrics.iter_mut() {
            m.fee = self.read_fee(address).await;
        }

        let (ends_in, capture) = {
            let clock = self.clock_rx.borrow();
            (clock.ends_in, clock.last_capture.clone())
        };

        // A capture for the epoch that just closed becomes this epoch's prevEpochReward
        if let Some(capture) = capture.filter(|c| c.epoch_id + 1 == epoch_id) {
            for (address, m) in metrics.iter_mut() {
                m.prev_epoch_reward = capture.unclaimed_reward.get(address).copied();
            }
        }

        let directory = self.directory.load().await;
        let served = self.builder.build(
            &RoundView {
                epoch_id,
                ends_in,
                duration,
                total_vote_power,
                whitelist: &whitelist,
                metrics: &metrics,
            },
            &directory,
        );

        log::info!("✅ Round complete for epoch {}", epoch_id);
        log::info!("   ├─ Providers: {}", metrics.len());
        log::info!("   └─ Listed: {}", served.providers_info.iter().filter(|p| p.listed).count());

        Ok(RoundState {
            epoch_id,
            duration,
            total_vote_power,
            whitelist,
            metrics,
            served,
            completed_at: chrono::Utc::now().timestamp(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::MockGateway;
    use crate::chain::{PerformanceInfo, ScheduledFeeChange};
    use crate::pipeline::db::{SnapshotRepository, SqliteStore};
    use crate::pipeline::directory::{DirectoryIndex, ProviderDirectory};
    use crate::pipeline::types::{Classification, PreRolloverCapture, PriceRecord, RewardRate};
    use crate::units::WEI_PER_UNIT;
    use async_trait::async_trait;
    use tempfile::NamedTempFile;

    const SCHEMA_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/sql");

    struct EmptyDirectory;

    #[async_trait]
    impl ProviderDirectory for EmptyDirectory {
        async fn fetch(&self, _chain_id: u64) -> Result<DirectoryIndex, Box<dyn std::error::Error + Send + Sync>> {
            Ok(DirectoryIndex::new())
        }
    }

    struct Harness {
        _temp: NamedTempFile,
        gateway: Arc<MockGateway>,
        store: Arc<SqliteStore>,
        clock_tx: watch::Sender<ClockStatus>,
        pipeline: RoundPipeline,
    }

    fn harness() -> Harness {
        let temp = NamedTempFile::new().unwrap();
        let store = Arc::new(SqliteStore::open(temp.path().to_str().unwrap(), SCHEMA_DIR).unwrap());
        let gateway = Arc::new(MockGateway::new());
        let unit = WEI_PER_UNIT;

        gateway.with(|s| {
            s.epoch_id = 200;
            s.duration = 302_400;
            s.total_vote_power = 1_000_000 * unit;
            s.vote_power_block = 77;
            s.whitelist.insert("XRP".into(), vec!["0xa1".into(), "0xa2".into()]);
            s.whitelist.insert("BTC".into(), vec!["0xa1".into()]);
            s.vote_power.insert("0xa1".into(), 100_000 * unit);
            s.vote_power.insert("0xa2".into(), 50_000 * unit);
            s.locked_vote_power.insert("0xa1".into(), 90_000 * unit);
            s.balances.insert("0xa1".into(), 3 * unit / 2);
            s.unclaimed.insert(("0xa1".into(), 200), 500 * unit);
            s.performance.insert(
                (200, "0xa1".into()),
                PerformanceInfo {
                    reward_amount: 1_500 * unit,
                    vote_power: 100_000 * unit,
                },
            );
            s.scheduled_fees.insert(
                "0xa1".into(),
                vec![ScheduledFeeChange {
                    fee_bips: 1_000,
                    valid_from_epoch: 202,
                }],
            );
        });

        let (clock_tx, clock_rx) = watch::channel(ClockStatus {
            epoch_id: Some(200),
            ends_in: 1_234,
            ..Default::default()
        });

        let pipeline = RoundPipeline::new(
            gateway.clone(),
            store.clone(),
            SnapshotStore::new(store.clone()),
            MetricsAggregator::new(vec!["XRP".into(), "BTC".into()], 120),
            CachedDirectory::new(Box::new(EmptyDirectory), 19),
            ProviderInfoBuilder::new(19),
            clock_rx,
            120,
        );

        Harness {
            _temp: temp,
            gateway,
            store,
            clock_tx,
            pipeline,
        }
    }

    #[tokio::test]
    async fn test_round_computes_metrics() {
        let h = harness();
        let records: Vec<PriceRecord> = ["0xa1", "0xa2"]
            .iter()
            .map(|address| PriceRecord {
                epoch_id: 1,
                address: address.to_string(),
                submitted_price: Some(100),
                median_price: 100,
                low_bound: 90,
                high_bound: 110,
                classification: Classification::Hit,
            })
            .collect();
        h.store.upsert_epoch_records("XRP", 1, &records, 120).await.unwrap();

        let round = h.pipeline.run_round().await.unwrap();

        assert_eq!(round.epoch_id, 200);
        assert_eq!(round.whitelist.len(), 2);
        let a1 = &round.metrics["0xa1"];
        // XRP 1/120 → 0.83, BTC 0 → mean 0.42
        assert_eq!(a1.success_rate, 0.42);
        assert_eq!(a1.current_reward_rate, RewardRate::Rate(1.0));
        assert_eq!(a1.prev_reward_rate, RewardRate::NotAvailable);
        assert_eq!(a1.locked_vote_power, Some(90_000 * WEI_PER_UNIT));
        assert_eq!(a1.fee.unwrap().scheduled.unwrap().from_epoch, 202);

        let a2 = &round.metrics["0xa2"];
        assert_eq!(a2.current_epoch_reward, 0);
        assert_eq!(a2.balance, Some(0));

        assert_eq!(round.served.ends_in, "1234");
        assert_eq!(round.served.providers_info[0].balance.as_deref(), Some("1.5"));
        assert!(h.store.get_snapshot(200).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_whitelist_failure_aborts_round() {
        let h = harness();
        h.gateway.fail("whitelisted_providers:BTC");

        let result = h.pipeline.run_round().await;
        assert!(matches!(result, Err(RoundError::Chain(_))));
        assert!(h.store.get_snapshot(200).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_provider_read_failure_defaults() {
        let h = harness();
        h.gateway.fail("vote_power_of:0xa1");
        h.gateway.fail("balance_of");

        let round = h.pipeline.run_round().await.unwrap();
        let a1 = &round.metrics["0xa1"];
        assert_eq!(a1.vote_power, None);
        assert_eq!(a1.balance, None);
        assert_eq!(a1.current_reward_rate, RewardRate::NotAvailable);
        assert_eq!(a1.total_epoch_reward, 1_500 * WEI_PER_UNIT);
    }

    #[tokio::test]
    async fn test_previous_epoch_figures_feed_next_round() {
        let h = harness();
        h.pipeline.run_round().await.unwrap();

        h.gateway.with(|s| s.epoch_id = 201);
        h.clock_tx.send_modify(|status| {
            status.last_capture = Some(Arc::new(PreRolloverCapture {
                epoch_id: 200,
                captured_at: 0,
                unclaimed_reward: [("0xa1".to_string(), 700)].into_iter().collect(),
            }));
        });

        let round = h.pipeline.run_round().await.unwrap();
        let a1 = &round.metrics["0xa1"];
        // previous snapshot: (1500 − 500) / 90000 locked × 100
        assert_eq!(a1.prev_reward_rate, RewardRate::Rate(1.1111));
        assert_eq!(a1.prev_epoch_reward, Some(700));
        assert_eq!(round.metrics["0xa2"].prev_epoch_reward, None);

        // epoch 200's performance is the previous total reward
        assert_eq!(a1.prev_total_epoch_reward, Some(1_500 * WEI_PER_UNIT));
        assert_eq!(round.metrics["0xa2"].prev_total_epoch_reward, Some(0));
        let served_a1 = round.served.providers_info.iter().find(|p| p.address == "0xa1").unwrap();
        let expected = (1_500 * WEI_PER_UNIT).to_string();
        assert_eq!(served_a1.prev_total_epoch_reward.as_deref(), Some(expected.as_str()));
    }

    #[tokio::test]
    async fn test_previous_total_reward_read_failure_defaults() {
        let h = harness();
        h.gateway.with(|s| s.epoch_id = 201);
        h.gateway.fail("provider_performance:0xa2");

        let round = h.pipeline.run_round().await.unwrap();
        assert_eq!(round.metrics["0xa1"].prev_total_epoch_reward, Some(1_500 * WEI_PER_UNIT));
        assert_eq!(round.metrics["0xa2"].prev_total_epoch_reward, None);
    }
}
