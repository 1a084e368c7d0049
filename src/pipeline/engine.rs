//! Monitor engine - wiring of the pipeline tasks
//!
//! ```text
//!                  ┌──────────────┐  ClockStatus (watch)
//!                  │  EpochClock  │──────────────┬──────────────┐
//!                  └──────┬───────┘              │              │
//!                         │ ClockEvent           ▼              ▼
//!                         ▼ (broadcast)    RoundPipeline   SnapshotHandle
//!              AutoClaimDispatcher              │              ▲
//!                                               │ RoundState   │
//!  PriceFinalized ─▶ listener(symbol) ─▶ store  └── (watch) ───┘
//! ```
//!
//! Tasks: one clock ticker, one listener per watched symbol, one dispatcher
//! (only with a configured executor) and one round loop.

use super::aggregator::MetricsAggregator;
use super::clock::{ClockSettings, EpochClock};
use super::db::{PriceRecordStore, SnapshotRepository, SubscriberRepository};
use super::directory::{CachedDirectory, ProviderDirectory};
use super::dispatcher::AutoClaimDispatcher;
use super::ingestion::run_symbol_listener;
use super::provider_info::{ProviderInfoBuilder, SnapshotHandle};
use super::recorder::PriceEventRecorder;
use super::round::{RoundPipeline, RoundState};
use super::scheduler::round_loop_task;
use super::snapshot::SnapshotStore;
use super::subscriptions::SubscriptionService;
use super::types::{Address, Symbol};
use crate::backoff::ExponentialBackoff;
use crate::chain::ChainGateway;
use crate::config::MonitorConfig;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Runtime settings of the engine, usually derived from [`MonitorConfig`]
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub chain_id: u64,
    pub symbols: Vec<Symbol>,
    pub window_capacity: usize,
    pub clock: ClockSettings,
    pub executor: Option<Address>,
    pub snapshot_path: Option<String>,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
}

impl EngineSettings {
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            chain_id: config.network.chain_id(),
            symbols: config.watched_symbols.clone(),
            window_capacity: config.window_capacity,
            clock: ClockSettings {
                capture_threshold_secs: config.capture_threshold_secs,
                epoch_poll_secs: config.epoch_poll_secs,
            },
            executor: config.executor_address.clone(),
            snapshot_path: Some(config.snapshot_path.clone()),
            backoff_initial_ms: config.backoff_initial_ms,
            backoff_max_ms: config.backoff_max_ms,
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::from_millis(self.backoff_initial_ms, self.backoff_max_ms)
    }
}

/// Handles to a running monitor
pub struct RunningMonitor {
    pub snapshots: SnapshotHandle,
    pub subscriptions: SubscriptionService,
    pub tasks: Vec<JoinHandle<()>>,
}

impl RunningMonitor {
    /// Abort every pipeline task
    pub fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
        log::info!("🛑 Monitor tasks stopped ({})", self.tasks.len());
    }
}

pub struct MonitorEngine;

impl MonitorEngine {
    /// Bootstrap the clock and spawn every pipeline task
    ///
    /// Clock bootstrap is retried with backoff until it succeeds; nothing
    /// is spawned before that.
    pub async fn start<S>(
        settings: EngineSettings,
        gateway: Arc<dyn ChainGateway>,
        store: Arc<S>,
        directory: Box<dyn ProviderDirectory>,
    ) -> RunningMonitor
    where
        S: PriceRecordStore + SnapshotRepository + SubscriberRepository + 'static,
    {
        let (round_tx, round_rx) = watch::channel::<Option<Arc<RoundState>>>(None);

        let mut clock = EpochClock::new(gateway.clone(), settings.clock, round_rx.clone());
        let mut backoff = settings.backoff();
        while let Err(e) = clock.bootstrap().await {
            log::error!("❌ Epoch clock bootstrap failed: {}", e);
            backoff.sleep().await;
        }

        let clock_rx = clock.status();
        let mut tasks = Vec::new();

        let records: Arc<dyn PriceRecordStore> = store.clone();
        let recorder = Arc::new(PriceEventRecorder::new(
            gateway.clone(),
            records.clone(),
            settings.window_capacity,
        ));
        for symbol in &settings.symbols {
            tasks.push(tokio::spawn(run_symbol_listener(
                symbol.clone(),
                gateway.clone(),
                recorder.clone(),
                round_rx.clone(),
                settings.backoff(),
            )));
        }

        let subscribers: Arc<dyn SubscriberRepository> = store.clone();
        match &settings.executor {
            Some(executor) => {
                log::info!("🤖 Auto-claim enabled (executor {})", executor);
                let dispatcher = AutoClaimDispatcher::new(gateway.clone(), subscribers.clone(), executor);
                tasks.push(tokio::spawn(dispatcher.run(clock.subscribe())));
            }
            None => log::info!("ℹ️  EXECUTOR_ADDRESS not set, auto-claim disabled"),
        }

        let snapshot_repo: Arc<dyn SnapshotRepository> = store.clone();
        let pipeline = RoundPipeline::new(
            gateway.clone(),
            records,
            SnapshotStore::new(snapshot_repo),
            MetricsAggregator::new(settings.symbols.clone(), settings.window_capacity),
            CachedDirectory::new(directory, settings.chain_id),
            ProviderInfoBuilder::new(settings.chain_id),
            clock_rx.clone(),
            settings.window_capacity,
        );
        tasks.push(tokio::spawn(round_loop_task(
            pipeline,
            round_tx,
            settings.snapshot_path.clone(),
            settings.backoff(),
        )));

        tasks.push(tokio::spawn(clock.run()));

        log::info!("🚀 Monitor engine started");
        log::info!("   ├─ Chain id: {}", settings.chain_id);
        log::info!("   ├─ Symbols: {}", settings.symbols.len());
        log::info!("   ├─ Window capacity: {}", settings.window_capacity);
        log::info!("   └─ Tasks: {}", tasks.len());

        RunningMonitor {
            snapshots: SnapshotHandle::new(round_rx, clock_rx),
            subscriptions: SubscriptionService::new(subscribers, settings.executor.clone()),
            tasks,
        }
    }
}
