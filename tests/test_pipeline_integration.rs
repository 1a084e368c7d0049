//! End-to-end tests of the metrics pipeline through the public API
//!
//! Key integration points tested:
//! - Sliding-window retention and classification through SQLite
//! - Rounds across an epoch boundary (snapshot → previous reward rate)
//! - Epoch transitions driving exactly one auto-claim
//! - Subscription operations feeding the dispatcher

mod common;

use common::*;
use ftsoflow::pipeline::aggregator::MetricsAggregator;
use ftsoflow::pipeline::clock::{ClockSettings, ClockStatus, EpochClock};
use ftsoflow::pipeline::directory::{CachedDirectory, DirectoryEntry, DirectoryIndex};
use ftsoflow::pipeline::provider_info::ProviderInfoBuilder;
use ftsoflow::pipeline::recorder::PriceEventRecorder;
use ftsoflow::pipeline::round::RoundPipeline;
use ftsoflow::pipeline::snapshot::SnapshotStore;
use ftsoflow::pipeline::{
    AutoClaimDispatcher, ClockEvent, PriceRecordStore, RewardRate, SnapshotRepository, SubscriptionService,
};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

const PROVIDER_A: &str = "0xaaaa000000000000000000000000000000000001";
const PROVIDER_B: &str = "0xbbbb000000000000000000000000000000000002";
const EXECUTOR: &str = "0xeeee000000000000000000000000000000000003";

fn round_pipeline(
    gateway: Arc<ScriptedGateway>,
    store: Arc<ftsoflow::pipeline::SqliteStore>,
    directory: DirectoryIndex,
    clock_rx: watch::Receiver<ClockStatus>,
) -> RoundPipeline {
    RoundPipeline::new(
        gateway,
        store.clone(),
        SnapshotStore::new(store),
        MetricsAggregator::new(vec!["XRP".into(), "BTC".into()], 120),
        CachedDirectory::new(Box::new(StaticDirectory(directory)), 19),
        ProviderInfoBuilder::new(19),
        clock_rx,
        120,
    )
}

#[tokio::test]
async fn test_window_retention_through_recorder() {
    let (_temp, store) = open_store();
    let gateway = ScriptedGateway::new();
    let recorder = PriceEventRecorder::new(gateway.clone(), store.clone(), 120);
    let providers = vec![PROVIDER_A.to_string()];

    for epoch in 1..=119 {
        recorder.record("XRP", &finalized(epoch, 90, 110), &providers).await.unwrap();
    }
    let outcome = recorder.record("XRP", &finalized(120, 90, 110), &providers).await.unwrap();
    assert!(outcome.evicted.is_empty());
    assert_eq!(store.load_window("XRP", 120).await.unwrap().len(), 120);

    let outcome = recorder.record("XRP", &finalized(121, 90, 110), &providers).await.unwrap();
    assert_eq!(outcome.evicted, vec![1]);

    let window = store.load_window("XRP", 120).await.unwrap();
    let epochs: Vec<u64> = window.epoch_ids().collect();
    assert_eq!(epochs.len(), 120);
    assert_eq!(epochs.first(), Some(&2));
    assert_eq!(epochs.last(), Some(&121));

    // other symbols are untouched
    assert!(store.load_window("BTC", 120).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_classification_scenarios() {
    let (_temp, store) = open_store();
    let gateway = ScriptedGateway::new();
    let providers: Vec<String> = ["0x01", "0x02", "0x03", "0x04"].iter().map(|s| s.to_string()).collect();
    gateway.with(|s| {
        s.submitted.insert(("XRP".into(), 5, "0x01".into()), 100);
        s.submitted.insert(("XRP".into(), 5, "0x02".into()), 90);
        s.submitted.insert(("XRP".into(), 5, "0x03".into()), 80);
    });

    let recorder = PriceEventRecorder::new(gateway.clone(), store.clone(), 120);
    let outcome = recorder.record("XRP", &finalized(5, 90, 110), &providers).await.unwrap();
    assert_eq!(outcome.recorded, 4);
    assert_eq!(outcome.priced, 3);

    let window = store.load_window("XRP", 120).await.unwrap();
    let values: Vec<f64> = providers
        .iter()
        .map(|p| window.get(5, p).unwrap().classification.value())
        .collect();
    assert_eq!(values, vec![1.0, 0.5, 0.0, 0.0]);
    assert_eq!(window.get(5, "0x04").unwrap().submitted_price, None);
}

#[tokio::test]
async fn test_rounds_across_epoch_boundary() {
    let (_temp, store) = open_store();
    let gateway = ScriptedGateway::new();
    gateway.with(|s| {
        s.epoch_id = 10;
        s.duration = 302_400;
        s.total_vote_power = 1_000_000 * UNIT;
        s.whitelist.insert("XRP".into(), vec![PROVIDER_A.into(), PROVIDER_B.into()]);
        s.whitelist.insert("BTC".into(), vec![PROVIDER_A.into()]);
        s.vote_power.insert(PROVIDER_A.into(), 200_000 * UNIT);
        s.locked_vote_power.insert(PROVIDER_A.into(), 200_000 * UNIT);
        s.unclaimed.insert((PROVIDER_A.into(), 10), 1_000 * UNIT);
        s.total_reward.insert((PROVIDER_A.into(), 10), 3_000 * UNIT);
    });

    let mut directory = DirectoryIndex::new();
    directory.insert(
        PROVIDER_A.to_string(),
        DirectoryEntry {
            chain_id: 19,
            name: "Provider A".into(),
            description: "first".into(),
            url: "https://a.example".into(),
            address: PROVIDER_A.into(),
            logo_uri: "https://a.example/logo.png".into(),
            listed: true,
        },
    );

    let (_clock_tx, clock_rx) = watch::channel(ClockStatus::default());
    let pipeline = round_pipeline(gateway.clone(), store.clone(), directory, clock_rx);

    // first epoch: no previous snapshot, round still succeeds
    let first = pipeline.run_round().await.unwrap();
    assert_eq!(first.epoch_id, 10);
    assert!(first
        .metrics
        .values()
        .all(|m| m.prev_reward_rate == RewardRate::NotAvailable));
    assert_eq!(first.metrics[PROVIDER_A].current_reward_rate, RewardRate::Rate(1.0));
    assert_eq!(first.served.providers_info[0].name, "Provider A");
    assert_eq!(first.served.providers_info[1].name, "");
    assert!(!first.served.providers_info[1].listed);

    // rerunning the same epoch overwrites its snapshot
    pipeline.run_round().await.unwrap();
    assert!(store.get_snapshot(10).await.unwrap().is_some());

    gateway.with(|s| s.epoch_id = 11);
    let second = pipeline.run_round().await.unwrap();
    assert_eq!(second.epoch_id, 11);
    assert_eq!(second.metrics[PROVIDER_A].prev_reward_rate, RewardRate::Rate(1.0));
    // nothing accrued yet in epoch 11
    assert_eq!(second.metrics[PROVIDER_A].current_reward_rate, RewardRate::Rate(0.0));
    assert_eq!(second.metrics[PROVIDER_B].prev_reward_rate, RewardRate::NotAvailable);

    let json = serde_json::to_value(&second.served).unwrap();
    assert_eq!(json["epochId"], "11");
    assert_eq!(json["providersInfo"][0]["prevRewardRate"], "1.0000");
}

#[tokio::test]
async fn test_round_failure_keeps_store_consistent() {
    let (_temp, store) = open_store();
    let gateway = ScriptedGateway::new();
    gateway.with(|s| {
        s.epoch_id = 3;
        s.whitelist.insert("XRP".into(), vec![PROVIDER_A.into()]);
        s.failing.insert("current_epoch_id".into());
    });

    let (_clock_tx, clock_rx) = watch::channel(ClockStatus::default());
    let pipeline = round_pipeline(gateway.clone(), store.clone(), DirectoryIndex::new(), clock_rx);

    assert!(pipeline.run_round().await.is_err());
    assert!(store.get_snapshot(3).await.unwrap().is_none());

    gateway.with(|s| {
        s.failing.clear();
    });
    assert_eq!(pipeline.run_round().await.unwrap().epoch_id, 3);
}

#[tokio::test]
async fn test_epoch_transition_claims_once_and_prunes_revoked() {
    let (_temp, store) = open_store();
    let gateway = ScriptedGateway::new();
    let now = Arc::new(AtomicI64::new(5_000_000));
    gateway.with(|s| {
        s.epoch_id = 40;
        s.epoch_end = 5_000_002;
        s.duration = 302_400;
        s.executors.insert(PROVIDER_A.into(), vec![EXECUTOR.into()]);
        s.executors.insert(PROVIDER_B.into(), vec![]);
    });

    let subscriptions = SubscriptionService::new(store.clone(), Some(EXECUTOR.to_string()));
    subscriptions.opt_in(PROVIDER_A).await.unwrap();
    subscriptions.opt_in(PROVIDER_B).await.unwrap();

    let (_round_tx, round_rx) = watch::channel(None);
    let clock_now = now.clone();
    let mut clock = EpochClock::new_with_timestamp_fn(
        gateway.clone(),
        ClockSettings {
            capture_threshold_secs: 60,
            epoch_poll_secs: 5,
        },
        round_rx,
        Box::new(move || clock_now.load(Ordering::SeqCst)),
    );
    clock.bootstrap().await.unwrap();
    let events = clock.subscribe();
    let dispatcher = tokio::spawn(AutoClaimDispatcher::new(gateway.clone(), store.clone(), EXECUTOR).run(events));

    // countdown underflows for many ticks before the chain moves on
    now.store(5_000_020, Ordering::SeqCst);
    for _ in 0..15 {
        clock.tick().await;
    }
    gateway.with(|s| {
        s.epoch_id = 41;
        s.epoch_end = 5_000_020 + 302_400;
    });
    for _ in 0..15 {
        clock.tick().await;
    }
    drop(clock);

    dispatcher.await.unwrap();

    assert_eq!(gateway.claims(), vec![(vec![PROVIDER_A.to_string()], 40)]);
    let remaining: Vec<String> = subscriptions.list().await.unwrap().into_iter().map(|s| s.address).collect();
    assert_eq!(remaining, vec![PROVIDER_A.to_string()]);
}

#[tokio::test]
async fn test_clock_events_reach_subscribers() {
    let gateway = ScriptedGateway::new();
    gateway.with(|s| {
        s.epoch_id = 1;
        s.epoch_end = 100;
        s.duration = 100;
    });
    let (_round_tx, round_rx) = watch::channel(None);
    let mut clock = EpochClock::new_with_timestamp_fn(gateway.clone(), ClockSettings::default(), round_rx, Box::new(|| 0));
    let mut events = clock.subscribe();
    clock.bootstrap().await.unwrap();

    gateway.with(|s| {
        s.epoch_id = 2;
        s.epoch_end = 200;
    });
    for _ in 0..5 {
        clock.tick().await;
    }

    let mut advanced = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let ClockEvent::EpochAdvanced { previous, current } = event {
            advanced.push((previous, current));
        }
    }
    assert_eq!(advanced, vec![(1, 2)]);
    assert_eq!(clock.status().borrow().epoch_id, Some(2));
}
