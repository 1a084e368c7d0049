//! EpochClock: countdown to the end of the reward epoch
//!
//! Two independent signals come out of the clock:
//!
//! 1. The countdown (`Running` → `Rolling` → `Running`), ticked once per
//!    second and reconciled against `currentRewardEpochEnds()` whenever it
//!    underflows. Shortly before zero it captures the expiring epoch's
//!    unclaimed rewards once.
//! 2. `EpochAdvanced`, fired exactly once per increase of the authoritative
//!    epoch id. The id is polled every few seconds and on every rollover; the
//!    countdown alone never fires it.
//!
//! State is published on a `watch` channel (`ClockStatus`) and edges on a
//! `broadcast` channel (`ClockEvent`).

use super::round::RoundState;
use super::types::{Address, PreRolloverCapture};
use crate::chain::{ChainError, ChainGateway};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::time::{interval, Duration};

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockPhase {
    Running,
    Rolling,
}

#[derive(Debug, Clone)]
pub struct ClockStatus {
    /// Epoch the countdown refers to; `None` before bootstrap
    pub epoch_id: Option<u64>,
    pub ends_in: i64,
    pub end_unix_time: i64,
    pub duration: u64,
    pub phase: ClockPhase,
    pub last_capture: Option<Arc<PreRolloverCapture>>,
}

impl Default for ClockStatus {
    fn default() -> Self {
        Self {
            epoch_id: None,
            ends_in: 0,
            end_unix_time: 0,
            duration: 0,
            phase: ClockPhase::Running,
            last_capture: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClockEvent {
    /// Pre-rollover rewards captured for the expiring epoch
    PreRollover { epoch_id: u64 },
    /// Countdown reconciled after underflow
    Rolled { epoch_id: u64, ends_in: i64 },
    /// Authoritative epoch id increased
    EpochAdvanced { previous: u64, current: u64 },
}

#[derive(Debug, Clone, Copy)]
pub struct ClockSettings {
    pub capture_threshold_secs: i64,
    pub epoch_poll_secs: u64,
}

impl Default for ClockSettings {
    fn default() -> Self {
        Self {
            capture_threshold_secs: 60,
            epoch_poll_secs: 5,
        }
    }
}

pub struct EpochClock {
    gateway: Arc<dyn ChainGateway>,
    settings: ClockSettings,
    round_rx: watch::Receiver<Option<Arc<RoundState>>>,
    status_tx: watch::Sender<ClockStatus>,
    events_tx: broadcast::Sender<ClockEvent>,
    now_fn: Box<dyn Fn() -> i64 + Send + Sync>,

    epoch_id: Option<u64>,
    end_unix_time: i64,
    ends_in: i64,
    duration: u64,
    phase: ClockPhase,
    last_observed_id: Option<u64>,
    captured_for: Option<u64>,
    secs_since_poll: u64,
    last_capture: Option<Arc<PreRolloverCapture>>,
}

impl EpochClock {
    pub fn new(
        gateway: Arc<dyn ChainGateway>,
        settings: ClockSettings,
        round_rx: watch::Receiver<Option<Arc<RoundState>>>,
    ) -> Self {
        Self::new_with_timestamp_fn(
            gateway,
            settings,
            round_rx,
            Box::new(|| chrono::Utc::now().timestamp()),
        )
    }

    /// Create a clock with a custom wall-clock source (for tests)
    pub fn new_with_timestamp_fn(
        gateway: Arc<dyn ChainGateway>,
        settings: ClockSettings,
        round_rx: watch::Receiver<Option<Arc<RoundState>>>,
        now_fn: Box<dyn Fn() -> i64 + Send + Sync>,
    ) -> Self {
        let (status_tx, _) = watch::channel(ClockStatus::default());
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            gateway,
            settings,
            round_rx,
            status_tx,
            events_tx,
            now_fn,
            epoch_id: None,
            end_unix_time: 0,
            ends_in: 0,
            duration: 0,
            phase: ClockPhase::Running,
            last_observed_id: None,
            captured_for: None,
            secs_since_poll: 0,
            last_capture: None,
        }
    }

    pub fn status(&self) -> watch::Receiver<ClockStatus> {
        self.status_tx.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClockEvent> {
        self.events_tx.subscribe()
    }

    pub fn ends_in(&self) -> i64 {
        self.ends_in
    }

    pub fn phase(&self) -> ClockPhase {
        self.phase
    }

    pub fn last_observed_id(&self) -> Option<u64> {
        self.last_observed_id
    }

    /// Initial read of epoch id, end time and duration
    pub async fn bootstrap(&mut self) -> Result<(), ChainError> {
        self.duration = self.gateway.epoch_duration().await?;
        self.reconcile().await?;

        log::info!("⏱️  Epoch clock started");
        log::info!("   ├─ Epoch: {}", self.epoch_id.unwrap_or_default());
        log::info!("   ├─ Ends in: {}s", self.ends_in);
        log::info!("   └─ Duration: {}s", self.duration);

        self.publish();
        Ok(())
    }

    /// Re-read the authoritative epoch id and end time
    async fn reconcile(&mut self) -> Result<(), ChainError> {
        let epoch_id = self.gateway.current_epoch_id().await?;
        let end_unix_time = self.gateway.current_epoch_end().await?;

        self.epoch_id = Some(epoch_id);
        self.end_unix_time = end_unix_time;
        self.ends_in = end_unix_time - (self.now_fn)();
        self.phase = ClockPhase::Running;

        self.observe_epoch_id(epoch_id);
        Ok(())
    }

    /// Track the authoritative id; fire `EpochAdvanced` on every increase
    ///
    /// The first observation only sets the baseline. Decreases are ignored.
    pub fn observe_epoch_id(&mut self, epoch_id: u64) -> Option<ClockEvent> {
        let previous = match self.last_observed_id {
            None => {
                self.last_observed_id = Some(epoch_id);
                return None;
            }
            Some(previous) => previous,
        };

        if epoch_id <= previous {
            if epoch_id < previous {
                log::warn!("⚠️  Epoch id went backwards ({} → {}), ignoring", previous, epoch_id);
            }
            return None;
        }

        if epoch_id > previous + 1 {
            log::warn!("⚠️  Epoch id skipped from {} to {}", previous, epoch_id);
        }

        self.last_observed_id = Some(epoch_id);
        let event = ClockEvent::EpochAdvanced {
            previous,
            current: epoch_id,
        };
        log::info!("🔔 Reward epoch advanced: {} → {}", previous, epoch_id);
        let _ = self.events_tx.send(event.clone());
        Some(event)
    }

    /// Read the expiring epoch's unclaimed rewards for every whitelisted address
    async fn capture(&mut self, epoch_id: u64) {
        let addresses: Vec<Address> = match self.round_rx.borrow().as_ref() {
            Some(round) => round.whitelist.addresses().cloned().collect(),
            None => {
                log::debug!("⏳ No round published yet, deferring pre-rollover capture for epoch {}", epoch_id);
                return;
            }
        };

        let mut unclaimed_reward = BTreeMap::new();
        for address in &addresses {
            match self.gateway.unclaimed_reward(address, epoch_id).await {
                Ok(amount) => {
                    unclaimed_reward.insert(address.clone(), amount);
                }
                Err(e) => log::warn!("⚠️  Pre-rollover read failed for {}: {}", address, e),
            }
        }

        log::info!(
            "📸 Pre-rollover capture for epoch {} ({}/{} providers)",
            epoch_id,
            unclaimed_reward.len(),
            addresses.len()
        );

        self.last_capture = Some(Arc::new(PreRolloverCapture {
            epoch_id,
            captured_at: (self.now_fn)(),
            unclaimed_reward,
        }));
        self.captured_for = Some(epoch_id);
        let _ = self.events_tx.send(ClockEvent::PreRollover { epoch_id });
    }

    async fn roll(&mut self) {
        self.phase = ClockPhase::Rolling;
        self.publish();

        match self.reconcile().await {
            Ok(()) => {
                let epoch_id = self.epoch_id.unwrap_or_default();
                if self.ends_in < 0 {
                    log::debug!("⏱️  Epoch {} end still in the past ({}s)", epoch_id, self.ends_in);
                } else {
                    log::info!("🔄 Countdown reconciled: epoch {} ends in {}s", epoch_id, self.ends_in);
                }
                let _ = self.events_tx.send(ClockEvent::Rolled {
                    epoch_id,
                    ends_in: self.ends_in,
                });
            }
            Err(e) => {
                log::warn!("⚠️  Rollover read failed, retrying next tick: {}", e);
            }
        }
        self.secs_since_poll = 0;
    }

    async fn poll_epoch_id(&mut self) {
        match self.gateway.current_epoch_id().await {
            Ok(epoch_id) => {
                if self.observe_epoch_id(epoch_id).is_some() {
                    // Countdown refers to an older epoch; pick up the new end time
                    if let Err(e) = self.reconcile().await {
                        log::warn!("⚠️  Failed to refresh countdown after epoch advance: {}", e);
                    }
                }
            }
            Err(e) => log::warn!("⚠️  Epoch id poll failed: {}", e),
        }
    }

    /// One second of clock time
    pub async fn tick(&mut self) {
        if let Some(epoch_id) = self.epoch_id {
            if self.ends_in < self.settings.capture_threshold_secs && self.captured_for != Some(epoch_id) {
                self.capture(epoch_id).await;
            }
        }

        if self.ends_in < 0 || self.phase == ClockPhase::Rolling {
            self.roll().await;
        } else {
            self.ends_in -= 1;
            self.secs_since_poll += 1;
            if self.secs_since_poll >= self.settings.epoch_poll_secs {
                self.secs_since_poll = 0;
                self.poll_epoch_id().await;
            }
        }

        self.publish();
    }

    fn publish(&self) {
        self.status_tx.send_replace(ClockStatus {
            epoch_id: self.epoch_id,
            ends_in: self.ends_in,
            end_unix_time: self.end_unix_time,
            duration: self.duration,
            phase: self.phase,
            last_capture: self.last_capture.clone(),
        });
    }

    /// Tick once per second forever
    pub async fn run(mut self) {
        let mut timer = interval(Duration::from_secs(1));
        loop {
            timer.tick().await;
            self.tick().await;
        }
    }
}
