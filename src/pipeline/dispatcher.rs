//! AutoClaimDispatcher: one batched claim per epoch transition
//!
//! On `EpochAdvanced { current }` the dispatcher claims epoch `current - 1`
//! for every subscriber that still authorizes the configured executor, the
//! account that signs the batch. Subscribers whose authorization was revoked
//! are deleted. Subscribers registered for a different executor stay stored
//! but never join this executor's batch. A subscriber whose authorization
//! could not be read stays stored but is left out of this batch. A failed
//! claim is logged and not retried for that epoch.

use super::clock::ClockEvent;
use super::db::SubscriberRepository;
use super::types::Address;
use crate::chain::ChainGateway;
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub epoch_id: u64,
    pub claimed: Vec<Address>,
    pub pruned: Vec<Address>,
    pub deferred: Vec<Address>,
    /// Registered for another executor
    pub foreign: Vec<Address>,
    pub tx_hash: Option<String>,
    pub error: Option<String>,
}

pub struct AutoClaimDispatcher {
    gateway: Arc<dyn ChainGateway>,
    subscribers: Arc<dyn SubscriberRepository>,
    executor: Address,
    last_dispatched: Option<u64>,
}

impl AutoClaimDispatcher {
    pub fn new(
        gateway: Arc<dyn ChainGateway>,
        subscribers: Arc<dyn SubscriberRepository>,
        executor: &str,
    ) -> Self {
        Self {
            gateway,
            subscribers,
            executor: executor.to_lowercase(),
            last_dispatched: None,
        }
    }

    pub fn executor(&self) -> &str {
        &self.executor
    }

    pub fn last_dispatched(&self) -> Option<u64> {
        self.last_dispatched
    }

    /// Claim the epoch that just closed, at most once per epoch id
    pub async fn on_epoch_advanced(&mut self, current_epoch: u64) -> Option<DispatchReport> {
        let claim_epoch = current_epoch.checked_sub(1)?;

        if self.last_dispatched.is_some_and(|last| last >= claim_epoch) {
            log::debug!("⏭️  Epoch {} already dispatched", claim_epoch);
            return None;
        }

        self.last_dispatched = Some(claim_epoch);
        Some(self.dispatch(claim_epoch).await)
    }

    /// Verify authorizations and submit one batched claim for `claim_epoch`
    pub async fn dispatch(&self, claim_epoch: u64) -> DispatchReport {
        let mut report = DispatchReport {
            epoch_id: claim_epoch,
            ..Default::default()
        };

        let subscribers = match self.subscribers.list_subscribers().await {
            Ok(subscribers) => subscribers,
            Err(e) => {
                log::error!("❌ Auto-claim: failed to load subscribers: {}", e);
                report.error = Some(e.to_string());
                return report;
            }
        };

        log::info!("🤖 Auto-claim for epoch {} ({} subscribers)", claim_epoch, subscribers.len());

        for subscriber in subscribers {
            if !subscriber.executor.eq_ignore_ascii_case(&self.executor) {
                log::debug!(
                    "   ├─ ⏭️  {} registered for executor {}, skipping",
                    subscriber.address,
                    subscriber.executor
                );
                report.foreign.push(subscriber.address);
                continue;
            }

            match self.gateway.claim_executors(&subscriber.address).await {
                Ok(executors) if executors.iter().any(|e| e.eq_ignore_ascii_case(&self.executor)) => {
                    report.claimed.push(subscriber.address);
                }
                Ok(_) => {
                    log::info!("   ├─ 🚫 Executor revoked for {}, removing", subscriber.address);
                    match self.subscribers.remove_subscriber(&subscriber.address).await {
                        Ok(_) => report.pruned.push(subscriber.address),
                        Err(e) => {
                            log::warn!("   ├─ ⚠️  Failed to remove {}: {}", subscriber.address, e);
                            report.deferred.push(subscriber.address);
                        }
                    }
                }
                Err(e) => {
                    log::warn!("   ├─ ⚠️  Authorization check failed for {}: {}", subscriber.address, e);
                    report.deferred.push(subscriber.address);
                }
            }
        }

        if report.claimed.is_empty() {
            log::info!("   └─ No eligible subscribers");
            return report;
        }

        match self.gateway.submit_auto_claim(&report.claimed, claim_epoch).await {
            Ok(tx_hash) => {
                log::info!("   └─ ✅ Claimed {} accounts: {}", report.claimed.len(), tx_hash);
                report.tx_hash = Some(tx_hash);
            }
            Err(e) => {
                log::error!("   └─ ❌ Auto-claim transaction failed: {}", e);
                report.error = Some(e.to_string());
            }
        }

        report
    }

    /// Dispatch on every `EpochAdvanced` until the clock goes away
    pub async fn run(mut self, mut events: broadcast::Receiver<ClockEvent>) {
        log::info!("🤖 Auto-claim dispatcher listening for epoch transitions");

        loop {
            match events.recv().await {
                Ok(ClockEvent::EpochAdvanced { current, .. }) => {
                    self.on_epoch_advanced(current).await;
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("⚠️  Dispatcher lagged behind clock by {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    log::warn!("⚠️  Clock event channel closed, dispatcher stopping");
                    break;
                }
            }
        }
    }
}
