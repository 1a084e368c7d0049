//! SnapshotStore: period-over-period reward figures
//!
//! Each round upserts its reward figures under the current epoch id. The
//! next epoch's rounds read them back to compute the previous reward rate.

use super::aggregator::reward_rate;
use super::db::{SnapshotRepository, StoreError};
use super::types::{Address, EpochSnapshot, ProviderMetrics, RewardRate};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Build the end-of-round snapshot from this round's metrics
///
/// Vote power is the locked (epoch vote-power block) figure; addresses whose
/// locked read failed are left out.
pub fn snapshot_from_metrics(epoch_id: u64, metrics: &BTreeMap<Address, ProviderMetrics>) -> EpochSnapshot {
    let mut snapshot = EpochSnapshot {
        epoch_id,
        ..Default::default()
    };

    for (address, m) in metrics {
        snapshot.current_epoch_reward.insert(address.clone(), m.current_epoch_reward);
        snapshot.total_epoch_reward.insert(address.clone(), m.total_epoch_reward);
        if let Some(locked) = m.locked_vote_power {
            snapshot.vote_power.insert(address.clone(), locked);
        }
    }

    snapshot
}

pub struct SnapshotStore {
    repository: Arc<dyn SnapshotRepository>,
}

impl SnapshotStore {
    pub fn new(repository: Arc<dyn SnapshotRepository>) -> Self {
        Self { repository }
    }

    /// Idempotent upsert keyed by epoch id
    pub async fn persist(&self, snapshot: &EpochSnapshot) -> Result<(), StoreError> {
        self.repository.upsert_snapshot(snapshot).await?;
        log::debug!(
            "💾 Snapshot saved for epoch {} ({} providers)",
            snapshot.epoch_id,
            snapshot.total_epoch_reward.len()
        );
        Ok(())
    }

    /// Snapshot of the epoch before `epoch_id`, if one was recorded
    pub async fn previous(&self, epoch_id: u64) -> Result<Option<EpochSnapshot>, StoreError> {
        match epoch_id.checked_sub(1) {
            Some(previous) => self.repository.get_snapshot(previous).await,
            None => Ok(None),
        }
    }

    /// Previous-epoch reward rate per address
    ///
    /// Every address gets `N/A` when the previous snapshot is missing or
    /// cannot be read; the round carries on either way.
    pub async fn previous_reward_rates<'a, I>(&self, epoch_id: u64, addresses: I) -> BTreeMap<Address, RewardRate>
    where
        I: IntoIterator<Item = &'a Address>,
    {
        let previous = match self.previous(epoch_id).await {
            Ok(Some(snapshot)) => Some(snapshot),
            Ok(None) => {
                log::info!("ℹ️  No snapshot for epoch {}, previous reward rates N/A", epoch_id.saturating_sub(1));
                None
            }
            Err(e) => {
                log::warn!("⚠️  Failed to read previous snapshot: {}", e);
                None
            }
        };

        addresses
            .into_iter()
            .map(|address| {
                let rate = match &previous {
                    Some(snapshot) => reward_rate(
                        snapshot.total_epoch_reward.get(address).copied(),
                        snapshot.current_epoch_reward.get(address).copied(),
                        snapshot.vote_power.get(address).copied(),
                    ),
                    None => RewardRate::NotAvailable,
                };
                (address.clone(), rate)
            })
            .collect()
    }
}
