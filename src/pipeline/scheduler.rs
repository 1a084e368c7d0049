//! Round loop
//!
//! Rounds run back to back. A completed round is published on the round
//! channel and written to the snapshot file; a failed round leaves the last
//! published state in place and restarts after a backoff delay.

use super::round::{RoundError, RoundPipeline, RoundState};
use crate::backoff::ExponentialBackoff;
use crate::persistence::save_served_snapshot;
use std::sync::Arc;
use tokio::sync::watch;

/// Run one round and publish it
pub async fn run_round_once(
    pipeline: &RoundPipeline,
    round_tx: &watch::Sender<Option<Arc<RoundState>>>,
    snapshot_path: Option<&str>,
) -> Result<Arc<RoundState>, RoundError> {
    let round = Arc::new(pipeline.run_round().await?);
    round_tx.send_replace(Some(round.clone()));

    if let Some(path) = snapshot_path {
        if let Err(e) = save_served_snapshot(&round.served, path) {
            log::warn!("⚠️  Failed to write snapshot file {}: {}", path, e);
        }
    }

    Ok(round)
}

/// Round loop task
///
/// Runs indefinitely; no error stops it.
pub async fn round_loop_task(
    pipeline: RoundPipeline,
    round_tx: watch::Sender<Option<Arc<RoundState>>>,
    snapshot_path: Option<String>,
    mut backoff: ExponentialBackoff,
) {
    log::info!("🔁 Starting round loop");

    loop {
        match run_round_once(&pipeline, &round_tx, snapshot_path.as_deref()).await {
            Ok(_) => {
                backoff.reset();
                tokio::task::yield_now().await;
            }
            Err(e) => {
                log::error!("❌ Round failed: {}", e);
                backoff.sleep().await;
            }
        }
    }
}
