//! Per-symbol finalization listeners
//!
//! One task per watched symbol pulls `PriceFinalized` events from the gateway
//! and hands them to the recorder together with the latest round's whitelist.
//! A closed stream is re-opened after a backoff delay.

use super::recorder::{PriceEventRecorder, RecordOutcome};
use super::round::RoundState;
use crate::backoff::ExponentialBackoff;
use crate::chain::{ChainGateway, PriceFinalized};
use std::sync::Arc;
use tokio::sync::watch;

/// Record one event against the whitelist of the latest completed round
///
/// Returns `None` when no round has completed yet or the store write failed.
pub async fn handle_event(
    symbol: &str,
    event: &PriceFinalized,
    recorder: &PriceEventRecorder,
    round: Option<Arc<RoundState>>,
) -> Option<RecordOutcome> {
    let Some(round) = round else {
        log::debug!("⏭️  [{}] epoch {} skipped: no whitelist yet", symbol, event.epoch_id);
        return None;
    };

    let providers = round.whitelist.providers_for(symbol);

    match recorder.record(symbol, event, &providers).await {
        Ok(outcome) => {
            log::info!(
                "💲 [{}] price finalized for epoch {} ({}/{} providers priced)",
                symbol,
                outcome.epoch_id,
                outcome.priced,
                outcome.recorded
            );
            Some(outcome)
        }
        Err(e) => {
            log::error!("❌ [{}] failed to record epoch {}: {}", symbol, event.epoch_id, e);
            None
        }
    }
}

/// Run the listener for one symbol until the process exits
pub async fn run_symbol_listener(
    symbol: String,
    gateway: Arc<dyn ChainGateway>,
    recorder: Arc<PriceEventRecorder>,
    round_rx: watch::Receiver<Option<Arc<RoundState>>>,
    mut backoff: ExponentialBackoff,
) {
    log::info!("👂 Starting finalization listener for {}", symbol);

    loop {
        let mut events = match gateway.price_finalized_stream(&symbol).await {
            Ok(events) => {
                backoff.reset();
                events
            }
            Err(e) => {
                log::warn!("⚠️  [{}] failed to subscribe to PriceFinalized: {}", symbol, e);
                backoff.sleep().await;
                continue;
            }
        };

        while let Some(event) = events.recv().await {
            let round = round_rx.borrow().clone();
            handle_event(&symbol, &event, &recorder, round).await;
        }

        log::warn!("⚠️  [{}] finalization stream closed, resubscribing", symbol);
        backoff.sleep().await;
    }
}
