//! PriceEventRecorder: classify finalized prices and append to the window

use super::db::{PriceRecordStore, StoreError};
use super::types::{Address, PriceRecord, Symbol};
use crate::chain::{ChainGateway, PriceFinalized};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

/// Summary of one recorded finalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOutcome {
    pub symbol: Symbol,
    pub epoch_id: u64,
    pub recorded: usize,
    pub priced: usize,
    /// Providers whose submitted-price read failed (recorded as no price)
    pub failed_reads: usize,
    pub evicted: Vec<u64>,
}

pub struct PriceEventRecorder {
    gateway: Arc<dyn ChainGateway>,
    store: Arc<dyn PriceRecordStore>,
    capacity: usize,
    symbol_locks: std::sync::Mutex<HashMap<Symbol, Arc<AsyncMutex<()>>>>,
}

impl PriceEventRecorder {
    pub fn new(gateway: Arc<dyn ChainGateway>, store: Arc<dyn PriceRecordStore>, capacity: usize) -> Self {
        Self {
            gateway,
            store,
            capacity,
            symbol_locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Writes for one symbol are serialized; symbols are independent
    fn symbol_lock(&self, symbol: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self
            .symbol_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry(symbol.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Read each provider's submission and classify it against the event's band
    pub async fn classify(
        &self,
        symbol: &str,
        event: &PriceFinalized,
        providers: &[Address],
    ) -> (Vec<PriceRecord>, usize) {
        let mut records = Vec::with_capacity(providers.len());
        let mut failed_reads = 0;

        for address in providers {
            let submitted = match self.gateway.submitted_price(symbol, event.epoch_id, address).await {
                Ok(price) => Some(price),
                Err(e) => {
                    failed_reads += 1;
                    log::warn!(
                        "⚠️  [{}] no epoch price for {} in epoch {}: {}",
                        symbol,
                        address,
                        event.epoch_id,
                        e
                    );
                    None
                }
            };

            records.push(PriceRecord::from_event(address, submitted, event));
        }

        (records, failed_reads)
    }

    /// Classify every provider for `event` and store the epoch
    pub async fn record(
        &self,
        symbol: &str,
        event: &PriceFinalized,
        providers: &[Address],
    ) -> Result<RecordOutcome, StoreError> {
        let lock = self.symbol_lock(symbol);
        let _guard = lock.lock().await;

        let (records, failed_reads) = self.classify(symbol, event, providers).await;
        let priced = records.iter().filter(|r| r.has_price()).count();

        let evicted = self
            .store
            .upsert_epoch_records(symbol, event.epoch_id, &records, self.capacity)
            .await?;

        if !evicted.is_empty() {
            log::debug!("🧹 [{}] evicted epochs {:?}", symbol, evicted);
        }

        Ok(RecordOutcome {
            symbol: symbol.to_string(),
            epoch_id: event.epoch_id,
            recorded: records.len(),
            priced,
            failed_reads,
            evicted,
        })
    }
}
