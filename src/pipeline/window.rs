//! Bounded per-symbol window of classified price records
//!
//! Epochs are keyed by id; once more than `capacity` epochs are held the
//! lowest ids are evicted first. The window never assumes ids are contiguous.

use super::types::{Address, PriceRecord, Symbol};
use std::collections::BTreeMap;

/// Price epochs retained per symbol
pub const DEFAULT_WINDOW_CAPACITY: usize = 120;

#[derive(Debug, Clone)]
pub struct SlidingWindow {
    symbol: Symbol,
    capacity: usize,
    epochs: BTreeMap<u64, BTreeMap<Address, PriceRecord>>,
}

impl SlidingWindow {
    pub fn new(symbol: &str, capacity: usize) -> Self {
        Self {
            symbol: symbol.to_string(),
            capacity: capacity.max(1),
            epochs: BTreeMap::new(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Insert or overwrite a record, then evict down to capacity
    ///
    /// Returns the evicted epoch ids, oldest first.
    pub fn upsert(&mut self, record: PriceRecord) -> Vec<u64> {
        self.epochs
            .entry(record.epoch_id)
            .or_default()
            .insert(record.address.clone(), record);
        self.evict_overflow()
    }

    fn evict_overflow(&mut self) -> Vec<u64> {
        let mut evicted = Vec::new();
        while self.epochs.len() > self.capacity {
            match self.epochs.pop_first() {
                Some((epoch_id, _)) => evicted.push(epoch_id),
                None => break,
            }
        }
        evicted
    }

    /// Number of epochs held
    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    pub fn epoch_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.epochs.keys().copied()
    }

    pub fn get(&self, epoch_id: u64, address: &str) -> Option<&PriceRecord> {
        self.epochs.get(&epoch_id).and_then(|records| records.get(address))
    }

    /// Sum of classification values for one provider across the window
    pub fn classification_sum(&self, address: &str) -> f64 {
        self.epochs
            .values()
            .filter_map(|records| records.get(address))
            .map(|record| record.classification.value())
            .sum()
    }

    /// Number of epochs in which the provider submitted a price
    pub fn priced_count(&self, address: &str) -> usize {
        self.epochs
            .values()
            .filter_map(|records| records.get(address))
            .filter(|record| record.has_price())
            .count()
    }
}
