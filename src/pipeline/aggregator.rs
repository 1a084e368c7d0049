//! MetricsAggregator: window statistics and reward rates
//!
//! Pure functions over the sliding windows and chain reads of one round.
//!
//! - success rate: mean over watched symbols of `(Σ classification / capacity) × 100`
//! - availability: mean over watched symbols of `(epochs with a price / capacity) × 100`
//! - reward rate: `((total − current) / vote power) × 100` on whole units
//!
//! The divisor is the window capacity, not the number of epochs held, so a
//! freshly started monitor reports rates that climb as the window fills.

use super::types::{Address, RewardRate, Symbol, Wei, Whitelist};
use super::window::SlidingWindow;
use crate::units::{round_to, to_whole_units};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowRates {
    pub success_rate: f64,
    pub availability_rate: f64,
}

pub struct MetricsAggregator {
    symbols: Vec<Symbol>,
    capacity: usize,
}

impl MetricsAggregator {
    pub fn new(symbols: Vec<Symbol>, capacity: usize) -> Self {
        Self {
            symbols,
            capacity: capacity.max(1),
        }
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// Success and availability for one provider, rounded to two decimals
    ///
    /// A symbol with no window contributes 0 to both means.
    pub fn window_rates(&self, address: &str, windows: &HashMap<Symbol, SlidingWindow>) -> WindowRates {
        if self.symbols.is_empty() {
            return WindowRates {
                success_rate: 0.0,
                availability_rate: 0.0,
            };
        }

        let capacity = self.capacity as f64;
        let mut success_sum = 0.0;
        let mut availability_sum = 0.0;

        for symbol in &self.symbols {
            if let Some(window) = windows.get(symbol) {
                success_sum += (window.classification_sum(address) / capacity) * 100.0;
                availability_sum += (window.priced_count(address) as f64 / capacity) * 100.0;
            }
        }

        let count = self.symbols.len() as f64;
        WindowRates {
            success_rate: round_to((success_sum / count).clamp(0.0, 100.0), 2),
            availability_rate: round_to((availability_sum / count).clamp(0.0, 100.0), 2),
        }
    }

    /// Rates for every whitelisted address
    pub fn compute_rates(
        &self,
        whitelist: &Whitelist,
        windows: &HashMap<Symbol, SlidingWindow>,
    ) -> BTreeMap<Address, WindowRates> {
        whitelist
            .addresses()
            .map(|address| (address.clone(), self.window_rates(address, windows)))
            .collect()
    }
}

/// Reward earned per unit of vote power over the period, in percent
///
/// Operands are converted to whole units before dividing. `N/A` when any
/// operand is missing or the vote power rounds to zero.
pub fn reward_rate(total_reward: Option<Wei>, current_reward: Option<Wei>, vote_power: Option<Wei>) -> RewardRate {
    let (Some(total), Some(current), Some(vote_power)) = (total_reward, current_reward, vote_power) else {
        return RewardRate::NotAvailable;
    };

    let vote_power = to_whole_units(vote_power);
    if vote_power == 0 {
        return RewardRate::NotAvailable;
    }

    let earned = to_whole_units(total) as f64 - to_whole_units(current) as f64;
    let rate = (earned / vote_power as f64) * 100.0;

    if !rate.is_finite() {
        return RewardRate::NotAvailable;
    }

    RewardRate::Rate(round_to(rate, 4))
}
