//! Capped exponential backoff with full jitter
//!
//! Used by the round loop, the gateway connector and the per-symbol listeners.
//! There is no retry limit: after startup nothing in the monitor gives up.

use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    current_attempt: u32,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial_delay: initial,
            max_delay: max.max(initial),
            current_attempt: 0,
        }
    }

    pub fn from_millis(initial_ms: u64, max_ms: u64) -> Self {
        Self::new(Duration::from_millis(initial_ms), Duration::from_millis(max_ms))
    }

    pub fn attempt(&self) -> u32 {
        self.current_attempt
    }

    /// Upper bound for the next delay: `initial * 2^attempt`, capped
    pub fn ceiling(&self) -> Duration {
        let factor = 2u32.saturating_pow(self.current_attempt.min(31));
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Draw the next delay uniformly from `[0, ceiling]` and advance
    pub fn next_delay(&mut self) -> Duration {
        let ceiling = self.ceiling();
        let ceiling_ms = ceiling.as_millis() as u64;
        let delay = Duration::from_millis(rand::thread_rng().gen_range(0..=ceiling_ms));
        self.current_attempt = self.current_attempt.saturating_add(1);
        delay
    }

    pub async fn sleep(&mut self) {
        let delay = self.next_delay();

        log::warn!(
            "⏳ Retry attempt {} in {:.1}s",
            self.current_attempt,
            delay.as_secs_f64()
        );

        sleep(delay).await;
    }

    pub fn reset(&mut self) {
        self.current_attempt = 0;
    }
}
