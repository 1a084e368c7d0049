//! # Epoch-Synchronized Metrics Pipeline
//!
//! Tracks reward-epoch boundaries, records per-symbol price finalizations
//! into bounded sliding windows, aggregates them into per-provider metrics
//! and claims rewards for opted-in accounts once per epoch transition.
//!
//! ## Architecture
//!
//! ```text
//! PriceFinalized(symbol)
//!     ↓
//! PriceEventRecorder::record()  → price_records (≤ window capacity epochs)
//!     ↓
//! RoundPipeline::run_round()    → epoch_snapshots
//!     ↓
//! RoundState (watch)            → SnapshotHandle / providers.json
//!
//! EpochClock ── EpochAdvanced ──→ AutoClaimDispatcher → autoClaim(owners, epoch − 1)
//! ```
//!
//! **Key Principle:** the round loop owns all derived state and publishes it
//! wholesale. Nothing outside it patches a published round.
//!
//! ## Module Organization
//!
//! - `types` - Core data structures (PriceRecord, Whitelist, ProviderMetrics)
//! - `window` - Per-symbol sliding window
//! - `db` - Record store traits and the SQLite implementation
//! - `recorder` / `ingestion` - Finalization classification and listeners
//! - `clock` - Epoch countdown and transition events
//! - `aggregator` / `snapshot` - Window statistics and reward rates
//! - `dispatcher` / `subscriptions` - Auto-claim
//! - `directory` / `provider_info` - Served snapshot
//! - `round` / `scheduler` / `engine` - Round loop and task wiring

pub mod types;
pub mod window;
pub mod db;
pub mod recorder;
pub mod ingestion;
pub mod clock;
pub mod aggregator;
pub mod snapshot;
pub mod dispatcher;
pub mod subscriptions;
pub mod directory;
pub mod provider_info;
pub mod round;
pub mod scheduler;
pub mod engine;

// Re-export commonly used types
pub use types::{Classification, PriceRecord, ProviderMetrics, RewardRate, Whitelist};
pub use window::{SlidingWindow, DEFAULT_WINDOW_CAPACITY};
pub use db::{PriceRecordStore, SnapshotRepository, SqliteStore, SubscriberRepository};
pub use clock::{ClockEvent, ClockStatus, EpochClock};
pub use dispatcher::AutoClaimDispatcher;
pub use subscriptions::{SubscriptionError, SubscriptionService};
pub use directory::{HttpProviderDirectory, ProviderDirectory};
pub use provider_info::{ProviderInfo, ServedSnapshot, SnapshotHandle};
pub use round::{RoundPipeline, RoundState};
pub use engine::{EngineSettings, MonitorEngine, RunningMonitor};
