pub mod backoff;
pub mod chain;
pub mod config;
pub mod persistence;
pub mod pipeline;
pub mod units;
