//! Auto-claim subscription operations
//!
//! Every operation is keyed by the lower-cased owner address and is
//! idempotent: opting in twice keeps the original record, opting out of an
//! unknown address is a no-op.

use super::db::{StoreError, SubscriberRepository};
use super::types::{Address, AutoClaimSubscriber};
use crate::chain::normalize_address;
use std::fmt;
use std::sync::Arc;

#[derive(Debug)]
pub enum SubscriptionError {
    InvalidAddress(String),
    /// `opt_in` needs a configured executor
    ExecutorNotConfigured,
    Store(StoreError),
}

impl fmt::Display for SubscriptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionError::InvalidAddress(raw) => write!(f, "Invalid address: {}", raw),
            SubscriptionError::ExecutorNotConfigured => write!(f, "No claim executor configured"),
            SubscriptionError::Store(e) => write!(f, "Subscription store error: {}", e),
        }
    }
}

impl std::error::Error for SubscriptionError {}

impl From<StoreError> for SubscriptionError {
    fn from(err: StoreError) -> Self {
        SubscriptionError::Store(err)
    }
}

fn parse_address(raw: &str) -> Result<Address, SubscriptionError> {
    normalize_address(raw).ok_or_else(|| SubscriptionError::InvalidAddress(raw.to_string()))
}

#[derive(Clone)]
pub struct SubscriptionService {
    repository: Arc<dyn SubscriberRepository>,
    executor: Option<Address>,
}

impl SubscriptionService {
    pub fn new(repository: Arc<dyn SubscriberRepository>, executor: Option<Address>) -> Self {
        Self { repository, executor }
    }

    pub fn executor(&self) -> Option<&str> {
        self.executor.as_deref()
    }

    /// Subscribe `address` with the configured executor
    pub async fn opt_in(&self, address: &str) -> Result<AutoClaimSubscriber, SubscriptionError> {
        let executor = self
            .executor
            .clone()
            .ok_or(SubscriptionError::ExecutorNotConfigured)?;
        self.register_address(address, &executor).await
    }

    /// Subscribe `address` with an explicit executor
    pub async fn register_address(&self, address: &str, executor: &str) -> Result<AutoClaimSubscriber, SubscriptionError> {
        let address = parse_address(address)?;
        let executor = parse_address(executor)?;

        self.repository
            .upsert_subscriber(&AutoClaimSubscriber {
                address: address.clone(),
                executor,
                created_at: chrono::Utc::now().timestamp(),
            })
            .await?;

        let stored = self
            .repository
            .get_subscriber(&address)
            .await?
            .ok_or_else(|| SubscriptionError::Store(format!("subscriber {} missing after upsert", address).into()))?;

        log::info!("✅ Auto-claim subscriber {} (executor {})", stored.address, stored.executor);
        Ok(stored)
    }

    /// Remove `address`; returns whether it was subscribed
    pub async fn opt_out(&self, address: &str) -> Result<bool, SubscriptionError> {
        let address = parse_address(address)?;
        let removed = self.repository.remove_subscriber(&address).await?;

        if removed {
            log::info!("👋 Auto-claim subscriber {} removed", address);
        } else {
            log::debug!("Auto-claim opt-out for unknown address {}", address);
        }
        Ok(removed)
    }

    pub async fn list(&self) -> Result<Vec<AutoClaimSubscriber>, SubscriptionError> {
        Ok(self.repository.list_subscribers().await?)
    }
}
