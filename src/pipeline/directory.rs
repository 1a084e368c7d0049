//! External provider directory
//!
//! Descriptive metadata (name, description, url, logo) for FTSO providers
//! comes from a public provider list:
//!
//! ```json
//! { "providers": [ { "chainId": 19, "name": "...", "description": "...",
//!                    "url": "...", "address": "0x...", "logoURI": "...",
//!                    "listed": true } ] }
//! ```
//!
//! A failed fetch falls back to the last list that loaded successfully.

use super::types::Address;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    #[serde(rename = "chainId")]
    pub chain_id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
    pub address: String,
    #[serde(rename = "logoURI", default)]
    pub logo_uri: String,
    #[serde(default)]
    pub listed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DirectoryDocument {
    providers: Vec<DirectoryEntry>,
}

/// Entries for one chain keyed by lower-cased address
pub type DirectoryIndex = HashMap<Address, DirectoryEntry>;

/// Parse a provider list and keep the entries for `chain_id`
pub fn parse_directory(raw: &str, chain_id: u64) -> Result<DirectoryIndex, serde_json::Error> {
    let document: DirectoryDocument = serde_json::from_str(raw)?;
    Ok(index_entries(document.providers, chain_id))
}

fn index_entries(entries: Vec<DirectoryEntry>, chain_id: u64) -> DirectoryIndex {
    entries
        .into_iter()
        .filter(|entry| entry.chain_id == chain_id)
        .map(|entry| (entry.address.to_lowercase(), entry))
        .collect()
}

#[async_trait]
pub trait ProviderDirectory: Send + Sync {
    async fn fetch(&self, chain_id: u64) -> Result<DirectoryIndex, Box<dyn std::error::Error + Send + Sync>>;
}

/// Directory fetched over HTTP
pub struct HttpProviderDirectory {
    client: reqwest::Client,
    url: String,
}

impl HttpProviderDirectory {
    pub fn new(url: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl ProviderDirectory for HttpProviderDirectory {
    async fn fetch(&self, chain_id: u64) -> Result<DirectoryIndex, Box<dyn std::error::Error + Send + Sync>> {
        let response = self.client.get(&self.url).send().await?;

        if !response.status().is_success() {
            return Err(format!("Provider directory error: {}", response.status()).into());
        }

        let document: DirectoryDocument = response.json().await?;
        Ok(index_entries(document.providers, chain_id))
    }
}

/// Wraps a directory and serves the last good result when a fetch fails
pub struct CachedDirectory {
    inner: Box<dyn ProviderDirectory>,
    chain_id: u64,
    last_good: RwLock<DirectoryIndex>,
}

impl CachedDirectory {
    pub fn new(inner: Box<dyn ProviderDirectory>, chain_id: u64) -> Self {
        Self {
            inner,
            chain_id,
            last_good: RwLock::new(HashMap::new()),
        }
    }

    pub async fn load(&self) -> DirectoryIndex {
        match self.inner.fetch(self.chain_id).await {
            Ok(index) => {
                log::debug!("📇 Provider directory loaded ({} entries)", index.len());
                *self.last_good.write().await = index.clone();
                index
            }
            Err(e) => {
                let cached = self.last_good.read().await.clone();
                log::warn!(
                    "⚠️  Provider directory fetch failed, using cached list ({} entries): {}",
                    cached.len(),
                    e
                );
                cached
            }
        }
    }
}
