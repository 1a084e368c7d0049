//! Monitor configuration from environment variables
//!
//! One process monitors one network. Everything here is fixed for the life of
//! the process; the watched-symbol set in particular is configuration, not
//! runtime state.

use crate::chain::normalize_address;
use std::env;
use std::str::FromStr;

/// Default PriceSubmitter address (same genesis address on Flare and Songbird)
pub const DEFAULT_SUBMITTER_ADDRESS: &str = "0x1000000000000000000000000000000000000003";

/// Default provider directory (Bifrost wallet provider list)
pub const DEFAULT_DIRECTORY_URL: &str =
    "https://raw.githubusercontent.com/TowoLabs/ftso-signal-providers/master/bifrost-wallet.providerlist.json";

/// Symbols shared by both networks; the native symbol is prepended per network
const SHARED_SYMBOLS: [&str; 17] = [
    "XRP", "LTC", "XLM", "DOGE", "ADA", "ALGO", "BTC", "ETH", "FIL", "ARB", "AVAX", "BNB", "MATIC",
    "SOL", "USDC", "USDT", "XDC",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Flare,
    Songbird,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Flare => "flare",
            Network::Songbird => "songbird",
        }
    }

    /// Chain id used to match entries in the provider directory
    pub fn chain_id(&self) -> u64 {
        match self {
            Network::Flare => 14,
            Network::Songbird => 19,
        }
    }

    pub fn native_symbol(&self) -> &'static str {
        match self {
            Network::Flare => "FLR",
            Network::Songbird => "SGB",
        }
    }

    pub fn default_symbols(&self) -> Vec<String> {
        std::iter::once(self.native_symbol())
            .chain(SHARED_SYMBOLS)
            .map(str::to_string)
            .collect()
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "flare" | "flr" => Some(Network::Flare),
            "songbird" | "sgb" => Some(Network::Songbird),
            _ => None,
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub enum ConfigError {
    MissingVariable(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingVariable(var) => write!(f, "Missing environment variable: {}", var),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Configuration for the monitor runtime
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub network: Network,

    /// JSON-RPC endpoint for read calls and log polling
    pub rpc_url: String,

    /// Endpoint accepting `eth_sendTransaction` for the executor account
    pub signer_url: String,

    pub submitter_address: String,

    /// Claim executor; auto-claim is disabled when unset
    pub executor_address: Option<String>,

    pub db_path: String,
    pub schema_dir: String,

    /// Where the served snapshot JSON is written after each round
    pub snapshot_path: String,

    pub directory_url: String,
    pub watched_symbols: Vec<String>,

    /// Epochs retained per symbol (also the rate divisor)
    pub window_capacity: usize,

    /// Seconds before epoch end at which the pre-rollover capture runs
    pub capture_threshold_secs: i64,

    /// Interval between authoritative epoch-id polls
    pub epoch_poll_secs: u64,

    pub event_poll_interval_ms: u64,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
}

impl MonitorConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `NETWORK` (default: songbird)
    /// - `RPC_URL` (required)
    /// - `SIGNER_URL` (default: RPC_URL)
    /// - `SUBMITTER_CONTRACT_ADDRESS` (default: 0x1000…0003)
    /// - `EXECUTOR_ADDRESS` (optional)
    /// - `FTSOFLOW_DB_PATH` (default: ftsoflow.db)
    /// - `SCHEMA_DIR` (default: sql)
    /// - `SNAPSHOT_PATH` (default: providers.json)
    /// - `PROVIDER_DIRECTORY_URL` (default: Bifrost provider list)
    /// - `WATCHED_SYMBOLS` (default: network symbol list)
    /// - `WINDOW_CAPACITY` (default: 120)
    /// - `CAPTURE_THRESHOLD_SECS` (default: 60)
    /// - `EPOCH_POLL_SECS` (default: 5)
    /// - `EVENT_POLL_INTERVAL_MS` (default: 3000)
    /// - `BACKOFF_INITIAL_MS` (default: 1000)
    /// - `BACKOFF_MAX_MS` (default: 60000)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let network = match lookup("NETWORK") {
            Some(raw) => Network::from_str(&raw).ok_or_else(|| {
                ConfigError::InvalidValue(format!("NETWORK must be flare or songbird, got '{}'", raw))
            })?,
            None => Network::Songbird,
        };

        let rpc_url = lookup("RPC_URL").ok_or_else(|| ConfigError::MissingVariable("RPC_URL".to_string()))?;
        if !rpc_url.starts_with("http://") && !rpc_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "RPC_URL must start with http:// or https://".to_string(),
            ));
        }

        let signer_url = lookup("SIGNER_URL").unwrap_or_else(|| rpc_url.clone());

        let submitter_raw = lookup("SUBMITTER_CONTRACT_ADDRESS")
            .unwrap_or_else(|| DEFAULT_SUBMITTER_ADDRESS.to_string());
        let submitter_address = normalize_address(&submitter_raw).ok_or_else(|| {
            ConfigError::InvalidValue(format!("SUBMITTER_CONTRACT_ADDRESS is not an address: {}", submitter_raw))
        })?;

        let executor_address = match lookup("EXECUTOR_ADDRESS") {
            Some(raw) if !raw.trim().is_empty() => Some(normalize_address(&raw).ok_or_else(|| {
                ConfigError::InvalidValue(format!("EXECUTOR_ADDRESS is not an address: {}", raw))
            })?),
            _ => None,
        };

        let watched_symbols = lookup("WATCHED_SYMBOLS")
            .map(|s| {
                s.split(',')
                    .map(|sym| sym.trim().to_uppercase())
                    .filter(|sym| !sym.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|symbols| !symbols.is_empty())
            .unwrap_or_else(|| network.default_symbols());

        let window_capacity: usize = parse_or(&lookup, "WINDOW_CAPACITY", 120)?;
        if window_capacity == 0 {
            return Err(ConfigError::InvalidValue("WINDOW_CAPACITY must be positive".to_string()));
        }

        Ok(Self {
            network,
            rpc_url,
            signer_url,
            submitter_address,
            executor_address,
            db_path: lookup("FTSOFLOW_DB_PATH").unwrap_or_else(|| "ftsoflow.db".to_string()),
            schema_dir: lookup("SCHEMA_DIR").unwrap_or_else(|| "sql".to_string()),
            snapshot_path: lookup("SNAPSHOT_PATH").unwrap_or_else(|| "providers.json".to_string()),
            directory_url: lookup("PROVIDER_DIRECTORY_URL").unwrap_or_else(|| DEFAULT_DIRECTORY_URL.to_string()),
            watched_symbols,
            window_capacity,
            capture_threshold_secs: parse_or(&lookup, "CAPTURE_THRESHOLD_SECS", 60)?,
            epoch_poll_secs: parse_or(&lookup, "EPOCH_POLL_SECS", 5)?,
            event_poll_interval_ms: parse_or(&lookup, "EVENT_POLL_INTERVAL_MS", 3_000)?,
            backoff_initial_ms: parse_or(&lookup, "BACKOFF_INITIAL_MS", 1_000)?,
            backoff_max_ms: parse_or(&lookup, "BACKOFF_MAX_MS", 60_000)?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{} is not a valid number: '{}'", name, raw))),
        None => Ok(default),
    }
}
