//! EVM JSON-RPC adapter for [`ChainGateway`]
//!
//! Contract topology is discovered once from the PriceSubmitter:
//!
//! ```text
//! PriceSubmitter ─┬─ getFtsoManager() ─┬─ rewardManager() ─┬─ wNat()
//!                 │                    │                   └─ claimSetupManager()
//!                 │                    └─ getFtsos() → symbol() per FTSO
//!                 └─ getVoterWhitelister()
//! ```
//!
//! Finalization events are polled with `eth_getLogs` per FTSO contract.
//! Claim transactions are sent unsigned to the signer endpoint via
//! `eth_sendTransaction`, which holds the executor key.

use super::abi::{self, encode_call, Decoder, Token};
use super::{normalize_address, Address, ChainError, ChainGateway, PerformanceInfo, PriceFinalized, ScheduledFeeChange, Wei};
use crate::config::MonitorConfig;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};

/// Maximum block span per `eth_getLogs` request (public Flare nodes cap at 30)
const MAX_LOG_RANGE: u64 = 30;

/// Consecutive polling failures after which a finalization stream is closed
const MAX_POLL_FAILURES: u32 = 10;

const EVENT_CHANNEL_BUFFER: usize = 256;

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcLog {
    topics: Vec<String>,
    data: String,
}

/// Thin JSON-RPC 2.0 client over reqwest
#[derive(Clone)]
pub struct JsonRpcClient {
    http: reqwest::Client,
    url: String,
    next_id: Arc<AtomicU64>,
}

impl JsonRpcClient {
    pub fn new(url: &str) -> Result<Self, ChainError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;

        Ok(Self {
            http,
            url: url.to_string(),
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    pub async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self.http.post(&self.url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(ChainError::Transport(format!("{} returned HTTP {}", method, response.status())));
        }

        let parsed: RpcResponse<T> = response.json().await?;
        if let Some(err) = parsed.error {
            return Err(ChainError::Rpc {
                code: err.code,
                message: err.message,
            });
        }

        parsed
            .result
            .ok_or_else(|| ChainError::Decode(format!("{} returned no result", method)))
    }

    /// `eth_call` against the latest block
    pub async fn call(&self, to: &str, selector: &str, args: &[Token]) -> Result<Decoder, ChainError> {
        let data = encode_call(selector, args)?;
        let raw: String = self
            .request("eth_call", json!([{ "to": to, "data": data }, "latest"]))
            .await?;

        if raw == "0x" {
            return Err(ChainError::Decode(format!("empty return data from {} ({})", to, selector)));
        }

        Decoder::from_hex(&raw)
    }

    pub async fn block_number(&self) -> Result<u64, ChainError> {
        let raw: String = self.request("eth_blockNumber", json!([])).await?;
        parse_quantity(&raw).and_then(|n| {
            u64::try_from(n).map_err(|_| ChainError::Decode(format!("block number {} too large", raw)))
        })
    }
}

/// Parse a JSON-RPC hex quantity (`"0x1a"`)
pub fn parse_quantity(raw: &str) -> Result<u128, ChainError> {
    let stripped = raw.strip_prefix("0x").unwrap_or(raw);
    if stripped.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(stripped, 16).map_err(|e| ChainError::Decode(format!("quantity {}: {}", raw, e)))
}

/// Contract addresses resolved from the PriceSubmitter
#[derive(Debug, Clone)]
pub struct FtsoTopology {
    pub ftso_manager: Address,
    pub voter_whitelister: Address,
    pub reward_manager: Address,
    pub wnat: Address,
    pub claim_setup_manager: Option<Address>,
    /// symbol → FTSO contract
    pub ftsos: HashMap<String, Address>,
}

impl FtsoTopology {
    pub async fn discover(client: &JsonRpcClient, submitter: &str) -> Result<Self, ChainError> {
        let ftso_manager = client.call(submitter, abi::GET_FTSO_MANAGER, &[]).await?.address(0)?;
        let voter_whitelister = client.call(submitter, abi::GET_VOTER_WHITELISTER, &[]).await?.address(0)?;
        let reward_manager = client.call(&ftso_manager, abi::REWARD_MANAGER, &[]).await?.address(0)?;
        let wnat = client.call(&reward_manager, abi::WNAT, &[]).await?.address(0)?;

        let claim_setup_manager = match client.call(&reward_manager, abi::CLAIM_SETUP_MANAGER, &[]).await {
            Ok(decoder) => Some(decoder.address(0)?),
            Err(e) => {
                log::warn!("⚠️  ClaimSetupManager not available: {}", e);
                None
            }
        };

        let ftsos = Self::discover_ftsos(client, &ftso_manager).await?;

        Ok(Self {
            ftso_manager,
            voter_whitelister,
            reward_manager,
            wnat,
            claim_setup_manager,
            ftsos,
        })
    }

    async fn discover_ftsos(client: &JsonRpcClient, ftso_manager: &str) -> Result<HashMap<String, Address>, ChainError> {
        let addresses = client.call(ftso_manager, abi::GET_FTSOS, &[]).await?.address_array(0)?;
        let mut ftsos = HashMap::with_capacity(addresses.len());

        for address in addresses {
            let symbol = client.call(&address, abi::SYMBOL, &[]).await?.string(0)?;
            ftsos.insert(symbol.to_uppercase(), address);
        }

        Ok(ftsos)
    }
}

/// [`ChainGateway`] over JSON-RPC
pub struct JsonRpcGateway {
    client: JsonRpcClient,
    signer: JsonRpcClient,
    topology: FtsoTopology,
    ftsos: RwLock<HashMap<String, Address>>,
    executor: Option<Address>,
    event_poll_interval: Duration,
}

impl JsonRpcGateway {
    /// Connect to the node and resolve contract topology
    pub async fn connect(config: &MonitorConfig) -> Result<Self, ChainError> {
        let client = JsonRpcClient::new(&config.rpc_url)?;
        let signer = JsonRpcClient::new(&config.signer_url)?;
        let topology = FtsoTopology::discover(&client, &config.submitter_address).await?;

        log::info!("🔗 Contract topology resolved");
        log::info!("   ├─ FtsoManager: {}", topology.ftso_manager);
        log::info!("   ├─ RewardManager: {}", topology.reward_manager);
        log::info!("   ├─ WNat: {}", topology.wnat);
        log::info!("   ├─ VoterWhitelister: {}", topology.voter_whitelister);
        log::info!("   └─ FTSOs: {}", topology.ftsos.len());

        Ok(Self {
            client,
            signer,
            ftsos: RwLock::new(topology.ftsos.clone()),
            topology,
            executor: config.executor_address.clone(),
            event_poll_interval: Duration::from_millis(config.event_poll_interval_ms),
        })
    }

    pub fn topology(&self) -> &FtsoTopology {
        &self.topology
    }

    /// FTSO contract for `symbol`, re-reading the FTSO list once on a miss
    async fn ftso_for(&self, symbol: &str) -> Result<Address, ChainError> {
        let key = symbol.to_uppercase();
        if let Some(address) = self.ftsos.read().await.get(&key) {
            return Ok(address.clone());
        }

        let refreshed = FtsoTopology::discover_ftsos(&self.client, &self.topology.ftso_manager).await?;
        let mut ftsos = self.ftsos.write().await;
        *ftsos = refreshed;
        ftsos
            .get(&key)
            .cloned()
            .ok_or_else(|| ChainError::Unavailable(format!("no FTSO for symbol {}", symbol)))
    }

    fn claim_setup_manager(&self) -> Result<&str, ChainError> {
        self.topology
            .claim_setup_manager
            .as_deref()
            .ok_or_else(|| ChainError::Unavailable("ClaimSetupManager".to_string()))
    }
}

fn decode_price_finalized(log: &RpcLog) -> Result<PriceFinalized, ChainError> {
    let epoch_topic = log
        .topics
        .get(1)
        .ok_or_else(|| ChainError::Decode("PriceFinalized log without epochId topic".to_string()))?;
    let epoch_id = Decoder::from_hex(epoch_topic)?.u64(0)?;
    let data = Decoder::from_hex(&log.data)?;

    Ok(PriceFinalized {
        epoch_id,
        median_price: data.uint(0)?,
        rewarded: data.bool(1)?,
        low_reward_price: data.uint(2)?,
        high_reward_price: data.uint(3)?,
        finalization_type: data.uint(4)? as u8,
        timestamp: data.u64(5)?,
    })
}

async fn poll_price_finalized(
    client: JsonRpcClient,
    ftso: Address,
    symbol: String,
    mut from_block: u64,
    poll_interval: Duration,
    tx: mpsc::Sender<PriceFinalized>,
) {
    let mut timer = tokio::time::interval(poll_interval);
    let mut failures = 0u32;

    loop {
        timer.tick().await;

        let head = match client.block_number().await {
            Ok(head) => head,
            Err(e) => {
                failures += 1;
                log::warn!("⚠️  [{}] eth_blockNumber failed ({}/{}): {}", symbol, failures, MAX_POLL_FAILURES, e);
                if failures >= MAX_POLL_FAILURES {
                    return;
                }
                continue;
            }
        };

        while from_block <= head {
            let to_block = (from_block + MAX_LOG_RANGE - 1).min(head);
            let filter = json!([{
                "address": ftso,
                "fromBlock": format!("0x{:x}", from_block),
                "toBlock": format!("0x{:x}", to_block),
                "topics": [abi::PRICE_FINALIZED_TOPIC],
            }]);

            let logs: Vec<RpcLog> = match client.request("eth_getLogs", filter).await {
                Ok(logs) => logs,
                Err(e) => {
                    failures += 1;
                    log::warn!("⚠️  [{}] eth_getLogs failed ({}/{}): {}", symbol, failures, MAX_POLL_FAILURES, e);
                    if failures >= MAX_POLL_FAILURES {
                        return;
                    }
                    break;
                }
            };
            failures = 0;

            for log_entry in &logs {
                match decode_price_finalized(log_entry) {
                    Ok(event) => {
                        if tx.send(event).await.is_err() {
                            log::debug!("[{}] finalization receiver dropped", symbol);
                            return;
                        }
                    }
                    Err(e) => log::warn!("⚠️  [{}] undecodable PriceFinalized log: {}", symbol, e),
                }
            }

            from_block = to_block + 1;
        }
    }
}

#[async_trait]
impl ChainGateway for JsonRpcGateway {
    async fn current_epoch_id(&self) -> Result<u64, ChainError> {
        self.client
            .call(&self.topology.ftso_manager, abi::GET_CURRENT_REWARD_EPOCH, &[])
            .await?
            .u64(0)
    }

    async fn current_epoch_end(&self) -> Result<i64, ChainError> {
        let end = self
            .client
            .call(&self.topology.ftso_manager, abi::CURRENT_REWARD_EPOCH_ENDS, &[])
            .await?
            .u64(0)?;
        i64::try_from(end).map_err(|_| ChainError::Decode(format!("epoch end {} out of range", end)))
    }

    async fn epoch_duration(&self) -> Result<u64, ChainError> {
        self.client
            .call(&self.topology.ftso_manager, abi::REWARD_EPOCH_DURATION_SECONDS, &[])
            .await?
            .u64(0)
    }

    async fn total_vote_power(&self) -> Result<Wei, ChainError> {
        self.client.call(&self.topology.wnat, abi::TOTAL_VOTE_POWER, &[]).await?.uint(0)
    }

    async fn vote_power_of(&self, address: &str) -> Result<Wei, ChainError> {
        self.client
            .call(&self.topology.wnat, abi::VOTE_POWER_OF, &[Token::Address(address.to_string())])
            .await?
            .uint(0)
    }

    async fn epoch_vote_power_block(&self, epoch_id: u64) -> Result<u64, ChainError> {
        self.client
            .call(
                &self.topology.reward_manager,
                abi::GET_REWARD_EPOCH_VOTE_POWER_BLOCK,
                &[Token::Uint(epoch_id as u128)],
            )
            .await?
            .u64(0)
    }

    async fn vote_power_of_at(&self, address: &str, block: u64) -> Result<Wei, ChainError> {
        self.client
            .call(
                &self.topology.wnat,
                abi::VOTE_POWER_OF_AT,
                &[Token::Address(address.to_string()), Token::Uint(block as u128)],
            )
            .await?
            .uint(0)
    }

    async fn whitelisted_providers(&self, symbol: &str) -> Result<Vec<Address>, ChainError> {
        let raw = self
            .client
            .call(
                &self.topology.voter_whitelister,
                abi::GET_FTSO_WHITELISTED_PRICE_PROVIDERS_BY_SYMBOL,
                &[Token::String(symbol.to_string())],
            )
            .await?
            .address_array(0)?;

        Ok(raw.iter().filter_map(|a| normalize_address(a)).collect())
    }

    async fn balance_of(&self, address: &str) -> Result<Wei, ChainError> {
        let raw: String = self
            .client
            .request("eth_getBalance", json!([address, "latest"]))
            .await?;
        parse_quantity(&raw)
    }

    async fn current_fee(&self, address: &str) -> Result<u64, ChainError> {
        self.client
            .call(
                &self.topology.reward_manager,
                abi::GET_DATA_PROVIDER_CURRENT_FEE_PERCENTAGE,
                &[Token::Address(address.to_string())],
            )
            .await?
            .u64(0)
    }

    async fn scheduled_fee_changes(&self, address: &str) -> Result<Vec<ScheduledFeeChange>, ChainError> {
        let decoder = self
            .client
            .call(
                &self.topology.reward_manager,
                abi::GET_DATA_PROVIDER_SCHEDULED_FEE_PERCENTAGE_CHANGES,
                &[Token::Address(address.to_string())],
            )
            .await?;

        let fees = decoder.uint_array(0)?;
        let epochs = decoder.uint_array(1)?;

        Ok(fees
            .into_iter()
            .zip(epochs)
            .map(|(fee, epoch)| ScheduledFeeChange {
                fee_bips: fee as u64,
                valid_from_epoch: epoch as u64,
            })
            .collect())
    }

    async fn unclaimed_reward(&self, address: &str, epoch_id: u64) -> Result<Wei, ChainError> {
        let amounts = self
            .client
            .call(
                &self.topology.reward_manager,
                abi::GET_STATE_OF_REWARDS,
                &[Token::Address(address.to_string()), Token::Uint(epoch_id as u128)],
            )
            .await?
            .uint_array(1)?;

        Ok(amounts.first().copied().unwrap_or(0))
    }

    async fn provider_performance(&self, epoch_id: u64, address: &str) -> Result<PerformanceInfo, ChainError> {
        let decoder = self
            .client
            .call(
                &self.topology.reward_manager,
                abi::GET_DATA_PROVIDER_PERFORMANCE_INFO,
                &[Token::Uint(epoch_id as u128), Token::Address(address.to_string())],
            )
            .await?;

        Ok(PerformanceInfo {
            reward_amount: decoder.uint(0)?,
            vote_power: decoder.uint(1)?,
        })
    }

    async fn submitted_price(&self, symbol: &str, epoch_id: u64, address: &str) -> Result<u128, ChainError> {
        let ftso = self.ftso_for(symbol).await?;
        self.client
            .call(
                &ftso,
                abi::GET_EPOCH_PRICE_FOR_VOTER,
                &[Token::Uint(epoch_id as u128), Token::Address(address.to_string())],
            )
            .await?
            .uint(0)
    }

    async fn claim_executors(&self, owner: &str) -> Result<Vec<Address>, ChainError> {
        let manager = self.claim_setup_manager()?;
        let raw = self
            .client
            .call(manager, abi::CLAIM_EXECUTORS, &[Token::Address(owner.to_string())])
            .await?
            .address_array(0)?;

        Ok(raw.iter().filter_map(|a| normalize_address(a)).collect())
    }

    async fn submit_auto_claim(&self, owners: &[Address], epoch_id: u64) -> Result<String, ChainError> {
        let executor = self
            .executor
            .as_deref()
            .ok_or_else(|| ChainError::Unavailable("no executor address configured".to_string()))?;

        let data = encode_call(
            abi::AUTO_CLAIM,
            &[Token::AddressArray(owners.to_vec()), Token::Uint(epoch_id as u128)],
        )?;

        let call = json!({
            "from": executor,
            "to": self.topology.reward_manager,
            "data": data,
        });

        let gas: String = self.client.request("eth_estimateGas", json!([call])).await?;
        let gas_price: String = self.client.request("eth_gasPrice", json!([])).await?;

        log::debug!("⛽ autoClaim gas estimate {} at price {}", gas, gas_price);

        let tx = json!({
            "from": executor,
            "to": self.topology.reward_manager,
            "data": data,
            "gas": gas,
            "gasPrice": gas_price,
        });

        self.signer.request("eth_sendTransaction", json!([tx])).await
    }

    async fn price_finalized_stream(&self, symbol: &str) -> Result<mpsc::Receiver<PriceFinalized>, ChainError> {
        let ftso = self.ftso_for(symbol).await?;
        let from_block = self.client.block_number().await?;
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_BUFFER);

        tokio::spawn(poll_price_finalized(
            self.client.clone(),
            ftso,
            symbol.to_string(),
            from_block,
            self.event_poll_interval,
            tx,
        ));

        Ok(rx)
    }
}
