//! Minimal Solidity ABI codec
//!
//! Covers exactly the shapes the FTSO contracts use: static words
//! (uint/bool/address), `string`, and `address[]`/`uint256[]`/`bool[]` in
//! return tuples. Values are limited to `u128`; a word with any of its upper
//! 16 bytes set is a decode error.

use super::{Address, ChainError};

const WORD: usize = 32;

// PriceSubmitter
pub const GET_FTSO_MANAGER: &str = "b39c6858";
pub const GET_VOTER_WHITELISTER: &str = "71e1fad9";

// FtsoManager
pub const REWARD_MANAGER: &str = "0f4ef8a6";
pub const GET_CURRENT_REWARD_EPOCH: &str = "e7c830d4";
pub const CURRENT_REWARD_EPOCH_ENDS: &str = "d89c39e6";
pub const REWARD_EPOCH_DURATION_SECONDS: &str = "85f3c9c9";
pub const GET_FTSOS: &str = "ce69f833";

// FtsoRewardManager
pub const WNAT: &str = "9edbf007";
pub const CLAIM_SETUP_MANAGER: &str = "c4db9619";
pub const GET_STATE_OF_REWARDS: &str = "a4472c10";
pub const GET_DATA_PROVIDER_PERFORMANCE_INFO: &str = "eb82dd7f";
pub const GET_DATA_PROVIDER_CURRENT_FEE_PERCENTAGE: &str = "cfbcd25f";
pub const GET_DATA_PROVIDER_SCHEDULED_FEE_PERCENTAGE_CHANGES: &str = "33b7971e";
pub const GET_REWARD_EPOCH_VOTE_POWER_BLOCK: &str = "f2edab5a";
pub const AUTO_CLAIM: &str = "8dc305fa";

// WNat
pub const TOTAL_VOTE_POWER: &str = "f5f3d4f7";
pub const VOTE_POWER_OF: &str = "142d1018";
pub const VOTE_POWER_OF_AT: &str = "92bfe6d8";

// VoterWhitelister
pub const GET_FTSO_WHITELISTED_PRICE_PROVIDERS_BY_SYMBOL: &str = "aa89dfd4";

// Ftso
pub const SYMBOL: &str = "95d89b41";
pub const GET_EPOCH_PRICE_FOR_VOTER: &str = "c5d8b9e7";

// ClaimSetupManager
pub const CLAIM_EXECUTORS: &str = "3f317fe1";

/// keccak256("PriceFinalized(uint256,uint256,bool,uint256,uint256,uint8,uint256)")
pub const PRICE_FINALIZED_TOPIC: &str = "0xfe8865c1fe85bbf124b9e0f16cccfeeb6f330454fd79475a31261c8fa250bc30";

/// Call argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Address(Address),
    Uint(u128),
    Bool(bool),
    String(String),
    AddressArray(Vec<Address>),
}

impl Token {
    fn is_dynamic(&self) -> bool {
        matches!(self, Token::String(_) | Token::AddressArray(_))
    }
}

fn uint_word(value: u128) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

fn address_word(address: &str) -> Result<[u8; WORD], ChainError> {
    let raw = address.strip_prefix("0x").unwrap_or(address);
    let bytes = hex::decode(raw).map_err(|e| ChainError::Decode(format!("address {}: {}", address, e)))?;
    if bytes.len() != 20 {
        return Err(ChainError::Decode(format!("address {} is not 20 bytes", address)));
    }
    let mut word = [0u8; WORD];
    word[12..].copy_from_slice(&bytes);
    Ok(word)
}

fn padded_len(len: usize) -> usize {
    len.div_ceil(WORD) * WORD
}

/// ABI-encode a call: 4-byte selector followed by the argument tuple
///
/// Returns `0x`-prefixed hex suitable for `eth_call` data.
pub fn encode_call(selector: &str, tokens: &[Token]) -> Result<String, ChainError> {
    let mut head: Vec<u8> = Vec::with_capacity(tokens.len() * WORD);
    let mut tail: Vec<u8> = Vec::new();
    let head_size = tokens.len() * WORD;

    for token in tokens {
        if token.is_dynamic() {
            head.extend_from_slice(&uint_word((head_size + tail.len()) as u128));
        }

        match token {
            Token::Address(address) => head.extend_from_slice(&address_word(address)?),
            Token::Uint(value) => head.extend_from_slice(&uint_word(*value)),
            Token::Bool(value) => head.extend_from_slice(&uint_word(*value as u128)),
            Token::String(value) => {
                let bytes = value.as_bytes();
                tail.extend_from_slice(&uint_word(bytes.len() as u128));
                let start = tail.len();
                tail.extend_from_slice(bytes);
                tail.resize(start + padded_len(bytes.len()), 0);
            }
            Token::AddressArray(addresses) => {
                tail.extend_from_slice(&uint_word(addresses.len() as u128));
                for address in addresses {
                    tail.extend_from_slice(&address_word(address)?);
                }
            }
        }
    }

    Ok(format!("0x{}{}{}", selector, hex::encode(head), hex::encode(tail)))
}

/// Decode a `0x`-prefixed hex string into bytes
pub fn decode_hex(raw: &str) -> Result<Vec<u8>, ChainError> {
    let stripped = raw.strip_prefix("0x").unwrap_or(raw);
    hex::decode(stripped).map_err(|e| ChainError::Decode(format!("invalid hex: {}", e)))
}

/// Reader over ABI-encoded return data
pub struct Decoder {
    data: Vec<u8>,
}

impl Decoder {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn from_hex(raw: &str) -> Result<Self, ChainError> {
        Ok(Self::new(decode_hex(raw)?))
    }

    fn word_at(&self, offset: usize) -> Result<&[u8], ChainError> {
        self.data.get(offset..offset + WORD).ok_or_else(|| {
            ChainError::Decode(format!("word at byte {} out of range (len {})", offset, self.data.len()))
        })
    }

    fn uint_at(&self, offset: usize) -> Result<u128, ChainError> {
        let word = self.word_at(offset)?;
        if word[..16].iter().any(|b| *b != 0) {
            return Err(ChainError::Decode(format!("value at byte {} exceeds u128", offset)));
        }
        let mut low = [0u8; 16];
        low.copy_from_slice(&word[16..]);
        Ok(u128::from_be_bytes(low))
    }

    fn address_at(&self, offset: usize) -> Result<Address, ChainError> {
        let word = self.word_at(offset)?;
        Ok(format!("0x{}", hex::encode(&word[12..])))
    }

    fn usize_at(&self, offset: usize) -> Result<usize, ChainError> {
        usize::try_from(self.uint_at(offset)?)
            .map_err(|_| ChainError::Decode(format!("length at byte {} too large", offset)))
    }

    /// Start and element count of the dynamic array referenced by head slot `index`
    fn array_bounds(&self, index: usize) -> Result<(usize, usize), ChainError> {
        let offset = self.usize_at(index * WORD)?;
        let len = self.usize_at(offset)?;
        Ok((offset + WORD, len))
    }

    pub fn uint(&self, index: usize) -> Result<u128, ChainError> {
        self.uint_at(index * WORD)
    }

    pub fn u64(&self, index: usize) -> Result<u64, ChainError> {
        u64::try_from(self.uint(index)?)
            .map_err(|_| ChainError::Decode(format!("slot {} exceeds u64", index)))
    }

    pub fn bool(&self, index: usize) -> Result<bool, ChainError> {
        Ok(self.uint(index)? != 0)
    }

    pub fn address(&self, index: usize) -> Result<Address, ChainError> {
        self.address_at(index * WORD)
    }

    pub fn uint_array(&self, index: usize) -> Result<Vec<u128>, ChainError> {
        let (start, len) = self.array_bounds(index)?;
        (0..len).map(|i| self.uint_at(start + i * WORD)).collect()
    }

    pub fn address_array(&self, index: usize) -> Result<Vec<Address>, ChainError> {
        let (start, len) = self.array_bounds(index)?;
        (0..len).map(|i| self.address_at(start + i * WORD)).collect()
    }

    pub fn string(&self, index: usize) -> Result<String, ChainError> {
        let (start, len) = self.array_bounds(index)?;
        let bytes = self
            .data
            .get(start..start + len)
            .ok_or_else(|| ChainError::Decode(format!("string in slot {} out of range", index)))?;
        String::from_utf8(bytes.to_vec()).map_err(|e| ChainError::Decode(e.to_string()))
    }
}
