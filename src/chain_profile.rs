//! Chain Profile Registry
//!
//! A per-network record of confirmation threshold, average block time,
//! native currency, allowed tokens, and address/tx-hash shape validators
//! (spec.md §4.2). The registry is immutable once built: "per-network
//! reflection / dynamic dispatch" in the source is re-expressed here as a
//! tagged [`NetworkFamily`] plus two plain validator functions per profile,
//! rather than a trait object — there is no behavior beyond shape-checking,
//! so a trait would add indirection without adding extensibility.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::error::{PaymentError, PaymentResult};

/// A blockchain network the core can track payments on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Network {
    Ethereum,
    Bitcoin,
    Polygon,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Ethereum => write!(f, "ethereum"),
            Network::Bitcoin => write!(f, "bitcoin"),
            Network::Polygon => write!(f, "polygon"),
        }
    }
}

impl std::str::FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ethereum" => Ok(Network::Ethereum),
            "bitcoin" => Ok(Network::Bitcoin),
            "polygon" => Ok(Network::Polygon),
            _ => Err(format!("unknown network: {}", s)),
        }
    }
}

/// Cryptographic/address family a network belongs to. Drives which shape
/// validators apply — the deriver also uses this to pick an address prefix
/// (spec.md §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkFamily {
    /// EVM chains: `0x` + 40 hex address, `0x` + 64 hex tx hash.
    Evm,
    /// Bitcoin-family chains: bech32-like address, bare 64 hex tx hash.
    Bitcoin,
}

/// Per-network constants captured at creation time into a payment record
/// (`required_confirmations`) and consulted by the confirmation tracker.
#[derive(Debug, Clone)]
pub struct ChainProfile {
    pub network: Network,
    pub family: NetworkFamily,
    pub required_confirmations: u32,
    pub avg_block_time_ms: u64,
    pub native_currency: String,
    pub supported_currencies: HashSet<String>,
}

impl ChainProfile {
    pub fn supports_currency(&self, currency: &str) -> bool {
        self.supported_currencies
            .iter()
            .any(|c| c.eq_ignore_ascii_case(currency))
    }

    pub fn validate_address(&self, address: &str) -> bool {
        match self.family {
            NetworkFamily::Evm => is_evm_address(address),
            NetworkFamily::Bitcoin => is_bitcoin_address(address),
        }
    }

    pub fn validate_tx_hash(&self, hash: &str) -> bool {
        match self.family {
            NetworkFamily::Evm => is_evm_tx_hash(hash),
            NetworkFamily::Bitcoin => is_bitcoin_tx_hash(hash),
        }
    }
}

fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// `0x` + 40 hex chars, case-insensitive.
pub fn is_evm_address(address: &str) -> bool {
    address
        .strip_prefix("0x")
        .map(|rest| rest.len() == 40 && is_hex(rest))
        .unwrap_or(false)
}

/// `0x` + 64 hex chars, case-insensitive.
pub fn is_evm_tx_hash(hash: &str) -> bool {
    hash.strip_prefix("0x")
        .map(|rest| rest.len() == 64 && is_hex(rest))
        .unwrap_or(false)
}

/// Bech32-like: `bc1q` prefix followed by at least 38 more characters.
pub fn is_bitcoin_address(address: &str) -> bool {
    address
        .strip_prefix("bc1q")
        .map(|rest| rest.len() >= 38)
        .unwrap_or(false)
}

/// 64 hex chars, no `0x` prefix.
pub fn is_bitcoin_tx_hash(hash: &str) -> bool {
    hash.len() == 64 && is_hex(hash)
}

/// Immutable, per-machine-instance registry of [`ChainProfile`]s.
#[derive(Debug, Clone)]
pub struct ChainProfileRegistry {
    profiles: HashMap<Network, ChainProfile>,
}

impl ChainProfileRegistry {
    /// Build a registry from an explicit set of profiles — the path used by
    /// configuration overrides at construction time (spec.md §4.2).
    pub fn new(profiles: Vec<ChainProfile>) -> Self {
        Self {
            profiles: profiles.into_iter().map(|p| (p.network, p)).collect(),
        }
    }

    /// The default registry described in spec.md §4.2's table.
    pub fn with_defaults() -> Self {
        Self::new(vec![
            ChainProfile {
                network: Network::Ethereum,
                family: NetworkFamily::Evm,
                required_confirmations: 12,
                avg_block_time_ms: 12_000,
                native_currency: "ETH".to_string(),
                supported_currencies: ["ETH", "USDC", "USDT", "DAI"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            },
            ChainProfile {
                network: Network::Bitcoin,
                family: NetworkFamily::Bitcoin,
                required_confirmations: 6,
                avg_block_time_ms: 600_000,
                native_currency: "BTC".to_string(),
                supported_currencies: ["BTC"].iter().map(|s| s.to_string()).collect(),
            },
            ChainProfile {
                network: Network::Polygon,
                family: NetworkFamily::Evm,
                required_confirmations: 30,
                avg_block_time_ms: 2_000,
                native_currency: "MATIC".to_string(),
                supported_currencies: ["MATIC", "USDC", "USDT", "DAI"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            },
        ])
    }

    pub fn get(&self, network: Network) -> PaymentResult<&ChainProfile> {
        self.profiles
            .get(&network)
            .ok_or(PaymentError::UnknownNetwork(network.to_string()))
    }

    pub fn is_supported(&self, network: Network) -> bool {
        self.profiles.contains_key(&network)
    }

    pub fn supports_currency(&self, network: Network, currency: &str) -> PaymentResult<bool> {
        Ok(self.get(network)?.supports_currency(currency))
    }
}

impl Default for ChainProfileRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
