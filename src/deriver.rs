//! Address Deriver
//!
//! Pure, deterministic `(seed, network, payment_id) -> (address,
//! derivation_index)` mapping and its reverse lookup (spec.md §4.1). This is
//! content-addressed: the same three inputs always produce the same address,
//! from any fresh instance holding the same seed, with no network calls and
//! no real BIP-32/44 derivation (that is explicitly out of scope — see
//! spec.md §1's Non-goals).

use std::collections::{HashMap, HashSet};

use hmac::{Hmac, Mac};
use parking_lot::RwLock;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::chain_profile::NetworkFamily;
use crate::error::PaymentError;

type HmacSha256 = Hmac<Sha256>;

/// The deriver's secret key material. Zeroized on drop; never logged or
/// exposed beyond the deriver itself (spec.md §5's "Shared resources").
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterSeed(Vec<u8>);

impl MasterSeed {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Load the production seed from an environment variable (spec.md §6).
    /// The variable's raw bytes are used directly as the HMAC key.
    pub fn from_env(var: &str) -> Result<Self, String> {
        std::env::var(var)
            .map(|s| Self(s.into_bytes()))
            .map_err(|_| format!("environment variable {} is not set", var))
    }

    /// A fixed, published-in-this-source seed for tests. Never use in
    /// production — it has no secrecy at all.
    pub fn for_tests() -> Self {
        Self(b"test-master-seed-do-not-use-in-production".to_vec())
    }

    fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for MasterSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MasterSeed([REDACTED {} bytes])", self.0.len())
    }
}

fn keyed_mac(seed: &[u8], message: &str) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(seed).expect("HMAC accepts keys of any length");
    mac.update(message.as_bytes());
    let result = mac.finalize().into_bytes();
    let mut out = [0u8; 32];
    out.copy_from_slice(&result);
    out
}

/// A derived payment address plus the index it was derived at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedAddress {
    pub address: String,
    pub derivation_index: u32,
}

/// Deterministic per-instance address deriver.
///
/// Holds the master seed and the bookkeeping needed for reverse lookup and
/// index allocation. Two independent instances constructed with the same
/// seed derive identical addresses for identical inputs (spec.md §8,
/// property 1) — the bookkeeping here (used-index sets, reverse index) is
/// purely a cache over a pure function, not part of the derivation itself.
pub struct AddressDeriver {
    seed: MasterSeed,
    used_indices: RwLock<HashMap<String, HashSet<u32>>>,
    address_index: RwLock<HashMap<String, String>>,
}

impl AddressDeriver {
    pub fn new(seed: MasterSeed) -> Self {
        Self {
            seed,
            used_indices: RwLock::new(HashMap::new()),
            address_index: RwLock::new(HashMap::new()),
        }
    }

    fn compute_index(&self, network: &str, payment_id: &str) -> u32 {
        let message = format!("index:{}:{}", network, payment_id);
        let digest = keyed_mac(self.seed.as_bytes(), &message);
        u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
    }

    fn compute_address_hex(&self, network: &str, index: u32, payment_id: &str) -> String {
        let message = format!("addr:{}:{}:{}", network, index, payment_id);
        let digest = keyed_mac(self.seed.as_bytes(), &message);
        hex::encode(digest)
    }

    /// Derive the address for `(network, payment_id)`, formatting it per the
    /// network's address family. Records the derivation index and the
    /// reverse address index. Returns [`PaymentError::AddressCollision`] if
    /// the computed address is already indexed to a *different* payment id
    /// — re-deriving for the same payment id is idempotent and always
    /// succeeds.
    pub fn derive(
        &self,
        network_name: &str,
        family: NetworkFamily,
        payment_id: &str,
    ) -> Result<DerivedAddress, PaymentError> {
        let index = self.compute_index(network_name, payment_id);
        let hex_digest = self.compute_address_hex(network_name, index, payment_id);
        let hex_chars = &hex_digest[..40];

        let address = match family {
            NetworkFamily::Bitcoin => format!("bc1q{}", hex_chars),
            NetworkFamily::Evm => format!("0x{}", hex_chars),
        };
        let address_lower = address.to_lowercase();

        {
            let index_map = self.address_index.read();
            if let Some(existing_owner) = index_map.get(&address_lower) {
                if existing_owner != payment_id {
                    return Err(PaymentError::AddressCollision {
                        payment_id: payment_id.to_string(),
                        address: address.clone(),
                    });
                }
            }
        }

        self.used_indices
            .write()
            .entry(network_name.to_string())
            .or_default()
            .insert(index);
        self.address_index
            .write()
            .insert(address_lower, payment_id.to_string());

        Ok(DerivedAddress {
            address,
            derivation_index: index,
        })
    }

    /// True iff this deriver has ever issued `address` (case-insensitive).
    pub fn is_our_address(&self, address: &str) -> bool {
        self.address_index
            .read()
            .contains_key(&address.to_lowercase())
    }

    /// The payment id an address was issued for, if any.
    pub fn payment_id_for_address(&self, address: &str) -> Option<String> {
        self.address_index
            .read()
            .get(&address.to_lowercase())
            .cloned()
    }

    /// Smallest non-negative integer not yet used as a derivation index for
    /// `network`, for callers that want sequential indices independent of
    /// the content-addressed `derive` path (spec.md §4.1, "Index
    /// allocation").
    pub fn allocate_next_index(&self, network: &str) -> u32 {
        let mut map = self.used_indices.write();
        let used = map.entry(network.to_string()).or_default();
        let mut candidate = 0u32;
        while used.contains(&candidate) {
            candidate += 1;
        }
        used.insert(candidate);
        candidate
    }
}
