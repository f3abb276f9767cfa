//! Confirmation Tracker
//!
//! Stateless helpers over the [`ChainProfileRegistry`](crate::chain_profile::ChainProfileRegistry):
//! threshold check, progress percentage, reorg detection, and ETA (spec.md
//! §4.3). None of these hold state of their own — they take the registry and
//! a network on every call, matching the "pure helper" shape the
//! specification calls for.

use crate::chain_profile::{ChainProfileRegistry, Network};
use crate::error::PaymentResult;

/// Required confirmations for `network`. Errors on an unknown network.
pub fn required(registry: &ChainProfileRegistry, network: Network) -> PaymentResult<u32> {
    Ok(registry.get(network)?.required_confirmations)
}

/// Whether `n` confirmations satisfy the network's threshold.
pub fn is_confirmed(registry: &ChainProfileRegistry, network: Network, n: u32) -> PaymentResult<bool> {
    Ok(n >= required(registry, network)?)
}

/// Confirmation progress as a percentage in `0..=100`, clamped.
pub fn progress(registry: &ChainProfileRegistry, network: Network, n: u32) -> PaymentResult<u8> {
    let req = required(registry, network)?;
    if req == 0 {
        return Ok(100);
    }
    let pct = (n as u64 * 100) / req as u64;
    Ok(pct.min(100) as u8)
}

/// Estimated milliseconds until the network's confirmation threshold is
/// reached, given `n` confirmations observed so far. Zero once confirmed.
pub fn estimate_time_to_confirmation(
    registry: &ChainProfileRegistry,
    network: Network,
    n: u32,
) -> PaymentResult<u64> {
    let profile = registry.get(network)?;
    let remaining = profile.required_confirmations.saturating_sub(n);
    Ok(remaining as u64 * profile.avg_block_time_ms)
}

/// A block reorganization is observable as a decrease in confirmation count
/// for a previously-observed transaction.
pub fn detect_reorg(previous: u32, current: u32) -> bool {
    current < previous
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required() {
        let registry = ChainProfileRegistry::with_defaults();
        assert_eq!(required(&registry, Network::Ethereum).unwrap(), 12);
        assert_eq!(required(&registry, Network::Bitcoin).unwrap(), 6);
        assert_eq!(required(&registry, Network::Polygon).unwrap(), 30);
    }

    #[test]
    fn test_is_confirmed() {
        let registry = ChainProfileRegistry::with_defaults();
        assert!(!is_confirmed(&registry, Network::Ethereum, 11).unwrap());
        assert!(is_confirmed(&registry, Network::Ethereum, 12).unwrap());
        assert!(is_confirmed(&registry, Network::Ethereum, 13).unwrap());
    }

    #[test]
    fn test_progress_clamped() {
        let registry = ChainProfileRegistry::with_defaults();
        assert_eq!(progress(&registry, Network::Ethereum, 0).unwrap(), 0);
        assert_eq!(progress(&registry, Network::Ethereum, 6).unwrap(), 50);
        assert_eq!(progress(&registry, Network::Ethereum, 12).unwrap(), 100);
        assert_eq!(progress(&registry, Network::Ethereum, 100).unwrap(), 100);
    }

    #[test]
    fn test_estimate_time_to_confirmation() {
        let registry = ChainProfileRegistry::with_defaults();
        // Ethereum: 12 required, 12_000ms avg block
        assert_eq!(
            estimate_time_to_confirmation(&registry, Network::Ethereum, 0).unwrap(),
            144_000
        );
        assert_eq!(
            estimate_time_to_confirmation(&registry, Network::Ethereum, 10).unwrap(),
            24_000
        );
        assert_eq!(
            estimate_time_to_confirmation(&registry, Network::Ethereum, 12).unwrap(),
            0
        );
        assert_eq!(
            estimate_time_to_confirmation(&registry, Network::Ethereum, 50).unwrap(),
            0
        );
    }

    #[test]
    fn test_detect_reorg() {
        assert!(detect_reorg(5, 3));
        assert!(!detect_reorg(3, 5));
        assert!(!detect_reorg(3, 3));
    }

    #[test]
    fn test_unknown_network_fails() {
        let registry = ChainProfileRegistry::new(vec![]);
        assert!(required(&registry, Network::Ethereum).is_err());
        assert!(is_confirmed(&registry, Network::Ethereum, 1).is_err());
        assert!(progress(&registry, Network::Ethereum, 1).is_err());
        assert!(estimate_time_to_confirmation(&registry, Network::Ethereum, 1).is_err());
    }
}
