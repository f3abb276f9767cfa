//! Immutable core configuration (spec.md §6)
//!
//! Built once at construction time and never mutated afterward — later
//! configuration changes must not affect in-flight payments (spec.md §3,
//! invariant 5), which is why `required_confirmations` is snapshotted into
//! each [`PaymentRecord`](crate::payment::types::PaymentRecord) rather than
//! read live from this config on every query.

use rust_decimal::Decimal;

use crate::chain_profile::ChainProfileRegistry;
use crate::deriver::MasterSeed;

/// Default payment window: 30 minutes.
pub const DEFAULT_PAYMENT_WINDOW_MS: i64 = 30 * 60 * 1000;
/// Default poll interval: advisory only, 15 seconds.
pub const DEFAULT_POLL_INTERVAL_MS: i64 = 15 * 1000;
/// Default underpayment tolerance ratio: 2%.
pub const DEFAULT_UNDERPAYMENT_TOLERANCE: &str = "0.02";
/// Default overpayment threshold ratio: 0.1%.
pub const DEFAULT_OVERPAYMENT_THRESHOLD: &str = "0.001";
/// Default underpayment grace period: 15 minutes.
pub const DEFAULT_UNDERPAYMENT_GRACE_PERIOD_MS: i64 = 15 * 60 * 1000;

/// Immutable configuration for a [`PaymentFlowStateMachine`](crate::payment::machine::PaymentFlowStateMachine).
pub struct PaymentCoreConfig {
    pub payment_window_ms: i64,
    pub poll_interval_ms: i64,
    pub underpayment_tolerance: Decimal,
    pub overpayment_threshold: Decimal,
    pub underpayment_grace_period_ms: i64,
    pub chains: ChainProfileRegistry,
    pub master_seed: MasterSeed,
}

impl PaymentCoreConfig {
    /// Production-shaped config: default chain profiles and thresholds,
    /// seed loaded from `var`.
    pub fn from_env(var: &str) -> Result<Self, String> {
        Ok(Self::defaults_with_seed(MasterSeed::from_env(var)?))
    }

    /// Fixed-seed config for tests — default thresholds and chain profiles,
    /// a published (insecure) test seed.
    pub fn for_tests() -> Self {
        Self::defaults_with_seed(MasterSeed::for_tests())
    }

    fn defaults_with_seed(master_seed: MasterSeed) -> Self {
        Self {
            payment_window_ms: DEFAULT_PAYMENT_WINDOW_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            underpayment_tolerance: DEFAULT_UNDERPAYMENT_TOLERANCE.parse().unwrap(),
            overpayment_threshold: DEFAULT_OVERPAYMENT_THRESHOLD.parse().unwrap(),
            underpayment_grace_period_ms: DEFAULT_UNDERPAYMENT_GRACE_PERIOD_MS,
            chains: ChainProfileRegistry::with_defaults(),
            master_seed,
        }
    }

    /// Builder-style override of the chain profile registry, e.g. for tests
    /// that want a reduced or customized network set.
    pub fn with_chains(mut self, chains: ChainProfileRegistry) -> Self {
        self.chains = chains;
        self
    }

    pub fn with_payment_window_ms(mut self, ms: i64) -> Self {
        self.payment_window_ms = ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PaymentCoreConfig::for_tests();
        assert_eq!(config.payment_window_ms, DEFAULT_PAYMENT_WINDOW_MS);
        assert_eq!(config.underpayment_grace_period_ms, DEFAULT_UNDERPAYMENT_GRACE_PERIOD_MS);
    }

    #[test]
    fn test_with_payment_window_override() {
        let config = PaymentCoreConfig::for_tests().with_payment_window_ms(60_000);
        assert_eq!(config.payment_window_ms, 60_000);
    }

    #[test]
    fn test_from_env_missing_var_fails() {
        let result = PaymentCoreConfig::from_env("CRYPTO_PAYMENT_CORE_SEED_THAT_DOES_NOT_EXIST");
        assert!(result.is_err());
    }
}
