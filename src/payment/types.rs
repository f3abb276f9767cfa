//! Payment record and related types (spec.md §3, §4.4)

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::chain_profile::Network;

/// The eight states a payment can occupy (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    Created,
    Pending,
    Confirming,
    Confirmed,
    Completed,
    Refunding,
    Expired,
    Failed,
}

impl PaymentState {
    /// All states, in a fixed order — used to zero-fill the state
    /// distribution histogram (spec.md §4.4, "Queries").
    pub const ALL: [PaymentState; 8] = [
        PaymentState::Created,
        PaymentState::Pending,
        PaymentState::Confirming,
        PaymentState::Confirmed,
        PaymentState::Completed,
        PaymentState::Refunding,
        PaymentState::Expired,
        PaymentState::Failed,
    ];

    /// The transition matrix from spec.md §4.4.
    pub fn allowed_targets(self) -> &'static [PaymentState] {
        use PaymentState::*;
        match self {
            Created => &[Pending, Expired, Failed],
            Pending => &[Confirming, Expired, Failed],
            Confirming => &[Confirmed, Expired, Failed],
            Confirmed => &[Completed, Refunding, Failed],
            Completed => &[Refunding],
            Refunding => &[Completed],
            Expired => &[],
            Failed => &[],
        }
    }

    pub fn can_transition_to(self, target: PaymentState) -> bool {
        self.allowed_targets().contains(&target)
    }

    /// States from which `expire_payment` is allowed (spec.md §4.4, op 6).
    pub fn is_expirable(self) -> bool {
        matches!(self, PaymentState::Created | PaymentState::Pending | PaymentState::Confirming)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PaymentState::Expired | PaymentState::Failed)
    }
}

impl fmt::Display for PaymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaymentState::Created => "created",
            PaymentState::Pending => "pending",
            PaymentState::Confirming => "confirming",
            PaymentState::Confirmed => "confirmed",
            PaymentState::Completed => "completed",
            PaymentState::Refunding => "refunding",
            PaymentState::Expired => "expired",
            PaymentState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// One entry in a payment's append-only transition history (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateHistoryEntry {
    pub from: PaymentState,
    pub to: PaymentState,
    pub trigger: String,
    pub timestamp: i64,
    pub metadata: TransitionMetadata,
}

/// Free-form context attached to a transition. `reason` is copied into
/// `failure_reason` when the target state is `Failed` (spec.md §4.4, op 8).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransitionMetadata {
    pub reason: Option<String>,
}

impl TransitionMetadata {
    pub fn with_reason(reason: impl Into<String>) -> Self {
        Self { reason: Some(reason.into()) }
    }

    pub fn none() -> Self {
        Self::default()
    }
}

/// Fiat snapshot captured alongside the crypto amount at creation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiatSnapshot {
    pub fiat_amount_minor_units: i64,
    pub fiat_currency: String,
    pub exchange_rate: Decimal,
}

/// The on-chain observation attached once a transaction is detected
/// (spec.md §3, "Transaction observation").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionObservation {
    pub tx_hash: Option<String>,
    pub from_address: Option<String>,
    pub block_number: Option<u64>,
    pub confirmations: u64,
}

/// Discrepancy bookkeeping produced by amount-discrepancy classification
/// (spec.md §4.4).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscrepancyState {
    pub is_overpayment: bool,
    pub overpayment_amount: Option<Decimal>,
    pub is_underpayment: bool,
    pub underpayment_amount: Option<Decimal>,
    pub underpayment_deadline: Option<i64>,
    pub reconciled: bool,
    pub reconciled_at: Option<i64>,
}

/// Per-state timestamps, populated once on entry and never rewritten
/// (spec.md §3, invariant 4).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentTimestamps {
    pub created_at: i64,
    pub expires_at: i64,
    pub pending_at: Option<i64>,
    pub confirming_at: Option<i64>,
    pub confirmed_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub expired_at: Option<i64>,
    pub failed_at: Option<i64>,
}

/// One payment, exclusively owned and mutated by the
/// [`PaymentFlowStateMachine`](crate::payment::machine::PaymentFlowStateMachine).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: String,
    pub workspace_id: Option<String>,
    pub user_id: String,
    pub subscription_id: Option<String>,
    pub invoice_id: Option<String>,

    pub network: Network,
    pub currency: String,
    pub payment_address: String,
    pub derivation_index: u32,
    pub required_confirmations: u32,

    pub expected_amount: Decimal,
    pub received_amount: Decimal,
    pub fiat: FiatSnapshot,

    pub transaction: TransactionObservation,

    pub state: PaymentState,
    pub state_history: Vec<StateHistoryEntry>,
    pub version: u64,

    pub timestamps: PaymentTimestamps,
    pub failure_reason: Option<String>,

    pub discrepancy: DiscrepancyState,
}

impl PaymentRecord {
    /// Has this address already been bound to on-chain observation.
    pub fn has_transaction(&self) -> bool {
        self.transaction.tx_hash.is_some()
    }
}

/// Inputs to `create_payment` (spec.md §4.4, op 1).
#[derive(Debug, Clone)]
pub struct CreatePaymentRequest {
    pub id: String,
    pub workspace_id: Option<String>,
    pub user_id: String,
    pub subscription_id: Option<String>,
    pub invoice_id: Option<String>,
    pub network: Network,
    pub currency: String,
    pub expected_amount: Decimal,
    pub fiat: FiatSnapshot,
}

/// Result of a single state-changing operation: a before/after snapshot that
/// is returned even on failure (spec.md §4.4's "Public operations").
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub success: bool,
    pub previous_state: Option<PaymentState>,
    pub new_state: Option<PaymentState>,
    pub record: Option<PaymentRecord>,
    pub error: Option<String>,
}

impl TransitionOutcome {
    pub fn ok(previous_state: PaymentState, record: PaymentRecord) -> Self {
        Self {
            success: true,
            previous_state: Some(previous_state),
            new_state: Some(record.state),
            record: Some(record),
            error: None,
        }
    }

    /// Success that did not actually change state (e.g. a confirmation
    /// update that doesn't cross a threshold).
    pub fn unchanged(record: PaymentRecord) -> Self {
        Self {
            success: true,
            previous_state: Some(record.state),
            new_state: Some(record.state),
            record: Some(record),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            previous_state: None,
            new_state: None,
            record: None,
            error: Some(message.into()),
        }
    }

    pub fn err_with_state(previous_state: PaymentState, message: impl Into<String>) -> Self {
        Self {
            success: false,
            previous_state: Some(previous_state),
            new_state: None,
            record: None,
            error: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_matrix() {
        use PaymentState::*;
        assert!(Created.can_transition_to(Pending));
        assert!(Created.can_transition_to(Expired));
        assert!(Created.can_transition_to(Failed));
        assert!(!Created.can_transition_to(Confirmed));

        assert!(Confirmed.can_transition_to(Completed));
        assert!(Confirmed.can_transition_to(Refunding));
        assert!(Confirmed.can_transition_to(Failed));
        assert!(!Confirmed.can_transition_to(Pending));

        assert!(Completed.can_transition_to(Refunding));
        assert!(!Completed.can_transition_to(Failed));

        assert!(Refunding.can_transition_to(Completed));
        assert!(!Refunding.can_transition_to(Failed));

        assert!(Expired.allowed_targets().is_empty());
        assert!(Failed.allowed_targets().is_empty());
    }

    #[test]
    fn test_is_expirable() {
        assert!(PaymentState::Created.is_expirable());
        assert!(PaymentState::Pending.is_expirable());
        assert!(PaymentState::Confirming.is_expirable());
        assert!(!PaymentState::Confirmed.is_expirable());
        assert!(!PaymentState::Expired.is_expirable());
    }

    #[test]
    fn test_is_terminal() {
        assert!(PaymentState::Expired.is_terminal());
        assert!(PaymentState::Failed.is_terminal());
        assert!(!PaymentState::Completed.is_terminal());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(PaymentState::Confirming.to_string(), "confirming");
    }
}
