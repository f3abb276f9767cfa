//! Core error types
//!
//! Every fallible operation in this crate returns [`PaymentError`] rather than
//! panicking. The one documented exception is address collision during
//! payment creation, which is still returned as a typed error
//! ([`PaymentError::AddressCollision`]) even though the specification treats
//! it as a programmer-level fault — callers decide how loudly to surface it.

use thiserror::Error;

/// Errors surfaced by the payment core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaymentError {
    /// Operation referenced a payment id that was never created.
    #[error("unknown payment: {0}")]
    UnknownPayment(String),

    /// `create_payment` referenced a network with no chain profile.
    #[error("unsupported network: {0}")]
    UnsupportedNetwork(String),

    /// `create_payment` referenced a currency not in the network's token set.
    #[error("unsupported currency {currency} on network {network}")]
    UnsupportedCurrency { network: String, currency: String },

    /// `create_payment` referenced an id that already exists.
    #[error("duplicate payment: {0}")]
    DuplicatePayment(String),

    /// The address deriver produced an address that is already indexed to a
    /// different payment. Indicates a derivation bug or seed reuse; returned
    /// rather than panicking so `create_payment` can refuse cleanly.
    #[error("address collision for payment {payment_id}: address {address} already in use")]
    AddressCollision { payment_id: String, address: String },

    /// `record_transaction_detected` received a hash that fails the
    /// network's shape validator.
    #[error("invalid tx hash for network {network}: {hash}")]
    InvalidTxHash { network: String, hash: String },

    /// Requested transition target is not reachable from the current state.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Compare-and-swap failed: the caller's `expected_version` is stale.
    #[error("version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u64, found: u64 },

    /// `expire_payment` called before `expires_at`.
    #[error("payment {0} is not yet expired")]
    NotYetExpired(String),

    /// `expire_payment` called while the payment is in a non-expirable
    /// state (anything other than Created/Pending/Confirming).
    #[error("payment {id} cannot expire from state {state}")]
    NotExpirable { id: String, state: String },

    /// The chain profile registry (or confirmation tracker) was queried
    /// about a network it has no profile for.
    #[error("unknown network: {0}")]
    UnknownNetwork(String),
}

/// Convenience alias used throughout the crate.
pub type PaymentResult<T> = std::result::Result<T, PaymentError>;
