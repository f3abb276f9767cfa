//! The Payment Flow State Machine and its record types.

pub mod machine;
pub mod types;

pub use machine::PaymentFlowStateMachine;
pub use types::{
    CreatePaymentRequest, DiscrepancyState, FiatSnapshot, PaymentRecord, PaymentState,
    PaymentTimestamps, StateHistoryEntry, TransactionObservation, TransitionMetadata,
    TransitionOutcome,
};
