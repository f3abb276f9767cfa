//! Deterministic, in-memory crypto payment tracking: address issuance,
//! confirmation accumulation, a payment state machine, and reconciliation.
//!
//! The crate has no I/O of its own. Callers drive it with explicit `now`
//! timestamps and externally observed chain data (address, tx hash,
//! confirmation count, block number), and read results back through the
//! query surface on [`PaymentFlowStateMachine`].

pub mod chain_profile;
pub mod config;
pub mod confirmation;
pub mod deriver;
pub mod error;
pub mod logging;
pub mod payment;
pub mod reconciler;

pub use chain_profile::{ChainProfile, ChainProfileRegistry, Network, NetworkFamily};
pub use config::PaymentCoreConfig;
pub use deriver::{AddressDeriver, MasterSeed};
pub use error::{PaymentError, PaymentResult};
pub use logging::{LogEvent, LogLevel, LogSink, TracingLogSink};
pub use payment::{PaymentFlowStateMachine, PaymentRecord, PaymentState};
pub use reconciler::{Reconciler, ReconciliationSummary};
