//! Payment Flow State Machine (spec.md §4.4)
//!
//! The authoritative store of payment records and the only entity that
//! mutates them. Holds the payment map and the address→id index behind a
//! `parking_lot::RwLock`, the same interior-mutability shape the rest of this
//! codebase uses for shared caches.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use rust_decimal::Decimal;

use crate::chain_profile::ChainProfileRegistry;
use crate::confirmation;
use crate::config::PaymentCoreConfig;
use crate::deriver::AddressDeriver;
use crate::error::{PaymentError, PaymentResult};
use crate::logging::{default_sink, LogEvent, LogSink};
use crate::payment::types::{
    CreatePaymentRequest, DiscrepancyState, PaymentRecord, PaymentState, PaymentTimestamps,
    StateHistoryEntry, TransitionMetadata, TransitionOutcome,
};

/// Fixed-point scale used when rendering discrepancy magnitudes (spec.md §3,
/// "8-decimal string").
const DECIMAL_SCALE: u32 = 8;

/// The authoritative store.
pub struct PaymentFlowStateMachine {
    config: PaymentCoreConfig,
    deriver: AddressDeriver,
    sink: Arc<dyn LogSink>,
    payments: RwLock<HashMap<String, PaymentRecord>>,
    address_index: RwLock<HashMap<String, String>>,
}

impl PaymentFlowStateMachine {
    pub fn new(config: PaymentCoreConfig) -> Self {
        Self::with_sink(config, default_sink())
    }

    pub fn with_sink(config: PaymentCoreConfig, sink: Arc<dyn LogSink>) -> Self {
        let deriver = AddressDeriver::new(config.master_seed.clone());
        Self {
            config,
            deriver,
            sink,
            payments: RwLock::new(HashMap::new()),
            address_index: RwLock::new(HashMap::new()),
        }
    }

    /// Drop every tracked payment. Exposed only for test isolation.
    pub fn reset(&self) {
        self.payments.write().clear();
        self.address_index.write().clear();
    }

    pub fn chains(&self) -> &ChainProfileRegistry {
        &self.config.chains
    }

    fn log_info(&self, event: &'static str, payment_id: impl Into<String>, message: impl Into<String>) {
        self.sink.record(LogEvent::info(event, payment_id, message));
    }

    fn log_security(&self, event: &'static str, payment_id: impl Into<String>, message: impl Into<String>) {
        self.sink.record(LogEvent::security(event, payment_id, message));
    }

    // ---- op 1: create_payment ------------------------------------------

    pub fn create_payment(&self, req: CreatePaymentRequest, now: i64) -> PaymentResult<PaymentRecord> {
        if !self.config.chains.is_supported(req.network) {
            return Err(PaymentError::UnsupportedNetwork(req.network.to_string()));
        }
        let profile = self.config.chains.get(req.network)?;
        if !profile.supports_currency(&req.currency) {
            return Err(PaymentError::UnsupportedCurrency {
                network: req.network.to_string(),
                currency: req.currency.clone(),
            });
        }

        {
            let payments = self.payments.read();
            if payments.contains_key(&req.id) {
                return Err(PaymentError::DuplicatePayment(req.id));
            }
        }

        let derived = self
            .deriver
            .derive(&req.network.to_string(), profile.family, &req.id)?;
        let address_lower = derived.address.to_lowercase();

        {
            let index = self.address_index.read();
            if index.contains_key(&address_lower) {
                return Err(PaymentError::AddressCollision {
                    payment_id: req.id,
                    address: derived.address,
                });
            }
        }

        let record = PaymentRecord {
            id: req.id.clone(),
            workspace_id: req.workspace_id,
            user_id: req.user_id,
            subscription_id: req.subscription_id,
            invoice_id: req.invoice_id,
            network: req.network,
            currency: req.currency,
            payment_address: derived.address,
            derivation_index: derived.derivation_index,
            required_confirmations: profile.required_confirmations,
            expected_amount: req.expected_amount,
            received_amount: Decimal::ZERO,
            fiat: req.fiat,
            transaction: Default::default(),
            state: PaymentState::Created,
            state_history: Vec::new(),
            version: 0,
            timestamps: PaymentTimestamps {
                created_at: now,
                expires_at: now + self.config.payment_window_ms,
                ..Default::default()
            },
            failure_reason: None,
            discrepancy: DiscrepancyState::default(),
        };

        self.address_index
            .write()
            .insert(address_lower, record.id.clone());
        self.payments.write().insert(record.id.clone(), record.clone());

        self.log_info("payment.created", &record.id, format!(
            "created payment on {} for {}",
            record.network, record.expected_amount
        ));

        Ok(record)
    }

    // ---- op 8: transition (the primitive every other op is built on) ----

    /// Attempt to move `id` from its current state to `to`, gated on
    /// `expected_version`. Appends a history entry and stamps the
    /// state-specific timestamp on success.
    pub fn transition(
        &self,
        id: &str,
        to: PaymentState,
        trigger: &str,
        expected_version: u64,
        metadata: TransitionMetadata,
        now: i64,
    ) -> TransitionOutcome {
        let mut payments = self.payments.write();
        let record = match payments.get_mut(id) {
            Some(r) => r,
            None => return TransitionOutcome::err(format!("unknown payment: {}", id)),
        };

        if record.version != expected_version {
            return TransitionOutcome::err_with_state(
                record.state,
                format!(
                    "version mismatch: expected {}, found {}",
                    expected_version, record.version
                ),
            );
        }

        let from = record.state;
        if !from.can_transition_to(to) {
            return TransitionOutcome::err_with_state(
                from,
                format!("invalid transition from {} to {}", from, to),
            );
        }

        record.state_history.push(StateHistoryEntry {
            from,
            to,
            trigger: trigger.to_string(),
            timestamp: now,
            metadata: metadata.clone(),
        });
        record.state = to;
        record.version += 1;
        stamp_timestamp(&mut record.timestamps, to, now);
        if to == PaymentState::Failed {
            record.failure_reason = metadata.reason.clone();
        }

        let updated = record.clone();
        drop(payments);

        self.log_info(
            "payment.transition",
            id,
            format!("{} -> {} via {}", from, to, trigger),
        );

        TransitionOutcome::ok(from, updated)
    }

    // ---- op 2: record_transaction_detected ------------------------------

    pub fn record_transaction_detected(
        &self,
        id: &str,
        tx_hash: &str,
        from_address: &str,
        received_amount: Decimal,
        now: i64,
    ) -> TransitionOutcome {
        let network = {
            let payments = self.payments.read();
            match payments.get(id) {
                Some(r) => r.network,
                None => return TransitionOutcome::err(format!("unknown payment: {}", id)),
            }
        };

        let profile = match self.config.chains.get(network) {
            Ok(p) => p,
            Err(e) => return TransitionOutcome::err(e.to_string()),
        };
        if !profile.validate_tx_hash(tx_hash) {
            return TransitionOutcome::err(format!(
                "invalid tx hash for network {}: {}",
                network, tx_hash
            ));
        }

        let expected_version = {
            let mut payments = self.payments.write();
            let record = match payments.get_mut(id) {
                Some(r) => r,
                None => return TransitionOutcome::err(format!("unknown payment: {}", id)),
            };
            record.transaction.tx_hash = Some(tx_hash.to_string());
            record.transaction.from_address = Some(from_address.to_string());
            record.received_amount = received_amount;
            classify_discrepancy(record, &self.config);
            record.version
        };

        self.log_info(
            "payment.tx_detected",
            id,
            format!("tx {} detected, amount {}", tx_hash, received_amount),
        );

        self.transition(
            id,
            PaymentState::Pending,
            "transaction_detected",
            expected_version,
            TransitionMetadata::none(),
            now,
        )
    }

    // ---- op 3: update_confirmations -------------------------------------

    pub fn update_confirmations(
        &self,
        id: &str,
        new_confirmations: u64,
        block_number: Option<u64>,
        now: i64,
    ) -> TransitionOutcome {
        let network = {
            let payments = self.payments.read();
            match payments.get(id) {
                Some(r) => r.network,
                None => return TransitionOutcome::err(format!("unknown payment: {}", id)),
            }
        };

        let mut payments = self.payments.write();
        let record = match payments.get_mut(id) {
            Some(r) => r,
            None => return TransitionOutcome::err(format!("unknown payment: {}", id)),
        };

        let previous_confirmations = record.transaction.confirmations;
        let is_reorg = confirmation::detect_reorg(previous_confirmations as u32, new_confirmations as u32);

        if is_reorg {
            self.log_security(
                "payment.reorg_detected",
                id,
                format!(
                    "confirmations decreased from {} to {} (block reorganization detected after confirmation)",
                    previous_confirmations, new_confirmations
                ),
            );

            if record.state == PaymentState::Confirmed {
                let expected_version = record.version;
                drop(payments);
                return self.transition(
                    id,
                    PaymentState::Failed,
                    "reorg",
                    expected_version,
                    TransitionMetadata::with_reason("block reorganization detected after confirmation"),
                    now,
                );
            }

            // Confirming: keep state, update the field, no version bump
            // (spec.md §9, "Reorg-while-Confirming version bump" — choice a).
            record.transaction.confirmations = new_confirmations;
            if let Some(b) = block_number {
                record.transaction.block_number = Some(b);
            }
            return TransitionOutcome::unchanged(record.clone());
        }

        record.transaction.confirmations = new_confirmations;
        if let Some(b) = block_number {
            record.transaction.block_number = Some(b);
        }

        let current_state = record.state;
        let expected_version = record.version;
        drop(payments);

        match current_state {
            PaymentState::Pending if new_confirmations > 0 => self.transition(
                id,
                PaymentState::Confirming,
                "confirmation_observed",
                expected_version,
                TransitionMetadata::none(),
                now,
            ),
            PaymentState::Confirming => {
                match confirmation::is_confirmed(&self.config.chains, network, new_confirmations as u32) {
                    Ok(true) => self.transition(
                        id,
                        PaymentState::Confirmed,
                        "confirmation_threshold_met",
                        expected_version,
                        TransitionMetadata::none(),
                        now,
                    ),
                    Ok(false) => TransitionOutcome::unchanged(self.get_payment(id).expect("just updated")),
                    Err(e) => TransitionOutcome::err(e.to_string()),
                }
            }
            _ => TransitionOutcome::unchanged(self.get_payment(id).expect("just updated")),
        }
    }

    // ---- op 4: complete_payment ------------------------------------------

    pub fn complete_payment(&self, id: &str, now: i64) -> TransitionOutcome {
        let expected_version = match self.version_of(id) {
            Ok(v) => v,
            Err(e) => return TransitionOutcome::err(e.to_string()),
        };
        self.transition(
            id,
            PaymentState::Completed,
            "complete",
            expected_version,
            TransitionMetadata::none(),
            now,
        )
    }

    // ---- op 5: fail_payment -----------------------------------------------

    pub fn fail_payment(&self, id: &str, reason: &str, now: i64) -> TransitionOutcome {
        let expected_version = match self.version_of(id) {
            Ok(v) => v,
            Err(e) => return TransitionOutcome::err(e.to_string()),
        };
        self.transition(
            id,
            PaymentState::Failed,
            "fail",
            expected_version,
            TransitionMetadata::with_reason(reason),
            now,
        )
    }

    // ---- op 6: expire_payment ----------------------------------------------

    pub fn expire_payment(&self, id: &str, now: i64) -> TransitionOutcome {
        let (expected_version, expires_at, state) = {
            let payments = self.payments.read();
            match payments.get(id) {
                Some(r) => (r.version, r.timestamps.expires_at, r.state),
                None => return TransitionOutcome::err(format!("unknown payment: {}", id)),
            }
        };

        if now < expires_at {
            return TransitionOutcome::err_with_state(state, format!("payment {} is not yet expired", id));
        }
        if !state.is_expirable() {
            return TransitionOutcome::err_with_state(
                state,
                format!("payment {} cannot expire from state {}", id, state),
            );
        }

        self.transition(
            id,
            PaymentState::Expired,
            "expire",
            expected_version,
            TransitionMetadata::none(),
            now,
        )
    }

    // ---- op 7: process_expired_payments -------------------------------------

    pub fn process_expired_payments(&self, now: i64) -> Vec<PaymentRecord> {
        let candidates: Vec<(String, u64)> = {
            let payments = self.payments.read();
            payments
                .values()
                .filter(|r| now >= r.timestamps.expires_at && r.state.is_expirable())
                .map(|r| (r.id.clone(), r.version))
                .collect()
        };

        let mut expired = Vec::new();
        for (id, version) in candidates {
            let outcome = self.transition(
                &id,
                PaymentState::Expired,
                "expire_sweep",
                version,
                TransitionMetadata::none(),
                now,
            );
            if outcome.success {
                if let Some(record) = outcome.record {
                    expired.push(record);
                }
            }
        }
        expired
    }

    fn version_of(&self, id: &str) -> PaymentResult<u64> {
        self.payments
            .read()
            .get(id)
            .map(|r| r.version)
            .ok_or_else(|| PaymentError::UnknownPayment(id.to_string()))
    }

    // ---- queries -------------------------------------------------------

    pub fn get_payment(&self, id: &str) -> Option<PaymentRecord> {
        self.payments.read().get(id).cloned()
    }

    pub fn get_payment_by_address(&self, address: &str) -> Option<PaymentRecord> {
        let id = self.address_index.read().get(&address.to_lowercase()).cloned()?;
        self.get_payment(&id)
    }

    pub fn get_payments_by_state(&self, state: PaymentState) -> Vec<PaymentRecord> {
        self.payments
            .read()
            .values()
            .filter(|r| r.state == state)
            .cloned()
            .collect()
    }

    pub fn get_payments_by_workspace(&self, workspace_id: &str) -> Vec<PaymentRecord> {
        self.payments
            .read()
            .values()
            .filter(|r| r.workspace_id.as_deref() == Some(workspace_id))
            .cloned()
            .collect()
    }

    pub fn get_state_distribution(&self) -> HashMap<PaymentState, u64> {
        let mut dist: HashMap<PaymentState, u64> =
            PaymentState::ALL.iter().map(|s| (*s, 0)).collect();
        for record in self.payments.read().values() {
            *dist.entry(record.state).or_insert(0) += 1;
        }
        dist
    }

    pub fn total_payments(&self) -> usize {
        self.payments.read().len()
    }

    /// All payments, cloned. Used by the reconciler's full-population sweep.
    pub(crate) fn all_payments(&self) -> Vec<PaymentRecord> {
        self.payments.read().values().cloned().collect()
    }

    /// Apply an in-place update to a record without going through the
    /// transition matrix. Used by the reconciler to stamp `reconciled` /
    /// `reconciled_at` — a non-transitioning field update, like the reorg
    /// path in `update_confirmations`.
    pub(crate) fn mark_reconciled(&self, id: &str, now: i64) {
        if let Some(record) = self.payments.write().get_mut(id) {
            if !record.discrepancy.reconciled {
                record.discrepancy.reconciled = true;
                record.discrepancy.reconciled_at = Some(now);
            }
        }
    }
}

fn stamp_timestamp(timestamps: &mut PaymentTimestamps, state: PaymentState, now: i64) {
    match state {
        PaymentState::Pending => timestamps.pending_at.get_or_insert(now),
        PaymentState::Confirming => timestamps.confirming_at.get_or_insert(now),
        PaymentState::Confirmed => timestamps.confirmed_at.get_or_insert(now),
        PaymentState::Completed => timestamps.completed_at.get_or_insert(now),
        PaymentState::Expired => timestamps.expired_at.get_or_insert(now),
        PaymentState::Failed => timestamps.failed_at.get_or_insert(now),
        PaymentState::Created | PaymentState::Refunding => return,
    };
}

/// Amount-discrepancy classification (spec.md §4.4).
fn classify_discrepancy(record: &mut PaymentRecord, config: &PaymentCoreConfig) {
    let e = record.expected_amount;
    let r = record.received_amount;

    if e.is_zero() {
        return;
    }

    let d = r - e;
    let ratio = d.abs() / e;

    if d > Decimal::ZERO && ratio > config.overpayment_threshold {
        record.discrepancy.is_overpayment = true;
        record.discrepancy.overpayment_amount = Some(d.round_dp(DECIMAL_SCALE));
        record.discrepancy.is_underpayment = false;
        record.discrepancy.underpayment_amount = None;
        record.discrepancy.underpayment_deadline = None;
    } else if d < Decimal::ZERO && ratio > config.underpayment_tolerance {
        let anchor = record.timestamps.pending_at.unwrap_or(record.timestamps.created_at);
        record.discrepancy.is_underpayment = true;
        record.discrepancy.underpayment_amount = Some(d.abs().round_dp(DECIMAL_SCALE));
        record.discrepancy.underpayment_deadline =
            Some(anchor + config.underpayment_grace_period_ms);
        record.discrepancy.is_overpayment = false;
        record.discrepancy.overpayment_amount = None;
    } else {
        record.discrepancy.is_overpayment = false;
        record.discrepancy.overpayment_amount = None;
        record.discrepancy.is_underpayment = false;
        record.discrepancy.underpayment_amount = None;
        record.discrepancy.underpayment_deadline = None;
    }
}
