//! Main ledger orchestration layer
//!
//! Ties together storage, the maturity policy, and balance computation
//! into a high-level API for processor event ingestion.
//!
//! # Example
//!
//! ```no_run
//! use ledger_core::{Config, Ledger};
//!
//! fn main() -> ledger_core::Result<()> {
//!     let config = Config::default();
//!     let ledger = Ledger::open(config)?;
//!
//!     // Ingest event
//!     // let outcome = ledger.ingest_event(input)?;
//!
//!     Ok(())
//! }
//! ```

use crate::{
    balance::BalanceCalculator,
    maturity::MaturityPolicy,
    metrics::Metrics,
    storage::{InsertOutcome, Storage},
    types::{
        Balance, Currency, EntryType, EventType, Payout, PayoutStatus, Posting, ProcessorEvent,
        RestaurantId,
    },
    Config, Error, Result,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Normalized processor event, as handed over by the (external) webhook
/// layer after signature verification and shape validation.
#[derive(Debug, Clone)]
pub struct EventInput {
    /// Unique external event ID (idempotency key)
    pub event_id: String,

    /// Type of event
    pub event_type: EventType,

    /// Restaurant this event belongs to
    pub restaurant_id: RestaurantId,

    /// Currency
    pub currency: Currency,

    /// Gross amount in minor units
    pub amount_cents: i64,

    /// Processor fee in minor units
    pub fee_cents: i64,

    /// Business time at the processor
    pub occurred_at: DateTime<Utc>,

    /// Additional metadata
    pub metadata: HashMap<String, String>,
}

/// Whether an ingestion created the event or hit the idempotency key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStatus {
    /// First delivery: event and postings were written
    New,
    /// Repeat delivery: nothing was written
    Duplicate,
}

/// Result of an ingestion, always carrying the stored record
#[derive(Debug, Clone)]
pub struct Ingest {
    /// Created vs idempotent-hit
    pub status: IngestStatus,

    /// The stored event (first delivery's payload on a duplicate)
    pub event: ProcessorEvent,
}

/// Main ledger interface
pub struct Ledger {
    /// Storage backend
    storage: Arc<Storage>,

    /// Read-only balance queries
    calculator: BalanceCalculator,

    /// When postings mature
    policy: MaturityPolicy,

    /// Prometheus metrics
    metrics: Metrics,
}

impl Ledger {
    /// Open ledger with configuration
    pub fn open(config: Config) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config)?);
        let policy = MaturityPolicy::new(&config.maturity);
        let metrics = Metrics::new().map_err(|e| Error::Config(e.to_string()))?;

        Ok(Self {
            calculator: BalanceCalculator::new(storage.clone()),
            storage,
            policy,
            metrics,
        })
    }

    /// Ingest one processor event, idempotently.
    ///
    /// The atomic insert keyed by `event_id` is the only duplicate check;
    /// a repeat delivery returns the stored record with
    /// [`IngestStatus::Duplicate`] and no side effects. Validation
    /// failures reject before any write. Never retries.
    pub fn ingest_event(&self, input: EventInput) -> Result<Ingest> {
        let started = Instant::now();
        self.validate_input(&input)?;

        let event = ProcessorEvent {
            event_id: input.event_id,
            event_type: input.event_type,
            restaurant_id: input.restaurant_id,
            currency: input.currency,
            amount_cents: input.amount_cents,
            fee_cents: input.fee_cents,
            occurred_at: input.occurred_at,
            recorded_at: Utc::now(),
            metadata: input.metadata,
        };

        let (postings, mark_paid) = self.derive_postings(&event)?;

        let outcome = self
            .storage
            .insert_event_atomic(&event, &postings, mark_paid)?;

        self.metrics
            .record_ingest_duration(started.elapsed().as_secs_f64());

        match outcome {
            InsertOutcome::Created => {
                self.metrics.record_event(event.event_type.as_str());
                for posting in &postings {
                    self.metrics.record_posting(posting.entry_type.as_str());
                }
                if mark_paid.is_some() {
                    self.metrics.record_payout(PayoutStatus::Paid.as_str());
                }
                tracing::info!(
                    event_id = %event.event_id,
                    event_type = %event.event_type,
                    restaurant_id = %event.restaurant_id,
                    "Processed new event"
                );
                Ok(Ingest {
                    status: IngestStatus::New,
                    event,
                })
            }
            InsertOutcome::AlreadyExists(stored) => {
                self.metrics.record_duplicate();
                tracing::info!(event_id = %stored.event_id, "Idempotent hit, event already processed");
                Ok(Ingest {
                    status: IngestStatus::Duplicate,
                    event: stored,
                })
            }
        }
    }

    /// Current balance for a (restaurant, currency) pair
    pub fn get_balance(&self, restaurant_id: &RestaurantId, currency: Currency) -> Result<Balance> {
        self.calculator.get_balance(restaurant_id, currency)
    }

    /// Get event by its external id
    pub fn get_event(&self, event_id: &str) -> Result<ProcessorEvent> {
        self.storage.get_event(event_id)
    }

    /// Get payout by id, items embedded
    pub fn get_payout(&self, payout_id: Uuid) -> Result<Payout> {
        self.storage.get_payout(payout_id)
    }

    /// Hand a payout to the disbursement rail
    pub fn mark_payout_processing(&self, payout_id: Uuid) -> Result<Payout> {
        let payout =
            self.storage
                .update_payout_status(payout_id, PayoutStatus::Processing, None, None)?;
        self.metrics.record_payout(PayoutStatus::Processing.as_str());
        Ok(payout)
    }

    /// Record an operational disbursement failure.
    ///
    /// Only the status and reason change; the reservation posting stays.
    /// Returning the funds is a deliberate, separate compensating posting.
    pub fn mark_payout_failed(&self, payout_id: Uuid, reason: impl Into<String>) -> Result<Payout> {
        let payout = self.storage.update_payout_status(
            payout_id,
            PayoutStatus::Failed,
            None,
            Some(reason.into()),
        )?;
        self.metrics.record_payout(PayoutStatus::Failed.as_str());
        tracing::warn!(payout_id = %payout_id, "Payout failed; reservation kept");
        Ok(payout)
    }

    /// Direct storage access, for the payout engine's batch units
    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Maturity policy in effect
    pub fn policy(&self) -> &MaturityPolicy {
        &self.policy
    }

    /// Pre-write validation; failures leave no trace behind
    fn validate_input(&self, input: &EventInput) -> Result<()> {
        if input.event_id.is_empty() {
            return Err(Error::Validation("event_id must not be empty".to_string()));
        }

        if !input.restaurant_id.is_well_formed() {
            return Err(Error::Validation(format!(
                "Malformed restaurant id: {}",
                input.restaurant_id
            )));
        }

        if input.amount_cents < 0 {
            return Err(Error::Validation(format!(
                "Amount must be non-negative, got {}",
                input.amount_cents
            )));
        }

        if input.fee_cents < 0 {
            return Err(Error::Validation(format!(
                "Fee must be non-negative, got {}",
                input.fee_cents
            )));
        }

        Ok(())
    }

    /// Postings implied by an event, with maturity assigned exactly once
    fn derive_postings(&self, event: &ProcessorEvent) -> Result<(Vec<Posting>, Option<Uuid>)> {
        let mut postings = Vec::with_capacity(2);

        match event.event_type {
            EventType::ChargeSucceeded => {
                postings.push(self.event_posting(
                    event,
                    event.amount_cents,
                    EntryType::Sale,
                    format!("Sale from event {}", event.event_id),
                ));
                if event.fee_cents > 0 {
                    postings.push(self.event_posting(
                        event,
                        -event.fee_cents,
                        EntryType::Commission,
                        format!("Commission for event {}", event.event_id),
                    ));
                }
                Ok((postings, None))
            }
            EventType::RefundSucceeded => {
                // Fee is retained by policy: no commission reversal.
                postings.push(self.event_posting(
                    event,
                    -event.amount_cents,
                    EntryType::Refund,
                    format!("Refund from event {}", event.event_id),
                ));
                Ok((postings, None))
            }
            EventType::PayoutPaid => {
                // The reservation posting already exists from payout
                // creation; this only transitions the linked payout.
                let payout_id = event.linked_payout_id().ok_or_else(|| {
                    Error::Validation(format!(
                        "payout_paid event {} lacks a valid payout_id metadata entry",
                        event.event_id
                    ))
                })?;
                Ok((postings, Some(payout_id)))
            }
        }
    }

    fn event_posting(
        &self,
        event: &ProcessorEvent,
        amount_cents: i64,
        entry_type: EntryType,
        description: String,
    ) -> Posting {
        Posting {
            posting_id: Uuid::now_v7(),
            restaurant_id: event.restaurant_id.clone(),
            currency: event.currency,
            amount_cents,
            entry_type,
            description: Some(description),
            related_event_id: Some(event.event_id.clone()),
            related_payout_id: None,
            recorded_at: event.recorded_at,
            available_at: self.policy.available_at(entry_type, event.occurred_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ItemCategory, PayoutItem, METADATA_PAYOUT_ID};
    use chrono::Duration;

    fn create_test_ledger() -> (Ledger, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (Ledger::open(config).unwrap(), temp_dir)
    }

    fn charge(event_id: &str, restaurant: &str, amount: i64, fee: i64) -> EventInput {
        EventInput {
            event_id: event_id.to_string(),
            event_type: EventType::ChargeSucceeded,
            restaurant_id: RestaurantId::new(restaurant),
            currency: Currency::PEN,
            amount_cents: amount,
            fee_cents: fee,
            occurred_at: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn test_charge_produces_sale_and_commission() {
        let (ledger, _tmp) = create_test_ledger();

        let outcome = ledger
            .ingest_event(charge("evt_1", "res_a", 10000, 300))
            .unwrap();
        assert_eq!(outcome.status, IngestStatus::New);

        let postings = ledger
            .storage()
            .get_postings(&RestaurantId::new("res_a"), Currency::PEN)
            .unwrap();
        assert_eq!(postings.len(), 2);

        let sale = postings
            .iter()
            .find(|p| p.entry_type == EntryType::Sale)
            .unwrap();
        assert_eq!(sale.amount_cents, 10000);
        assert!(sale.available_at.is_some());

        let commission = postings
            .iter()
            .find(|p| p.entry_type == EntryType::Commission)
            .unwrap();
        assert_eq!(commission.amount_cents, -300);
        assert_eq!(commission.available_at, None);
    }

    #[test]
    fn test_zero_fee_charge_has_no_commission() {
        let (ledger, _tmp) = create_test_ledger();
        ledger
            .ingest_event(charge("evt_1", "res_a", 10000, 0))
            .unwrap();

        let postings = ledger
            .storage()
            .get_postings(&RestaurantId::new("res_a"), Currency::PEN)
            .unwrap();
        assert_eq!(postings.len(), 1);
        assert_eq!(postings[0].entry_type, EntryType::Sale);
    }

    #[test]
    fn test_duplicate_delivery_is_a_noop() {
        let (ledger, _tmp) = create_test_ledger();

        let first = ledger
            .ingest_event(charge("evt_1", "res_a", 10000, 300))
            .unwrap();
        assert_eq!(first.status, IngestStatus::New);

        // Repeat with a divergent payload: the stored record wins.
        let repeat = ledger
            .ingest_event(charge("evt_1", "res_a", 555, 0))
            .unwrap();
        assert_eq!(repeat.status, IngestStatus::Duplicate);
        assert_eq!(repeat.event.amount_cents, 10000);

        let balance = ledger
            .get_balance(&RestaurantId::new("res_a"), Currency::PEN)
            .unwrap();
        assert_eq!(balance.total_cents, 9700);
    }

    #[test]
    fn test_charge_then_refund_retains_commission() {
        let (ledger, _tmp) = create_test_ledger();

        ledger
            .ingest_event(charge("evt_1", "res_a", 10000, 300))
            .unwrap();

        let mut refund = charge("evt_2", "res_a", 10000, 0);
        refund.event_type = EventType::RefundSucceeded;
        ledger.ingest_event(refund).unwrap();

        let balance = ledger
            .get_balance(&RestaurantId::new("res_a"), Currency::PEN)
            .unwrap();
        // +10000 sale (pending) - 300 commission - 10000 refund
        assert_eq!(balance.total_cents, -300);
    }

    #[test]
    fn test_matured_charge_nets_into_available() {
        let (ledger, _tmp) = create_test_ledger();

        let mut input = charge("evt_1", "res_a", 10000, 300);
        // Occurred long enough ago that the 7-day hold has lapsed.
        input.occurred_at = Utc::now() - Duration::days(8);
        ledger.ingest_event(input).unwrap();

        let balance = ledger
            .get_balance(&RestaurantId::new("res_a"), Currency::PEN)
            .unwrap();
        assert_eq!(balance.available_cents, 9700);
        assert_eq!(balance.pending_cents, 0);
    }

    #[test]
    fn test_fresh_charge_is_pending() {
        let (ledger, _tmp) = create_test_ledger();
        ledger
            .ingest_event(charge("evt_1", "res_a", 10000, 300))
            .unwrap();

        let balance = ledger
            .get_balance(&RestaurantId::new("res_a"), Currency::PEN)
            .unwrap();
        assert_eq!(balance.pending_cents, 10000);
        assert_eq!(balance.available_cents, -300);
        assert!(balance.last_event_at.is_some());
    }

    #[test]
    fn test_unknown_restaurant_balance_is_zero() {
        let (ledger, _tmp) = create_test_ledger();
        let balance = ledger
            .get_balance(&RestaurantId::new("res_ghost"), Currency::PEN)
            .unwrap();
        assert_eq!(balance.total_cents, 0);
        assert_eq!(balance.last_event_at, None);
    }

    #[test]
    fn test_validation_rejects_before_write() {
        let (ledger, _tmp) = create_test_ledger();

        let bad_id = charge("evt_1", "merchant_a", 10000, 300);
        assert!(matches!(
            ledger.ingest_event(bad_id),
            Err(Error::Validation(_))
        ));

        let mut negative = charge("evt_2", "res_a", -1, 0);
        negative.event_type = EventType::ChargeSucceeded;
        assert!(matches!(
            ledger.ingest_event(negative),
            Err(Error::Validation(_))
        ));

        // Nothing landed for either attempt.
        assert!(matches!(
            ledger.get_event("evt_1"),
            Err(Error::EventNotFound(_))
        ));
        assert!(matches!(
            ledger.get_event("evt_2"),
            Err(Error::EventNotFound(_))
        ));
    }

    #[test]
    fn test_delimiter_in_restaurant_id_cannot_alias_another_scan() {
        let (ledger, _tmp) = create_test_ledger();
        ledger
            .ingest_event(charge("evt_1", "res_x", 10000, 0))
            .unwrap();

        // "res_x|USD" would index its PEN postings under a key that
        // extends res_x's USD scan prefix; it must never be written.
        let aliased = charge("evt_2", "res_x|USD", 77700, 0);
        assert!(matches!(
            ledger.ingest_event(aliased),
            Err(Error::Validation(_))
        ));

        let usd = ledger
            .storage()
            .get_postings(&RestaurantId::new("res_x"), Currency::USD)
            .unwrap();
        assert!(usd.is_empty());
    }

    #[test]
    fn test_payout_paid_transitions_linked_payout() {
        let (ledger, _tmp) = create_test_ledger();
        let rid = RestaurantId::new("res_a");

        let payout_id = Uuid::now_v7();
        let payout = Payout {
            payout_id,
            restaurant_id: rid.clone(),
            currency: Currency::PEN,
            amount_cents: 5000,
            as_of: Utc::now().date_naive(),
            status: PayoutStatus::Created,
            created_at: Utc::now(),
            paid_at: None,
            failure_reason: None,
            items: vec![PayoutItem {
                category: ItemCategory::NetSales,
                amount_cents: 5000,
            }],
        };
        let reserve = Posting {
            posting_id: Uuid::now_v7(),
            restaurant_id: rid.clone(),
            currency: Currency::PEN,
            amount_cents: -5000,
            entry_type: EntryType::PayoutReserve,
            description: None,
            related_event_id: None,
            related_payout_id: Some(payout_id),
            recorded_at: Utc::now(),
            available_at: None,
        };
        ledger
            .storage()
            .insert_payout_atomic(&payout, &reserve)
            .unwrap();

        let mut paid = charge("evt_paid", "res_a", 5000, 0);
        paid.event_type = EventType::PayoutPaid;
        paid.metadata
            .insert(METADATA_PAYOUT_ID.to_string(), payout_id.to_string());
        let outcome = ledger.ingest_event(paid).unwrap();
        assert_eq!(outcome.status, IngestStatus::New);

        let stored = ledger.get_payout(payout_id).unwrap();
        assert_eq!(stored.status, PayoutStatus::Paid);
        assert!(stored.paid_at.is_some());

        // No new postings: the reservation already exists.
        let postings = ledger.storage().get_postings(&rid, Currency::PEN).unwrap();
        assert_eq!(postings.len(), 1);
    }

    #[test]
    fn test_payout_paid_without_link_is_validation_failure() {
        let (ledger, _tmp) = create_test_ledger();

        let mut paid = charge("evt_paid", "res_a", 5000, 0);
        paid.event_type = EventType::PayoutPaid;
        assert!(matches!(
            ledger.ingest_event(paid),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_mark_payout_failed_keeps_reservation() {
        let (ledger, _tmp) = create_test_ledger();
        let rid = RestaurantId::new("res_a");

        let payout_id = Uuid::now_v7();
        let payout = Payout {
            payout_id,
            restaurant_id: rid.clone(),
            currency: Currency::PEN,
            amount_cents: 5000,
            as_of: Utc::now().date_naive(),
            status: PayoutStatus::Created,
            created_at: Utc::now(),
            paid_at: None,
            failure_reason: None,
            items: vec![PayoutItem {
                category: ItemCategory::NetSales,
                amount_cents: 5000,
            }],
        };
        let reserve = Posting {
            posting_id: Uuid::now_v7(),
            restaurant_id: rid.clone(),
            currency: Currency::PEN,
            amount_cents: -5000,
            entry_type: EntryType::PayoutReserve,
            description: None,
            related_event_id: None,
            related_payout_id: Some(payout_id),
            recorded_at: Utc::now(),
            available_at: None,
        };
        ledger
            .storage()
            .insert_payout_atomic(&payout, &reserve)
            .unwrap();

        let failed = ledger.mark_payout_failed(payout_id, "rail timeout").unwrap();
        assert_eq!(failed.status, PayoutStatus::Failed);

        // The reservation debit is still in force.
        let balance = ledger.get_balance(&rid, Currency::PEN).unwrap();
        assert_eq!(balance.available_cents, -5000);
    }
}
