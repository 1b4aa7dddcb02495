//! Batch payout generation
//!
//! A run examines every active restaurant for one currency and creates
//! at most one payout per (restaurant, currency). Correctness under
//! concurrent runs rests on two fences:
//!
//! 1. A per-(restaurant, currency) async mutex serializes decision
//!    units, so the balance read and the reservation write see the
//!    same posting set.
//! 2. Storage enforces (restaurant, currency, as_of) uniqueness at
//!    commit, which backstops runs from separate engine processes.
//!
//! A created payout reserves its full amount with a negative posting
//! in the same atomic write, so available funds can never be promised
//! twice.

use crate::types::{PayoutRunRequest, PayoutRunSummary, SkipReason, UnitOutcome};
use crate::{Error, Result};
use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use ledger_core::{
    balance::{available_breakdown, compute_balance},
    Currency, EntryType, InsertOutcome, Ledger, Payout, PayoutStatus, Posting, RestaurantId,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Creates payouts from available balances
pub struct PayoutGenerator {
    ledger: Arc<Ledger>,

    /// Per-(restaurant, currency) decision locks
    locks: DashMap<(RestaurantId, Currency), Arc<Mutex<()>>>,

    /// Minimum available balance worth paying out, minor units
    min_payout_cents: i64,
}

impl PayoutGenerator {
    /// Create a generator over an open ledger
    pub fn new(ledger: Arc<Ledger>, min_payout_cents: i64) -> Self {
        Self {
            ledger,
            locks: DashMap::new(),
            min_payout_cents,
        }
    }

    /// Run one payout batch: one decision unit per active restaurant,
    /// fanned out across tasks. A unit failure is recorded in the
    /// summary and never aborts the rest of the run.
    pub async fn run_payouts(self: &Arc<Self>, request: PayoutRunRequest) -> Result<PayoutRunSummary> {
        let restaurants = self.ledger.storage().list_active_restaurants()?;
        let min_amount_cents = request.min_amount_cents.unwrap_or(self.min_payout_cents);
        let mut summary = PayoutRunSummary::new(request.currency, request.as_of);
        summary.restaurants_examined = restaurants.len();

        info!(
            currency = %request.currency,
            as_of = %request.as_of,
            min_amount_cents,
            restaurants = restaurants.len(),
            "Starting payout run"
        );

        let mut join_set = JoinSet::new();
        for restaurant_id in restaurants {
            let generator = Arc::clone(self);
            let currency = request.currency;
            let as_of = request.as_of;
            join_set.spawn(async move {
                let outcome = generator
                    .generate_for_restaurant(&restaurant_id, currency, as_of, min_amount_cents)
                    .await;
                (restaurant_id, outcome)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            let (restaurant_id, outcome) =
                joined.map_err(|e| Error::Task(e.to_string()))?;
            match outcome {
                Ok(UnitOutcome::Created {
                    payout_id,
                    amount_cents,
                }) => {
                    summary.created += 1;
                    summary.total_amount_cents += amount_cents;
                    summary.payouts.push((restaurant_id, payout_id));
                }
                Ok(UnitOutcome::Skipped(reason)) => {
                    debug!(restaurant_id = %restaurant_id, ?reason, "Skipped");
                    summary.skipped += 1;
                }
                Err(e) => {
                    warn!(restaurant_id = %restaurant_id, error = %e, "Payout unit failed");
                    summary.failed += 1;
                }
            }
        }

        info!(
            currency = %summary.currency,
            created = summary.created,
            skipped = summary.skipped,
            failed = summary.failed,
            total_amount_cents = summary.total_amount_cents,
            "Payout run complete"
        );

        Ok(summary)
    }

    /// Decide and, if warranted, create one payout.
    ///
    /// The whole unit runs under the pair's lock so the snapshot it
    /// reads is the snapshot it reserves against.
    async fn generate_for_restaurant(
        &self,
        restaurant_id: &RestaurantId,
        currency: Currency,
        as_of: NaiveDate,
        min_amount_cents: i64,
    ) -> Result<UnitOutcome> {
        let lock = self
            .locks
            .entry((restaurant_id.clone(), currency))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let storage = self.ledger.storage();

        if storage.has_open_payout(restaurant_id, currency)? {
            return Ok(UnitOutcome::Skipped(SkipReason::OpenPayout));
        }

        // One snapshot, one instant. Balance, breakdown, and the
        // reserved amount all derive from these.
        let postings = storage.get_postings(restaurant_id, currency)?;
        let now = Utc::now();
        let balance = compute_balance(restaurant_id, currency, &postings, now);

        if balance.available_cents < min_amount_cents {
            return Ok(UnitOutcome::Skipped(SkipReason::BelowMinimum {
                available_cents: balance.available_cents,
            }));
        }

        let payout_id = Uuid::now_v7();
        let payout = Payout {
            payout_id,
            restaurant_id: restaurant_id.clone(),
            currency,
            amount_cents: balance.available_cents,
            as_of,
            status: PayoutStatus::Created,
            created_at: now,
            paid_at: None,
            failure_reason: None,
            items: available_breakdown(&postings, now),
        };
        let reserve = Posting {
            posting_id: Uuid::now_v7(),
            restaurant_id: restaurant_id.clone(),
            currency,
            amount_cents: -balance.available_cents,
            entry_type: EntryType::PayoutReserve,
            description: Some(format!("Reservation for payout {}", payout_id)),
            related_event_id: None,
            related_payout_id: Some(payout_id),
            recorded_at: now,
            available_at: None,
        };

        match storage.insert_payout_atomic(&payout, &reserve)? {
            InsertOutcome::Created => {
                self.ledger
                    .metrics()
                    .record_payout(PayoutStatus::Created.as_str());
                self.ledger
                    .metrics()
                    .record_posting(EntryType::PayoutReserve.as_str());
                info!(
                    payout_id = %payout_id,
                    restaurant_id = %restaurant_id,
                    currency = %currency,
                    amount_cents = payout.amount_cents,
                    "Created payout"
                );
                Ok(UnitOutcome::Created {
                    payout_id,
                    amount_cents: payout.amount_cents,
                })
            }
            InsertOutcome::AlreadyExists(_) => Ok(UnitOutcome::Skipped(SkipReason::AsOfTaken)),
        }
    }
}
