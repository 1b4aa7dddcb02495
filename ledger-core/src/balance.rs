//! Balance computation as a fold over the posting log
//!
//! Balances are never stored. Every query folds the postings of one
//! (restaurant, currency) pair at a single `now` instant, so a balance
//! cannot drift from the ledger and a posting moves from pending to
//! available at its maturity instant without any write. Summation is
//! commutative: out-of-order arrival relative to `occurred_at` changes
//! nothing.

use crate::storage::Storage;
use crate::types::{Balance, Currency, EntryType, ItemCategory, PayoutItem, Posting, RestaurantId};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Fold a posting slice into a balance snapshot at `now`.
///
/// available = Σ amount where `available_at` is None or ≤ now;
/// pending = Σ amount where `available_at` > now; total = available +
/// pending. `last_event_at` is the newest `recorded_at` among postings
/// that came from a processor event.
pub fn compute_balance(
    restaurant_id: &RestaurantId,
    currency: Currency,
    postings: &[Posting],
    now: DateTime<Utc>,
) -> Balance {
    let mut available = 0i64;
    let mut pending = 0i64;
    let mut last_event_at: Option<DateTime<Utc>> = None;

    for posting in postings {
        if posting.is_available(now) {
            available += posting.amount_cents;
        } else {
            pending += posting.amount_cents;
        }

        if posting.related_event_id.is_some() {
            last_event_at = match last_event_at {
                Some(prev) if prev >= posting.recorded_at => Some(prev),
                _ => Some(posting.recorded_at),
            };
        }
    }

    Balance {
        restaurant_id: restaurant_id.clone(),
        currency,
        available_cents: available,
        pending_cents: pending,
        total_cents: available + pending,
        last_event_at,
    }
}

/// Per-category breakdown of the available balance at `now`.
///
/// Categories with a zero sum are omitted. Because the same availability
/// filter feeds [`compute_balance`], the returned item amounts sum to the
/// available balance of the same snapshot; earlier reservations show up
/// under `prior_payouts`.
pub fn available_breakdown(postings: &[Posting], now: DateTime<Utc>) -> Vec<PayoutItem> {
    let mut net_sales = 0i64;
    let mut fees = 0i64;
    let mut refunds = 0i64;
    let mut prior_payouts = 0i64;

    for posting in postings.iter().filter(|p| p.is_available(now)) {
        match posting.entry_type {
            EntryType::Sale => net_sales += posting.amount_cents,
            EntryType::Commission => fees += posting.amount_cents,
            EntryType::Refund => refunds += posting.amount_cents,
            EntryType::PayoutReserve => prior_payouts += posting.amount_cents,
        }
    }

    let mut items = Vec::new();
    for (category, amount_cents) in [
        (ItemCategory::NetSales, net_sales),
        (ItemCategory::Fees, fees),
        (ItemCategory::Refunds, refunds),
        (ItemCategory::PriorPayouts, prior_payouts),
    ] {
        if amount_cents != 0 {
            items.push(PayoutItem {
                category,
                amount_cents,
            });
        }
    }

    items
}

/// Read-only balance queries over the ledger store
#[derive(Clone)]
pub struct BalanceCalculator {
    storage: Arc<Storage>,
}

impl BalanceCalculator {
    /// Create calculator over a store
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Current balance for a (restaurant, currency) pair.
    ///
    /// No postings is a zero balance, not an error.
    pub fn get_balance(
        &self,
        restaurant_id: &RestaurantId,
        currency: Currency,
    ) -> crate::Result<Balance> {
        let postings = self.storage.get_postings(restaurant_id, currency)?;
        Ok(compute_balance(
            restaurant_id,
            currency,
            &postings,
            Utc::now(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn posting(
        amount: i64,
        entry_type: EntryType,
        available_at: Option<DateTime<Utc>>,
        event: Option<&str>,
    ) -> Posting {
        Posting {
            posting_id: Uuid::now_v7(),
            restaurant_id: RestaurantId::new("res_a"),
            currency: Currency::PEN,
            amount_cents: amount,
            entry_type,
            description: None,
            related_event_id: event.map(|s| s.to_string()),
            related_payout_id: None,
            recorded_at: Utc::now(),
            available_at,
        }
    }

    #[test]
    fn test_empty_postings_zero_balance() {
        let rid = RestaurantId::new("res_a");
        let balance = compute_balance(&rid, Currency::PEN, &[], Utc::now());
        assert_eq!(balance.available_cents, 0);
        assert_eq!(balance.pending_cents, 0);
        assert_eq!(balance.total_cents, 0);
        assert_eq!(balance.last_event_at, None);
    }

    #[test]
    fn test_available_plus_pending_is_total() {
        let now = Utc::now();
        let postings = vec![
            posting(10000, EntryType::Sale, Some(now + Duration::days(7)), Some("e1")),
            posting(-300, EntryType::Commission, None, Some("e1")),
            posting(-2000, EntryType::Refund, None, Some("e2")),
        ];

        let rid = RestaurantId::new("res_a");
        let balance = compute_balance(&rid, Currency::PEN, &postings, now);
        assert_eq!(balance.available_cents, -2300);
        assert_eq!(balance.pending_cents, 10000);
        assert_eq!(balance.total_cents, 7700);
        assert_eq!(
            balance.total_cents,
            balance.available_cents + balance.pending_cents
        );
    }

    #[test]
    fn test_maturity_instant_flips_without_write() {
        let now = Utc::now();
        let matures = now + Duration::days(7);
        let postings = vec![posting(10000, EntryType::Sale, Some(matures), Some("e1"))];
        let rid = RestaurantId::new("res_a");

        let before = compute_balance(&rid, Currency::PEN, &postings, now);
        assert_eq!(before.available_cents, 0);
        assert_eq!(before.pending_cents, 10000);

        // At the maturity instant itself the posting is available.
        let at = compute_balance(&rid, Currency::PEN, &postings, matures);
        assert_eq!(at.available_cents, 10000);
        assert_eq!(at.pending_cents, 0);
    }

    #[test]
    fn test_order_independence() {
        let now = Utc::now();
        let mut postings = vec![
            posting(10000, EntryType::Sale, None, Some("e1")),
            posting(-300, EntryType::Commission, None, Some("e1")),
            posting(-10000, EntryType::Refund, None, Some("e2")),
        ];
        let rid = RestaurantId::new("res_a");

        let forward = compute_balance(&rid, Currency::PEN, &postings, now);
        postings.reverse();
        let reversed = compute_balance(&rid, Currency::PEN, &postings, now);

        assert_eq!(forward.available_cents, reversed.available_cents);
        assert_eq!(forward.total_cents, -300);
    }

    #[test]
    fn test_last_event_at_ignores_reservations() {
        let now = Utc::now();
        let mut reserve = posting(-5000, EntryType::PayoutReserve, None, None);
        reserve.recorded_at = now + Duration::hours(1);
        let mut sale = posting(10000, EntryType::Sale, None, Some("e1"));
        sale.recorded_at = now;

        let rid = RestaurantId::new("res_a");
        let balance = compute_balance(&rid, Currency::PEN, &[sale, reserve], now);
        assert_eq!(balance.last_event_at, Some(now));
    }

    #[test]
    fn test_breakdown_sums_to_available() {
        let now = Utc::now();
        let postings = vec![
            posting(10000, EntryType::Sale, None, Some("e1")),
            posting(-300, EntryType::Commission, None, Some("e1")),
            posting(-2000, EntryType::Refund, None, Some("e2")),
            posting(-5000, EntryType::PayoutReserve, None, None),
            // Still pending, excluded from the breakdown entirely
            posting(4000, EntryType::Sale, Some(now + Duration::days(7)), Some("e3")),
        ];

        let items = available_breakdown(&postings, now);
        let rid = RestaurantId::new("res_a");
        let balance = compute_balance(&rid, Currency::PEN, &postings, now);

        let items_sum: i64 = items.iter().map(|i| i.amount_cents).sum();
        assert_eq!(items_sum, balance.available_cents);
        assert_eq!(items.len(), 4);
    }

    #[test]
    fn test_breakdown_omits_zero_categories() {
        let now = Utc::now();
        let postings = vec![posting(10000, EntryType::Sale, None, Some("e1"))];

        let items = available_breakdown(&postings, now);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].category, ItemCategory::NetSales);
        assert_eq!(items[0].amount_cents, 10000);
    }
}
