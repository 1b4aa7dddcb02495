//! Property-based tests for payout-engine invariants
//!
//! These tests use proptest to verify critical invariants:
//! - Schedule math: the next run is strictly in the future, on a
//!   configured time, and never more than a day away
//! - Reservation: a run pays out exactly the available balance when it
//!   clears the minimum, and never otherwise
//! - Re-running an identical request creates nothing

use chrono::{Duration, NaiveTime, TimeZone, Timelike, Utc};
use ledger_core::{Currency, EventInput, EventType, Ledger, RestaurantId};
use payout_engine::{PayoutGenerator, PayoutRunRequest};
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

/// Strategy for generating schedule configurations with 1-4 run times
fn schedule_strategy() -> impl Strategy<Value = payout_engine::ScheduleConfig> {
    proptest::collection::vec((0u32..24u32, 0u32..60u32), 1..5).prop_map(|times| {
        payout_engine::ScheduleConfig {
            run_times: times
                .into_iter()
                .map(|(h, m)| format!("{:02}:{:02}", h, m))
                .collect(),
            auto_run: true,
        }
    })
}

/// Strategy for generating observation instants across several years
fn instant_strategy() -> impl Strategy<Value = chrono::DateTime<Utc>> {
    (1_700_000_000i64..1_900_000_000i64).prop_map(|secs| Utc.timestamp_opt(secs, 0).unwrap())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// The next run instant is strictly future, lands on a configured
    /// time of day, and is never more than 24 hours away
    #[test]
    fn prop_next_run_time_is_sound(
        config in schedule_strategy(),
        now in instant_strategy(),
    ) {
        let next = config.next_run_time(now).unwrap();

        prop_assert!(next > now);
        prop_assert!(next - now <= Duration::days(1));

        let scheduled: Vec<NaiveTime> = config
            .run_times
            .iter()
            .map(|t| NaiveTime::parse_from_str(t, "%H:%M").unwrap())
            .collect();
        prop_assert!(scheduled.contains(&next.time()));
        prop_assert_eq!(next.time().second(), 0);
    }
}

proptest! {
    // RocksDB open per case keeps this block small.
    #![proptest_config(ProptestConfig::with_cases(12))]

    /// A run reserves exactly the available balance when it clears the
    /// minimum and nothing otherwise; an identical re-run is inert
    #[test]
    fn prop_run_reserves_available_or_nothing(
        amounts in proptest::collection::vec(1_000i64..100_000i64, 1..5),
        min in 1_000i64..200_000i64,
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let tmp = tempfile::tempdir().unwrap();
            let mut config = ledger_core::Config::default();
            config.data_dir = tmp.path().to_path_buf();
            let ledger = Arc::new(Ledger::open(config).unwrap());

            for (i, amount) in amounts.iter().enumerate() {
                ledger
                    .ingest_event(EventInput {
                        event_id: format!("evt_{}", i),
                        event_type: EventType::ChargeSucceeded,
                        restaurant_id: RestaurantId::new("res_prop"),
                        currency: Currency::PEN,
                        amount_cents: *amount,
                        fee_cents: 0,
                        occurred_at: Utc::now() - Duration::days(8),
                        metadata: HashMap::new(),
                    })
                    .unwrap();
            }
            let available: i64 = amounts.iter().sum();

            let generator = Arc::new(PayoutGenerator::new(ledger.clone(), 10_000));
            let mut request = PayoutRunRequest::today(Currency::PEN);
            request.min_amount_cents = Some(min);

            let first = generator.run_payouts(request.clone()).await.unwrap();
            if available >= min {
                assert_eq!(first.created, 1);
                assert_eq!(first.total_amount_cents, available);
            } else {
                assert_eq!(first.created, 0);
            }

            // Identical re-run never creates a second payout.
            let second = generator.run_payouts(request).await.unwrap();
            assert_eq!(second.created, 0);

            // No overdraft either way.
            let balance = ledger
                .get_balance(&RestaurantId::new("res_prop"), Currency::PEN)
                .unwrap();
            let expected = if available >= min { 0 } else { available };
            assert_eq!(balance.available_cents, expected);
        });
    }
}
