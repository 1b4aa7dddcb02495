//! Types for payout batch runs

use chrono::NaiveDate;
use ledger_core::{Currency, RestaurantId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request for one payout batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutRunRequest {
    /// Currency to settle
    pub currency: Currency,

    /// Business date stamped on every payout created by this run
    pub as_of: NaiveDate,

    /// Per-run minimum payout in minor units; None uses the engine's
    /// configured minimum
    #[serde(default)]
    pub min_amount_cents: Option<i64>,
}

impl PayoutRunRequest {
    /// Run for today's business date at the configured minimum
    pub fn today(currency: Currency) -> Self {
        Self {
            currency,
            as_of: chrono::Utc::now().date_naive(),
            min_amount_cents: None,
        }
    }
}

/// Why a restaurant produced no payout in a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// A created or processing payout is already in flight
    OpenPayout,

    /// Available balance below the configured minimum
    BelowMinimum {
        /// Available balance at decision time
        available_cents: i64,
    },

    /// A payout for this business date already exists
    AsOfTaken,
}

/// Per-restaurant outcome within a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UnitOutcome {
    /// Payout created and funds reserved
    Created {
        /// New payout id
        payout_id: Uuid,
        /// Reserved amount in minor units
        amount_cents: i64,
    },

    /// No payout for this restaurant this run
    Skipped(SkipReason),
}

/// Aggregate result of a payout batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutRunSummary {
    /// Currency settled
    pub currency: Currency,

    /// Business date of the run
    pub as_of: NaiveDate,

    /// Restaurants examined
    pub restaurants_examined: usize,

    /// Payouts created
    pub created: usize,

    /// Restaurants skipped
    pub skipped: usize,

    /// Units that failed with an error
    pub failed: usize,

    /// Total reserved across created payouts, minor units
    pub total_amount_cents: i64,

    /// Created payouts with their restaurants
    pub payouts: Vec<(RestaurantId, Uuid)>,
}

impl PayoutRunSummary {
    /// Empty summary for a run
    pub fn new(currency: Currency, as_of: NaiveDate) -> Self {
        Self {
            currency,
            as_of,
            restaurants_examined: 0,
            created: 0,
            skipped: 0,
            failed: 0,
            total_amount_cents: 0,
            payouts: Vec::new(),
        }
    }
}
