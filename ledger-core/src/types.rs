//! Core types for the ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Memory safety (no unsafe code)
//! - Exact arithmetic (integer minor units for money)

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Restaurant identifier, issued by the payment processor.
///
/// Well-formed ids start with `res_`; the ledger rejects anything else
/// before writing, since restaurants are created implicitly on first
/// reference and a malformed id would otherwise mint a bogus row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RestaurantId(String);

impl RestaurantId {
    /// Create new restaurant ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id is usable as a ledger key.
    ///
    /// Requires the processor's `res_` prefix and bans `|`, which
    /// delimits the segments of composite index keys: an id containing
    /// it could extend another restaurant's scan prefix and alias its
    /// postings.
    pub fn is_well_formed(&self) -> bool {
        self.0.starts_with("res_") && self.0.len() > 4 && !self.0.contains('|')
    }
}

impl fmt::Display for RestaurantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ISO 4217 currency code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Currency {
    /// Peruvian Sol
    PEN,
    /// US Dollar
    USD,
    /// Euro
    EUR,
}

impl Currency {
    /// ISO 4217 code
    pub fn code(&self) -> &'static str {
        match self {
            Currency::PEN => "PEN",
            Currency::USD => "USD",
            Currency::EUR => "EUR",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PEN" => Some(Currency::PEN),
            "USD" => Some(Currency::USD),
            "EUR" => Some(Currency::EUR),
            _ => None,
        }
    }
}

impl Default for Currency {
    fn default() -> Self {
        Currency::PEN
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Processor webhook event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum EventType {
    /// A charge settled in the restaurant's favor
    ChargeSucceeded = 1,
    /// A previously settled charge was refunded
    RefundSucceeded = 2,
    /// The processor confirmed a disbursement landed
    PayoutPaid = 3,
}

impl EventType {
    /// Wire name used by the processor
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ChargeSucceeded => "charge_succeeded",
            EventType::RefundSucceeded => "refund_succeeded",
            EventType::PayoutPaid => "payout_paid",
        }
    }

    /// Parse from the processor's wire name
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "charge_succeeded" => Some(EventType::ChargeSucceeded),
            "refund_succeeded" => Some(EventType::RefundSucceeded),
            "payout_paid" => Some(EventType::PayoutPaid),
            _ => None,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ledger posting category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EntryType {
    /// Gross charge amount credited to the restaurant
    Sale = 1,
    /// Platform fee debited from the restaurant
    Commission = 2,
    /// Refunded gross amount debited back
    Refund = 3,
    /// Funds reserved for a payout in flight
    PayoutReserve = 4,
}

impl EntryType {
    /// Stable name for logs and metrics labels
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Sale => "sale",
            EntryType::Commission => "commission",
            EntryType::Refund => "refund",
            EntryType::PayoutReserve => "payout_reserve",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Restaurant administrative record.
///
/// Created implicitly the first time an event references the id. Only
/// `name`, `is_active` and `metadata` are meant to change afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Restaurant {
    /// Stable external key (`res_...`)
    pub id: RestaurantId,

    /// Display name (defaults to the id on implicit creation)
    pub name: String,

    /// Inactive restaurants are excluded from payout runs
    pub is_active: bool,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// Additional metadata
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Restaurant {
    /// Build the implicit record for a first-seen id
    pub fn implicit(id: RestaurantId, now: DateTime<Utc>) -> Self {
        let name = id.as_str().to_string();
        Self {
            id,
            name,
            is_active: true,
            created_at: now,
            updated_at: now,
            metadata: HashMap::new(),
        }
    }
}

/// Immutable record of a processor webhook delivery.
///
/// `event_id` is the idempotency key: the store accepts each id exactly
/// once, and later deliveries get the stored record back unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorEvent {
    /// Unique external event ID (idempotency key)
    pub event_id: String,

    /// Type of event
    pub event_type: EventType,

    /// Restaurant this event belongs to
    pub restaurant_id: RestaurantId,

    /// Currency
    pub currency: Currency,

    /// Gross amount in minor units (non-negative)
    pub amount_cents: i64,

    /// Processor fee in minor units (non-negative)
    pub fee_cents: i64,

    /// Business time: when the event happened at the processor
    pub occurred_at: DateTime<Utc>,

    /// System time: when this ledger recorded the event
    pub recorded_at: DateTime<Utc>,

    /// Additional metadata; `payout_paid` events carry the payout id
    /// under [`METADATA_PAYOUT_ID`]
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Metadata key linking a `payout_paid` event to its payout
pub const METADATA_PAYOUT_ID: &str = "payout_id";

impl ProcessorEvent {
    /// Payout referenced by a `payout_paid` event, if present and parseable
    pub fn linked_payout_id(&self) -> Option<Uuid> {
        self.metadata
            .get(METADATA_PAYOUT_ID)
            .and_then(|raw| Uuid::parse_str(raw).ok())
    }
}

/// One immutable signed money movement attributed to a restaurant/currency
/// pair. Credits are positive, debits negative. Balances are always the
/// sum of postings; a posting is never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Posting {
    /// Unique posting ID (UUIDv7 for time-ordering)
    pub posting_id: Uuid,

    /// Restaurant this posting belongs to
    pub restaurant_id: RestaurantId,

    /// Currency
    pub currency: Currency,

    /// Signed amount in minor units (credit > 0, debit < 0)
    pub amount_cents: i64,

    /// Posting category
    pub entry_type: EntryType,

    /// Human-readable description
    pub description: Option<String>,

    /// Source event, if the posting came from ingestion
    pub related_event_id: Option<String>,

    /// Source payout, if the posting is a reservation
    pub related_payout_id: Option<Uuid>,

    /// When this ledger recorded the posting
    pub recorded_at: DateTime<Utc>,

    /// When the funds mature; None means immediately available
    pub available_at: Option<DateTime<Utc>>,
}

impl Posting {
    /// Whether the posting counts toward available balance at `now`
    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        match self.available_at {
            None => true,
            Some(at) => at <= now,
        }
    }
}

/// Payout lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PayoutStatus {
    /// Reserved, not yet handed to the disbursement rail
    Created = 1,
    /// Handed to the rail, awaiting confirmation
    Processing = 2,
    /// Confirmed by the processor (terminal)
    Paid = 3,
    /// Disbursement failed operationally (terminal)
    Failed = 4,
}

impl PayoutStatus {
    /// Stable name for logs and metrics labels
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutStatus::Created => "created",
            PayoutStatus::Processing => "processing",
            PayoutStatus::Paid => "paid",
            PayoutStatus::Failed => "failed",
        }
    }

    /// Terminal states accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, PayoutStatus::Paid | PayoutStatus::Failed)
    }
}

impl fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Category tag for a payout breakdown row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ItemCategory {
    /// Matured sale credits
    NetSales = 1,
    /// Commission debits
    Fees = 2,
    /// Refund debits
    Refunds = 3,
    /// Reservations from earlier payouts
    PriorPayouts = 4,
}

impl ItemCategory {
    /// Stable name for serialization to downstream consumers
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemCategory::NetSales => "net_sales",
            ItemCategory::Fees => "fees",
            ItemCategory::Refunds => "refunds",
            ItemCategory::PriorPayouts => "prior_payouts",
        }
    }
}

/// Immutable breakdown row owned by exactly one payout.
///
/// Invariant: item amounts of a payout sum to the payout amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutItem {
    /// Breakdown category
    pub category: ItemCategory,

    /// Signed amount in minor units
    pub amount_cents: i64,
}

/// Payout settlement record. Status lifecycle: created → processing →
/// paid/failed. Amount and items never change after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payout {
    /// Unique payout ID (UUIDv7)
    pub payout_id: Uuid,

    /// Restaurant being paid
    pub restaurant_id: RestaurantId,

    /// Currency
    pub currency: Currency,

    /// Reserved amount in minor units (positive)
    pub amount_cents: i64,

    /// Batch-run date; unique per (restaurant, currency)
    pub as_of: NaiveDate,

    /// Current status
    pub status: PayoutStatus,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Set exactly when status becomes `paid`
    pub paid_at: Option<DateTime<Utc>>,

    /// Set when status becomes `failed`
    pub failure_reason: Option<String>,

    /// Breakdown rows; amounts sum to `amount_cents`
    pub items: Vec<PayoutItem>,
}

impl Payout {
    /// Sum of breakdown item amounts
    pub fn items_total_cents(&self) -> i64 {
        self.items.iter().map(|i| i.amount_cents).sum()
    }
}

/// Balance snapshot for one (restaurant, currency) pair.
///
/// Always recomputed from postings, never stored, so it cannot drift
/// from the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Restaurant the snapshot belongs to
    pub restaurant_id: RestaurantId,

    /// Currency
    pub currency: Currency,

    /// Matured funds in minor units
    pub available_cents: i64,

    /// Funds still inside their maturity window
    pub pending_cents: i64,

    /// available + pending
    pub total_cents: i64,

    /// Recording time of the newest event-derived posting
    pub last_event_at: Option<DateTime<Utc>>,
}
