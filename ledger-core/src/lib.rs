//! # Ledger Core
//!
//! Append-only accounting ledger for payment-processor events.
//!
//! Every processor event lands at most once, keyed by its external
//! `event_id`, and each accepted event derives immutable postings in
//! minor currency units. Balances are never stored; they are folded
//! from postings on demand, split into available and pending funds by
//! a configurable maturity hold.
//!
//! ## Core invariants
//!
//! - Postings are append-only; nothing in the public API mutates or
//!   deletes one after commit.
//! - An event and all of its postings commit in a single atomic write;
//!   a duplicate `event_id` commits nothing.
//! - `available + pending == total` for every balance read.
//! - A payout's embedded items always sum to its amount.
//!
//! ## Modules
//!
//! - [`types`]: Domain types (events, postings, payouts, balances)
//! - [`storage`]: RocksDB persistence with atomic insert-or-reject
//! - [`ledger`]: Event ingestion and read API
//! - [`balance`]: Pure balance computation over posting snapshots
//! - [`maturity`]: Hold policy mapping entry types to availability

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod balance;
pub mod config;
pub mod error;
pub mod ledger;
pub mod maturity;
pub mod metrics;
pub mod storage;
pub mod types;

pub use config::{Config, MaturityConfig};
pub use error::{Error, Result};
pub use ledger::{EventInput, Ingest, IngestStatus, Ledger};
pub use maturity::MaturityPolicy;
pub use metrics::Metrics;
pub use storage::{InsertOutcome, Storage};
pub use types::{
    Balance, Currency, EntryType, EventType, ItemCategory, Payout, PayoutItem, PayoutStatus,
    Posting, ProcessorEvent, Restaurant, RestaurantId, METADATA_PAYOUT_ID,
};
