//! # Payout Engine
//!
//! Batch payout generation over the append-only ledger.
//!
//! A run sweeps the active restaurants for one currency and, for each
//! pair with enough matured funds, creates a payout and reserves its
//! amount in the same atomic write. Guarantees, even under concurrent
//! runs:
//!
//! - No overdraft: reservations never exceed the available balance
//!   they were computed from.
//! - No double payout: at most one open payout per
//!   (restaurant, currency), and at most one payout per
//!   (restaurant, currency, business date).
//! - A payout's items always sum to its amount.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use payout_engine::{Config, PayoutGenerator, PayoutRunRequest};
//! use ledger_core::{Currency, Ledger};
//!
//! #[tokio::main]
//! async fn main() -> payout_engine::Result<()> {
//!     let config = Config::default();
//!     let ledger = Arc::new(Ledger::open(ledger_core::Config::default())?);
//!     let generator = Arc::new(PayoutGenerator::new(ledger, config.min_payout_cents));
//!
//!     let summary = generator
//!         .run_payouts(PayoutRunRequest::today(Currency::PEN))
//!         .await?;
//!     println!("Created {} payouts", summary.created);
//!
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod generator;
pub mod scheduler;
pub mod types;

// Re-exports
pub use config::Config;
pub use error::{Error, Result};
pub use generator::PayoutGenerator;
pub use scheduler::{PayoutScheduler, ScheduleConfig};
pub use types::{PayoutRunRequest, PayoutRunSummary, SkipReason, UnitOutcome};
