//! Scheduled payout runs
//!
//! Fires payout batch runs at configured times of day (UTC).
//! Default: twice daily (06:00, 18:00). Ad-hoc runs for ops go
//! straight through [`crate::generator::PayoutGenerator`].

use crate::generator::PayoutGenerator;
use crate::types::PayoutRunRequest;
use crate::{Error, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use ledger_core::Currency;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Payout run schedule configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Times of day (UTC) when payout runs fire
    /// E.g., ["06:00", "18:00"]
    pub run_times: Vec<String>,

    /// Enable automatic runs
    pub auto_run: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            run_times: vec!["06:00".to_string(), "18:00".to_string()],
            auto_run: true,
        }
    }
}

impl ScheduleConfig {
    /// Parse run times into NaiveTime
    fn parse_times(&self) -> Result<Vec<NaiveTime>> {
        self.run_times
            .iter()
            .map(|time_str| {
                NaiveTime::parse_from_str(time_str, "%H:%M").map_err(|e| {
                    Error::Config(format!("Invalid time format '{}': {}", time_str, e))
                })
            })
            .collect()
    }

    /// Calculate next run time from now
    pub fn next_run_time(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let times = self.parse_times()?;
        let current_time = now.time();

        // Find next run time today
        for run_time in &times {
            if current_time < *run_time {
                let next = now
                    .date_naive()
                    .and_time(*run_time)
                    .and_local_timezone(Utc)
                    .single()
                    .ok_or_else(|| Error::Config("Invalid timezone conversion".to_string()))?;
                return Ok(next);
            }
        }

        // No more runs today, take the first one tomorrow
        let tomorrow = (now + Duration::days(1)).date_naive();
        let first = times
            .first()
            .ok_or_else(|| Error::Config("No run times configured".to_string()))?;

        let next = tomorrow
            .and_time(*first)
            .and_local_timezone(Utc)
            .single()
            .ok_or_else(|| Error::Config("Invalid timezone conversion".to_string()))?;

        Ok(next)
    }
}

/// Drives scheduled payout runs
pub struct PayoutScheduler {
    generator: Arc<PayoutGenerator>,
    config: ScheduleConfig,
    currencies: Vec<Currency>,
}

impl PayoutScheduler {
    /// Create a scheduler over a generator
    pub fn new(
        generator: Arc<PayoutGenerator>,
        config: ScheduleConfig,
        currencies: Vec<Currency>,
    ) -> Self {
        Self {
            generator,
            config,
            currencies,
        }
    }

    /// Scheduler loop; sleeps until each configured run time, then
    /// fires. Runs until the task is dropped.
    pub async fn start(self: Arc<Self>) {
        if !self.config.auto_run {
            info!("Automatic payout runs disabled");
            return;
        }

        info!(run_times = ?self.config.run_times, "Starting payout scheduler");

        loop {
            let now = Utc::now();
            let next = match self.config.next_run_time(now) {
                Ok(next) => next,
                Err(e) => {
                    warn!("Schedule misconfigured, stopping: {}", e);
                    return;
                }
            };

            debug!(next = %next, "Waiting for next run");
            let wait = (next - now).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;

            self.run_all(next.date_naive()).await;
        }
    }

    /// One run per configured currency
    async fn run_all(&self, as_of: NaiveDate) {
        for currency in &self.currencies {
            let request = PayoutRunRequest {
                currency: *currency,
                as_of,
                min_amount_cents: None,
            };
            match self.generator.run_payouts(request).await {
                Ok(summary) => info!(
                    currency = %summary.currency,
                    created = summary.created,
                    "Scheduled run finished"
                ),
                Err(e) => warn!(currency = %currency, error = %e, "Scheduled run failed"),
            }
        }
    }
}
