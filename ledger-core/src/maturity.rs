//! Maturity policy: when a posting starts counting toward available funds
//!
//! The policy is a pure function of (entry type, occurrence time). It is
//! evaluated exactly once, when the posting is created; postings are
//! immutable afterward, so a posting crosses from pending to available at
//! its maturity instant without any write.

use crate::config::MaturityConfig;
use crate::types::EntryType;
use chrono::{DateTime, Duration, Utc};

/// Per-entry-type hold windows.
///
/// The default holds only `sale` postings, for 7 days; commissions,
/// refunds and payout reservations mature immediately.
#[derive(Debug, Clone)]
pub struct MaturityPolicy {
    sale_hold: Duration,
    commission_hold: Duration,
    refund_hold: Duration,
}

impl MaturityPolicy {
    /// Build a policy from configuration
    pub fn new(config: &MaturityConfig) -> Self {
        Self {
            sale_hold: Duration::days(config.sale_hold_days),
            commission_hold: Duration::days(config.commission_hold_days),
            refund_hold: Duration::days(config.refund_hold_days),
        }
    }

    /// Availability timestamp for a posting of `entry_type` occurring at
    /// `occurred_at`. `None` means immediately available.
    pub fn available_at(
        &self,
        entry_type: EntryType,
        occurred_at: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let hold = match entry_type {
            EntryType::Sale => self.sale_hold,
            EntryType::Commission => self.commission_hold,
            EntryType::Refund => self.refund_hold,
            // Reservations must bite immediately or a second run could
            // see the funds as still available.
            EntryType::PayoutReserve => Duration::zero(),
        };

        if hold.is_zero() {
            None
        } else {
            Some(occurred_at + hold)
        }
    }
}

impl Default for MaturityPolicy {
    fn default() -> Self {
        Self::new(&MaturityConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_holds_only_sales() {
        let policy = MaturityPolicy::default();
        let occurred = Utc::now();

        assert_eq!(
            policy.available_at(EntryType::Sale, occurred),
            Some(occurred + Duration::days(7))
        );
        assert_eq!(policy.available_at(EntryType::Commission, occurred), None);
        assert_eq!(policy.available_at(EntryType::Refund, occurred), None);
        assert_eq!(policy.available_at(EntryType::PayoutReserve, occurred), None);
    }

    #[test]
    fn test_configured_holds() {
        let policy = MaturityPolicy::new(&MaturityConfig {
            sale_hold_days: 14,
            commission_hold_days: 1,
            refund_hold_days: 0,
        });
        let occurred = Utc::now();

        assert_eq!(
            policy.available_at(EntryType::Sale, occurred),
            Some(occurred + Duration::days(14))
        );
        assert_eq!(
            policy.available_at(EntryType::Commission, occurred),
            Some(occurred + Duration::days(1))
        );
        assert_eq!(policy.available_at(EntryType::Refund, occurred), None);
    }

    #[test]
    fn test_deterministic() {
        let policy = MaturityPolicy::default();
        let occurred = Utc::now();
        assert_eq!(
            policy.available_at(EntryType::Sale, occurred),
            policy.available_at(EntryType::Sale, occurred)
        );
    }
}
