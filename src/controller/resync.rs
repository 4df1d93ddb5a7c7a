//! # Resync Scheduling
//!
//! When the next successful-path reconciliation of a source should run.

use chrono::{DateTime, Utc};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResyncPolicy {
    /// Upper bound between two passes
    pub period: Duration,
    /// Expiring credentials are refreshed this long before they expire
    pub refresh_margin: Duration,
    /// Lower bound between two passes
    pub min_interval: Duration,
}

impl ResyncPolicy {
    /// Delay until the next pass for a credential expiring at `expires_at`
    ///
    /// `min(period, expires_at - refresh_margin - now)`, floored at `min_interval`.
    #[must_use]
    pub fn next_refresh(&self, now: DateTime<Utc>, expires_at: Option<DateTime<Utc>>) -> Duration {
        let until_refresh = expires_at.map(|expires_at| {
            let margin = chrono::Duration::from_std(self.refresh_margin)
                .unwrap_or_else(|_| chrono::Duration::zero());
            (expires_at - margin - now).to_std().unwrap_or(Duration::ZERO)
        });

        let delay = match until_refresh {
            Some(until_refresh) => until_refresh.min(self.period),
            None => self.period,
        };
        delay.max(self.min_interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICY: ResyncPolicy = ResyncPolicy {
        period: Duration::from_secs(3600),
        refresh_margin: Duration::from_secs(600),
        min_interval: Duration::from_secs(60),
    };

    #[test]
    fn test_non_expiring_credential_uses_period() {
        assert_eq!(POLICY.next_refresh(Utc::now(), None), Duration::from_secs(3600));
    }

    #[test]
    fn test_long_lived_credential_capped_at_period() {
        let now = Utc::now();
        let expires_at = now + chrono::Duration::hours(12);
        assert_eq!(
            POLICY.next_refresh(now, Some(expires_at)),
            Duration::from_secs(3600)
        );
    }

    #[test]
    fn test_short_lived_credential_refreshes_before_expiry() {
        let now = Utc::now();
        let expires_at = now + chrono::Duration::minutes(30);
        assert_eq!(
            POLICY.next_refresh(now, Some(expires_at)),
            Duration::from_secs(20 * 60)
        );
    }

    #[test]
    fn test_imminent_expiry_floored_at_min_interval() {
        let now = Utc::now();
        let expires_at = now + chrono::Duration::minutes(5);
        assert_eq!(
            POLICY.next_refresh(now, Some(expires_at)),
            Duration::from_secs(60)
        );
    }
}
