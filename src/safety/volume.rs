use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Rolling 24h volume counter. A zero `limit` disables the cap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyVolumeCounter {
    pub accumulated: Decimal,
    pub window_start: DateTime<Utc>,
    pub limit: Decimal,
}

impl DailyVolumeCounter {
    pub fn new(limit: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            accumulated: Decimal::ZERO,
            window_start: now,
            limit,
        }
    }

    fn window_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.window_start > Duration::hours(24)
    }

    /// Volume counted against the cap at `now` (zero once the window lapsed)
    pub fn effective_accumulated(&self, now: DateTime<Utc>) -> Decimal {
        if self.window_expired(now) {
            Decimal::ZERO
        } else {
            self.accumulated
        }
    }

    pub fn would_exceed(&self, amount: Decimal, now: DateTime<Utc>) -> bool {
        if self.limit.is_zero() {
            return false;
        }
        self.effective_accumulated(now) + amount > self.limit
    }

    /// Add `amount`, starting a fresh window first if the old one lapsed
    pub fn record(&mut self, amount: Decimal, now: DateTime<Utc>) {
        if self.window_expired(now) {
            self.accumulated = Decimal::ZERO;
            self.window_start = now;
        }
        self.accumulated += amount;
    }
}
