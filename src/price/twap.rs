//! Time-weighted average price reference
//!
//! Each recorded sample is weighted by how long it stayed the latest reading
//! inside the window; the newest sample is weighted up to `now`.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::PriceSample;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwapTracker {
    window_secs: i64,
    samples: VecDeque<PriceSample>,
}

impl TwapTracker {
    pub fn new(window_secs: i64) -> Self {
        Self {
            window_secs,
            samples: VecDeque::new(),
        }
    }

    pub fn window(&self) -> Duration {
        Duration::seconds(self.window_secs)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Record a sample. Out-of-order or duplicate observations are ignored.
    pub fn record(&mut self, sample: PriceSample) -> bool {
        if let Some(last) = self.samples.back() {
            if sample.observed_at <= last.observed_at {
                return false;
            }
        }
        let cutoff = sample.observed_at - self.window();
        self.samples.push_back(sample);

        // Keep one sample at or before the cutoff so the window start is covered
        while self.samples.len() > 1
            && self.samples.get(1).map(|s| s.observed_at <= cutoff) == Some(true)
        {
            self.samples.pop_front();
        }
        true
    }

    /// Time-weighted average over the window ending at `now`
    pub fn twap(&self, now: DateTime<Utc>) -> Option<Decimal> {
        let last = self.samples.back()?;
        let start = now - self.window();

        let mut weighted = Decimal::ZERO;
        let mut total_ms = Decimal::ZERO;
        for (i, sample) in self.samples.iter().enumerate() {
            let seg_start = sample.observed_at.max(start);
            let seg_end = self
                .samples
                .get(i + 1)
                .map(|next| next.observed_at)
                .unwrap_or(now);
            if seg_end <= seg_start {
                continue;
            }
            let ms = Decimal::from((seg_end - seg_start).num_milliseconds());
            weighted += sample.value * ms;
            total_ms += ms;
        }

        if total_ms.is_zero() {
            Some(last.value)
        } else {
            Some(weighted / total_ms)
        }
    }
}
