//! Simple Moving Average (SMA) indicator.

use crate::services::signals::Indicator;
use crate::types::Bar;

/// SMA (Simple Moving Average) indicator.
///
/// Arithmetic mean of the last `period` closes.
pub struct Sma {
    period: usize,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        Self { period }
    }
}

impl Default for Sma {
    fn default() -> Self {
        Self { period: 20 }
    }
}

impl Indicator for Sma {
    fn min_periods(&self) -> usize {
        self.period
    }

    fn calculate(&self, bars: &[Bar]) -> Option<f64> {
        if self.period == 0 || bars.len() < self.period {
            return None;
        }

        let sum: f64 = bars.iter().rev().take(self.period).map(|b| b.close).sum();
        Some(sum / self.period as f64)
    }
}
