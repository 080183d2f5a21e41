//! Relative Strength Index (RSI) indicator.

use crate::services::signals::Indicator;
use crate::types::Bar;

/// RSI (Relative Strength Index) indicator.
///
/// Wilder's smoothing: the first average gain/loss is the plain mean of the
/// first `period` deltas, each later delta is folded in as
/// `(prev * (period - 1) + delta) / period`.
///
/// When the average loss is zero the RSI is 100, including the flat-price
/// case where the average gain is zero as well.
pub struct Rsi {
    period: usize,
}

impl Default for Rsi {
    fn default() -> Self {
        Self { period: 14 }
    }
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        Self { period }
    }

    fn calculate_rsi(bars: &[Bar], period: usize) -> Option<f64> {
        if period == 0 || bars.len() < period + 1 {
            return None;
        }

        let (gains, losses): (Vec<f64>, Vec<f64>) = bars
            .windows(2)
            .map(|w| {
                let change = w[1].close - w[0].close;
                if change > 0.0 {
                    (change, 0.0)
                } else {
                    (0.0, -change)
                }
            })
            .unzip();

        let mut avg_gain = gains.iter().take(period).sum::<f64>() / period as f64;
        let mut avg_loss = losses.iter().take(period).sum::<f64>() / period as f64;

        for i in period..gains.len() {
            avg_gain = (avg_gain * (period - 1) as f64 + gains[i]) / period as f64;
            avg_loss = (avg_loss * (period - 1) as f64 + losses[i]) / period as f64;
        }

        if avg_loss == 0.0 {
            return Some(100.0);
        }

        let rs = avg_gain / avg_loss;
        Some((100.0 - (100.0 / (1.0 + rs))).clamp(0.0, 100.0))
    }
}

impl Indicator for Rsi {
    fn min_periods(&self) -> usize {
        self.period + 1
    }

    fn calculate(&self, bars: &[Bar]) -> Option<f64> {
        Self::calculate_rsi(bars, self.period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                time: 1_000_000 + i as i64 * 60_000,
                open: close,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 1000.0,
            })
            .collect()
    }

    fn create_uptrend_bars(count: usize) -> Vec<Bar> {
        let closes: Vec<f64> = (0..count).map(|i| 101.0 + i as f64 * 1.5).collect();
        bars_from_closes(&closes)
    }

    fn create_downtrend_bars(count: usize) -> Vec<Bar> {
        let closes: Vec<f64> = (0..count).map(|i| 199.0 - i as f64 * 1.5).collect();
        bars_from_closes(&closes)
    }

    #[test]
    fn test_rsi_min_periods() {
        assert_eq!(Rsi::default().min_periods(), 15);
        assert_eq!(Rsi::new(7).min_periods(), 8);
    }

    #[test]
    fn test_rsi_insufficient_data() {
        let rsi = Rsi::default();
        assert!(rsi.calculate(&create_uptrend_bars(14)).is_none());
        assert!(rsi.calculate(&create_uptrend_bars(15)).is_some());
    }

    #[test]
    fn test_rsi_flat_prices_resolve_to_100() {
        let bars = bars_from_closes(&[50.0; 15]);
        assert_eq!(Rsi::default().calculate(&bars), Some(100.0));
    }

    #[test]
    fn test_rsi_balanced_moves_are_midpoint() {
        let bars = bars_from_closes(&[1.0, 2.0, 1.0]);
        assert_eq!(Rsi::new(2).calculate(&bars), Some(50.0));
    }

    #[test]
    fn test_rsi_wilder_smoothing() {
        // Seed averages: gain 1.0, loss 0.0; then a -1 delta smooths both to 0.5
        let bars = bars_from_closes(&[1.0, 2.0, 3.0, 2.0]);
        assert_eq!(Rsi::new(2).calculate(&bars), Some(50.0));
    }

    #[test]
    fn test_rsi_uptrend_high_value() {
        let value = Rsi::default().calculate(&create_uptrend_bars(50)).unwrap();
        assert_eq!(value, 100.0);
    }

    #[test]
    fn test_rsi_downtrend_low_value() {
        let value = Rsi::default().calculate(&create_downtrend_bars(50)).unwrap();
        assert!(value < 1e-9, "RSI in pure downtrend should be 0, got {}", value);
    }

    #[test]
    fn test_rsi_value_range() {
        let closes: Vec<f64> = (0..60)
            .map(|i| 100.0 + ((i * 37) % 11) as f64 - 5.0)
            .collect();
        let value = Rsi::default().calculate(&bars_from_closes(&closes)).unwrap();
        assert!((0.0..=100.0).contains(&value));
    }
}
