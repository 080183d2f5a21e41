//! Trading signals service module.
//!
//! Indicator calculations, the signal classifier and rationale enrichment.

pub mod classifier;
pub mod enricher;
pub mod indicators;

pub use classifier::classify;
pub use enricher::{build_prompt, parse_confidence, EnrichOutcome, RationaleEnricher};

use crate::config::IndicatorConfig;
use crate::types::{Bar, IndicatorSet};
use indicators::{Rsi, Sma};

/// Trait for implementing technical indicators.
pub trait Indicator: Send + Sync {
    /// Minimum number of bars required for a value.
    fn min_periods(&self) -> usize;

    /// Calculate the indicator over bars ordered oldest first.
    /// Returns None if there is insufficient data.
    fn calculate(&self, bars: &[Bar]) -> Option<f64>;
}

/// Compute every configured indicator over the same bar series.
pub fn compute_indicators(bars: &[Bar], config: &IndicatorConfig) -> IndicatorSet {
    IndicatorSet {
        sma: Sma::new(config.sma_window).calculate(bars),
        rsi: Rsi::new(config.rsi_window).calculate(bars),
        sma_window: config.sma_window,
        rsi_window: config.rsi_window,
    }
}
