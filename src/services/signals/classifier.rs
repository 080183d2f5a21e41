//! Rule table mapping indicator values to a signal and display color.

use crate::config::ClassifierThresholds;
use crate::types::{Classification, IndicatorSet, Signal};

/// Confidence reported when indicators are undefined.
const UNKNOWN_CONFIDENCE: u8 = 10;
const HOLD_CONFIDENCE: u8 = 50;
/// BUY/SELL confidence spans this floor plus up to `DIRECTIONAL_SPAN`.
const DIRECTIONAL_FLOOR: f64 = 60.0;
const DIRECTIONAL_SPAN: f64 = 30.0;

/// Classify the latest close against its indicators.
///
/// - either indicator undefined: UNKNOWN
/// - close > SMA and RSI < overbought: BUY
/// - close < SMA and RSI > oversold: SELL
/// - anything else: HOLD
///
/// Total over every input, including non-finite closes (which fall to HOLD).
pub fn classify(
    close: f64,
    indicators: &IndicatorSet,
    thresholds: &ClassifierThresholds,
) -> Classification {
    let (sma, rsi) = match (indicators.sma, indicators.rsi) {
        (Some(sma), Some(rsi)) => (sma, rsi),
        _ => {
            return build(
                Signal::Unknown,
                format!(
                    "Insufficient history for SMA({}) and RSI({})",
                    indicators.sma_window, indicators.rsi_window
                ),
                UNKNOWN_CONFIDENCE,
            )
        }
    };

    let ClassifierThresholds {
        rsi_overbought: overbought,
        rsi_oversold: oversold,
    } = *thresholds;
    let window = indicators.sma_window;

    if close > sma && rsi < overbought {
        let strength = ratio(overbought - rsi, overbought);
        build(
            Signal::Buy,
            format!(
                "Close {:.2} above SMA({}) {:.2} with RSI {:.1} below overbought {:.1}",
                close, window, sma, rsi, overbought
            ),
            directional_confidence(strength),
        )
    } else if close < sma && rsi > oversold {
        let strength = ratio(rsi - oversold, 100.0 - oversold);
        build(
            Signal::Sell,
            format!(
                "Close {:.2} below SMA({}) {:.2} with RSI {:.1} above oversold {:.1}",
                close, window, sma, rsi, oversold
            ),
            directional_confidence(strength),
        )
    } else {
        let note = if close > sma {
            format!("Close above SMA({}) but RSI {:.1} is overbought", window, rsi)
        } else if close < sma {
            format!("Close below SMA({}) but RSI {:.1} is oversold", window, rsi)
        } else {
            format!("Close {:.2} sits on SMA({}), awaiting a clear move", close, window)
        };
        build(Signal::Hold, note, HOLD_CONFIDENCE)
    }
}

fn build(signal: Signal, note: String, confidence: u8) -> Classification {
    Classification {
        signal,
        color: signal.color(),
        note,
        confidence,
    }
}

/// `num / den` clamped to [0, 1]; 0 for degenerate denominators.
fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 && num.is_finite() {
        (num / den).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn directional_confidence(strength: f64) -> u8 {
    (DIRECTIONAL_FLOOR + DIRECTIONAL_SPAN * strength).round() as u8
}
