use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical form of a ticker: trimmed and uppercased. `None` for blanks.
pub fn normalize_symbol(symbol: &str) -> Option<String> {
    let trimmed = symbol.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_uppercase())
    }
}

/// Discrete trading signal for a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
    /// At least one indicator lacks enough history.
    Unknown,
}

impl Signal {
    /// Display color, derived from the signal alone.
    pub fn color(&self) -> SignalColor {
        match self {
            Signal::Buy => SignalColor::Green,
            Signal::Sell => SignalColor::Red,
            Signal::Hold | Signal::Unknown => SignalColor::Neutral,
        }
    }

    /// Get display label for this signal.
    pub fn label(&self) -> &'static str {
        match self {
            Signal::Buy => "BUY",
            Signal::Sell => "SELL",
            Signal::Hold => "HOLD",
            Signal::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Dashboard color for a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalColor {
    Green,
    Red,
    Neutral,
}

/// Indicator values derived from one bar series.
///
/// `None` means the series was too short for that window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorSet {
    pub sma: Option<f64>,
    pub rsi: Option<f64>,
    pub sma_window: usize,
    pub rsi_window: usize,
}

impl IndicatorSet {
    /// True when every indicator produced a value.
    pub fn is_complete(&self) -> bool {
        self.sma.is_some() && self.rsi.is_some()
    }
}

/// Output of the classifier: signal and color are always produced together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub signal: Signal,
    pub color: SignalColor,
    /// Short rule-based explanation of which condition fired.
    pub note: String,
    /// Heuristic confidence (0-100) from indicator distance to thresholds.
    pub confidence: u8,
}

/// Natural-language explanation attached to a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rationale {
    pub text: String,
    /// Confidence score (0-100).
    pub confidence: u8,
    /// `lastUpdated` of the numeric snapshot this rationale explains.
    pub explains: i64,
    /// Unix timestamp (milliseconds) when the rationale arrived.
    pub generated_at: i64,
}

/// Latest consistent state for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalRecord {
    pub symbol: String,
    pub close: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub volume: f64,
    /// Open time of the latest bar (Unix milliseconds).
    pub bar_time: i64,
    pub indicators: IndicatorSet,
    pub signal: Signal,
    pub color: SignalColor,
    /// Rule-based note from the classifier.
    pub quant_note: String,
    /// Rule-based confidence from the classifier.
    pub quant_confidence: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<Rationale>,
    /// When the numeric fields were computed (Unix milliseconds).
    pub last_updated: i64,
    /// Name of the market-data source that produced the bars.
    pub data_source: String,
}

impl SignalRecord {
    /// Copy of this record carrying the given rationale. Numeric fields and
    /// `last_updated` are left untouched.
    pub fn with_rationale(&self, rationale: Rationale) -> Self {
        Self {
            rationale: Some(rationale),
            ..self.clone()
        }
    }
}

/// A record as served to readers, with staleness evaluated at read time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolSnapshot {
    #[serde(flatten)]
    pub record: SignalRecord,
    pub stale: bool,
    /// Milliseconds since `last_updated`.
    pub age_ms: i64,
    /// True when the attached rationale explains these exact numeric fields.
    /// A rationale carried over from an earlier refresh reports false.
    pub rationale_current: bool,
}

impl SymbolSnapshot {
    /// Evaluate staleness of `record` as of `now`.
    pub fn at(record: SignalRecord, now: i64, stale_threshold_ms: u64) -> Self {
        let age_ms = (now - record.last_updated).max(0);
        let rationale_current = record
            .rationale
            .as_ref()
            .is_some_and(|r| r.explains == record.last_updated);
        Self {
            stale: age_ms > stale_threshold_ms as i64,
            age_ms,
            rationale_current,
            record,
        }
    }
}

/// Result of a read for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SnapshotLookup {
    Available(SymbolSnapshot),
    /// The symbol has never been fetched successfully (or is not tracked).
    NotAvailable { symbol: String },
}

impl SnapshotLookup {
    pub fn is_available(&self) -> bool {
        matches!(self, SnapshotLookup::Available(_))
    }

    /// Get the snapshot if one exists.
    pub fn snapshot(&self) -> Option<&SymbolSnapshot> {
        match self {
            SnapshotLookup::Available(s) => Some(s),
            SnapshotLookup::NotAvailable { .. } => None,
        }
    }
}
