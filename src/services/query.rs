//! Read-only view over the snapshot store.
//!
//! Never triggers a fetch; staleness is evaluated against the clock at
//! read time.

use crate::clock::Clock;
use crate::services::SnapshotStore;
use crate::types::{normalize_symbol, SignalRecord, SnapshotLookup, SymbolSnapshot};
use std::sync::Arc;

pub struct SignalQuery {
    store: Arc<SnapshotStore>,
    clock: Arc<dyn Clock>,
    stale_threshold_ms: u64,
}

impl SignalQuery {
    pub fn new(store: Arc<SnapshotStore>, clock: Arc<dyn Clock>, stale_threshold_ms: u64) -> Self {
        Self {
            store,
            clock,
            stale_threshold_ms,
        }
    }

    /// Latest record for `symbol`, or an explicit not-available marker.
    pub fn get_single(&self, symbol: &str) -> SnapshotLookup {
        self.lookup(symbol, self.clock.now_millis())
    }

    /// One entry per requested symbol, in request order.
    pub fn get_multi<S: AsRef<str>>(&self, symbols: &[S]) -> Vec<SnapshotLookup> {
        let now = self.clock.now_millis();
        let keys: Vec<String> = symbols
            .iter()
            .map(|s| normalize_symbol(s.as_ref()).unwrap_or_else(|| s.as_ref().to_string()))
            .collect();

        let records = self.store.get_many(&keys);
        keys.into_iter()
            .zip(records)
            .map(|(symbol, record)| self.resolve(symbol, record, now))
            .collect()
    }

    fn lookup(&self, symbol: &str, now: i64) -> SnapshotLookup {
        let Some(normalized) = normalize_symbol(symbol) else {
            return SnapshotLookup::NotAvailable {
                symbol: symbol.to_string(),
            };
        };
        let record = self.store.get(&normalized);
        self.resolve(normalized, record, now)
    }

    fn resolve(
        &self,
        symbol: String,
        record: Option<Arc<SignalRecord>>,
        now: i64,
    ) -> SnapshotLookup {
        match record {
            Some(record) => SnapshotLookup::Available(SymbolSnapshot::at(
                (*record).clone(),
                now,
                self.stale_threshold_ms,
            )),
            None => SnapshotLookup::NotAvailable { symbol },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::types::{IndicatorSet, Signal, SignalColor};

    fn record(symbol: &str, last_updated: i64) -> SignalRecord {
        SignalRecord {
            symbol: symbol.to_string(),
            close: 10.0,
            open: 10.0,
            high: 10.0,
            low: 10.0,
            volume: 1.0,
            bar_time: 0,
            indicators: IndicatorSet {
                sma: None,
                rsi: None,
                sma_window: 20,
                rsi_window: 14,
            },
            signal: Signal::Unknown,
            color: SignalColor::Neutral,
            quant_note: String::new(),
            quant_confidence: 10,
            rationale: None,
            last_updated,
            data_source: "test".to_string(),
        }
    }

    fn setup() -> (SignalQuery, Arc<SnapshotStore>, Arc<ManualClock>) {
        let store = SnapshotStore::new();
        let clock = Arc::new(ManualClock::new(0));
        let query = SignalQuery::new(Arc::clone(&store), clock.clone(), 15_000);
        (query, store, clock)
    }

    #[test]
    fn test_get_single_absent_is_explicit() {
        let (query, _, _) = setup();
        assert_eq!(
            query.get_single("aapl"),
            SnapshotLookup::NotAvailable {
                symbol: "AAPL".to_string()
            }
        );
    }

    #[test]
    fn test_get_single_normalizes_and_tracks_staleness() {
        let (query, store, clock) = setup();
        store.publish(record("AAPL", 1_000));

        clock.set_millis(16_000);
        let fresh = query.get_single(" aapl ");
        let snapshot = fresh.snapshot().unwrap();
        assert!(!snapshot.stale);
        assert_eq!(snapshot.age_ms, 15_000);

        clock.advance_millis(1);
        assert!(query.get_single("AAPL").snapshot().unwrap().stale);
    }

    #[test]
    fn test_get_multi_preserves_order_and_absence() {
        let (query, store, _) = setup();
        store.publish(record("AAPL", 1));
        store.publish(record("MSFT", 1));

        let results = query.get_multi(&["MSFT", "NVDA", "AAPL", ""]);
        let symbols: Vec<Option<&str>> = results
            .iter()
            .map(|r| r.snapshot().map(|s| s.record.symbol.as_str()))
            .collect();
        assert_eq!(symbols, vec![Some("MSFT"), None, Some("AAPL"), None]);
        assert_eq!(
            results[1],
            SnapshotLookup::NotAvailable {
                symbol: "NVDA".to_string()
            }
        );
    }

    #[test]
    fn test_reads_do_not_touch_store() {
        let (query, store, _) = setup();
        for _ in 0..100 {
            query.get_single("AAPL");
        }
        assert!(store.is_empty());
    }
}
