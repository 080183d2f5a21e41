//! Refresh Scheduler
//!
//! Runs one independent loop per tracked symbol:
//! `Idle -> Fetching -> Computing -> Publishing -> Idle`, sleeping between
//! cycles. Failed fetches back off exponentially up to a cap while the last
//! published record stays readable (and eventually reads as stale).

use crate::clock::Clock;
use crate::config::{ClassifierThresholds, Config, IndicatorConfig, SchedulerConfig};
use crate::error::{FetchError, SchedulerError};
use crate::services::signals::{classify, compute_indicators, RationaleEnricher};
use crate::services::SnapshotStore;
use crate::sources::MarketDataSource;
use crate::types::{normalize_symbol, Bar, LoopState, SignalRecord, SymbolStatus};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::join_all;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Upper bound on the backoff exponent; the delay is capped long before this.
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Active loop tracking.
struct ActiveLoop {
    handle: JoinHandle<()>,
    cancel: watch::Sender<bool>,
}

/// Per-symbol refresh loops feeding the snapshot store.
pub struct RefreshScheduler {
    source: Arc<dyn MarketDataSource>,
    store: Arc<SnapshotStore>,
    enricher: Option<Arc<RationaleEnricher>>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    indicators: IndicatorConfig,
    thresholds: ClassifierThresholds,
    /// Bars requested per fetch.
    lookback: usize,
    /// Running loops (symbol -> loop).
    loops: DashMap<String, ActiveLoop>,
    /// Loop status (symbol -> status).
    statuses: DashMap<String, SymbolStatus>,
}

impl RefreshScheduler {
    pub fn new(
        config: &Config,
        source: Arc<dyn MarketDataSource>,
        store: Arc<SnapshotStore>,
        enricher: Option<Arc<RationaleEnricher>>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        Arc::new(Self {
            source,
            store,
            enricher,
            clock,
            config: config.scheduler.clone(),
            indicators: config.indicators,
            thresholds: config.thresholds,
            lookback: config.lookback(),
            loops: DashMap::new(),
            statuses: DashMap::new(),
        })
    }

    /// Start tracking a symbol. Returns the normalized symbol.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn register(self: &Arc<Self>, symbol: &str) -> Result<String, SchedulerError> {
        let symbol = normalize_symbol(symbol).ok_or(SchedulerError::EmptySymbol)?;

        match self.loops.entry(symbol.clone()) {
            Entry::Occupied(_) => Err(SchedulerError::AlreadyTracked(symbol)),
            Entry::Vacant(slot) => {
                let (cancel, cancelled) = watch::channel(false);
                self.statuses
                    .insert(symbol.clone(), SymbolStatus::new(symbol.clone()));

                let scheduler = Arc::clone(self);
                let loop_symbol = symbol.clone();
                let handle = tokio::spawn(async move {
                    scheduler.run_loop(loop_symbol, cancelled).await;
                });

                slot.insert(ActiveLoop { handle, cancel });
                info!("Tracking {}", symbol);
                Ok(symbol)
            }
        }
    }

    /// Stop a symbol's loop and remove its record.
    ///
    /// The loop stops at its next suspension point. A fetch already in
    /// flight runs to completion in the background, but its result is never
    /// published.
    pub async fn deregister(&self, symbol: &str) -> Result<(), SchedulerError> {
        let symbol = normalize_symbol(symbol).ok_or(SchedulerError::EmptySymbol)?;
        let (_, active) = self
            .loops
            .remove(&symbol)
            .ok_or_else(|| SchedulerError::NotTracked(symbol.clone()))?;

        stop_loop(&symbol, active).await;

        if self.clear_untracked(&symbol) {
            info!("Stopped tracking {}", symbol);
        } else {
            debug!("{} was registered again while stopping, keeping its state", symbol);
        }
        Ok(())
    }

    /// Drop status, record and enrichment slot for a symbol with no loop.
    ///
    /// The vacant `loops` entry is held throughout, so a concurrent
    /// `register` either finishes first (nothing is cleared) or waits.
    fn clear_untracked(&self, symbol: &str) -> bool {
        let Entry::Vacant(_slot) = self.loops.entry(symbol.to_string()) else {
            return false;
        };

        self.statuses.remove(symbol);
        self.store.remove(symbol);
        if let Some(enricher) = &self.enricher {
            enricher.forget(symbol);
        }
        true
    }

    pub fn is_tracked(&self, symbol: &str) -> bool {
        normalize_symbol(symbol).is_some_and(|s| self.loops.contains_key(&s))
    }

    /// Tracked symbols, sorted.
    pub fn tracked(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.loops.iter().map(|e| e.key().clone()).collect();
        symbols.sort();
        symbols
    }

    /// Loop status for every tracked symbol, sorted by symbol.
    pub fn statuses(&self) -> Vec<SymbolStatus> {
        let mut statuses: Vec<SymbolStatus> =
            self.statuses.iter().map(|e| e.value().clone()).collect();
        statuses.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        statuses
    }

    pub fn status(&self, symbol: &str) -> Option<SymbolStatus> {
        self.statuses.get(symbol).map(|s| s.clone())
    }

    /// Stop every loop and wait for them to exit. Records are kept.
    pub async fn shutdown(&self) {
        let symbols: Vec<String> = self.loops.iter().map(|e| e.key().clone()).collect();
        let stops = symbols.into_iter().filter_map(|symbol| {
            let (symbol, active) = self.loops.remove(&symbol)?;
            Some(async move { stop_loop(&symbol, active).await })
        });
        let stopped = join_all(stops).await.len();
        info!("Refresh scheduler stopped ({} loops)", stopped);
    }

    /// Delay before the next cycle after `failures` consecutive failures,
    /// without jitter.
    pub fn backoff_delay(&self, failures: u32) -> Duration {
        if failures == 0 {
            return self.config.refresh_interval();
        }
        let factor = 1u64 << failures.min(MAX_BACKOFF_EXPONENT);
        let delay = self
            .config
            .refresh_interval_ms
            .saturating_mul(factor)
            .min(self.config.max_backoff_ms);
        Duration::from_millis(delay)
    }

    fn jitter(&self) -> Duration {
        if self.config.jitter_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=self.config.jitter_ms))
    }

    async fn run_loop(self: Arc<Self>, symbol: String, mut cancelled: watch::Receiver<bool>) {
        debug!("Refresh loop started for {}", symbol);

        loop {
            let delay = tokio::select! {
                _ = cancelled.changed() => break,
                result = self.run_cycle(&symbol) => self.finish_cycle(&symbol, result),
            };

            tokio::select! {
                _ = cancelled.changed() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        debug!("Refresh loop exited for {}", symbol);
    }

    /// Run a single fetch/compute/publish cycle for `symbol`.
    ///
    /// On success the new record is in the store and enrichment has been
    /// requested. On failure the store is untouched.
    pub async fn run_cycle(&self, symbol: &str) -> Result<Arc<SignalRecord>, FetchError> {
        self.set_state(symbol, LoopState::Fetching);
        let bars = self.fetch(symbol).await?;

        self.set_state(symbol, LoopState::Computing);
        let latest = *bars
            .last()
            .ok_or_else(|| FetchError::Empty(symbol.to_string()))?;
        let indicators = compute_indicators(&bars, &self.indicators);
        let classification = classify(latest.close, &indicators, &self.thresholds);

        self.set_state(symbol, LoopState::Publishing);
        let record = SignalRecord {
            symbol: symbol.to_string(),
            close: latest.close,
            open: latest.open,
            high: latest.high,
            low: latest.low,
            volume: latest.volume,
            bar_time: latest.time,
            indicators,
            signal: classification.signal,
            color: classification.color,
            quant_note: classification.note,
            quant_confidence: classification.confidence,
            rationale: None,
            last_updated: self.clock.now_millis(),
            data_source: self.source.name().to_string(),
        };
        let published = self.store.publish(record);

        debug!(
            "Published {} {} (close {:.2}, {} bars)",
            symbol,
            published.signal,
            published.close,
            bars.len()
        );

        if let Some(enricher) = &self.enricher {
            enricher.request(Arc::clone(&published));
        }

        Ok(published)
    }

    /// Fetch bars in a separate task so a panicking source only fails this
    /// cycle, bounded by the fetch timeout.
    async fn fetch(&self, symbol: &str) -> Result<Vec<Bar>, FetchError> {
        let source = Arc::clone(&self.source);
        let owned = symbol.to_string();
        let lookback = self.lookback;
        let mut task = tokio::spawn(async move { source.fetch_bars(&owned, lookback).await });

        let bars = match tokio::time::timeout(self.config.fetch_timeout(), &mut task).await {
            Ok(Ok(result)) => result?,
            Ok(Err(join_error)) => return Err(FetchError::Aborted(join_error.to_string())),
            Err(_) => {
                task.abort();
                return Err(FetchError::Timeout(self.config.fetch_timeout_ms));
            }
        };

        let mut bars: Vec<Bar> = bars.into_iter().filter(Bar::is_valid).collect();
        if bars.is_empty() {
            return Err(FetchError::Empty(symbol.to_string()));
        }
        bars.sort_by_key(|b| b.time);
        if bars.len() > lookback {
            bars.drain(..bars.len() - lookback);
        }
        Ok(bars)
    }

    /// Record the outcome of a cycle and return the delay before the next.
    fn finish_cycle(
        &self,
        symbol: &str,
        result: Result<Arc<SignalRecord>, FetchError>,
    ) -> Duration {
        let Some(mut status) = self.statuses.get_mut(symbol) else {
            return self.backoff_delay(0);
        };

        match result {
            Ok(record) => {
                status.consecutive_failures = 0;
                status.last_error = None;
                status.last_success = Some(record.last_updated);
            }
            Err(e) => {
                status.consecutive_failures = status.consecutive_failures.saturating_add(1);
                status.last_error = Some(e.to_string());
            }
        }

        let delay = self.backoff_delay(status.consecutive_failures) + self.jitter();
        if let Some(error) = &status.last_error {
            warn!(
                "Refresh failed for {} ({} in a row), retrying in {}ms: {}",
                symbol,
                status.consecutive_failures,
                delay.as_millis(),
                error
            );
        }
        status.state = LoopState::Idle;
        status.next_delay_ms = delay.as_millis() as u64;
        delay
    }

    fn set_state(&self, symbol: &str, state: LoopState) {
        if let Some(mut status) = self.statuses.get_mut(symbol) {
            status.state = state;
        }
    }
}

async fn stop_loop(symbol: &str, active: ActiveLoop) {
    // Receiver may already be gone if the loop exited
    let _ = active.cancel.send(true);
    if let Err(e) = active.handle.await {
        warn!("Refresh loop for {} ended abnormally: {}", symbol, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::types::Signal;
    use async_trait::async_trait;

    struct StaticSource {
        bars: Vec<Bar>,
    }

    #[async_trait]
    impl MarketDataSource for StaticSource {
        fn name(&self) -> &str {
            "static"
        }

        async fn fetch_bars(&self, _: &str, _: usize) -> Result<Vec<Bar>, FetchError> {
            Ok(self.bars.clone())
        }
    }

    struct PanickingSource;

    #[async_trait]
    impl MarketDataSource for PanickingSource {
        fn name(&self) -> &str {
            "panicking"
        }

        async fn fetch_bars(&self, _: &str, _: usize) -> Result<Vec<Bar>, FetchError> {
            panic!("source exploded");
        }
    }

    struct HangingSource;

    #[async_trait]
    impl MarketDataSource for HangingSource {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn fetch_bars(&self, _: &str, _: usize) -> Result<Vec<Bar>, FetchError> {
            std::future::pending().await
        }
    }

    fn bar(i: usize, close: f64) -> Bar {
        Bar {
            time: i as i64 * 60_000,
            open: close,
            high: close + 0.5,
            low: close - 0.5,
            close,
            volume: 1_000.0,
        }
    }

    fn setup(source: Arc<dyn MarketDataSource>) -> (Arc<RefreshScheduler>, Arc<SnapshotStore>) {
        let store = SnapshotStore::new();
        let scheduler = RefreshScheduler::new(
            &Config::default(),
            source,
            Arc::clone(&store),
            None,
            Arc::new(ManualClock::new(1_000_000)),
        );
        (scheduler, store)
    }

    #[test]
    fn test_backoff_delay_is_capped() {
        let (scheduler, _) = setup(Arc::new(StaticSource { bars: vec![] }));
        assert_eq!(scheduler.backoff_delay(0), Duration::from_secs(5));
        assert_eq!(scheduler.backoff_delay(1), Duration::from_secs(10));
        assert_eq!(scheduler.backoff_delay(2), Duration::from_secs(20));
        assert_eq!(scheduler.backoff_delay(3), Duration::from_secs(40));
        assert_eq!(scheduler.backoff_delay(4), Duration::from_secs(60));
        assert_eq!(scheduler.backoff_delay(u32::MAX), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_run_cycle_publishes_record() {
        let bars: Vec<Bar> = (0..30).map(|i| bar(i, 100.0 + i as f64)).collect();
        let (scheduler, store) = setup(Arc::new(StaticSource { bars }));

        let record = scheduler.run_cycle("AAPL").await.unwrap();
        assert_eq!(record.close, 129.0);
        assert_eq!(record.bar_time, 29 * 60_000);
        assert_eq!(record.data_source, "static");
        assert_eq!(record.last_updated, 1_000_000);
        assert!(record.indicators.is_complete());
        assert_eq!(store.get("AAPL").unwrap().close, 129.0);
    }

    #[tokio::test]
    async fn test_run_cycle_short_history_is_unknown() {
        let bars: Vec<Bar> = (0..5).map(|i| bar(i, 100.0)).collect();
        let (scheduler, store) = setup(Arc::new(StaticSource { bars }));

        let record = scheduler.run_cycle("AAPL").await.unwrap();
        assert_eq!(record.signal, Signal::Unknown);
        assert!(store.get("AAPL").is_some());
    }

    #[tokio::test]
    async fn test_run_cycle_drops_invalid_bars() {
        let mut bars: Vec<Bar> = (0..3).map(|i| bar(i, 100.0)).collect();
        bars.push(Bar {
            close: f64::NAN,
            ..bar(3, 100.0)
        });
        let (scheduler, _) = setup(Arc::new(StaticSource { bars }));

        let record = scheduler.run_cycle("AAPL").await.unwrap();
        assert_eq!(record.bar_time, 2 * 60_000);
    }

    #[tokio::test]
    async fn test_run_cycle_empty_is_failure() {
        let (scheduler, store) = setup(Arc::new(StaticSource { bars: vec![] }));
        let err = scheduler.run_cycle("AAPL").await.unwrap_err();
        assert!(matches!(err, FetchError::Empty(_)));
        assert!(store.get("AAPL").is_none());
    }

    #[tokio::test]
    async fn test_panicking_source_is_contained() {
        let (scheduler, store) = setup(Arc::new(PanickingSource));
        let err = scheduler.run_cycle("AAPL").await.unwrap_err();
        assert!(matches!(err, FetchError::Aborted(_)));
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_source_times_out() {
        let (scheduler, _) = setup(Arc::new(HangingSource));
        let err = scheduler.run_cycle("AAPL").await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout(10_000)));
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates_and_blanks() {
        let (scheduler, _) = setup(Arc::new(StaticSource { bars: vec![] }));

        assert_eq!(scheduler.register(" aapl ").unwrap(), "AAPL");
        assert_eq!(
            scheduler.register("AAPL"),
            Err(SchedulerError::AlreadyTracked("AAPL".to_string()))
        );
        assert_eq!(scheduler.register("  "), Err(SchedulerError::EmptySymbol));
        assert_eq!(scheduler.tracked(), vec!["AAPL"]);
        assert!(scheduler.is_tracked("aapl"));

        scheduler.shutdown().await;
        assert!(scheduler.tracked().is_empty());
    }

    #[tokio::test]
    async fn test_deregister_unknown_symbol() {
        let (scheduler, _) = setup(Arc::new(StaticSource { bars: vec![] }));
        assert_eq!(
            scheduler.deregister("NVDA").await,
            Err(SchedulerError::NotTracked("NVDA".to_string()))
        );
    }

    #[tokio::test]
    async fn test_cleanup_skips_symbol_registered_again() {
        let bars: Vec<Bar> = (0..30).map(|i| bar(i, 100.0 + i as f64)).collect();
        let (scheduler, store) = setup(Arc::new(StaticSource { bars }));
        scheduler.run_cycle("AAPL").await.unwrap();
        scheduler.register("AAPL").unwrap();

        // Tail of an earlier deregister racing the new registration
        assert!(!scheduler.clear_untracked("AAPL"));
        assert!(scheduler.is_tracked("AAPL"));
        assert!(scheduler.status("AAPL").is_some());
        assert!(store.get("AAPL").is_some());

        scheduler.deregister("AAPL").await.unwrap();
        assert!(scheduler.status("AAPL").is_none());
        assert!(store.get("AAPL").is_none());
    }
}
