//! Beacon - live trading-signal pipeline
//!
//! Per-symbol refresh loops fetch OHLCV bars, derive SMA/RSI, classify a
//! signal and publish it to a snapshot store that HTTP clients poll. A
//! language-model rationale is attached asynchronously when available.

pub mod api;
pub mod clock;
pub mod config;
pub mod error;
pub mod services;
pub mod sources;
pub mod types;

use clock::Clock;
use config::Config;
use services::{RationaleEnricher, RefreshScheduler, SignalQuery, SnapshotStore};
use sources::{MarketDataSource, RationaleService};
use std::sync::Arc;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<SnapshotStore>,
    pub scheduler: Arc<RefreshScheduler>,
    pub query: Arc<SignalQuery>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Wire the pipeline together. No loops are started until symbols are
    /// registered with the scheduler.
    pub fn new(
        config: Config,
        source: Arc<dyn MarketDataSource>,
        rationale: Option<Arc<dyn RationaleService>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let store = SnapshotStore::new();
        let enricher = rationale.map(|service| {
            RationaleEnricher::new(
                service,
                Arc::clone(&store),
                Arc::clone(&clock),
                config.rationale.timeout(),
            )
        });
        let scheduler = RefreshScheduler::new(
            &config,
            source,
            Arc::clone(&store),
            enricher,
            Arc::clone(&clock),
        );
        let query = Arc::new(SignalQuery::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            config.scheduler.stale_threshold_ms,
        ));

        Self {
            config: Arc::new(config),
            store,
            scheduler,
            query,
            clock,
        }
    }
}

// Re-export commonly used types
pub use types::*;
