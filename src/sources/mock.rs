//! Random-walk market data for demos and offline runs.

use crate::error::FetchError;
use crate::sources::MarketDataSource;
use crate::types::Bar;
use async_trait::async_trait;
use dashmap::DashMap;
use rand::Rng;

/// Per-bar relative price move (0.5%).
const VOLATILITY: f64 = 0.005;
const BAR_SPACING_MS: i64 = 60_000;

fn base_price(symbol: &str) -> Option<f64> {
    match symbol {
        "AAPL" => Some(310.0),
        "TSLA" => Some(430.0),
        "MSFT" => Some(280.0),
        "GOOGL" => Some(135.0),
        "AMZN" => Some(140.0),
        _ => None,
    }
}

/// Generates plausible OHLCV bars. Each symbol keeps its last close so
/// successive fetches continue the same walk.
#[derive(Default)]
pub struct MockMarketSource {
    last_close: DashMap<String, f64>,
}

impl MockMarketSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn generate(&self, symbol: &str, count: usize, end_time: i64) -> Vec<Bar> {
        let mut rng = rand::thread_rng();
        let mut price = match self.last_close.get(symbol) {
            Some(p) => *p,
            None => base_price(symbol).unwrap_or_else(|| rng.gen_range(100.0..500.0)),
        };

        let start = end_time - BAR_SPACING_MS * count.saturating_sub(1) as i64;
        let mut bars = Vec::with_capacity(count);

        for i in 0..count {
            let open = price;
            let change = rng.gen_range(-VOLATILITY..VOLATILITY);
            let close = (open * (1.0 + change)).max(0.01);
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..VOLATILITY / 2.0));
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..VOLATILITY / 2.0));

            bars.push(Bar {
                time: start + i as i64 * BAR_SPACING_MS,
                open,
                high,
                low,
                close,
                volume: rng.gen_range(50_000..500_000) as f64,
            });
            price = close;
        }

        self.last_close.insert(symbol.to_string(), price);
        bars
    }
}

#[async_trait]
impl MarketDataSource for MockMarketSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch_bars(&self, symbol: &str, lookback: usize) -> Result<Vec<Bar>, FetchError> {
        if lookback == 0 {
            return Err(FetchError::Empty(symbol.to_string()));
        }
        let now = chrono::Utc::now().timestamp_millis();
        Ok(self.generate(symbol, lookback, now))
    }
}
