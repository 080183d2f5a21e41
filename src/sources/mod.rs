//! External collaborators: market data and the rationale service.

pub mod llm;
pub mod mock;
pub mod yahoo;

pub use llm::LlmRationaleService;
pub use mock::MockMarketSource;
pub use yahoo::YahooFinanceSource;

use crate::error::{FetchError, RationaleError};
use crate::types::Bar;
use async_trait::async_trait;

/// Supplier of OHLCV history.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Short identifier recorded on every record built from this source.
    fn name(&self) -> &str;

    /// Fetch up to `lookback` of the most recent bars, oldest first.
    async fn fetch_bars(&self, symbol: &str, lookback: usize) -> Result<Vec<Bar>, FetchError>;
}

/// Produces a short natural-language explanation for a prompt.
///
/// Implementations must be safe to call concurrently and free of side effects.
#[async_trait]
pub trait RationaleService: Send + Sync {
    fn name(&self) -> &str;

    async fn explain(&self, prompt: &str) -> Result<String, RationaleError>;
}
