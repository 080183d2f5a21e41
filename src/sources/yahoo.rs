//! Yahoo Finance chart API as a market-data source.
//!
//! Uses the unofficial chart endpoint (no API key).

use crate::error::FetchError;
use crate::sources::MarketDataSource;
use crate::types::Bar;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const YAHOO_CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

/// Yahoo Finance chart response.
#[derive(Debug, Deserialize)]
struct YahooChartResponse {
    chart: YahooChart,
}

#[derive(Debug, Deserialize)]
struct YahooChart {
    result: Option<Vec<YahooResult>>,
    error: Option<YahooError>,
}

#[derive(Debug, Deserialize)]
struct YahooError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct YahooResult {
    timestamp: Option<Vec<i64>>,
    indicators: YahooIndicators,
}

#[derive(Debug, Deserialize)]
struct YahooIndicators {
    quote: Vec<YahooQuote>,
}

#[derive(Debug, Deserialize)]
struct YahooQuote {
    open: Option<Vec<Option<f64>>>,
    high: Option<Vec<Option<f64>>>,
    low: Option<Vec<Option<f64>>>,
    close: Option<Vec<Option<f64>>>,
    volume: Option<Vec<Option<u64>>>,
}

/// Normalize symbol for Yahoo Finance API.
/// Yahoo uses hyphens instead of dots for share classes (e.g., BRK-B not BRK.B)
fn normalize_yahoo_symbol(symbol: &str) -> String {
    symbol.to_uppercase().replace('.', "-")
}

/// Turn a chart response into bars, dropping points with missing or
/// non-positive prices.
fn parse_chart(data: YahooChartResponse) -> Result<Vec<Bar>, FetchError> {
    if let Some(error) = data.chart.error {
        return Err(FetchError::Malformed(format!(
            "Yahoo API error: {} - {}",
            error.code, error.description
        )));
    }

    let result = data
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| FetchError::Malformed("No results in response".to_string()))?;

    let timestamps = result.timestamp.unwrap_or_default();
    let quote = result
        .indicators
        .quote
        .into_iter()
        .next()
        .ok_or_else(|| FetchError::Malformed("No quote data in response".to_string()))?;

    let opens = quote.open.unwrap_or_default();
    let highs = quote.high.unwrap_or_default();
    let lows = quote.low.unwrap_or_default();
    let closes = quote.close.unwrap_or_default();
    let volumes = quote.volume.unwrap_or_default();

    let at = |series: &[Option<f64>], i: usize| series.get(i).copied().flatten();

    let bars = timestamps
        .iter()
        .enumerate()
        .filter_map(|(i, &timestamp)| {
            let close = at(&closes, i)?;
            let bar = Bar {
                time: timestamp * 1000,
                open: at(&opens, i).unwrap_or(close),
                high: at(&highs, i).unwrap_or(close),
                low: at(&lows, i).unwrap_or(close),
                close,
                volume: volumes.get(i).copied().flatten().unwrap_or(0) as f64,
            };
            bar.is_valid().then_some(bar)
        })
        .collect();

    Ok(bars)
}

/// Yahoo Finance market-data source.
pub struct YahooFinanceSource {
    client: Client,
    range: String,
    interval: String,
}

impl YahooFinanceSource {
    /// Create a new source.
    ///
    /// - range: "1d", "5d", "1mo", ...
    /// - interval: "1m", "5m", "1h", "1d", ...
    pub fn new(range: impl Into<String>, interval: impl Into<String>) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()?;

        Ok(Self {
            client,
            range: range.into(),
            interval: interval.into(),
        })
    }
}

#[async_trait]
impl MarketDataSource for YahooFinanceSource {
    fn name(&self) -> &str {
        "yahoo"
    }

    async fn fetch_bars(&self, symbol: &str, lookback: usize) -> Result<Vec<Bar>, FetchError> {
        let url = format!(
            "{}/{}?range={}&interval={}&includePrePost=false",
            YAHOO_CHART_URL,
            normalize_yahoo_symbol(symbol),
            self.range,
            self.interval
        );

        debug!("Fetching Yahoo Finance data: {}", url);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::Network(format!("API error: {}", response.status())));
        }

        let data: YahooChartResponse = response.json().await?;
        let mut bars = parse_chart(data)?;

        if bars.is_empty() {
            return Err(FetchError::Empty(symbol.to_string()));
        }

        if bars.len() > lookback {
            bars.drain(..bars.len() - lookback);
        }
        Ok(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // normalize_yahoo_symbol Tests
    // =========================================================================

    #[test]
    fn test_normalize_yahoo_symbol() {
        assert_eq!(normalize_yahoo_symbol("aapl"), "AAPL");
        assert_eq!(normalize_yahoo_symbol("BRK.B"), "BRK-B");
        assert_eq!(normalize_yahoo_symbol("BRK-B"), "BRK-B");
    }

    // =========================================================================
    // parse_chart Tests
    // =========================================================================

    #[test]
    fn test_parse_chart_builds_bars() {
        let json = r#"{
            "chart": {
                "result": [{
                    "timestamp": [1700000000, 1700000060],
                    "indicators": {
                        "quote": [{
                            "open": [150.0, 151.0],
                            "high": [155.0, 156.0],
                            "low": [148.0, 149.0],
                            "close": [153.0, 154.0],
                            "volume": [50000000, 51000000]
                        }]
                    }
                }],
                "error": null
            }
        }"#;
        let data: YahooChartResponse = serde_json::from_str(json).unwrap();
        let bars = parse_chart(data).unwrap();

        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].time, 1_700_000_000_000);
        assert_eq!(bars[1].close, 154.0);
        assert_eq!(bars[1].volume, 51_000_000.0);
    }

    #[test]
    fn test_parse_chart_skips_null_closes() {
        let json = r#"{
            "chart": {
                "result": [{
                    "timestamp": [1, 2, 3],
                    "indicators": {
                        "quote": [{
                            "open": [150.0, null, 152.0],
                            "close": [153.0, null, 155.0]
                        }]
                    }
                }],
                "error": null
            }
        }"#;
        let data: YahooChartResponse = serde_json::from_str(json).unwrap();
        let bars = parse_chart(data).unwrap();

        assert_eq!(bars.len(), 2);
        assert_eq!(bars[1].close, 155.0);
        // Missing high/low fall back to close
        assert_eq!(bars[1].high, 155.0);
        assert_eq!(bars[1].volume, 0.0);
    }

    #[test]
    fn test_parse_chart_with_error() {
        let json = r#"{
            "chart": {
                "result": null,
                "error": { "code": "Not Found", "description": "No data" }
            }
        }"#;
        let data: YahooChartResponse = serde_json::from_str(json).unwrap();
        let err = parse_chart(data).unwrap_err();
        assert!(matches!(err, FetchError::Malformed(msg) if msg.contains("Not Found")));
    }

    #[test]
    fn test_parse_chart_without_timestamps_is_empty() {
        let json = r#"{
            "chart": {
                "result": [{ "indicators": { "quote": [{}] } }],
                "error": null
            }
        }"#;
        let data: YahooChartResponse = serde_json::from_str(json).unwrap();
        assert!(parse_chart(data).unwrap().is_empty());
    }

    #[test]
    fn test_source_creation() {
        let source = YahooFinanceSource::new("1d", "1m").unwrap();
        assert_eq!(source.name(), "yahoo");
    }
}
