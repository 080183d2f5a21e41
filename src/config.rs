use crate::error::ConfigError;
use crate::types::normalize_symbol;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Which market-data source feeds the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketDataKind {
    Yahoo,
    Mock,
}

impl FromStr for MarketDataKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "yahoo" => Ok(Self::Yahoo),
            "mock" => Ok(Self::Mock),
            _ => Err(()),
        }
    }
}

/// Market-data source configuration.
#[derive(Debug, Clone)]
pub struct MarketDataConfig {
    pub kind: MarketDataKind,
    /// Yahoo chart range (e.g. "1d", "5d").
    pub yahoo_range: String,
    /// Yahoo bar interval (e.g. "1m", "5m").
    pub yahoo_interval: String,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            kind: MarketDataKind::Yahoo,
            yahoo_range: "1d".to_string(),
            yahoo_interval: "1m".to_string(),
        }
    }
}

/// Largest accepted SMA/RSI window.
pub const MAX_INDICATOR_WINDOW: usize = 1_000;

/// Largest accepted number of extra bars per fetch.
pub const MAX_LOOKBACK_BUFFER: usize = 10_000;

/// Indicator windows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorConfig {
    pub sma_window: usize,
    pub rsi_window: usize,
}

impl IndicatorConfig {
    /// Bars needed before every indicator is defined.
    pub fn min_bars(&self) -> usize {
        self.sma_window.max(self.rsi_window.saturating_add(1))
    }
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            sma_window: 20,
            rsi_window: 14,
        }
    }
}

/// RSI thresholds used by the classifier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifierThresholds {
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
}

impl Default for ClassifierThresholds {
    fn default() -> Self {
        Self {
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
        }
    }
}

/// Refresh loop timing.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Delay between successful cycles (ms).
    pub refresh_interval_ms: u64,
    /// Random extra delay added to each cycle, 0 disables jitter (ms).
    pub jitter_ms: u64,
    /// Cap for the failure backoff (ms).
    pub max_backoff_ms: u64,
    /// Bound on a single market-data fetch (ms).
    pub fetch_timeout_ms: u64,
    /// Records older than this are reported stale (ms).
    pub stale_threshold_ms: u64,
    /// Extra bars requested beyond the longest indicator window.
    pub lookback_buffer: usize,
}

impl SchedulerConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 5_000,
            jitter_ms: 0,
            max_backoff_ms: 60_000,
            fetch_timeout_ms: 10_000,
            stale_threshold_ms: 15_000,
            lookback_buffer: 10,
        }
    }
}

/// Rationale service configuration.
#[derive(Debug, Clone)]
pub struct RationaleConfig {
    /// Bound on a single rationale request (ms).
    pub timeout_ms: u64,
    /// API key for the language-model service. Enrichment is off without one.
    pub api_key: Option<String>,
    /// OpenAI-compatible API base URL.
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl RationaleConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn enabled(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

impl Default for RationaleConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 4_000,
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 256,
            temperature: 0.3,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Symbols tracked from startup.
    pub symbols: Vec<String>,
    pub market_data: MarketDataConfig,
    pub scheduler: SchedulerConfig,
    pub indicators: IndicatorConfig,
    pub thresholds: ClassifierThresholds,
    pub rationale: RationaleConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let refresh_interval_ms: u64 = parse_or(&lookup, "REFRESH_INTERVAL_MS", 5_000)?;

        let market_data = MarketDataConfig {
            kind: match lookup("MARKET_DATA_SOURCE") {
                Some(v) => v.parse().map_err(|_| ConfigError::Unparseable {
                    name: "MARKET_DATA_SOURCE",
                    value: v,
                })?,
                None => MarketDataKind::Yahoo,
            },
            yahoo_range: lookup("YAHOO_RANGE").unwrap_or_else(|| "1d".to_string()),
            yahoo_interval: lookup("YAHOO_INTERVAL").unwrap_or_else(|| "1m".to_string()),
        };

        let defaults = RationaleConfig::default();
        let config = Self {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&lookup, "PORT", 3001)?,
            symbols: lookup("SYMBOLS")
                .unwrap_or_else(|| "AAPL,TSLA,MSFT".to_string())
                .split(',')
                .filter_map(normalize_symbol)
                .collect(),
            market_data,
            scheduler: SchedulerConfig {
                refresh_interval_ms,
                jitter_ms: parse_or(&lookup, "REFRESH_JITTER_MS", 0)?,
                max_backoff_ms: parse_or(&lookup, "MAX_BACKOFF_MS", 60_000)?,
                fetch_timeout_ms: parse_or(&lookup, "FETCH_TIMEOUT_MS", 10_000)?,
                // Three missed refreshes make a record stale unless set explicitly
                stale_threshold_ms: parse_or(
                    &lookup,
                    "STALE_THRESHOLD_MS",
                    refresh_interval_ms.saturating_mul(3),
                )?,
                lookback_buffer: parse_or(&lookup, "LOOKBACK_BUFFER", 10)?,
            },
            indicators: IndicatorConfig {
                sma_window: parse_or(&lookup, "SMA_WINDOW", 20)?,
                rsi_window: parse_or(&lookup, "RSI_WINDOW", 14)?,
            },
            thresholds: ClassifierThresholds {
                rsi_overbought: parse_or(&lookup, "RSI_OVERBOUGHT", 70.0)?,
                rsi_oversold: parse_or(&lookup, "RSI_OVERSOLD", 30.0)?,
            },
            rationale: RationaleConfig {
                timeout_ms: parse_or(&lookup, "RATIONALE_TIMEOUT_MS", defaults.timeout_ms)?,
                api_key: lookup("LLM_API_KEY").filter(|k| !k.is_empty()),
                base_url: lookup("LLM_BASE_URL").unwrap_or(defaults.base_url),
                model: lookup("LLM_MODEL").unwrap_or(defaults.model),
                max_tokens: parse_or(&lookup, "LLM_MAX_TOKENS", defaults.max_tokens)?,
                temperature: parse_or(&lookup, "LLM_TEMPERATURE", defaults.temperature)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |name: &'static str, reason: &str| {
            Err(ConfigError::Invalid {
                name,
                reason: reason.to_string(),
            })
        };

        if self.indicators.sma_window == 0 {
            return invalid("SMA_WINDOW", "must be at least 1");
        }
        if self.indicators.rsi_window < 2 {
            return invalid("RSI_WINDOW", "must be at least 2");
        }
        if self.indicators.sma_window > MAX_INDICATOR_WINDOW {
            return invalid("SMA_WINDOW", "must be at most 1000");
        }
        if self.indicators.rsi_window > MAX_INDICATOR_WINDOW {
            return invalid("RSI_WINDOW", "must be at most 1000");
        }

        let t = &self.thresholds;
        if !(0.0..=100.0).contains(&t.rsi_oversold) || !(0.0..=100.0).contains(&t.rsi_overbought) {
            return invalid("RSI_OVERSOLD/RSI_OVERBOUGHT", "must lie within 0-100");
        }
        if t.rsi_oversold >= t.rsi_overbought {
            return invalid("RSI_OVERSOLD", "must be below RSI_OVERBOUGHT");
        }

        let s = &self.scheduler;
        if s.refresh_interval_ms == 0 {
            return invalid("REFRESH_INTERVAL_MS", "must be greater than 0");
        }
        if s.max_backoff_ms < s.refresh_interval_ms {
            return invalid("MAX_BACKOFF_MS", "must be at least REFRESH_INTERVAL_MS");
        }
        if s.fetch_timeout_ms == 0 {
            return invalid("FETCH_TIMEOUT_MS", "must be greater than 0");
        }
        if s.stale_threshold_ms == 0 {
            return invalid("STALE_THRESHOLD_MS", "must be greater than 0");
        }
        if s.lookback_buffer > MAX_LOOKBACK_BUFFER {
            return invalid("LOOKBACK_BUFFER", "must be at most 10000");
        }
        if self.rationale.timeout_ms == 0 {
            return invalid("RATIONALE_TIMEOUT_MS", "must be greater than 0");
        }

        Ok(())
    }

    /// Bars requested per fetch.
    pub fn lookback(&self) -> usize {
        self.indicators.min_bars() + self.scheduler.lookback_buffer
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            symbols: vec!["AAPL".to_string(), "TSLA".to_string(), "MSFT".to_string()],
            market_data: MarketDataConfig::default(),
            scheduler: SchedulerConfig::default(),
            indicators: IndicatorConfig::default(),
            thresholds: ClassifierThresholds::default(),
            rationale: RationaleConfig::default(),
        }
    }
}

fn parse_or<T, F>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Unparseable { name, value }),
        None => Ok(default),
    }
}
