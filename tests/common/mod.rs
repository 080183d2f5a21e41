//! Fakes shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use beacon::clock::Clock;
use beacon::error::{FetchError, RationaleError};
use beacon::sources::{MarketDataSource, RationaleService};
use beacon::types::Bar;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;

pub fn bar(i: usize, close: f64) -> Bar {
    Bar {
        time: 1_700_000_000_000 + i as i64 * 60_000,
        open: close,
        high: close + 0.25,
        low: close - 0.25,
        close,
        volume: 25_000.0,
    }
}

/// 25 one-minute bars: a slide from 110 to 99 followed by a steady climb to
/// 105.5. The close ends above SMA(20) (~102.3) with RSI(14) near 45.
pub fn recovering_series() -> Vec<Bar> {
    let mut closes = Vec::with_capacity(25);
    let mut close = 110.0;
    closes.push(close);
    for _ in 0..11 {
        close -= 1.0;
        closes.push(close);
    }
    while closes.len() < 25 {
        close += 0.5;
        closes.push(close);
    }
    closes.into_iter().enumerate().map(|(i, c)| bar(i, c)).collect()
}

/// Per-symbol scripted responses. Once a script runs out, the last response
/// repeats. Symbols without a script return no bars.
#[derive(Default)]
pub struct ScriptedSource {
    scripts: Mutex<HashMap<String, Vec<Vec<Bar>>>>,
    calls: Mutex<HashMap<String, usize>>,
    panic_on: Option<String>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(self, symbol: &str, responses: Vec<Vec<Bar>>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(symbol.to_string(), responses);
        self
    }

    pub fn panicking_on(mut self, symbol: &str) -> Self {
        self.panic_on = Some(symbol.to_string());
        self
    }

    pub fn calls(&self, symbol: &str) -> usize {
        self.calls.lock().unwrap().get(symbol).copied().unwrap_or(0)
    }
}

#[async_trait]
impl MarketDataSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch_bars(&self, symbol: &str, _lookback: usize) -> Result<Vec<Bar>, FetchError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(symbol.to_string()).or_insert(0);
            *count += 1;
            *count - 1
        };

        if self.panic_on.as_deref() == Some(symbol) {
            panic!("scripted failure for {}", symbol);
        }

        let scripts = self.scripts.lock().unwrap();
        let bars = scripts
            .get(symbol)
            .and_then(|script| script.get(call).or_else(|| script.last()))
            .cloned()
            .unwrap_or_default();
        Ok(bars)
    }
}

/// Holds every request until `release` is called.
#[derive(Default)]
pub struct GatedRationale {
    gate: Notify,
    calls: AtomicUsize,
}

impl GatedRationale {
    pub fn release(&self) {
        self.gate.notify_one();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RationaleService for GatedRationale {
    fn name(&self) -> &str {
        "gated"
    }

    async fn explain(&self, _prompt: &str) -> Result<String, RationaleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.gate.notified().await;
        Ok("Price has recovered above its 20-bar average while momentum stays moderate.\n\
            Confidence: 68"
            .to_string())
    }
}

/// Wall clock driven by Tokio's (pausable) timer.
pub struct TokioClock {
    start: tokio::time::Instant,
    base_millis: i64,
}

impl TokioClock {
    pub fn new(base_millis: i64) -> Self {
        Self {
            start: tokio::time::Instant::now(),
            base_millis,
        }
    }
}

impl Clock for TokioClock {
    fn now_millis(&self) -> i64 {
        self.base_millis + self.start.elapsed().as_millis() as i64
    }
}
