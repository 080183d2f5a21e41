//! Rationale enrichment for published records.
//!
//! At most one rationale request runs per symbol. Snapshots that arrive
//! while a request is in flight collapse into a single pending slot holding
//! the newest one, which is explained once the current request finishes.

use crate::clock::Clock;
use crate::error::RationaleError;
use crate::services::SnapshotStore;
use crate::sources::RationaleService;
use crate::types::{Rationale, SignalRecord};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Deterministic prompt for a record's numeric fields.
pub fn build_prompt(record: &SignalRecord) -> String {
    let fmt = |v: Option<f64>, precision: usize| match v {
        Some(v) => format!("{:.*}", precision, v),
        None => "n/a".to_string(),
    };

    format!(
        "Symbol: {symbol}\n\
         Latest close: {close:.2}\n\
         SMA({sma_window}): {sma}\n\
         RSI({rsi_window}): {rsi}\n\
         Signal: {signal}\n\
         Rule: {note}\n\n\
         In at most three sentences, explain what these indicators say about {symbol} \
         and why the signal is {signal}. End with a line of the form \"Confidence: NN\" \
         where NN is 0-100.",
        symbol = record.symbol,
        close = record.close,
        sma_window = record.indicators.sma_window,
        sma = fmt(record.indicators.sma, 2),
        rsi_window = record.indicators.rsi_window,
        rsi = fmt(record.indicators.rsi, 1),
        signal = record.signal,
        note = record.quant_note,
    )
}

/// Split a trailing `Confidence: NN` line off a response.
///
/// Returns the remaining text and the parsed value (clamped to 100), or the
/// untouched text and `None` when the last line is not a confidence line.
pub fn parse_confidence(text: &str) -> (String, Option<u8>) {
    let trimmed = text.trim();
    let (body, last) = match trimmed.rsplit_once('\n') {
        Some((body, last)) => (body, last),
        None => ("", trimmed),
    };

    let last = last.trim().trim_start_matches(|c: char| c == '*' || c == '_');
    let Some(rest) = last
        .get(..10)
        .filter(|head| head.eq_ignore_ascii_case("confidence"))
        .map(|_| &last[10..])
    else {
        return (trimmed.to_string(), None);
    };

    let digits: String = rest
        .trim_start_matches(|c: char| c == ':' || c == '*' || c.is_whitespace())
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();

    match digits.parse::<u32>() {
        Ok(value) => (body.trim().to_string(), Some(value.min(100) as u8)),
        Err(_) => (trimmed.to_string(), None),
    }
}

/// What happened to one enrichment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichOutcome {
    /// Rationale attached to the record it explains.
    Merged,
    /// Response arrived after a newer snapshot was published.
    Discarded,
    /// Timeout or service error; the stored rationale is unchanged.
    Failed,
}

#[derive(Default)]
struct EnrichSlot {
    pending: Option<Arc<SignalRecord>>,
}

/// Coordinates bounded-latency rationale requests.
pub struct RationaleEnricher {
    service: Arc<dyn RationaleService>,
    store: Arc<SnapshotStore>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
    /// Symbols with a request in flight (symbol -> queued snapshot).
    inflight: DashMap<String, EnrichSlot>,
}

impl RationaleEnricher {
    pub fn new(
        service: Arc<dyn RationaleService>,
        store: Arc<SnapshotStore>,
        clock: Arc<dyn Clock>,
        timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            service,
            store,
            clock,
            timeout,
            inflight: DashMap::new(),
        })
    }

    /// Ask for a rationale for `snapshot`. Never blocks the caller.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn request(self: &Arc<Self>, snapshot: Arc<SignalRecord>) {
        match self.inflight.entry(snapshot.symbol.clone()) {
            Entry::Occupied(mut slot) => {
                debug!(
                    "Rationale for {} in flight, queueing snapshot {}",
                    snapshot.symbol, snapshot.last_updated
                );
                slot.get_mut().pending = Some(snapshot);
            }
            Entry::Vacant(slot) => {
                slot.insert(EnrichSlot::default());
                let this = Arc::clone(self);
                tokio::spawn(async move { this.drain(snapshot).await });
            }
        }
    }

    /// Drop any queued work for a symbol. A request already in flight still
    /// completes, but cannot merge once the record is gone.
    pub fn forget(&self, symbol: &str) {
        self.inflight.remove(symbol);
    }

    /// Whether a request is currently running for `symbol`.
    pub fn is_inflight(&self, symbol: &str) -> bool {
        self.inflight.contains_key(symbol)
    }

    async fn drain(&self, mut snapshot: Arc<SignalRecord>) {
        let symbol = snapshot.symbol.clone();
        loop {
            self.enrich(&snapshot).await;

            if self
                .inflight
                .remove_if(&symbol, |_, slot| slot.pending.is_none())
                .is_some()
            {
                return;
            }

            let next = self
                .inflight
                .get_mut(&symbol)
                .and_then(|mut slot| slot.pending.take());
            match next {
                Some(next) => snapshot = next,
                // Forgotten while in flight
                None => return,
            }
        }
    }

    /// Run one bounded request for `snapshot` and merge the result.
    pub async fn enrich(&self, snapshot: &SignalRecord) -> EnrichOutcome {
        let text = match self.explain(build_prompt(snapshot)).await {
            Ok(text) => text,
            Err(e) => {
                warn!(
                    "Rationale for {} ({}) failed: {}",
                    snapshot.symbol,
                    self.service.name(),
                    e
                );
                return EnrichOutcome::Failed;
            }
        };

        let (text, parsed) = parse_confidence(&text);
        if text.is_empty() {
            warn!("Rationale for {} was empty", snapshot.symbol);
            return EnrichOutcome::Failed;
        }

        let rationale = Rationale {
            text,
            confidence: parsed.unwrap_or(snapshot.quant_confidence),
            explains: snapshot.last_updated,
            generated_at: self.clock.now_millis(),
        };

        if self
            .store
            .merge_rationale(&snapshot.symbol, snapshot.last_updated, rationale)
        {
            debug!(
                "Merged rationale for {} at {}",
                snapshot.symbol, snapshot.last_updated
            );
            EnrichOutcome::Merged
        } else {
            EnrichOutcome::Discarded
        }
    }

    /// Call the service in its own task so a panic fails only this request
    /// and the symbol's slot is still released by `drain`.
    async fn explain(&self, prompt: String) -> Result<String, RationaleError> {
        let service = Arc::clone(&self.service);
        let mut task = tokio::spawn(async move { service.explain(&prompt).await });

        match tokio::time::timeout(self.timeout, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(RationaleError::Aborted(join_error.to_string())),
            Err(_) => {
                task.abort();
                Err(RationaleError::Timeout(self.timeout.as_millis() as u64))
            }
        }
    }
}
