//! Latest signal record per symbol.
//!
//! Records are immutable once published; every write swaps the whole
//! `Arc`, so a reader never observes a half-updated record.

use crate::types::{Rationale, SignalRecord};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Concurrent map of symbol to its current record.
pub struct SnapshotStore {
    records: DashMap<String, Arc<SignalRecord>>,
}

impl SnapshotStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            records: DashMap::new(),
        })
    }

    /// Replace the record for `record.symbol`.
    ///
    /// `last_updated` is bumped if needed so it strictly increases per
    /// symbol. A rationale from the previous record is kept when the new one
    /// has none; its `explains` tag still names the older snapshot.
    pub fn publish(&self, mut record: SignalRecord) -> Arc<SignalRecord> {
        match self.records.entry(record.symbol.clone()) {
            Entry::Occupied(mut slot) => {
                let previous = slot.get();
                if record.last_updated <= previous.last_updated {
                    record.last_updated = previous.last_updated + 1;
                }
                if record.rationale.is_none() {
                    record.rationale = previous.rationale.clone();
                }
                let record = Arc::new(record);
                slot.insert(Arc::clone(&record));
                record
            }
            Entry::Vacant(slot) => {
                let record = Arc::new(record);
                slot.insert(Arc::clone(&record));
                record
            }
        }
    }

    /// Attach a rationale if the stored record is still the one it explains.
    ///
    /// Returns false, leaving the store untouched, when the symbol is gone or
    /// its `last_updated` no longer equals `expected_last_updated`.
    pub fn merge_rationale(
        &self,
        symbol: &str,
        expected_last_updated: i64,
        rationale: Rationale,
    ) -> bool {
        let Some(mut current) = self.records.get_mut(symbol) else {
            return false;
        };

        if current.last_updated != expected_last_updated {
            debug!(
                "Discarding rationale for {}: explains {} but store holds {}",
                symbol, expected_last_updated, current.last_updated
            );
            return false;
        }

        let merged = current.with_rationale(rationale);
        *current = Arc::new(merged);
        true
    }

    pub fn get(&self, symbol: &str) -> Option<Arc<SignalRecord>> {
        self.records.get(symbol).map(|r| Arc::clone(r.value()))
    }

    /// Records for several symbols, in request order.
    pub fn get_many<S: AsRef<str>>(&self, symbols: &[S]) -> Vec<Option<Arc<SignalRecord>>> {
        symbols.iter().map(|s| self.get(s.as_ref())).collect()
    }

    /// Remove a symbol's record. Returns whether one existed.
    pub fn remove(&self, symbol: &str) -> bool {
        self.records.remove(symbol).is_some()
    }

    /// Symbols that currently have a record, sorted.
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.records.iter().map(|e| e.key().clone()).collect();
        symbols.sort();
        symbols
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
