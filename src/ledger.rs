//! Interval and named ledgers
//!
//! [`IntervalLedger`] pairs start/stop events by key and folds the elapsed time
//! into a running total plus a per-name [`NamedLedger`]. The same type serves
//! JIT (method id), GC (collection count), assembly loading (assembly name or
//! path) and type loading (type-load id).
//!
//! Matching rules:
//! - a second `open` for a key already open overwrites the open timestamp
//! - a `close` for a key that isn't open is a no-op returning zero
//! - a successful `close` consumes the open entry

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;

/// Accumulated duration and occurrence count for one name
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub total_ms: f64,
    pub count: u64,
}

/// Human-readable name → accumulated duration/count
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamedLedger {
    entries: HashMap<String, LedgerEntry>,
    total_ms: f64,
}

impl NamedLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one occurrence of `name` lasting `duration_ms`
    pub fn add(&mut self, name: &str, duration_ms: f64) {
        let entry = self.entries.entry(name.to_string()).or_default();
        entry.total_ms += duration_ms;
        entry.count += 1;
        self.total_ms += duration_ms;
    }

    pub fn get(&self, name: &str) -> Option<&LedgerEntry> {
        self.entries.get(name)
    }

    /// Grand total across all names
    pub fn total_ms(&self) -> f64 {
        self.total_ms
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries ordered by total time (descending), ties by name
    pub fn sorted_desc(&self) -> Vec<(&str, &LedgerEntry)> {
        let mut sorted: Vec<_> = self
            .entries
            .iter()
            .map(|(name, entry)| (name.as_str(), entry))
            .collect();
        sorted.sort_by(|a, b| b.1.total_ms.total_cmp(&a.1.total_ms).then(a.0.cmp(b.0)));
        sorted
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.total_ms = 0.0;
    }
}

/// Open/close span matcher keyed by `K`
#[derive(Debug, Clone)]
pub struct IntervalLedger<K> {
    open: HashMap<K, f64>,
    total_ms: f64,
    closed: u64,
    named: NamedLedger,
}

impl<K> Default for IntervalLedger<K> {
    fn default() -> Self {
        Self {
            open: HashMap::new(),
            total_ms: 0.0,
            closed: 0,
            named: NamedLedger::default(),
        }
    }
}

impl<K: Eq + Hash> IntervalLedger<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or overwrite) the open timestamp for `key`
    pub fn open(&mut self, key: K, timestamp: f64) {
        self.open.insert(key, timestamp);
    }

    /// Close the span for `key`
    ///
    /// Returns the elapsed time, or zero if `key` had no open span. When `name`
    /// is given the duration is also added to the named ledger.
    pub fn close(&mut self, key: &K, name: Option<&str>, timestamp: f64) -> f64 {
        let Some(opened_at) = self.open.remove(key) else {
            return 0.0;
        };

        let duration = timestamp - opened_at;
        self.total_ms += duration;
        self.closed += 1;
        if let Some(name) = name {
            self.named.add(name, duration);
        }
        duration
    }

    /// Sum of every matched span
    pub fn total_ms(&self) -> f64 {
        self.total_ms
    }

    /// Number of matched spans
    pub fn closed_count(&self) -> u64 {
        self.closed
    }

    /// Spans opened but not yet closed
    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    pub fn named(&self) -> &NamedLedger {
        &self.named
    }

    pub fn clear(&mut self) {
        self.open.clear();
        self.total_ms = 0.0;
        self.closed = 0;
        self.named.clear();
    }
}
