//! Per-thread statistics gathering, merged once training finishes.
//!
//! A [`Tag`] names a counter/timer; [`Statistics`] is the thread-local
//! collection components `record()` into; [`StatisticsCollection`] merges one
//! per worker thread into a single report on `finalize()`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Name and unit of a recorded statistic.
#[derive(Clone, Debug)]
pub struct StatisticMetaData {
    /// Short machine-friendly name.
    pub name: &'static str,
    /// Human-readable unit, e.g. `"ms"` or `"#positives"`.
    pub unit: &'static str,
}

/// A shared counter cell; outlives every [`Statistics`] instance that writes to it.
#[derive(Clone)]
pub struct Tag(Arc<AtomicI64>);

impl Tag {
    /// A fresh tag starting at zero.
    pub fn new() -> Self {
        Self(Arc::new(AtomicI64::new(0)))
    }

    /// Current value.
    pub fn get(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }

    /// Add `delta` to the tag.
    pub fn add(&self, delta: i64) {
        self.0.fetch_add(delta, Ordering::Relaxed);
    }
}

impl Default for Tag {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-thread collection of named counters and elapsed-time accumulators.
#[derive(Default)]
pub struct Statistics {
    counters: HashMap<&'static str, i64>,
    metadata: HashMap<&'static str, StatisticMetaData>,
}

impl Statistics {
    /// A fresh, empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a statistic's metadata (idempotent).
    pub fn declare(&mut self, meta: StatisticMetaData) {
        self.metadata.entry(meta.name).or_insert(meta);
    }

    /// Record `value`, added to the running total for `name`.
    pub fn record(&mut self, name: &'static str, value: i64) {
        *self.counters.entry(name).or_insert(0) += value;
    }

    /// Time `f` and record its duration, in microseconds, under `name`.
    pub fn time<T>(&mut self, name: &'static str, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let result = f();
        let elapsed = start.elapsed().as_micros() as i64;
        self.record(name, elapsed);
        result
    }

    /// Current total for `name`.
    pub fn get(&self, name: &str) -> i64 {
        self.counters.get(name).copied().unwrap_or(0)
    }
}

/// Merges one [`Statistics`] per worker thread into a single report.
#[derive(Default)]
pub struct StatisticsCollection {
    per_thread: Vec<Statistics>,
}

impl StatisticsCollection {
    /// An empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one worker thread's statistics.
    pub fn push(&mut self, stats: Statistics) {
        self.per_thread.push(stats);
    }

    /// Merge every thread's counters into a single name -> total map.
    /// Single-threaded by contract; call only after all workers have joined.
    pub fn finalize(self) -> HashMap<&'static str, i64> {
        let mut merged = HashMap::new();
        for stats in self.per_thread {
            for (name, value) in stats.counters {
                *merged.entry(name).or_insert(0) += value;
            }
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_counters_across_threads() {
        let mut a = Statistics::new();
        a.record("labels_trained", 3);
        let mut b = Statistics::new();
        b.record("labels_trained", 5);

        let mut collection = StatisticsCollection::new();
        collection.push(a);
        collection.push(b);
        let merged = collection.finalize();
        assert_eq!(merged["labels_trained"], 8);
    }

    #[test]
    fn tag_is_shared_across_clones() {
        let tag = Tag::new();
        let clone = tag.clone();
        clone.add(10);
        assert_eq!(tag.get(), 10);
    }
}
