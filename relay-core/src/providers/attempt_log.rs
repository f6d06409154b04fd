//! Bounded in-memory log of attempts

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

pub const DEFAULT_CAPACITY: usize = 500;

/// One attempt against one backend
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord {
    pub chain: String,
    pub backend: String,
    pub model: String,
    /// `"success"` or a failure kind such as `"transport"`
    pub outcome: String,
    pub latency: Duration,
    /// The pair was not the chain's first
    pub fallback: bool,
    pub at: SystemTime,
}

impl AttemptRecord {
    pub const SUCCESS: &'static str = "success";

    pub fn succeeded(&self) -> bool {
        self.outcome == Self::SUCCESS
    }
}

/// Aggregate view of one backend's attempts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendStats {
    pub attempts: usize,
    pub successes: usize,
    pub fallbacks: usize,
    pub average_latency: Duration,
}

impl BackendStats {
    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.successes as f64 / self.attempts as f64
        }
    }
}

/// Ring buffer shared by every resolution; the oldest record is evicted first
#[derive(Debug)]
pub struct AttemptLog {
    capacity: usize,
    records: Mutex<VecDeque<AttemptRecord>>,
}

impl Default for AttemptLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl AttemptLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    fn records(&self) -> MutexGuard<'_, VecDeque<AttemptRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, record: AttemptRecord) {
        let mut records = self.records();
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }

    /// Up to `n` most recent records, newest first
    pub fn recent(&self, n: usize) -> Vec<AttemptRecord> {
        self.records().iter().rev().take(n).cloned().collect()
    }

    /// Per-backend totals over the records still held
    pub fn stats(&self) -> BTreeMap<String, BackendStats> {
        let mut totals: BTreeMap<String, (BackendStats, Duration)> = BTreeMap::new();
        for record in self.records().iter() {
            let (stats, latency_sum) = totals.entry(record.backend.clone()).or_default();
            stats.attempts += 1;
            if record.succeeded() {
                stats.successes += 1;
            }
            if record.fallback {
                stats.fallbacks += 1;
            }
            *latency_sum += record.latency;
        }

        totals
            .into_iter()
            .map(|(backend, (mut stats, latency_sum))| {
                stats.average_latency = latency_sum / stats.attempts as u32;
                (backend, stats)
            })
            .collect()
    }
}
