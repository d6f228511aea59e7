//! Fixed-capacity sliding windows of recent metric values.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Tracked time series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SeriesKey {
    TransactionCount,
    Tps,
}

impl SeriesKey {
    pub const ALL: [SeriesKey; 2] = [SeriesKey::TransactionCount, SeriesKey::Tps];

    pub fn as_str(&self) -> &'static str {
        match self {
            SeriesKey::TransactionCount => "transactionCount",
            SeriesKey::Tps => "tps",
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySample {
    pub label: String,
    pub value: f64,
}

impl HistorySample {
    pub fn new(label: impl Into<String>, value: f64) -> Self {
        Self {
            label: label.into(),
            value,
        }
    }
}

/// Current contents of every series, oldest first.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HistoryWindows {
    pub transaction_count: Vec<HistorySample>,
    pub tps: Vec<HistorySample>,
}

/// One FIFO window per series. Appending past capacity evicts the oldest sample.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    capacity: usize,
    series: HashMap<SeriesKey, VecDeque<HistorySample>>,
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        let series = SeriesKey::ALL
            .iter()
            .map(|key| (*key, VecDeque::new()))
            .collect();
        Self { capacity, series }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn append(&mut self, key: SeriesKey, label: impl Into<String>, value: f64) {
        let window = self.series.entry(key).or_default();
        window.push_back(HistorySample::new(label, value));
        while window.len() > self.capacity {
            window.pop_front();
        }
    }

    pub fn snapshot(&self, key: SeriesKey) -> Vec<HistorySample> {
        self.series
            .get(&key)
            .map(|w| w.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, key: SeriesKey) -> usize {
        self.series.get(&key).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self) -> bool {
        self.series.values().all(VecDeque::is_empty)
    }

    pub fn windows(&self) -> HistoryWindows {
        HistoryWindows {
            transaction_count: self.snapshot(SeriesKey::TransactionCount),
            tps: self.snapshot(SeriesKey::Tps),
        }
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(10)
    }
}
