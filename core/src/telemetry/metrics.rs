use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Row counters for one run, shared by every stage.
pub struct MetricsRecorder {
    inner: Mutex<MetricsSnapshot>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub read: usize,
    pub accepted: usize,
    pub rejected: BTreeMap<&'static str, usize>,
    pub projected: usize,
    pub cells: usize,
    pub exported: usize,
}

impl MetricsSnapshot {
    pub fn rejected_total(&self) -> usize {
        self.rejected.values().sum()
    }
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MetricsSnapshot::default()),
        }
    }

    pub fn record_read(&self, rows: usize) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.read += rows;
        }
    }

    pub fn record_accepted(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.accepted += 1;
        }
    }

    pub fn record_rejected(&self, reason: &'static str) {
        if let Ok(mut metrics) = self.inner.lock() {
            *metrics.rejected.entry(reason).or_insert(0) += 1;
        }
    }

    pub fn record_projected(&self, points: usize) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.projected += points;
        }
    }

    pub fn record_cells(&self, cells: usize) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.cells += cells;
        }
    }

    pub fn record_exported(&self, records: usize) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.exported += records;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        if let Ok(metrics) = self.inner.lock() {
            metrics.clone()
        } else {
            MetricsSnapshot::default()
        }
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}
