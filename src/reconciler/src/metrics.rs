//! Reconciliation counters.
//!
//! Cumulative over the lifetime of a [`crate::Reconciler`]; clones share
//! the same counters.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

use crate::daemon::CycleReport;

#[derive(Debug, Clone, Default)]
pub struct ReconcileMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    /// Completed reconciliation passes
    cycles: AtomicUsize,
    /// Passes whose table listing failed
    scan_failures: AtomicUsize,
    /// Tables loaded and planned
    tables_scanned: AtomicUsize,
    /// Tables with a load, planning or statement failure
    tables_failed: AtomicUsize,
    partitions_added: AtomicUsize,
    partitions_dropped: AtomicUsize,
    /// Wall time spent inside passes
    total_duration_ms: AtomicU64,
}

impl ReconcileMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a finished pass into the counters.
    pub fn record_cycle(&self, report: &CycleReport) {
        let inner = &self.inner;
        inner.cycles.fetch_add(1, Ordering::Relaxed);
        if report.scan_error.is_some() {
            inner.scan_failures.fetch_add(1, Ordering::Relaxed);
        }
        inner
            .tables_scanned
            .fetch_add(report.tables.len(), Ordering::Relaxed);
        inner
            .tables_failed
            .fetch_add(report.failed_tables(), Ordering::Relaxed);
        inner
            .partitions_added
            .fetch_add(report.partitions_added(), Ordering::Relaxed);
        inner
            .partitions_dropped
            .fetch_add(report.partitions_dropped(), Ordering::Relaxed);
        inner
            .total_duration_ms
            .fetch_add(report.duration_ms(), Ordering::Relaxed);
    }

    pub fn cycles(&self) -> usize {
        self.inner.cycles.load(Ordering::Relaxed)
    }

    pub fn scan_failures(&self) -> usize {
        self.inner.scan_failures.load(Ordering::Relaxed)
    }

    pub fn tables_scanned(&self) -> usize {
        self.inner.tables_scanned.load(Ordering::Relaxed)
    }

    pub fn tables_failed(&self) -> usize {
        self.inner.tables_failed.load(Ordering::Relaxed)
    }

    pub fn partitions_added(&self) -> usize {
        self.inner.partitions_added.load(Ordering::Relaxed)
    }

    pub fn partitions_dropped(&self) -> usize {
        self.inner.partitions_dropped.load(Ordering::Relaxed)
    }

    pub fn total_duration_ms(&self) -> u64 {
        self.inner.total_duration_ms.load(Ordering::Relaxed)
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            cycles: self.cycles(),
            scan_failures: self.scan_failures(),
            tables_scanned: self.tables_scanned(),
            tables_failed: self.tables_failed(),
            partitions_added: self.partitions_added(),
            partitions_dropped: self.partitions_dropped(),
            total_duration_ms: self.total_duration_ms(),
        }
    }
}

/// Point-in-time copy of [`ReconcileMetrics`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSummary {
    pub cycles: usize,
    pub scan_failures: usize,
    pub tables_scanned: usize,
    pub tables_failed: usize,
    pub partitions_added: usize,
    pub partitions_dropped: usize,
    pub total_duration_ms: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        tracing::info!(
            cycles = self.cycles,
            scan_failures = self.scan_failures,
            tables_scanned = self.tables_scanned,
            tables_failed = self.tables_failed,
            partitions_added = self.partitions_added,
            partitions_dropped = self.partitions_dropped,
            total_duration_ms = self.total_duration_ms,
            "Reconciliation totals"
        );
    }
}
