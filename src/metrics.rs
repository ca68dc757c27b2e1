use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing pipeline activity.
#[derive(Default)]
pub struct PipelineMetrics {
    documents_completed: AtomicU64,
    documents_failed: AtomicU64,
    chunks_indexed: AtomicU64,
    repair_runs: AtomicU64,
    background_task_failures: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a document that reached `completed` along with its chunk count.
    pub fn record_completed(&self, chunk_count: u64) {
        self.documents_completed.fetch_add(1, Ordering::Relaxed);
        self.chunks_indexed
            .fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record a document that ended in `error`.
    pub fn record_failed(&self) {
        self.documents_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one bulk repair pass.
    pub fn record_repair_run(&self) {
        self.repair_runs.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a supervised background task that returned an error or panicked.
    pub fn record_task_failure(&self) {
        self.background_task_failures
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_completed: self.documents_completed.load(Ordering::Relaxed),
            documents_failed: self.documents_failed.load(Ordering::Relaxed),
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            repair_runs: self.repair_runs.load(Ordering::Relaxed),
            background_task_failures: self.background_task_failures.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Documents that finished the pipeline successfully since startup.
    pub documents_completed: u64,
    /// Documents that ended in the `error` state since startup.
    pub documents_failed: u64,
    /// Total chunks written to the index.
    pub chunks_indexed: u64,
    /// Bulk repair passes executed.
    pub repair_runs: u64,
    /// Supervised background tasks that failed after their caller returned.
    pub background_task_failures: u64,
}
