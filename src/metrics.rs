// Performance metrics module
//
// Provides lightweight metrics tracking for refresh passes

use crate::services::PassReport;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Refresh metrics
///
/// Uses atomic operations for thread-safe metric tracking without locks.
/// Passes run on the tokio runtime while the UI thread reads counters, and
/// the summary is logged on shutdown.
#[derive(Debug)]
pub struct Metrics {
    /// Total number of completed refresh passes
    pub passes_completed: AtomicUsize,

    /// Total number of source updates that succeeded
    pub updates_applied: AtomicUsize,

    /// Total number of source updates that failed
    pub updates_failed: AtomicUsize,

    /// Total number of entries skipped for an empty path
    pub updates_skipped: AtomicUsize,

    /// Total time spent inside passes in milliseconds
    pub total_pass_time_ms: AtomicU64,

    /// Number of UI updates sent
    pub ui_updates: AtomicU64,

    /// Application start time
    start_time: Instant,
}

impl Metrics {
    /// Create a new Metrics instance
    pub fn new() -> Self {
        Self {
            passes_completed: AtomicUsize::new(0),
            updates_applied: AtomicUsize::new(0),
            updates_failed: AtomicUsize::new(0),
            updates_skipped: AtomicUsize::new(0),
            total_pass_time_ms: AtomicU64::new(0),
            ui_updates: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a completed pass
    pub fn record_pass(&self, report: &PassReport) {
        self.passes_completed.fetch_add(1, Ordering::Relaxed);
        self.updates_applied
            .fetch_add(report.applied(), Ordering::Relaxed);
        self.updates_failed
            .fetch_add(report.failed(), Ordering::Relaxed);
        self.updates_skipped
            .fetch_add(report.skipped.len(), Ordering::Relaxed);
        self.record_pass_time(report.duration);
    }

    /// Record time spent in a pass
    pub fn record_pass_time(&self, duration: Duration) {
        self.total_pass_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    /// Record a UI update
    pub fn record_ui_update(&self) {
        self.ui_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn passes(&self) -> usize {
        self.passes_completed.load(Ordering::Relaxed)
    }

    /// Get total uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Get average pass time in milliseconds
    pub fn avg_pass_time_ms(&self) -> f64 {
        let total = self.total_pass_time_ms.load(Ordering::Relaxed);
        let count = self.passes_completed.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        let uptime = self.uptime();
        tracing::info!("=== Refresh Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", uptime.as_secs_f64());
        tracing::info!(
            "Passes: {} (avg: {:.2}ms per pass)",
            self.passes(),
            self.avg_pass_time_ms()
        );
        tracing::info!(
            "Updates: {} applied, {} failed, {} skipped",
            self.updates_applied.load(Ordering::Relaxed),
            self.updates_failed.load(Ordering::Relaxed),
            self.updates_skipped.load(Ordering::Relaxed)
        );
        tracing::info!("UI updates: {}", self.ui_updates.load(Ordering::Relaxed));
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
