// Run metrics
//
// Lock-free counters for batch runs and the tool bootstrap, logged on shutdown

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Process-wide download metrics
///
/// Counters are plain atomics so the orchestrator worker, the bootstrap task and the
/// front end can all record without contention.
#[derive(Debug)]
pub struct Metrics {
    /// Jobs that finished with a file on disk
    pub jobs_succeeded: AtomicUsize,

    /// Jobs whose extractor call failed
    pub jobs_failed: AtomicUsize,

    /// Jobs skipped because of cancellation
    pub jobs_skipped: AtomicUsize,

    /// Bytes written by successful jobs
    pub bytes_downloaded: AtomicU64,

    /// Wall time spent in successful jobs, in milliseconds
    pub total_download_time_ms: AtomicU64,

    /// Run events handed to the presentation channel
    pub events_emitted: AtomicU64,

    /// Run events dropped because the receiver was gone
    pub events_dropped: AtomicU64,

    /// Bytes fetched while installing the external tool
    pub bootstrap_bytes: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            jobs_succeeded: AtomicUsize::new(0),
            jobs_failed: AtomicUsize::new(0),
            jobs_skipped: AtomicUsize::new(0),
            bytes_downloaded: AtomicU64::new(0),
            total_download_time_ms: AtomicU64::new(0),
            events_emitted: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            bootstrap_bytes: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a successful job with its size and duration
    pub fn record_job_succeeded(&self, bytes: u64, elapsed: Duration) {
        self.jobs_succeeded.fetch_add(1, Ordering::Relaxed);
        self.bytes_downloaded.fetch_add(bytes, Ordering::Relaxed);
        self.total_download_time_ms
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_job_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_jobs_skipped(&self, count: usize) {
        self.jobs_skipped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_event(&self, delivered: bool) {
        if delivered {
            self.events_emitted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.events_dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_bootstrap_bytes(&self, bytes: u64) {
        self.bootstrap_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average wall time per successful job in milliseconds
    pub fn avg_download_time_ms(&self) -> f64 {
        let total = self.total_download_time_ms.load(Ordering::Relaxed);
        let count = self.jobs_succeeded.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    pub fn log_summary(&self) {
        tracing::info!("=== Download Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Jobs: {} succeeded, {} failed, {} skipped",
            self.jobs_succeeded.load(Ordering::Relaxed),
            self.jobs_failed.load(Ordering::Relaxed),
            self.jobs_skipped.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Downloaded {} in {:.2}s (avg: {:.2}ms per job)",
            crate::services::progress::format_bytes(self.bytes_downloaded.load(Ordering::Relaxed)),
            self.total_download_time_ms.load(Ordering::Relaxed) as f64 / 1000.0,
            self.avg_download_time_ms()
        );
        tracing::info!(
            "Events: {} emitted, {} dropped; bootstrap fetched {} bytes",
            self.events_emitted.load(Ordering::Relaxed),
            self.events_dropped.load(Ordering::Relaxed),
            self.bootstrap_bytes.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
