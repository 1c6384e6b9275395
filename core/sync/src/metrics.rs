//! Per-repository sync metrics.

use metrics::{counter, describe_counter, describe_gauge, gauge, Unit};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counter of successful sync runs.
pub const SYNC_TOTAL: &str = "lagoon_sync_total";
/// Gauge holding the wall-clock duration of the last successful run.
pub const SYNC_DURATION: &str = "lagoon_sync_duration_seconds";

/// Register metric descriptions with the installed recorder.
pub fn describe_metrics() {
    describe_counter!(SYNC_TOTAL, "The total number of repo syncs");
    describe_gauge!(SYNC_DURATION, Unit::Seconds, "The sync duration");
}

/// Metrics of one repository, labelled with its id and display name.
///
/// Values go to the global `metrics` recorder and are mirrored locally so
/// they can be inspected without one.
#[derive(Debug)]
pub struct SyncMetrics {
    repo: String,
    name: String,
    sync_total: AtomicU64,
    last_duration_ms: AtomicU64,
}

impl SyncMetrics {
    pub fn new(repo: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            name: name.into(),
            sync_total: AtomicU64::new(0),
            last_duration_ms: AtomicU64::new(0),
        }
    }

    /// Record a successful run.
    pub fn record_success(&self, duration: Duration) {
        counter!(SYNC_TOTAL, "repo" => self.repo.clone(), "name" => self.name.clone()).increment(1);
        gauge!(SYNC_DURATION, "repo" => self.repo.clone(), "name" => self.name.clone())
            .set(duration.as_secs_f64());

        self.sync_total.fetch_add(1, Ordering::SeqCst);
        self.last_duration_ms
            .store(duration.as_millis() as u64, Ordering::SeqCst);
    }

    /// Successful runs so far.
    pub fn sync_total(&self) -> u64 {
        self.sync_total.load(Ordering::SeqCst)
    }

    /// Duration of the last successful run, if there was one.
    pub fn last_duration(&self) -> Option<Duration> {
        if self.sync_total() == 0 {
            return None;
        }
        Some(Duration::from_millis(
            self.last_duration_ms.load(Ordering::SeqCst),
        ))
    }
}
