//! Lagoon sync engine.
//!
//! This module provides the scheduled mirroring pipeline:
//! - Retry strategy with exponential backoff around the transfer
//! - Dated hardlink snapshots with symlink publication and retention
//! - A single-flight job controller per repository
//! - Bootstrap of all controllers and their cron triggers
//! - Per-repository sync metrics

pub mod job;
pub mod metrics;
pub mod registry;
pub mod retry;
pub mod scheduler;
pub mod snapshot;

#[cfg(test)]
mod testing;

// Re-export main types
pub use job::{JobController, SyncOutcome};
pub use metrics::{describe_metrics, SyncMetrics};
pub use registry::Registry;
pub use retry::{RetryConfig, RetryExecutor};
pub use scheduler::CronScheduler;
pub use snapshot::SnapshotStore;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_exports() {
        // Verify all main types are accessible
        let _retry_config = RetryConfig::default();
        let _executor = RetryExecutor::default();
        let _metrics = SyncMetrics::new("r1", "Repo one");
    }
}
