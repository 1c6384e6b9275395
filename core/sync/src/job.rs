//! Per-repository sync job: transfer, snapshot, publish, retention.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::fs;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use lagoon_common::{Error, RepoId, RepoPaths, Result, SnapshotId};
use lagoon_config::RepositorySpec;
use lagoon_transport::Transport;

use crate::metrics::SyncMetrics;
use crate::retry::{RetryConfig, RetryExecutor};
use crate::snapshot::SnapshotStore;

/// How a call to [`JobController::sync`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Another run was in progress; nothing was done.
    AlreadyRunning,
    /// The transport kept failing until retries ran out.
    TransportFailed,
    /// The transfer succeeded. `snapshot` is the snapshot taken, if one
    /// could be created.
    Completed { snapshot: Option<SnapshotId> },
}

/// Clears the running flag when a run ends, however it ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives the scheduled sync of one repository.
pub struct JobController {
    spec: RepositorySpec,
    id: RepoId,
    transport: Arc<dyn Transport>,
    store: SnapshotStore,
    retry: RetryExecutor,
    running: AtomicBool,
    tracker: TaskTracker,
    metrics: SyncMetrics,
}

impl JobController {
    /// Create a controller for a validated repository spec.
    ///
    /// # Errors
    /// - Invalid repository id
    pub fn new(
        spec: RepositorySpec,
        transport: Arc<dyn Transport>,
        tracker: TaskTracker,
    ) -> Result<Self> {
        let id = spec.repo_id()?;
        let paths = RepoPaths::derive(&id, &spec.dest);
        let store = SnapshotStore::new(id.clone(), paths, transport.clone());
        let metrics = SyncMetrics::new(id.as_str(), spec.name.clone());

        Ok(Self {
            spec,
            id,
            transport,
            store,
            retry: RetryExecutor::default(),
            running: AtomicBool::new(false),
            tracker,
            metrics,
        })
    }

    /// Replace the retry policy around `Transport::sync`.
    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry = RetryExecutor::new(config);
        self
    }

    pub fn id(&self) -> &RepoId {
        &self.id
    }

    pub fn spec(&self) -> &RepositorySpec {
        &self.spec
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn metrics(&self) -> &SyncMetrics {
        &self.metrics
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Whether a run is in progress.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Create the repository directories and initialize the transport.
    ///
    /// # Errors
    /// - `Error::Preflight` if a directory cannot be created or the
    ///   transport's checks fail
    pub async fn prereqs(&self) -> Result<()> {
        let paths = self.store.paths();
        for dir in [&paths.upstream, &paths.staging, &paths.public] {
            fs::create_dir_all(dir).await.map_err(|e| {
                Error::preflight(
                    self.id.as_str(),
                    format!("destination {}: {}", dir.display(), e),
                )
            })?;
        }

        self.transport.init().await.map_err(|e| match e {
            Error::Preflight { .. } => e,
            other => Error::preflight(self.id.as_str(), other),
        })?;

        debug!(repo = %self.id, "All prerequisite checks and actions succeeded");
        Ok(())
    }

    /// Run one sync unless one is already running.
    ///
    /// Transport failures are retried; snapshot, publish and cleanup
    /// failures are logged and never abort the remaining steps.
    pub async fn sync(&self) -> SyncOutcome {
        let Some(running) = RunningGuard::acquire(&self.running) else {
            info!(repo = %self.id, "Not starting sync; sync already in progress");
            return SyncOutcome::AlreadyRunning;
        };
        let token = self.tracker.token();

        let job_id = Uuid::new_v4();
        let span = info_span!("sync", repo = %self.id, jobid = %job_id);
        let outcome = self.run_pipeline().instrument(span).await;

        // Idle before the shutdown wait can observe this run as finished.
        drop(running);
        drop(token);
        outcome
    }

    async fn run_pipeline(&self) -> SyncOutcome {
        info!("Starting sync");
        let start = Instant::now();

        let synced = self
            .retry
            .execute_with_notify(
                || self.transport.sync(),
                |err, delay| {
                    warn!(error = %err, "Error while synchronizing, retrying in {:?}", delay);
                },
            )
            .await;

        if let Err(e) = synced {
            error!(error = %e, "Stopped retrying sync");
            info!("Exiting sync");
            return SyncOutcome::TransportFailed;
        }
        debug!("Successful sync");

        let snapshot = match self.store.create_snapshot().await {
            Ok(snapshot) => {
                if let Err(e) = self.store.publish_snapshot(&snapshot).await {
                    error!(error = %e, snapshot = %snapshot, "Unable to publish snapshot");
                }
                Some(snapshot)
            }
            Err(e) => {
                error!(error = %e, "Unable to create snapshot");
                None
            }
        };

        if let Err(e) = self.store.cleanup_snapshots(self.spec.snapshots).await {
            error!(error = %e, "Unable to clean up snapshots");
        }

        self.metrics.record_success(start.elapsed());

        info!("Exiting sync");
        SyncOutcome::Completed { snapshot }
    }
}
