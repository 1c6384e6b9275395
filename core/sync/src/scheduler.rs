//! Cron-driven triggering of job controllers.

use chrono::{DateTime, Local};
use cron::Schedule;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use lagoon_common::Result;

use crate::job::JobController;

/// Fires each controller's `sync` on its cron schedule.
///
/// Every firing is spawned on the shared tracker, so a long run never
/// delays the next trigger and overlapping firings meet the controller's
/// single-flight guard.
pub struct CronScheduler {
    cancel: CancellationToken,
    triggers: Vec<JoinHandle<()>>,
}

impl CronScheduler {
    /// Start one trigger loop per controller.
    ///
    /// # Errors
    /// - A controller's cron expression does not parse
    pub fn start(controllers: &[Arc<JobController>], tracker: &TaskTracker) -> Result<Self> {
        let schedules = controllers
            .iter()
            .map(|c| c.spec().schedule())
            .collect::<Result<Vec<_>>>()?;

        let cancel = CancellationToken::new();
        let triggers = controllers
            .iter()
            .zip(schedules)
            .map(|(controller, schedule)| {
                tokio::spawn(run_trigger(
                    controller.clone(),
                    schedule,
                    tracker.clone(),
                    cancel.clone(),
                ))
            })
            .collect();

        info!("Sync scheduler started");
        Ok(Self { cancel, triggers })
    }

    /// Stop scheduling new runs. Runs already started are not interrupted.
    pub async fn stop(self) {
        self.cancel.cancel();
        join_all(self.triggers).await;
        info!("Sync scheduler stopped");
    }
}

async fn run_trigger(
    controller: Arc<JobController>,
    schedule: Schedule,
    tracker: TaskTracker,
    cancel: CancellationToken,
) {
    let mut last: DateTime<Local> = Local::now();

    loop {
        let now = Local::now();
        let anchor = if last > now { last } else { now };
        let Some(next) = schedule.after(&anchor).next() else {
            warn!(repo = %controller.id(), "No upcoming trigger time, scheduling stopped");
            return;
        };
        let wait = (next - Local::now()).to_std().unwrap_or(Duration::ZERO);
        debug!(repo = %controller.id(), next = %next, "Next sync scheduled");

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(wait) => {
                last = next;
                let controller = controller.clone();
                tracker.spawn(async move {
                    controller.sync().await;
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryConfig;
    use crate::testing::MockTransport;
    use lagoon_config::{RepositorySpec, TransportKind};
    use tempfile::TempDir;

    async fn controller(temp: &TempDir, cron: &str, tracker: &TaskTracker) -> Arc<JobController> {
        let spec = RepositorySpec {
            id: "tick".to_string(),
            name: "Tick".to_string(),
            kind: TransportKind::Simulated,
            src: String::new(),
            dest: temp.path().to_path_buf(),
            cron: cron.to_string(),
            exclude: Vec::new(),
            snapshots: 1,
        };
        let controller = JobController::new(spec, Arc::new(MockTransport::new()), tracker.clone())
            .unwrap()
            .with_retry_config(RetryConfig::new(0));
        controller.prereqs().await.unwrap();
        Arc::new(controller)
    }

    #[tokio::test]
    async fn test_fires_on_schedule_and_stops() {
        let temp = TempDir::new().unwrap();
        let tracker = TaskTracker::new();
        let c = controller(&temp, "* * * * * *", &tracker).await;

        let scheduler = CronScheduler::start(&[c.clone()], &tracker).unwrap();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        scheduler.stop().await;

        tracker.close();
        tracker.wait().await;
        let fired = c.metrics().sync_total();
        assert!(fired >= 1, "expected at least one run, got {}", fired);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(c.metrics().sync_total(), fired);
    }

    #[tokio::test]
    async fn test_stop_before_first_firing() {
        let temp = TempDir::new().unwrap();
        let tracker = TaskTracker::new();
        // Midnight on January 1st only.
        let c = controller(&temp, "0 0 0 1 1 *", &tracker).await;

        let scheduler = CronScheduler::start(&[c.clone()], &tracker).unwrap();
        scheduler.stop().await;

        tracker.close();
        tracker.wait().await;
        assert_eq!(c.metrics().sync_total(), 0);
    }

    #[tokio::test]
    async fn test_invalid_cron_rejected() {
        let temp = TempDir::new().unwrap();
        let tracker = TaskTracker::new();
        let c = controller(&temp, "not a cron", &tracker).await;

        assert!(CronScheduler::start(&[c], &tracker).is_err());
    }
}
