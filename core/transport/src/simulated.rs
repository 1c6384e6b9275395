//! Simulated transport for exercising the sync pipeline without real I/O.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, error};
use uuid::Uuid;

use lagoon_common::{Error, RepoId, Result, SnapshotId};

use crate::transport::Transport;

/// Transport that sleeps a random while and then randomly fails.
///
/// On success it drops an empty uuid-named file into upstream so that
/// every snapshot differs from the previous one.
pub struct SimulatedTransport {
    id: RepoId,
    dest: PathBuf,
    max_sleep: Duration,
    failure_rate: f64,
}

impl SimulatedTransport {
    /// Create a simulated transport writing into `dest`.
    pub fn new(id: RepoId, dest: impl AsRef<Path>) -> Self {
        Self {
            id,
            dest: dest.as_ref().to_path_buf(),
            max_sleep: Duration::from_secs(30),
            failure_rate: 0.5,
        }
    }

    /// Set the upper bound of the random sleep.
    pub fn with_max_sleep(mut self, max_sleep: Duration) -> Self {
        self.max_sleep = max_sleep;
        self
    }

    /// Set the probability of a sync failing, clamped to `0.0..=1.0`.
    pub fn with_failure_rate(mut self, failure_rate: f64) -> Self {
        self.failure_rate = failure_rate.clamp(0.0, 1.0);
        self
    }
}

#[async_trait]
impl Transport for SimulatedTransport {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn sync(&self) -> Result<()> {
        let sleep = self.max_sleep.mul_f64(rand::random::<f64>());
        debug!(repo = %self.id, sleep = ?sleep, "Simulated sync sleeping");
        tokio::time::sleep(sleep).await;

        if rand::random::<f64>() < self.failure_rate {
            let err = Error::Transport("simulated sync error".to_string());
            error!(repo = %self.id, "{}", err);
            return Err(err);
        }

        fs::write(self.dest.join(Uuid::new_v4().to_string()), b"").await?;
        Ok(())
    }

    async fn publish(&self, _snapshot: &SnapshotId) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn transport(dir: &Path) -> SimulatedTransport {
        SimulatedTransport::new(RepoId::new("sim").unwrap(), dir).with_max_sleep(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_successful_sync_writes_file() {
        let temp = TempDir::new().unwrap();
        let transport = transport(temp.path()).with_failure_rate(0.0);

        transport.init().await.unwrap();
        transport.sync().await.unwrap();
        transport.sync().await.unwrap();

        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn test_failing_sync_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let transport = transport(temp.path()).with_failure_rate(1.0);

        let err = transport.sync().await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_publish_is_noop() {
        let temp = TempDir::new().unwrap();
        let snapshot = SnapshotId::parse("20230101").unwrap();
        transport(temp.path()).publish(&snapshot).await.unwrap();
    }
}
