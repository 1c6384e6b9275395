//! Construction of one job controller per configured repository.

use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::task::TaskTracker;
use tracing::info;

use lagoon_common::{Error, RepoPaths, Result};
use lagoon_config::LagoonConfig;
use lagoon_transport::build_transport;

use crate::job::JobController;

/// All job controllers of the process, sharing one shutdown tracker.
pub struct Registry {
    controllers: Vec<Arc<JobController>>,
    tracker: TaskTracker,
}

impl Registry {
    /// Build a controller and transport for every repository.
    ///
    /// # Errors
    /// - `Error::Config` on a duplicate or invalid repository id
    pub fn bootstrap(config: LagoonConfig) -> Result<Self> {
        let tracker = TaskTracker::new();
        let mut seen = HashSet::new();
        let mut controllers = Vec::with_capacity(config.repositories.len());

        for spec in config.repositories {
            if !seen.insert(spec.id.clone()) {
                return Err(Error::Config(format!(
                    "Repository id must be unique, found duplicate entry for: {}",
                    spec.id
                )));
            }

            let id = spec.repo_id()?;
            let paths = RepoPaths::derive(&id, &spec.dest);
            let transport = build_transport(&spec, &id, &paths, &config.settings);

            info!(repo = %id, transport = transport.name(), "Adding repository");
            controllers.push(Arc::new(JobController::new(spec, transport, tracker.clone())?));
        }

        Ok(Self::from_controllers(controllers, tracker))
    }

    /// Assemble a registry from already built controllers.
    pub fn from_controllers(controllers: Vec<Arc<JobController>>, tracker: TaskTracker) -> Self {
        Self {
            controllers,
            tracker,
        }
    }

    /// Run every controller's prerequisites. The first failure aborts.
    pub async fn preflight(&self) -> Result<()> {
        info!("Running preflight checks");
        for controller in &self.controllers {
            controller.prereqs().await?;
        }
        Ok(())
    }

    pub fn controllers(&self) -> &[Arc<JobController>] {
        &self.controllers
    }

    /// Look up a controller by repository id.
    pub fn get(&self, id: &str) -> Option<&Arc<JobController>> {
        self.controllers.iter().find(|c| c.id().as_str() == id)
    }

    /// Tracker every run registers with.
    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    /// Stop accepting new work and wait for in-flight runs to finish.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lagoon_config::{RepositorySpec, TransportKind};
    use std::path::Path;
    use tempfile::TempDir;

    fn spec(id: &str, kind: TransportKind, src: &str, dest: &Path) -> RepositorySpec {
        RepositorySpec {
            id: id.to_string(),
            name: id.to_uppercase(),
            kind,
            src: src.to_string(),
            dest: dest.to_path_buf(),
            cron: "0 0 * * * *".to_string(),
            exclude: Vec::new(),
            snapshots: 3,
        }
    }

    fn config(repositories: Vec<RepositorySpec>) -> LagoonConfig {
        LagoonConfig {
            repositories,
            ..LagoonConfig::default()
        }
    }

    #[tokio::test]
    async fn test_bootstrap_and_preflight() {
        let temp = TempDir::new().unwrap();
        let registry = Registry::bootstrap(config(vec![
            spec("a", TransportKind::Simulated, "", temp.path()),
            spec("b", TransportKind::Simulated, "", temp.path()),
        ]))
        .unwrap();

        assert_eq!(registry.controllers().len(), 2);
        assert_eq!(registry.get("b").unwrap().spec().name, "B");
        assert!(registry.get("c").is_none());

        registry.preflight().await.unwrap();
        assert!(temp.path().join("upstream/a").is_dir());
        assert!(temp.path().join("public/b").is_dir());
    }

    #[test]
    fn test_duplicate_id_is_fatal() {
        let temp = TempDir::new().unwrap();
        let result = Registry::bootstrap(config(vec![
            spec("a", TransportKind::Simulated, "", temp.path()),
            spec("a", TransportKind::Simulated, "", temp.path()),
        ]));

        match result {
            Err(Error::Config(msg)) => assert!(msg.contains("duplicate entry for: a")),
            _ => panic!("expected a configuration error"),
        }
    }

    #[tokio::test]
    async fn test_preflight_failure_is_fatal() {
        let temp = TempDir::new().unwrap();
        let registry = Registry::bootstrap(config(vec![
            spec("good", TransportKind::Simulated, "", temp.path()),
            spec("bad", TransportKind::PullMirror, "http://not-rsync/", temp.path()),
        ]))
        .unwrap();

        let err = registry.preflight().await.unwrap_err();
        assert!(matches!(err, Error::Preflight { ref repo, .. } if repo == "bad"));
    }

    #[tokio::test]
    async fn test_wait_idle_without_runs() {
        let registry = Registry::from_controllers(Vec::new(), TaskTracker::new());
        registry.wait_idle().await;
        assert!(registry.tracker().is_closed());
    }
}
