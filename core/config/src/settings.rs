//! Process-wide settings.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Settings shared by all repositories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Listen address of the metrics scrape endpoint.
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: SocketAddr,
    /// Directory package-index repositories write their definition files to.
    #[serde(default = "default_repos_dir")]
    pub repos_dir: PathBuf,
}

fn default_metrics_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9000))
}

fn default_repos_dir() -> PathBuf {
    PathBuf::from("/etc/yum/repos.d")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            metrics_addr: default_metrics_addr(),
            repos_dir: default_repos_dir(),
        }
    }
}
