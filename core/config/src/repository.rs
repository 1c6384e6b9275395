//! Declarative per-repository settings and their validators.

use cron::Schedule;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use lagoon_common::{Error, RepoId, Result};

/// Upper bound on retained snapshots per repository.
pub const MAX_SNAPSHOTS: usize = 1024;

/// How a repository's content is fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    /// No real I/O; random delay and random outcome.
    #[serde(alias = "dummy")]
    Simulated,
    /// Mirror a tree with rsync.
    #[serde(alias = "rsync")]
    PullMirror,
    /// Sync an RPM repository with reposync and index it with createrepo.
    #[serde(alias = "reposync")]
    PackageIndex,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Simulated => "simulated",
            TransportKind::PullMirror => "pull-mirror",
            TransportKind::PackageIndex => "package-index",
        }
    }
}

/// Settings of one mirrored repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySpec {
    /// Unique id; used in paths and metric labels.
    pub id: String,
    /// Human readable name.
    #[serde(default)]
    pub name: String,
    /// Transport variant.
    #[serde(rename = "type")]
    pub kind: TransportKind,
    /// Source URL or repository definition, depending on `kind`.
    #[serde(default)]
    pub src: String,
    /// Absolute destination root.
    pub dest: PathBuf,
    /// Six-field cron expression (with seconds).
    pub cron: String,
    /// Exclusion patterns, pull-mirror only.
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Number of staged snapshots to retain.
    pub snapshots: usize,
}

impl RepositorySpec {
    /// Validate this entry.
    ///
    /// # Errors
    /// - `Error::Config` naming the offending field
    pub fn validate(&self) -> Result<()> {
        if !validate_id(&self.id) {
            return Err(Error::Config(format!(
                "invalid repository id '{}': only a-z, 0-9, '-' and '_' are allowed",
                self.id
            )));
        }
        if !validate_abs_path(&self.dest) {
            return Err(Error::Config(format!(
                "repository '{}': dest '{}' must be an absolute path",
                self.id,
                self.dest.display()
            )));
        }
        if !validate_cron(&self.cron) {
            return Err(Error::Config(format!(
                "repository '{}': '{}' is not a six-field cron expression",
                self.id, self.cron
            )));
        }
        if !(1..=MAX_SNAPSHOTS).contains(&self.snapshots) {
            return Err(Error::Config(format!(
                "repository '{}': snapshots must be between 1 and {}, got {}",
                self.id, MAX_SNAPSHOTS, self.snapshots
            )));
        }
        Ok(())
    }

    /// The validated repository id.
    pub fn repo_id(&self) -> Result<RepoId> {
        RepoId::new(self.id.clone()).map_err(|e| Error::Config(e.to_string()))
    }

    /// Parsed trigger schedule.
    pub fn schedule(&self) -> Result<Schedule> {
        Schedule::from_str(&self.cron)
            .map_err(|e| Error::Config(format!("repository '{}': {}", self.id, e)))
    }
}

/// Repository ids are non-empty and limited to lowercase letters, digits, `-` and `_`.
pub fn validate_id(id: &str) -> bool {
    RepoId::is_valid(id)
}

/// Destination roots must be absolute.
pub fn validate_abs_path(path: impl AsRef<Path>) -> bool {
    path.as_ref().is_absolute()
}

/// Accepts `sec min hour dom month dow` expressions only.
pub fn validate_cron(expr: &str) -> bool {
    expr.split_whitespace().count() == 6 && Schedule::from_str(expr).is_ok()
}
