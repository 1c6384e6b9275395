//! Package-index transport: reposync downloads, createrepo indexes.

use async_trait::async_trait;
use regex::Regex;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tokio::fs;
use tracing::debug;

use lagoon_common::{Error, RepoId, RepoPaths, Result, SnapshotId};

use crate::command;
use crate::transport::Transport;

/// Group metadata file picked up by createrepo when present.
pub const COMPS_FILE: &str = "comps.xml";

// Letters, digits, '-', '_' or '.' between brackets
static REPO_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[([A-Za-z0-9_.-]+)\]$").expect("repo id pattern is valid")
});

/// Extract the repository id from the first line of a repo definition.
///
/// # Errors
/// - `Error::Config` if the first line is not exactly `[token]`
pub fn parse_repo_id(src: &str) -> Result<String> {
    src.lines()
        .next()
        .and_then(|line| REPO_ID_PATTERN.captures(line))
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| Error::Config("unable to find repoid".to_string()))
}

/// Mirrors a yum/dnf repository and regenerates its index per snapshot.
pub struct PackageIndexTransport {
    id: RepoId,
    src: String,
    upstream: PathBuf,
    staging: PathBuf,
    repos_dir: PathBuf,
    reposync: PathBuf,
    createrepo: PathBuf,
}

impl PackageIndexTransport {
    /// Create a package-index transport. `src` is the repo definition.
    pub fn new(id: RepoId, src: String, paths: &RepoPaths) -> Self {
        Self {
            id,
            src,
            upstream: paths.upstream.clone(),
            staging: paths.staging.clone(),
            repos_dir: PathBuf::from("/etc/yum/repos.d"),
            reposync: PathBuf::from("reposync"),
            createrepo: PathBuf::from("createrepo"),
        }
    }

    /// Directory the repo definition file is written to.
    pub fn with_repos_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.repos_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Use different reposync and createrepo binaries.
    pub fn with_programs(
        mut self,
        reposync: impl Into<PathBuf>,
        createrepo: impl Into<PathBuf>,
    ) -> Self {
        self.reposync = reposync.into();
        self.createrepo = createrepo.into();
        self
    }

    /// Location of the repo definition file.
    pub fn repo_file(&self) -> PathBuf {
        self.repos_dir
            .join(format!("{}.repo", self.id.as_str().to_lowercase()))
    }

    /// Arguments passed to reposync.
    pub fn sync_args(&self, repo_id: &str) -> Vec<OsString> {
        let mut download_path = OsString::from("--download_path=");
        download_path.push(self.upstream.as_os_str());

        vec![
            "--delete".into(),
            format!("--repoid={}", repo_id).into(),
            "--norepopath".into(),
            download_path,
            "--downloadcomps".into(),
            "--download-metadata".into(),
        ]
    }

    /// Arguments passed to createrepo for a snapshot directory.
    ///
    /// `comps` is the group file to pass along, if the snapshot has one.
    pub fn publish_args(snapshot_dir: &Path, comps: Option<&Path>) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--update".into(),
            "-p".into(),
            "--workers".into(),
            "2".into(),
        ];
        if let Some(comps) = comps {
            args.push("-g".into());
            args.push(comps.as_os_str().to_owned());
        }
        args.push(snapshot_dir.as_os_str().to_owned());
        args
    }
}

#[async_trait]
impl Transport for PackageIndexTransport {
    fn name(&self) -> &str {
        "package-index"
    }

    async fn init(&self) -> Result<()> {
        command::resolve(&self.id, &self.reposync)?;
        command::resolve(&self.id, &self.createrepo)?;
        parse_repo_id(&self.src).map_err(|e| Error::preflight(self.id.as_str(), e))?;

        fs::write(self.repo_file(), self.src.as_bytes())
            .await
            .map_err(|e| {
                Error::preflight(
                    self.id.as_str(),
                    format!("{}: {}", self.repo_file().display(), e),
                )
            })
    }

    async fn sync(&self) -> Result<()> {
        let repo_id = parse_repo_id(&self.src)?;
        command::run(&self.id, &self.reposync, &self.sync_args(&repo_id)).await
    }

    async fn publish(&self, snapshot: &SnapshotId) -> Result<()> {
        let snapshot_dir = self.staging.join(snapshot.as_str());
        let comps = snapshot_dir.join(COMPS_FILE);

        let comps = if fs::try_exists(&comps).await.unwrap_or(false) {
            debug!(repo = %self.id, "Groupdata found");
            Some(comps)
        } else {
            debug!(repo = %self.id, "Groupdata not found");
            None
        };

        let args = Self::publish_args(&snapshot_dir, comps.as_deref());
        command::run(&self.id, &self.createrepo, &args).await
    }
}
