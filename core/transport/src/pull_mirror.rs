//! Pull-mirror transport backed by rsync.

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::error;

use lagoon_common::{Error, RepoId, Result, SnapshotId};

use crate::command;
use crate::transport::Transport;

/// URL scheme the source must use.
pub const RSYNC_SCHEME: &str = "rsync://";

/// Check that a source is an rsync daemon URL.
pub fn is_rsync_url(src: &str) -> bool {
    src.starts_with(RSYNC_SCHEME)
}

/// Mirrors an rsync module into the upstream directory.
///
/// Files absent upstream are deleted downstream.
pub struct PullMirrorTransport {
    id: RepoId,
    src: String,
    dest: PathBuf,
    excludes: Vec<String>,
    program: PathBuf,
}

impl PullMirrorTransport {
    /// Create a pull-mirror transport.
    pub fn new(id: RepoId, src: String, dest: impl AsRef<Path>, excludes: Vec<String>) -> Self {
        Self {
            id,
            src,
            dest: dest.as_ref().to_path_buf(),
            excludes,
            program: PathBuf::from("rsync"),
        }
    }

    /// Use a different rsync binary.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Arguments passed to rsync.
    ///
    /// One `--exclude` per pattern; the brace form is not expanded without a shell.
    pub fn args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-avSHP".into(), "--delete".into()];
        for exclude in &self.excludes {
            args.push("--exclude".into());
            args.push(exclude.into());
        }
        args.push(self.src.clone().into());
        args.push(self.dest.clone().into_os_string());
        args
    }

    fn check_url(&self) -> Result<()> {
        if !is_rsync_url(&self.src) {
            return Err(Error::InvalidInput(format!(
                "incorrect rsync url '{}'",
                self.src
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for PullMirrorTransport {
    fn name(&self) -> &str {
        "pull-mirror"
    }

    async fn init(&self) -> Result<()> {
        command::resolve(&self.id, &self.program)?;
        self.check_url()
            .map_err(|e| Error::preflight(self.id.as_str(), e))
    }

    async fn sync(&self) -> Result<()> {
        self.check_url()?;

        let result = command::run(&self.id, &self.program, &self.args()).await;
        if let Err(ref e) = result {
            error!(repo = %self.id, "{}", e);
        }
        result
    }

    async fn publish(&self, _snapshot: &SnapshotId) -> Result<()> {
        Ok(())
    }
}
