//! Dated, hardlinked snapshots and their publication.
//!
//! A snapshot is a copy of the upstream tree in which every regular file is
//! a hard link, so unchanged files share storage with the upstream mirror
//! and with older snapshots. Publishing exposes a staged snapshot through a
//! dated symlink and moves the `latest` symlink onto it.

use chrono::NaiveDate;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{error, info};
use walkdir::WalkDir;

use lagoon_common::paths::LATEST;
use lagoon_common::{Error, RepoId, RepoPaths, Result, SnapshotId};
use lagoon_transport::Transport;

/// Temporary name `latest` is staged under before being renamed into place.
const LATEST_TMP: &str = ".latest.tmp";

/// Snapshot storage of one repository.
pub struct SnapshotStore {
    repo: RepoId,
    paths: RepoPaths,
    transport: Arc<dyn Transport>,
}

impl SnapshotStore {
    /// Create a store over a repository's directories.
    pub fn new(repo: RepoId, paths: RepoPaths, transport: Arc<dyn Transport>) -> Self {
        Self {
            repo,
            paths,
            transport,
        }
    }

    /// Directories this store operates on.
    pub fn paths(&self) -> &RepoPaths {
        &self.paths
    }

    /// Snapshot the upstream tree under today's stamp.
    pub async fn create_snapshot(&self) -> Result<SnapshotId> {
        self.create(SnapshotId::today()?).await
    }

    /// Snapshot the upstream tree under the stamp of `date`.
    pub async fn create_snapshot_on(&self, date: NaiveDate) -> Result<SnapshotId> {
        self.create(SnapshotId::from_date(date)?).await
    }

    async fn create(&self, snapshot: SnapshotId) -> Result<SnapshotId> {
        let snap_path = self.paths.snapshot_dir(snapshot.as_str());

        // Creating the root claims the stamp; only the claimant may remove it.
        match fs::create_dir(&snap_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(Error::AlreadyExists(format!(
                    "snapshot {} already exists",
                    snap_path.display()
                )));
            }
            Err(e) => {
                return Err(Error::Snapshot(format!(
                    "unable to create snapshot {}: {}",
                    snap_path.display(),
                    e
                )));
            }
        }

        let src = self.paths.upstream.clone();
        let dst = snap_path.clone();
        let cloned = match tokio::task::spawn_blocking(move || hardlink_tree(&src, &dst)).await {
            Ok(result) => result,
            Err(e) => Err(io::Error::other(e)),
        };

        if let Err(e) = cloned {
            if let Err(cleanup) = remove_tree(&snap_path).await {
                error!(repo = %self.repo, snapshot = %snap_path.display(), "Unable to remove partial snapshot: {}", cleanup);
            }
            return Err(Error::Snapshot(format!(
                "unable to create snapshot {}: {}",
                snap_path.display(),
                e
            )));
        }

        info!(repo = %self.repo, snapshot = %snap_path.display(), "Created snapshot");
        Ok(snapshot)
    }

    /// Publish a staged snapshot and make it `latest`.
    ///
    /// Steps run in order and stop at the first failure; completed steps
    /// are left in place.
    pub async fn publish_snapshot(&self, snapshot: &SnapshotId) -> Result<()> {
        self.transport.publish(snapshot).await?;

        let snap_path = self.paths.snapshot_dir(snapshot.as_str());
        let is_dir = fs::metadata(&snap_path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return Err(Error::NotFound(format!(
                "staged snapshot {}",
                snap_path.display()
            )));
        }

        fs::symlink(&snap_path, self.paths.public_link(snapshot.as_str())).await?;
        info!(repo = %self.repo, snapshot = %snap_path.display(), "Published snapshot");

        info!(repo = %self.repo, "Publishing latest snapshot");
        self.point_latest(&snap_path).await
    }

    /// Swap `latest` onto `target` with a rename so it is never missing.
    async fn point_latest(&self, target: &Path) -> Result<()> {
        let tmp = self.paths.public_link(LATEST_TMP);
        remove_link(&tmp).await?;

        fs::symlink(target, &tmp).await?;
        if let Err(e) = fs::rename(&tmp, self.paths.public_link(LATEST)).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Remove a published link; a missing link is not an error.
    pub async fn unpublish_snapshot(&self, name: &str) -> Result<()> {
        let link = self.paths.public_link(name);
        if remove_link(&link).await? {
            info!(repo = %self.repo, snapshot = %link.display(), "Removing published snapshot");
        }
        Ok(())
    }

    /// Remove the oldest staged snapshots beyond `retention`.
    ///
    /// Returns the removed snapshots. See [`SnapshotStore::remove_snapshots`]
    /// for how failures are handled.
    pub async fn cleanup_snapshots(&self, retention: usize) -> Result<Vec<SnapshotId>> {
        let snapshots = self.list_snapshots().await?;

        if snapshots.len() <= retention {
            info!(repo = %self.repo, "No snapshots to remove");
            return Ok(Vec::new());
        }

        let excess = snapshots.len() - retention;
        self.remove_snapshots(snapshots.into_iter().take(excess).collect())
            .await
    }

    /// Unpublish and delete staged snapshots, in the given order.
    ///
    /// An unpublish failure stops the batch and is returned as is. A failed
    /// deletion is logged, the batch continues, and the call reports the
    /// problem once all snapshots were handled.
    pub async fn remove_snapshots(&self, snapshots: Vec<SnapshotId>) -> Result<Vec<SnapshotId>> {
        let mut removed = Vec::with_capacity(snapshots.len());
        let mut problems = false;

        for snapshot in snapshots {
            self.unpublish_snapshot(snapshot.as_str()).await?;

            let snap_path = self.paths.snapshot_dir(snapshot.as_str());
            info!(repo = %self.repo, snapshot = %snap_path.display(), "Removing staged snapshot");

            match remove_tree(&snap_path).await {
                Ok(()) => removed.push(snapshot),
                Err(e) => {
                    error!(repo = %self.repo, snapshot = %snap_path.display(), "Unable to remove staged snapshot: {}", e);
                    problems = true;
                }
            }
        }

        if problems {
            return Err(Error::Snapshot(
                "problems encountered while cleaning up snapshots".to_string(),
            ));
        }

        Ok(removed)
    }

    /// Staged snapshots, oldest first.
    pub async fn list_snapshots(&self) -> Result<Vec<SnapshotId>> {
        let mut snapshots = Vec::new();
        let mut entries = fs::read_dir(&self.paths.staging).await?;

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if let Ok(snapshot) = SnapshotId::parse(name) {
                    snapshots.push(snapshot);
                }
            }
        }

        snapshots.sort();
        Ok(snapshots)
    }

    /// Whether a dated link exists for the snapshot.
    pub async fn is_published(&self, snapshot: &SnapshotId) -> bool {
        fs::symlink_metadata(self.paths.public_link(snapshot.as_str()))
            .await
            .is_ok()
    }

    /// The snapshot `latest` points at, if any.
    pub async fn latest(&self) -> Result<Option<SnapshotId>> {
        match fs::read_link(self.paths.public_link(LATEST)).await {
            Ok(target) => Ok(target
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| SnapshotId::parse(name).ok())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Remove a link if present. Returns whether something was removed.
async fn remove_link(link: &Path) -> Result<bool> {
    match fs::symlink_metadata(link).await {
        Ok(_) => {
            fs::remove_file(link).await?;
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Recreate `src` inside the existing directory `dst`: directories are
/// created, regular files are hard-linked and symlinks are copied as links.
///
/// Directory modes are applied once the walk is done, deepest first, so
/// read-only upstream directories can still be filled.
fn hardlink_tree(src: &Path, dst: &Path) -> io::Result<()> {
    let mut modes = Vec::new();

    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(io::Error::other)?;
        let target: PathBuf = if relative.as_os_str().is_empty() {
            dst.to_path_buf()
        } else {
            dst.join(relative)
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            if entry.depth() > 0 {
                std::fs::create_dir(&target)?;
            }
            modes.push((target, entry.metadata()?.permissions()));
        } else if file_type.is_symlink() {
            let link = std::fs::read_link(entry.path())?;
            std::os::unix::fs::symlink(link, &target)?;
        } else {
            std::fs::hard_link(entry.path(), &target)?;
        }
    }

    for (dir, permissions) in modes.into_iter().rev() {
        std::fs::set_permissions(&dir, permissions)?;
    }
    Ok(())
}

/// Delete a staged tree. A missing tree is not an error.
async fn remove_tree(path: &Path) -> io::Result<()> {
    let path = path.to_path_buf();
    match tokio::task::spawn_blocking(move || remove_tree_blocking(&path)).await {
        Ok(result) => result,
        Err(e) => Err(io::Error::other(e)),
    }
}

fn remove_tree_blocking(path: &Path) -> io::Result<()> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a directory", path.display()),
            ))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    }

    // Snapshots keep upstream modes; read-only directories must be
    // writable again before their entries can be unlinked.
    for entry in WalkDir::new(path).follow_links(false) {
        let entry = entry?;
        if entry.file_type().is_dir() {
            let mut permissions = entry.metadata()?.permissions();
            let mode = permissions.mode();
            if mode & 0o700 != 0o700 {
                permissions.set_mode(mode | 0o700);
                std::fs::set_permissions(entry.path(), permissions)?;
            }
        }
    }

    std::fs::remove_dir_all(path)
}
