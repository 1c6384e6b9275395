//! On-disk layout of a repository under its destination root.
//!
//! ```text
//! <dest>/upstream/<id>/            live mirrored tree
//! <dest>/staging/<id>/YYYYMMDD/    one directory per snapshot
//! <dest>/public/<id>/YYYYMMDD      symlink to the staged directory
//! <dest>/public/<id>/latest        symlink to the newest published snapshot
//! ```

use std::path::{Path, PathBuf};

use crate::types::RepoId;

/// Name of the moving pointer to the most recently published snapshot.
pub const LATEST: &str = "latest";

/// The three directories owned by one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoPaths {
    pub upstream: PathBuf,
    pub staging: PathBuf,
    pub public: PathBuf,
}

impl RepoPaths {
    /// Derive all paths for a repository id under a destination root.
    pub fn derive(id: &RepoId, dest: impl AsRef<Path>) -> Self {
        let dest = dest.as_ref();
        Self {
            upstream: upstream_path(id.as_str(), dest),
            staging: staging_path(id.as_str(), dest),
            public: public_path(id.as_str(), dest),
        }
    }

    /// Staged directory of a snapshot.
    pub fn snapshot_dir(&self, snapshot: &str) -> PathBuf {
        self.staging.join(snapshot)
    }

    /// Published link of a snapshot, or of `latest`.
    pub fn public_link(&self, name: &str) -> PathBuf {
        self.public.join(name)
    }
}

/// `<dest>/upstream/<id>/`
pub fn upstream_path(id: &str, dest: &Path) -> PathBuf {
    layout_path("upstream", id, dest)
}

/// `<dest>/staging/<id>/`
pub fn staging_path(id: &str, dest: &Path) -> PathBuf {
    layout_path("staging", id, dest)
}

/// `<dest>/public/<id>/`
pub fn public_path(id: &str, dest: &Path) -> PathBuf {
    layout_path("public", id, dest)
}

fn layout_path(area: &str, id: &str, dest: &Path) -> PathBuf {
    let dest = dest.to_string_lossy();
    let dest = dest.trim_end_matches('/');
    PathBuf::from(format!("{}/{}/{}/", dest, area, id))
}
