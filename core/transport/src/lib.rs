//! Transport abstraction for Lagoon.
//!
//! A transport fetches repository content from its external source into
//! the repository's upstream directory and optionally post-processes a
//! staged snapshot. Three variants exist:
//! - `simulated`: random delay and random outcome, no real I/O
//! - `pull-mirror`: rsync from an `rsync://` URL
//! - `package-index`: reposync plus createrepo for RPM repositories
//!
//! # Design Principles
//! - Transports only touch the upstream directory and the snapshot handed to `publish`
//! - `sync` must be safe to call again after a partial run
//! - External tools are opaque subprocesses: zero exit status means success

pub mod command;
pub mod package_index;
pub mod pull_mirror;
pub mod simulated;
pub mod transport;

use std::sync::Arc;

use lagoon_common::{RepoId, RepoPaths};
use lagoon_config::{RepositorySpec, Settings, TransportKind};

pub use package_index::{parse_repo_id, PackageIndexTransport};
pub use pull_mirror::{is_rsync_url, PullMirrorTransport};
pub use simulated::SimulatedTransport;
pub use transport::Transport;

/// Build the transport selected by a repository's kind.
pub fn build_transport(
    spec: &RepositorySpec,
    id: &RepoId,
    paths: &RepoPaths,
    settings: &Settings,
) -> Arc<dyn Transport> {
    match spec.kind {
        TransportKind::Simulated => Arc::new(SimulatedTransport::new(id.clone(), &paths.upstream)),
        TransportKind::PullMirror => Arc::new(PullMirrorTransport::new(
            id.clone(),
            spec.src.clone(),
            &paths.upstream,
            spec.exclude.clone(),
        )),
        TransportKind::PackageIndex => Arc::new(
            PackageIndexTransport::new(id.clone(), spec.src.clone(), paths)
                .with_repos_dir(&settings.repos_dir),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn spec(kind: TransportKind) -> RepositorySpec {
        RepositorySpec {
            id: "r1".to_string(),
            name: String::new(),
            kind,
            src: "rsync://mirror.example.org/r1/".to_string(),
            dest: PathBuf::from("/srv"),
            cron: "0 0 * * * *".to_string(),
            exclude: Vec::new(),
            snapshots: 1,
        }
    }

    #[test]
    fn test_factory_selects_variant() {
        let id = RepoId::new("r1").unwrap();
        let paths = RepoPaths::derive(&id, "/srv");
        let settings = Settings::default();

        let names: Vec<String> = [
            TransportKind::Simulated,
            TransportKind::PullMirror,
            TransportKind::PackageIndex,
        ]
        .into_iter()
        .map(|kind| build_transport(&spec(kind), &id, &paths, &settings).name().to_string())
        .collect();

        assert_eq!(names, vec!["simulated", "pull-mirror", "package-index"]);
    }
}
