//! Common utilities and types shared across Lagoon crates.
//!
//! This module provides the error type, validated identifiers and the
//! on-disk path layout that every other crate builds on.

pub mod error;
pub mod paths;
pub mod types;

pub use error::{Error, Result};
pub use paths::RepoPaths;
pub use types::{RepoId, SnapshotId};
