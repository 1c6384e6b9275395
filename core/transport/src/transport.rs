//! Transport trait definition.

use async_trait::async_trait;

use lagoon_common::{Result, SnapshotId};

/// Pluggable mechanism that fetches repository content.
///
/// All operations may block on network or subprocess I/O.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Get the transport name (e.g., "simulated", "pull-mirror").
    fn name(&self) -> &str;

    /// Run prerequisite checks and one-time setup.
    ///
    /// # Postconditions
    /// - Required external tools resolve on `PATH`
    /// - The source descriptor is well formed
    ///
    /// # Errors
    /// - `Error::Preflight` describing the failed check; checks run before
    ///   any external state is written
    async fn init(&self) -> Result<()>;

    /// Transfer content into the upstream directory.
    ///
    /// Called repeatedly by the retry policy, so it must tolerate the
    /// leftovers of an earlier partial run.
    async fn sync(&self) -> Result<()>;

    /// Post-process a staged snapshot before it becomes visible.
    async fn publish(&self, snapshot: &SnapshotId) -> Result<()>;
}
