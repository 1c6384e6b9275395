//! Test doubles shared by the unit tests of this crate.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use lagoon_common::{Error, Result, SnapshotId};
use lagoon_transport::Transport;

/// Transport that records calls and fails on request.
pub struct MockTransport {
    sync_calls: AtomicU32,
    fail_sync: AtomicBool,
    fail_publish: AtomicBool,
    published: Mutex<Vec<SnapshotId>>,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            sync_calls: AtomicU32::new(0),
            fail_sync: AtomicBool::new(false),
            fail_publish: AtomicBool::new(false),
            published: Mutex::new(Vec::new()),
            gate: Mutex::new(None),
        }
    }

    pub fn fail_sync(&self, fail: bool) {
        self.fail_sync.store(fail, Ordering::SeqCst);
    }

    pub fn fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Make every `sync` wait until the returned handle is notified.
    pub fn hold_sync(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(notify.clone());
        notify
    }

    pub fn sync_calls(&self) -> u32 {
        self.sync_calls.load(Ordering::SeqCst)
    }

    pub fn published(&self) -> Vec<SnapshotId> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn sync(&self) -> Result<()> {
        self.sync_calls.fetch_add(1, Ordering::SeqCst);

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if self.fail_sync.load(Ordering::SeqCst) {
            return Err(Error::Transport("mock sync failure".to_string()));
        }
        Ok(())
    }

    async fn publish(&self, snapshot: &SnapshotId) -> Result<()> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(Error::Transport("mock publish failure".to_string()));
        }
        self.published.lock().unwrap().push(snapshot.clone());
        Ok(())
    }
}
