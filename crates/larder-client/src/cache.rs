//! Query cache invalidation and the refetch worker.
//!
//! The coordinator and the sync listener only ever say "this key is stale".
//! The refetch worker is the single place that turns that into a fetch and a
//! reconcile.
//!
//! ```text
//!   RefetchHandle (Send+Sync)     mpsc      RefetchWorker (spawned task)
//!   ┌─────────────────┐    ──────────────▶  ┌───────────────────────────┐
//!   │ invalidate(key) │    RefetchCommand   │ fetch_collection(key)     │
//!   │ flush().await   │    ◀──────────────  │ ViewStore::reconcile(key) │
//!   └─────────────────┘    oneshot (flush)  └───────────────────────────┘
//! ```
//!
//! A key already waiting in the queue is not queued twice. A key invalidated
//! while its fetch is running is queued again, since the running fetch may
//! predate the change.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashSet;
use larder_types::CollectionKey;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

use crate::persistence::Persistence;
use crate::view::ViewStore;

/// Receiver of "authoritative data for this key may have changed".
pub trait QueryCache: Send + Sync {
    /// Mark `key` stale and schedule a refetch. Never blocks, never fails.
    fn invalidate(&self, key: &CollectionKey);
}

enum RefetchCommand {
    Refetch(CollectionKey),
    Flush(oneshot::Sender<()>),
}

/// Cloneable handle to a running [`RefetchWorker`].
#[derive(Clone)]
pub struct RefetchHandle {
    tx: mpsc::UnboundedSender<RefetchCommand>,
    queued: Arc<DashSet<CollectionKey>>,
    view: Arc<ViewStore>,
}

impl RefetchHandle {
    /// Wait until every refetch queued before this call has completed.
    pub async fn flush(&self) {
        let (reply, done) = oneshot::channel();
        if self.tx.send(RefetchCommand::Flush(reply)).is_ok() {
            let _ = done.await;
        }
    }
}

impl QueryCache for RefetchHandle {
    fn invalidate(&self, key: &CollectionKey) {
        self.view.mark_stale(*key);
        if !self.queued.insert(*key) {
            trace!(%key, "refetch already queued");
            return;
        }
        if self.tx.send(RefetchCommand::Refetch(*key)).is_err() {
            self.queued.remove(key);
            debug!(%key, "refetch worker gone, invalidation dropped");
        }
    }
}

/// Drains invalidations: fetch, then reconcile.
pub struct RefetchWorker {
    persistence: Arc<dyn Persistence>,
    view: Arc<ViewStore>,
    queued: Arc<DashSet<CollectionKey>>,
}

impl RefetchWorker {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<RefetchCommand>) {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                RefetchCommand::Refetch(key) => {
                    self.queued.remove(&key);
                    self.refetch(key).await;
                }
                RefetchCommand::Flush(reply) => {
                    let _ = reply.send(());
                }
            }
        }
        debug!("refetch worker shutting down: channel closed");
    }

    async fn refetch(&self, key: CollectionKey) {
        match self.persistence.fetch_collection(&key).await {
            Ok(entities) => {
                debug!(%key, count = entities.len(), "refetched");
                self.view.reconcile(key, entities);
            }
            Err(error) => {
                // Stays stale; the next invalidation retries.
                warn!(%key, %error, "refetch failed");
            }
        }
    }
}

/// Spawn a refetch worker on the current tokio runtime.
pub fn spawn_refetch_worker(persistence: Arc<dyn Persistence>, view: Arc<ViewStore>) -> RefetchHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let queued = Arc::new(DashSet::new());
    let worker = RefetchWorker {
        persistence,
        view: view.clone(),
        queued: queued.clone(),
    };
    tokio::spawn(worker.run(rx));
    RefetchHandle { tx, queued, view }
}

/// Cache that only counts invalidations. Useful where no refetch should happen.
#[derive(Debug, Default)]
pub struct RecordingCache {
    counts: Mutex<HashMap<CollectionKey, usize>>,
}

impl RecordingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, key: &CollectionKey) -> usize {
        self.counts.lock().get(key).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.lock().values().sum()
    }
}

impl QueryCache for RecordingCache {
    fn invalidate(&self, key: &CollectionKey) {
        *self.counts.lock().entry(*key).or_default() += 1;
    }
}
