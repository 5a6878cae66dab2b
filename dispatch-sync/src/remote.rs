//! The remote datastore contract and the connectivity signal.

use crate::error::SyncResult;
use async_trait::async_trait;
use dispatch_types::{ChangeEvent, FieldMap, QueryFilter, Record};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Table-scoped contract of the hosted datastore.
///
/// This is the only seam that touches the network. [`crate::HttpRemote`]
/// implements it against the production backend; tests substitute an
/// in-memory fake.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Inserts a row. The store assigns `id` and both timestamps.
    async fn insert(&self, table: &str, fields: &FieldMap) -> SyncResult<Record>;

    /// Updates a row by id.
    async fn update(&self, table: &str, id: &str, fields: &FieldMap) -> SyncResult<Record>;

    /// Hard-deletes a row by id.
    async fn delete(&self, table: &str, id: &str) -> SyncResult<()>;

    /// Runs one finite, non-restartable read. Pagination is explicit via
    /// the filter's cursor.
    async fn select(&self, table: &str, filter: &QueryFilter) -> SyncResult<Vec<Record>>;

    /// Opens a change stream for a table. The channel closing means the
    /// stream died; reconnection is the change bus's job, not the store's.
    async fn open_changes(&self, table: &str) -> SyncResult<mpsc::Receiver<ChangeEvent>>;
}

/// The online/offline signal.
///
/// Connectivity is an explicit input set by the embedding application (or a
/// health poller), never inferred from request timeouts. Clones share one
/// underlying signal.
#[derive(Clone)]
pub struct Connectivity {
    tx: Arc<watch::Sender<bool>>,
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    pub fn set_online(&self, online: bool) {
        self.tx.send_replace(online);
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// A receiver that observes every online/offline edge.
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(true)
    }
}
