//! Ordered, bounded offline write queue.
//!
//! The only local state the layer persists between page loads. It holds
//! pending writes, never business records, so localStorage can never become
//! a second source of truth. The file is tagged with a schema version; a
//! mismatch discards the queue rather than misreading it.

use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, Utc};
use dispatch_types::FieldMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;
use tracing::{debug, warn};
use uuid::Uuid;

pub const QUEUE_SCHEMA_VERSION: u32 = 1;

/// A write deferred until connectivity returns.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum QueuedOp {
    Save {
        table: String,
        /// `None` means the insert path.
        record_id: Option<String>,
        fields: FieldMap,
    },
    Delete {
        table: String,
        record_id: String,
    },
}

/// One queue entry. The ticket lets a caller cancel it while it is still
/// queued; once dequeued a write is no longer cancellable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueuedWrite {
    pub ticket: Uuid,
    pub op: QueuedOp,
    pub enqueued_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct QueueFile {
    schema_version: u32,
    writes: Vec<QueuedWrite>,
}

/// FIFO queue of offline writes, bounded and optionally persisted.
pub struct OfflineQueue {
    writes: VecDeque<QueuedWrite>,
    capacity: usize,
    path: Option<PathBuf>,
}

impl OfflineQueue {
    /// Creates the queue, loading any persisted writes from `path`.
    pub fn new(capacity: usize, path: Option<PathBuf>) -> Self {
        let writes = path.as_deref().map(load_queue_file).unwrap_or_default();
        if !writes.is_empty() {
            debug!("restored {} queued writes from disk", writes.len());
        }
        Self {
            writes,
            capacity,
            path,
        }
    }

    /// Enqueues a write, returning its cancellation ticket. Fails with
    /// `QueueFull` at capacity instead of silently dropping the oldest.
    pub fn push(&mut self, op: QueuedOp) -> SyncResult<Uuid> {
        if self.writes.len() >= self.capacity {
            return Err(SyncError::QueueFull {
                capacity: self.capacity,
            });
        }
        let ticket = Uuid::new_v4();
        self.writes.push_back(QueuedWrite {
            ticket,
            op,
            enqueued_at: Utc::now(),
        });
        self.persist()?;
        Ok(ticket)
    }

    /// Dequeues the oldest write. From here on it is committed to execution
    /// and can no longer be cancelled.
    pub fn pop_front(&mut self) -> Option<QueuedWrite> {
        let write = self.writes.pop_front();
        if write.is_some() {
            self.persist_best_effort();
        }
        write
    }

    /// Puts a write back at the head after a transient drain failure, so
    /// original order is preserved for the next drain.
    pub fn requeue_front(&mut self, write: QueuedWrite) {
        self.writes.push_front(write);
        self.persist_best_effort();
    }

    /// Cancels a still-queued write. Returns false if it was already
    /// dequeued (or never existed).
    pub fn cancel(&mut self, ticket: &Uuid) -> bool {
        let before = self.writes.len();
        self.writes.retain(|w| w.ticket != *ticket);
        let removed = self.writes.len() < before;
        if removed {
            self.persist_best_effort();
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Writes the queue to disk when a path is configured.
    pub fn persist(&self) -> SyncResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let file = QueueFile {
            schema_version: QUEUE_SCHEMA_VERSION,
            writes: self.writes.iter().cloned().collect(),
        };
        let bytes = serde_json::to_vec(&file)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    fn persist_best_effort(&self) {
        if let Err(e) = self.persist() {
            warn!("offline queue persist failed: {e}");
        }
    }
}

fn load_queue_file(path: &std::path::Path) -> VecDeque<QueuedWrite> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return VecDeque::new(),
        Err(e) => {
            warn!("offline queue load failed: {e}");
            return VecDeque::new();
        }
    };
    match serde_json::from_slice::<QueueFile>(&bytes) {
        Ok(file) if file.schema_version == QUEUE_SCHEMA_VERSION => file.writes.into(),
        Ok(file) => {
            warn!(
                "discarding offline queue with schema version {} (expected {QUEUE_SCHEMA_VERSION})",
                file.schema_version
            );
            VecDeque::new()
        }
        Err(e) => {
            warn!("discarding unreadable offline queue: {e}");
            VecDeque::new()
        }
    }
}
