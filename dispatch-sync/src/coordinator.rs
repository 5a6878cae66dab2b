//! The single public entry point UI code calls.
//!
//! Composes the record store, cache, and change bus into one coherent
//! read/write surface:
//! - cache-first reads with an explicit stale flag when serving the offline
//!   fallback
//! - at most one in-flight write per (table, id), FIFO, so competing status
//!   updates cannot interleave
//! - centralized status-transition enforcement, instead of checks scattered
//!   across UI event handlers
//! - write-through invalidation plus synchronous same-tab notification,
//!   since the remote echo is not guaranteed to beat the next render
//! - an ordered offline queue drained automatically on reconnect

use crate::cache::{Cache, CacheStats, InvalidatePattern};
use crate::change_bus::{BusEvent, ChangeBus, FeedState, Subscription};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::offline_queue::{OfflineQueue, QueuedOp};
use crate::record_store::RecordStore;
use crate::remote::{Connectivity, RemoteStore};
use crate::schema::SchemaRegistry;
use dispatch_types::{ChangeEvent, ChangeKind, FieldMap, QueryFilter, Record, RecordStatus};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result of a read: the records plus whether they came from the stale
/// offline fallback rather than a fresh query.
#[derive(Clone, Debug)]
pub struct QueryResult {
    pub records: Vec<Record>,
    pub stale: bool,
}

/// Result of a save: applied remotely, or queued for the next reconnect.
#[derive(Debug)]
pub enum SaveOutcome {
    Saved(Record),
    Queued(Uuid),
}

impl SaveOutcome {
    pub fn record(self) -> Option<Record> {
        match self {
            Self::Saved(record) => Some(record),
            Self::Queued(_) => None,
        }
    }

    pub fn ticket(&self) -> Option<Uuid> {
        match self {
            Self::Saved(_) => None,
            Self::Queued(ticket) => Some(*ticket),
        }
    }
}

/// Result of a delete: applied remotely, or queued for the next reconnect.
#[derive(Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    Queued(Uuid),
}

type WriteKey = (String, String);

/// Orchestrates RecordStore + Cache + ChangeBus behind one API.
pub struct SyncCoordinator {
    store: RecordStore,
    cache: StdMutex<Cache>,
    bus: ChangeBus,
    connectivity: Connectivity,
    /// Offline queue. Async mutex: held across remote calls while draining.
    queue: AsyncMutex<OfflineQueue>,
    /// Per-(table,id) write locks. `tokio::sync::Mutex` is FIFO-fair, which
    /// is exactly the queued-second-writer semantics writes need. Entries
    /// live for the session.
    write_locks: StdMutex<HashMap<WriteKey, Arc<AsyncMutex<()>>>>,
    drain_task: StdMutex<Option<JoinHandle<()>>>,
}

impl SyncCoordinator {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        schemas: SchemaRegistry,
        connectivity: Connectivity,
        config: SyncConfig,
    ) -> Arc<Self> {
        let bus = ChangeBus::new(remote.clone(), &config);
        let store = RecordStore::new(remote, schemas, config.clone());
        let cache = StdMutex::new(Cache::new(config.cache_ttl()));
        let queue = AsyncMutex::new(OfflineQueue::new(
            config.offline_queue_capacity,
            config.queue_path.clone(),
        ));

        Arc::new(Self {
            store,
            cache,
            bus,
            connectivity,
            queue,
            write_locks: StdMutex::new(HashMap::new()),
            drain_task: StdMutex::new(None),
        })
    }

    /// Starts the reconnect watcher that drains the offline queue on every
    /// offline-to-online edge (and once at startup if already online).
    pub fn start(self: &Arc<Self>) {
        let mut slot = self.drain_task.lock().unwrap();
        if slot.is_some() {
            return;
        }
        let coordinator = Arc::clone(self);
        let mut online_rx = coordinator.connectivity.watch();
        *slot = Some(tokio::spawn(async move {
            loop {
                if *online_rx.borrow_and_update() {
                    if let Err(e) = coordinator.drain_queue().await {
                        warn!("offline queue drain stopped: {e}");
                    }
                }
                if online_rx.changed().await.is_err() {
                    break;
                }
            }
        }));
    }

    // ── Reads ──

    /// Cache-first read. While offline (or when a query ultimately fails
    /// with a transient error), falls back to the most recent cached value,
    /// even an expired one, flagged `stale: true` — never silently serves
    /// wrong-but-fresh-looking data.
    pub async fn get(&self, filter: &QueryFilter) -> SyncResult<QueryResult> {
        let key = filter.cache_key();

        if let Some(records) = self.cache.lock().unwrap().get(&key) {
            return Ok(QueryResult {
                records,
                stale: false,
            });
        }

        if !self.connectivity.is_online() {
            return match self.cache.lock().unwrap().get_stale(&key) {
                Some(records) => Ok(QueryResult {
                    records,
                    stale: true,
                }),
                None => Err(SyncError::network(format!(
                    "offline with no cached value for {}",
                    filter.table_name()
                ))),
            };
        }

        match self.store.query(filter).await {
            Ok(records) => {
                self.cache
                    .lock()
                    .unwrap()
                    .set(key, records.clone(), None);
                Ok(QueryResult {
                    records,
                    stale: false,
                })
            }
            Err(e) if e.is_transient() => match self.cache.lock().unwrap().get_stale(&key) {
                Some(records) => {
                    warn!("query on {} failed ({e}), serving stale cache", filter.table_name());
                    Ok(QueryResult {
                        records,
                        stale: true,
                    })
                }
                None => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    // ── Writes ──

    /// Saves a record: insert when it has no id, update otherwise
    /// (optimistic last-write-wins). While offline the write is queued in
    /// issue order instead of failing.
    pub async fn save(&self, table: &str, record: &Record) -> SyncResult<SaveOutcome> {
        let fields = record.to_wire_fields();

        if !self.connectivity.is_online() {
            // Validation is purely local; a malformed write must fail now,
            // not queue as an apparent success and die silently at drain.
            let schema = self.store.schemas().get(table)?;
            match record.id {
                Some(_) => schema.validate_update(&fields)?,
                None => schema.validate_insert(&fields)?,
            }
            let ticket = self.queue.lock().await.push(QueuedOp::Save {
                table: table.to_string(),
                record_id: record.id.clone(),
                fields,
            })?;
            debug!("offline: queued save for {table} ({ticket})");
            return Ok(SaveOutcome::Queued(ticket));
        }

        let saved = self
            .execute_save(table, record.id.as_deref(), &fields)
            .await?;
        Ok(SaveOutcome::Saved(saved))
    }

    /// Hard-deletes a record. While offline the delete is queued.
    pub async fn delete(&self, table: &str, id: &str) -> SyncResult<DeleteOutcome> {
        if !self.connectivity.is_online() {
            self.store.schemas().get(table)?;
            let ticket = self.queue.lock().await.push(QueuedOp::Delete {
                table: table.to_string(),
                record_id: id.to_string(),
            })?;
            debug!("offline: queued delete for {table}/{id} ({ticket})");
            return Ok(DeleteOutcome::Queued(ticket));
        }

        self.execute_delete(table, id).await?;
        Ok(DeleteOutcome::Deleted)
    }

    // ── Subscriptions ──

    /// Delegates to the change bus. The callback also receives this tab's
    /// own writes, published locally right after each save/delete.
    pub fn subscribe(
        &self,
        table: &str,
        callback: impl Fn(&BusEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.bus.subscribe(table, callback)
    }

    pub fn unsubscribe(&self, subscription: &Subscription) {
        self.bus.unsubscribe(subscription);
    }

    /// Connection state of a table's change stream, if one exists.
    pub fn feed_state(&self, table: &str) -> Option<watch::Receiver<FeedState>> {
        self.bus.feed_state(table)
    }

    // ── Queue management ──

    /// Cancels a queued write. Only writes still in the queue are
    /// cancellable; once dequeued a write runs to completion.
    pub async fn cancel_queued(&self, ticket: &Uuid) -> bool {
        self.queue.lock().await.cancel(ticket)
    }

    pub async fn pending_writes(&self) -> usize {
        self.queue.lock().await.len()
    }

    // ── Observability / teardown ──

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.lock().unwrap().stats()
    }

    /// Persists the queue, tears down all change streams, and stops the
    /// drain watcher. Called once at application teardown.
    pub async fn shutdown(&self) {
        if let Some(task) = self.drain_task.lock().unwrap().take() {
            task.abort();
        }
        self.bus.shutdown();
        if let Err(e) = self.queue.lock().await.persist() {
            warn!("offline queue persist on shutdown failed: {e}");
        }
    }

    // ── Internals ──

    /// The one write path, shared by online saves and queue drains, so the
    /// transition check cannot be bypassed.
    async fn execute_save(
        &self,
        table: &str,
        id: Option<&str>,
        fields: &FieldMap,
    ) -> SyncResult<Record> {
        match id {
            Some(id) => {
                let lock = self.write_lock(table, id);
                let _guard = lock.lock().await;
                self.check_transition(table, id, fields).await?;
                let saved = self.store.update(table, id, fields).await?;
                self.after_write(table, ChangeKind::Update, saved.clone());
                Ok(saved)
            }
            None => {
                let saved = self.store.insert(table, fields).await?;
                self.after_write(table, ChangeKind::Insert, saved.clone());
                Ok(saved)
            }
        }
    }

    async fn execute_delete(&self, table: &str, id: &str) -> SyncResult<()> {
        let lock = self.write_lock(table, id);
        let _guard = lock.lock().await;
        self.store.delete(table, id).await?;

        self.cache
            .lock()
            .unwrap()
            .invalidate(&InvalidatePattern::Prefix(QueryFilter::key_prefix(table)));
        self.bus.publish_local(&ChangeEvent {
            table: table.to_string(),
            kind: ChangeKind::Delete,
            record_id: id.to_string(),
            record: None,
        });
        Ok(())
    }

    /// Terminal statuses admit no transition. The current status comes from
    /// the remote store, not from whatever the UI last rendered.
    async fn check_transition(&self, table: &str, id: &str, fields: &FieldMap) -> SyncResult<()> {
        let Some(next) = fields.get("status").and_then(|v| v.as_str()) else {
            return Ok(());
        };
        let next: RecordStatus = next
            .parse()
            .map_err(|e: dispatch_types::ParseStatusError| SyncError::Validation(e.to_string()))?;

        let filter = QueryFilter::table(table).eq("id", id);
        let current = self
            .store
            .query(&filter)
            .await?
            .first()
            .and_then(|r| r.status);

        if let Some(current) = current {
            if !current.can_transition_to(next) {
                return Err(SyncError::InvalidTransition {
                    from: current,
                    to: next,
                });
            }
        }
        Ok(())
    }

    fn after_write(&self, table: &str, kind: ChangeKind, record: Record) {
        self.cache
            .lock()
            .unwrap()
            .invalidate(&InvalidatePattern::Prefix(QueryFilter::key_prefix(table)));
        let record_id = record.id.clone().unwrap_or_default();
        self.bus.publish_local(&ChangeEvent {
            table: table.to_string(),
            kind,
            record_id,
            record: Some(record),
        });
    }

    fn write_lock(&self, table: &str, id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.write_locks.lock().unwrap();
        locks
            .entry((table.to_string(), id.to_string()))
            .or_default()
            .clone()
    }

    /// Applies queued writes in original order. A transient failure puts
    /// the write back at the head and stops; the next online edge resumes.
    /// Non-transient failures (validation, conflict, invalid transition)
    /// drop the write with a warning — retrying them cannot succeed.
    async fn drain_queue(&self) -> SyncResult<()> {
        loop {
            if !self.connectivity.is_online() {
                return Ok(());
            }

            let write = self.queue.lock().await.pop_front();
            let Some(write) = write else {
                return Ok(());
            };

            let result = match &write.op {
                QueuedOp::Save {
                    table,
                    record_id,
                    fields,
                } => self
                    .execute_save(table, record_id.as_deref(), fields)
                    .await
                    .map(|_| ()),
                QueuedOp::Delete { table, record_id } => {
                    self.execute_delete(table, record_id).await
                }
            };

            match result {
                Ok(()) => {
                    info!("drained queued write {}", write.ticket);
                }
                Err(e) if e.is_transient() => {
                    self.queue.lock().await.requeue_front(write);
                    return Err(e);
                }
                Err(e) => {
                    warn!("dropping queued write {}: {e}", write.ticket);
                }
            }
        }
    }
}
