//! Shared test helpers: an in-memory remote store with injectable failures,
//! plus config and polling utilities.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use dispatch_sync::remote::RemoteStore;
use dispatch_sync::{SyncConfig, SyncError, SyncResult};
use dispatch_types::{ChangeEvent, FieldMap, QueryFilter, Record};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

/// Config with millisecond timings so retry/backoff paths run fast.
pub fn test_config() -> SyncConfig {
    SyncConfig {
        cache_ttl_secs: 60,
        query_attempts: 3,
        write_retries: 1,
        retry_base_ms: 5,
        request_timeout_secs: 5,
        reconnect_backoff_cap_secs: 1,
        max_reconnect_attempts: 3,
        change_poll_ms: 10,
        offline_queue_capacity: 16,
        queue_path: None,
    }
}

/// Polls `cond` until it holds or two seconds pass.
pub async fn wait_for(mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}

/// In-memory remote store. Uniqueness is enforced on the `reference` field
/// so conflict paths are exercisable; failures and delays are injectable.
pub struct MemoryRemote {
    tables: Mutex<HashMap<String, Vec<Record>>>,
    streams: Mutex<HashMap<String, Vec<tokio::sync::mpsc::Sender<ChangeEvent>>>>,
    next_id: AtomicU64,
    fail_selects: AtomicU32,
    fail_writes: AtomicU32,
    fail_connects: AtomicU32,
    write_delay_ms: AtomicU64,
    opened_streams: AtomicU32,
    /// Flat log of applied operations, in application order.
    op_log: Mutex<Vec<String>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            streams: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            fail_selects: AtomicU32::new(0),
            fail_writes: AtomicU32::new(0),
            fail_connects: AtomicU32::new(0),
            write_delay_ms: AtomicU64::new(0),
            opened_streams: AtomicU32::new(0),
            op_log: Mutex::new(Vec::new()),
        }
    }

    pub fn seed(&self, table: &str, record: Record) {
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .push(record);
    }

    pub fn records(&self, table: &str) -> Vec<Record> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn fail_next_selects(&self, n: u32) {
        self.fail_selects.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_writes(&self, n: u32) {
        self.fail_writes.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_connects(&self, n: u32) {
        self.fail_connects.store(n, Ordering::SeqCst);
    }

    pub fn set_write_delay(&self, delay: Duration) {
        self.write_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn opened_streams(&self) -> u32 {
        self.opened_streams.load(Ordering::SeqCst)
    }

    pub fn op_log(&self) -> Vec<String> {
        self.op_log.lock().unwrap().clone()
    }

    /// Emits an event on a table's open change streams, as the backend
    /// would after another client's write.
    pub fn emit(&self, table: &str, event: ChangeEvent) {
        let streams = self.streams.lock().unwrap();
        if let Some(senders) = streams.get(table) {
            for sender in senders {
                let _ = sender.try_send(event.clone());
            }
        }
    }

    /// Closes every open stream for a table, simulating a dropped
    /// connection.
    pub fn drop_streams(&self, table: &str) {
        self.streams.lock().unwrap().remove(table);
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    async fn write_delay(&self) {
        let ms = self.write_delay_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    fn log(&self, entry: String) {
        self.op_log.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn insert(&self, table: &str, fields: &FieldMap) -> SyncResult<Record> {
        self.write_delay().await;
        if Self::take_failure(&self.fail_writes) {
            return Err(SyncError::network("injected write failure"));
        }

        let mut tables = self.tables.lock().unwrap();
        let rows = tables.entry(table.to_string()).or_default();

        if let Some(reference) = fields.get("reference").and_then(|v| v.as_str()) {
            if rows.iter().any(|r| r.field_str("reference") == Some(reference)) {
                return Err(SyncError::Conflict(format!(
                    "{table}: duplicate reference {reference}"
                )));
            }
        }

        let mut record = Record::new(fields.clone());
        record.status = fields
            .get("status")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok());
        record.fields.remove("status");
        let id = format!("srv-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        record.id = Some(id.clone());
        record.created_at = Some(Utc::now());
        record.updated_at = record.created_at;

        rows.push(record.clone());
        drop(tables);
        self.log(format!("insert {table} {id}"));
        Ok(record)
    }

    async fn update(&self, table: &str, id: &str, fields: &FieldMap) -> SyncResult<Record> {
        self.write_delay().await;
        if Self::take_failure(&self.fail_writes) {
            return Err(SyncError::network("injected write failure"));
        }

        let mut tables = self.tables.lock().unwrap();
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| SyncError::NotFound(format!("{table}: no such row")))?;
        let row = rows
            .iter_mut()
            .find(|r| r.id.as_deref() == Some(id))
            .ok_or_else(|| SyncError::NotFound(format!("{table}/{id}: no such row")))?;

        for (key, value) in fields {
            if key == "status" {
                row.status = value.as_str().and_then(|s| s.parse().ok());
            } else {
                row.fields.insert(key.clone(), value.clone());
            }
        }
        row.updated_at = Some(Utc::now());
        let updated = row.clone();
        drop(tables);
        self.log(format!("update {table} {id}"));
        Ok(updated)
    }

    async fn delete(&self, table: &str, id: &str) -> SyncResult<()> {
        self.write_delay().await;
        if Self::take_failure(&self.fail_writes) {
            return Err(SyncError::network("injected write failure"));
        }

        let mut tables = self.tables.lock().unwrap();
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| SyncError::NotFound(format!("{table}: no such row")))?;
        let before = rows.len();
        rows.retain(|r| r.id.as_deref() != Some(id));
        if rows.len() == before {
            return Err(SyncError::NotFound(format!("{table}/{id}: no such row")));
        }
        drop(tables);
        self.log(format!("delete {table} {id}"));
        Ok(())
    }

    async fn select(&self, table: &str, filter: &QueryFilter) -> SyncResult<Vec<Record>> {
        if Self::take_failure(&self.fail_selects) {
            return Err(SyncError::network("injected select failure"));
        }

        let tables = self.tables.lock().unwrap();
        let rows = tables.get(table).cloned().unwrap_or_default();
        let skip = filter.cursor_value().unwrap_or(0) as usize;
        let take = filter.limit_value().map(|l| l as usize).unwrap_or(usize::MAX);
        Ok(rows
            .into_iter()
            .filter(|r| filter.matches(r))
            .skip(skip)
            .take(take)
            .collect())
    }

    async fn open_changes(
        &self,
        table: &str,
    ) -> SyncResult<tokio::sync::mpsc::Receiver<ChangeEvent>> {
        if Self::take_failure(&self.fail_connects) {
            return Err(SyncError::network("injected connect failure"));
        }
        self.opened_streams.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = tokio::sync::mpsc::channel(64);
        self.streams
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .push(tx);
        Ok(rx)
    }
}
