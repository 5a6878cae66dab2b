//! Typed CRUD over the remote store: the only component that issues
//! remote reads and writes.
//!
//! Field names are normalized and validated before any network call, every
//! request carries a bounded timeout, and retry policy differs by
//! idempotency: queries retry with backoff, writes retry at most once so a
//! flaky network cannot produce silent duplicates.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::remote::RemoteStore;
use crate::schema::SchemaRegistry;
use dispatch_types::fields::{normalize_fields, strip_server_fields};
use dispatch_types::{FieldMap, QueryFilter, Record};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub struct RecordStore {
    remote: Arc<dyn RemoteStore>,
    schemas: SchemaRegistry,
    config: SyncConfig,
}

impl RecordStore {
    pub fn new(remote: Arc<dyn RemoteStore>, schemas: SchemaRegistry, config: SyncConfig) -> Self {
        Self {
            remote,
            schemas,
            config,
        }
    }

    pub fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    /// Inserts a record. The remote store assigns id and timestamps.
    pub async fn insert(&self, table: &str, fields: &FieldMap) -> SyncResult<Record> {
        let mut fields = normalize_fields(fields);
        strip_server_fields(&mut fields);
        self.schemas.get(table)?.validate_insert(&fields)?;

        let mut attempt: u32 = 0;
        loop {
            match self.bounded(self.remote.insert(table, &fields)).await {
                Ok(record) => return Ok(record),
                Err(e) if e.is_transient() && attempt < self.config.write_retries => {
                    attempt += 1;
                    let backoff = self.backoff(attempt);
                    warn!("insert into {table} failed ({e}), retrying once in {backoff:?}");
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Updates a record by id. `id` and `created_at` can never be clobbered:
    /// they are stripped from the outbound fields before validation.
    pub async fn update(&self, table: &str, id: &str, fields: &FieldMap) -> SyncResult<Record> {
        let mut fields = normalize_fields(fields);
        strip_server_fields(&mut fields);
        self.schemas.get(table)?.validate_update(&fields)?;

        let mut attempt: u32 = 0;
        loop {
            match self.bounded(self.remote.update(table, id, &fields)).await {
                Ok(record) => return Ok(record),
                Err(e) if e.is_transient() && attempt < self.config.write_retries => {
                    attempt += 1;
                    let backoff = self.backoff(attempt);
                    warn!("update of {table}/{id} failed ({e}), retrying once in {backoff:?}");
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Hard-deletes a record by id.
    pub async fn delete(&self, table: &str, id: &str) -> SyncResult<()> {
        self.schemas.get(table)?;

        let mut attempt: u32 = 0;
        loop {
            match self.bounded(self.remote.delete(table, id)).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && attempt < self.config.write_retries => {
                    attempt += 1;
                    let backoff = self.backoff(attempt);
                    warn!("delete of {table}/{id} failed ({e}), retrying once in {backoff:?}");
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Runs a query. Idempotent, so transient failures are retried up to
    /// `query_attempts` total tries with exponential backoff.
    pub async fn query(&self, filter: &QueryFilter) -> SyncResult<Vec<Record>> {
        let table = filter.table_name();
        self.schemas.get(table)?;

        let mut attempt: u32 = 1;
        loop {
            match self.bounded(self.remote.select(table, filter)).await {
                Ok(records) => return Ok(records),
                Err(e) if e.is_transient() && attempt < self.config.query_attempts => {
                    let backoff = self.backoff(attempt);
                    warn!(
                        "query on {table} failed ({e}), retry {attempt}/{} in {backoff:?}",
                        self.config.query_attempts - 1
                    );
                    attempt += 1;
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn bounded<T>(&self, fut: impl Future<Output = SyncResult<T>>) -> SyncResult<T> {
        let timeout = self.config.request_timeout();
        match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::network(format!(
                "request exceeded {timeout:?}"
            ))),
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.config.retry_base() * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}
