//! Sync layer configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the data access and sync layer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Default cache TTL in seconds.
    pub cache_ttl_secs: u64,

    /// Total attempts for an idempotent query (first try included).
    pub query_attempts: u32,

    /// Automatic retries for a non-idempotent write. Kept at one so a
    /// flaky network cannot produce silent duplicate writes.
    pub write_retries: u32,

    /// Base backoff in milliseconds, doubled per retry.
    pub retry_base_ms: u64,

    /// Bound on every remote request. Exceeding it is a network error,
    /// distinct from the connectivity-down signal.
    pub request_timeout_secs: u64,

    /// Cap for change-stream reconnection backoff, in seconds.
    pub reconnect_backoff_cap_secs: u64,

    /// Consecutive reconnection failures before a change stream gives up
    /// and surfaces a sync-lost event.
    pub max_reconnect_attempts: u32,

    /// Poll interval for the HTTP change feed, in milliseconds.
    pub change_poll_ms: u64,

    /// Bound on the offline write queue.
    pub offline_queue_capacity: usize,

    /// Where the offline queue is persisted between page loads. `None`
    /// keeps it in memory only. Business records are never persisted here.
    pub queue_path: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 60,
            query_attempts: 3,
            write_retries: 1,
            retry_base_ms: 300,
            request_timeout_secs: 10,
            reconnect_backoff_cap_secs: 30,
            max_reconnect_attempts: 8,
            change_poll_ms: 1000,
            offline_queue_capacity: 256,
            queue_path: None,
        }
    }
}

impl SyncConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn retry_base(&self) -> Duration {
        Duration::from_millis(self.retry_base_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn reconnect_backoff_cap(&self) -> Duration {
        Duration::from_secs(self.reconnect_backoff_cap_secs)
    }

    pub fn change_poll_interval(&self) -> Duration {
        Duration::from_millis(self.change_poll_ms)
    }
}
