//! Data access and sync layer for the Dispatch delivery dashboard.
//!
//! One coherent read/write surface over a hosted remote datastore:
//! - Typed CRUD with validation, bounded timeouts, and retry/backoff
//! - Short-lived read-through caching keyed by query signature
//! - Change-notification fan-out with bounded reconnection
//! - Optimistic writes with per-key FIFO serialization and an ordered,
//!   bounded offline queue
//!
//! UI code talks to [`SyncCoordinator`] only; the record store, cache, and
//! change bus are composed behind it.

pub mod cache;
pub mod change_bus;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod http_remote;
pub mod offline_queue;
pub mod record_store;
pub mod remote;
pub mod schema;

pub use cache::{Cache, CacheStats, InvalidatePattern};
pub use change_bus::{BusEvent, ChangeBus, FeedState, Subscription};
pub use config::SyncConfig;
pub use coordinator::{DeleteOutcome, QueryResult, SaveOutcome, SyncCoordinator};
pub use error::{SyncError, SyncResult};
pub use http_remote::HttpRemote;
pub use offline_queue::{OfflineQueue, QueuedOp, QueuedWrite};
pub use record_store::RecordStore;
pub use remote::{Connectivity, RemoteStore};
pub use schema::{FieldKind, FieldSpec, SchemaRegistry, TableSchema};
