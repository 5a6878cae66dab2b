//! Change-notification fan-out with bounded reconnection.
//!
//! One pump task per table holds the single remote stream; every local
//! subscriber shares it. Callbacks for a table fire in receipt order, never
//! reordered or coalesced. When the stream dies, the pump reconnects with
//! capped exponential backoff; after a bounded number of consecutive
//! failures it fans out a sync-lost event instead of retrying forever.

use crate::config::SyncConfig;
use crate::remote::RemoteStore;
use dispatch_types::ChangeEvent;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// What a subscriber's callback receives.
#[derive(Clone, Debug)]
pub enum BusEvent {
    Change(ChangeEvent),
    /// The table's stream exhausted its reconnection budget. Subscribers
    /// decide what to surface; the bus will not retry on its own again.
    SyncLost { table: String, attempts: u32 },
}

/// Connection state of one table's stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeedState {
    Disconnected,
    Connecting,
    Subscribed,
    Error,
}

type Callback = Arc<dyn Fn(&BusEvent) + Send + Sync>;

struct SubscriberEntry {
    id: Uuid,
    alive: Arc<AtomicBool>,
    callback: Callback,
}

type Subscribers = Arc<Mutex<Vec<SubscriberEntry>>>;

struct TableFeed {
    subscribers: Subscribers,
    state_tx: Arc<watch::Sender<FeedState>>,
    task: JoinHandle<()>,
}

/// Handle representing one consumer's interest in a table. Dropping it
/// silences the callback; [`ChangeBus::unsubscribe`] additionally tears the
/// remote stream down once the last subscriber leaves.
pub struct Subscription {
    id: Uuid,
    table: String,
    alive: Arc<AtomicBool>,
}

impl Subscription {
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn is_live(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Release);
    }
}

/// Subscription registry and remote-stream lifecycle owner.
pub struct ChangeBus {
    remote: Arc<dyn RemoteStore>,
    feeds: Mutex<HashMap<String, TableFeed>>,
    reconnect_base: Duration,
    reconnect_cap: Duration,
    max_attempts: u32,
}

impl ChangeBus {
    pub fn new(remote: Arc<dyn RemoteStore>, config: &SyncConfig) -> Self {
        Self {
            remote,
            feeds: Mutex::new(HashMap::new()),
            reconnect_base: config.retry_base(),
            reconnect_cap: config.reconnect_backoff_cap(),
            max_attempts: config.max_reconnect_attempts,
        }
    }

    /// Registers a callback for a table, establishing the remote stream if
    /// this is the table's first live subscriber.
    pub fn subscribe(
        &self,
        table: &str,
        callback: impl Fn(&BusEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let mut feeds = self.feeds.lock().unwrap();

        // A feed whose pump gave up (sync lost) is respawned by the next
        // subscriber rather than joined dead.
        let stale = feeds.get(table).is_some_and(|f| f.task.is_finished());
        if stale {
            feeds.remove(table);
        }

        let feed = feeds
            .entry(table.to_string())
            .or_insert_with(|| self.spawn_feed(table));

        let id = Uuid::new_v4();
        let alive = Arc::new(AtomicBool::new(true));
        feed.subscribers.lock().unwrap().push(SubscriberEntry {
            id,
            alive: alive.clone(),
            callback: Arc::new(callback),
        });

        Subscription {
            id,
            table: table.to_string(),
            alive,
        }
    }

    /// Removes a subscriber. The remote stream is torn down only when its
    /// last local subscriber unsubscribes.
    pub fn unsubscribe(&self, subscription: &Subscription) {
        subscription.alive.store(false, Ordering::Release);
        let mut feeds = self.feeds.lock().unwrap();
        let empty = match feeds.get(&subscription.table) {
            Some(feed) => {
                let mut subs = feed.subscribers.lock().unwrap();
                subs.retain(|s| s.id != subscription.id);
                subs.is_empty()
            }
            None => false,
        };
        if empty {
            if let Some(feed) = feeds.remove(&subscription.table) {
                debug!("last subscriber left {}, closing stream", subscription.table);
                feed.task.abort();
            }
        }
    }

    /// Synchronously delivers an event to this table's local subscribers.
    /// Called by the coordinator after its own writes, since the remote echo
    /// is not guaranteed to arrive before the UI needs to update.
    pub fn publish_local(&self, event: &ChangeEvent) {
        let subscribers = {
            let feeds = self.feeds.lock().unwrap();
            feeds.get(&event.table).map(|f| f.subscribers.clone())
        };
        if let Some(subscribers) = subscribers {
            fan_out(&subscribers, &BusEvent::Change(event.clone()));
        }
    }

    /// Observes a table's connection state. `None` if no stream exists.
    pub fn feed_state(&self, table: &str) -> Option<watch::Receiver<FeedState>> {
        self.feeds
            .lock()
            .unwrap()
            .get(table)
            .map(|f| f.state_tx.subscribe())
    }

    /// Tears down every stream. Called once at application teardown so
    /// subscriptions never leak across page-navigation cycles.
    pub fn shutdown(&self) {
        let mut feeds = self.feeds.lock().unwrap();
        for (table, feed) in feeds.drain() {
            debug!("shutting down change stream for {table}");
            feed.task.abort();
            for sub in feed.subscribers.lock().unwrap().iter() {
                sub.alive.store(false, Ordering::Release);
            }
        }
    }

    fn spawn_feed(&self, table: &str) -> TableFeed {
        let subscribers: Subscribers = Arc::default();
        let (state_tx, _) = watch::channel(FeedState::Disconnected);
        let state_tx = Arc::new(state_tx);

        let task = tokio::spawn(pump(
            self.remote.clone(),
            table.to_string(),
            subscribers.clone(),
            state_tx.clone(),
            self.reconnect_base,
            self.reconnect_cap,
            self.max_attempts,
        ));

        TableFeed {
            subscribers,
            state_tx,
            task,
        }
    }
}

/// Per-table pump: holds the remote stream, fans events out in receipt
/// order, and reconnects with capped backoff when the stream dies.
async fn pump(
    remote: Arc<dyn RemoteStore>,
    table: String,
    subscribers: Subscribers,
    state: Arc<watch::Sender<FeedState>>,
    base: Duration,
    cap: Duration,
    max_attempts: u32,
) {
    let mut attempts: u32 = 0;
    loop {
        state.send_replace(FeedState::Connecting);
        match remote.open_changes(&table).await {
            Ok(mut rx) => {
                state.send_replace(FeedState::Subscribed);
                attempts = 0;
                while let Some(event) = rx.recv().await {
                    fan_out(&subscribers, &BusEvent::Change(event));
                }
                debug!("change stream for {table} ended");
            }
            Err(e) => {
                warn!("change stream connect for {table} failed: {e}");
            }
        }

        state.send_replace(FeedState::Error);
        attempts += 1;
        if attempts >= max_attempts {
            error!("giving up on change stream for {table} after {attempts} attempts");
            fan_out(
                &subscribers,
                &BusEvent::SyncLost {
                    table: table.clone(),
                    attempts,
                },
            );
            state.send_replace(FeedState::Disconnected);
            return;
        }

        let backoff = reconnect_backoff(base, cap, attempts);
        debug!("reconnecting change stream for {table} in {backoff:?}");
        tokio::time::sleep(backoff).await;
    }
}

/// Callbacks run outside the subscriber lock: a callback is allowed to
/// subscribe or unsubscribe (itself included) without deadlocking the
/// publisher.
fn fan_out(subscribers: &Subscribers, event: &BusEvent) {
    let snapshot: Vec<(Arc<AtomicBool>, Callback)> = {
        let subs = subscribers.lock().unwrap();
        subs.iter()
            .map(|s| (s.alive.clone(), s.callback.clone()))
            .collect()
    };
    for (alive, callback) in snapshot {
        if alive.load(Ordering::Acquire) {
            callback(event);
        }
    }
}

fn reconnect_backoff(base: Duration, cap: Duration, attempt: u32) -> Duration {
    let exp = base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1).min(16)));
    exp.min(cap)
}
