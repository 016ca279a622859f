//! Watcher registration and notification callbacks (§4.5).

use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::SystemTime;

pub type WatcherId = u64;
pub type NotifyFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// One observed write: the key that changed, its previous and new value.
#[derive(Debug, Clone)]
pub struct StoreChange {
    pub key: String,
    pub old_value: Option<Value>,
    pub new_value: Value,
    pub timestamp: SystemTime,
}

/// What a watcher is registered against.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum WatcherTarget {
    Key(String),
    Wildcard,
    Batch,
    Computed(u64),
}

#[derive(Clone)]
pub enum WatcherCallback {
    Change(Arc<dyn Fn(StoreChange) -> NotifyFuture + Send + Sync>),
    Batch(Arc<dyn Fn(Vec<StoreChange>) -> NotifyFuture + Send + Sync>),
    Computed(Arc<dyn Fn(Value) -> NotifyFuture + Send + Sync>),
}

impl fmt::Debug for WatcherCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WatcherCallback(..)")
    }
}

#[derive(Clone)]
pub struct Watcher {
    pub id: WatcherId,
    pub target: WatcherTarget,
    pub callback: WatcherCallback,
}

/// Wraps a synchronous per-change callback for `watch(key, ..)`/`watch_all`.
pub fn sync_change_watcher<F>(f: F) -> WatcherCallback
where
    F: Fn(StoreChange) + Send + Sync + 'static,
{
    WatcherCallback::Change(Arc::new(move |change| {
        f(change);
        Box::pin(async {})
    }))
}

/// Wraps a synchronous full-batch callback for `watch_batch`.
pub fn sync_batch_watcher<F>(f: F) -> WatcherCallback
where
    F: Fn(Vec<StoreChange>) + Send + Sync + 'static,
{
    WatcherCallback::Batch(Arc::new(move |changes| {
        f(changes);
        Box::pin(async {})
    }))
}

/// Wraps a synchronous computed-value callback.
pub fn sync_computed_watcher<F>(f: F) -> WatcherCallback
where
    F: Fn(Value) + Send + Sync + 'static,
{
    WatcherCallback::Computed(Arc::new(move |value| {
        f(value);
        Box::pin(async {})
    }))
}
