//! The reactive store (§3 "Store model", §4.5).
//!
//! An `Arc<Mutex<..>>`-guarded table of ordered handler registrations with
//! incrementing ids, generalized from a single global event bus into a
//! per-plugin store's watcher table, since the core has no event-bus
//! singleton (§1).

pub mod computed;
pub mod history;
pub mod watcher;

use crate::error::{KernelError, StoreError};
use computed::ComputedEntry;
use history::History;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use watcher::{StoreChange, Watcher, WatcherCallback, WatcherId, WatcherTarget};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloneStrategy {
    Structured,
    Manual,
}

/// Per-store configuration, §6 "Store options".
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    pub history: bool,
    pub max_history: usize,
    pub deep: bool,
    pub max_watchers: usize,
    pub max_watchers_per_key: usize,
    pub enable_metrics: bool,
    pub clone_strategy: CloneStrategy,
    pub warn_on_high_watcher_count: bool,
    pub warn_threshold: usize,
    /// Nested-notification depth before `STORE_CYCLE_DETECTED` fires (§5).
    pub max_notify_depth: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions {
            history: true,
            max_history: 50,
            deep: false,
            max_watchers: 1024,
            max_watchers_per_key: 64,
            enable_metrics: false,
            clone_strategy: CloneStrategy::Structured,
            warn_on_high_watcher_count: true,
            warn_threshold: 32,
            max_notify_depth: 100,
        }
    }
}

#[derive(Default, Clone, Copy)]
pub struct StoreMetrics {
    pub writes: u64,
    pub notifications: u64,
    pub watcher_errors: u64,
}

struct StoreInner {
    values: HashMap<String, Value>,
    key_versions: HashMap<String, u64>,
    watchers: Vec<Watcher>,
    next_watcher_id: WatcherId,
    computed: HashMap<u64, ComputedEntry>,
    next_computed_id: u64,
    history: History,
    batch_depth: u32,
    pending: Vec<StoreChange>,
    notify_depth: usize,
    options: StoreOptions,
    metrics: StoreMetrics,
    initial_snapshot: HashMap<String, Value>,
}

impl StoreInner {
    fn key_watcher_count(&self, key: &str) -> usize {
        self.watchers
            .iter()
            .filter(|w| matches!(&w.target, WatcherTarget::Key(k) if k == key))
            .count()
    }
}

/// A cheaply-clonable handle to a plugin's reactive store. Every clone
/// shares the same underlying state; the kernel never hands out direct
/// access to `StoreInner`.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Mutex<StoreInner>>,
}

impl Store {
    pub fn new(initial: Vec<(String, Value)>, options: StoreOptions) -> Self {
        let values: HashMap<String, Value> = initial.into_iter().collect();
        let key_versions = values.keys().map(|k| (k.clone(), 0)).collect();
        let initial_snapshot = values.clone();
        Store {
            inner: Arc::new(Mutex::new(StoreInner {
                values,
                key_versions,
                watchers: Vec::new(),
                next_watcher_id: 1,
                computed: HashMap::new(),
                next_computed_id: 1,
                history: History::new(options.history, options.max_history),
                batch_depth: 0,
                pending: Vec::new(),
                notify_depth: 0,
                options,
                metrics: StoreMetrics::default(),
                initial_snapshot,
            })),
        }
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        self.inner.lock().await.values.get(key).cloned()
    }

    pub async fn snapshot(&self) -> HashMap<String, Value> {
        self.inner.lock().await.values.clone()
    }

    pub async fn metrics(&self) -> StoreMetrics {
        self.inner.lock().await.metrics
    }

    /// A direct write (§4.5 "Property access"). Outside a batch/transaction
    /// this fires watchers synchronously before returning.
    pub async fn set(&self, key: &str, value: Value) -> Result<(), KernelError> {
        let change = {
            let mut inner = self.inner.lock().await;
            let old_value = inner.values.get(key).cloned();
            let equal = match old_value.as_ref() {
                Some(old) if inner.options.deep => old == &value,
                Some(old) => old == &value,
                None => false,
            };
            if equal {
                return Ok(());
            }
            inner.values.insert(key.to_string(), value.clone());
            *inner.key_versions.entry(key.to_string()).or_insert(0) += 1;
            inner.metrics.writes += 1;
            let change = StoreChange {
                key: key.to_string(),
                old_value,
                new_value: value,
                timestamp: std::time::SystemTime::now(),
            };
            inner.history.record(change.clone());
            if inner.batch_depth > 0 {
                inner.pending.push(change);
                return Ok(());
            }
            change
        };
        self.notify_one(change).await
    }

    async fn notify_one(&self, change: StoreChange) -> Result<(), KernelError> {
        self.enter_notify().await?;
        let (key_watchers, wildcard_watchers, batch_watchers) = {
            let inner = self.inner.lock().await;
            self.collect_watchers(&inner, &change.key)
        };
        for cb in key_watchers.into_iter().chain(wildcard_watchers) {
            self.invoke_change(&cb, change.clone()).await;
        }
        for cb in batch_watchers {
            self.invoke_batch(&cb, vec![change.clone()]).await;
        }
        self.recompute_computed().await;
        self.exit_notify().await;
        Ok(())
    }

    fn collect_watchers(
        &self,
        inner: &StoreInner,
        key: &str,
    ) -> (Vec<WatcherCallback>, Vec<WatcherCallback>, Vec<WatcherCallback>) {
        let mut keyed = Vec::new();
        let mut wildcard = Vec::new();
        let mut batch = Vec::new();
        for w in &inner.watchers {
            match &w.target {
                WatcherTarget::Key(k) if k == key => keyed.push(w.callback.clone()),
                WatcherTarget::Wildcard => wildcard.push(w.callback.clone()),
                WatcherTarget::Batch => batch.push(w.callback.clone()),
                _ => {}
            }
        }
        (keyed, wildcard, batch)
    }

    async fn invoke_change(&self, cb: &WatcherCallback, change: StoreChange) {
        if let WatcherCallback::Change(f) = cb {
            f(change).await;
            let mut inner = self.inner.lock().await;
            inner.metrics.notifications += 1;
        }
    }

    async fn invoke_batch(&self, cb: &WatcherCallback, changes: Vec<StoreChange>) {
        if let WatcherCallback::Batch(f) = cb {
            f(changes).await;
            let mut inner = self.inner.lock().await;
            inner.metrics.notifications += 1;
        }
    }

    async fn enter_notify(&self) -> Result<(), KernelError> {
        let mut inner = self.inner.lock().await;
        inner.notify_depth += 1;
        if inner.notify_depth > inner.options.max_notify_depth {
            let max = inner.options.max_notify_depth;
            inner.notify_depth -= 1;
            return Err(KernelError::from(StoreError::CycleDetected { max }));
        }
        Ok(())
    }

    async fn exit_notify(&self) {
        let mut inner = self.inner.lock().await;
        inner.notify_depth = inner.notify_depth.saturating_sub(1);
    }

    /// Runs `f` with all writes deferred until it returns, then delivers one
    /// ordered notification round (§4.5 "Inside batch(fn)").
    pub async fn batch<F, Fut, T>(&self, f: F) -> Result<T, KernelError>
    where
        F: FnOnce(Store) -> Fut,
        Fut: Future<Output = T>,
    {
        {
            let mut inner = self.inner.lock().await;
            inner.batch_depth += 1;
        }
        let result = f(self.clone()).await;
        let to_flush = {
            let mut inner = self.inner.lock().await;
            inner.batch_depth -= 1;
            if inner.batch_depth == 0 {
                Some(std::mem::take(&mut inner.pending))
            } else {
                None
            }
        };
        if let Some(changes) = to_flush {
            self.flush(changes).await?;
        }
        Ok(result)
    }

    /// Runs `f`; on `Err`, restores the pre-transaction state and delivers no
    /// notifications. On `Ok`, delivers as if it were a batch (§4.5 "Inside
    /// transaction(fn)"). `cloneStrategy` governs how the pre-state is
    /// captured: `Structured` clones the whole value map up front (safe,
    /// but pays the clone cost even when nothing changes); `Manual` takes no
    /// upfront snapshot and instead replays this transaction's own pending
    /// writes in reverse using their recorded `old_value`, restoring the
    /// same end state at a lower cost for large stores with small writes.
    pub async fn transaction<F, Fut, T>(&self, f: F) -> Result<T, KernelError>
    where
        F: FnOnce(Store) -> Fut,
        Fut: Future<Output = Result<T, KernelError>>,
    {
        let (snapshot, pending_len, clone_strategy) = {
            let mut inner = self.inner.lock().await;
            inner.batch_depth += 1;
            let snapshot = match inner.options.clone_strategy {
                CloneStrategy::Structured => Some(inner.values.clone()),
                CloneStrategy::Manual => None,
            };
            (snapshot, inner.pending.len(), inner.options.clone_strategy)
        };
        let result = f(self.clone()).await;
        match result {
            Ok(value) => {
                let to_flush = {
                    let mut inner = self.inner.lock().await;
                    inner.batch_depth -= 1;
                    if inner.batch_depth == 0 {
                        Some(std::mem::take(&mut inner.pending))
                    } else {
                        None
                    }
                };
                if let Some(changes) = to_flush {
                    self.flush(changes).await?;
                }
                Ok(value)
            }
            Err(err) => {
                let mut inner = self.inner.lock().await;
                match clone_strategy {
                    CloneStrategy::Structured => {
                        inner.values = snapshot.expect("snapshot captured for Structured strategy");
                    }
                    CloneStrategy::Manual => {
                        for change in inner.pending[pending_len..].to_vec().into_iter().rev() {
                            match change.old_value {
                                Some(old) => {
                                    inner.values.insert(change.key.clone(), old);
                                }
                                None => {
                                    inner.values.remove(&change.key);
                                }
                            }
                        }
                    }
                }
                inner.pending.truncate(pending_len);
                inner.batch_depth -= 1;
                Err(err)
            }
        }
    }

    async fn flush(&self, changes: Vec<StoreChange>) -> Result<(), KernelError> {
        if changes.is_empty() {
            return Ok(());
        }
        self.enter_notify().await?;
        let (key_groups, wildcard, batch): (HashMap<String, Vec<WatcherCallback>>, Vec<WatcherCallback>, Vec<WatcherCallback>) = {
            let inner = self.inner.lock().await;
            let mut key_groups: HashMap<String, Vec<WatcherCallback>> = HashMap::new();
            let mut wildcard = Vec::new();
            let mut batch = Vec::new();
            for w in &inner.watchers {
                match &w.target {
                    WatcherTarget::Key(k) => key_groups.entry(k.clone()).or_default().push(w.callback.clone()),
                    WatcherTarget::Wildcard => wildcard.push(w.callback.clone()),
                    WatcherTarget::Batch => batch.push(w.callback.clone()),
                    _ => {}
                }
            }
            (key_groups, wildcard, batch)
        };
        for change in &changes {
            if let Some(cbs) = key_groups.get(&change.key) {
                for cb in cbs {
                    self.invoke_change(cb, change.clone()).await;
                }
            }
            for cb in &wildcard {
                self.invoke_change(cb, change.clone()).await;
            }
        }
        for cb in &batch {
            self.invoke_batch(cb, changes.clone()).await;
        }
        self.recompute_computed().await;
        self.exit_notify().await;
        Ok(())
    }

    /// Registers a per-key watcher; fails with `STORE_WATCHER_LIMIT` if
    /// either the global or per-key cap is exceeded.
    pub async fn watch(&self, key: &str, callback: WatcherCallback) -> Result<WatcherId, KernelError> {
        self.register(WatcherTarget::Key(key.to_string()), callback).await
    }

    pub async fn watch_all(&self, callback: WatcherCallback) -> Result<WatcherId, KernelError> {
        self.register(WatcherTarget::Wildcard, callback).await
    }

    pub async fn watch_batch(&self, callback: WatcherCallback) -> Result<WatcherId, KernelError> {
        self.register(WatcherTarget::Batch, callback).await
    }

    async fn register(&self, target: WatcherTarget, callback: WatcherCallback) -> Result<WatcherId, KernelError> {
        let mut inner = self.inner.lock().await;
        if inner.watchers.len() >= inner.options.max_watchers {
            return Err(KernelError::from(StoreError::WatcherLimit {
                max: inner.options.max_watchers,
            }));
        }
        if let WatcherTarget::Key(ref k) = target {
            let count = inner.key_watcher_count(k);
            if count >= inner.options.max_watchers_per_key {
                return Err(KernelError::from(StoreError::WatcherLimitPerKey {
                    key: k.clone(),
                    max: inner.options.max_watchers_per_key,
                }));
            }
            if inner.options.warn_on_high_watcher_count && count + 1 > inner.options.warn_threshold {
                tracing::warn!(key = %k, count = count + 1, "watcher count for key exceeds warn threshold");
            }
        }
        let id = inner.next_watcher_id;
        inner.next_watcher_id += 1;
        inner.watchers.push(Watcher { id, target, callback });
        Ok(id)
    }

    pub async fn unwatch(&self, id: WatcherId) -> bool {
        let mut inner = self.inner.lock().await;
        let before = inner.watchers.len();
        inner.watchers.retain(|w| w.id != id);
        inner.watchers.len() < before
    }

    /// Registers a memoised computed value; returns its id and current
    /// value (§4.5 "Computed values").
    pub async fn computed(&self, selector: computed::Selector) -> (u64, Value) {
        let mut inner = self.inner.lock().await;
        let id = inner.next_computed_id;
        inner.next_computed_id += 1;
        let mut entry = ComputedEntry::new(id, selector);
        let (value, _) = entry.evaluate(&inner.values, &inner.key_versions);
        inner.computed.insert(id, entry);
        (id, value)
    }

    /// Re-reads a computed value, recomputing only if a read key changed.
    pub async fn computed_value(&self, id: u64) -> Option<Value> {
        let mut inner = self.inner.lock().await;
        let StoreInner {
            ref values,
            ref key_versions,
            ref mut computed,
            ..
        } = *inner;
        let entry = computed.get_mut(&id)?;
        let (value, _) = entry.evaluate(values, key_versions);
        Some(value)
    }

    async fn recompute_computed(&self) {
        let mut fired: Vec<(WatcherCallback, Value)> = Vec::new();
        {
            let mut inner = self.inner.lock().await;
            let StoreInner {
                ref values,
                ref key_versions,
                ref mut computed,
                ref watchers,
                ..
            } = *inner;
            for entry in computed.values_mut() {
                let (value, changed) = entry.evaluate(values, key_versions);
                if changed {
                    for w in watchers.iter() {
                        if w.target == WatcherTarget::Computed(entry.id) {
                            fired.push((w.callback.clone(), value.clone()));
                        }
                    }
                }
            }
        }
        for (cb, value) in fired {
            if let WatcherCallback::Computed(f) = cb {
                f(value).await;
            }
        }
    }

    /// Undoes the most recent change, notifying as a single write.
    pub async fn undo(&self) -> Result<bool, KernelError> {
        let change = {
            let mut inner = self.inner.lock().await;
            inner.history.pop_for_undo()
        };
        let Some(change) = change else {
            return Ok(false);
        };
        self.apply_restore(&change.key, change.old_value.clone()).await?;
        Ok(true)
    }

    /// Re-applies the most recently undone change.
    pub async fn redo(&self) -> Result<bool, KernelError> {
        let change = {
            let mut inner = self.inner.lock().await;
            inner.history.pop_for_redo()
        };
        let Some(change) = change else {
            return Ok(false);
        };
        self.apply_restore(&change.key, Some(change.new_value.clone())).await?;
        Ok(true)
    }

    async fn apply_restore(&self, key: &str, value: Option<Value>) -> Result<(), KernelError> {
        let change = {
            let mut inner = self.inner.lock().await;
            let old_value = inner.values.get(key).cloned();
            match value {
                Some(v) => {
                    inner.values.insert(key.to_string(), v.clone());
                    *inner.key_versions.entry(key.to_string()).or_insert(0) += 1;
                    StoreChange {
                        key: key.to_string(),
                        old_value,
                        new_value: v,
                        timestamp: std::time::SystemTime::now(),
                    }
                }
                None => {
                    inner.values.remove(key);
                    *inner.key_versions.entry(key.to_string()).or_insert(0) += 1;
                    StoreChange {
                        key: key.to_string(),
                        old_value,
                        new_value: Value::Null,
                        timestamp: std::time::SystemTime::now(),
                    }
                }
            }
        };
        self.notify_one(change).await
    }

    /// Rewinds to the snapshot captured at construction, clearing history.
    pub async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        inner.values = inner.initial_snapshot.clone();
        inner.history.clear();
        for (k, v) in inner.key_versions.iter_mut() {
            let _ = k;
            *v += 1;
        }
    }

    pub async fn history_len(&self) -> usize {
        self.inner.lock().await.history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options_with(clone_strategy: CloneStrategy) -> StoreOptions {
        StoreOptions {
            clone_strategy,
            ..StoreOptions::default()
        }
    }

    #[tokio::test]
    async fn structured_strategy_restores_pre_state_on_error() {
        let store = Store::new(vec![("x".to_string(), Value::from(1))], options_with(CloneStrategy::Structured));
        let err = store
            .transaction(|s| async move {
                s.set("x", Value::from(10)).await?;
                s.set("y", Value::from(20)).await?;
                Err::<(), KernelError>(KernelError::new(crate::error::KernelErrorKind::Other("boom".to_string())))
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string().is_empty(), false);
        assert_eq!(store.get("x").await, Some(Value::from(1)));
        assert_eq!(store.get("y").await, None);
    }

    #[tokio::test]
    async fn manual_strategy_restores_pre_state_on_error_without_snapshot() {
        let store = Store::new(vec![("x".to_string(), Value::from(1))], options_with(CloneStrategy::Manual));
        let err = store
            .transaction(|s| async move {
                s.set("x", Value::from(10)).await?;
                s.set("y", Value::from(20)).await?;
                Err::<(), KernelError>(KernelError::new(crate::error::KernelErrorKind::Other("boom".to_string())))
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string().is_empty(), false);
        assert_eq!(store.get("x").await, Some(Value::from(1)));
        assert_eq!(store.get("y").await, None);
    }

    #[tokio::test]
    async fn manual_strategy_delivers_no_notification_on_rollback() {
        let store = Store::new(vec![("x".to_string(), Value::from(1))], options_with(CloneStrategy::Manual));
        let fired = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counted = fired.clone();
        store
            .watch_all(watcher::sync_change_watcher(move |_change| {
                counted.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }))
            .await
            .unwrap();
        let _ = store
            .transaction(|s| async move {
                s.set("x", Value::from(10)).await?;
                Err::<(), KernelError>(KernelError::new(crate::error::KernelErrorKind::Other("boom".to_string())))
            })
            .await;
        assert_eq!(fired.load(std::sync::atomic::Ordering::SeqCst), 0);
    }
}
