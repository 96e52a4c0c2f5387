//! Observable client state backed by durable storage.
//!
//! # Design
//! A `Store<T>` holds one authoritative in-memory value, mirrors it to a
//! `Storage` backend under a fixed key, and notifies observers after every
//! change. The in-memory value is the source of truth for the process
//! lifetime; storage is best-effort and only read back by
//! `load_from_storage` at startup.
//!
//! Writes are numbered as they reach memory. Persistence runs behind a
//! per-store gate and skips any write older than the last one persisted, so
//! overlapping `set` calls always leave storage holding the newest value.
//!
//! Observers receive no payload and re-read through `snapshot()`. They are
//! called after the value is updated and after every lock is released, so a
//! snapshot taken inside an observer always sees the new value and observers
//! may subscribe or unsubscribe while being notified.

mod projects;
mod session;

pub use projects::ProjectStore;
pub use session::SessionStore;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::storage::Storage;

/// Lifecycle of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    Uninitialized,
    Loading,
    Ready,
    Cleared,
}

type Observer = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Observers {
    next_id: AtomicU64,
    list: Mutex<Vec<(u64, Observer)>>,
}

impl Observers {
    fn add(&self, observer: Observer) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.list
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, observer));
        id
    }

    fn remove(&self, id: u64) {
        self.list
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(existing, _)| *existing != id);
    }

    fn len(&self) -> usize {
        self.list.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn notify(&self) {
        let current: Vec<Observer> = self
            .list
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();
        for observer in current {
            observer();
        }
    }
}

/// Handle returned by `Store::subscribe`. Dropping it, or calling
/// `unsubscribe`, deregisters the observer.
#[must_use = "dropping a Subscription unsubscribes the observer"]
pub struct Subscription {
    id: u64,
    observers: Weak<Observers>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(observers) = self.observers.upgrade() {
            observers.remove(self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

struct Inner<T> {
    value: RwLock<T>,
    state: RwLock<StoreState>,
    revision: AtomicU64,
    /// Revision last written to storage.
    persisted: tokio::sync::Mutex<u64>,
}

/// What `persist` should do with the durable entry.
enum Durable {
    Write(Result<String, serde_json::Error>),
    Remove,
}

/// Observable value persisted under `key`.
pub struct Store<T> {
    key: String,
    storage: Arc<dyn Storage>,
    inner: Arc<Inner<T>>,
    observers: Arc<Observers>,
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            storage: self.storage.clone(),
            inner: self.inner.clone(),
            observers: self.observers.clone(),
        }
    }
}

impl<T> fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("key", &self.key)
            .field("state", &self.state())
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl<T> Store<T> {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn state(&self) -> StoreState {
        *self.inner.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.observers.add(Arc::new(observer));
        Subscription {
            id,
            observers: Arc::downgrade(&self.observers),
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    fn set_state(&self, state: StoreState) {
        *self.inner.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

impl<T> Store<T>
where
    T: Default + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(key: impl Into<String>, storage: Arc<dyn Storage>) -> Self {
        Self {
            key: key.into(),
            storage,
            inner: Arc::new(Inner {
                value: RwLock::new(T::default()),
                state: RwLock::new(StoreState::Uninitialized),
                revision: AtomicU64::new(0),
                persisted: tokio::sync::Mutex::new(0),
            }),
            observers: Arc::new(Observers::default()),
        }
    }

    /// Current value. Never blocks on I/O.
    pub fn snapshot(&self) -> T {
        self.inner
            .value
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Read a projection of the current value without cloning all of it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let value = self.inner.value.read().unwrap_or_else(PoisonError::into_inner);
        f(&*value)
    }

    /// Replace the value, persist it, then notify observers.
    ///
    /// `snapshot()` returns the new value once this starts running, while
    /// the write to storage is still in flight.
    pub async fn set(&self, value: T) {
        let serialized = serde_json::to_string(&value);
        let revision = {
            let mut current = self.inner.value.write().unwrap_or_else(PoisonError::into_inner);
            *current = value;
            self.next_revision()
        };
        self.set_state(StoreState::Ready);
        self.persist(revision, Durable::Write(serialized)).await;
        self.observers.notify();
    }

    /// Modify the value in place, then persist and notify like `set`.
    pub async fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut T),
    {
        let (serialized, revision) = {
            let mut value = self.inner.value.write().unwrap_or_else(PoisonError::into_inner);
            f(&mut *value);
            let serialized = serde_json::to_string(&*value);
            (serialized, self.next_revision())
        };
        self.set_state(StoreState::Ready);
        self.persist(revision, Durable::Write(serialized)).await;
        self.observers.notify();
    }

    /// Reset to the default value, drop the durable entry, notify.
    pub async fn clear(&self) {
        let revision = {
            let mut current = self.inner.value.write().unwrap_or_else(PoisonError::into_inner);
            *current = T::default();
            self.next_revision()
        };
        self.set_state(StoreState::Cleared);
        self.persist(revision, Durable::Remove).await;
        self.observers.notify();
    }

    /// Hydrate from storage. Returns whether a stored value was applied.
    ///
    /// A present value is applied and observers are notified once. An absent,
    /// unreadable or corrupt value leaves the current value alone and
    /// notifies nobody.
    pub async fn load_from_storage(&self) -> bool {
        self.load_from_storage_with(|_| {}).await
    }

    /// Like `load_from_storage`, but `before_apply` sees the stored value
    /// before it replaces the current one and before any observer runs.
    pub async fn load_from_storage_with<F>(&self, before_apply: F) -> bool
    where
        F: FnOnce(&T),
    {
        let previous = self.state();
        self.set_state(StoreState::Loading);

        let stored = match self.storage.get(&self.key).await {
            Ok(stored) => stored,
            Err(err) => {
                warn!(key = %self.key, error = %err, "failed to read persisted state");
                None
            }
        };
        let parsed = stored.and_then(|text| match serde_json::from_str::<T>(&text) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(key = %self.key, error = %err, "ignoring corrupt persisted state");
                None
            }
        });

        match parsed {
            Some(value) => {
                before_apply(&value);
                *self.inner.value.write().unwrap_or_else(PoisonError::into_inner) = value;
                self.set_state(StoreState::Ready);
                debug!(key = %self.key, "hydrated from storage");
                self.observers.notify();
                true
            }
            None => {
                let state = match previous {
                    StoreState::Uninitialized | StoreState::Loading => StoreState::Ready,
                    other => other,
                };
                self.set_state(state);
                false
            }
        }
    }

    /// Must be called with the value lock held.
    fn next_revision(&self) -> u64 {
        self.inner.revision.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn persist(&self, revision: u64, durable: Durable) {
        let mut persisted = self.inner.persisted.lock().await;
        if *persisted > revision {
            debug!(key = %self.key, revision, latest = *persisted, "skipping superseded write");
            return;
        }
        let result = match durable {
            Durable::Write(Ok(text)) => self.storage.set(&self.key, &text).await.map_err(|e| e.to_string()),
            Durable::Write(Err(err)) => Err(err.to_string()),
            Durable::Remove => self.storage.remove(&self.key).await.map_err(|e| e.to_string()),
        };
        *persisted = revision;
        if let Err(err) = result {
            warn!(key = %self.key, revision, error = %err, "failed to persist state");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde::Deserialize;
    use tokio::sync::Notify;

    use super::*;
    use crate::error::StorageError;
    use crate::storage::MemoryStorage;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Profile {
        id: String,
        name: String,
    }

    fn ana() -> Profile {
        Profile {
            id: "u1".to_string(),
            name: "Ana".to_string(),
        }
    }

    struct BrokenStorage;

    #[async_trait]
    impl Storage for BrokenStorage {
        async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Backend(format!("cannot read {key}")))
        }
        async fn set(&self, key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Backend(format!("cannot write {key}")))
        }
        async fn remove(&self, key: &str) -> Result<(), StorageError> {
            Err(StorageError::Backend(format!("cannot remove {key}")))
        }
    }

    /// Writes containing `slow` take 50ms; everything else is immediate.
    struct UnevenStorage {
        inner: MemoryStorage,
        slow: &'static str,
    }

    #[async_trait]
    impl Storage for UnevenStorage {
        async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.inner.get(key).await
        }
        async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            if value.contains(self.slow) {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            self.inner.set(key, value).await
        }
        async fn remove(&self, key: &str) -> Result<(), StorageError> {
            self.inner.remove(key).await
        }
    }

    /// Holds every write until `release` is notified.
    #[derive(Default)]
    struct GatedStorage {
        inner: MemoryStorage,
        started: Notify,
        release: Notify,
    }

    #[async_trait]
    impl Storage for GatedStorage {
        async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.inner.get(key).await
        }
        async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            self.started.notify_one();
            self.release.notified().await;
            self.inner.set(key, value).await
        }
        async fn remove(&self, key: &str) -> Result<(), StorageError> {
            self.inner.remove(key).await
        }
    }

    fn counter(store: &Store<Option<Profile>>) -> (Arc<AtomicUsize>, Subscription) {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        let sub = store.subscribe(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (hits, sub)
    }

    #[tokio::test]
    async fn set_updates_snapshot_and_storage() {
        let storage = Arc::new(MemoryStorage::new());
        let store: Store<Option<Profile>> = Store::new("banagochi.profile", storage.clone());
        assert_eq!(store.state(), StoreState::Uninitialized);

        store.set(Some(ana())).await;

        assert_eq!(store.snapshot(), Some(ana()));
        assert_eq!(store.state(), StoreState::Ready);
        let stored = storage.get("banagochi.profile").await.unwrap().unwrap();
        let parsed: Profile = serde_json::from_str(&stored).unwrap();
        assert_eq!(parsed, ana());
    }

    #[tokio::test]
    async fn every_observer_fires_once_per_set() {
        let store: Store<Option<Profile>> = Store::new("k", Arc::new(MemoryStorage::new()));
        let (a, _sa) = counter(&store);
        let (b, _sb) = counter(&store);
        let (c, _sc) = counter(&store);

        store.set(Some(ana())).await;

        for hits in [a, b, c] {
            assert_eq!(hits.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn observers_see_the_new_value() {
        let store: Store<Option<Profile>> = Store::new("k", Arc::new(MemoryStorage::new()));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let reader = store.clone();
        let log = seen.clone();
        let _sub = store.subscribe(move || {
            log.lock().unwrap().push(reader.snapshot());
        });

        store.set(Some(ana())).await;
        store.clear().await;

        assert_eq!(*seen.lock().unwrap(), vec![Some(ana()), None]);
    }

    #[tokio::test]
    async fn unsubscribed_observer_is_never_called_again() {
        let store: Store<Option<Profile>> = Store::new("k", Arc::new(MemoryStorage::new()));
        let (gone, sub) = counter(&store);
        let (kept, _kept_sub) = counter(&store);

        store.set(Some(ana())).await;
        sub.unsubscribe();
        store.set(None).await;
        store.clear().await;

        assert_eq!(gone.load(Ordering::SeqCst), 1);
        assert_eq!(kept.load(Ordering::SeqCst), 3);
        assert_eq!(store.observer_count(), 1);
    }

    #[tokio::test]
    async fn dropping_the_subscription_unsubscribes() {
        let store: Store<Option<Profile>> = Store::new("k", Arc::new(MemoryStorage::new()));
        {
            let (_hits, _sub) = counter(&store);
            assert_eq!(store.observer_count(), 1);
        }
        assert_eq!(store.observer_count(), 0);
    }

    #[tokio::test]
    async fn observer_may_unsubscribe_itself() {
        let store: Store<Option<Profile>> = Store::new("k", Arc::new(MemoryStorage::new()));
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let hits = Arc::new(AtomicUsize::new(0));
        let (slot_in, hits_in) = (slot.clone(), hits.clone());
        let sub = store.subscribe(move || {
            hits_in.fetch_add(1, Ordering::SeqCst);
            slot_in.lock().unwrap().take();
        });
        *slot.lock().unwrap() = Some(sub);

        store.set(Some(ana())).await;
        store.set(None).await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn clear_removes_the_durable_entry() {
        let storage = Arc::new(MemoryStorage::new());
        let store: Store<Option<Profile>> = Store::new("k", storage.clone());
        let (hits, _sub) = counter(&store);
        store.set(Some(ana())).await;

        store.clear().await;

        assert_eq!(store.snapshot(), None);
        assert_eq!(store.state(), StoreState::Cleared);
        assert_eq!(storage.get("k").await.unwrap(), None);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn persistence_failure_keeps_memory_value() {
        let store: Store<Option<Profile>> = Store::new("k", Arc::new(BrokenStorage));
        let (hits, _sub) = counter(&store);

        store.set(Some(ana())).await;
        assert_eq!(store.snapshot(), Some(ana()));
        store.clear().await;
        assert_eq!(store.snapshot(), None);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn load_without_stored_value_is_silent() {
        let store: Store<Option<Profile>> = Store::new("k", Arc::new(MemoryStorage::new()));
        let (hits, _sub) = counter(&store);

        assert!(!store.load_from_storage().await);

        assert_eq!(store.snapshot(), None);
        assert_eq!(store.state(), StoreState::Ready);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn load_applies_stored_value_once() {
        let stored = serde_json::to_string(&Some(ana())).unwrap();
        let storage = Arc::new(MemoryStorage::with_entries([("k", stored)]));
        let store: Store<Option<Profile>> = Store::new("k", storage);
        let (hits, _sub) = counter(&store);

        assert!(store.load_from_storage().await);

        assert_eq!(store.snapshot(), Some(ana()));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn corrupt_or_unreadable_storage_is_ignored() {
        let storage = Arc::new(MemoryStorage::with_entries([("k", "{not json")]));
        let store: Store<Option<Profile>> = Store::new("k", storage);
        assert!(!store.load_from_storage().await);
        assert_eq!(store.snapshot(), None);

        let broken: Store<Option<Profile>> = Store::new("k", Arc::new(BrokenStorage));
        assert!(!broken.load_from_storage().await);
        assert_eq!(broken.state(), StoreState::Ready);
    }

    #[tokio::test]
    async fn update_modifies_in_place() {
        let store: Store<Vec<u32>> = Store::new("numbers", Arc::new(MemoryStorage::new()));
        store.set(vec![1, 2]).await;
        store.update(|v| v.push(3)).await;
        assert_eq!(store.snapshot(), vec![1, 2, 3]);
        assert_eq!(store.with(|v| v.len()), 3);
    }

    #[tokio::test]
    async fn snapshot_sees_a_set_before_it_is_persisted() {
        let storage = Arc::new(GatedStorage::default());
        let store: Store<Option<Profile>> = Store::new("k", storage.clone());
        let (hits, _sub) = counter(&store);

        let writer = tokio::spawn({
            let store = store.clone();
            async move { store.set(Some(ana())).await }
        });
        storage.started.notified().await;

        assert_eq!(store.snapshot(), Some(ana()));
        assert_eq!(storage.get("k").await.unwrap(), None);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(!writer.is_finished());

        storage.release.notify_one();
        writer.await.unwrap();
        assert!(storage.get("k").await.unwrap().is_some());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_sets_persist_the_newest_value() {
        let storage = Arc::new(UnevenStorage {
            inner: MemoryStorage::new(),
            slow: "first",
        });
        let store: Store<String> = Store::new("k", storage.clone());

        tokio::join!(store.set("first".to_string()), store.set("second".to_string()));

        assert_eq!(store.snapshot(), "second");
        assert_eq!(storage.get("k").await.unwrap().as_deref(), Some(r#""second""#));
    }

    #[tokio::test(start_paused = true)]
    async fn clear_after_a_slow_set_leaves_storage_empty() {
        let storage = Arc::new(UnevenStorage {
            inner: MemoryStorage::new(),
            slow: "Ana",
        });
        let store: Store<Option<Profile>> = Store::new("k", storage.clone());

        tokio::join!(store.set(Some(ana())), store.clear());

        assert_eq!(store.snapshot(), None);
        assert_eq!(storage.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn load_hook_runs_before_observers() {
        let stored = serde_json::to_string(&Some(ana())).unwrap();
        let store: Store<Option<Profile>> = Store::new("k", Arc::new(MemoryStorage::with_entries([("k", stored)])));
        let order = Arc::new(Mutex::new(Vec::new()));
        let log = order.clone();
        let _sub = store.subscribe(move || log.lock().unwrap().push("observer"));

        let applied = store
            .load_from_storage_with(|value| {
                assert_eq!(value.as_ref(), Some(&ana()));
                order.lock().unwrap().push("hook");
            })
            .await;

        assert!(applied);
        assert_eq!(*order.lock().unwrap(), vec!["hook", "observer"]);
    }
}
