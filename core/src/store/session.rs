use std::sync::Arc;

use super::{Store, StoreState, Subscription};
use crate::storage::Storage;
use crate::types::{Session, User};

/// The signed-in user and token, persisted across restarts.
#[derive(Debug, Clone)]
pub struct SessionStore {
    store: Store<Option<Session>>,
}

impl SessionStore {
    pub const KEY: &'static str = "banagochi.session";

    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            store: Store::new(Self::KEY, storage),
        }
    }

    pub fn store(&self) -> &Store<Option<Session>> {
        &self.store
    }

    pub fn snapshot(&self) -> Option<Session> {
        self.store.snapshot()
    }

    pub fn state(&self) -> StoreState {
        self.store.state()
    }

    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.store.subscribe(observer)
    }

    pub async fn set_session(&self, session: Session) {
        self.store.set(Some(session)).await;
    }

    /// Replace the user of the active session. Returns `false` when there is
    /// no session to update.
    pub async fn update_user(&self, user: User) -> bool {
        if !self.is_authenticated() {
            return false;
        }
        let mut updated = false;
        self.store
            .update(|session| {
                if let Some(session) = session {
                    session.user = user;
                    updated = true;
                }
            })
            .await;
        updated
    }

    pub async fn clear(&self) {
        self.store.clear().await;
    }

    pub async fn load_from_storage(&self) -> bool {
        self.store.load_from_storage().await
    }

    /// Hydrate, handing the stored session to `before_apply` before any
    /// observer is told about it.
    pub async fn load_from_storage_with<F>(&self, before_apply: F) -> bool
    where
        F: FnOnce(&Session),
    {
        self.store
            .load_from_storage_with(|stored| {
                if let Some(session) = stored {
                    before_apply(session);
                }
            })
            .await
    }

    pub fn current_user(&self) -> Option<User> {
        self.store.with(|s| s.as_ref().map(|s| s.user.clone()))
    }

    pub fn token(&self) -> Option<String> {
        self.store.with(|s| s.as_ref().map(|s| s.token.clone()))
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.with(Option::is_some)
    }
}
