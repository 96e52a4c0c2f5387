//! Process-wide wiring of client, stores and services.

use std::sync::Arc;

use tracing::info;

use crate::client::HttpClient;
use crate::config::ClientConfig;
use crate::services::{AsideService, AuthService, ProjectService, UserService};
use crate::storage::Storage;
use crate::store::{ProjectStore, SessionStore};
use crate::transport::{ReqwestTransport, Transport};

/// Everything the UI layer needs, built once at startup and passed down.
#[derive(Debug, Clone)]
pub struct AppContext {
    client: HttpClient,
    session: SessionStore,
    projects: ProjectStore,
    auth: AuthService,
    project_service: ProjectService,
    users: UserService,
    asides: AsideService,
}

impl AppContext {
    pub fn new(config: ClientConfig, transport: Arc<dyn Transport>, storage: Arc<dyn Storage>) -> Self {
        let client = HttpClient::new(config, transport);
        let session = SessionStore::new(storage.clone());
        let projects = ProjectStore::new(storage);
        Self {
            auth: AuthService::new(client.clone(), session.clone()),
            project_service: ProjectService::new(client.clone(), projects.clone()),
            users: UserService::new(client.clone()),
            asides: AsideService::new(client.clone(), session.clone()),
            client,
            session,
            projects,
        }
    }

    /// Context backed by the `reqwest` transport.
    pub fn with_reqwest(config: ClientConfig, storage: Arc<dyn Storage>) -> Self {
        Self::new(config, Arc::new(ReqwestTransport::new()), storage)
    }

    /// Hydrate the stores and re-arm the token of a persisted session.
    /// Returns whether a session was restored.
    pub async fn init(&self) -> bool {
        let restored = self.auth.hydrate().await;
        self.projects.load_from_storage().await;
        info!(restored, cached_projects = self.projects.len(), "client state initialized");
        restored
    }

    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn projects(&self) -> &ProjectStore {
        &self.projects
    }

    pub fn auth(&self) -> &AuthService {
        &self.auth
    }

    pub fn project_service(&self) -> &ProjectService {
        &self.project_service
    }

    pub fn users(&self) -> &UserService {
        &self.users
    }

    pub fn asides(&self) -> &AsideService {
        &self.asides
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    use super::*;
    use crate::storage::MemoryStorage;
    use crate::testing::ScriptedTransport;
    use crate::types::{Session, User};

    fn session(token: &str) -> Session {
        Session {
            user: User {
                id: "u1".to_string(),
                name: "Ana".to_string(),
                email: "ana@example.mx".to_string(),
                roles: BTreeSet::new(),
                colony: None,
                verified: false,
            },
            token: token.to_string(),
        }
    }

    #[tokio::test]
    async fn init_restores_the_token() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        SessionStore::new(storage.clone()).set_session(session("persisted")).await;

        let context = AppContext::new(ClientConfig::default(), ScriptedTransport::new([]), storage);
        assert!(context.client().auth_token().is_none());

        assert!(context.init().await);
        assert_eq!(context.client().auth_token().as_deref(), Some("persisted"));
        assert!(context.session().is_authenticated());
    }

    #[tokio::test]
    async fn session_observers_see_the_restored_token() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        SessionStore::new(storage.clone()).set_session(session("persisted")).await;
        let context = AppContext::new(ClientConfig::default(), ScriptedTransport::new([]), storage);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let (client, log) = (context.client().clone(), seen.clone());
        let _sub = context.session().subscribe(move || log.lock().unwrap().push(client.auth_token()));

        assert!(context.init().await);
        assert_eq!(*seen.lock().unwrap(), vec![Some("persisted".to_string())]);
    }

    #[tokio::test]
    async fn init_on_fresh_install_stays_anonymous() {
        let context = AppContext::new(
            ClientConfig::default(),
            ScriptedTransport::new([]),
            Arc::new(MemoryStorage::new()),
        );
        assert!(!context.init().await);
        assert!(context.client().auth_token().is_none());
        assert!(context.projects().is_empty());
    }
}
