use std::sync::Arc;

use super::{Store, StoreState, Subscription};
use crate::storage::Storage;
use crate::types::{Project, ProjectStatus};

/// Client-side cache of the project listing.
///
/// Projects are only ever replaced or added here. Deletion is a server-side
/// soft delete that shows up on the next `replace_all`.
#[derive(Debug, Clone)]
pub struct ProjectStore {
    store: Store<Vec<Project>>,
}

impl ProjectStore {
    pub const KEY: &'static str = "banagochi.projects";

    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            store: Store::new(Self::KEY, storage),
        }
    }

    pub fn store(&self) -> &Store<Vec<Project>> {
        &self.store
    }

    pub fn snapshot(&self) -> Vec<Project> {
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

    pub async fn replace_all(&self, projects: Vec<Project>) {
        self.store.set(projects).await;
    }

    pub async fn append(&self, project: Project) {
        self.store.update(|projects| projects.push(project)).await;
    }

    /// Replace the project with the same id, or append it.
    pub async fn upsert(&self, project: Project) {
        self.store
            .update(|projects| match projects.iter().position(|p| p.id == project.id) {
                Some(index) => projects[index] = project,
                None => projects.push(project),
            })
            .await;
    }

    pub async fn clear(&self) {
        self.store.clear().await;
    }

    pub async fn load_from_storage(&self) -> bool {
        self.store.load_from_storage().await
    }

    pub fn find(&self, id: &str) -> Option<Project> {
        self.store
            .with(|projects| projects.iter().find(|p| p.id == id).cloned())
    }

    pub fn by_colony(&self, colony: &str) -> Vec<Project> {
        self.store.with(|projects| {
            projects
                .iter()
                .filter(|p| p.colony.eq_ignore_ascii_case(colony))
                .cloned()
                .collect()
        })
    }

    pub fn by_status(&self, status: ProjectStatus) -> Vec<Project> {
        self.store.with(|projects| {
            projects
                .iter()
                .filter(|p| p.status == status)
                .cloned()
                .collect()
        })
    }

    pub fn len(&self) -> usize {
        self.store.with(Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.store.with(Vec::is_empty)
    }
}
