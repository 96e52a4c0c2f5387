use super::unwrap_envelope;
use crate::client::HttpClient;
use crate::error::ServiceError;
use crate::store::ProjectStore;
use crate::types::{ApiEnvelope, Contribution, NewProject, Project, ProjectPatch};

/// Project listing and lifecycle calls. Keeps `ProjectStore` current.
#[derive(Debug, Clone)]
pub struct ProjectService {
    client: HttpClient,
    projects: ProjectStore,
}

impl ProjectService {
    pub fn new(client: HttpClient, projects: ProjectStore) -> Self {
        Self { client, projects }
    }

    /// Fetch the listing and replace the local cache with it.
    pub async fn list(&self) -> Result<Vec<Project>, ServiceError> {
        let envelope: ApiEnvelope<Vec<Project>> = self.client.get("/api/projects").await?;
        let projects = unwrap_envelope(envelope, "data")?;
        self.projects.replace_all(projects.clone()).await;
        Ok(projects)
    }

    pub async fn get(&self, id: &str) -> Result<Project, ServiceError> {
        let url = self.client.endpoint(&["api", "projects", id])?;
        let envelope: ApiEnvelope<Project> = self.client.get(&url).await?;
        unwrap_envelope(envelope, "data")
    }

    pub async fn create(&self, input: &NewProject) -> Result<Project, ServiceError> {
        let envelope: ApiEnvelope<Project> = self.client.post("/api/projects", input).await?;
        let project = unwrap_envelope(envelope, "data")?;
        self.projects.append(project.clone()).await;
        Ok(project)
    }

    pub async fn update(&self, id: &str, patch: &ProjectPatch) -> Result<Project, ServiceError> {
        let url = self.client.endpoint(&["api", "projects", id])?;
        let envelope: ApiEnvelope<Project> = self.client.patch(&url, patch).await?;
        let project = unwrap_envelope(envelope, "data")?;
        self.projects.upsert(project.clone()).await;
        Ok(project)
    }

    /// Soft-delete on the server. The local cache keeps the project until
    /// the next `list`.
    pub async fn delete(&self, id: &str) -> Result<(), ServiceError> {
        let url = self.client.endpoint(&["api", "projects", id])?;
        let envelope: ApiEnvelope<serde_json::Value> = self.client.delete(&url).await?;
        if !envelope.success {
            return Err(super::rejected(envelope.message));
        }
        Ok(())
    }

    /// Record a contribution and refresh the project in the cache.
    pub async fn contribute(&self, id: &str, amount: f64) -> Result<Project, ServiceError> {
        let url = self.client.endpoint(&["api", "projects", id, "contributions"])?;
        let envelope: ApiEnvelope<Project> = self.client.post(&url, &Contribution { amount }).await?;
        let project = unwrap_envelope(envelope, "data")?;
        self.projects.upsert(project.clone()).await;
        Ok(project)
    }
}
