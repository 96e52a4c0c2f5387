use super::unwrap_envelope;
use crate::client::HttpClient;
use crate::error::ServiceError;
use crate::types::{ApiEnvelope, User};

/// Read-only access to user profiles.
#[derive(Debug, Clone)]
pub struct UserService {
    client: HttpClient,
}

impl UserService {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }

    pub async fn get(&self, id: &str) -> Result<User, ServiceError> {
        let url = self.client.endpoint(&["api", "users", id])?;
        let envelope: ApiEnvelope<User> = self.client.get(&url).await?;
        unwrap_envelope(envelope, "data")
    }
}
