use super::unwrap_envelope;
use crate::client::HttpClient;
use crate::error::ServiceError;
use crate::store::SessionStore;
use crate::types::{ApiEnvelope, Aside, NewAside};

/// Recurring pledges (apartados) of the signed-in user.
#[derive(Debug, Clone)]
pub struct AsideService {
    client: HttpClient,
    session: SessionStore,
}

impl AsideService {
    pub fn new(client: HttpClient, session: SessionStore) -> Self {
        Self { client, session }
    }

    pub async fn list(&self) -> Result<Vec<Aside>, ServiceError> {
        self.require_session()?;
        let envelope: ApiEnvelope<Vec<Aside>> = self.client.get("/api/asides").await?;
        unwrap_envelope(envelope, "data")
    }

    pub async fn create(&self, input: &NewAside) -> Result<Aside, ServiceError> {
        self.require_session()?;
        let envelope: ApiEnvelope<Aside> = self.client.post("/api/asides", input).await?;
        unwrap_envelope(envelope, "data")
    }

    /// Stop a pledge. The server keeps it as inactive.
    pub async fn cancel(&self, id: &str) -> Result<Aside, ServiceError> {
        self.require_session()?;
        let url = self.client.endpoint(&["api", "asides", id])?;
        let envelope: ApiEnvelope<Aside> = self.client.delete(&url).await?;
        unwrap_envelope(envelope, "data")
    }

    fn require_session(&self) -> Result<(), ServiceError> {
        if self.session.is_authenticated() {
            Ok(())
        } else {
            Err(ServiceError::NotAuthenticated)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use super::*;
    use crate::config::ClientConfig;
    use crate::storage::MemoryStorage;
    use crate::testing::{reply, ScriptedTransport};
    use crate::types::{AsideFrequency, Session, User};

    async fn signed_in(transport: Arc<ScriptedTransport>) -> AsideService {
        let client = HttpClient::new(ClientConfig::new("http://api.test"), transport);
        let session = SessionStore::new(Arc::new(MemoryStorage::new()));
        session
            .set_session(Session {
                user: User {
                    id: "u1".to_string(),
                    name: "Ana".to_string(),
                    email: "ana@example.mx".to_string(),
                    roles: BTreeSet::new(),
                    colony: None,
                    verified: true,
                },
                token: "abc".to_string(),
            })
            .await;
        AsideService::new(client, session)
    }

    #[tokio::test]
    async fn calls_without_session_fail_fast() {
        let transport = ScriptedTransport::new([]);
        let client = HttpClient::new(ClientConfig::new("http://api.test"), transport.clone());
        let asides = AsideService::new(client, SessionStore::new(Arc::new(MemoryStorage::new())));

        assert!(matches!(asides.list().await, Err(ServiceError::NotAuthenticated)));
        assert_eq!(transport.attempts(), 0);
    }

    #[tokio::test]
    async fn create_posts_camel_case_body() {
        let transport = ScriptedTransport::new([reply(
            201,
            r#"{"success":true,"data":{"id":"a1","userId":"u1","projectId":"p1","amount":100,"frequency":"monthly","active":true,"createdAt":"2026-01-15T10:00:00Z"}}"#,
        )]);
        let asides = signed_in(transport.clone()).await;

        let aside = asides
            .create(&NewAside {
                project_id: "p1".to_string(),
                amount: 100.0,
                frequency: AsideFrequency::Monthly,
            })
            .await
            .unwrap();

        assert!(aside.active);
        assert_eq!(aside.frequency, AsideFrequency::Monthly);
        let crate::http::RequestBody::Json(body) = &transport.requests()[0].body else {
            panic!("expected JSON body");
        };
        let body: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(body, serde_json::json!({"projectId": "p1", "amount": 100.0, "frequency": "monthly"}));
    }
}
