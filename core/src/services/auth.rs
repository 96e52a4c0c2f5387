use tracing::info;

use super::{rejected, unwrap_envelope};
use crate::client::HttpClient;
use crate::error::ServiceError;
use crate::http::FormData;
use crate::store::SessionStore;
use crate::types::{ApiEnvelope, AuthResponse, Credentials, ImageUpload, NewUser, Session, User, VerificationResponse};

/// Login, registration, profile refresh and biometric verification.
///
/// Keeps the client's bearer token and the session store in step: the token
/// is set before the session is stored, so observers reacting to a new
/// session can already issue authenticated calls.
#[derive(Debug, Clone)]
pub struct AuthService {
    client: HttpClient,
    session: SessionStore,
}

impl AuthService {
    pub fn new(client: HttpClient, session: SessionStore) -> Self {
        Self { client, session }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session, ServiceError> {
        let credentials = Credentials {
            email: email.to_string(),
            password: password.to_string(),
        };
        let response: AuthResponse = self.client.post("/api/auth/login", &credentials).await?;
        self.start_session(response).await
    }

    pub async fn register(&self, new_user: &NewUser) -> Result<Session, ServiceError> {
        let response: AuthResponse = self.client.post("/api/auth/register", new_user).await?;
        self.start_session(response).await
    }

    /// Re-fetch the signed-in user and replace it in the session.
    pub async fn refresh_profile(&self) -> Result<User, ServiceError> {
        if !self.session.is_authenticated() {
            return Err(ServiceError::NotAuthenticated);
        }
        let envelope: ApiEnvelope<User> = self.client.get("/api/auth/me").await?;
        let user = unwrap_envelope(envelope, "data")?;
        self.session.update_user(user.clone()).await;
        Ok(user)
    }

    /// Drop the token and the persisted session.
    pub async fn logout(&self) {
        self.client.set_auth_token(None);
        self.session.clear().await;
        info!("session closed");
    }

    /// Load the persisted session. The token is armed before session
    /// observers run. Returns whether a session was restored.
    pub async fn hydrate(&self) -> bool {
        let client = self.client.clone();
        self.session
            .load_from_storage_with(move |session| client.set_auth_token(Some(session.token.clone())))
            .await;
        self.restore()
    }

    /// Re-arm the client token from a hydrated session. Returns whether a
    /// session was present.
    pub fn restore(&self) -> bool {
        let token = self.session.token();
        let restored = token.is_some();
        self.client.set_auth_token(token);
        restored
    }

    /// Upload a selfie and an ID document for verification. On success the
    /// session user is marked verified.
    pub async fn verify_biometrics(
        &self,
        selfie: ImageUpload,
        id_document: ImageUpload,
    ) -> Result<bool, ServiceError> {
        let user = self.session.current_user().ok_or(ServiceError::NotAuthenticated)?;
        let form = FormData::new()
            .text("userId", user.id.clone())
            .file("selfie", selfie.bytes, selfie.file_name, selfie.mime)
            .file("idDocument", id_document.bytes, id_document.file_name, id_document.mime);

        let response: VerificationResponse = self
            .client
            .upload_form_data("/api/biometric/verify", form)
            .await?;
        if !response.success {
            return Err(rejected(response.message));
        }
        if response.verified {
            self.session
                .update_user(User {
                    verified: true,
                    ..user
                })
                .await;
        }
        Ok(response.verified)
    }

    async fn start_session(&self, response: AuthResponse) -> Result<Session, ServiceError> {
        if !response.success {
            return Err(rejected(response.message));
        }
        let token = response.token.ok_or(ServiceError::MissingData("token"))?;
        let user = response.user.ok_or(ServiceError::MissingData("user"))?;
        let session = Session { user, token };

        self.client.set_auth_token(Some(session.token.clone()));
        self.session.set_session(session.clone()).await;
        info!(user = %session.user.id, "session started");
        Ok(session)
    }
}
