//! HTTP client for the Banagochi REST API.
//!
//! # Design
//! `HttpClient` is the single choke point for outbound calls. It builds an
//! `HttpRequest` (base URL, JSON or multipart body, default headers, bearer
//! token), runs it through the retry loop with a per-attempt timeout, and
//! parses the JSON body into the caller's type. The network round-trip itself
//! is delegated to a `Transport`, so the client is fully testable with a
//! scripted transport.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::AuthToken;
use crate::config::{ClientConfig, RequestConfig};
use crate::error::ClientError;
use crate::http::{FormData, HttpMethod, HttpRequest, HttpResponse, RequestBody};
use crate::retry::{Decision, Outcome};
use crate::transport::Transport;

/// Async client with timeout, retry and bearer-token injection.
///
/// Cloning is cheap; clones share the transport and the token.
#[derive(Clone)]
pub struct HttpClient {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    auth: AuthToken,
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &self.config)
            .field("authenticated", &self.auth.is_set())
            .finish()
    }
}

impl HttpClient {
    pub fn new(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self::with_auth(config, transport, AuthToken::new())
    }

    /// Build a client around an existing token handle.
    pub fn with_auth(mut config: ClientConfig, transport: Arc<dyn Transport>, auth: AuthToken) -> Self {
        config.base_url = config.base_url.trim_end_matches('/').to_string();
        Self {
            config,
            transport,
            auth,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn auth(&self) -> &AuthToken {
        &self.auth
    }

    /// Every request issued after this call carries (or omits) the
    /// `authorization` header accordingly.
    pub fn set_auth_token(&self, token: Option<String>) {
        self.auth.set(token);
    }

    pub fn auth_token(&self) -> Option<String> {
        self.auth.get()
    }

    /// Resolve `path` against the base URL. Absolute URLs pass through.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if path.starts_with('/') {
            format!("{}{path}", self.config.base_url)
        } else {
            format!("{}/{path}", self.config.base_url)
        }
    }

    /// Absolute URL of a resource below the base URL. Every segment is
    /// percent-encoded, so an id containing `/`, `?` or `..` stays one
    /// segment.
    pub fn endpoint(&self, segments: &[&str]) -> Result<String, ClientError> {
        let base = &self.config.base_url;
        let mut url = reqwest::Url::parse(base).map_err(|e| ClientError::InvalidUrl(format!("{base}: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| ClientError::InvalidUrl(base.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url.into())
    }

    /// Assemble a request with merged headers. Multipart bodies never get a
    /// `content-type` header here; the transport sets it with the boundary.
    pub fn build_request(
        &self,
        method: HttpMethod,
        path: &str,
        body: RequestBody,
        config: &RequestConfig,
    ) -> HttpRequest {
        let multipart = matches!(body, RequestBody::Multipart(_));
        let mut headers = Vec::new();
        if !multipart {
            headers.push(("content-type".to_string(), "application/json".to_string()));
        }
        if let Some(auth) = self.auth.header() {
            headers.push(auth);
        }
        for (name, value) in &config.headers {
            if multipart && name.eq_ignore_ascii_case("content-type") {
                continue;
            }
            headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
            headers.push((name.clone(), value.clone()));
        }

        HttpRequest {
            method,
            url: self.url(path),
            headers,
            body,
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.get_with(path, &RequestConfig::default()).await
    }

    pub async fn get_with<T: DeserializeOwned>(
        &self,
        path: &str,
        config: &RequestConfig,
    ) -> Result<T, ClientError> {
        self.request(HttpMethod::Get, path, RequestBody::Empty, config).await
    }

    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        self.post_with(path, body, &RequestConfig::default()).await
    }

    pub async fn post_with<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        config: &RequestConfig,
    ) -> Result<T, ClientError> {
        self.request(HttpMethod::Post, path, json_body(body)?, config).await
    }

    pub async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        self.put_with(path, body, &RequestConfig::default()).await
    }

    pub async fn put_with<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        config: &RequestConfig,
    ) -> Result<T, ClientError> {
        self.request(HttpMethod::Put, path, json_body(body)?, config).await
    }

    pub async fn patch<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        self.patch_with(path, body, &RequestConfig::default()).await
    }

    pub async fn patch_with<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        config: &RequestConfig,
    ) -> Result<T, ClientError> {
        self.request(HttpMethod::Patch, path, json_body(body)?, config).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.delete_with(path, &RequestConfig::default()).await
    }

    pub async fn delete_with<T: DeserializeOwned>(
        &self,
        path: &str,
        config: &RequestConfig,
    ) -> Result<T, ClientError> {
        self.request(HttpMethod::Delete, path, RequestBody::Empty, config).await
    }

    /// POST a multipart form.
    pub async fn upload_form_data<T: DeserializeOwned>(
        &self,
        path: &str,
        form: FormData,
    ) -> Result<T, ClientError> {
        self.upload_form_data_with(path, form, &RequestConfig::default()).await
    }

    pub async fn upload_form_data_with<T: DeserializeOwned>(
        &self,
        path: &str,
        form: FormData,
        config: &RequestConfig,
    ) -> Result<T, ClientError> {
        self.request(HttpMethod::Post, path, RequestBody::Multipart(form), config)
            .await
    }

    /// Run `request` through the retry loop and return the final raw
    /// response, which may be non-2xx. Transport failures and timeouts on the
    /// last attempt are returned as errors.
    pub async fn fetch_with_retry(
        &self,
        request: &HttpRequest,
        config: &RequestConfig,
    ) -> Result<HttpResponse, ClientError> {
        let timeout = config.resolve_timeout(&self.config);
        let policy = config.resolve_policy(&self.config);

        let mut attempt = 1;
        loop {
            debug!(method = request.method.as_str(), url = %request.url, attempt, "sending request");
            let result = match tokio::time::timeout(timeout, self.transport.send(request.clone())).await {
                Ok(Ok(response)) => Ok(response),
                Ok(Err(err)) => Err(ClientError::Network(err)),
                Err(_) => Err(ClientError::Timeout(timeout)),
            };

            let outcome = match &result {
                Ok(response) => Outcome::Status(response.status),
                Err(ClientError::Network(err)) if !err.is_transient() => Outcome::Fatal,
                Err(_) => Outcome::Transient,
            };

            match policy.decide(attempt, outcome) {
                Decision::Return => return result,
                Decision::RetryAfter(delay) => {
                    match &result {
                        Ok(response) => warn!(url = %request.url, attempt, status = response.status, ?delay, "server error, retrying"),
                        Err(err) => warn!(url = %request.url, attempt, error = %err, ?delay, "request failed, retrying"),
                    }
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: HttpMethod,
        path: &str,
        body: RequestBody,
        config: &RequestConfig,
    ) -> Result<T, ClientError> {
        let request = self.build_request(method, path, body, config);
        let response = self.fetch_with_retry(&request, config).await?;
        if !response.is_success() {
            return Err(http_error(&response));
        }
        parse_body(&response)
    }
}

fn json_body<B: Serialize + ?Sized>(body: &B) -> Result<RequestBody, ClientError> {
    serde_json::to_string(body)
        .map(RequestBody::Json)
        .map_err(|e| ClientError::Serialization(e.to_string()))
}

/// Convert a non-2xx response into `ClientError::Http`.
fn http_error(response: &HttpResponse) -> ClientError {
    let body = serde_json::from_str(&response.body)
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));
    ClientError::Http {
        status: response.status,
        status_text: response.status_text.clone(),
        body,
    }
}

fn parse_body<T: DeserializeOwned>(response: &HttpResponse) -> Result<T, ClientError> {
    let text = if response.body.trim().is_empty() {
        "null"
    } else {
        response.body.as_str()
    };
    serde_json::from_str(text).map_err(|e| ClientError::Deserialization(e.to_string()))
}
