//! Thin per-resource wrappers over `HttpClient`.
//!
//! Each service maps one backend resource to typed calls, unwraps the
//! response envelope and, only when the call succeeded, updates the stores it
//! owns. A failed call leaves every store untouched.

mod asides;
mod auth;
mod projects;
mod users;

pub use asides::AsideService;
pub use auth::AuthService;
pub use projects::ProjectService;
pub use users::UserService;

use crate::error::ServiceError;
use crate::types::ApiEnvelope;

/// Unwrap `{success, data, message}`.
pub(crate) fn unwrap_envelope<T>(envelope: ApiEnvelope<T>, field: &'static str) -> Result<T, ServiceError> {
    if !envelope.success {
        return Err(rejected(envelope.message));
    }
    envelope.data.ok_or(ServiceError::MissingData(field))
}

pub(crate) fn rejected(message: Option<String>) -> ServiceError {
    ServiceError::Rejected(message.unwrap_or_else(|| "request rejected".to_string()))
}
