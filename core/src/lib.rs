//! Client core for the Banagochi (Smart Cities) mobile app.
//!
//! # Overview
//! Everything between a UI event and the remote API: an HTTP client with
//! per-attempt timeouts, linear-backoff retries and bearer-token injection;
//! observable stores that mirror the session and the project listing to
//! durable storage; and thin services that map backend resources to typed
//! calls.
//!
//! # Design
//! - `HttpClient` never touches the network itself; a `Transport` does.
//!   `ReqwestTransport` is the production one, tests script their own.
//! - The bearer token lives in an explicit `AuthToken` handle shared by all
//!   clones of the client, not in a global.
//! - `Store<T>` is an explicit observable type with an injected `Storage`
//!   backend. `AppContext` builds one of each per process.
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.

pub mod auth;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod http;
pub mod retry;
pub mod services;
pub mod storage;
pub mod store;
pub mod transport;
pub mod types;

#[cfg(test)]
mod testing;

pub use auth::AuthToken;
pub use client::HttpClient;
pub use config::{ClientConfig, RequestConfig};
pub use context::AppContext;
pub use error::{ClientError, ConfigError, ServiceError, StorageError, TransportError};
pub use http::{FormData, FormPart, HttpMethod, HttpRequest, HttpResponse, PartValue, RequestBody};
pub use retry::RetryPolicy;
pub use services::{AsideService, AuthService, ProjectService, UserService};
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use store::{ProjectStore, SessionStore, Store, StoreState, Subscription};
pub use transport::{ReqwestTransport, Transport};
pub use types::{
    ApiEnvelope, Aside, AsideFrequency, AuthResponse, Contribution, Credentials, ImageUpload, Movement,
    MovementKind, NewAside, NewProject, NewUser, Project, ProjectPatch, ProjectStatus, Role, Session, User,
    VerificationResponse,
};
