//! In-memory stand-in for the Banagochi REST API.
//!
//! Serves auth, users, projects, asides and biometric verification with
//! the same JSON shapes as the real backend, plus `/api/debug/*` routes that
//! echo headers, fail on demand or answer slowly so client retry and timeout
//! behavior can be exercised over real HTTP.

use std::{collections::HashMap, sync::Arc, time::Duration};

use axum::{
    extract::{Multipart, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// How many movements a project keeps.
const RECENT_MOVEMENTS: usize = 10;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub roles: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colony: Option<String>,
    pub verified: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Movement {
    pub id: String,
    pub kind: String,
    pub amount: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub title: String,
    pub description: String,
    pub goal: f64,
    pub current_amount: f64,
    pub status: String,
    pub colony: String,
    pub movements: Vec<Movement>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Aside {
    pub id: String,
    pub user_id: String,
    pub project_id: String,
    pub amount: f64,
    pub frequency: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct Login {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct Register {
    pub name: String,
    pub email: String,
    pub password: String,
    pub colony: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateProject {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub goal: f64,
    pub colony: String,
}

#[derive(Deserialize)]
pub struct UpdateProject {
    pub title: Option<String>,
    pub description: Option<String>,
    pub goal: Option<f64>,
    pub status: Option<String>,
}

#[derive(Deserialize)]
pub struct Contribute {
    pub amount: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAside {
    pub project_id: String,
    pub amount: f64,
    pub frequency: String,
}

struct Account {
    user: User,
    password: String,
}

struct StoredProject {
    project: Project,
    deleted: bool,
}

#[derive(Default)]
pub struct Db {
    accounts: HashMap<String, Account>,
    tokens: HashMap<String, String>,
    projects: Vec<StoredProject>,
    asides: Vec<Aside>,
    flaky: HashMap<String, u32>,
}

pub type SharedDb = Arc<RwLock<Db>>;

/// Error reply in the backend's `{success: false, message}` shape.
pub struct Failure(StatusCode, &'static str);

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "success": false, "message": self.1 }))).into_response()
    }
}

type Reply = Result<(StatusCode, Json<Value>), Failure>;

fn ok(data: Value) -> Reply {
    Ok((StatusCode::OK, Json(data)))
}

fn created(data: Value) -> Reply {
    Ok((StatusCode::CREATED, Json(data)))
}

pub fn app() -> Router {
    let db: SharedDb = Arc::new(RwLock::new(Db::default()));
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/me", get(me))
        .route("/api/users/{id}", get(get_user))
        .route("/api/projects", get(list_projects).post(create_project))
        .route(
            "/api/projects/{id}",
            get(get_project).patch(update_project).delete(delete_project),
        )
        .route("/api/projects/{id}/contributions", post(contribute))
        .route("/api/asides", get(list_asides).post(create_aside))
        .route("/api/asides/{id}", delete(cancel_aside))
        .route("/api/biometric/verify", post(verify_biometrics))
        .route("/api/debug/headers", get(echo_headers))
        .route("/api/debug/flaky/{key}/{failures}", get(flaky))
        .route("/api/debug/slow/{millis}", get(slow))
        .with_state(db)
        .layer(TraceLayer::new_for_http())
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn authenticate(db: &Db, headers: &HeaderMap) -> Result<User, Failure> {
    let unauthorized = Failure(StatusCode::UNAUTHORIZED, "Token inválido o ausente");
    let token = bearer(headers).ok_or(unauthorized)?;
    db.tokens
        .get(token)
        .and_then(|user_id| db.accounts.values().find(|a| &a.user.id == user_id))
        .map(|account| account.user.clone())
        .ok_or(Failure(StatusCode::UNAUTHORIZED, "Token inválido o ausente"))
}

fn issue_token(db: &mut Db, user_id: &str) -> String {
    let token = Uuid::new_v4().simple().to_string();
    db.tokens.insert(token.clone(), user_id.to_string());
    token
}

fn find_project<'a>(db: &'a mut Db, id: &str) -> Result<&'a mut Project, Failure> {
    db.projects
        .iter_mut()
        .find(|p| p.project.id == id && !p.deleted)
        .map(|p| &mut p.project)
        .ok_or(Failure(StatusCode::NOT_FOUND, "Proyecto no encontrado"))
}

async fn register(State(db): State<SharedDb>, Json(input): Json<Register>) -> Reply {
    let mut db = db.write().await;
    let email = input.email.trim().to_lowercase();
    if email.is_empty() || input.password.is_empty() {
        return Err(Failure(StatusCode::BAD_REQUEST, "Correo y contraseña son obligatorios"));
    }
    if db.accounts.contains_key(&email) {
        return Err(Failure(StatusCode::CONFLICT, "Correo ya registrado"));
    }
    let user = User {
        id: Uuid::new_v4().to_string(),
        name: input.name,
        email: email.clone(),
        roles: vec!["citizen".to_string()],
        colony: input.colony,
        verified: false,
    };
    db.accounts.insert(
        email,
        Account {
            user: user.clone(),
            password: input.password,
        },
    );
    let token = issue_token(&mut db, &user.id);
    created(json!({ "success": true, "token": token, "user": user }))
}

async fn login(State(db): State<SharedDb>, Json(input): Json<Login>) -> Reply {
    let mut db = db.write().await;
    let email = input.email.trim().to_lowercase();
    let user = match db.accounts.get(&email) {
        Some(account) if account.password == input.password => account.user.clone(),
        _ => return Err(Failure(StatusCode::UNAUTHORIZED, "Credenciales inválidas")),
    };
    let token = issue_token(&mut db, &user.id);
    ok(json!({ "success": true, "token": token, "user": user }))
}

async fn me(State(db): State<SharedDb>, headers: HeaderMap) -> Reply {
    let db = db.read().await;
    let user = authenticate(&db, &headers)?;
    ok(json!({ "success": true, "data": user }))
}

async fn get_user(State(db): State<SharedDb>, Path(id): Path<String>) -> Reply {
    let db = db.read().await;
    let user = db
        .accounts
        .values()
        .find(|a| a.user.id == id)
        .map(|a| a.user.clone())
        .ok_or(Failure(StatusCode::NOT_FOUND, "Usuario no encontrado"))?;
    ok(json!({ "success": true, "data": user }))
}

async fn list_projects(State(db): State<SharedDb>) -> Reply {
    let db = db.read().await;
    let projects: Vec<&Project> = db
        .projects
        .iter()
        .filter(|p| !p.deleted)
        .map(|p| &p.project)
        .collect();
    ok(json!({ "success": true, "data": projects }))
}

async fn create_project(
    State(db): State<SharedDb>,
    headers: HeaderMap,
    Json(input): Json<CreateProject>,
) -> Reply {
    let mut db = db.write().await;
    authenticate(&db, &headers)?;
    if input.goal <= 0.0 {
        return Err(Failure(StatusCode::BAD_REQUEST, "La meta debe ser mayor a cero"));
    }
    let project = Project {
        id: Uuid::new_v4().to_string(),
        title: input.title,
        description: input.description,
        goal: input.goal,
        current_amount: 0.0,
        status: "draft".to_string(),
        colony: input.colony,
        movements: Vec::new(),
    };
    db.projects.push(StoredProject {
        project: project.clone(),
        deleted: false,
    });
    created(json!({ "success": true, "data": project }))
}

async fn get_project(State(db): State<SharedDb>, Path(id): Path<String>) -> Reply {
    let db = db.read().await;
    let project = db
        .projects
        .iter()
        .find(|p| p.project.id == id && !p.deleted)
        .map(|p| p.project.clone())
        .ok_or(Failure(StatusCode::NOT_FOUND, "Proyecto no encontrado"))?;
    ok(json!({ "success": true, "data": project }))
}

async fn update_project(
    State(db): State<SharedDb>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(input): Json<UpdateProject>,
) -> Reply {
    let mut db = db.write().await;
    authenticate(&db, &headers)?;
    let project = find_project(&mut db, &id)?;
    if let Some(title) = input.title {
        project.title = title;
    }
    if let Some(description) = input.description {
        project.description = description;
    }
    if let Some(goal) = input.goal {
        project.goal = goal;
    }
    if let Some(status) = input.status {
        project.status = status;
    }
    ok(json!({ "success": true, "data": project }))
}

async fn delete_project(
    State(db): State<SharedDb>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Reply {
    let mut db = db.write().await;
    authenticate(&db, &headers)?;
    let stored = db
        .projects
        .iter_mut()
        .find(|p| p.project.id == id && !p.deleted)
        .ok_or(Failure(StatusCode::NOT_FOUND, "Proyecto no encontrado"))?;
    stored.deleted = true;
    stored.project.status = "cancelled".to_string();
    ok(json!({ "success": true, "message": "Proyecto eliminado" }))
}

async fn contribute(
    State(db): State<SharedDb>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(input): Json<Contribute>,
) -> Reply {
    let mut db = db.write().await;
    authenticate(&db, &headers)?;
    if input.amount <= 0.0 {
        return Err(Failure(StatusCode::BAD_REQUEST, "El monto debe ser mayor a cero"));
    }
    let project = find_project(&mut db, &id)?;
    project.current_amount += input.amount;
    project.movements.insert(
        0,
        Movement {
            id: Uuid::new_v4().to_string(),
            kind: "contribution".to_string(),
            amount: input.amount,
            created_at: Utc::now(),
        },
    );
    project.movements.truncate(RECENT_MOVEMENTS);
    if project.current_amount >= project.goal && project.status == "active" {
        project.status = "funded".to_string();
    }
    created(json!({ "success": true, "data": project }))
}

async fn list_asides(State(db): State<SharedDb>, headers: HeaderMap) -> Reply {
    let db = db.read().await;
    let user = authenticate(&db, &headers)?;
    let asides: Vec<&Aside> = db.asides.iter().filter(|a| a.user_id == user.id).collect();
    ok(json!({ "success": true, "data": asides }))
}

async fn create_aside(
    State(db): State<SharedDb>,
    headers: HeaderMap,
    Json(input): Json<CreateAside>,
) -> Reply {
    let mut db = db.write().await;
    let user = authenticate(&db, &headers)?;
    find_project(&mut db, &input.project_id)?;
    if input.amount <= 0.0 {
        return Err(Failure(StatusCode::BAD_REQUEST, "El monto debe ser mayor a cero"));
    }
    let aside = Aside {
        id: Uuid::new_v4().to_string(),
        user_id: user.id,
        project_id: input.project_id,
        amount: input.amount,
        frequency: input.frequency,
        active: true,
        created_at: Utc::now(),
    };
    db.asides.push(aside.clone());
    created(json!({ "success": true, "data": aside }))
}

async fn cancel_aside(
    State(db): State<SharedDb>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Reply {
    let mut db = db.write().await;
    let user = authenticate(&db, &headers)?;
    let aside = db
        .asides
        .iter_mut()
        .find(|a| a.id == id && a.user_id == user.id)
        .ok_or(Failure(StatusCode::NOT_FOUND, "Apartado no encontrado"))?;
    aside.active = false;
    ok(json!({ "success": true, "data": aside }))
}

async fn verify_biometrics(
    State(db): State<SharedDb>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Reply {
    let user = authenticate(&*db.read().await, &headers)?;

    let mut selfie = 0;
    let mut document = 0;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| Failure(StatusCode::BAD_REQUEST, "Formulario inválido"))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|_| Failure(StatusCode::BAD_REQUEST, "Formulario inválido"))?;
        match name.as_str() {
            "selfie" => selfie = bytes.len(),
            "idDocument" => document = bytes.len(),
            _ => {}
        }
    }
    if selfie == 0 || document == 0 {
        return Err(Failure(StatusCode::UNPROCESSABLE_ENTITY, "Se requieren selfie e identificación"));
    }

    let mut db = db.write().await;
    if let Some(account) = db.accounts.values_mut().find(|a| a.user.id == user.id) {
        account.user.verified = true;
    }
    ok(json!({ "success": true, "verified": true, "message": "Identidad verificada" }))
}

async fn echo_headers(headers: HeaderMap) -> Json<Value> {
    let map: HashMap<String, String> = headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                value.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect();
    Json(json!({ "success": true, "headers": map }))
}

/// Answers 503 for the first `failures` calls with this key, then 200 with
/// the total number of calls seen.
async fn flaky(State(db): State<SharedDb>, Path((key, failures)): Path<(String, u32)>) -> Response {
    let mut db = db.write().await;
    let calls = db.flaky.entry(key).or_insert(0);
    *calls += 1;
    if *calls <= failures {
        return Failure(StatusCode::SERVICE_UNAVAILABLE, "Servicio no disponible").into_response();
    }
    Json(json!({ "success": true, "attempts": *calls })).into_response()
}

async fn slow(Path(millis): Path<u64>) -> Json<Value> {
    tokio::time::sleep(Duration::from_millis(millis)).await;
    Json(json!({ "success": true, "waitedMs": millis }))
}
